//! Command implementations for OxiZip CLI.

pub mod add;
pub mod create;
pub mod extract;
pub mod list;
pub mod remove;
pub mod select;

pub use add::{AddOptions, cmd_add};
pub use create::{CreateOptions, cmd_create};
pub use extract::{ExtractOptions, cmd_extract};
pub use list::{ListOptions, cmd_list};
pub use remove::cmd_remove;
pub use select::{SelectOptions, cmd_select};
pub use test::cmd_test;

use std::path::Path;

/// Result type shared by the commands.
pub type CmdResult = Result<(), Box<dyn std::error::Error>>;

/// Archive directory for a directory input: `dir_in_archive` followed by
/// the input's own name, so `create out.zip src` stores `src/...`.
pub(crate) fn dir_for_input(dir_in_archive: &str, input: &Path) -> String {
    let base = dir_in_archive.trim_matches('/');
    let own = input
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .filter(|n| n != "." && n != "..");
    match (base.is_empty(), own) {
        (_, None) => base.to_string(),
        (true, Some(own)) => own,
        (false, Some(own)) => format!("{base}/{own}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dir_for_input() {
        assert_eq!(dir_for_input("", Path::new("src")), "src");
        assert_eq!(dir_for_input("pkg/", Path::new("/tmp/src")), "pkg/src");
        assert_eq!(dir_for_input("pkg", Path::new(".")), "pkg");
        assert_eq!(dir_for_input("", Path::new("..")), "");
    }
}
