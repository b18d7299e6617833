//! Select command: evaluate a selection expression without side effects.

use super::CmdResult;
use oxizip_archive::ZipArchive;
use oxizip_select::FileSelector;
use std::path::Path;

/// Options for a selection dry run.
pub struct SelectOptions<'a> {
    pub criteria: &'a str,
    pub target: &'a Path,
    pub recurse: bool,
    pub explain: bool,
}

pub fn cmd_select(options: &SelectOptions) -> CmdResult {
    let selector = FileSelector::new(options.criteria)?;
    if options.explain {
        println!("Parsed: {}", selector);
    }

    let matches: Vec<String> = if options.target.is_dir() {
        selector
            .select(options.target, options.recurse)?
            .into_iter()
            .map(|s| {
                let name = s.relative.to_string_lossy().replace('\\', "/");
                if s.is_dir { format!("{name}/") } else { name }
            })
            .collect()
    } else {
        let zip = ZipArchive::open(options.target)?;
        zip.select_entries(options.criteria)?
            .into_iter()
            .map(|e| e.name().to_string())
            .collect()
    };

    for name in &matches {
        println!("{}", name);
    }
    eprintln!("{} matched", matches.len());
    Ok(())
}
