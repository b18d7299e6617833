//! OxiZip CLI - ZIP archives from the command line
//!
//! Create, update, list, extract and test ZIP archives, and try selection
//! expressions against directories or archives.

mod commands;
mod utils;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use commands::{
    AddOptions, CreateOptions, ExtractOptions, ListOptions, SelectOptions, cmd_add, cmd_create,
    cmd_extract, cmd_list, cmd_remove, cmd_select, cmd_test,
};
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};
use utils::{EncryptionArg, MethodArg, OverwriteArg, Zip64Arg};

#[derive(Parser)]
#[command(name = "oxizip")]
#[command(author, version, about = "ZIP archive utility with selection queries")]
#[command(long_about = "
OxiZip creates, updates and extracts ZIP archives. Entries can be chosen
with selection expressions such as \"*.rs AND size > 10kb\".

Examples:
  oxizip create out.zip src README.md
  oxizip create secret.zip docs --encryption aes256 --password hunter2
  oxizip add out.zip CHANGELOG.md
  oxizip list out.zip --select \"*.rs\"
  oxizip extract out.zip -o unpacked --overwrite ask
  oxizip remove out.zip --select \"mtime < 2020-01-01\"
  oxizip select \"name = *.txt OR size > 1mb\" ./data --explain
")]
struct Cli {
    /// Increase log output (-v debug, -vv trace); RUST_LOG overrides
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new archive from files and directories
    #[command(alias = "c")]
    Create {
        /// Output archive file
        archive: PathBuf,

        /// Files and directories to add (glob patterns are expanded)
        #[arg(required = true)]
        inputs: Vec<String>,

        /// Directory inside the archive to place inputs under
        #[arg(short = 'd', long, default_value = "")]
        dir_in_archive: String,

        /// Only add files matching this selection expression
        #[arg(short, long)]
        select: Option<String>,

        /// Compression method
        #[arg(short, long, value_enum, default_value = "deflate")]
        method: MethodArg,

        /// Compression level (0-9)
        #[arg(short = 'l', long, default_value_t = 6, value_parser = clap::value_parser!(u32).range(0..=9))]
        level: u32,

        /// Encryption for new entries
        #[arg(short, long, value_enum, default_value = "none")]
        encryption: EncryptionArg,

        /// Password for encrypted entries
        #[arg(short, long)]
        password: Option<String>,

        /// Zip64 extension policy
        #[arg(long, value_enum, default_value = "as-necessary")]
        zip64: Zip64Arg,

        /// Minimum entry size for parallel deflate in bytes (negative disables)
        #[arg(long, allow_hyphen_values = true)]
        parallel_threshold: Option<i64>,

        /// Store files without their directory hierarchy
        #[arg(long)]
        flatten: bool,

        /// Skip empty directories
        #[arg(long)]
        no_empty_dirs: bool,

        /// Archive comment
        #[arg(long)]
        comment: Option<String>,

        /// Replace the archive if it already exists
        #[arg(short, long)]
        force: bool,

        /// Hide the progress bar
        #[arg(long)]
        no_progress: bool,
    },

    /// Add or replace files in an existing archive
    #[command(alias = "a")]
    Add {
        /// Archive to update (created if missing)
        archive: PathBuf,

        /// Files and directories to add (glob patterns are expanded)
        #[arg(required = true)]
        inputs: Vec<String>,

        /// Directory inside the archive to place inputs under
        #[arg(short = 'd', long, default_value = "")]
        dir_in_archive: String,

        /// Compression level (0-9)
        #[arg(short = 'l', long, default_value_t = 6, value_parser = clap::value_parser!(u32).range(0..=9))]
        level: u32,

        /// Encryption for new entries
        #[arg(short, long, value_enum, default_value = "none")]
        encryption: EncryptionArg,

        /// Password for new entries
        #[arg(short, long)]
        password: Option<String>,

        /// Hide the progress bar
        #[arg(long)]
        no_progress: bool,
    },

    /// Remove entries from an archive
    #[command(alias = "rm")]
    Remove {
        /// Archive to update
        archive: PathBuf,

        /// Entry names to remove
        names: Vec<String>,

        /// Also remove entries matching this selection expression
        #[arg(short, long)]
        select: Option<String>,
    },

    /// List the contents of an archive
    #[command(alias = "l")]
    List {
        /// Archive file to list
        archive: PathBuf,

        /// Only list entries matching this selection expression
        #[arg(short, long)]
        select: Option<String>,

        /// Show sizes, method and timestamps
        #[arg(short, long)]
        long: bool,

        /// Output as JSON (machine-readable)
        #[arg(short, long)]
        json: bool,
    },

    /// Extract entries from an archive
    #[command(alias = "x")]
    Extract {
        /// Archive file to extract
        archive: PathBuf,

        /// Output directory
        #[arg(short, long, default_value = ".")]
        output: PathBuf,

        /// Only extract entries matching this selection expression
        #[arg(short, long)]
        select: Option<String>,

        /// What to do when a target file exists
        #[arg(long, value_enum, default_value = "throw")]
        overwrite: OverwriteArg,

        /// Password for encrypted entries
        #[arg(short, long)]
        password: Option<String>,

        /// Hide the progress bar
        #[arg(long)]
        no_progress: bool,
    },

    /// Verify every entry by decoding it
    #[command(alias = "t")]
    Test {
        /// Archive file to test
        archive: PathBuf,

        /// Password for encrypted entries
        #[arg(short, long)]
        password: Option<String>,
    },

    /// Show what a selection expression matches without changing anything
    Select {
        /// Selection expression, e.g. "*.txt AND size > 1kb"
        criteria: String,

        /// Directory or archive to evaluate against
        #[arg(default_value = ".")]
        target: PathBuf,

        /// Do not descend into subdirectories
        #[arg(long)]
        no_recurse: bool,

        /// Print the parsed expression
        #[arg(long)]
        explain: bool,
    },

    /// Generate shell completion scripts
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(filter)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Commands::Create {
            archive,
            inputs,
            dir_in_archive,
            select,
            method,
            level,
            encryption,
            password,
            zip64,
            parallel_threshold,
            flatten,
            no_empty_dirs,
            comment,
            force,
            no_progress,
        } => cmd_create(&CreateOptions {
            archive: &archive,
            inputs: &inputs,
            dir_in_archive: &dir_in_archive,
            select: select.as_deref(),
            method,
            level,
            encryption,
            password: password.as_deref(),
            zip64,
            parallel_threshold,
            flatten,
            empty_dirs: !no_empty_dirs,
            comment: comment.as_deref(),
            force,
            progress: !no_progress,
        }),
        Commands::Add {
            archive,
            inputs,
            dir_in_archive,
            level,
            encryption,
            password,
            no_progress,
        } => cmd_add(&AddOptions {
            archive: &archive,
            inputs: &inputs,
            dir_in_archive: &dir_in_archive,
            level,
            encryption,
            password: password.as_deref(),
            progress: !no_progress,
        }),
        Commands::Remove {
            archive,
            names,
            select,
        } => cmd_remove(&archive, &names, select.as_deref()),
        Commands::List {
            archive,
            select,
            long,
            json,
        } => cmd_list(&ListOptions {
            archive: &archive,
            select: select.as_deref(),
            long,
            json,
        }),
        Commands::Extract {
            archive,
            output,
            select,
            overwrite,
            password,
            no_progress,
        } => cmd_extract(&ExtractOptions {
            archive: &archive,
            output: &output,
            select: select.as_deref(),
            overwrite,
            password: password.as_deref(),
            progress: !no_progress,
        }),
        Commands::Test { archive, password } => cmd_test(&archive, password.as_deref()),
        Commands::Select {
            criteria,
            target,
            no_recurse,
            explain,
        } => cmd_select(&SelectOptions {
            criteria: &criteria,
            target: &target,
            recurse: !no_recurse,
            explain,
        }),
        Commands::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "oxizip", &mut std::io::stdout());
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
