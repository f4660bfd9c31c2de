//! Plumb CLI - git plumbing from the command line.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod config;

use commands::CatMode;
use config::Config;

/// Plumb - content-addressed objects, packs and smart HTTP clone
#[derive(Parser, Debug)]
#[command(name = "plumb")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create an empty repository
    Init {
        /// Directory to initialize (default: current directory)
        path: Option<PathBuf>,
    },

    /// Show an object's content, type or size
    CatFile {
        #[command(flatten)]
        mode: CatFileMode,
        /// Object digest
        object: String,
    },

    /// Compute a blob id, optionally storing the blob
    HashObject {
        /// Write the object into the store
        #[arg(short = 'w')]
        write: bool,
        /// File to hash
        file: PathBuf,
    },

    /// List the entries of a tree
    LsTree {
        /// Only print entry names
        #[arg(long)]
        name_only: bool,
        /// Tree digest
        tree: String,
    },

    /// Write the current directory as a tree
    WriteTree,

    /// Create a commit from a tree
    CommitTree {
        /// Tree digest
        tree: String,
        /// Parent commit
        #[arg(short = 'p')]
        parent: Option<String>,
        /// Commit message
        #[arg(short = 'm')]
        message: String,
    },

    /// Clone a repository over smart HTTP
    Clone {
        /// Repository URL
        url: String,
        /// Destination directory (default: derived from the URL)
        dir: Option<PathBuf>,
        /// Branch to check out instead of the remote HEAD
        #[arg(short, long)]
        branch: Option<String>,
    },
}

/// Exactly one of `-p`, `-t` or `-s`.
#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
struct CatFileMode {
    /// Pretty-print the object's content
    #[arg(short = 'p')]
    pretty: bool,
    /// Show the object's type
    #[arg(short = 't')]
    kind: bool,
    /// Show the object's size
    #[arg(short = 's')]
    size: bool,
}

impl From<CatFileMode> for CatMode {
    fn from(mode: CatFileMode) -> Self {
        if mode.pretty {
            Self::Pretty
        } else if mode.kind {
            Self::Type
        } else {
            debug_assert!(mode.size);
            Self::Size
        }
    }
}

fn main() {
    let cli = Cli::parse();

    // Initialize tracing
    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("plumb={log_level},plumb_git={log_level},plumb_storage={log_level}")
                    .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Err(e) = run(cli.command) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn run(command: Commands) -> commands::Result<()> {
    let config = Config::load()?;
    let work_dir = std::env::current_dir()?;
    let mut out = std::io::stdout().lock();

    match command {
        Commands::Init { path } => {
            commands::init(&path.unwrap_or_else(|| work_dir.clone()), &config, &mut out)
        }
        Commands::CatFile { mode, object } => {
            commands::cat_file(&work_dir, &config, mode.into(), &object, &mut out)
        }
        Commands::HashObject { write, file } => {
            commands::hash_object(&work_dir, &config, &file, write, &mut out)
        }
        Commands::LsTree { name_only, tree } => {
            commands::ls_tree(&work_dir, &config, &tree, name_only, &mut out)
        }
        Commands::WriteTree => commands::write_tree(&work_dir, &config, &mut out),
        Commands::CommitTree {
            tree,
            parent,
            message,
        } => commands::commit_tree(
            &work_dir,
            &config,
            &tree,
            parent.as_deref(),
            &message,
            &mut out,
        ),
        Commands::Clone { url, dir, branch } => {
            commands::clone(&url, dir, branch, &config, &mut out)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_cat_file_requires_a_mode() {
        assert!(Cli::try_parse_from(["plumb", "cat-file", "abc"]).is_err());
        assert!(Cli::try_parse_from(["plumb", "cat-file", "-p", "-t", "abc"]).is_err());
        assert!(Cli::try_parse_from(["plumb", "cat-file", "-s", "abc"]).is_ok());
    }

    #[test]
    fn test_commit_tree_args() {
        let cli = Cli::try_parse_from([
            "plumb",
            "commit-tree",
            "t",
            "-p",
            "parent",
            "-m",
            "msg",
        ])
        .unwrap();
        match cli.command {
            Commands::CommitTree {
                tree,
                parent,
                message,
            } => {
                assert_eq!(tree, "t");
                assert_eq!(parent.as_deref(), Some("parent"));
                assert_eq!(message, "msg");
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_verbose_count() {
        let cli = Cli::try_parse_from(["plumb", "-vv", "write-tree"]).unwrap();
        assert_eq!(cli.verbose, 2);
    }
}
