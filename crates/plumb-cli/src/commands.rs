//! CLI command implementations.
//!
//! Commands write their normal output to `out`; diagnostics go through
//! tracing.

use crate::config::Config;
use plumb_git::plumbing::{self, default_clone_dir};
use plumb_git::{format_entry, GitError, HttpTransport};
use plumb_storage::{ObjectStore, Repository, StorageError};
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// CLI errors.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Git(#[from] GitError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("{0}")]
    Usage(String),
}

pub type Result<T> = std::result::Result<T, CliError>;

/// What `cat-file` prints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatMode {
    /// Payload, with trees listed.
    Pretty,
    /// Object kind.
    Type,
    /// Payload size in bytes.
    Size,
}

fn open_repo(work_dir: &Path, config: &Config) -> Result<Repository> {
    Ok(Repository::open(work_dir.join(&config.metadata_dir))?)
}

/// Initialize a repository in `path`.
pub fn init(path: &Path, config: &Config, out: &mut impl Write) -> Result<()> {
    std::fs::create_dir_all(path)?;
    let git_dir = path.join(&config.metadata_dir);
    plumbing::init(&git_dir, &config.default_branch)?;
    writeln!(out, "Initialized empty repository in {}", git_dir.display())?;
    Ok(())
}

/// Print an object.
pub fn cat_file(
    work_dir: &Path,
    config: &Config,
    mode: CatMode,
    object: &str,
    out: &mut impl Write,
) -> Result<()> {
    let repo = open_repo(work_dir, config)?;
    let object = plumbing::cat_file(&repo.objects, object)?;
    match mode {
        CatMode::Pretty => out.write_all(&plumbing::pretty_print(&object)?)?,
        CatMode::Type => writeln!(out, "{}", object.object_type)?,
        CatMode::Size => writeln!(out, "{}", object.size())?,
    }
    Ok(())
}

/// Hash a file as a blob, storing it when `write` is set.
pub fn hash_object(
    work_dir: &Path,
    config: &Config,
    file: &Path,
    write: bool,
    out: &mut impl Write,
) -> Result<()> {
    let contents = std::fs::read(file)?;
    let store = if write {
        open_repo(work_dir, config)?.objects
    } else {
        // never written to
        ObjectStore::new(work_dir.join(&config.metadata_dir).join("objects"))
    };
    let id = plumbing::hash_object(&store, &contents, write)?;
    writeln!(out, "{id}")?;
    Ok(())
}

/// List a tree.
pub fn ls_tree(
    work_dir: &Path,
    config: &Config,
    tree: &str,
    name_only: bool,
    out: &mut impl Write,
) -> Result<()> {
    let repo = open_repo(work_dir, config)?;
    for entry in plumbing::list_tree(&repo.objects, tree)? {
        writeln!(out, "{}", format_entry(&entry, name_only))?;
    }
    Ok(())
}

/// Snapshot the working directory.
pub fn write_tree(work_dir: &Path, config: &Config, out: &mut impl Write) -> Result<()> {
    let repo = open_repo(work_dir, config)?;
    let id = plumbing::write_tree(&repo.objects, work_dir, &config.metadata_dir)?;
    writeln!(out, "{id}")?;
    Ok(())
}

/// Create a commit for a tree.
pub fn commit_tree(
    work_dir: &Path,
    config: &Config,
    tree: &str,
    parent: Option<&str>,
    message: &str,
    out: &mut impl Write,
) -> Result<()> {
    let repo = open_repo(work_dir, config)?;
    let id = plumbing::commit_tree(&repo.objects, tree, parent, message, &config.signature())?;
    writeln!(out, "{id}")?;
    Ok(())
}

/// Clone a remote repository.
pub fn clone(
    url: &str,
    dir: Option<PathBuf>,
    branch: Option<String>,
    config: &Config,
    out: &mut impl Write,
) -> Result<()> {
    let dest = match dir {
        Some(dir) => dir,
        None => default_clone_dir(url)
            .map(PathBuf::from)
            .ok_or_else(|| CliError::Usage(format!("cannot derive a directory name from {url}")))?,
    };

    let transport = HttpTransport::new(&config.user_agent)?;
    let outcome = plumbing::clone(&transport, url, &dest, &config.clone_options(branch))?;

    writeln!(
        out,
        "Cloned into {} ({} at {}, {} objects, {} files)",
        dest.display(),
        outcome.branch,
        outcome.commit,
        outcome.objects,
        outcome.files
    )?;
    Ok(())
}
