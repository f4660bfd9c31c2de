//! Repository layout on disk.

use crate::{ObjectStore, RefStore, Result, StorageError};
use std::path::{Path, PathBuf};

/// A repository metadata directory with its objects and references.
#[derive(Debug, Clone)]
pub struct Repository {
    git_dir: PathBuf,
    /// Object store.
    pub objects: ObjectStore,
    /// Reference store.
    pub refs: RefStore,
}

impl Repository {
    fn at(git_dir: &Path) -> Self {
        Self {
            git_dir: git_dir.to_path_buf(),
            objects: ObjectStore::new(git_dir.join("objects")),
            refs: RefStore::new(git_dir),
        }
    }

    /// Creates the directory layout and points HEAD at `default_branch`.
    ///
    /// Re-initialising an existing repository keeps its objects and refs,
    /// only HEAD is rewritten.
    pub fn init(git_dir: impl AsRef<Path>, default_branch: &str) -> Result<Self> {
        let git_dir = git_dir.as_ref();
        for sub in ["objects", "refs/heads", "refs/tags"] {
            std::fs::create_dir_all(git_dir.join(sub))?;
        }

        let repo = Self::at(git_dir);
        repo.refs.set_head(default_branch)?;

        tracing::info!(path = %git_dir.display(), branch = %default_branch, "initialized repository");
        Ok(repo)
    }

    /// Opens an existing repository.
    pub fn open(git_dir: impl AsRef<Path>) -> Result<Self> {
        let git_dir = git_dir.as_ref();
        if !git_dir.join("objects").is_dir() || !git_dir.join("HEAD").is_file() {
            return Err(StorageError::NotFound(format!(
                "not a repository: {}",
                git_dir.display()
            )));
        }
        Ok(Self::at(git_dir))
    }

    /// Returns the metadata directory.
    pub fn git_dir(&self) -> &Path {
        &self.git_dir
    }
}
