//! Git reference management.
//!
//! References are plain files below the repository root: `HEAD` holds a
//! symbolic ref, `refs/heads/<branch>` holds a hex object id.

use crate::{ObjectId, Result, StorageError};
use std::path::{Path, PathBuf};

/// A git reference (branch, tag, or symbolic ref).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reference {
    /// Direct reference to an object.
    Direct(ObjectId),
    /// Symbolic reference (e.g., HEAD -> refs/heads/main).
    Symbolic(String),
}

impl Reference {
    /// Parses the contents of a ref file.
    pub fn parse(contents: &str) -> Result<Self> {
        let contents = contents.trim_end();
        match contents.strip_prefix("ref: ") {
            Some(target) => Ok(Self::Symbolic(target.to_string())),
            None => Ok(Self::Direct(ObjectId::from_hex(contents)?)),
        }
    }

    /// Renders the reference as ref-file contents.
    pub fn to_file_contents(&self) -> String {
        match self {
            Self::Direct(id) => format!("{id}\n"),
            Self::Symbolic(target) => format!("ref: {target}\n"),
        }
    }

    /// Returns the object ID if this is a direct reference.
    pub fn as_direct(&self) -> Option<ObjectId> {
        match self {
            Self::Direct(id) => Some(*id),
            Self::Symbolic(_) => None,
        }
    }
}

/// Reference store rooted at a repository metadata directory.
#[derive(Debug, Clone)]
pub struct RefStore {
    root: PathBuf,
}

impl RefStore {
    /// Creates a reference store rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, name: &str) -> Result<PathBuf> {
        let valid = !name.is_empty()
            && !name.starts_with('/')
            && name.split('/').all(|seg| !seg.is_empty() && seg != "." && seg != "..");
        if !valid {
            return Err(StorageError::InvalidArgument(format!("invalid ref name: {name}")));
        }
        Ok(self.root.join(name))
    }

    /// Gets a reference by name.
    pub fn get(&self, name: &str) -> Result<Reference> {
        let path = self.path_for(name)?;
        match std::fs::read_to_string(&path) {
            Ok(contents) => Reference::parse(&contents),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(name.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Writes a reference, creating parent directories as needed.
    pub fn set(&self, name: &str, reference: &Reference) -> Result<()> {
        let path = self.path_for(name)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, reference.to_file_contents())?;
        tracing::debug!(name = %name, target = ?reference, "updated ref");
        Ok(())
    }

    /// Points a reference directly at an object.
    pub fn write_ref(&self, name: &str, id: ObjectId) -> Result<()> {
        self.set(name, &Reference::Direct(id))
    }

    /// Points HEAD at `refs/heads/<branch>`.
    pub fn set_head(&self, branch: &str) -> Result<()> {
        self.set("HEAD", &Reference::Symbolic(format!("refs/heads/{branch}")))
    }

    /// Resolves a reference through at most one level of indirection.
    pub fn resolve(&self, name: &str) -> Result<ObjectId> {
        let target = match self.get(name)? {
            Reference::Direct(id) => return Ok(id),
            Reference::Symbolic(target) => target,
        };
        self.get(&target)?.as_direct().ok_or_else(|| {
            StorageError::InvalidObject("deeply nested symbolic refs not supported".to_string())
        })
    }

    /// Gets the current branch name (if HEAD is symbolic).
    pub fn current_branch(&self) -> Option<String> {
        match self.get("HEAD").ok()? {
            Reference::Symbolic(target) => {
                target.strip_prefix("refs/heads/").map(|s| s.to_string())
            }
            Reference::Direct(_) => None,
        }
    }

    /// Returns the root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }
}
