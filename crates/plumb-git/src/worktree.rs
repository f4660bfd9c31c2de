//! Snapshotting a directory into tree objects.

use crate::tree::{FileMode, Tree, TreeEntry};
use crate::Result;
use plumb_storage::{ObjectId, ObjectStore, ObjectType};
use std::ffi::OsString;
use std::fs::Metadata;
use std::path::Path;

/// Writes blobs and trees for a directory hierarchy.
pub struct WorkingTreeBuilder<'a> {
    store: &'a ObjectStore,
    metadata_dir: &'a str,
}

impl<'a> WorkingTreeBuilder<'a> {
    /// Creates a builder that skips directories named `metadata_dir`.
    pub fn new(store: &'a ObjectStore, metadata_dir: &'a str) -> Self {
        Self {
            store,
            metadata_dir,
        }
    }

    /// Writes the tree for `root` and everything below it, returning the root tree id.
    pub fn build(&self, root: &Path) -> Result<ObjectId> {
        let mut entries = Vec::new();

        for dir_entry in std::fs::read_dir(root)? {
            let dir_entry = dir_entry?;
            let name = name_bytes(dir_entry.file_name())?;
            let path = dir_entry.path();
            let metadata = std::fs::symlink_metadata(&path)?;
            let file_type = metadata.file_type();

            let entry = if file_type.is_dir() {
                if name == self.metadata_dir.as_bytes() {
                    continue;
                }
                TreeEntry::new(FileMode::Tree, name, self.build(&path)?)
            } else if file_type.is_symlink() {
                let target = link_target_bytes(&path)?;
                let id = self.store.write(ObjectType::Blob, &target)?;
                TreeEntry::new(FileMode::Symlink, name, id)
            } else if file_type.is_file() {
                let contents = std::fs::read(&path)?;
                let id = self.store.write(ObjectType::Blob, &contents)?;
                TreeEntry::new(file_mode(&metadata), name, id)
            } else {
                tracing::warn!(path = %path.display(), "skipping special file");
                continue;
            };
            entries.push(entry);
        }

        entries.sort_by(|a, b| a.name.cmp(&b.name));

        let tree = Tree::new(entries);
        let id = self.store.write(ObjectType::Tree, &tree.encode())?;
        tracing::debug!(id = %id, path = %root.display(), entries = tree.entries.len(), "wrote tree");
        Ok(id)
    }
}

#[cfg(unix)]
fn name_bytes(name: OsString) -> Result<Vec<u8>> {
    use std::os::unix::ffi::OsStringExt;
    Ok(name.into_vec())
}

#[cfg(not(unix))]
fn name_bytes(name: OsString) -> Result<Vec<u8>> {
    name.into_string()
        .map(String::into_bytes)
        .map_err(|raw| crate::GitError::InvalidTree(format!("file name is not unicode: {raw:?}")))
}

#[cfg(unix)]
fn file_mode(metadata: &Metadata) -> FileMode {
    use std::os::unix::fs::PermissionsExt;
    if metadata.permissions().mode() & 0o111 != 0 {
        FileMode::Executable
    } else {
        FileMode::Regular
    }
}

#[cfg(not(unix))]
fn file_mode(_metadata: &Metadata) -> FileMode {
    FileMode::Regular
}

#[cfg(unix)]
fn link_target_bytes(path: &Path) -> Result<Vec<u8>> {
    use std::os::unix::ffi::OsStrExt;
    Ok(std::fs::read_link(path)?.as_os_str().as_bytes().to_vec())
}

#[cfg(not(unix))]
fn link_target_bytes(path: &Path) -> Result<Vec<u8>> {
    Ok(std::fs::read_link(path)?
        .to_string_lossy()
        .into_owned()
        .into_bytes())
}
