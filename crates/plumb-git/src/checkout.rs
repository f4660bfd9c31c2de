//! Materializing a commit's tree into a directory.

use crate::commit::Commit;
use crate::tree::{FileMode, Tree};
use crate::{GitError, Result};
use plumb_storage::{GitObject, ObjectId, ObjectStore, ObjectType};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Entry name that is never written, whatever the metadata directory is called.
const GIT_DIR_NAME: &[u8] = b".git";

/// Reads an object and checks its kind.
pub fn read_kind(store: &ObjectStore, id: &ObjectId, expected: ObjectType) -> Result<GitObject> {
    let object = store.read(id)?;
    if object.object_type != expected {
        return Err(GitError::UnexpectedKind {
            id: *id,
            expected,
            found: object.object_type,
        });
    }
    Ok(object)
}

/// Writes the tree of `commit_id` under `root`, returning the number of files written.
///
/// Entries named `.git` or `metadata_dir` (compared ASCII case-insensitively)
/// and trees that repeat a name are rejected before anything in that tree
/// is written.
pub fn checkout(
    store: &ObjectStore,
    commit_id: &ObjectId,
    root: &Path,
    metadata_dir: &str,
) -> Result<usize> {
    let commit = read_kind(store, commit_id, ObjectType::Commit)?;
    let commit = Commit::decode(&commit.data)?;

    let files = checkout_tree(store, &commit.tree, root, metadata_dir)?;
    tracing::info!(commit = %commit_id, files, root = %root.display(), "checked out");
    Ok(files)
}

/// Writes a tree under `dir`, creating it if needed.
pub fn checkout_tree(
    store: &ObjectStore,
    tree_id: &ObjectId,
    dir: &Path,
    metadata_dir: &str,
) -> Result<usize> {
    let tree = read_kind(store, tree_id, ObjectType::Tree)?;
    let tree = Tree::decode(&tree.data)?;

    let mut seen = HashSet::with_capacity(tree.entries.len());
    for entry in &tree.entries {
        let reserved = [GIT_DIR_NAME, metadata_dir.as_bytes()];
        if reserved.iter().any(|r| entry.name.eq_ignore_ascii_case(r)) {
            return Err(GitError::InvalidTree(format!(
                "refusing to check out reserved name {:?} in tree {tree_id}",
                entry.name_lossy()
            )));
        }
        if !seen.insert(entry.name.as_slice()) {
            return Err(GitError::InvalidTree(format!(
                "duplicate entry {:?} in tree {tree_id}",
                entry.name_lossy()
            )));
        }
    }

    std::fs::create_dir_all(dir)?;
    let mut files = 0;
    for entry in &tree.entries {
        let path = entry_path(dir, &entry.name)?;
        match entry.mode {
            FileMode::Tree => files += checkout_tree(store, &entry.id, &path, metadata_dir)?,
            FileMode::Gitlink => {
                // submodule contents are not fetched
                std::fs::create_dir_all(&path)?;
            }
            FileMode::Symlink => {
                let blob = read_kind(store, &entry.id, ObjectType::Blob)?;
                write_symlink(&blob.data, &path)?;
                files += 1;
            }
            FileMode::Regular | FileMode::Executable => {
                let blob = read_kind(store, &entry.id, ObjectType::Blob)?;
                std::fs::write(&path, &blob.data)?;
                if entry.mode == FileMode::Executable {
                    set_executable(&path)?;
                }
                tracing::debug!(path = %path.display(), id = %entry.id, "wrote file");
                files += 1;
            }
        }
    }
    Ok(files)
}

#[cfg(unix)]
fn entry_path(dir: &Path, name: &[u8]) -> Result<PathBuf> {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;
    Ok(dir.join(OsStr::from_bytes(name)))
}

#[cfg(not(unix))]
fn entry_path(dir: &Path, name: &[u8]) -> Result<PathBuf> {
    let name = std::str::from_utf8(name).map_err(|_| {
        GitError::InvalidTree(format!(
            "entry name {:?} is not representable here",
            String::from_utf8_lossy(name)
        ))
    })?;
    Ok(dir.join(name))
}

#[cfg(unix)]
fn set_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))?;
    Ok(())
}

#[cfg(not(unix))]
fn set_executable(_path: &Path) -> Result<()> {
    Ok(())
}

#[cfg(unix)]
fn write_symlink(target: &[u8], path: &Path) -> Result<()> {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;
    std::os::unix::fs::symlink(OsStr::from_bytes(target), path)?;
    Ok(())
}

#[cfg(not(unix))]
fn write_symlink(target: &[u8], path: &Path) -> Result<()> {
    // no portable symlinks; keep the target as file contents like git does
    std::fs::write(path, target)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commit::Signature;
    use crate::tree::TreeEntry;
    use crate::worktree::WorkingTreeBuilder;
    use tempfile::TempDir;

    fn commit_tree(store: &ObjectStore, tree: ObjectId) -> ObjectId {
        let commit = Commit::build(tree, None, "snapshot", &Signature::default());
        store.write(ObjectType::Commit, &commit.encode()).unwrap()
    }

    #[test]
    fn test_checkout_nested() {
        let dir = TempDir::new().unwrap();
        let store = ObjectStore::new(dir.path().join("objects"));

        let readme = store.write(ObjectType::Blob, b"# readme\n").unwrap();
        let lib = store.write(ObjectType::Blob, b"fn main() {}\n").unwrap();
        let src = Tree::new(vec![TreeEntry::new(FileMode::Regular, "lib.rs", lib)]);
        let src_id = store.write(ObjectType::Tree, &src.encode()).unwrap();
        let root = Tree::new(vec![
            TreeEntry::new(FileMode::Regular, "README.md", readme),
            TreeEntry::new(FileMode::Tree, "src", src_id),
        ]);
        let root_id = store.write(ObjectType::Tree, &root.encode()).unwrap();
        let commit = commit_tree(&store, root_id);

        let out = dir.path().join("out");
        assert_eq!(checkout(&store, &commit, &out, ".git").unwrap(), 2);
        assert_eq!(std::fs::read(out.join("README.md")).unwrap(), b"# readme\n");
        assert_eq!(std::fs::read(out.join("src/lib.rs")).unwrap(), b"fn main() {}\n");
    }

    #[test]
    fn test_checkout_requires_commit() {
        let dir = TempDir::new().unwrap();
        let store = ObjectStore::new(dir.path().join("objects"));
        let blob = store.write(ObjectType::Blob, b"not a commit").unwrap();

        let err = checkout(&store, &blob, &dir.path().join("out"), ".git").unwrap_err();
        assert!(matches!(
            err,
            GitError::UnexpectedKind {
                expected: ObjectType::Commit,
                found: ObjectType::Blob,
                ..
            }
        ));
    }

    #[test]
    fn test_checkout_file_entry_must_be_blob() {
        let dir = TempDir::new().unwrap();
        let store = ObjectStore::new(dir.path().join("objects"));
        let empty = store.write(ObjectType::Tree, b"").unwrap();
        let bad = Tree::new(vec![TreeEntry::new(FileMode::Regular, "file", empty)]);
        let bad_id = store.write(ObjectType::Tree, &bad.encode()).unwrap();
        let commit = commit_tree(&store, bad_id);

        assert!(matches!(
            checkout(&store, &commit, &dir.path().join("out"), ".git"),
            Err(GitError::UnexpectedKind { .. })
        ));
    }

    #[test]
    fn test_checkout_missing_blob() {
        let dir = TempDir::new().unwrap();
        let store = ObjectStore::new(dir.path().join("objects"));
        let tree = Tree::new(vec![TreeEntry::new(
            FileMode::Regular,
            "gone",
            ObjectId::from_bytes([7; 20]),
        )]);
        let tree_id = store.write(ObjectType::Tree, &tree.encode()).unwrap();
        let commit = commit_tree(&store, tree_id);

        assert!(matches!(
            checkout(&store, &commit, &dir.path().join("out"), ".git"),
            Err(GitError::Storage(_))
        ));
    }

    #[test]
    fn test_gitlink_becomes_empty_dir() {
        let dir = TempDir::new().unwrap();
        let store = ObjectStore::new(dir.path().join("objects"));
        let tree = Tree::new(vec![TreeEntry::new(
            FileMode::Gitlink,
            "vendor",
            ObjectId::from_bytes([3; 20]),
        )]);
        let tree_id = store.write(ObjectType::Tree, &tree.encode()).unwrap();

        let out = dir.path().join("out");
        assert_eq!(checkout_tree(&store, &tree_id, &out, ".git").unwrap(), 0);
        assert!(out.join("vendor").is_dir());
    }

    fn write_tree(store: &ObjectStore, entries: Vec<TreeEntry>) -> ObjectId {
        store.write(ObjectType::Tree, &Tree::new(entries).encode()).unwrap()
    }

    #[test]
    fn test_refuses_metadata_dir_entries() {
        let dir = TempDir::new().unwrap();
        let store = ObjectStore::new(dir.path().join("objects"));
        let work = dir.path().join("work");
        std::fs::create_dir_all(work.join(".git")).unwrap();
        std::fs::write(work.join(".git/HEAD"), b"ref: refs/heads/main\n").unwrap();

        let head = store.write(ObjectType::Blob, b"ref: refs/heads/pwned\n").unwrap();
        let inner = write_tree(&store, vec![TreeEntry::new(FileMode::Regular, "HEAD", head)]);

        for (name, metadata_dir) in [(".git", ".git"), (".GIT", ".git"), (".Plumb", ".plumb")] {
            let root = write_tree(&store, vec![TreeEntry::new(FileMode::Tree, name, inner)]);
            let commit = commit_tree(&store, root);

            let err = checkout(&store, &commit, &work, metadata_dir).unwrap_err();
            assert!(matches!(err, GitError::InvalidTree(_)), "accepted {name:?}");
        }
        assert_eq!(
            std::fs::read(work.join(".git/HEAD")).unwrap(),
            b"ref: refs/heads/main\n"
        );
    }

    #[test]
    fn test_refuses_duplicate_names() {
        let dir = TempDir::new().unwrap();
        let store = ObjectStore::new(dir.path().join("objects"));
        let outside = dir.path().join("outside");
        std::fs::create_dir(&outside).unwrap();

        let target = store
            .write(ObjectType::Blob, outside.to_string_lossy().as_bytes())
            .unwrap();
        let payload = store.write(ObjectType::Blob, b"escaped").unwrap();
        let sub = write_tree(&store, vec![TreeEntry::new(FileMode::Regular, "file", payload)]);
        let root = write_tree(
            &store,
            vec![
                TreeEntry::new(FileMode::Symlink, "docs", target),
                TreeEntry::new(FileMode::Tree, "docs", sub),
            ],
        );
        let commit = commit_tree(&store, root);

        let out = dir.path().join("out");
        assert!(matches!(
            checkout(&store, &commit, &out, ".git"),
            Err(GitError::InvalidTree(_))
        ));
        assert!(!outside.join("file").exists());
        assert!(!out.join("docs").exists());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_non_utf8_names_round_trip() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let dir = TempDir::new().unwrap();
        let work = dir.path().join("work");
        std::fs::create_dir(&work).unwrap();
        std::fs::write(work.join(OsStr::from_bytes(b"caf\xe9.txt")), b"latin-1").unwrap();

        let store = ObjectStore::new(dir.path().join("objects"));
        let tree = WorkingTreeBuilder::new(&store, ".git").build(&work).unwrap();
        let commit = commit_tree(&store, tree);

        let out = dir.path().join("out");
        assert_eq!(checkout(&store, &commit, &out, ".git").unwrap(), 1);
        assert_eq!(
            std::fs::read(out.join(OsStr::from_bytes(b"caf\xe9.txt"))).unwrap(),
            b"latin-1"
        );
        assert_eq!(
            WorkingTreeBuilder::new(&store, ".git").build(&out).unwrap(),
            tree
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_snapshot_then_checkout_preserves_modes() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let work = dir.path().join("work");
        std::fs::create_dir_all(work.join("bin")).unwrap();
        std::fs::write(work.join("bin/tool"), b"#!/bin/sh\necho hi\n").unwrap();
        std::fs::set_permissions(
            work.join("bin/tool"),
            std::fs::Permissions::from_mode(0o755),
        )
        .unwrap();
        std::fs::write(work.join("notes.txt"), b"notes").unwrap();
        std::os::unix::fs::symlink("notes.txt", work.join("latest")).unwrap();

        let store = ObjectStore::new(dir.path().join("objects"));
        let tree = WorkingTreeBuilder::new(&store, ".git").build(&work).unwrap();
        let commit = commit_tree(&store, tree);

        let out = dir.path().join("out");
        assert_eq!(checkout(&store, &commit, &out, ".git").unwrap(), 3);

        let mode = std::fs::metadata(out.join("bin/tool")).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
        assert_eq!(
            std::fs::read_link(out.join("latest")).unwrap(),
            Path::new("notes.txt")
        );
        assert_eq!(std::fs::read(out.join("latest")).unwrap(), b"notes");

        // the checked out copy hashes back to the same tree
        let again = WorkingTreeBuilder::new(&store, ".git").build(&out).unwrap();
        assert_eq!(again, tree);
    }
}
