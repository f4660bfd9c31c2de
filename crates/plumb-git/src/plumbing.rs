//! Repository-level operations behind the command line.
//!
//! Each function takes the repository (or its object store) explicitly;
//! rendering and process exit codes are left to the caller.

use crate::checkout::{checkout, read_kind};
use crate::commit::{Commit, Signature};
use crate::pack::unpack;
use crate::protocol::{Transport, UploadPackClient};
use crate::tree::{format_entry, Tree, TreeEntry};
use crate::worktree::WorkingTreeBuilder;
use crate::{GitError, Result};
use plumb_storage::{GitObject, ObjectId, ObjectStore, ObjectType, Repository};
use std::path::Path;

/// Default metadata directory name.
pub const DEFAULT_METADATA_DIR: &str = ".git";
/// Default branch for new repositories and clones.
pub const DEFAULT_BRANCH: &str = "main";

/// Creates (or re-initialises) a repository whose metadata lives in `git_dir`.
pub fn init(git_dir: &Path, default_branch: &str) -> Result<Repository> {
    Ok(Repository::init(git_dir, default_branch)?)
}

/// Computes the blob id of `contents`, storing it only when `write` is set.
pub fn hash_object(store: &ObjectStore, contents: &[u8], write: bool) -> Result<ObjectId> {
    if write {
        Ok(store.write(ObjectType::Blob, contents)?)
    } else {
        Ok(ObjectStore::hash(ObjectType::Blob, contents))
    }
}

/// Reads an object by hex digest.
pub fn cat_file(store: &ObjectStore, hex: &str) -> Result<GitObject> {
    Ok(store.read_hex(hex)?)
}

/// Renders an object for `cat-file -p`.
///
/// Trees are listed one entry per line; every other kind is its raw payload.
pub fn pretty_print(object: &GitObject) -> Result<Vec<u8>> {
    match object.object_type {
        ObjectType::Tree => {
            let tree = Tree::decode(&object.data)?;
            let mut out = String::new();
            for entry in &tree.entries {
                out.push_str(&format_entry(entry, false));
                out.push('\n');
            }
            Ok(out.into_bytes())
        }
        _ => Ok(object.data.to_vec()),
    }
}

/// Decodes the tree named by `hex`.
pub fn list_tree(store: &ObjectStore, hex: &str) -> Result<Vec<TreeEntry>> {
    let id = ObjectId::from_hex(hex)?;
    let object = read_kind(store, &id, ObjectType::Tree)?;
    Ok(Tree::decode(&object.data)?.entries)
}

/// Snapshots `root` into tree objects, skipping `metadata_dir`.
pub fn write_tree(store: &ObjectStore, root: &Path, metadata_dir: &str) -> Result<ObjectId> {
    WorkingTreeBuilder::new(store, metadata_dir).build(root)
}

/// Writes a commit for an existing tree.
pub fn commit_tree(
    store: &ObjectStore,
    tree_hex: &str,
    parent_hex: Option<&str>,
    message: &str,
    signature: &Signature,
) -> Result<ObjectId> {
    let tree = ObjectId::from_hex(tree_hex)?;
    read_kind(store, &tree, ObjectType::Tree)?;

    let parent = parent_hex.map(ObjectId::from_hex).transpose()?;
    if let Some(parent) = &parent {
        read_kind(store, parent, ObjectType::Commit)?;
    }

    let commit = Commit::build(tree, parent, message, signature);
    let id = store.write(ObjectType::Commit, &commit.encode())?;
    tracing::info!(id = %id, tree = %tree, "wrote commit");
    Ok(id)
}

/// Options for [`clone`].
#[derive(Debug, Clone)]
pub struct CloneOptions {
    /// Branch to check out; defaults to the remote HEAD.
    pub branch: Option<String>,
    /// Branch used when the remote does not advertise its HEAD.
    pub default_branch: String,
    /// Name of the metadata directory inside the destination.
    pub metadata_dir: String,
}

impl Default for CloneOptions {
    fn default() -> Self {
        Self {
            branch: None,
            default_branch: DEFAULT_BRANCH.to_string(),
            metadata_dir: DEFAULT_METADATA_DIR.to_string(),
        }
    }
}

/// Summary of a finished clone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloneOutcome {
    /// Branch checked out.
    pub branch: String,
    /// Commit checked out.
    pub commit: ObjectId,
    /// Objects received in the pack.
    pub objects: usize,
    /// Files written to the working tree.
    pub files: usize,
}

/// Derives a destination directory name from a remote URL.
///
/// `https://host/team/project.git/` becomes `project`.
pub fn default_clone_dir(url: &str) -> Option<String> {
    let last = url.trim_end_matches('/').rsplit('/').next()?;
    let name = last.strip_suffix(".git").unwrap_or(last);
    if name.is_empty() || name.contains(':') {
        None
    } else {
        Some(name.to_string())
    }
}

/// Clones the remote at `url` into `dest`.
///
/// `dest` must not be a non-empty directory. A failed clone leaves
/// whatever it had already written.
pub fn clone(
    transport: &dyn Transport,
    url: &str,
    dest: &Path,
    options: &CloneOptions,
) -> Result<CloneOutcome> {
    if dest.exists() && std::fs::read_dir(dest)?.next().is_some() {
        return Err(GitError::Io(std::io::Error::new(
            std::io::ErrorKind::AlreadyExists,
            format!("destination {} is not empty", dest.display()),
        )));
    }
    std::fs::create_dir_all(dest)?;

    let repo = Repository::init(dest.join(&options.metadata_dir), &options.default_branch)?;
    tracing::info!(url, dest = %dest.display(), "cloning");

    let client = UploadPackClient::new(transport, url);
    let advertisement = client.discover_refs()?;
    let (branch, commit) =
        advertisement.select_branch(options.branch.as_deref(), &options.default_branch)?;

    let pack = client.fetch_pack(&commit)?;
    let objects = unpack(&pack, &repo.objects)?.len();

    repo.refs.write_ref(&format!("refs/heads/{branch}"), commit)?;
    repo.refs.set_head(&branch)?;

    let head = repo.refs.resolve("HEAD")?;
    let branch = repo.refs.current_branch().unwrap_or(branch);
    tracing::debug!(branch = %branch, head = %head, "updated HEAD");

    let files = checkout(&repo.objects, &head, dest, &options.metadata_dir)?;
    Ok(CloneOutcome {
        branch,
        commit: head,
        objects,
        files,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use plumb_storage::StorageError;
    use tempfile::TempDir;

    fn repo() -> (TempDir, Repository) {
        let dir = TempDir::new().unwrap();
        let repo = init(&dir.path().join(".git"), DEFAULT_BRANCH).unwrap();
        (dir, repo)
    }

    #[test]
    fn test_hash_object_without_write() {
        let (_dir, repo) = repo();
        let id = hash_object(&repo.objects, b"hello\n", false).unwrap();
        assert_eq!(id.to_hex(), "ce013625030ba8dba906f756967f9e9ca394464a");
        assert!(!repo.objects.exists(&id));
    }

    #[test]
    fn test_hash_object_write_then_cat() {
        let (_dir, repo) = repo();
        let id = hash_object(&repo.objects, b"hello\n", true).unwrap();

        let object = cat_file(&repo.objects, &id.to_hex()).unwrap();
        assert_eq!(object.object_type, ObjectType::Blob);
        assert_eq!(pretty_print(&object).unwrap(), b"hello\n");
    }

    #[test]
    fn test_cat_file_errors() {
        let (_dir, repo) = repo();
        assert!(matches!(
            cat_file(&repo.objects, "abc"),
            Err(GitError::Storage(StorageError::InvalidArgument(_)))
        ));
        assert!(matches!(
            cat_file(&repo.objects, &"0".repeat(40)),
            Err(GitError::Storage(StorageError::NotFound(_)))
        ));
    }

    #[test]
    fn test_write_tree_list_and_pretty_print() {
        let (dir, repo) = repo();
        std::fs::write(dir.path().join("b.txt"), b"b").unwrap();
        std::fs::create_dir(dir.path().join("a")).unwrap();
        std::fs::write(dir.path().join("a/x"), b"x").unwrap();

        let tree = write_tree(&repo.objects, dir.path(), DEFAULT_METADATA_DIR).unwrap();
        let entries = list_tree(&repo.objects, &tree.to_hex()).unwrap();
        let names: Vec<_> = entries.iter().map(|e| e.name_lossy()).collect();
        assert_eq!(names, ["a", "b.txt"]);

        let printed = pretty_print(&cat_file(&repo.objects, &tree.to_hex()).unwrap()).unwrap();
        let printed = String::from_utf8(printed).unwrap();
        assert!(printed.starts_with("040000 tree "));
        assert!(printed.ends_with("\tb.txt\n"));
    }

    #[test]
    fn test_list_tree_rejects_blob() {
        let (_dir, repo) = repo();
        let blob = hash_object(&repo.objects, b"data", true).unwrap();
        assert!(matches!(
            list_tree(&repo.objects, &blob.to_hex()),
            Err(GitError::UnexpectedKind { .. })
        ));
    }

    #[test]
    fn test_commit_tree_is_deterministic() {
        let (dir, repo) = repo();
        std::fs::write(dir.path().join("f"), b"f").unwrap();
        let tree = write_tree(&repo.objects, dir.path(), DEFAULT_METADATA_DIR).unwrap();
        let sig = Signature::default();

        let first = commit_tree(&repo.objects, &tree.to_hex(), None, "init", &sig).unwrap();
        let again = commit_tree(&repo.objects, &tree.to_hex(), None, "init", &sig).unwrap();
        assert_eq!(first, again);

        let child =
            commit_tree(&repo.objects, &tree.to_hex(), Some(&first.to_hex()), "next", &sig)
                .unwrap();
        let decoded = Commit::decode(&cat_file(&repo.objects, &child.to_hex()).unwrap().data)
            .unwrap();
        assert_eq!(decoded.parents, vec![first]);
        assert_eq!(decoded.message, b"next\n");
    }

    #[test]
    fn test_commit_tree_checks_kinds() {
        let (_dir, repo) = repo();
        let blob = hash_object(&repo.objects, b"data", true).unwrap();
        assert!(commit_tree(&repo.objects, &blob.to_hex(), None, "m", &Signature::default())
            .is_err());
    }

    #[test]
    fn test_default_clone_dir() {
        assert_eq!(
            default_clone_dir("https://example.com/team/project.git"),
            Some("project".to_string())
        );
        assert_eq!(
            default_clone_dir("https://example.com/team/project/"),
            Some("project".to_string())
        );
        assert_eq!(default_clone_dir("https://"), None);
        assert_eq!(default_clone_dir(""), None);
    }

    #[test]
    fn test_clone_refuses_non_empty_destination() {
        struct Unreachable;
        impl Transport for Unreachable {
            fn get(&self, _url: &str) -> Result<Vec<u8>> {
                Err(GitError::Protocol("should not be called".to_string()))
            }
            fn post(&self, _url: &str, _ct: &str, _body: Vec<u8>) -> Result<Vec<u8>> {
                Err(GitError::Protocol("should not be called".to_string()))
            }
        }

        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("existing"), b"x").unwrap();
        let err = clone(&Unreachable, "https://h/r.git", dir.path(), &CloneOptions::default())
            .unwrap_err();
        assert!(matches!(err, GitError::Io(e) if e.kind() == std::io::ErrorKind::AlreadyExists));
    }
}
