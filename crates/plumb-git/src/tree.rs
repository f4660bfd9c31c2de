//! Tree object encoding and decoding.
//!
//! A tree payload is a concatenation of `"<mode> <name>\0<20-byte id>"`
//! entries. File modes are written with six digits, subtrees with five
//! (`40000`), exactly as git hashes them.

use crate::{GitError, Result};
use plumb_storage::{ObjectId, ObjectType};
use std::borrow::Cow;
use std::fmt;

/// Mode of a tree entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileMode {
    /// Regular, non-executable file.
    Regular,
    /// Executable file.
    Executable,
    /// Symbolic link; the blob holds the link target.
    Symlink,
    /// Subdirectory.
    Tree,
    /// Submodule commit reference.
    Gitlink,
}

impl FileMode {
    /// Returns the mode as written inside tree objects.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Regular => "100644",
            Self::Executable => "100755",
            Self::Symlink => "120000",
            Self::Tree => "40000",
            Self::Gitlink => "160000",
        }
    }

    /// Parses a mode string from a tree entry.
    pub fn parse(s: &[u8]) -> Result<Self> {
        match s {
            b"100644" => Ok(Self::Regular),
            b"100755" => Ok(Self::Executable),
            b"120000" => Ok(Self::Symlink),
            b"40000" | b"040000" => Ok(Self::Tree),
            b"160000" => Ok(Self::Gitlink),
            _ => Err(GitError::InvalidTree(format!(
                "unknown mode: {}",
                String::from_utf8_lossy(s)
            ))),
        }
    }

    /// Returns the kind of object this entry points at.
    pub fn object_type(&self) -> ObjectType {
        match self {
            Self::Tree => ObjectType::Tree,
            Self::Gitlink => ObjectType::Commit,
            Self::Regular | Self::Executable | Self::Symlink => ObjectType::Blob,
        }
    }

    /// Returns true for entries that are checked out as files.
    pub fn is_file(&self) -> bool {
        matches!(self, Self::Regular | Self::Executable | Self::Symlink)
    }
}

impl fmt::Display for FileMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single entry of a tree object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    /// Entry mode.
    pub mode: FileMode,
    /// Path segment as raw bytes, never containing a separator.
    ///
    /// Names are not required to be UTF-8.
    pub name: Vec<u8>,
    /// Target object.
    pub id: ObjectId,
}

impl TreeEntry {
    /// Creates a new tree entry.
    pub fn new(mode: FileMode, name: impl Into<Vec<u8>>, id: ObjectId) -> Self {
        Self {
            mode,
            name: name.into(),
            id,
        }
    }

    /// Returns the name for display, replacing invalid UTF-8.
    pub fn name_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.name)
    }
}

/// A decoded tree object.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tree {
    /// Entries in payload order.
    pub entries: Vec<TreeEntry>,
}

impl Tree {
    /// Wraps entries that are already in name order.
    pub fn new(entries: Vec<TreeEntry>) -> Self {
        Self { entries }
    }

    /// Encodes the entries in their current order.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.entries.len() * 48);
        for entry in &self.entries {
            out.extend_from_slice(entry.mode.as_str().as_bytes());
            out.push(b' ');
            out.extend_from_slice(&entry.name);
            out.push(0);
            out.extend_from_slice(entry.id.as_bytes());
        }
        out
    }

    /// Decodes a tree payload.
    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut entries = Vec::new();
        let mut rest = data;

        while !rest.is_empty() {
            let space = rest
                .iter()
                .position(|&b| b == b' ')
                .ok_or_else(|| GitError::InvalidTree("missing space after mode".to_string()))?;
            let mode = FileMode::parse(&rest[..space])?;

            let after_mode = &rest[space + 1..];
            let nul = after_mode
                .iter()
                .position(|&b| b == 0)
                .ok_or_else(|| GitError::InvalidTree("missing NUL after name".to_string()))?;
            let name = &after_mode[..nul];
            validate_name(name)?;

            let id_start = nul + 1;
            let id_bytes = after_mode
                .get(id_start..id_start + ObjectId::LEN)
                .ok_or_else(|| {
                    GitError::InvalidTree(format!(
                        "truncated id for {:?}",
                        String::from_utf8_lossy(name)
                    ))
                })?;

            entries.push(TreeEntry::new(mode, name, ObjectId::from_slice(id_bytes)?));
            rest = &after_mode[id_start + ObjectId::LEN..];
        }

        Ok(Self { entries })
    }
}

fn validate_name(name: &[u8]) -> Result<()> {
    if name.is_empty() || name == b"." || name == b".." || name.contains(&b'/') {
        return Err(GitError::InvalidTree(format!(
            "invalid entry name: {:?}",
            String::from_utf8_lossy(name)
        )));
    }
    Ok(())
}

/// Renders one entry the way `ls-tree` prints it.
pub fn format_entry(entry: &TreeEntry, name_only: bool) -> String {
    if name_only {
        entry.name_lossy().into_owned()
    } else {
        format!(
            "{:0>6} {} {}\t{}",
            entry.mode.as_str(),
            entry.mode.object_type(),
            entry.id,
            entry.name_lossy()
        )
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn entry() -> impl Strategy<Value = TreeEntry> {
        (
            prop_oneof![
                Just(FileMode::Regular),
                Just(FileMode::Executable),
                Just(FileMode::Symlink),
                Just(FileMode::Tree),
            ],
            "[a-zA-Z0-9_.-]{1,16}",
            any::<[u8; 20]>(),
        )
            .prop_filter("dot names are reserved", |(_, name, _)| {
                name != "." && name != ".."
            })
            .prop_map(|(mode, name, bytes)| TreeEntry::new(mode, name, ObjectId::from_bytes(bytes)))
    }

    proptest! {
        /// Property: encode(decode(encode(entries))) == encode(entries)
        #[test]
        fn prop_tree_reencode_stable(mut entries in prop::collection::vec(entry(), 0..32)) {
            entries.sort_by(|a, b| a.name.cmp(&b.name));
            entries.dedup_by(|a, b| a.name == b.name);

            let encoded = Tree::new(entries).encode();
            let decoded = Tree::decode(&encoded).unwrap();
            prop_assert_eq!(decoded.encode(), encoded);
        }

        /// Property: decoding arbitrary bytes never panics
        #[test]
        fn prop_decode_no_panic(data in prop::collection::vec(any::<u8>(), 0..512)) {
            let _ = Tree::decode(&data);
        }
    }
}
