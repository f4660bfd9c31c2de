//! Commit object encoding and decoding.

use crate::{GitError, Result};
use plumb_storage::ObjectId;

/// Author or committer identity with a timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    /// Display name.
    pub name: String,
    /// Email address, without angle brackets.
    pub email: String,
    /// Seconds since the Unix epoch.
    pub timestamp: i64,
    /// Timezone offset as written by git, e.g. `+0000`.
    pub tz_offset: String,
}

impl Signature {
    /// Name used when none is configured.
    pub const DEFAULT_NAME: &'static str = "plumb";
    /// Email used when none is configured.
    pub const DEFAULT_EMAIL: &'static str = "plumb@example.com";
    /// Fixed timestamp so identical inputs always produce identical commits.
    pub const DEFAULT_TIMESTAMP: i64 = 1_620_000_000;

    /// Creates a signature with the fixed default timestamp.
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            timestamp: Self::DEFAULT_TIMESTAMP,
            tz_offset: "+0000".to_string(),
        }
    }

    fn encode(&self) -> String {
        format!(
            "{} <{}> {} {}",
            self.name, self.email, self.timestamp, self.tz_offset
        )
    }

    fn decode(line: &str) -> Result<Self> {
        let bad = || GitError::InvalidCommit(format!("malformed signature: {line}"));

        let open = line.find('<').ok_or_else(bad)?;
        let close = line[open..].find('>').map(|i| open + i).ok_or_else(bad)?;
        let name = line[..open].trim_end().to_string();
        let email = line[open + 1..close].to_string();

        let mut when = line[close + 1..].split_whitespace();
        let timestamp = when
            .next()
            .and_then(|t| t.parse().ok())
            .ok_or_else(bad)?;
        let tz_offset = when.next().ok_or_else(bad)?.to_string();

        Ok(Self {
            name,
            email,
            timestamp,
            tz_offset,
        })
    }
}

impl Default for Signature {
    fn default() -> Self {
        Self::new(Self::DEFAULT_NAME, Self::DEFAULT_EMAIL)
    }
}

/// A commit object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit {
    /// Root tree.
    pub tree: ObjectId,
    /// Parent commits, in order.
    pub parents: Vec<ObjectId>,
    /// Author.
    pub author: Signature,
    /// Committer.
    pub committer: Signature,
    /// Message bytes, including the trailing newline; not required to be UTF-8.
    pub message: Vec<u8>,
}

impl Commit {
    /// Builds a commit with author and committer set to the same identity.
    ///
    /// A trailing newline is appended to the message.
    pub fn build(
        tree: ObjectId,
        parent: Option<ObjectId>,
        message: &str,
        signature: &Signature,
    ) -> Self {
        Self {
            tree,
            parents: parent.into_iter().collect(),
            author: signature.clone(),
            committer: signature.clone(),
            message: format!("{message}\n").into_bytes(),
        }
    }

    /// Encodes the commit payload.
    pub fn encode(&self) -> Vec<u8> {
        let mut content = format!("tree {}\n", self.tree);
        for parent in &self.parents {
            content.push_str(&format!("parent {}\n", parent));
        }
        content.push_str(&format!("author {}\n", self.author.encode()));
        content.push_str(&format!("committer {}\n", self.committer.encode()));
        content.push('\n');

        let mut out = content.into_bytes();
        out.extend_from_slice(&self.message);
        out
    }

    /// Decodes a commit payload.
    ///
    /// Headers other than tree, parent, author and committer (e.g. `gpgsig`
    /// and its continuation lines) are skipped. Signatures in a legacy
    /// encoding are decoded lossily; the message is kept as is.
    pub fn decode(data: &[u8]) -> Result<Self> {
        let split = data
            .windows(2)
            .position(|w| w == b"\n\n")
            .ok_or_else(|| GitError::InvalidCommit("missing blank line before message".to_string()))?;
        let headers = &data[..split];
        let message = &data[split + 2..];

        let mut tree = None;
        let mut parents = Vec::new();
        let mut author = None;
        let mut committer = None;

        for line in headers.split(|&b| b == b'\n') {
            if let Some(hex) = line.strip_prefix(b"tree ") {
                tree = Some(header_id(hex)?);
            } else if let Some(hex) = line.strip_prefix(b"parent ") {
                parents.push(header_id(hex)?);
            } else if let Some(sig) = line.strip_prefix(b"author ") {
                author = Some(Signature::decode(&String::from_utf8_lossy(sig))?);
            } else if let Some(sig) = line.strip_prefix(b"committer ") {
                committer = Some(Signature::decode(&String::from_utf8_lossy(sig))?);
            }
        }

        Ok(Self {
            tree: tree.ok_or_else(|| GitError::InvalidCommit("missing tree".to_string()))?,
            parents,
            author: author.ok_or_else(|| GitError::InvalidCommit("missing author".to_string()))?,
            committer: committer
                .ok_or_else(|| GitError::InvalidCommit("missing committer".to_string()))?,
            message: message.to_vec(),
        })
    }
}

fn header_id(hex: &[u8]) -> Result<ObjectId> {
    let hex = std::str::from_utf8(hex)
        .map_err(|_| GitError::InvalidCommit("object id is not hex".to_string()))?;
    Ok(ObjectId::from_hex(hex)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use plumb_storage::ObjectType;

    fn tree_id() -> ObjectId {
        ObjectId::from_hex("4b825dc642cb6eb9a060e54bf8d69288fbee4904").unwrap()
    }

    #[test]
    fn test_encode_layout() {
        let parent = ObjectId::from_bytes([2u8; 20]);
        let commit = Commit::build(tree_id(), Some(parent), "hello", &Signature::default());
        let text = String::from_utf8(commit.encode()).unwrap();

        assert_eq!(
            text,
            format!(
                "tree 4b825dc642cb6eb9a060e54bf8d69288fbee4904\n\
                 parent {parent}\n\
                 author plumb <plumb@example.com> 1620000000 +0000\n\
                 committer plumb <plumb@example.com> 1620000000 +0000\n\
                 \n\
                 hello\n"
            )
        );
    }

    #[test]
    fn test_encode_without_parent() {
        let commit = Commit::build(tree_id(), None, "root", &Signature::default());
        let text = String::from_utf8(commit.encode()).unwrap();
        assert!(!text.contains("parent"));
    }

    #[test]
    fn test_deterministic() {
        let sig = Signature::new("Alice", "alice@example.com");
        let a = Commit::build(tree_id(), None, "same", &sig).encode();
        let b = Commit::build(tree_id(), None, "same", &sig).encode();
        assert_eq!(
            ObjectId::hash_object(ObjectType::Commit, &a),
            ObjectId::hash_object(ObjectType::Commit, &b)
        );
    }

    #[test]
    fn test_decode_roundtrip() {
        let parent = ObjectId::from_bytes([9u8; 20]);
        let commit = Commit::build(
            tree_id(),
            Some(parent),
            "multi\n\nline",
            &Signature::new("Bob Q. Public", "bob@example.com"),
        );
        let decoded = Commit::decode(&commit.encode()).unwrap();
        assert_eq!(decoded, commit);
    }

    #[test]
    fn test_decode_skips_unknown_headers() {
        let text = "tree 4b825dc642cb6eb9a060e54bf8d69288fbee4904\n\
                    author A <a@x> 1 +0100\n\
                    committer C <c@x> 2 -0500\n\
                    gpgsig -----BEGIN PGP SIGNATURE-----\n \n -----END PGP SIGNATURE-----\n\
                    \n\
                    msg\n";
        let commit = Commit::decode(text.as_bytes()).unwrap();
        assert_eq!(commit.tree, tree_id());
        assert_eq!(commit.committer.tz_offset, "-0500");
        assert_eq!(commit.message, b"msg\n");
    }

    #[test]
    fn test_decode_non_utf8_message() {
        let mut data = b"tree 4b825dc642cb6eb9a060e54bf8d69288fbee4904\n\
                         author Jos\xe9 <j@x> 1 +0000\n\
                         committer Jos\xe9 <j@x> 1 +0000\n\n"
            .to_vec();
        data.extend_from_slice(b"caf\xe9\n");

        let commit = Commit::decode(&data).unwrap();
        assert_eq!(commit.tree, tree_id());
        assert_eq!(commit.message, b"caf\xe9\n");
        assert_eq!(commit.author.email, "j@x");
        assert_eq!(commit.author.name, "Jos\u{fffd}");
    }

    #[test]
    fn test_decode_missing_tree() {
        let text = "author A <a@x> 1 +0000\ncommitter A <a@x> 1 +0000\n\nmsg\n";
        assert!(matches!(
            Commit::decode(text.as_bytes()),
            Err(GitError::InvalidCommit(_))
        ));
    }

    #[test]
    fn test_decode_bad_signature() {
        let text = "tree 4b825dc642cb6eb9a060e54bf8d69288fbee4904\n\
                    author nobody\ncommitter A <a@x> 1 +0000\n\nmsg\n";
        assert!(Commit::decode(text.as_bytes()).is_err());
    }
}
