//! Git object types and framing.

use crate::{Result, StorageError};
use bytes::Bytes;
use sha1::{Digest, Sha1};
use std::fmt;
use std::str::FromStr;

/// A 20-byte SHA-1 object identifier.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId([u8; 20]);

impl ObjectId {
    /// Length of an object id in raw bytes.
    pub const LEN: usize = 20;
    /// Length of an object id rendered as hex.
    pub const HEX_LEN: usize = 40;

    /// Creates an ObjectId from raw bytes.
    pub fn from_bytes(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    /// Creates an ObjectId from a 20-byte slice.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let arr: [u8; 20] = bytes.try_into().map_err(|_| {
            StorageError::InvalidArgument(format!("invalid object id length: {} bytes", bytes.len()))
        })?;
        Ok(Self(arr))
    }

    /// Creates an ObjectId from a hex string.
    ///
    /// Anything other than exactly 40 hex characters is rejected.
    pub fn from_hex(hex: &str) -> Result<Self> {
        if hex.len() != Self::HEX_LEN {
            return Err(StorageError::InvalidArgument(format!(
                "invalid object id length: {}",
                hex.len()
            )));
        }
        let mut bytes = [0u8; 20];
        hex::decode_to_slice(hex, &mut bytes)
            .map_err(|e| StorageError::InvalidArgument(format!("invalid object id {hex:?}: {e}")))?;
        Ok(Self(bytes))
    }

    /// Returns the raw bytes.
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Returns the hex representation.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Computes the SHA-1 hash of data with a git object header.
    pub fn hash_object(object_type: ObjectType, data: &[u8]) -> Self {
        let header = format!("{} {}\0", object_type.as_str(), data.len());
        let mut hasher = Sha1::new();
        hasher.update(header.as_bytes());
        hasher.update(data);
        let result = hasher.finalize();
        let mut bytes = [0u8; 20];
        bytes.copy_from_slice(&result);
        Self(bytes)
    }
}

impl FromStr for ObjectId {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_hex(s)
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", self.to_hex())
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Git object types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectType {
    /// File content.
    Blob,
    /// Directory listing.
    Tree,
    /// Commit object.
    Commit,
    /// Annotated tag.
    Tag,
}

impl ObjectType {
    /// Returns the string representation used in git.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Blob => "blob",
            Self::Tree => "tree",
            Self::Commit => "commit",
            Self::Tag => "tag",
        }
    }

    /// Parses an object type from a string.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "blob" => Ok(Self::Blob),
            "tree" => Ok(Self::Tree),
            "commit" => Ok(Self::Commit),
            "tag" => Ok(Self::Tag),
            _ => Err(StorageError::InvalidObject(format!(
                "unknown object type: {}",
                s
            ))),
        }
    }

    /// Returns the type code used in pack files.
    pub fn pack_type(&self) -> u8 {
        match self {
            Self::Commit => 1,
            Self::Tree => 2,
            Self::Blob => 3,
            Self::Tag => 4,
        }
    }

    /// Parses an object type from a pack file type code.
    pub fn from_pack_type(code: u8) -> Option<Self> {
        match code {
            1 => Some(Self::Commit),
            2 => Some(Self::Tree),
            3 => Some(Self::Blob),
            4 => Some(Self::Tag),
            _ => None,
        }
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A git object (blob, tree, commit, or tag).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitObject {
    /// The object's unique identifier (SHA-1 hash).
    pub id: ObjectId,
    /// The type of object.
    pub object_type: ObjectType,
    /// The raw object data (uncompressed, without header).
    pub data: Bytes,
}

impl GitObject {
    /// Creates a new git object, computing its ID from the data.
    pub fn new(object_type: ObjectType, data: impl Into<Bytes>) -> Self {
        let data = data.into();
        let id = ObjectId::hash_object(object_type, &data);
        Self {
            id,
            object_type,
            data,
        }
    }

    /// Creates a blob object from file content.
    pub fn blob(content: impl Into<Bytes>) -> Self {
        Self::new(ObjectType::Blob, content)
    }

    /// Returns the size of the object data.
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Serializes to the framed form `"<kind> <len>\0<payload>"`.
    pub fn frame(&self) -> Vec<u8> {
        let header = format!("{} {}\0", self.object_type.as_str(), self.data.len());
        let mut framed = Vec::with_capacity(header.len() + self.data.len());
        framed.extend_from_slice(header.as_bytes());
        framed.extend_from_slice(&self.data);
        framed
    }

    /// Parses a framed object, checking the declared size against the payload.
    pub fn from_framed(framed: &[u8]) -> Result<Self> {
        let null_pos = framed.iter().position(|&b| b == 0).ok_or_else(|| {
            StorageError::InvalidObject("missing null byte in header".to_string())
        })?;

        let header = std::str::from_utf8(&framed[..null_pos])
            .map_err(|_| StorageError::InvalidObject("non-utf8 header".to_string()))?;
        let (kind, size) = header
            .split_once(' ')
            .ok_or_else(|| StorageError::InvalidObject(format!("invalid header: {header}")))?;

        let object_type = ObjectType::parse(kind)?;
        let size: usize = size
            .parse()
            .map_err(|_| StorageError::InvalidObject(format!("invalid size: {size}")))?;

        let data = &framed[null_pos + 1..];
        if data.len() != size {
            return Err(StorageError::InvalidObject(format!(
                "size mismatch: header says {}, payload has {}",
                size,
                data.len()
            )));
        }

        Ok(Self::new(object_type, Bytes::copy_from_slice(data)))
    }
}
