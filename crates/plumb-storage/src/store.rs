//! Loose object store.
//!
//! Objects live at `<objects>/<first 2 hex>/<remaining 38 hex>`, each file
//! holding the zlib-compressed framed object.

use crate::{GitObject, ObjectId, ObjectType, Result, StorageError};
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Content-addressed object store backed by a directory of loose objects.
#[derive(Debug, Clone)]
pub struct ObjectStore {
    objects_dir: PathBuf,
}

impl ObjectStore {
    /// Creates a store rooted at an `objects/` directory.
    ///
    /// The directory is not touched until the first write.
    pub fn new(objects_dir: impl Into<PathBuf>) -> Self {
        Self {
            objects_dir: objects_dir.into(),
        }
    }

    /// Returns the objects directory.
    pub fn objects_dir(&self) -> &Path {
        &self.objects_dir
    }

    /// Computes the digest an object would be stored under, without writing.
    pub fn hash(object_type: ObjectType, data: &[u8]) -> ObjectId {
        ObjectId::hash_object(object_type, data)
    }

    /// Returns the on-disk path for an object id.
    pub fn path_for(&self, id: &ObjectId) -> PathBuf {
        let hex = id.to_hex();
        let (dir, file) = hex.split_at(2);
        self.objects_dir.join(dir).join(file)
    }

    /// Stores a payload of the given kind and returns its ID.
    pub fn write(&self, object_type: ObjectType, data: &[u8]) -> Result<ObjectId> {
        self.put(&GitObject::new(object_type, data.to_vec()))
    }

    /// Stores an object and returns its ID.
    ///
    /// Writing an object that already exists is a no-op.
    pub fn put(&self, object: &GitObject) -> Result<ObjectId> {
        let id = object.id;
        let path = self.path_for(&id);
        if path.exists() {
            tracing::debug!(id = %id, "object already present");
            return Ok(id);
        }

        let dir = path
            .parent()
            .ok_or_else(|| StorageError::InvalidArgument(format!("bad object path for {id}")))?;
        std::fs::create_dir_all(dir)?;

        let compressed = Self::compress(object)?;
        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(&compressed)?;
        tmp.persist(&path).map_err(|e| e.error)?;

        tracing::debug!(
            id = %id,
            kind = object.object_type.as_str(),
            size = object.size(),
            "wrote object"
        );
        Ok(id)
    }

    /// Retrieves an object by ID.
    pub fn read(&self, id: &ObjectId) -> Result<GitObject> {
        let path = self.path_for(id);
        let compressed = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageError::NotFound(id.to_hex()));
            }
            Err(e) => return Err(e.into()),
        };
        Self::decompress(&compressed)
    }

    /// Retrieves an object by its hex digest, validating the digest first.
    pub fn read_hex(&self, hex: &str) -> Result<GitObject> {
        let id = ObjectId::from_hex(hex)?;
        self.read(&id)
    }

    /// Checks if an object exists.
    pub fn exists(&self, id: &ObjectId) -> bool {
        self.path_for(id).is_file()
    }

    /// Compresses a framed object using zlib.
    pub fn compress(object: &GitObject) -> Result<Vec<u8>> {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder
            .write_all(&object.frame())
            .map_err(|e| StorageError::Compression(e.to_string()))?;
        encoder
            .finish()
            .map_err(|e| StorageError::Compression(e.to_string()))
    }

    /// Decompresses a loose object and parses its header.
    pub fn decompress(compressed: &[u8]) -> Result<GitObject> {
        let mut decoder = ZlibDecoder::new(compressed);
        let mut decompressed = Vec::new();
        decoder
            .read_to_end(&mut decompressed)
            .map_err(|e| StorageError::Compression(e.to_string()))?;
        GitObject::from_framed(&decompressed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn temp_store() -> (TempDir, ObjectStore) {
        let dir = TempDir::new().unwrap();
        let store = ObjectStore::new(dir.path().join("objects"));
        (dir, store)
    }

    #[test]
    fn test_object_store_roundtrip() {
        let (_dir, store) = temp_store();
        let id = store.write(ObjectType::Blob, b"Hello, World!").unwrap();

        let retrieved = store.read(&id).unwrap();
        assert_eq!(retrieved.object_type, ObjectType::Blob);
        assert_eq!(retrieved.data.as_ref(), b"Hello, World!");
        assert_eq!(retrieved.id, id);
    }

    #[test]
    fn test_path_layout() {
        let (dir, store) = temp_store();
        let id = store.write(ObjectType::Blob, b"hello\n").unwrap();
        let expected = dir
            .path()
            .join("objects/ce/013625030ba8dba906f756967f9e9ca394464a");
        assert_eq!(store.path_for(&id), expected);
        assert!(expected.is_file());
    }

    #[test]
    fn test_write_is_idempotent() {
        let (_dir, store) = temp_store();
        let id1 = store.write(ObjectType::Tree, b"same").unwrap();
        let id2 = store.write(ObjectType::Tree, b"same").unwrap();
        assert_eq!(id1, id2);

        let fanout = store.path_for(&id1).parent().unwrap().to_path_buf();
        assert_eq!(std::fs::read_dir(fanout).unwrap().count(), 1);
    }

    #[test]
    fn test_hash_does_not_write() {
        let (_dir, store) = temp_store();
        let id = ObjectStore::hash(ObjectType::Blob, b"hello\n");
        assert!(!store.exists(&id));
        assert!(!store.objects_dir().exists());
    }

    #[test]
    fn test_read_missing() {
        let (_dir, store) = temp_store();
        let id = ObjectId::from_bytes([7u8; 20]);
        assert!(matches!(store.read(&id), Err(StorageError::NotFound(_))));
    }

    #[test]
    fn test_read_hex_rejects_bad_digest() {
        let (_dir, store) = temp_store();
        assert!(matches!(
            store.read_hex("1234"),
            Err(StorageError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_read_detects_size_mismatch() {
        let (_dir, store) = temp_store();
        let id = ObjectId::from_bytes([9u8; 20]);
        let path = store.path_for(&id);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();

        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(b"blob 99\0tiny").unwrap();
        std::fs::write(&path, encoder.finish().unwrap()).unwrap();

        assert!(matches!(
            store.read(&id),
            Err(StorageError::InvalidObject(_))
        ));
    }

    #[test]
    fn test_read_rejects_garbage() {
        let (_dir, store) = temp_store();
        let id = ObjectId::from_bytes([3u8; 20]);
        let path = store.path_for(&id);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, b"not zlib").unwrap();

        assert!(matches!(store.read(&id), Err(StorageError::Compression(_))));
    }

    #[test]
    fn test_compression_roundtrip() {
        let original = GitObject::new(ObjectType::Commit, b"tree abc\n".to_vec());
        let compressed = ObjectStore::compress(&original).unwrap();
        let decompressed = ObjectStore::decompress(&compressed).unwrap();
        assert_eq!(original, decompressed);
    }
}
