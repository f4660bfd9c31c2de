//! Git pack file format implementation.
//!
//! Pack files are the format used by git for efficient object transfer.
//! See: https://git-scm.com/docs/pack-format

use crate::delta::{DeltaBase, DeltaResolver, PendingDelta};
use crate::{GitError, Result};
use flate2::bufread::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use plumb_storage::{GitObject, ObjectId, ObjectStore, ObjectType};
use sha1::{Digest, Sha1};
use std::collections::HashMap;
use std::io::{Read, Write};

/// Magic bytes at the start of a pack file.
pub const PACK_SIGNATURE: &[u8; 4] = b"PACK";
/// Pack version written by [`PackBuilder`].
const PACK_VERSION: u32 = 2;
/// Pack versions accepted by [`PackParser`].
const SUPPORTED_VERSIONS: [u32; 2] = [2, 3];
/// Header (12 bytes) plus trailer (20 bytes).
const MIN_PACK_LEN: usize = 32;
const HEADER_LEN: usize = 12;
const TRAILER_LEN: usize = 20;

const OBJ_OFS_DELTA: u8 = 6;
const OBJ_REF_DELTA: u8 = 7;

/// An entry queued in a [`PackBuilder`].
#[derive(Debug, Clone)]
enum PackEntry {
    Object(GitObject),
    RefDelta { base: ObjectId, delta: Vec<u8> },
    OfsDelta { base_index: usize, delta: Vec<u8> },
}

/// Builds a pack file from a set of objects and deltas.
#[derive(Debug, Default)]
pub struct PackBuilder {
    entries: Vec<PackEntry>,
}

impl PackBuilder {
    /// Creates a new pack builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a full object and returns its entry index.
    pub fn add(&mut self, object: GitObject) -> usize {
        self.entries.push(PackEntry::Object(object));
        self.entries.len() - 1
    }

    /// Adds an object from the store by ID.
    pub fn add_from_store(&mut self, store: &ObjectStore, id: &ObjectId) -> Result<usize> {
        let object = store.read(id)?;
        Ok(self.add(object))
    }

    /// Adds a delta whose base is named by object id.
    pub fn add_ref_delta(&mut self, base: ObjectId, delta: Vec<u8>) -> usize {
        self.entries.push(PackEntry::RefDelta { base, delta });
        self.entries.len() - 1
    }

    /// Adds a delta whose base is an earlier entry of this pack.
    pub fn add_ofs_delta(&mut self, base_index: usize, delta: Vec<u8>) -> usize {
        self.entries.push(PackEntry::OfsDelta { base_index, delta });
        self.entries.len() - 1
    }

    /// Builds the pack file.
    pub fn build(self) -> Result<Vec<u8>> {
        let count = u32::try_from(self.entries.len())
            .map_err(|_| GitError::InvalidPack("too many entries".to_string()))?;

        let mut pack = Vec::new();
        pack.extend_from_slice(PACK_SIGNATURE);
        pack.extend_from_slice(&PACK_VERSION.to_be_bytes());
        pack.extend_from_slice(&count.to_be_bytes());

        let mut offsets = Vec::with_capacity(self.entries.len());
        for (index, entry) in self.entries.iter().enumerate() {
            let offset = pack.len();
            offsets.push(offset);
            match entry {
                PackEntry::Object(object) => {
                    write_header(&mut pack, object.object_type.pack_type(), object.data.len());
                    compress_into(&mut pack, &object.data)?;
                }
                PackEntry::RefDelta { base, delta } => {
                    write_header(&mut pack, OBJ_REF_DELTA, delta.len());
                    pack.extend_from_slice(base.as_bytes());
                    compress_into(&mut pack, delta)?;
                }
                PackEntry::OfsDelta { base_index, delta } => {
                    if *base_index >= index {
                        return Err(GitError::InvalidPack(format!(
                            "entry {index}: ofs-delta base {base_index} must come earlier"
                        )));
                    }
                    write_header(&mut pack, OBJ_OFS_DELTA, delta.len());
                    write_base_offset(&mut pack, (offset - offsets[*base_index]) as u64);
                    compress_into(&mut pack, delta)?;
                }
            }
        }

        let checksum = Sha1::digest(&pack);
        pack.extend_from_slice(&checksum);
        Ok(pack)
    }
}

/// Writes a type-and-size header.
///
/// First byte: (MSB=more bytes) (3 bits type) (4 bits size), then 7 bits
/// of size per byte.
fn write_header(pack: &mut Vec<u8>, type_code: u8, size: usize) {
    let mut first_byte = (type_code << 4) | ((size & 0x0F) as u8);
    let mut remaining_size = size >> 4;
    if remaining_size > 0 {
        first_byte |= 0x80;
    }
    pack.push(first_byte);

    while remaining_size > 0 {
        let mut byte = (remaining_size & 0x7F) as u8;
        remaining_size >>= 7;
        if remaining_size > 0 {
            byte |= 0x80;
        }
        pack.push(byte);
    }
}

/// Writes an ofs-delta base offset, most significant group first.
fn write_base_offset(pack: &mut Vec<u8>, mut offset: u64) {
    let mut bytes = vec![(offset & 0x7f) as u8];
    offset >>= 7;
    while offset > 0 {
        offset -= 1;
        bytes.push(0x80 | (offset & 0x7f) as u8);
        offset >>= 7;
    }
    bytes.reverse();
    pack.extend_from_slice(&bytes);
}

fn compress_into(pack: &mut Vec<u8>, data: &[u8]) -> Result<()> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(data)
        .map_err(|e| GitError::InvalidPack(e.to_string()))?;
    let compressed = encoder
        .finish()
        .map_err(|e| GitError::InvalidPack(e.to_string()))?;
    pack.extend_from_slice(&compressed);
    Ok(())
}

/// Result of parsing a pack: full objects stored, deltas still pending.
#[derive(Debug, Default)]
pub struct ParsedPack {
    /// Ids of the non-delta objects written to the store, in pack order.
    pub objects: Vec<ObjectId>,
    /// Pack offset of every stored object.
    pub offsets: HashMap<u64, ObjectId>,
    /// Deltas awaiting resolution.
    pub deltas: Vec<PendingDelta>,
}

/// Parses a pack file and extracts objects.
pub struct PackParser<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> PackParser<'a> {
    /// Creates a new pack parser.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Checks length, trailer checksum, signature and version.
    ///
    /// Returns the pack version.
    pub fn validate(data: &[u8]) -> Result<u32> {
        if data.len() < MIN_PACK_LEN {
            return Err(GitError::InvalidPack(format!(
                "pack too small: {} bytes",
                data.len()
            )));
        }

        let (body, trailer) = data.split_at(data.len() - TRAILER_LEN);
        if Sha1::digest(body).as_slice() != trailer {
            return Err(GitError::InvalidPack("checksum mismatch".to_string()));
        }

        if &data[0..4] != PACK_SIGNATURE {
            return Err(GitError::InvalidPack("invalid signature".to_string()));
        }

        let version = u32::from_be_bytes([data[4], data[5], data[6], data[7]]);
        if !SUPPORTED_VERSIONS.contains(&version) {
            return Err(GitError::InvalidPack(format!(
                "unsupported version: {}",
                version
            )));
        }
        Ok(version)
    }

    /// Parses the pack, writing full objects to `store` and collecting deltas.
    pub fn parse(&mut self, store: &ObjectStore) -> Result<ParsedPack> {
        Self::validate(self.data)?;

        let object_count =
            u32::from_be_bytes([self.data[8], self.data[9], self.data[10], self.data[11]]) as usize;
        let trailer_start = self.data.len() - TRAILER_LEN;
        self.pos = HEADER_LEN;

        let mut parsed = ParsedPack::default();
        let mut processed = 0usize;

        while self.pos < trailer_start {
            self.parse_entry(store, trailer_start, &mut parsed)?;
            processed += 1;
        }

        if processed != object_count {
            return Err(GitError::InvalidPack(format!(
                "header declares {object_count} objects, found {processed}"
            )));
        }

        tracing::info!(
            objects = parsed.objects.len(),
            deltas = parsed.deltas.len(),
            bytes = self.data.len(),
            "parsed pack"
        );
        Ok(parsed)
    }

    /// Parses a single entry.
    fn parse_entry(
        &mut self,
        store: &ObjectStore,
        end: usize,
        parsed: &mut ParsedPack,
    ) -> Result<()> {
        let entry_offset = self.pos as u64;

        let first_byte = self.next_byte(end)?;
        let type_code = (first_byte >> 4) & 0x07;
        let mut size = u64::from(first_byte & 0x0F);
        let mut shift = 4;

        let mut byte = first_byte;
        while byte & 0x80 != 0 {
            byte = self.next_byte(end)?;
            if shift > 57 {
                return Err(GitError::InvalidPack("object size overflow".to_string()));
            }
            size |= u64::from(byte & 0x7F) << shift;
            shift += 7;
        }
        let size = usize::try_from(size)
            .map_err(|_| GitError::InvalidPack("object size too large".to_string()))?;

        match type_code {
            OBJ_OFS_DELTA => {
                let distance = self.read_base_offset(end)?;
                let base = entry_offset
                    .checked_sub(distance)
                    .filter(|_| distance > 0)
                    .ok_or_else(|| {
                        GitError::InvalidPack(format!(
                            "ofs-delta at {entry_offset} points outside the pack"
                        ))
                    })?;
                let data = self.inflate(size, end)?;
                parsed.deltas.push(PendingDelta {
                    offset: entry_offset,
                    base: DeltaBase::Offset(base),
                    data,
                });
            }
            OBJ_REF_DELTA => {
                let raw = self
                    .data
                    .get(self.pos..self.pos + ObjectId::LEN)
                    .filter(|_| self.pos + ObjectId::LEN <= end)
                    .ok_or_else(|| GitError::InvalidPack("truncated ref-delta base".to_string()))?;
                let base = ObjectId::from_slice(raw)?;
                self.pos += ObjectId::LEN;
                let data = self.inflate(size, end)?;
                parsed.deltas.push(PendingDelta {
                    offset: entry_offset,
                    base: DeltaBase::Ref(base),
                    data,
                });
            }
            code => {
                let object_type = ObjectType::from_pack_type(code).ok_or_else(|| {
                    GitError::InvalidPack(format!("unknown object type: {code}"))
                })?;
                let data = self.inflate(size, end)?;
                let id = store.put(&GitObject::new(object_type, data))?;
                tracing::debug!(id = %id, kind = %object_type, offset = entry_offset, "unpacked object");
                parsed.offsets.insert(entry_offset, id);
                parsed.objects.push(id);
            }
        }
        Ok(())
    }

    fn next_byte(&mut self, end: usize) -> Result<u8> {
        if self.pos >= end {
            return Err(GitError::InvalidPack("unexpected end of pack".to_string()));
        }
        let byte = self.data[self.pos];
        self.pos += 1;
        Ok(byte)
    }

    /// Reads an ofs-delta base distance.
    fn read_base_offset(&mut self, end: usize) -> Result<u64> {
        let mut byte = self.next_byte(end)?;
        let mut offset = u64::from(byte & 0x7f);
        while byte & 0x80 != 0 {
            byte = self.next_byte(end)?;
            offset = offset
                .checked_add(1)
                .and_then(|o| o.checked_mul(128))
                .ok_or_else(|| GitError::InvalidPack("base offset overflow".to_string()))?
                | u64::from(byte & 0x7f);
        }
        Ok(offset)
    }

    /// Inflates the zlib stream at the cursor, which must yield exactly `size` bytes.
    fn inflate(&mut self, size: usize, end: usize) -> Result<Vec<u8>> {
        let input = &self.data[self.pos..end];
        let mut decoder = ZlibDecoder::new(input);
        let mut out = Vec::with_capacity(size.min(input.len().saturating_mul(8)));
        decoder
            .by_ref()
            .take(size as u64 + 1)
            .read_to_end(&mut out)
            .map_err(|e| GitError::InvalidPack(format!("decompression failed: {}", e)))?;

        if out.len() != size {
            return Err(GitError::InvalidPack(format!(
                "size mismatch at offset {}: declared {}, inflated {}",
                self.pos,
                size,
                out.len()
            )));
        }

        self.pos += decoder.total_in() as usize;
        Ok(out)
    }
}

/// Parses a pack into `store` and resolves all of its deltas.
///
/// Returns the ids of every object the pack contained.
pub fn unpack(data: &[u8], store: &ObjectStore) -> Result<Vec<ObjectId>> {
    let parsed = PackParser::new(data).parse(store)?;
    let mut ids = parsed.objects;
    let resolved = DeltaResolver::new(store, parsed.offsets).resolve(parsed.deltas)?;
    ids.extend(resolved);
    Ok(ids)
}
