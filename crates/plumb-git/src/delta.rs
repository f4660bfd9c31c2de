//! Delta decoding and resolution.
//!
//! A delta is a base size, a result size (both 7-bit little-endian
//! varints) and a stream of copy/insert instructions. See:
//! https://git-scm.com/docs/pack-format#_deltified_representation

use crate::{GitError, Result};
use plumb_storage::{ObjectId, ObjectStore};
use std::collections::{HashMap, VecDeque};

/// Copy length used when the length field is zero.
const DEFAULT_COPY_LEN: usize = 0x10000;
/// Longest literal a single insert opcode can carry.
const MAX_INSERT_LEN: usize = 0x7f;
/// Largest offset a copy opcode can address.
const MAX_COPY_OFFSET: usize = 0xffff_ffff;
/// Largest length a copy opcode can carry.
const MAX_COPY_LEN: usize = 0xff_ffff;

/// One delta instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instruction {
    /// Copy `len` bytes starting at `offset` of the base object.
    Copy {
        /// Offset into the base.
        offset: usize,
        /// Number of bytes to copy.
        len: usize,
    },
    /// Append literal bytes.
    Insert(Vec<u8>),
}

/// A parsed delta.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delta {
    /// Length the base object must have.
    pub base_size: usize,
    /// Length of the reconstructed object.
    pub result_size: usize,
    /// Instructions in application order.
    pub instructions: Vec<Instruction>,
}

impl Delta {
    /// Parses a delta instruction stream.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut pos = 0;
        let base_size = read_size(data, &mut pos)?;
        let result_size = read_size(data, &mut pos)?;

        let mut instructions = Vec::new();
        while pos < data.len() {
            let opcode = data[pos];
            pos += 1;

            if opcode & 0x80 != 0 {
                let mut value: u64 = 0;
                for bit in 0..7 {
                    if opcode & (1 << bit) != 0 {
                        let byte = *data.get(pos).ok_or_else(|| {
                            GitError::InvalidDelta("truncated copy instruction".to_string())
                        })?;
                        pos += 1;
                        value |= u64::from(byte) << (bit * 8);
                    }
                }
                let offset = (value & 0xffff_ffff) as usize;
                let len = match ((value >> 32) & 0xff_ffff) as usize {
                    0 => DEFAULT_COPY_LEN,
                    n => n,
                };
                instructions.push(Instruction::Copy { offset, len });
            } else if opcode == 0 {
                return Err(GitError::InvalidDelta("reserved opcode 0x00".to_string()));
            } else {
                let len = usize::from(opcode);
                let literal = data.get(pos..pos + len).ok_or_else(|| {
                    GitError::InvalidDelta("insert runs past end of delta".to_string())
                })?;
                pos += len;
                instructions.push(Instruction::Insert(literal.to_vec()));
            }
        }

        Ok(Self {
            base_size,
            result_size,
            instructions,
        })
    }

    /// Reconstructs the target object from `base`.
    pub fn apply(&self, base: &[u8]) -> Result<Vec<u8>> {
        if base.len() != self.base_size {
            return Err(GitError::InvalidDelta(format!(
                "base size mismatch: delta expects {}, base has {}",
                self.base_size,
                base.len()
            )));
        }

        // bounds and total length are checked before allocating
        let mut produced: usize = 0;
        for instruction in &self.instructions {
            let len = match instruction {
                Instruction::Copy { offset, len } => {
                    if offset.checked_add(*len).map_or(true, |end| end > base.len()) {
                        return Err(GitError::InvalidDelta(format!(
                            "copy {offset}+{len} exceeds base of {} bytes",
                            base.len()
                        )));
                    }
                    *len
                }
                Instruction::Insert(bytes) => bytes.len(),
            };
            produced = produced.saturating_add(len);
        }
        if produced != self.result_size {
            return Err(GitError::InvalidDelta(format!(
                "result size mismatch: delta declares {}, instructions produce {}",
                self.result_size, produced
            )));
        }

        let mut out = Vec::with_capacity(produced);
        for instruction in &self.instructions {
            match instruction {
                Instruction::Copy { offset, len } => {
                    out.extend_from_slice(&base[*offset..*offset + *len]);
                }
                Instruction::Insert(bytes) => out.extend_from_slice(bytes),
            }
        }
        Ok(out)
    }

    /// Encodes the delta into its wire form.
    ///
    /// Copies are limited to a 32-bit offset and a length of 1 to 0xffffff
    /// bytes; anything outside that range is `InvalidDelta`.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        write_size(&mut out, self.base_size);
        write_size(&mut out, self.result_size);

        for instruction in &self.instructions {
            match instruction {
                Instruction::Copy { offset, len } => {
                    if *offset > MAX_COPY_OFFSET || *len == 0 || *len > MAX_COPY_LEN {
                        return Err(GitError::InvalidDelta(format!(
                            "copy {offset}+{len} cannot be encoded"
                        )));
                    }
                    let len = if *len == DEFAULT_COPY_LEN { 0 } else { *len };
                    let mut opcode = 0x80u8;
                    let mut args = Vec::with_capacity(7);
                    for i in 0..4 {
                        let byte = ((offset >> (i * 8)) & 0xff) as u8;
                        if byte != 0 {
                            opcode |= 1 << i;
                            args.push(byte);
                        }
                    }
                    for i in 0..3 {
                        let byte = ((len >> (i * 8)) & 0xff) as u8;
                        if byte != 0 {
                            opcode |= 1 << (4 + i);
                            args.push(byte);
                        }
                    }
                    out.push(opcode);
                    out.extend_from_slice(&args);
                }
                Instruction::Insert(bytes) => {
                    for chunk in bytes.chunks(MAX_INSERT_LEN) {
                        out.push(chunk.len() as u8);
                        out.extend_from_slice(chunk);
                    }
                }
            }
        }
        Ok(out)
    }
}

/// Applies a raw delta to `base`.
pub fn apply_delta(base: &[u8], delta: &[u8]) -> Result<Vec<u8>> {
    Delta::parse(delta)?.apply(base)
}

fn read_size(data: &[u8], pos: &mut usize) -> Result<usize> {
    let mut size: u64 = 0;
    let mut shift = 0;
    loop {
        let byte = *data
            .get(*pos)
            .ok_or_else(|| GitError::InvalidDelta("truncated size header".to_string()))?;
        *pos += 1;
        if shift >= 64 {
            return Err(GitError::InvalidDelta("size header overflow".to_string()));
        }
        size |= u64::from(byte & 0x7f) << shift;
        shift += 7;
        if byte & 0x80 == 0 {
            break;
        }
    }
    usize::try_from(size).map_err(|_| GitError::InvalidDelta("size too large".to_string()))
}

fn write_size(out: &mut Vec<u8>, mut size: usize) {
    loop {
        let mut byte = (size & 0x7f) as u8;
        size >>= 7;
        if size > 0 {
            byte |= 0x80;
        }
        out.push(byte);
        if size == 0 {
            break;
        }
    }
}

/// How a pending delta names its base.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DeltaBase {
    /// Base identified by object id (ref-delta).
    Ref(ObjectId),
    /// Base identified by absolute pack offset (ofs-delta).
    Offset(u64),
}

/// A delta waiting for its base.
#[derive(Debug, Clone)]
pub struct PendingDelta {
    /// Pack offset of the delta entry itself.
    pub offset: u64,
    /// The base it applies to.
    pub base: DeltaBase,
    /// Inflated delta instruction stream.
    pub data: Vec<u8>,
}

/// Resolves pending deltas against the object store.
///
/// Deltas whose bases are not yet available wait in a map keyed by base;
/// each newly written object wakes the deltas waiting on it.
pub struct DeltaResolver<'a> {
    store: &'a ObjectStore,
    offsets: HashMap<u64, ObjectId>,
}

impl<'a> DeltaResolver<'a> {
    /// Creates a resolver; `offsets` maps pack offsets of already written entries to their ids.
    pub fn new(store: &'a ObjectStore, offsets: HashMap<u64, ObjectId>) -> Self {
        Self { store, offsets }
    }

    fn available(&self, base: &DeltaBase) -> Option<ObjectId> {
        match base {
            DeltaBase::Ref(id) => self.store.exists(id).then_some(*id),
            DeltaBase::Offset(offset) => self.offsets.get(offset).copied(),
        }
    }

    /// Resolves every delta, returning the ids written in resolution order.
    pub fn resolve(&mut self, pending: Vec<PendingDelta>) -> Result<Vec<ObjectId>> {
        let mut waiting: HashMap<DeltaBase, Vec<PendingDelta>> = HashMap::new();
        let mut ready = VecDeque::new();

        for delta in pending {
            match self.available(&delta.base) {
                Some(base_id) => ready.push_back((base_id, delta)),
                None => waiting.entry(delta.base.clone()).or_default().push(delta),
            }
        }

        let mut resolved = Vec::new();
        while let Some((base_id, delta)) = ready.pop_front() {
            let base = self.store.read(&base_id)?;
            let data = apply_delta(&base.data, &delta.data)?;
            let id = self.store.write(base.object_type, &data)?;
            tracing::debug!(id = %id, base = %base_id, offset = delta.offset, "resolved delta");

            self.offsets.insert(delta.offset, id);
            resolved.push(id);

            for key in [DeltaBase::Ref(id), DeltaBase::Offset(delta.offset)] {
                if let Some(woken) = waiting.remove(&key) {
                    ready.extend(woken.into_iter().map(|d| (id, d)));
                }
            }
        }

        if let Some(base) = waiting.keys().next() {
            let missing = match base {
                DeltaBase::Ref(id) => id.to_hex(),
                DeltaBase::Offset(offset) => format!("pack offset {offset}"),
            };
            return Err(GitError::UnresolvedDeltas {
                count: waiting.values().map(Vec::len).sum(),
                missing,
            });
        }

        tracing::info!(count = resolved.len(), "resolved deltas");
        Ok(resolved)
    }
}
