//! Git plumbing for Plumb.
//!
//! This crate implements the tree and commit codecs, working tree
//! snapshots, the pack file format with delta resolution, and a smart
//! HTTP client able to clone from standard git servers.

mod checkout;
mod commit;
mod delta;
mod error;
mod pack;
mod pktline;
pub mod plumbing;
mod protocol;
mod tree;
mod worktree;

pub use checkout::{checkout, checkout_tree, read_kind};
pub use commit::{Commit, Signature};
pub use delta::{apply_delta, Delta, DeltaBase, DeltaResolver, Instruction, PendingDelta};
pub use error::GitError;
pub use pack::{unpack, PackBuilder, PackParser, ParsedPack, PACK_SIGNATURE};
pub use pktline::{decode_all, PktLine, PktLineDecoder, PktLineWriter};
pub use protocol::{
    extract_pack, want_request, AdvertisedRef, HttpTransport, RefAdvertisement, Transport,
    UploadPackClient, UPLOAD_PACK_SERVICE,
};
pub use tree::{format_entry, FileMode, Tree, TreeEntry};
pub use worktree::WorkingTreeBuilder;

/// Result type for git plumbing operations.
pub type Result<T> = std::result::Result<T, GitError>;
