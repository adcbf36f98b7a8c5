//! The node-facing side of UnixFS: streaming `cat` over a resolved path (spec.md §4.3's reader,
//! wired through [`crate::dag`] and the exchange). Chunking/building lives in the standalone
//! [`ipfs_unixfs`] crate; this module only adapts its reader to an [`crate::Ipfs`] handle.

pub mod cat;
