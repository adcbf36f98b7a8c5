//! UnixFS: the file chunker and builder, the streaming file reader, and the flat/HAMT-sharded
//! directory builder, all operating on the dag-pb wire types in [`pb`].
//!
//! This crate knows nothing about a blockstore or the network; it only turns bytes into
//! content-addressed dag-pb blocks and back. Callers (the `ipfs` crate's `dag` and `unixfs`
//! modules) are responsible for persisting the blocks this crate hands back and for fetching the
//! blocks this crate asks for by `Cid` during a walk.

pub mod dir;
pub mod file;
mod hash;
pub mod pb;

pub use dir::{hamt::HamtShard, DirBuilder, DirEntry, DEFAULT_SHARD_SPLIT_THRESHOLD};
pub use file::adder::{Chunker, FileAdder, RabinChunker, DEFAULT_CHUNK_SIZE, DEFAULT_MAX_LINKS};
pub use file::reader::{FileContent, FileReader, Traversal};
pub use file::visit::{FileVisit, IdleFileVisit, Noop, Visitation, Visitor};
pub use file::{FileError, FileMetadata, FileReadFailed};
pub use hash::cid_for_dag_pb;
pub use pb::{FlatUnixFs, PBLink, UnixFs, UnixFsReadFailed, UnixFsType};
