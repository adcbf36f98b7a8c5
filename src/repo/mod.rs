//! The local, durable store of blocks (spec.md §4.1) and its companion metadata store (pins,
//! indices). Two concrete backings are provided: [`fs`] for a real on-disk repo and [`mem`] for
//! tests and in-process nodes (mirroring `koivunej-rust-ipfs`'s own fs/mem split).

pub mod fs;
pub mod mem;

use crate::{Block, Error};
use async_trait::async_trait;
use cid::Cid;
use futures::stream::BoxStream;
use std::fmt::Debug;
use std::path::PathBuf;
use std::sync::Arc;

/// Ties a concrete `(blockstore, datastore)` pair together so `Repo<T>`, `Ipfs<T>` and the `p2p`
/// layer can all be generic over "what kind of repo backs this node" without infecting every
/// signature with two separate type parameters (mirrors `koivunej-rust-ipfs`'s `RepoTypes`).
pub trait RepoTypes: Send + Sync + Clone + 'static {
    type TBlockStore: BlockStore;
    type TDataStore: DataStore;
}

/// A namespace within the metadata store. Kept as an enum (rather than a prefix convention on raw
/// keys) so a backing store can choose to use genuinely separate column families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Column {
    /// Direct/recursive pin root sets (see [`crate::pin`]).
    Pin,
}

/// Put/Get/Has/Remove of raw blocks keyed by content hash (spec.md §4.1).
///
/// `put` is idempotent: inserting a block under a key that already exists is a no-op. `get` on a
/// key absent locally returns `Ok(None)` immediately — callers that want a network-backed fetch go
/// through [`crate::Ipfs::get_block`], not this trait directly.
#[async_trait]
pub trait BlockStore: Debug + Send + Sync + Unpin + 'static {
    fn new(path: PathBuf) -> Self;

    async fn init(&self) -> Result<(), Error>;
    async fn open(&self) -> Result<(), Error>;

    async fn contains(&self, cid: &Cid) -> Result<bool, Error>;
    async fn get(&self, cid: &Cid) -> Result<Option<Block>, Error>;
    async fn put(&self, block: Block) -> Result<Cid, Error>;
    async fn remove(&self, cid: &Cid) -> Result<(), Error>;

    /// A lazy sequence over every locally-stored key; used only by GC, which should not force the
    /// whole key space into memory at once on large repos (SPEC_FULL.md §4.1).
    fn list(&self) -> BoxStream<'static, Cid>;
}

/// The metadata store: pins today, indices in general. Deliberately separate from [`BlockStore`]
/// (mirrors go-ipfs's split between a generic block `ds.Datastore` and dedicated pin storage).
#[async_trait]
pub trait DataStore: Debug + Send + Sync + Unpin + 'static {
    fn new(path: PathBuf) -> Self;

    async fn init(&self) -> Result<(), Error>;
    async fn open(&self) -> Result<(), Error>;

    async fn contains(&self, col: Column, key: &[u8]) -> Result<bool, Error>;
    async fn get(&self, col: Column, key: &[u8]) -> Result<Option<Vec<u8>>, Error>;
    async fn put(&self, col: Column, key: &[u8], value: &[u8]) -> Result<(), Error>;
    async fn remove(&self, col: Column, key: &[u8]) -> Result<(), Error>;
}

/// A handle to one node's repo: its block store, its data store, and the filesystem path (if any)
/// a lockfile was taken against. Cheaply `Clone`: both stores are held behind `Arc`.
#[derive(Debug)]
pub struct Repo<T: RepoTypes> {
    block_store: Arc<T::TBlockStore>,
    data_store: Arc<T::TDataStore>,
}

impl<T: RepoTypes> Clone for Repo<T> {
    fn clone(&self) -> Self {
        Repo {
            block_store: Arc::clone(&self.block_store),
            data_store: Arc::clone(&self.data_store),
        }
    }
}

impl<T: RepoTypes> Repo<T> {
    pub fn new(path: PathBuf) -> Self {
        Repo {
            block_store: Arc::new(T::TBlockStore::new(path.clone())),
            data_store: Arc::new(T::TDataStore::new(path)),
        }
    }

    pub async fn init(&self) -> Result<(), Error> {
        self.block_store.init().await?;
        self.data_store.init().await
    }

    pub async fn open(&self) -> Result<(), Error> {
        self.block_store.open().await?;
        self.data_store.open().await
    }

    pub fn block_store(&self) -> &T::TBlockStore {
        &self.block_store
    }

    pub fn data_store(&self) -> &T::TDataStore {
        &self.data_store
    }

    pub async fn contains(&self, cid: &Cid) -> Result<bool, Error> {
        self.block_store.contains(cid).await
    }

    pub async fn get(&self, cid: &Cid) -> Result<Option<Block>, Error> {
        self.block_store.get(cid).await
    }

    /// `put` is idempotent per spec.md §4.1. The returned `bool` tells the caller whether the
    /// block was newly inserted, which the exchange layer uses to decide whether `has_block`
    /// should fire at all (re-storing an already-present block is a no-op, not a fresh arrival).
    pub async fn put(&self, block: Block) -> Result<(Cid, bool), Error> {
        let cid = block.cid.clone();
        let was_new = !self.block_store.contains(&cid).await?;
        self.block_store.put(block).await?;
        Ok((cid, was_new))
    }

    pub async fn remove(&self, cid: &Cid) -> Result<(), Error> {
        self.block_store.remove(cid).await
    }
}
