//! Peer-to-peer, content-addressed block exchange, provider routing and Merkle DAG core.
//!
//! [`Ipfs`] is the facade described by spec.md §4.7 ("Node Assembly"): it composes the blockstore
//! ([`repo`]), the Merkle DAG layer ([`dag`]), UnixFS ([`unixfs`]), pinning ([`pin`]), the
//! Kademlia-style [`routing`] crate and the [`bitswap`] exchange engine behind one cloneable
//! handle, and wires their cross-component calls (a DAG `get` miss reaching into the exchange, the
//! exchange reaching into routing for `NeedProviders`) without any of those crates knowing about
//! each other directly.
//!
//! Everything that touches the `libp2p` [`Swarm`](libp2p::Swarm) — dialing, want-list broadcasts,
//! provider lookups — is owned by a single background task ([`p2p::task::IpfsFuture`]) that the
//! facade talks to over a channel, per spec.md §9's "one task per peer"/"single-writer" guidance
//! generalized to the whole swarm: the swarm itself is a single-writer structure.

pub mod cancel;
pub mod config;
pub mod dag;
pub mod error;
pub mod p2p;
pub mod path;
pub mod peerstore;
pub mod pin;
pub mod refs;
pub mod repo;
pub mod unixfs;

pub use bitswap::Block;
pub use cancel::{CancellationHandle, CancellationToken};
pub use cid::Cid;
pub use error::Error;
pub use p2p::Connection;
pub use path::IpfsPath;

use crate::dag::IpldDag;
use crate::p2p::{create_swarm, SwarmOptions, SwarmTypes, TSwarm};
use crate::peerstore::Peerstore;
use crate::pin::Pinner;
use crate::repo::fs::{FsBlockStore, FsDataStore};
use crate::repo::mem::{MemBlockStore, MemDataStore};
use crate::repo::{Repo, RepoTypes};
use bitswap::Priority;
use cid::Cid as CidT;
use futures::future::Either;
use libp2p::identity::{Keypair, PublicKey};
use libp2p::{Multiaddr, PeerId};
use std::convert::TryFrom;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::{mpsc, oneshot};

/// Marries [`RepoTypes`] and [`SwarmTypes`] into the one bound every public API in this crate
/// needs; blanket-implemented so a concrete backing (see [`TestTypes`], [`StoreTypes`]) only has
/// to name the two underlying stores once.
pub trait IpfsTypes: RepoTypes + SwarmTypes {}
impl<T: RepoTypes + SwarmTypes> IpfsTypes for T {}

/// An in-memory repo, used by tests and by [`IpfsOptions::inmemory_with_generated_keys`] for
/// throwaway nodes that never touch disk.
#[derive(Clone, Debug, Default)]
pub struct TestTypes;

impl RepoTypes for TestTypes {
    type TBlockStore = MemBlockStore;
    type TDataStore = MemDataStore;
}
impl SwarmTypes for TestTypes {}

/// A real, on-disk repo rooted at a configured path.
#[derive(Clone, Debug, Default)]
pub struct StoreTypes;

impl RepoTypes for StoreTypes {
    type TBlockStore = FsBlockStore;
    type TDataStore = FsDataStore;
}
impl SwarmTypes for StoreTypes {}

/// Everything needed to start a node: identity, where its repo lives, who to bootstrap from, and
/// which optional protocols to enable. Mirrors the `config` record's shape (§6) closely enough
/// that `IpfsOptions::from(&Config)` is a pure field copy; the two are kept separate because
/// `Config` is what's serialized to disk and `IpfsOptions` additionally carries the live
/// [`Keypair`], which the keystore (not `config`) is responsible for.
pub struct IpfsOptions<Types: IpfsTypes> {
    pub repo_path: PathBuf,
    pub keypair: Keypair,
    pub bootstrap: Vec<(Multiaddr, PeerId)>,
    pub mdns: bool,
    pub kad_protocol: Option<String>,
    pub listening_addrs: Vec<Multiaddr>,
    _marker: std::marker::PhantomData<Types>,
}

impl<Types: IpfsTypes> IpfsOptions<Types> {
    pub fn new(repo_path: PathBuf, keypair: Keypair, bootstrap: Vec<(Multiaddr, PeerId)>) -> Self {
        IpfsOptions {
            repo_path,
            keypair,
            bootstrap,
            mdns: false,
            kad_protocol: None,
            listening_addrs: vec!["/ip4/0.0.0.0/tcp/0".parse().expect("static multiaddr")],
            _marker: std::marker::PhantomData,
        }
    }
}

impl IpfsOptions<TestTypes> {
    /// A node backed entirely by memory, with a freshly generated Ed25519 keypair — what every
    /// unit test in this crate starts from.
    pub fn inmemory_with_generated_keys() -> Self {
        IpfsOptions::new(PathBuf::new(), Keypair::generate_ed25519(), Vec::new())
    }
}

/// A not-yet-running node: its options are fixed, but the repo hasn't been opened and the swarm
/// hasn't been built. Exists so the repo can be initialized (or a version mismatch surfaced,
/// spec.md §7) before anything starts listening.
pub struct UninitializedIpfs<Types: IpfsTypes> {
    repo: Repo<Types>,
    options: IpfsOptions<Types>,
}

impl<Types: IpfsTypes> UninitializedIpfs<Types> {
    pub fn new(options: IpfsOptions<Types>) -> Self {
        let repo = Repo::new(options.repo_path.clone());
        UninitializedIpfs { repo, options }
    }

    /// Opens (initializing if necessary) the repo, builds the swarm, and spawns the background
    /// task that drives it. Returns the facade plus the future the caller must poll to completion
    /// (normally via `tokio::spawn`) for the node to do anything at all.
    pub async fn start(self) -> Result<(Ipfs<Types>, impl std::future::Future<Output = ()>), Error> {
        self.repo.init().await?;
        self.repo.open().await?;

        let peer_id = self.options.keypair.public().into_peer_id();
        let (to_task, from_facade) = mpsc::unbounded_channel();
        let pinner = Arc::new(Pinner::new(self.repo.clone()));
        let peerstore = Arc::new(Peerstore::new());

        let ipfs = Ipfs {
            repo: self.repo,
            pinner,
            peerstore: peerstore.clone(),
            keys: self.options.keypair.clone(),
            peer_id,
            to_task,
        };

        let swarm_options = SwarmOptions::from(&self.options);
        let swarm = create_swarm(swarm_options, ipfs.clone(), None).await;
        let task = p2p::task::IpfsFuture::new(swarm, ipfs.repo.clone(), from_facade, peerstore);

        Ok((ipfs, task.run()))
    }
}

/// The node-level facade (spec.md §4.7). Cheaply `Clone`: the repo is `Arc`-backed internally and
/// the swarm lives behind an unbounded channel, so every clone is just a handful of pointers.
pub struct Ipfs<Types: IpfsTypes> {
    repo: Repo<Types>,
    pinner: Arc<Pinner<Types>>,
    peerstore: Arc<Peerstore>,
    keys: Keypair,
    peer_id: PeerId,
    to_task: mpsc::UnboundedSender<p2p::task::IpfsEvent>,
}

impl<Types: IpfsTypes> Clone for Ipfs<Types> {
    fn clone(&self) -> Self {
        Ipfs {
            repo: self.repo.clone(),
            pinner: self.pinner.clone(),
            peerstore: self.peerstore.clone(),
            keys: self.keys.clone(),
            peer_id: self.peer_id.clone(),
            to_task: self.to_task.clone(),
        }
    }
}

impl<Types: IpfsTypes> Ipfs<Types> {
    pub fn peer_id(&self) -> &PeerId {
        &self.peer_id
    }

    /// The Merkle DAG service over this node (spec.md §4.2). Constructed on demand rather than
    /// stored, since an `IpldDag` holds an owned `Ipfs` clone and storing it as a field would make
    /// `Ipfs`'s own size self-referential.
    pub fn dag(&self) -> IpldDag<Types> {
        IpldDag::new(self.clone())
    }

    pub fn pinner(&self) -> &Pinner<Types> {
        &self.pinner
    }

    /// Public key plus every address the node is currently listening on (SPEC_FULL.md §4.7's
    /// supplement: tests and other internal collaborators need this to dial one node from
    /// another without a discovery layer).
    pub async fn identity(&self) -> Result<(PublicKey, Vec<Multiaddr>), Error> {
        let (tx, rx) = oneshot::channel();
        self.send_to_task(p2p::task::IpfsEvent::GetListeningAddresses(tx))?;
        let addrs = rx.await.map_err(|_| Error::permanent("background task gone"))?;
        Ok((self.keys.public(), addrs))
    }

    /// Dials `addr`, which must carry a trailing `/p2p/<peer id>` component.
    pub async fn connect(&self, addr: Multiaddr) -> Result<(), Error> {
        let (tx, rx) = oneshot::channel();
        self.send_to_task(p2p::task::IpfsEvent::Connect(addr, tx))?;
        rx.await.map_err(|_| Error::permanent("background task gone"))?
    }

    /// Raw block access beneath the UnixFS layer (SPEC_FULL.md §4.7's supplement). `put_block`
    /// persists the block and, if it wasn't already present, fires `has_block` (spec.md §4.6):
    /// local waiters are notified and the swarm is told to serve/cancel it for interested peers.
    pub async fn put_block(&self, block: Block) -> Result<Cid, Error> {
        let (cid, was_new) = self.repo.put(block.clone()).await?;
        if was_new {
            self.send_to_task(p2p::task::IpfsEvent::HasBlock(block))?;
        }
        Ok(cid)
    }

    /// A blockstore-only `get`: returns `NotFound` immediately rather than reaching for the
    /// exchange (spec.md §4.1). [`Ipfs::get_block`] is what falls back to bitswap.
    pub async fn get_block_local(&self, cid: &Cid) -> Result<Block, Error> {
        self.repo.get(cid).await?.ok_or_else(|| Error::NotFound(cid.clone()))
    }

    /// `get(k)` (spec.md §4.6): a local blockstore hit returns immediately; otherwise the block is
    /// fetched over bitswap (which itself asks routing for providers), honoring `cancel`.
    /// Dedup is the exchange engine's job, not this call's: two concurrent callers each get their
    /// own waiter attached to the same in-flight fetch.
    pub async fn get_block_cancelable(&self, cid: &Cid, mut cancel: CancellationToken) -> Result<Block, Error> {
        if let Some(block) = self.repo.get(cid).await? {
            return Ok(block);
        }

        let (tx, rx) = oneshot::channel();
        self.send_to_task(p2p::task::IpfsEvent::WantBlock(cid.clone(), Priority::default(), tx))?;

        match futures::future::select(Box::pin(rx), Box::pin(cancel.canceled())).await {
            Either::Left((Ok(block), _)) => Ok(block),
            Either::Left((Err(_), _)) => Err(Error::permanent("background task gone")),
            Either::Right((_, _)) => {
                let _ = self.send_to_task(p2p::task::IpfsEvent::CancelBlock(cid.clone()));
                Err(Error::Canceled)
            }
        }
    }

    /// [`Ipfs::get_block_cancelable`] with a token that never fires, bounded instead by the
    /// default lookup-wide soft cap (spec.md §5).
    pub async fn get_block(&self, cid: &Cid) -> Result<Block, Error> {
        let deadline = tokio::time::delay_for(routing::LOOKUP_TIMEOUT);
        tokio_select_value(deadline, self.get_block_cancelable(cid, cancel::never())).await
    }

    /// Resolves `path` and streams the bytes of the file (or raw leaf) it names (spec.md §4.3's
    /// reader, wired to the DAG layer through [`unixfs::cat::cat`]).
    pub async fn get_stream<'a>(
        &'a self,
        path: impl Into<IpfsPath>,
    ) -> Result<impl futures::Stream<Item = Result<Vec<u8>, unixfs::cat::TraversalFailed>> + Send + 'a, unixfs::cat::TraversalFailed>
    {
        unixfs::cat::cat(self, path, None).await
    }

    /// Chunks, builds and persists `reader` as a UnixFS file tree (spec.md §4.3's builder),
    /// returning the root's `Cid`. Every block `FileAdder` produces is stored as it becomes ready,
    /// so a crash partway through still leaves a partial-but-consistent blockstore, just no root.
    pub async fn add_stream<R: AsyncRead + Unpin>(&self, mut reader: R) -> Result<Cid, Error> {
        let mut adder = ipfs_unixfs::FileAdder::new();
        let mut buf = vec![0u8; ipfs_unixfs::DEFAULT_CHUNK_SIZE];

        loop {
            let n = reader.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            let (blocks, consumed) = adder
                .push(&buf[..n])
                .map_err(|e| Error::invalid(format!("chunking failed: {}", e)))?;
            debug_assert_eq!(consumed, n, "FileAdder::push always consumes everything handed to it");
            for (cid, data) in blocks {
                self.put_block(Block::new(data.into_boxed_slice(), cid)).await?;
            }
        }

        let (blocks, root) = adder
            .finish()
            .map_err(|e| Error::invalid(format!("finishing file tree failed: {}", e)))?;
        for (cid, data) in blocks {
            self.put_block(Block::new(data.into_boxed_slice(), cid)).await?;
        }

        Ok(root)
    }

    /// Lists one directory's immediate entries (spec.md §4.7), transparently handling both the
    /// flat and HAMT-sharded encodings (spec.md §4.3).
    pub async fn ls(&self, root: &Cid) -> Result<Vec<(String, Cid, u64)>, Error> {
        use ipfs_unixfs::{FlatUnixFs, UnixFsType};

        let block = self.get_block(root).await?;
        let flat = FlatUnixFs::try_from(block.data())
            .map_err(|e| Error::invalid(format!("not a dag-pb/unixfs node: {}", e)))?;

        match flat.data.Type {
            UnixFsType::Directory => Ok(flat
                .links
                .iter()
                .filter_map(|l| {
                    let name = l.Name.as_deref()?.to_string();
                    let cid = CidT::try_from(l.Hash.as_deref()?).ok()?;
                    Some((name, cid, l.Tsize.unwrap_or(0)))
                })
                .collect()),
            UnixFsType::HAMTShard => {
                let mut out = Vec::new();
                self.ls_hamt_entries(root.clone(), &mut out).await?;
                Ok(out)
            }
            other => Err(Error::invalid(format!("{:?} is not a directory", other))),
        }
    }

    fn ls_hamt_entries<'a>(
        &'a self,
        shard: Cid,
        out: &'a mut Vec<(String, Cid, u64)>,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<(), Error>> + Send + 'a>> {
        use ipfs_unixfs::FlatUnixFs;

        Box::pin(async move {
            let block = self.get_block(&shard).await?;
            let flat = FlatUnixFs::try_from(block.data())
                .map_err(|e| Error::invalid(format!("not a dag-pb/unixfs node: {}", e)))?;

            for link in &flat.links {
                let name = link.Name.as_deref().unwrap_or("");
                if name.len() < 2 {
                    continue;
                }
                let (_slot, rest) = name.split_at(2);
                let hash = match &link.Hash {
                    Some(h) => h.as_ref(),
                    None => continue,
                };
                let cid = match CidT::try_from(hash) {
                    Ok(c) => c,
                    Err(_) => continue,
                };

                if !rest.is_empty() {
                    out.push((rest.to_string(), cid, link.Tsize.unwrap_or(0)));
                } else {
                    self.ls_hamt_entries(cid, out).await?;
                }
            }

            Ok(())
        })
    }

    /// Pins `root`; recursive pins traverse and record the whole closure, direct pins record only
    /// `root` itself (spec.md §4.4).
    pub async fn pin(&self, root: Cid, recursive: bool) -> Result<(), Error> {
        if recursive {
            self.pinner.pin_recursive(root).await
        } else {
            self.pinner.pin_direct(root).await
        }
    }

    pub async fn unpin(&self, root: &Cid, recursive: bool) -> Result<(), Error> {
        self.pinner.unpin(root, recursive).await
    }

    pub async fn is_pinned(&self, root: &Cid) -> Result<bool, Error> {
        self.pinner.is_pinned(self, root).await
    }

    /// Runs GC: deletes every locally-stored key outside `direct ∪ closure(recursive)`
    /// (spec.md §4.4). Serialized against new pins by `Pinner`'s own lock.
    pub async fn gc(&self) -> Result<Vec<Cid>, Error> {
        self.pinner.gc(self).await
    }

    /// Asks routing for up to `count` providers of `key` (spec.md §4.5).
    pub async fn find_providers(&self, key: Cid, count: usize) -> Result<Vec<PeerId>, Error> {
        let (tx, rx) = oneshot::channel();
        self.send_to_task(p2p::task::IpfsEvent::FindProviders(key, count, tx))?;
        rx.await.map_err(|_| Error::permanent("background task gone"))
    }

    /// Announces that this node holds `key` (spec.md §4.5's provider bootstrap/republish).
    pub async fn provide(&self, key: Cid) -> Result<(), Error> {
        self.send_to_task(p2p::task::IpfsEvent::Provide(key))
    }

    fn send_to_task(&self, event: p2p::task::IpfsEvent) -> Result<(), Error> {
        self.to_task
            .send(event)
            .map_err(|_| Error::permanent("background task is no longer running"))
    }
}

/// `tokio::select`-free race between a deadline and a fallible future, returning `Timeout` if the
/// deadline wins. Kept as a free function (rather than inlined with `futures::select!`) because
/// this crate's `futures` dependency omits the `async-await` feature that macro needs.
async fn tokio_select_value<F>(deadline: tokio::time::Delay, fut: F) -> Result<Block, Error>
where
    F: std::future::Future<Output = Result<Block, Error>>,
{
    match futures::future::select(Box::pin(deadline), Box::pin(fut)).await {
        Either::Left((_, _)) => Err(Error::Timeout),
        Either::Right((result, _)) => result,
    }
}
