//! Pinning (spec.md §4.4): the GC root set. Direct pins name one block; recursive pins name a
//! block whose *entire* DAG closure must survive; indirect pins are implicit — any key reachable
//! from a recursive root.
//!
//! The persisted pin index lives under the repo's data store keyed by pin kind, so restoring it
//! after a crash is two reads (`direct`, `recursive`) rather than a scan of the whole blockstore
//! (spec.md §4.4). For very large pin sets the original design calls for a HAMT-like on-disk
//! encoding of the set itself; here the set of *roots* (not their closures) is what's persisted,
//! and root sets stay small relative to their closures, so a sorted flat list is encoded instead —
//! see DESIGN.md for this simplification.

use crate::dag::{enumerate_children, IpldDag};
use crate::repo::{Column, DataStore, Repo, RepoTypes};
use crate::{Error, Ipfs, IpfsTypes};
use cid::Cid;
use std::collections::HashSet;
use std::convert::TryFrom;
use tokio::sync::RwLock;

const DIRECT_KEY: &[u8] = b"direct";
const RECURSIVE_KEY: &[u8] = b"recursive";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinMode {
    Direct,
    Recursive,
    /// Not a root itself, but covered by some recursive pin's closure.
    Indirect,
}

/// The pin set: direct and recursive root keys, persisted in the repo's data store under
/// [`Column::Pin`]. `gc` is serialized against new pins via an exclusive lock (spec.md §4.4: "GC
/// must be serialized against writers that add new pins").
pub struct Pinner<T: RepoTypes> {
    repo: Repo<T>,
    lock: RwLock<()>,
}

impl<T: RepoTypes> Pinner<T> {
    pub fn new(repo: Repo<T>) -> Self {
        Pinner {
            repo,
            lock: RwLock::new(()),
        }
    }

    async fn load_set(&self, key: &[u8]) -> Result<HashSet<Cid>, Error> {
        match self.repo.data_store().get(Column::Pin, key).await? {
            Some(bytes) => decode_set(&bytes),
            None => Ok(HashSet::new()),
        }
    }

    async fn save_set(&self, key: &[u8], set: &HashSet<Cid>) -> Result<(), Error> {
        self.repo.data_store().put(Column::Pin, key, &encode_set(set)).await
    }

    /// Records `k` in the recursive-root set. Does not itself require the closure to already be
    /// local — spec.md says pin_recursive *traverses* the closure (so a caller relying on
    /// `is_pinned` for a not-yet-fetched descendant still gets the right answer once it lands),
    /// but does not require every block to exist before the pin is durable.
    pub async fn pin_recursive(&self, k: Cid) -> Result<(), Error> {
        let _guard = self.lock.read().await;
        let mut set = self.load_set(RECURSIVE_KEY).await?;
        set.insert(k);
        self.save_set(RECURSIVE_KEY, &set).await
    }

    pub async fn pin_direct(&self, k: Cid) -> Result<(), Error> {
        let _guard = self.lock.read().await;
        let mut set = self.load_set(DIRECT_KEY).await?;
        set.insert(k);
        self.save_set(DIRECT_KEY, &set).await
    }

    pub async fn unpin(&self, k: &Cid, recursive: bool) -> Result<(), Error> {
        let _guard = self.lock.read().await;
        let key = if recursive { RECURSIVE_KEY } else { DIRECT_KEY };
        let mut set = self.load_set(key).await?;
        if !set.remove(k) {
            return Err(Error::NotPinned(k.clone()));
        }
        self.save_set(key, &set).await
    }

    /// `true` iff `k` is a direct pin or a descendant of some recursive root. Descendant-ness is
    /// computed on demand rather than cached, since a recursive root's closure can grow as new
    /// blocks are added under it.
    pub async fn is_pinned<Types: IpfsTypes>(&self, ipfs: &Ipfs<Types>, k: &Cid) -> Result<bool, Error> {
        let direct = self.load_set(DIRECT_KEY).await?;
        if direct.contains(k) {
            return Ok(true);
        }

        let recursive = self.load_set(RECURSIVE_KEY).await?;
        if recursive.contains(k) {
            return Ok(true);
        }

        let dag = IpldDag::new(ipfs.clone());
        for root in &recursive {
            let mut visited = HashSet::new();
            if enumerate_children(&dag, root.clone(), &mut visited).await.is_ok() && visited.contains(k) {
                return Ok(true);
            }
        }

        Ok(false)
    }

    pub async fn list_direct(&self) -> Result<Vec<Cid>, Error> {
        Ok(self.load_set(DIRECT_KEY).await?.into_iter().collect())
    }

    pub async fn list_recursive(&self) -> Result<Vec<Cid>, Error> {
        Ok(self.load_set(RECURSIVE_KEY).await?.into_iter().collect())
    }

    /// Reachable set = direct ∪ closure(recursive); everything in the blockstore outside it is
    /// deleted. Takes the pinning lock exclusively so concurrent `pin_*` calls can't race a block
    /// out of existence between "compute reachable" and "delete unreachable": new pins block on
    /// this call, but readers of already-pinned content are unaffected (spec.md §4.4, §5).
    pub async fn gc<Types: IpfsTypes>(&self, ipfs: &Ipfs<Types>) -> Result<Vec<Cid>, Error> {
        let _guard = self.lock.write().await;

        let direct = self.load_set(DIRECT_KEY).await?;
        let recursive = self.load_set(RECURSIVE_KEY).await?;

        let dag = IpldDag::new(ipfs.clone());
        let mut reachable: HashSet<Cid> = direct;
        for root in &recursive {
            reachable.insert(root.clone());
            enumerate_children(&dag, root.clone(), &mut reachable)
                .await
                .map_err(|e| Error::permanent(format!("pinned block unreadable during gc: {}", e)))?;
        }

        let mut removed = Vec::new();
        let mut keys = self.repo.block_store().list();
        use futures::stream::StreamExt;
        while let Some(cid) = keys.next().await {
            if !reachable.contains(&cid) {
                self.repo.block_store().remove(&cid).await?;
                removed.push(cid);
            }
        }

        Ok(removed)
    }
}

/// Encodes a pin set as a sorted, newline-joined list of base58btc `Cid`s. Simple on purpose: the
/// sets in question (direct + recursive roots) stay small relative to the blocks they cover,
/// unlike the full blockstore a large pin set's *closure* can reach.
fn encode_set(set: &HashSet<Cid>) -> Vec<u8> {
    let mut cids: Vec<String> = set.iter().map(|c| c.to_string()).collect();
    cids.sort();
    cids.join("\n").into_bytes()
}

fn decode_set(bytes: &[u8]) -> Result<HashSet<Cid>, Error> {
    let text = std::str::from_utf8(bytes).map_err(|e| Error::invalid(e.to_string()))?;
    text.lines()
        .filter(|l| !l.is_empty())
        .map(|l| Cid::try_from(l).map_err(|e| Error::invalid(e.to_string())))
        .collect()
}
