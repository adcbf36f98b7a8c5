//! The Merkle DAG service (spec.md §4.2, supplemented by SPEC_FULL.md §4.2): generic,
//! UnixFS-agnostic node manipulation (`add`/`add_recursive`/`get`/`remove_link`/`update_link`,
//! `enumerate_children`/`fetch_graph`) plus `resolve`, which *is* UnixFS-aware because following a
//! named path segment through a directory means knowing whether that directory is flat or
//! HAMT-sharded.

use crate::{Block, Error, Ipfs, IpfsPath, IpfsTypes};
use cid::Cid;
use ipfs_unixfs::{cid_for_dag_pb, FlatUnixFs, UnixFsType};
use std::collections::{HashSet, VecDeque};
use std::convert::TryFrom;
use std::pin::Pin;

/// One outgoing, named edge of a [`Node`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Link {
    pub name: String,
    pub size: u64,
    pub cid: Cid,
}

/// A content-addressed Merkle DAG node: an ordered sequence of named links plus an opaque data
/// payload (the embedded UnixFS record, for the trees this crate builds; arbitrary bytes for
/// anything dag-pb shaped that arrived from elsewhere).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Node {
    pub data: Vec<u8>,
    pub links: Vec<Link>,
}

impl Node {
    pub fn new(data: Vec<u8>, links: Vec<Link>) -> Self {
        Node { data, links }
    }

    pub fn encode(&self) -> Vec<u8> {
        use ipfs_unixfs::pb::merkledag::PBNode;
        use quick_protobuf::{MessageWrite, Writer};
        use std::borrow::Cow;

        let node = PBNode {
            Data: if self.data.is_empty() {
                None
            } else {
                Some(Cow::Borrowed(self.data.as_slice()))
            },
            Links: self
                .links
                .iter()
                .map(|l| ipfs_unixfs::PBLink {
                    Hash: Some(Cow::Owned(l.cid.to_bytes())),
                    Name: Some(Cow::Borrowed(l.name.as_str())),
                    Tsize: Some(l.size),
                })
                .collect(),
        };

        let mut bytes = Vec::with_capacity(node.get_size());
        let mut writer = Writer::new(&mut bytes);
        node.write_message(&mut writer).expect("Vec<u8> writer never fails");
        bytes
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, Error> {
        use ipfs_unixfs::pb::merkledag::PBNode;
        use quick_protobuf::{BytesReader, MessageRead};

        let mut reader = BytesReader::from_bytes(bytes);
        let raw = PBNode::from_reader(&mut reader, bytes)
            .map_err(|e| Error::invalid(format!("malformed dag-pb node: {}", e)))?;

        let mut links = Vec::with_capacity(raw.Links.len());
        for (i, link) in raw.Links.into_iter().enumerate() {
            let hash = link
                .Hash
                .ok_or_else(|| Error::invalid(format!("link #{} missing hash", i)))?;
            let cid = Cid::try_from(hash.as_ref())
                .map_err(|e| Error::invalid(format!("link #{} has invalid cid: {}", i, e)))?;
            links.push(Link {
                name: link.Name.map(|n| n.into_owned()).unwrap_or_default(),
                size: link.Tsize.unwrap_or(0),
                cid,
            });
        }

        Ok(Node {
            data: raw.Data.map(|d| d.into_owned()).unwrap_or_default(),
            links,
        })
    }

    pub fn cid(&self) -> Cid {
        cid_for_dag_pb(&self.encode())
    }

    /// Removes the first link named `name`; a second call removes the next occurrence. Leaves the
    /// order of the remaining links unchanged.
    pub fn remove_link(&mut self, name: &str) -> bool {
        if let Some(pos) = self.links.iter().position(|l| l.name == name) {
            self.links.remove(pos);
            true
        } else {
            false
        }
    }

    /// Returns a new node (a new `Cid`, since the node is immutable) with the first link named
    /// `name` pointed at `new_target` instead.
    pub fn update_link(&self, name: &str, new_target: Cid, new_size: u64) -> Result<Node, Error> {
        let mut updated = self.clone();
        match updated.links.iter_mut().find(|l| l.name == name) {
            Some(link) => {
                link.cid = new_target;
                link.size = new_size;
                Ok(updated)
            }
            None => Err(Error::invalid(format!("no link named {:?}", name))),
        }
    }
}

/// What a path resolution landed on, and whether it can be handed to the UnixFS file reader.
pub struct Resolved {
    pub cid: Cid,
    bytes: Box<[u8]>,
    unixfs_type: Option<UnixFsType>,
}

impl Resolved {
    /// Converts the resolved node into the raw block a UnixFS file reader can start walking from.
    /// Only `File` and `Raw` nodes qualify; anything else (directories, HAMT shards, non-UnixFS
    /// dag-pb) is a caller error the spec calls `UnexpectedResolved`.
    pub fn into_unixfs_block(self) -> Result<Block, UnexpectedResolved> {
        match self.unixfs_type {
            Some(UnixFsType::File) | Some(UnixFsType::Raw) => Ok(Block::new(self.bytes, self.cid)),
            _ => Err(UnexpectedResolved(self.cid)),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("path resolved to a node that isn't a UnixFS file or raw leaf: {0}")]
pub struct UnexpectedResolved(pub Cid);

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("failed to load {0}: {1}")]
    Loading(Cid, Error),
    #[error("no link named {0:?} under {1}")]
    NoSuchLink(String, Cid),
    #[error("path continues past a non-directory node at {0}")]
    NotADirectory(Cid),
}

/// The Merkle DAG service: `add`/`get`/`resolve` are thin wrappers around [`Ipfs::put_block`] and
/// [`Ipfs::get_block`], so a blockstore miss transparently becomes a bitswap fetch (spec.md §2's
/// read data-flow) without this module needing to know the exchange exists.
#[derive(Clone)]
pub struct IpldDag<Types: IpfsTypes> {
    ipfs: Ipfs<Types>,
}

impl<Types: IpfsTypes> IpldDag<Types> {
    pub fn new(ipfs: Ipfs<Types>) -> Self {
        IpldDag { ipfs }
    }

    /// Serializes `node` and stores it; a node whose key already exists locally is a no-op put
    /// (spec.md §4.2).
    pub async fn put(&self, node: &Node) -> Result<Cid, Error> {
        let cid = node.cid();
        let block = Block::new(node.encode().into_boxed_slice(), cid.clone());
        self.ipfs.put_block(block).await?;
        Ok(cid)
    }

    /// Post-order add: every child is added before its parent. `roots` is visited depth-first,
    /// deduplicating already-added keys the same way `enumerate_children` does.
    pub async fn add_recursive(&self, root: &Node, mut load_child: impl FnMut(&Cid) -> Option<Node>) -> Result<Cid, Error> {
        let mut seen = HashSet::new();
        self.add_recursive_inner(root, &mut load_child, &mut seen).await
    }

    fn add_recursive_inner<'a>(
        &'a self,
        node: &'a Node,
        load_child: &'a mut impl FnMut(&Cid) -> Option<Node>,
        seen: &'a mut HashSet<Cid>,
    ) -> Pin<Box<dyn std::future::Future<Output = Result<Cid, Error>> + 'a>> {
        Box::pin(async move {
            for link in &node.links {
                if seen.contains(&link.cid) {
                    continue;
                }
                if let Some(child) = load_child(&link.cid) {
                    self.add_recursive_inner(&child, load_child, seen).await?;
                }
                seen.insert(link.cid.clone());
            }
            self.put(node).await
        })
    }

    pub async fn get(&self, cid: &Cid) -> Result<Node, Error> {
        let block = self.ipfs.get_block(cid).await?;
        Node::decode(&block.data)
    }

    /// Blockstore-only lookup: `NotFound` immediately on a miss, no bitswap fallback. Used by
    /// [`enumerate_children`], which must not go out to the network for a pin/GC walk.
    async fn get_local(&self, cid: &Cid) -> Result<Node, Error> {
        let block = self.ipfs.get_block_local(cid).await?;
        Node::decode(&block.data)
    }

    /// Follows `path.path()` one named link at a time, starting from `path.root()`. Directories
    /// are resolved by a plain link-name match; HAMT shards are resolved by the shard-slot naming
    /// convention `dir::hamt::HamtShard::finish` writes (`"{slot:02X}{name}"` for a leaf,
    /// `"{slot:02X}"` for a child shard), recursing into child shards as needed.
    pub async fn resolve(&self, path: IpfsPath, _follow_unixfs: bool) -> Result<(Resolved, Vec<String>), ResolveError> {
        let mut cid = path.root().clone();
        let mut bytes = self.load(&cid).await?;
        let mut remaining = path.path().to_vec();
        let mut consumed = 0;

        for segment in path.path() {
            let flat = FlatUnixFs::try_from(bytes.as_ref())
                .map_err(|_| ResolveError::NotADirectory(cid.clone()))?;

            let next = match flat.data.Type {
                UnixFsType::Directory => find_flat_link(&flat, segment)
                    .ok_or_else(|| ResolveError::NoSuchLink(segment.clone(), cid.clone()))?,
                UnixFsType::HAMTShard => self
                    .resolve_hamt(&flat, segment)
                    .await?
                    .ok_or_else(|| ResolveError::NoSuchLink(segment.clone(), cid.clone()))?,
                _ => return Err(ResolveError::NotADirectory(cid.clone())),
            };

            cid = next;
            bytes = self.load(&cid).await?;
            consumed += 1;
        }

        remaining.drain(..consumed);

        let unixfs_type = FlatUnixFs::try_from(bytes.as_ref()).ok().map(|f| f.data.Type);
        Ok((
            Resolved {
                cid,
                bytes,
                unixfs_type,
            },
            remaining,
        ))
    }

    fn resolve_hamt<'a>(
        &'a self,
        shard: &'a FlatUnixFs<'a>,
        segment: &'a str,
    ) -> Pin<Box<dyn std::future::Future<Output = Result<Option<Cid>, ResolveError>> + 'a>> {
        Box::pin(async move {
            for link in &shard.links {
                let name = link.Name.as_deref().unwrap_or("");
                if name.len() < 2 {
                    continue;
                }
                let (_slot, rest) = name.split_at(2);
                let hash = match &link.Hash {
                    Some(h) => h.as_ref(),
                    None => continue,
                };
                let child_cid = match Cid::try_from(hash) {
                    Ok(c) => c,
                    Err(_) => continue,
                };

                if rest == segment {
                    return Ok(Some(child_cid));
                }

                if rest.is_empty() {
                    // A child shard: its slot alone occupies the name, recurse into it.
                    let child_bytes = self.load(&child_cid).await?;
                    let child_flat = match FlatUnixFs::try_from(child_bytes.as_ref()) {
                        Ok(f) => f,
                        Err(_) => continue,
                    };
                    if let Some(found) = self.resolve_hamt(&child_flat, segment).await? {
                        return Ok(Some(found));
                    }
                }
            }
            Ok(None)
        })
    }

    async fn load(&self, cid: &Cid) -> Result<Box<[u8]>, ResolveError> {
        self.ipfs
            .get_block(cid)
            .await
            .map(|b| b.data)
            .map_err(|e| ResolveError::Loading(cid.clone(), e))
    }
}

fn find_flat_link(flat: &FlatUnixFs<'_>, name: &str) -> Option<Cid> {
    flat.links.iter().find_map(|l| {
        if l.Name.as_deref() == Some(name) {
            Cid::try_from(l.Hash.as_deref()?).ok()
        } else {
            None
        }
    })
}

/// Iterative DFS over `root`'s closure, inserting every visited key into `visited`. A child
/// already present in `visited` has its subtree skipped — this is a DAG, not a tree, and the same
/// block may be linked from more than one parent.
///
/// A blockstore-only walk (spec.md §4.2): every `get` here goes through [`IpldDag::get_local`], so
/// a block missing locally fails the walk immediately instead of falling back to the exchange.
/// Used by pinning and GC, which must never block on the network to decide what's reachable.
pub async fn enumerate_children<Types: IpfsTypes>(
    dag: &IpldDag<Types>,
    root: Cid,
    visited: &mut HashSet<Cid>,
) -> Result<(), Error> {
    let mut stack = VecDeque::new();
    stack.push_back(root);

    while let Some(cid) = stack.pop_front() {
        if !visited.insert(cid.clone()) {
            continue;
        }
        let node = dag.get_local(&cid).await?;
        for link in node.links {
            if !visited.contains(&link.cid) {
                stack.push_back(link.cid);
            }
        }
    }

    Ok(())
}

/// Same traversal as [`enumerate_children`], named separately per spec.md §4.2: every `get` here
/// goes through [`IpldDag::get`], so a missing block is fetched over the exchange rather than
/// failing immediately, unlike the blockstore-only walk above.
pub async fn fetch_graph<Types: IpfsTypes>(
    dag: &IpldDag<Types>,
    root: Cid,
    visited: &mut HashSet<Cid>,
) -> Result<(), Error> {
    let mut stack = VecDeque::new();
    stack.push_back(root);

    while let Some(cid) = stack.pop_front() {
        if !visited.insert(cid.clone()) {
            continue;
        }
        let node = dag.get(&cid).await?;
        for link in node.links {
            if !visited.contains(&link.cid) {
                stack.push_back(link.cid);
            }
        }
    }

    Ok(())
}
