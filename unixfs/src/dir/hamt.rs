//! A HAMT-sharded directory: entries are distributed across `WIDTH` slots by hashing their name,
//! and a slot that would otherwise hold two colliding entries is promoted to a child shard one
//! level deeper instead. Mirrors the shape go-ipfs's `unixfs/io/dirbuilder.go` switches a flat
//! directory to once it grows past the split threshold, with one deliberate simplification: we
//! hash names with sha2-256 (the one hash primitive this crate already depends on) rather than
//! go-ipfs's murmur3, so the `hashType` code stored on the node is a self-consistent marker for
//! this crate, not interoperable with go-ipfs's on-wire HAMT directories.
use crate::hash::cid_for_dag_pb;
use crate::pb::{FlatUnixFs, PBLink, UnixFs, UnixFsType};
use cid::Cid;
use quick_protobuf::{MessageWrite, Writer};
use std::borrow::Cow;

/// Default fan-out of a shard: one byte of the name's hash selects one of 256 slots per level.
pub const WIDTH: usize = 256;

/// Marks the hash function used to place entries in this crate's HAMT shards. Not one of the
/// codes go-ipfs's HAMT uses; see the module documentation.
const HASH_CODE: u64 = 0x00b2_0000;

enum Slot {
    Leaf { name: String, cid: Cid, size: u64 },
    Shard(Box<HamtShard>),
}

/// One level of a HAMT-sharded directory, holding up to `WIDTH` slots.
pub struct HamtShard {
    depth: usize,
    slots: Vec<Option<Slot>>,
}

impl HamtShard {
    pub fn new(depth: usize) -> Self {
        let mut slots = Vec::with_capacity(WIDTH);
        slots.resize_with(WIDTH, || None);
        HamtShard { depth, slots }
    }

    fn slot_index(name: &str, depth: usize) -> usize {
        let digest = multihash::Sha2_256::digest(name.as_bytes());
        let bytes = digest.digest();
        bytes[depth % bytes.len()] as usize
    }

    /// Inserts or replaces the entry named `name`. A name already present at this exact depth is
    /// overwritten in place; a name that collides with a different existing name at this depth's
    /// slot pushes both down into a freshly created child shard.
    pub fn insert(&mut self, name: String, cid: Cid, size: u64) {
        let idx = Self::slot_index(&name, self.depth);
        match self.slots[idx].take() {
            None => {
                self.slots[idx] = Some(Slot::Leaf { name, cid, size });
            }
            Some(Slot::Leaf {
                name: existing_name,
                cid: existing_cid,
                size: existing_size,
            }) => {
                if existing_name == name {
                    self.slots[idx] = Some(Slot::Leaf { name, cid, size });
                } else {
                    let mut child = HamtShard::new(self.depth + 1);
                    child.insert(existing_name, existing_cid, existing_size);
                    child.insert(name, cid, size);
                    self.slots[idx] = Some(Slot::Shard(Box::new(child)));
                }
            }
            Some(Slot::Shard(mut child)) => {
                child.insert(name, cid, size);
                self.slots[idx] = Some(Slot::Shard(child));
            }
        }
    }

    /// Removes the named entry, if present anywhere beneath this shard. Returns whether anything
    /// was removed. Does not collapse now-empty child shards back into a leaf slot; a directory
    /// with heavy churn keeps whatever shard depth it grew to.
    pub fn remove(&mut self, name: &str) -> bool {
        let idx = Self::slot_index(name, self.depth);
        match self.slots[idx].as_mut() {
            Some(Slot::Leaf { name: existing, .. }) if existing == name => {
                self.slots[idx] = None;
                true
            }
            Some(Slot::Shard(child)) => child.remove(name),
            _ => false,
        }
    }

    pub fn get(&self, name: &str) -> Option<(&Cid, u64)> {
        let idx = Self::slot_index(name, self.depth);
        match self.slots[idx].as_ref() {
            Some(Slot::Leaf {
                name: existing,
                cid,
                size,
            }) if existing == name => Some((cid, *size)),
            Some(Slot::Shard(child)) => child.get(name),
            _ => None,
        }
    }

    /// All `(name, cid, size)` entries reachable from this shard, in slot order (not insertion
    /// order: this is a lookup structure, not an ordered listing).
    pub fn entries(&self) -> Vec<(String, Cid, u64)> {
        let mut out = Vec::new();
        self.collect_entries(&mut out);
        out
    }

    fn collect_entries(&self, out: &mut Vec<(String, Cid, u64)>) {
        for slot in &self.slots {
            match slot {
                Some(Slot::Leaf { name, cid, size }) => out.push((name.clone(), cid.clone(), *size)),
                Some(Slot::Shard(child)) => child.collect_entries(out),
                None => {}
            }
        }
    }

    /// Encodes this shard, and recursively every child shard, into dag-pb blocks in post-order
    /// (children before their parent). Returns all produced blocks, the root shard's `Cid`, and the
    /// combined byte size of the subtree.
    pub fn finish(&self) -> Result<(Vec<(Cid, Vec<u8>)>, Cid, u64), quick_protobuf::Error> {
        let mut blocks = Vec::new();
        let mut links = Vec::with_capacity(self.populated_len());
        let mut subtree_size = 0u64;

        for (idx, slot) in self.slots.iter().enumerate() {
            match slot {
                None => {}
                Some(Slot::Leaf { name, cid, size }) => {
                    links.push(PBLink {
                        Hash: Some(Cow::Owned(cid.to_bytes())),
                        Name: Some(Cow::Owned(format!("{:02X}{}", idx, name))),
                        Tsize: Some(*size),
                    });
                    subtree_size += size;
                }
                Some(Slot::Shard(child)) => {
                    let (mut child_blocks, child_cid, child_size) = child.finish()?;
                    blocks.append(&mut child_blocks);
                    links.push(PBLink {
                        Hash: Some(Cow::Owned(child_cid.to_bytes())),
                        Name: Some(Cow::Owned(format!("{:02X}", idx))),
                        Tsize: Some(child_size),
                    });
                    subtree_size += child_size;
                }
            }
        }

        let node = FlatUnixFs {
            links,
            data: UnixFs {
                Type: UnixFsType::HAMTShard,
                Data: Some(Cow::Owned(self.bitfield_bytes())),
                filesize: None,
                blocksizes: Vec::new(),
                hashType: Some(HASH_CODE),
                fanout: Some(WIDTH as u64),
                mode: None,
                mtime: None,
            },
        };

        let mut bytes = Vec::with_capacity(node.get_size());
        {
            let mut writer = Writer::new(&mut bytes);
            node.write_message(&mut writer)?;
        }

        let cid = cid_for_dag_pb(&bytes);
        subtree_size += bytes.len() as u64;
        blocks.push((cid.clone(), bytes));

        Ok((blocks, cid, subtree_size))
    }

    fn populated_len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    fn bitfield_bytes(&self) -> Vec<u8> {
        let mut bytes = vec![0u8; WIDTH / 8];
        for (idx, slot) in self.slots.iter().enumerate() {
            if slot.is_some() {
                bytes[idx / 8] |= 1 << (idx % 8);
            }
        }
        bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::TryFrom;

    fn fixture_cid(n: usize) -> Cid {
        let bytes = format!("fixture-{}", n);
        cid_for_dag_pb(bytes.as_bytes())
    }

    #[test]
    fn insert_and_get_roundtrip() {
        let mut shard = HamtShard::new(0);
        for i in 0..2000 {
            shard.insert(format!("entry-{}", i), fixture_cid(i), i as u64);
        }

        for i in 0..2000 {
            let (cid, size) = shard.get(&format!("entry-{}", i)).expect("entry present");
            assert_eq!(cid, &fixture_cid(i));
            assert_eq!(size, i as u64);
        }

        assert_eq!(shard.entries().len(), 2000);
    }

    #[test]
    fn overwrite_replaces_value() {
        let mut shard = HamtShard::new(0);
        shard.insert("same".into(), fixture_cid(1), 10);
        shard.insert("same".into(), fixture_cid(2), 20);

        let (cid, size) = shard.get("same").unwrap();
        assert_eq!(cid, &fixture_cid(2));
        assert_eq!(size, 20);
        assert_eq!(shard.entries().len(), 1);
    }

    #[test]
    fn remove_drops_entry() {
        let mut shard = HamtShard::new(0);
        shard.insert("gone-tomorrow".into(), fixture_cid(1), 1);
        assert!(shard.remove("gone-tomorrow"));
        assert!(shard.get("gone-tomorrow").is_none());
        assert!(!shard.remove("gone-tomorrow"));
    }

    #[test]
    fn finish_produces_root_and_child_blocks() {
        let mut shard = HamtShard::new(0);
        for i in 0..500 {
            shard.insert(format!("many-{}", i), fixture_cid(i), 4);
        }

        let (blocks, root, _size) = shard.finish().unwrap();
        assert!(!blocks.is_empty());
        assert_eq!(blocks.last().unwrap().0, root);

        let _ = Cid::try_from(root.to_bytes()).expect("root cid round-trips through bytes");
    }
}
