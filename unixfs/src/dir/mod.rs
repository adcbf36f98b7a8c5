//! Directory building: a flat `Directory` node below `shard_split_threshold` entries, converted
//! in place to a [`hamt::HamtShard`] once that is exceeded. Mirrors go-ipfs
//! `unixfs/io/dirbuilder.go`'s `switchToSharding`: the conversion re-inserts every existing entry
//! into a fresh shard rather than attempting to bit-twiddle the flat node in place.

pub mod hamt;

use crate::hash::cid_for_dag_pb;
use crate::pb::{FlatUnixFs, PBLink, UnixFs, UnixFsType};
use cid::Cid;
use hamt::HamtShard;
use quick_protobuf::{MessageWrite, Writer};
use std::borrow::Cow;

/// Above this many entries a flat directory is converted to a HAMT. go-ipfs's default.
pub const DEFAULT_SHARD_SPLIT_THRESHOLD: usize = 1000;

/// One directory entry as tracked by the builder, independent of which representation (flat or
/// sharded) currently backs it.
#[derive(Clone, Debug, PartialEq)]
pub struct DirEntry {
    pub name: String,
    pub cid: Cid,
    pub size: u64,
}

enum Backing {
    /// Ordered by insertion; a repeated `add` of an existing name replaces it in place without
    /// moving its position (spec.md §4.3: "duplicate name on add replaces the prior link").
    Flat(Vec<DirEntry>),
    Sharded(HamtShard),
}

/// Builds a UnixFS directory node, flat or HAMT-sharded depending on how many entries it ends up
/// holding.
pub struct DirBuilder {
    backing: Backing,
    shard_split_threshold: usize,
}

impl Default for DirBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_SHARD_SPLIT_THRESHOLD)
    }
}

impl DirBuilder {
    pub fn new(shard_split_threshold: usize) -> Self {
        DirBuilder {
            backing: Backing::Flat(Vec::new()),
            shard_split_threshold,
        }
    }

    /// Adds (or replaces) an entry. Lazily converts from flat to sharded the moment this insertion
    /// pushes the flat entry count past the threshold.
    pub fn add(&mut self, name: String, cid: Cid, size: u64) {
        match &mut self.backing {
            Backing::Flat(entries) => {
                if let Some(existing) = entries.iter_mut().find(|e| e.name == name) {
                    existing.cid = cid;
                    existing.size = size;
                    return;
                }
                entries.push(DirEntry { name, cid, size });
                if entries.len() > self.shard_split_threshold {
                    self.switch_to_sharding();
                }
            }
            Backing::Sharded(shard) => shard.insert(name, cid, size),
        }
    }

    fn switch_to_sharding(&mut self) {
        let entries = match std::mem::replace(&mut self.backing, Backing::Sharded(HamtShard::new(0))) {
            Backing::Flat(entries) => entries,
            Backing::Sharded(_) => unreachable!("only called while still flat"),
        };

        let mut shard = HamtShard::new(0);
        for entry in entries {
            shard.insert(entry.name, entry.cid, entry.size);
        }
        self.backing = Backing::Sharded(shard);
    }

    pub fn remove(&mut self, name: &str) -> bool {
        match &mut self.backing {
            Backing::Flat(entries) => {
                let before = entries.len();
                entries.retain(|e| e.name != name);
                entries.len() != before
            }
            Backing::Sharded(shard) => shard.remove(name),
        }
    }

    pub fn get(&self, name: &str) -> Option<(Cid, u64)> {
        match &self.backing {
            Backing::Flat(entries) => entries
                .iter()
                .find(|e| e.name == name)
                .map(|e| (e.cid.clone(), e.size)),
            Backing::Sharded(shard) => shard.get(name).map(|(cid, size)| (cid.clone(), size)),
        }
    }

    pub fn is_sharded(&self) -> bool {
        matches!(self.backing, Backing::Sharded(_))
    }

    /// All entries, in insertion order while flat; in unspecified (slot) order once sharded, per
    /// spec.md §8: "iterating `list()` yields exactly those entries (in any order)".
    pub fn entries(&self) -> Vec<DirEntry> {
        match &self.backing {
            Backing::Flat(entries) => entries.clone(),
            Backing::Sharded(shard) => shard
                .entries()
                .into_iter()
                .map(|(name, cid, size)| DirEntry { name, cid, size })
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        match &self.backing {
            Backing::Flat(entries) => entries.len(),
            Backing::Sharded(shard) => shard.entries().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Encodes the directory (and, if sharded, every shard block) into dag-pb blocks in post-order
    /// and returns them alongside the root's `Cid` and the combined subtree size.
    pub fn finish(&self) -> Result<(Vec<(Cid, Vec<u8>)>, Cid, u64), quick_protobuf::Error> {
        match &self.backing {
            Backing::Flat(entries) => {
                let mut links = Vec::with_capacity(entries.len());
                let mut subtree_size = 0u64;
                for entry in entries {
                    links.push(PBLink {
                        Hash: Some(Cow::Owned(entry.cid.to_bytes())),
                        Name: Some(Cow::Owned(entry.name.clone())),
                        Tsize: Some(entry.size),
                    });
                    subtree_size += entry.size;
                }

                let node = FlatUnixFs {
                    links,
                    data: UnixFs {
                        Type: UnixFsType::Directory,
                        ..Default::default()
                    },
                };

                let mut bytes = Vec::with_capacity(node.get_size());
                {
                    let mut writer = Writer::new(&mut bytes);
                    node.write_message(&mut writer)?;
                }
                let cid = cid_for_dag_pb(&bytes);
                subtree_size += bytes.len() as u64;

                Ok((vec![(cid.clone(), bytes)], cid, subtree_size))
            }
            Backing::Sharded(shard) => shard.finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::cid_for_dag_pb;

    fn fixture_cid(n: usize) -> Cid {
        cid_for_dag_pb(format!("entry-{}", n).as_bytes())
    }

    #[test]
    fn flat_preserves_insertion_order() {
        let mut dir = DirBuilder::default();
        dir.add("b".into(), fixture_cid(1), 1);
        dir.add("a".into(), fixture_cid(2), 2);
        dir.add("c".into(), fixture_cid(3), 3);

        let names: Vec<_> = dir.entries().into_iter().map(|e| e.name).collect();
        assert_eq!(names, vec!["b", "a", "c"]);
        assert!(!dir.is_sharded());
    }

    #[test]
    fn duplicate_add_replaces_without_moving() {
        let mut dir = DirBuilder::default();
        dir.add("a".into(), fixture_cid(1), 1);
        dir.add("b".into(), fixture_cid(2), 2);
        dir.add("a".into(), fixture_cid(3), 30);

        let names: Vec<_> = dir.entries().into_iter().map(|e| e.name).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(dir.get("a").unwrap(), (fixture_cid(3), 30));
    }

    #[test]
    fn exceeding_threshold_switches_to_hamt_and_preserves_lookups() {
        let mut dir = DirBuilder::new(4);
        for i in 0..10 {
            dir.add(format!("entry-{}", i), fixture_cid(i), i as u64);
        }

        assert!(dir.is_sharded());
        for i in 0..10 {
            assert_eq!(dir.get(&format!("entry-{}", i)).unwrap().0, fixture_cid(i));
        }
        assert_eq!(dir.entries().len(), 10);
    }

    #[test]
    fn ten_thousand_entries_all_findable() {
        let mut dir = DirBuilder::default();
        for i in 0..10_000 {
            dir.add(format!("entry-{:06}", i), fixture_cid(i), 1);
        }

        assert!(dir.is_sharded());
        assert_eq!(dir.entries().len(), 10_000);
        assert_eq!(dir.get("entry-004242").unwrap().0, fixture_cid(4242));
    }
}
