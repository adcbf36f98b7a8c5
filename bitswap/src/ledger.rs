//! Per-peer bookkeeping: what they want from us, what we've sent and received, and the running
//! debt ratio the [`crate::strategy::Strategy`] reads to decide whether to keep serving them.

use crate::message::{merge_delta, BitswapMessage, Entry};
use cid::Cid;
use std::collections::HashMap;

pub type Priority = i32;

/// Byte accounting for a single remote peer, used by the debt-ratio strategy.
#[derive(Debug, Default, Clone, Copy)]
pub struct Stats {
    pub bytes_sent: u64,
    pub bytes_recv: u64,
}

impl Stats {
    /// `bytes_sent / max(1, bytes_recv)`. Never divides by zero; a brand new peer with no received
    /// bytes yet has ratio equal to `bytes_sent` itself, which is fine since `bytes_sent` is also
    /// zero for a peer we haven't served.
    pub fn debt_ratio(&self) -> f64 {
        self.bytes_sent as f64 / (self.bytes_recv.max(1)) as f64
    }
}

/// The full accounting record kept for one remote peer for as long as we have a session with them.
#[derive(Debug, Default)]
pub struct Ledger {
    stats: Stats,
    /// Keys the peer has told us (via their wantlist entries) that they want from us.
    their_wantlist: HashMap<Cid, Priority>,
    /// True once we've sent this peer a `full = true` snapshot at least once; governs whether the
    /// next outgoing message to them may be a delta.
    sent_full_snapshot: bool,
}

impl Ledger {
    pub fn new() -> Self {
        Ledger::default()
    }

    pub fn stats(&self) -> Stats {
        self.stats
    }

    pub fn record_sent(&mut self, bytes: u64) {
        self.stats.bytes_sent += bytes;
    }

    pub fn record_received(&mut self, bytes: u64) {
        self.stats.bytes_recv += bytes;
    }

    /// Folds an incoming message's wantlist into what we remember this peer wanting.
    pub fn receive_wantlist(&mut self, full: bool, entries: &[Entry]) {
        if full {
            self.their_wantlist.clear();
        }
        merge_delta(&mut self.their_wantlist, entries);
    }

    pub fn wants(&self, cid: &Cid) -> bool {
        self.their_wantlist.contains_key(cid)
    }

    pub fn wanted_priority(&self, cid: &Cid) -> Option<Priority> {
        self.their_wantlist.get(cid).copied()
    }

    pub fn their_wantlist(&self) -> impl Iterator<Item = (&Cid, Priority)> {
        self.their_wantlist.iter().map(|(k, v)| (k, *v))
    }

    pub fn forget_want(&mut self, cid: &Cid) {
        self.their_wantlist.remove(cid);
    }

    /// Whether the next message sent to this peer must be `full = true`. True exactly once per
    /// session: the first message after a connection is established.
    pub fn needs_full_snapshot(&self) -> bool {
        !self.sent_full_snapshot
    }

    pub fn mark_full_snapshot_sent(&mut self) {
        self.sent_full_snapshot = true;
    }
}

/// Tracks the local node's own outstanding wants, independent of any peer.
#[derive(Debug, Default)]
pub struct LocalWantlist {
    wants: HashMap<Cid, Priority>,
}

impl LocalWantlist {
    pub fn insert(&mut self, cid: Cid, priority: Priority) {
        self.wants.insert(cid, priority);
    }

    pub fn remove(&mut self, cid: &Cid) -> bool {
        self.wants.remove(cid).is_some()
    }

    pub fn contains(&self, cid: &Cid) -> bool {
        self.wants.contains_key(cid)
    }

    pub fn snapshot(&self) -> BitswapMessage {
        let mut msg = BitswapMessage::new(true);
        for (cid, priority) in &self.wants {
            msg.want_block(cid.clone(), *priority);
        }
        msg
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Cid, Priority)> {
        self.wants.iter().map(|(k, v)| (k, *v))
    }

    pub fn len(&self) -> usize {
        self.wants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wants.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cid::Codec;
    use multihash::Sha2_256;

    fn cid_of(bytes: &[u8]) -> Cid {
        Cid::new_v1(Codec::Raw, Sha2_256::digest(bytes))
    }

    #[test]
    fn debt_ratio_does_not_divide_by_zero() {
        let stats = Stats::default();
        assert_eq!(stats.debt_ratio(), 0.0);
    }

    #[test]
    fn full_then_delta_wantlist() {
        let mut ledger = Ledger::new();
        let a = cid_of(b"a");
        let b = cid_of(b"b");

        ledger.receive_wantlist(true, &[Entry::new(a.clone(), 1), Entry::new(b.clone(), 1)]);
        assert!(ledger.wants(&a) && ledger.wants(&b));

        ledger.receive_wantlist(false, &[Entry::cancel(a.clone())]);
        assert!(!ledger.wants(&a));
        assert!(ledger.wants(&b));
    }

    #[test]
    fn full_snapshot_sent_once() {
        let mut ledger = Ledger::new();
        assert!(ledger.needs_full_snapshot());
        ledger.mark_full_snapshot_sent();
        assert!(!ledger.needs_full_snapshot());
    }
}
