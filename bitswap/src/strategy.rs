//! Advisory peer-selection strategy: correctness of the exchange never depends on this, only
//! fairness under contention.

use crate::ledger::Stats;
use libp2p_core::PeerId;

/// Decides whether a wanted block should be served to a given peer right now, and how to order
/// multiple peers competing for the same outbound bandwidth.
pub trait Strategy: Send + Sync + 'static {
    /// Whether a block should be sent to a peer with the given accounting.
    fn should_send(&self, stats: &Stats) -> bool;

    /// Orders candidate peers from most to least preferred to serve next, given their `(peer,
    /// stats)` pairs. Default: increasing debt ratio, as specified.
    fn order_peers(&self, mut candidates: Vec<(PeerId, Stats)>) -> Vec<PeerId> {
        candidates.sort_by(|(_, a), (_, b)| {
            a.debt_ratio()
                .partial_cmp(&b.debt_ratio())
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        candidates.into_iter().map(|(p, _)| p).collect()
    }
}

/// `ratio = bytes_sent_to_them / max(1, bytes_recv_from_them)`; serve iff `ratio < r_max`.
#[derive(Debug, Clone, Copy)]
pub struct DebtRatioStrategy {
    pub r_max: f64,
}

impl Default for DebtRatioStrategy {
    fn default() -> Self {
        DebtRatioStrategy { r_max: 2.0 }
    }
}

impl Strategy for DebtRatioStrategy {
    fn should_send(&self, stats: &Stats) -> bool {
        stats.debt_ratio() < self.r_max
    }
}

/// Serves every wanted block unconditionally; useful for tests and for a node that wants to act as
/// a pure seeder regardless of reciprocation.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysSend;

impl Strategy for AlwaysSend {
    fn should_send(&self, _stats: &Stats) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debt_ratio_gate() {
        let strategy = DebtRatioStrategy::default();
        let under = Stats {
            bytes_sent: 10,
            bytes_recv: 10,
        };
        let over = Stats {
            bytes_sent: 100,
            bytes_recv: 10,
        };
        assert!(strategy.should_send(&under));
        assert!(!strategy.should_send(&over));
    }

    #[test]
    fn orders_by_increasing_ratio() {
        let strategy = DebtRatioStrategy::default();
        let a = PeerId::random();
        let b = PeerId::random();
        let candidates = vec![
            (
                a.clone(),
                Stats {
                    bytes_sent: 20,
                    bytes_recv: 10,
                },
            ),
            (
                b.clone(),
                Stats {
                    bytes_sent: 5,
                    bytes_recv: 10,
                },
            ),
        ];
        let ordered = strategy.order_peers(candidates);
        assert_eq!(ordered, vec![b, a]);
    }
}
