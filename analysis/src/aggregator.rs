//! Ranked principal-variation collection.

use crate::types::PrincipalVariation;

/// Lines keyed by rank, kept sorted ascending with no duplicate ranks.
///
/// Engines emit `multipv` lines in no particular order; last write wins per
/// rank, so the leaderboard is stable regardless of arrival order.
#[derive(Debug, Clone, Default)]
pub struct PvAggregator {
    lines: Vec<PrincipalVariation>,
}

impl PvAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the line with the same rank, or insert it.
    pub fn upsert(&mut self, pv: PrincipalVariation) {
        match self.lines.iter_mut().find(|line| line.rank == pv.rank) {
            Some(existing) => *existing = pv,
            None => self.lines.push(pv),
        }
        self.lines.sort_by_key(|line| line.rank);
    }

    /// The rank-1 line, if the engine has reported one.
    pub fn best(&self) -> Option<&PrincipalVariation> {
        self.get(1)
    }

    pub fn get(&self, rank: u32) -> Option<&PrincipalVariation> {
        self.lines.iter().find(|line| line.rank == rank)
    }

    pub fn lines(&self) -> &[PrincipalVariation] {
        &self.lines
    }

    pub(crate) fn lines_mut(&mut self) -> &mut [PrincipalVariation] {
        &mut self.lines
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EngineEvaluation;
    use chess::PlayerSide;
    use proptest::prelude::*;

    fn pv(rank: u32, depth: u32, cp: i32, moves: &[&str]) -> PrincipalVariation {
        PrincipalVariation {
            rank,
            depth,
            evaluation: EngineEvaluation::Centipawns {
                value: cp,
                perspective: PlayerSide::White,
            },
            moves: moves.iter().map(|m| m.to_string()).collect(),
            notation: Vec::new(),
        }
    }

    #[test]
    fn test_upsert_replaces_same_rank() {
        let mut agg = PvAggregator::new();
        agg.upsert(pv(1, 10, 35, &["e2e4", "e7e5"]));
        agg.upsert(pv(1, 11, 20, &["d2d4"]));

        assert_eq!(agg.len(), 1);
        let best = agg.best().unwrap();
        assert_eq!(best.depth, 11);
        assert_eq!(best.moves, vec!["d2d4".to_string()]);
    }

    #[test]
    fn test_out_of_order_ranks_are_sorted() {
        let mut agg = PvAggregator::new();
        agg.upsert(pv(3, 10, -5, &["c2c4"]));
        agg.upsert(pv(1, 10, 35, &["e2e4"]));
        agg.upsert(pv(2, 10, 20, &["d2d4"]));

        let ranks: Vec<u32> = agg.lines().iter().map(|l| l.rank).collect();
        assert_eq!(ranks, vec![1, 2, 3]);
    }

    #[test]
    fn test_best_requires_rank_one() {
        let mut agg = PvAggregator::new();
        agg.upsert(pv(2, 10, 20, &["d2d4"]));
        assert!(agg.best().is_none());
        assert!(agg.get(2).is_some());
    }

    proptest! {
        #[test]
        fn prop_sorted_unique_and_last_write_wins(
            updates in prop::collection::vec((1u32..6, 0u32..30, -500i32..500), 0..40)
        ) {
            let mut agg = PvAggregator::new();
            for (rank, depth, cp) in &updates {
                agg.upsert(pv(*rank, *depth, *cp, &["e2e4"]));
            }

            let ranks: Vec<u32> = agg.lines().iter().map(|l| l.rank).collect();
            prop_assert!(ranks.windows(2).all(|w| w[0] < w[1]));

            for line in agg.lines() {
                let last = updates.iter().rev().find(|(rank, _, _)| *rank == line.rank).unwrap();
                prop_assert_eq!(line.depth, last.1);
                prop_assert_eq!(
                    line.evaluation,
                    EngineEvaluation::Centipawns { value: last.2, perspective: PlayerSide::White }
                );
            }
        }
    }
}
