//! Round tallies and their inverted index.
//!
//! Both views are rebuilt each round. The index is a sorted map from exact
//! tally to the candidates holding it, with candidates inserted in canonical
//! order so tie lists never depend on hash iteration.

use std::collections::BTreeMap;

use num_traits::Zero;

use crate::ballot::CandidateIndex;
use crate::fraction::Weight;

/// Per-round tallies for continuing candidates plus the exhaustion buckets.
/// The buckets are cumulative over the whole run.
#[derive(Debug, Clone)]
pub(crate) struct RoundTally {
    pub votes: BTreeMap<CandidateIndex, Weight>,
    pub exhausted: Weight,
    pub overvote: Weight,
    pub skipped: Weight,
}

impl RoundTally {
    pub fn continuing_total(&self) -> Weight {
        let mut total = Weight::zero();
        for w in self.votes.values() {
            total += w;
        }
        total
    }
}

/// Inverted view: exact tally to insertion-ordered candidates at that tally.
pub(crate) type TallyIndex = BTreeMap<Weight, Vec<CandidateIndex>>;

/// Build the inverted index over `votes`, keeping only candidates accepted
/// by `contention` and inserting in canonical order.
pub(crate) fn build_tally_index<F>(
    votes: &BTreeMap<CandidateIndex, Weight>,
    canonical: &[CandidateIndex],
    contention: F,
) -> TallyIndex
where
    F: Fn(CandidateIndex) -> bool,
{
    let mut index = TallyIndex::new();
    for &c in canonical {
        if let Some(w) = votes.get(&c) {
            if contention(c) {
                index.entry(w.clone()).or_default().push(c);
            }
        }
    }
    index
}

/// The largest prefix of ascending-tally candidates whose combined tally is
/// strictly below the next candidate's tally, in ascending order. Empty when
/// no prefix qualifies.
pub(crate) fn batch_eliminable(index: &TallyIndex) -> Vec<CandidateIndex> {
    let ordered: Vec<(&Weight, CandidateIndex)> = index
        .iter()
        .flat_map(|(w, cands)| cands.iter().map(move |&c| (w, c)))
        .collect();
    let mut best = 0usize;
    let mut prefix = Weight::zero();
    for i in 0..ordered.len().saturating_sub(1) {
        prefix += ordered[i].0;
        if &prefix < ordered[i + 1].0 {
            best = i + 1;
        }
    }
    ordered[..best].iter().map(|(_, c)| *c).collect()
}
