//! Tie resolution.
//!
//! Every mode resolves a tie as a deterministic function of the tabulation
//! inputs: the random modes draw from a PRNG seeded by the configured seed,
//! the permutation modes scan a fixed ordering, and the previous-round modes
//! narrow the tied set against earlier tallies the way the interactive
//! operator would. The interactive modes defer to an external oracle.

use std::collections::{BTreeMap, VecDeque};

use log::debug;
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::ballot::CandidateIndex;
use crate::config::TieBreakMode;
use crate::fraction::{format_weight, HalfRounding, Weight};
use crate::tally::build_tally_index;

/// External chooser consulted by the interactive tie-break modes. `None`
/// means the oracle declines, which cancels the tabulation.
///
/// Implementations must be deterministic over their inputs for results to be
/// reproducible.
pub trait TieBreakOracle {
    fn choose_loser(&mut self, tied: &[String], round: u32, num_votes: &str) -> Option<String>;
    fn choose_winner(&mut self, tied: &[String], round: u32, num_votes: &str) -> Option<String>;
}

/// Oracle for unattended runs: declines every request.
pub struct UnattendedOracle;

impl TieBreakOracle for UnattendedOracle {
    fn choose_loser(&mut self, _tied: &[String], _round: u32, _num_votes: &str) -> Option<String> {
        None
    }
    fn choose_winner(&mut self, _tied: &[String], _round: u32, _num_votes: &str) -> Option<String> {
        None
    }
}

/// Oracle replaying a fixed script of candidate names, for tests.
pub struct ScriptedOracle {
    choices: VecDeque<String>,
}

impl ScriptedOracle {
    pub fn new(choices: &[&str]) -> ScriptedOracle {
        ScriptedOracle {
            choices: choices.iter().map(|c| c.to_string()).collect(),
        }
    }
}

impl TieBreakOracle for ScriptedOracle {
    fn choose_loser(&mut self, _tied: &[String], _round: u32, _num_votes: &str) -> Option<String> {
        self.choices.pop_front()
    }
    fn choose_winner(&mut self, _tied: &[String], _round: u32, _num_votes: &str) -> Option<String> {
        self.choices.pop_front()
    }
}

#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub(crate) enum TieKind {
    Loser,
    Winner,
}

#[derive(Eq, PartialEq, Debug, Clone)]
pub(crate) struct TieDecision {
    pub selected: CandidateIndex,
    pub explanation: String,
}

#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub(crate) enum TieBreakFailure {
    /// No mode or fallback could decide (missing seed, invalid oracle reply).
    Unresolvable,
    /// The oracle declined to choose.
    Cancelled,
}

pub(crate) struct TieBreaker {
    mode: TieBreakMode,
    rng: Option<ChaCha8Rng>,
    /// Effective permutation in roster indices; the canonical order when no
    /// explicit permutation was configured.
    permutation: Vec<CandidateIndex>,
    names: Vec<String>,
    places: u8,
    half: HalfRounding,
}

impl TieBreaker {
    pub fn new(
        mode: TieBreakMode,
        seed: Option<u64>,
        permutation: Vec<CandidateIndex>,
        names: Vec<String>,
        places: u8,
        half: HalfRounding,
    ) -> TieBreaker {
        TieBreaker {
            mode,
            rng: seed.map(ChaCha8Rng::seed_from_u64),
            permutation,
            names,
            places,
            half,
        }
    }

    /// Resolve a tie among `tied` at `round`. `prior_tallies[i]` holds the
    /// exact tallies of round `i + 1`; `num_votes` is the tally the tied
    /// candidates share, already rendered for display.
    pub fn select(
        &mut self,
        kind: TieKind,
        tied: &[CandidateIndex],
        round: u32,
        num_votes: &str,
        prior_tallies: &[BTreeMap<CandidateIndex, Weight>],
        oracle: &mut dyn TieBreakOracle,
    ) -> Result<TieDecision, TieBreakFailure> {
        debug_assert!(tied.len() > 1);
        match self.mode {
            TieBreakMode::Interactive => self.ask_oracle(kind, tied, round, num_votes, oracle),
            TieBreakMode::Random => self.draw_random(kind, tied),
            TieBreakMode::UsePermutation | TieBreakMode::GeneratePermutation => {
                Ok(self.scan_permutation(kind, tied))
            }
            TieBreakMode::PreviousRoundCountsThenRandom => {
                match self.scan_previous_rounds(kind, tied, round, prior_tallies) {
                    Some(decision) => Ok(decision),
                    None => self.draw_random(kind, tied),
                }
            }
            TieBreakMode::PreviousRoundCountsThenInteractive => {
                match self.scan_previous_rounds(kind, tied, round, prior_tallies) {
                    Some(decision) => Ok(decision),
                    None => self.ask_oracle(kind, tied, round, num_votes, oracle),
                }
            }
        }
    }

    fn ask_oracle(
        &mut self,
        kind: TieKind,
        tied: &[CandidateIndex],
        round: u32,
        num_votes: &str,
        oracle: &mut dyn TieBreakOracle,
    ) -> Result<TieDecision, TieBreakFailure> {
        let mut names: Vec<String> = tied.iter().map(|&c| self.names[c.0 as usize].clone()).collect();
        names.sort();
        let reply = match kind {
            TieKind::Loser => oracle.choose_loser(&names, round, num_votes),
            TieKind::Winner => oracle.choose_winner(&names, round, num_votes),
        };
        let name = match reply {
            Some(name) => name,
            None => return Err(TieBreakFailure::Cancelled),
        };
        let selected = tied
            .iter()
            .copied()
            .find(|&c| self.names[c.0 as usize] == name);
        match selected {
            Some(selected) => Ok(TieDecision {
                selected,
                explanation: match kind {
                    TieKind::Loser => "The losing candidate was supplied by the operator.".to_string(),
                    TieKind::Winner => "The winning candidate was supplied by the operator.".to_string(),
                },
            }),
            None => {
                debug!("oracle chose {:?}, which is not among the tied candidates", name);
                Err(TieBreakFailure::Unresolvable)
            }
        }
    }

    fn draw_random(
        &mut self,
        kind: TieKind,
        tied: &[CandidateIndex],
    ) -> Result<TieDecision, TieBreakFailure> {
        let rng = match self.rng.as_mut() {
            Some(rng) => rng,
            None => return Err(TieBreakFailure::Unresolvable),
        };
        // Sort by name so the draw is independent of how the tie list was
        // assembled.
        let mut ordered: Vec<CandidateIndex> = tied.to_vec();
        ordered.sort_by(|&a, &b| self.names[a.0 as usize].cmp(&self.names[b.0 as usize]));
        let selected = ordered[rng.gen_range(0..ordered.len())];
        Ok(TieDecision {
            selected,
            explanation: match kind {
                TieKind::Loser => "The losing candidate was randomly selected.".to_string(),
                TieKind::Winner => "The winning candidate was randomly selected.".to_string(),
            },
        })
    }

    fn scan_permutation(&self, kind: TieKind, tied: &[CandidateIndex]) -> TieDecision {
        let selected = match kind {
            // Losers come from the tail of the permutation, winners from the
            // head.
            TieKind::Loser => self
                .permutation
                .iter()
                .rev()
                .copied()
                .find(|c| tied.contains(c)),
            TieKind::Winner => self.permutation.iter().copied().find(|c| tied.contains(c)),
        };
        let selected = selected.expect("tied candidates are always in the permutation");
        TieDecision {
            selected,
            explanation: match kind {
                TieKind::Loser => {
                    "The losing candidate appeared latest in the tie-breaking permutation list."
                        .to_string()
                }
                TieKind::Winner => {
                    "The winning candidate appeared earliest in the tie-breaking permutation list."
                        .to_string()
                }
            },
        }
    }

    fn scan_previous_rounds(
        &self,
        kind: TieKind,
        tied: &[CandidateIndex],
        round: u32,
        prior_tallies: &[BTreeMap<CandidateIndex, Weight>],
    ) -> Option<TieDecision> {
        let mut contention: Vec<CandidateIndex> = tied.to_vec();
        for prior in (1..round).rev() {
            let tallies = &prior_tallies[(prior - 1) as usize];
            let index = build_tally_index(tallies, &self.permutation, |c| contention.contains(&c));
            let group = match kind {
                TieKind::Loser => index.iter().next(),
                TieKind::Winner => index.iter().next_back(),
            };
            let (votes, group) = match group {
                Some((votes, group)) => (votes, group),
                None => continue,
            };
            if group.len() == 1 {
                let selected = group[0];
                let extreme = match kind {
                    TieKind::Loser => "fewest",
                    TieKind::Winner => "most",
                };
                return Some(TieDecision {
                    selected,
                    explanation: format!(
                        "{} had the {} votes ({}) in round {}.",
                        self.names[selected.0 as usize],
                        extreme,
                        format_weight(votes, self.places, self.half),
                        prior
                    ),
                });
            }
            contention = group.clone();
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fraction::whole;

    fn breaker(mode: TieBreakMode, seed: Option<u64>) -> TieBreaker {
        let names: Vec<String> = ["A", "B", "C"].iter().map(|s| s.to_string()).collect();
        let permutation = vec![CandidateIndex(0), CandidateIndex(1), CandidateIndex(2)];
        TieBreaker::new(mode, seed, permutation, names, 4, HalfRounding::Up)
    }

    #[test]
    fn permutation_picks_latest_loser_and_earliest_winner() {
        let mut tb = breaker(TieBreakMode::UsePermutation, None);
        let tied = vec![CandidateIndex(0), CandidateIndex(2)];
        let mut oracle = UnattendedOracle;
        let loser = tb
            .select(TieKind::Loser, &tied, 1, "5", &[], &mut oracle)
            .unwrap();
        assert_eq!(loser.selected, CandidateIndex(2));
        let winner = tb
            .select(TieKind::Winner, &tied, 1, "5", &[], &mut oracle)
            .unwrap();
        assert_eq!(winner.selected, CandidateIndex(0));
    }

    #[test]
    fn random_is_reproducible_per_seed() {
        let tied = vec![CandidateIndex(0), CandidateIndex(1), CandidateIndex(2)];
        let mut oracle = UnattendedOracle;
        let mut first = Vec::new();
        let mut tb = breaker(TieBreakMode::Random, Some(42));
        for _ in 0..5 {
            first.push(
                tb.select(TieKind::Loser, &tied, 1, "5", &[], &mut oracle)
                    .unwrap()
                    .selected,
            );
        }
        let mut tb = breaker(TieBreakMode::Random, Some(42));
        for i in 0..5 {
            let again = tb
                .select(TieKind::Loser, &tied, 1, "5", &[], &mut oracle)
                .unwrap()
                .selected;
            assert_eq!(again, first[i]);
        }
    }

    #[test]
    fn random_without_seed_is_unresolvable() {
        let mut tb = breaker(TieBreakMode::Random, None);
        let tied = vec![CandidateIndex(0), CandidateIndex(1)];
        let mut oracle = UnattendedOracle;
        assert_eq!(
            tb.select(TieKind::Loser, &tied, 1, "5", &[], &mut oracle),
            Err(TieBreakFailure::Unresolvable)
        );
    }

    #[test]
    fn previous_rounds_narrow_to_the_unique_lowest() {
        let mut tb = breaker(TieBreakMode::PreviousRoundCountsThenRandom, Some(1));
        let tied = vec![CandidateIndex(1), CandidateIndex(2)];
        // Round 1: B=4, C=5. Round 2 (the tie round is 3): B=5, C=5.
        let r1: BTreeMap<CandidateIndex, Weight> = [
            (CandidateIndex(0), whole(10)),
            (CandidateIndex(1), whole(4)),
            (CandidateIndex(2), whole(5)),
        ]
        .into_iter()
        .collect();
        let r2: BTreeMap<CandidateIndex, Weight> = [
            (CandidateIndex(0), whole(10)),
            (CandidateIndex(1), whole(5)),
            (CandidateIndex(2), whole(5)),
        ]
        .into_iter()
        .collect();
        let mut oracle = UnattendedOracle;
        let decision = tb
            .select(TieKind::Loser, &tied, 3, "5", &[r1, r2], &mut oracle)
            .unwrap();
        assert_eq!(decision.selected, CandidateIndex(1));
        assert!(decision.explanation.contains("round 1"));
    }

    #[test]
    fn previous_rounds_fall_back_on_a_full_chain_tie() {
        let mut tb = breaker(TieBreakMode::PreviousRoundCountsThenRandom, Some(9));
        let tied = vec![CandidateIndex(0), CandidateIndex(1)];
        let r1: BTreeMap<CandidateIndex, Weight> = [
            (CandidateIndex(0), whole(5)),
            (CandidateIndex(1), whole(5)),
        ]
        .into_iter()
        .collect();
        let mut oracle = UnattendedOracle;
        let decision = tb
            .select(TieKind::Loser, &tied, 2, "5", &[r1], &mut oracle)
            .unwrap();
        assert!(decision.explanation.contains("randomly"));
    }

    #[test]
    fn interactive_defers_to_the_oracle() {
        let mut tb = breaker(TieBreakMode::Interactive, None);
        let tied = vec![CandidateIndex(0), CandidateIndex(1)];
        let mut oracle = ScriptedOracle::new(&["B"]);
        let decision = tb
            .select(TieKind::Loser, &tied, 1, "5", &[], &mut oracle)
            .unwrap();
        assert_eq!(decision.selected, CandidateIndex(1));

        let mut declined = UnattendedOracle;
        assert_eq!(
            tb.select(TieKind::Loser, &tied, 1, "5", &[], &mut declined),
            Err(TieBreakFailure::Cancelled)
        );
    }
}
