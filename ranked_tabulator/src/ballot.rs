//! Ballots and the ranking walk.
//!
//! Incoming ballots are interned against the contest roster once, up front.
//! The walk itself is a pure function of (ballot, candidate statuses, rules),
//! so re-running it after an elimination always lands on the same choice.

use std::collections::HashMap;

use crate::config::{
    Candidate, DuplicateCandidateRule, OvervoteRule, SkippedRankRule, TabulationRules,
    OVERVOTE_MARK, UNDECLARED_WRITE_IN,
};
use crate::fraction::Weight;

/// One normalized cast vote record, as produced by an external reader.
///
/// `ranks` maps 1-indexed rank positions to the marks at that position; more
/// than one distinct mark at a position is an overvote. Positions may be
/// sparse and in any order.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct BallotRecord {
    pub id: String,
    pub precinct: Option<String>,
    pub ranks: Vec<(u32, Vec<String>)>,
}

impl BallotRecord {
    /// A ballot ranking one candidate per position, in the given order.
    pub fn simple(id: &str, choices: &[&str]) -> BallotRecord {
        BallotRecord {
            id: id.to_string(),
            precinct: None,
            ranks: choices
                .iter()
                .enumerate()
                .map(|(i, name)| (i as u32 + 1, vec![name.to_string()]))
                .collect(),
        }
    }
}

#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, PartialOrd, Ord)]
pub(crate) struct CandidateIndex(pub(crate) u32);

#[derive(Eq, PartialEq, Debug, Clone)]
pub enum CandidateStatus {
    Continuing,
    Elected { round: u32, order: u32 },
    Eliminated { round: u32, order: u32 },
    Excluded,
}

impl CandidateStatus {
    pub fn is_continuing(&self) -> bool {
        matches!(self, CandidateStatus::Continuing)
    }
}

/// Interned contest roster, fixing the canonical iteration order for the
/// whole run. Every loop that could leak ordering into results walks
/// `canonical`, never a hash map.
#[derive(Debug, Clone)]
pub(crate) struct Roster {
    pub names: Vec<String>,
    pub by_name: HashMap<String, CandidateIndex>,
    pub canonical: Vec<CandidateIndex>,
    pub uwi: Option<CandidateIndex>,
}

impl Roster {
    /// Build the roster from the declared candidates. The undeclared
    /// write-in sentinel joins the contest when the rules map blanks to it
    /// or any ballot marks it explicitly.
    pub fn build(
        declared: &[Candidate],
        rules: &TabulationRules,
        records: &[BallotRecord],
    ) -> Roster {
        let mut names: Vec<String> = declared.iter().map(|c| c.name.clone()).collect();
        let needs_uwi = rules.treat_blank_as_undeclared_write_in
            || records.iter().any(|r| {
                r.ranks
                    .iter()
                    .any(|(_, marks)| marks.iter().any(|m| m == UNDECLARED_WRITE_IN))
            });
        let mut uwi = None;
        if needs_uwi && !names.iter().any(|n| n == UNDECLARED_WRITE_IN) {
            uwi = Some(CandidateIndex(names.len() as u32));
            names.push(UNDECLARED_WRITE_IN.to_string());
        }
        let by_name: HashMap<String, CandidateIndex> = names
            .iter()
            .enumerate()
            .map(|(i, n)| (n.clone(), CandidateIndex(i as u32)))
            .collect();
        if uwi.is_none() {
            uwi = by_name.get(UNDECLARED_WRITE_IN).copied();
        }

        let canonical = match rules.effective_permutation(declared) {
            Some(perm) => {
                let mut order: Vec<CandidateIndex> = perm
                    .iter()
                    .filter_map(|n| by_name.get(n).copied())
                    .collect();
                // Candidates missing from the permutation (the write-in
                // sentinel, typically) trail in lexicographic order.
                let mut rest: Vec<&String> = names
                    .iter()
                    .filter(|n| !perm.iter().any(|p| &p == n))
                    .collect();
                rest.sort();
                order.extend(rest.iter().map(|n| by_name[n.as_str()]));
                order
            }
            None => {
                let mut sorted: Vec<&String> = names.iter().collect();
                sorted.sort();
                sorted.iter().map(|n| by_name[n.as_str()]).collect()
            }
        };

        Roster {
            names,
            by_name,
            canonical,
            uwi,
        }
    }

    pub fn name(&self, c: CandidateIndex) -> &str {
        &self.names[c.0 as usize]
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }
}

/// One rank position after interning. A slot with `explicit_overvote` is an
/// overvote no matter how many identifiable marks it carries.
#[derive(Eq, PartialEq, Debug, Clone, Default)]
pub(crate) struct RankSlot {
    pub marks: Vec<CandidateIndex>,
    pub explicit_overvote: bool,
}

/// Interned ballot: dense slots from rank 1 to the last marked rank, with
/// `None` for skipped positions. Ranks past `max_rankings_allowed` are
/// dropped at interning time.
#[derive(Debug, Clone)]
pub(crate) struct Ballot {
    pub id: String,
    pub slots: Vec<Option<RankSlot>>,
}

#[derive(Eq, PartialEq, Debug, Clone)]
pub(crate) struct InternError {
    pub ballot_id: String,
    pub message: String,
}

pub(crate) fn intern_ballot(
    record: &BallotRecord,
    roster: &Roster,
    rules: &TabulationRules,
) -> Result<Ballot, InternError> {
    let cap = rules.max_rankings_allowed.unwrap_or(u32::MAX);
    let last = record
        .ranks
        .iter()
        .map(|(rank, _)| *rank)
        .filter(|rank| *rank >= 1 && *rank <= cap)
        .max()
        .unwrap_or(0);
    let mut slots: Vec<Option<RankSlot>> = vec![None; last as usize];
    for (rank, marks) in &record.ranks {
        if *rank < 1 || *rank > cap {
            continue;
        }
        let slot = slots[(*rank - 1) as usize].get_or_insert_with(RankSlot::default);
        for mark in marks {
            if mark.is_empty() {
                // Blanks were either mapped to the write-in sentinel by the
                // reader or are skipped-rank positions.
                continue;
            }
            if mark == OVERVOTE_MARK {
                slot.explicit_overvote = true;
                continue;
            }
            match roster.by_name.get(mark) {
                Some(&c) => {
                    if !slot.marks.contains(&c) {
                        slot.marks.push(c);
                    }
                }
                None => {
                    return Err(InternError {
                        ballot_id: record.id.clone(),
                        message: format!("candidate {:?} is not in this contest", mark),
                    });
                }
            }
        }
    }
    // A slot that ended up with no usable marks is a skipped position.
    for slot in slots.iter_mut() {
        if matches!(slot, Some(s) if s.marks.is_empty() && !s.explicit_overvote) {
            *slot = None;
        }
    }
    Ok(Ballot {
        id: record.id.clone(),
        slots,
    })
}

/// Why a ballot stopped supporting any candidate.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum ExhaustionKind {
    Overvote,
    SkippedRank,
    DuplicateCandidate,
    NoMoreRankings,
}

#[derive(Eq, PartialEq, Debug, Clone)]
pub(crate) enum Assignment {
    Unassigned,
    Assigned { candidate: CandidateIndex },
    Exhausted(ExhaustionKind),
}

/// Per-ballot mutable state, kept in an array parallel to the ballots.
#[derive(Debug, Clone)]
pub(crate) struct BallotState {
    pub weight: Weight,
    pub assignment: Assignment,
}

enum Step {
    Assign(CandidateIndex),
    Next,
    Exhaust(ExhaustionKind),
}

/// Walk the ballot's ranks and return its effective current assignment.
pub(crate) fn walk(
    ballot: &Ballot,
    statuses: &[CandidateStatus],
    rules: &TabulationRules,
) -> Assignment {
    let mut seen: Vec<CandidateIndex> = Vec::new();
    let mut consecutive_skipped = 0u32;

    for slot in ballot.slots.iter() {
        let slot = match slot {
            None => match rules.skipped_rank_rule {
                SkippedRankRule::ExhaustOnSkippedRank => {
                    return Assignment::Exhausted(ExhaustionKind::SkippedRank);
                }
                SkippedRankRule::ExhaustOnTwoConsecutive => {
                    consecutive_skipped += 1;
                    if consecutive_skipped >= 2 {
                        return Assignment::Exhausted(ExhaustionKind::SkippedRank);
                    }
                    continue;
                }
                SkippedRankRule::Ignore => continue,
            },
            Some(slot) => slot,
        };
        consecutive_skipped = 0;

        let step = if slot.explicit_overvote || slot.marks.len() > 1 {
            overvote_step(slot, statuses, rules, &mut seen)
        } else {
            single_step(slot.marks[0], statuses, rules, &mut seen)
        };
        match step {
            Step::Assign(c) => return Assignment::Assigned { candidate: c },
            Step::Next => continue,
            Step::Exhaust(kind) => return Assignment::Exhausted(kind),
        }
    }
    Assignment::Exhausted(ExhaustionKind::NoMoreRankings)
}

fn single_step(
    candidate: CandidateIndex,
    statuses: &[CandidateStatus],
    rules: &TabulationRules,
    seen: &mut Vec<CandidateIndex>,
) -> Step {
    if seen.contains(&candidate) {
        match rules.duplicate_candidate_rule {
            DuplicateCandidateRule::Exhaust => {
                return Step::Exhaust(ExhaustionKind::DuplicateCandidate);
            }
            DuplicateCandidateRule::SkipToNext => return Step::Next,
            DuplicateCandidateRule::Ignore => {}
        }
    } else {
        seen.push(candidate);
    }
    if statuses[candidate.0 as usize].is_continuing() {
        Step::Assign(candidate)
    } else {
        Step::Next
    }
}

fn overvote_step(
    slot: &RankSlot,
    statuses: &[CandidateStatus],
    rules: &TabulationRules,
    seen: &mut Vec<CandidateIndex>,
) -> Step {
    match rules.overvote_rule {
        OvervoteRule::ExhaustImmediately => Step::Exhaust(ExhaustionKind::Overvote),
        OvervoteRule::AlwaysSkipToNextRank => Step::Next,
        OvervoteRule::ExhaustIfMultipleContinuing => {
            if slot.explicit_overvote {
                // An explicit overvote label carries no identifiable marks
                // to disambiguate.
                return Step::Exhaust(ExhaustionKind::Overvote);
            }
            let continuing: Vec<CandidateIndex> = slot
                .marks
                .iter()
                .copied()
                .filter(|c| statuses[c.0 as usize].is_continuing())
                .collect();
            match continuing.as_slice() {
                [] => Step::Next,
                [single] => single_step(*single, statuses, rules, seen),
                _ => Step::Exhaust(ExhaustionKind::Overvote),
            }
        }
    }
}
