//! Round-based tabulation engine for ranked choice voting.
//!
//! [`tabulate`] consumes a normalized ballot stream, the contest roster and
//! a validated rule set, and plays the contest round by round: tally the
//! continuing candidates, elect everyone at or above the winning threshold,
//! otherwise eliminate the trailing candidate(s), and transfer surplus and
//! eliminated votes to each ballot's next acceptable ranking. All weight
//! arithmetic is exact; ties are resolved deterministically by the
//! configured mode, with interactive modes deferring to a caller-supplied
//! [`TieBreakOracle`].

pub mod ballot;
pub mod config;
pub mod fraction;
pub mod result;
mod tally;
pub mod tiebreak;

pub use ballot::{BallotRecord, CandidateStatus, ExhaustionKind};
pub use config::*;
pub use fraction::{format_weight, HalfRounding, Weight};
pub use result::*;
pub use tiebreak::{ScriptedOracle, TieBreakOracle, UnattendedOracle};

use std::collections::BTreeMap;

use log::{debug, warn};
use num_traits::{One, Zero};

use ballot::{intern_ballot, walk, Assignment, Ballot, BallotState, CandidateIndex, Roster};
use fraction::{round_to_places, whole};
use tally::{batch_eliminable, build_tally_index, RoundTally};
use tiebreak::{TieBreakFailure, TieBreaker, TieKind};

/// Tabulate one contest. Pure over its inputs, modulo the oracle: identical
/// ballots, candidates, rules and oracle behavior always produce an
/// identical result.
///
/// An oracle that declines a tie-break ends the run early with a partial
/// result marked [`Termination::Cancelled`]; fatal conditions (unresolvable
/// ties, invariant violations, the round safety bound) surface as
/// [`TabulationError`].
pub fn tabulate(
    contest_id: &str,
    records: &[BallotRecord],
    candidates: &[Candidate],
    rules: &TabulationRules,
    oracle: &mut dyn TieBreakOracle,
    sink: &mut dyn TabulationEventSink,
) -> Result<TabulationResult, TabulationError> {
    match rules.tabulation_mode {
        TabulationMode::SequentialMultiSeat => {
            tabulate_sequential(contest_id, records, candidates, rules, oracle, sink)
        }
        _ => tabulate_single(contest_id, records, candidates, rules, oracle, sink),
    }
}

/// Sequential multi-seat: repeated single-winner contests, each excluding
/// the winners already seated. Round numbering continues across passes.
fn tabulate_sequential(
    contest_id: &str,
    records: &[BallotRecord],
    candidates: &[Candidate],
    rules: &TabulationRules,
    oracle: &mut dyn TieBreakOracle,
    sink: &mut dyn TabulationEventSink,
) -> Result<TabulationResult, TabulationError> {
    let mut combined = TabulationResult {
        contest_id: contest_id.to_string(),
        round_outcomes: Vec::new(),
        elected_in_order: Vec::new(),
        tie_break_log: Vec::new(),
        final_tallies: Vec::new(),
        termination: Termination::Completed,
        malformed_ballots: 0,
        malformed_sample: Vec::new(),
    };
    let mut excluded = rules.excluded_candidates.clone();
    let mut offset = 0u32;
    for seat in 0..rules.number_of_winners {
        let mut pass_rules = rules.clone();
        pass_rules.tabulation_mode = TabulationMode::SingleWinnerIrv;
        pass_rules.number_of_winners = 1;
        pass_rules.excluded_candidates = excluded.clone();
        let pass = tabulate_single(contest_id, records, candidates, &pass_rules, oracle, sink)?;
        if seat == 0 {
            combined.malformed_ballots = pass.malformed_ballots;
            combined.malformed_sample = pass.malformed_sample.clone();
        }
        for mut outcome in pass.round_outcomes {
            outcome.round += offset;
            for tb in outcome.tie_breaks.iter_mut() {
                tb.round += offset;
            }
            combined.round_outcomes.push(outcome);
        }
        for mut tb in pass.tie_break_log {
            tb.round += offset;
            combined.tie_break_log.push(tb);
        }
        offset = combined.round_outcomes.last().map(|o| o.round).unwrap_or(0);
        combined.final_tallies = pass.final_tallies;
        excluded.extend(pass.elected_in_order.iter().cloned());
        let seated = !pass.elected_in_order.is_empty();
        combined.elected_in_order.extend(pass.elected_in_order);
        if pass.termination == Termination::Cancelled {
            combined.termination = Termination::Cancelled;
            break;
        }
        if !seated {
            // Ballots exhausted before this seat could be filled.
            break;
        }
    }
    Ok(combined)
}

fn tabulate_single(
    contest_id: &str,
    records: &[BallotRecord],
    candidates: &[Candidate],
    rules: &TabulationRules,
    oracle: &mut dyn TieBreakOracle,
    sink: &mut dyn TabulationEventSink,
) -> Result<TabulationResult, TabulationError> {
    let pass = Pass::prepare(contest_id, records, candidates, rules)?;
    sink.emit(TabulationEvent::TabulationBegun {
        contest: contest_id.to_string(),
        candidates: pass.roster.len(),
        ballots: pass.ballots.len(),
    });
    pass.run(oracle, sink)
}

/// The winning threshold for one run, fixed at round 1.
struct WinningThreshold {
    value: Weight,
    /// Fractional Droop requires strictly more than the threshold.
    strict: bool,
}

impl WinningThreshold {
    fn compute(first_round_votes: &Weight, rules: &TabulationRules) -> WinningThreshold {
        let seats = whole(rules.number_of_winners as u64);
        let half = if rules.round_tallies_half_to_even {
            HalfRounding::ToEven
        } else {
            HalfRounding::Up
        };
        let v = if rules.non_integer_winning_threshold {
            first_round_votes.clone()
        } else {
            round_to_places(
                first_round_votes,
                rules.decimal_places_for_vote_arithmetic,
                half,
            )
        };
        if rules.hare_quota {
            WinningThreshold {
                value: v / seats,
                strict: false,
            }
        } else if rules.non_integer_winning_threshold {
            WinningThreshold {
                value: v / (seats + Weight::one()),
                strict: true,
            }
        } else {
            WinningThreshold {
                value: (v / (seats + Weight::one())).floor() + Weight::one(),
                strict: false,
            }
        }
    }

    fn meets(&self, tally: &Weight) -> bool {
        if tally.is_zero() {
            return false;
        }
        if self.strict {
            tally > &self.value
        } else {
            tally >= &self.value
        }
    }
}

enum Interrupt {
    Cancelled,
    Fatal(TabulationError),
}

struct Pass {
    rules: TabulationRules,
    roster: Roster,
    ballots: Vec<Ballot>,
    states: Vec<BallotState>,
    statuses: Vec<CandidateStatus>,
    /// Tallies retained by elected candidates after surplus accounting.
    frozen: BTreeMap<CandidateIndex, Weight>,
    exhausted: Weight,
    overvote: Weight,
    skipped: Weight,
    initial_total: Weight,
    /// Exact tallies per completed round, for previous-round tie-breaking.
    round_tallies: Vec<BTreeMap<CandidateIndex, Weight>>,
    tiebreaker: TieBreaker,
    outcomes: Vec<RoundOutcome>,
    tie_break_log: Vec<TieBreakRecord>,
    elected_in_order: Vec<CandidateIndex>,
    eliminated_count: u32,
    contest_id: String,
    malformed_ballots: u64,
    malformed_sample: Vec<String>,
}

impl Pass {
    fn prepare(
        contest_id: &str,
        records: &[BallotRecord],
        candidates: &[Candidate],
        rules: &TabulationRules,
    ) -> Result<Pass, TabulationError> {
        if candidates.is_empty() || records.is_empty() {
            return Err(TabulationError::EmptyElection);
        }
        let roster = Roster::build(candidates, rules, records);

        let mut statuses = vec![CandidateStatus::Continuing; roster.len()];
        for candidate in candidates {
            if candidate.excluded {
                statuses[roster.by_name[&candidate.name].0 as usize] = CandidateStatus::Excluded;
            }
        }
        for name in &rules.excluded_candidates {
            if let Some(c) = roster.by_name.get(name) {
                statuses[c.0 as usize] = CandidateStatus::Excluded;
            }
        }

        let mut ballots = Vec::with_capacity(records.len());
        let mut malformed_ballots = 0u64;
        let mut malformed_sample = Vec::new();
        for record in records {
            match intern_ballot(record, &roster, rules) {
                Ok(ballot) => ballots.push(ballot),
                Err(err) => {
                    if rules.reject_malformed_ballots {
                        return Err(TabulationError::BallotMalformed {
                            ballot_id: err.ballot_id,
                            message: err.message,
                        });
                    }
                    warn!("dropping malformed ballot {}: {}", err.ballot_id, err.message);
                    malformed_ballots += 1;
                    if malformed_sample.len() < MALFORMED_SAMPLE_CAP {
                        malformed_sample.push(format!("{}: {}", err.ballot_id, err.message));
                    }
                }
            }
        }
        if ballots.is_empty() {
            return Err(TabulationError::EmptyElection);
        }

        let states = vec![
            BallotState {
                weight: Weight::one(),
                assignment: Assignment::Unassigned,
            };
            ballots.len()
        ];
        let initial_total = whole(ballots.len() as u64);

        let half = if rules.round_tallies_half_to_even {
            HalfRounding::ToEven
        } else {
            HalfRounding::Up
        };
        let tiebreaker = TieBreaker::new(
            rules.tiebreak_mode,
            rules.random_seed,
            roster.canonical.clone(),
            roster.names.clone(),
            rules.decimal_places_for_vote_arithmetic,
            half,
        );

        Ok(Pass {
            rules: rules.clone(),
            roster,
            ballots,
            states,
            statuses,
            frozen: BTreeMap::new(),
            exhausted: Weight::zero(),
            overvote: Weight::zero(),
            skipped: Weight::zero(),
            initial_total,
            round_tallies: Vec::new(),
            tiebreaker,
            outcomes: Vec::new(),
            tie_break_log: Vec::new(),
            elected_in_order: Vec::new(),
            eliminated_count: 0,
            contest_id: contest_id.to_string(),
            malformed_ballots,
            malformed_sample,
        })
    }

    fn run(
        mut self,
        oracle: &mut dyn TieBreakOracle,
        sink: &mut dyn TabulationEventSink,
    ) -> Result<TabulationResult, TabulationError> {
        let max_rounds = self.roster.len() as u32 + 1;
        let mut threshold: Option<WinningThreshold> = None;
        let mut round = 0u32;
        loop {
            round += 1;
            if round > max_rounds {
                return Err(TabulationError::RoundLimitExceeded { round });
            }
            sink.emit(TabulationEvent::RoundBegun { round });

            // Assignment phase: only ballots without a live assignment walk;
            // everything else was settled by the previous transfer phase.
            self.assign_pending();

            // Tally phase.
            let tally = self.build_round_tally();
            self.round_tallies.push(tally.votes.clone());
            self.check_conservation(round, &tally)?;
            debug!(
                "round {}: {} continuing candidates, {} total continuing votes",
                round,
                tally.votes.len(),
                tally.continuing_total()
            );

            // Threshold phase, once, at round 1.
            if self.rules.tabulation_mode.uses_threshold() && threshold.is_none() {
                let t = WinningThreshold::compute(&tally.continuing_total(), &self.rules);
                sink.emit(TabulationEvent::ThresholdComputed {
                    threshold: self.fmt(&t.value),
                });
                threshold = Some(t);
            }

            // Winner phase.
            let mut round_ties: Vec<TieBreakRecord> = Vec::new();
            let newly_elected = match &threshold {
                Some(t) => {
                    let seats_left =
                        self.rules.number_of_winners - self.elected_in_order.len() as u32;
                    let filter = |pass: &Pass, c: CandidateIndex, votes: &Weight| {
                        pass.roster.uwi != Some(c) && t.meets(votes)
                    };
                    match self.pick_by_descending_tally(
                        round,
                        &tally,
                        seats_left as usize,
                        filter,
                        &mut round_ties,
                        oracle,
                        sink,
                    ) {
                        Ok(winners) => {
                            self.mark_elected(round, &tally, &winners, sink);
                            winners
                        }
                        Err(interrupt) => return self.interrupted(interrupt, round),
                    }
                }
                None => Vec::new(),
            };

            // Termination check.
            if let Some(seats) = self.termination_seats() {
                let filter = |pass: &Pass, c: CandidateIndex, _votes: &Weight| {
                    pass.statuses[c.0 as usize].is_continuing() && pass.roster.uwi != Some(c)
                };
                let extra = match self.pick_by_descending_tally(
                    round,
                    &tally,
                    seats,
                    filter,
                    &mut round_ties,
                    oracle,
                    sink,
                ) {
                    Ok(extra) => extra,
                    Err(interrupt) => return self.interrupted(interrupt, round),
                };
                self.mark_elected(round, &tally, &extra, sink);
                let mut elected_names: Vec<CandidateIndex> = newly_elected;
                elected_names.extend(extra);
                self.push_outcome(
                    round,
                    &tally,
                    &threshold,
                    &elected_names,
                    &[],
                    Vec::new(),
                    round_ties,
                );
                sink.emit(TabulationEvent::TabulationFinished {
                    elected: self
                        .elected_in_order
                        .iter()
                        .map(|&c| self.roster.name(c).to_string())
                        .collect(),
                });
                return Ok(self.into_result(Termination::Completed));
            }

            // Elimination phase.
            let newly_eliminated = if newly_elected.is_empty() {
                match self.select_losers(round, &tally, &mut round_ties, oracle, sink) {
                    Ok(losers) => losers,
                    Err(interrupt) => return self.interrupted(interrupt, round),
                }
            } else {
                Vec::new()
            };

            // Transfer phase: surplus from winners, full weight from losers.
            let transfers =
                self.transfer_phase(&tally, &threshold, &newly_elected, &newly_eliminated);
            self.push_outcome(
                round,
                &tally,
                &threshold,
                &newly_elected,
                &newly_eliminated,
                transfers,
                round_ties,
            );
        }
    }

    // ----- phases -----

    fn assign_pending(&mut self) {
        for i in 0..self.ballots.len() {
            let needs_walk = match &self.states[i].assignment {
                Assignment::Unassigned => true,
                Assignment::Assigned { candidate } => {
                    !self.statuses[candidate.0 as usize].is_continuing()
                }
                Assignment::Exhausted(_) => false,
            };
            if !needs_walk {
                continue;
            }
            let assignment = walk(&self.ballots[i], &self.statuses, &self.rules);
            if let Assignment::Exhausted(kind) = &assignment {
                let weight = self.states[i].weight.clone();
                self.bucket_add(*kind, &weight);
            }
            self.states[i].assignment = assignment;
        }
    }

    fn build_round_tally(&self) -> RoundTally {
        let mut votes: BTreeMap<CandidateIndex, Weight> = self
            .roster
            .canonical
            .iter()
            .filter(|c| self.statuses[c.0 as usize].is_continuing())
            .map(|&c| (c, Weight::zero()))
            .collect();
        for (i, state) in self.states.iter().enumerate() {
            if let Assignment::Assigned { candidate } = &state.assignment {
                if state.weight.is_zero() {
                    continue;
                }
                debug_assert!(self.statuses[candidate.0 as usize].is_continuing());
                if let Some(entry) = votes.get_mut(candidate) {
                    *entry += &state.weight;
                } else {
                    debug!("ballot {} assigned to a non-continuing candidate", self.ballots[i].id);
                }
            }
        }
        RoundTally {
            votes,
            exhausted: self.exhausted.clone(),
            overvote: self.overvote.clone(),
            skipped: self.skipped.clone(),
        }
    }

    fn check_conservation(&self, round: u32, tally: &RoundTally) -> Result<(), TabulationError> {
        let mut accounted = tally.continuing_total();
        accounted += &tally.exhausted;
        accounted += &tally.overvote;
        accounted += &tally.skipped;
        for retained in self.frozen.values() {
            accounted += retained;
        }
        if accounted != self.initial_total {
            return Err(TabulationError::InvariantViolation {
                round,
                discrepancy: format!(
                    "accounted weight {} does not match initial weight {}",
                    accounted, self.initial_total
                ),
            });
        }
        Ok(())
    }

    /// `Some(extra_seats)` when this round ends the tabulation; the value is
    /// how many remaining continuing candidates should be seated on the way
    /// out.
    fn termination_seats(&self) -> Option<usize> {
        let continuing = self
            .statuses
            .iter()
            .filter(|s| s.is_continuing())
            .count();
        let elected = self.elected_in_order.len() as u32;
        let seats = self.rules.number_of_winners;
        match self.rules.tabulation_mode {
            TabulationMode::ContinueUntilTwoRemain => {
                if continuing <= 2 {
                    Some((seats - elected.min(seats)) as usize)
                } else {
                    None
                }
            }
            TabulationMode::BottomsUpMultiSeat => {
                if continuing as u32 <= seats {
                    Some(continuing)
                } else {
                    None
                }
            }
            _ => {
                if elected >= seats {
                    Some(0)
                } else if continuing == 0 || continuing as u32 + elected <= seats {
                    Some(continuing)
                } else {
                    None
                }
            }
        }
    }

    /// Pick up to `cap` candidates by descending tally among continuing
    /// candidates accepted by `filter`. Equal-tally groups are ordered by
    /// repeated winner-mode tie-breaks.
    #[allow(clippy::too_many_arguments)]
    fn pick_by_descending_tally<F>(
        &mut self,
        round: u32,
        tally: &RoundTally,
        cap: usize,
        filter: F,
        round_ties: &mut Vec<TieBreakRecord>,
        oracle: &mut dyn TieBreakOracle,
        sink: &mut dyn TabulationEventSink,
    ) -> Result<Vec<CandidateIndex>, Interrupt>
    where
        F: Fn(&Pass, CandidateIndex, &Weight) -> bool,
    {
        if cap == 0 {
            return Ok(Vec::new());
        }
        let index = {
            let this: &Pass = self;
            build_tally_index(&tally.votes, &this.roster.canonical, |c| {
                filter(this, c, &tally.votes[&c])
            })
        };
        let groups: Vec<(Weight, Vec<CandidateIndex>)> = index
            .iter()
            .rev()
            .map(|(votes, group)| (votes.clone(), group.clone()))
            .collect();
        let mut picked = Vec::new();
        'groups: for (votes, mut group) in groups {
            while !group.is_empty() {
                if picked.len() == cap {
                    break 'groups;
                }
                let chosen = if group.len() == 1 {
                    group.remove(0)
                } else {
                    let votes_str = self.fmt(&votes);
                    let decision = self
                        .tiebreaker
                        .select(
                            TieKind::Winner,
                            &group,
                            round,
                            &votes_str,
                            &self.round_tallies,
                            oracle,
                        )
                        .map_err(|failure| self.tie_failure(failure, round))?;
                    let record = self.tie_record(
                        round,
                        TieBreakKind::SelectWinner,
                        &group,
                        decision.selected,
                        decision.explanation.clone(),
                    );
                    round_ties.push(record.clone());
                    self.tie_break_log.push(record.clone());
                    sink.emit(TabulationEvent::TieBroken { record });
                    group.retain(|&c| c != decision.selected);
                    decision.selected
                };
                picked.push(chosen);
            }
        }
        Ok(picked)
    }

    fn select_losers(
        &mut self,
        round: u32,
        tally: &RoundTally,
        round_ties: &mut Vec<TieBreakRecord>,
        oracle: &mut dyn TieBreakOracle,
        sink: &mut dyn TabulationEventSink,
    ) -> Result<Vec<CandidateIndex>, Interrupt> {
        let continuing = tally.votes.len();
        let keep = match self.rules.tabulation_mode {
            TabulationMode::ContinueUntilTwoRemain => 2usize,
            TabulationMode::BottomsUpMultiSeat => self.rules.number_of_winners as usize,
            _ => {
                let open =
                    self.rules.number_of_winners - self.elected_in_order.len() as u32;
                open.max(1) as usize
            }
        };

        // Round-1 minimum vote floor: everyone strictly below it goes at
        // once, batch rule not consulted.
        if round == 1 {
            if let Some(min) = self.rules.minimum_vote_threshold.filter(|m| *m > 0) {
                let floor = whole(min);
                let index = build_tally_index(&tally.votes, &self.roster.canonical, |c| {
                    tally.votes[&c] < floor && self.statuses[c.0 as usize].is_continuing()
                });
                let below: Vec<CandidateIndex> =
                    index.values().flat_map(|group| group.iter().copied()).collect();
                if !below.is_empty() {
                    self.mark_eliminated(round, tally, &below, sink);
                    return Ok(below);
                }
            }
        }

        let index = build_tally_index(&tally.votes, &self.roster.canonical, |c| {
            self.statuses[c.0 as usize].is_continuing()
        });

        if self.rules.batch_elimination {
            let mut batch = batch_eliminable(&index);
            batch.truncate(continuing.saturating_sub(keep));
            if !batch.is_empty() {
                self.mark_eliminated(round, tally, &batch, sink);
                return Ok(batch);
            }
        }

        if continuing <= keep {
            return Ok(Vec::new());
        }
        let (votes, group) = index
            .iter()
            .next()
            .map(|(votes, group)| (votes.clone(), group.clone()))
            .expect("at least one continuing candidate");
        let loser = if group.len() == 1 {
            group[0]
        } else {
            let votes_str = self.fmt(&votes);
            let decision = self
                .tiebreaker
                .select(
                    TieKind::Loser,
                    &group,
                    round,
                    &votes_str,
                    &self.round_tallies,
                    oracle,
                )
                .map_err(|failure| self.tie_failure(failure, round))?;
            let record = self.tie_record(
                round,
                TieBreakKind::SelectLoser,
                &group,
                decision.selected,
                decision.explanation.clone(),
            );
            round_ties.push(record.clone());
            self.tie_break_log.push(record.clone());
            sink.emit(TabulationEvent::TieBroken { record });
            decision.selected
        };
        self.mark_eliminated(round, tally, &[loser], sink);
        Ok(vec![loser])
    }

    fn transfer_phase(
        &mut self,
        tally: &RoundTally,
        threshold: &Option<WinningThreshold>,
        elected: &[CandidateIndex],
        eliminated: &[CandidateIndex],
    ) -> Vec<TransferRecord> {
        // All surplus fractions come from this round's tallies, so
        // same-round winners transfer simultaneously.
        let mut factors: BTreeMap<CandidateIndex, Weight> = BTreeMap::new();
        if let Some(t) = threshold {
            for &c in elected {
                let candidate_votes = &tally.votes[&c];
                let surplus = candidate_votes - &t.value;
                factors.insert(c, surplus / candidate_votes);
                self.frozen.insert(c, t.value.clone());
            }
        }

        let mut ledgers: BTreeMap<CandidateIndex, (BTreeMap<CandidateIndex, Weight>, Weight)> =
            elected
                .iter()
                .chain(eliminated.iter())
                .map(|&c| (c, (BTreeMap::new(), Weight::zero())))
                .collect();

        for i in 0..self.ballots.len() {
            let source = match &self.states[i].assignment {
                Assignment::Assigned { candidate } if ledgers.contains_key(candidate) => *candidate,
                _ => continue,
            };
            if let Some(factor) = factors.get(&source) {
                self.states[i].weight = &self.states[i].weight * factor;
            }
            let weight = self.states[i].weight.clone();
            let assignment = walk(&self.ballots[i], &self.statuses, &self.rules);
            let ledger = ledgers.get_mut(&source).expect("ledger exists for source");
            match &assignment {
                Assignment::Assigned { candidate } => {
                    *ledger.0.entry(*candidate).or_insert_with(Weight::zero) += &weight;
                }
                Assignment::Exhausted(kind) => {
                    ledger.1 += &weight;
                    self.bucket_add(*kind, &weight);
                }
                Assignment::Unassigned => unreachable!("walk never leaves a ballot unassigned"),
            }
            self.states[i].assignment = assignment;
        }

        // Eliminated candidates' ledgers first, then winners', matching the
        // order the round outcome lists them.
        let mut records = Vec::new();
        for &source in eliminated.iter().chain(elected.iter()) {
            let (to, exhausted) = &ledgers[&source];
            let transfers: Vec<(String, String)> = self
                .roster
                .canonical
                .iter()
                .filter_map(|c| {
                    to.get(c).filter(|w| !w.is_zero()).map(|w| {
                        (self.roster.name(*c).to_string(), self.fmt(w))
                    })
                })
                .collect();
            records.push(TransferRecord {
                from: self.roster.name(source).to_string(),
                transfers,
                exhausted: self.fmt(exhausted),
            });
        }
        records
    }

    // ----- bookkeeping -----

    fn mark_elected(
        &mut self,
        round: u32,
        tally: &RoundTally,
        winners: &[CandidateIndex],
        sink: &mut dyn TabulationEventSink,
    ) {
        for &c in winners {
            let order = self.elected_in_order.len() as u32 + 1;
            self.statuses[c.0 as usize] = CandidateStatus::Elected { round, order };
            self.elected_in_order.push(c);
            sink.emit(TabulationEvent::CandidateElected {
                round,
                name: self.roster.name(c).to_string(),
                votes: self.fmt(&tally.votes[&c]),
            });
        }
    }

    fn mark_eliminated(
        &mut self,
        round: u32,
        tally: &RoundTally,
        losers: &[CandidateIndex],
        sink: &mut dyn TabulationEventSink,
    ) {
        for &c in losers {
            self.eliminated_count += 1;
            self.statuses[c.0 as usize] = CandidateStatus::Eliminated {
                round,
                order: self.eliminated_count,
            };
            sink.emit(TabulationEvent::CandidateEliminated {
                round,
                name: self.roster.name(c).to_string(),
                votes: self.fmt(&tally.votes[&c]),
            });
        }
    }

    fn bucket_add(&mut self, kind: ExhaustionKind, weight: &Weight) {
        match kind {
            ExhaustionKind::Overvote => self.overvote += weight,
            ExhaustionKind::SkippedRank => self.skipped += weight,
            ExhaustionKind::DuplicateCandidate | ExhaustionKind::NoMoreRankings => {
                self.exhausted += weight
            }
        }
    }

    fn tie_failure(&self, failure: TieBreakFailure, round: u32) -> Interrupt {
        match failure {
            TieBreakFailure::Cancelled => Interrupt::Cancelled,
            TieBreakFailure::Unresolvable => {
                Interrupt::Fatal(TabulationError::TieUnresolvable { round })
            }
        }
    }

    fn tie_record(
        &self,
        round: u32,
        kind: TieBreakKind,
        tied: &[CandidateIndex],
        selected: CandidateIndex,
        explanation: String,
    ) -> TieBreakRecord {
        TieBreakRecord {
            round,
            kind,
            tied: tied.iter().map(|&c| self.roster.name(c).to_string()).collect(),
            selected: self.roster.name(selected).to_string(),
            explanation,
        }
    }

    fn interrupted(
        self,
        interrupt: Interrupt,
        round: u32,
    ) -> Result<TabulationResult, TabulationError> {
        match interrupt {
            Interrupt::Cancelled => {
                warn!("tabulation cancelled by the tie-break oracle in round {}", round);
                Ok(self.into_result(Termination::Cancelled))
            }
            Interrupt::Fatal(error) => Err(error),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn push_outcome(
        &mut self,
        round: u32,
        tally: &RoundTally,
        threshold: &Option<WinningThreshold>,
        elected: &[CandidateIndex],
        eliminated: &[CandidateIndex],
        transfers: Vec<TransferRecord>,
        tie_breaks: Vec<TieBreakRecord>,
    ) {
        let mut tally_out = Vec::new();
        for &c in &self.roster.canonical {
            if let Some(votes) = tally.votes.get(&c) {
                tally_out.push((self.roster.name(c).to_string(), self.fmt(votes)));
            } else if let Some(retained) = self.frozen.get(&c) {
                tally_out.push((self.roster.name(c).to_string(), self.fmt(retained)));
            }
        }
        self.outcomes.push(RoundOutcome {
            round,
            tally: tally_out,
            exhausted: self.fmt(&tally.exhausted),
            overvote: self.fmt(&tally.overvote),
            skipped: self.fmt(&tally.skipped),
            threshold: threshold
                .as_ref()
                .map(|t| self.fmt(&t.value))
                .unwrap_or_else(|| "0".to_string()),
            elected: elected.iter().map(|&c| self.roster.name(c).to_string()).collect(),
            eliminated: eliminated
                .iter()
                .map(|&c| self.roster.name(c).to_string())
                .collect(),
            transfers,
            tie_breaks,
        });
    }

    fn into_result(self, termination: Termination) -> TabulationResult {
        let final_tallies = self
            .outcomes
            .last()
            .map(|outcome| outcome.tally.clone())
            .unwrap_or_default();
        TabulationResult {
            contest_id: self.contest_id,
            elected_in_order: self
                .elected_in_order
                .iter()
                .map(|&c| self.roster.name(c).to_string())
                .collect(),
            round_outcomes: self.outcomes,
            tie_break_log: self.tie_break_log,
            final_tallies,
            termination,
            malformed_ballots: self.malformed_ballots,
            malformed_sample: self.malformed_sample,
        }
    }

    fn half(&self) -> HalfRounding {
        if self.rules.round_tallies_half_to_even {
            HalfRounding::ToEven
        } else {
            HalfRounding::Up
        }
    }

    fn fmt(&self, weight: &Weight) -> String {
        format_weight(
            weight,
            self.rules.decimal_places_for_vote_arithmetic,
            self.half(),
        )
    }
}
