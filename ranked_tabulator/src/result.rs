//! Result records and progress events.
//!
//! Reported tallies are decimal strings, already rounded to the configured
//! precision, so two runs over the same inputs produce byte-identical
//! records. The engine never stamps wall-clock time; callers add timestamps
//! when they serialize.

use serde::Serialize;

/// How many malformed-ballot descriptions are retained in the result.
pub const MALFORMED_SAMPLE_CAP: usize = 10;

/// Errors that prevent the tabulation from completing.
#[derive(Eq, PartialEq, Debug, Clone)]
pub enum TabulationError {
    EmptyElection,
    /// A ballot's rank map is unusable and the rules reject malformed
    /// ballots.
    BallotMalformed { ballot_id: String, message: String },
    /// A tie could not be resolved by the configured mode or its fallback.
    TieUnresolvable { round: u32 },
    /// The sum-of-weights check failed at a round boundary.
    InvariantViolation { round: u32, discrepancy: String },
    /// The round counter passed the safety bound of candidates + 1.
    RoundLimitExceeded { round: u32 },
}

#[derive(Eq, PartialEq, Debug, Clone, Copy, Serialize)]
pub enum TieBreakKind {
    SelectLoser,
    SelectWinner,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize)]
pub struct TieBreakRecord {
    pub round: u32,
    pub kind: TieBreakKind,
    pub tied: Vec<String>,
    pub selected: String,
    pub explanation: String,
}

/// Where one candidate's votes went when they were elected or eliminated.
#[derive(Eq, PartialEq, Debug, Clone, Serialize)]
pub struct TransferRecord {
    pub from: String,
    /// Destination candidate to transferred amount, in canonical order.
    pub transfers: Vec<(String, String)>,
    /// Amount that left the contest (all exhaustion causes combined).
    pub exhausted: String,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize)]
pub struct RoundOutcome {
    pub round: u32,
    /// Continuing candidates' tallies plus elected candidates' frozen
    /// tallies, in canonical order.
    pub tally: Vec<(String, String)>,
    pub exhausted: String,
    pub overvote: String,
    pub skipped: String,
    pub threshold: String,
    pub elected: Vec<String>,
    pub eliminated: Vec<String>,
    pub transfers: Vec<TransferRecord>,
    pub tie_breaks: Vec<TieBreakRecord>,
}

#[derive(Eq, PartialEq, Debug, Clone, Copy, Serialize)]
pub enum Termination {
    Completed,
    /// The tie-break oracle declined to choose; the record stops at the
    /// round that needed it.
    Cancelled,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize)]
pub struct TabulationResult {
    pub contest_id: String,
    pub round_outcomes: Vec<RoundOutcome>,
    /// Winners in election order across the whole run.
    pub elected_in_order: Vec<String>,
    pub tie_break_log: Vec<TieBreakRecord>,
    pub final_tallies: Vec<(String, String)>,
    pub termination: Termination,
    pub malformed_ballots: u64,
    pub malformed_sample: Vec<String>,
}

/// Structured progress events. The engine emits them; rendering (logging,
/// console, anything else) is the caller's concern.
#[derive(Eq, PartialEq, Debug, Clone)]
pub enum TabulationEvent {
    TabulationBegun {
        contest: String,
        candidates: usize,
        ballots: usize,
    },
    RoundBegun {
        round: u32,
    },
    ThresholdComputed {
        threshold: String,
    },
    CandidateElected {
        round: u32,
        name: String,
        votes: String,
    },
    CandidateEliminated {
        round: u32,
        name: String,
        votes: String,
    },
    TieBroken {
        record: TieBreakRecord,
    },
    TabulationFinished {
        elected: Vec<String>,
    },
}

pub trait TabulationEventSink {
    fn emit(&mut self, event: TabulationEvent);
}

/// Sink that discards every event.
pub struct NullSink;

impl TabulationEventSink for NullSink {
    fn emit(&mut self, _event: TabulationEvent) {}
}
