use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

// ********* Input data structures ***********

/// Display name used for the undeclared write-in sentinel candidate.
pub const UNDECLARED_WRITE_IN: &str = "Undeclared Write-ins";

/// Reserved mark emitted by ingestion for an explicit overvote label. A rank
/// containing this mark is an overvote regardless of how many other marks it
/// carries.
pub const OVERVOTE_MARK: &str = "~overvote";

#[derive(Eq, PartialEq, Debug, Clone)]
pub struct Candidate {
    pub name: String,
    pub code: Option<String>,
    pub excluded: bool,
}

impl Candidate {
    pub fn new(name: &str) -> Candidate {
        Candidate {
            name: name.to_string(),
            code: None,
            excluded: false,
        }
    }

    pub fn undeclared_write_in() -> Candidate {
        Candidate::new(UNDECLARED_WRITE_IN)
    }
}

// ********* Configuration **********

// The configuration options follow the option vocabulary of the RCTab
// configuration format:
// https://github.com/BrightSpots/rcv/blob/develop/config_file_documentation.txt

#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum TabulationMode {
    SingleWinnerIrv,
    MultiSeatStv,
    BottomsUpMultiSeat,
    SequentialMultiSeat,
    ContinueUntilTwoRemain,
}

impl TabulationMode {
    /// Whether rounds compare tallies against a winning threshold. The
    /// bottoms-up and continue-until-two variants only ever eliminate.
    pub(crate) fn uses_threshold(&self) -> bool {
        !matches!(
            self,
            TabulationMode::BottomsUpMultiSeat | TabulationMode::ContinueUntilTwoRemain
        )
    }
}

#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum OvervoteRule {
    ExhaustImmediately,
    AlwaysSkipToNextRank,
    ExhaustIfMultipleContinuing,
}

#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum SkippedRankRule {
    ExhaustOnSkippedRank,
    ExhaustOnTwoConsecutive,
    Ignore,
}

#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum DuplicateCandidateRule {
    Exhaust,
    SkipToNext,
    Ignore,
}

#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum TieBreakMode {
    /// Defer every tie to the external oracle.
    Interactive,
    /// Sample from the tied candidates with a PRNG seeded by `random_seed`.
    Random,
    /// Use `candidate_permutation` (loser = latest entry, winner = earliest).
    UsePermutation,
    /// Like `UsePermutation` with the permutation derived from `random_seed`.
    GeneratePermutation,
    PreviousRoundCountsThenRandom,
    PreviousRoundCountsThenInteractive,
}

#[derive(Eq, PartialEq, Debug, Clone)]
pub struct TabulationRules {
    pub tabulation_mode: TabulationMode,
    pub number_of_winners: u32,
    /// Hare quota (`V / W`) instead of the default Droop quota.
    pub hare_quota: bool,
    /// Fractional threshold with a strict `>` comparison instead of the
    /// integral `floor(V / (W+1)) + 1`.
    pub non_integer_winning_threshold: bool,
    pub decimal_places_for_vote_arithmetic: u8,
    /// Banker's rounding for reported tallies; half-up otherwise.
    pub round_tallies_half_to_even: bool,
    pub batch_elimination: bool,
    /// Candidates strictly below this many first-round votes are eliminated
    /// together in round 1.
    pub minimum_vote_threshold: Option<u64>,
    pub overvote_rule: OvervoteRule,
    pub skipped_rank_rule: SkippedRankRule,
    pub duplicate_candidate_rule: DuplicateCandidateRule,
    pub tiebreak_mode: TieBreakMode,
    pub random_seed: Option<u64>,
    pub candidate_permutation: Option<Vec<String>>,
    pub max_rankings_allowed: Option<u32>,
    pub treat_blank_as_undeclared_write_in: bool,
    pub excluded_candidates: Vec<String>,
    /// Abort on the first unusable ballot instead of counting it.
    pub reject_malformed_ballots: bool,
}

impl TabulationRules {
    pub const DEFAULT_RULES: TabulationRules = TabulationRules {
        tabulation_mode: TabulationMode::SingleWinnerIrv,
        number_of_winners: 1,
        hare_quota: false,
        non_integer_winning_threshold: false,
        decimal_places_for_vote_arithmetic: 4,
        round_tallies_half_to_even: false,
        batch_elimination: false,
        minimum_vote_threshold: None,
        overvote_rule: OvervoteRule::ExhaustImmediately,
        skipped_rank_rule: SkippedRankRule::Ignore,
        duplicate_candidate_rule: DuplicateCandidateRule::SkipToNext,
        tiebreak_mode: TieBreakMode::UsePermutation,
        random_seed: None,
        candidate_permutation: None,
        max_rankings_allowed: None,
        treat_blank_as_undeclared_write_in: false,
        excluded_candidates: Vec::new(),
        reject_malformed_ballots: false,
    };

    /// The permutation that drives permutation-based tie-breaking and the
    /// canonical candidate ordering: the configured one when present, a
    /// seed-derived one for `GeneratePermutation`, otherwise none (callers
    /// fall back to lexicographic order).
    pub fn effective_permutation(&self, declared: &[Candidate]) -> Option<Vec<String>> {
        if let Some(perm) = &self.candidate_permutation {
            return Some(perm.clone());
        }
        if self.tiebreak_mode == TieBreakMode::GeneratePermutation {
            return self.random_seed.map(|seed| generate_permutation(declared, seed));
        }
        None
    }
}

/// Derive a candidate permutation from a seed. The shuffle starts from the
/// lexicographic order so the outcome depends only on the declared names and
/// the seed, never on declaration order.
pub fn generate_permutation(declared: &[Candidate], seed: u64) -> Vec<String> {
    let mut names: Vec<String> = declared.iter().map(|c| c.name.clone()).collect();
    names.sort();
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    names.shuffle(&mut rng);
    names
}
