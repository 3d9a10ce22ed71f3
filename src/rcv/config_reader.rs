use crate::rcv::*;

use serde::{Deserialize, Serialize};
use serde_json::Value as JSValue;

use ranked_tabulator::{
    Candidate, DuplicateCandidateRule, OvervoteRule, SkippedRankRule, TabulationMode,
    TabulationRules, TieBreakMode,
};

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct OutputSettings {
    #[serde(rename = "contestName")]
    pub contest_name: String,
    #[serde(rename = "outputDirectory")]
    pub output_directory: Option<String>,
    #[serde(rename = "contestDate")]
    pub contest_date: Option<String>,
    #[serde(rename = "contestJurisdiction")]
    pub contest_jurisdiction: Option<String>,
    #[serde(rename = "contestOffice")]
    pub contest_office: Option<String>,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct FileSource {
    pub provider: String,
    #[serde(rename = "filePath")]
    pub file_path: String,
    #[serde(rename = "contestId")]
    pub contest_id: Option<String>,
    #[serde(rename = "firstVoteColumnIndex")]
    first_vote_column_index: Option<JSValue>,
    #[serde(rename = "firstVoteRowIndex")]
    first_vote_row_index: Option<JSValue>,
    #[serde(rename = "idColumnIndex")]
    id_column_index: Option<JSValue>,
    #[serde(rename = "precinctColumnIndex")]
    precinct_column_index: Option<JSValue>,
    #[serde(rename = "overvoteDelimiter")]
    pub overvote_delimiter: Option<String>,
    #[serde(rename = "overvoteLabel")]
    pub overvote_label: Option<String>,
    #[serde(rename = "undervoteLabel")]
    pub undervote_label: Option<String>,
    #[serde(rename = "undeclaredWriteInLabel")]
    pub undeclared_write_in_label: Option<String>,
    #[serde(rename = "treatBlankAsUndeclaredWriteIn")]
    pub treat_blank_as_undeclared_write_in: Option<bool>,
}

impl FileSource {
    pub fn first_vote_column_index(&self) -> RcvResult<usize> {
        let x = read_js_int(&self.first_vote_column_index)?;
        Ok(x.saturating_sub(1))
    }

    /// 1-indexed row of the first ballot, defaulting to the first row.
    pub fn first_vote_row_index(&self) -> RcvResult<usize> {
        if self.first_vote_row_index.is_none() {
            return Ok(1);
        }
        read_js_int(&self.first_vote_row_index)
    }

    pub fn id_column_index(&self) -> RcvResult<Option<usize>> {
        if self.id_column_index.is_none() {
            return Ok(None);
        }
        read_js_int(&self.id_column_index).map(|x| Some(x.saturating_sub(1)))
    }

    pub fn precinct_column_index(&self) -> RcvResult<Option<usize>> {
        if self.precinct_column_index.is_none() {
            return Ok(None);
        }
        read_js_int(&self.precinct_column_index).map(|x| Some(x.saturating_sub(1)))
    }
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct RcvCandidate {
    pub name: String,
    pub code: Option<String>,
    pub excluded: Option<bool>,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct RcvRules {
    #[serde(rename = "tiebreakMode")]
    pub tiebreak_mode: String,
    #[serde(rename = "overvoteRule")]
    pub overvote_rule: String,
    #[serde(rename = "winnerElectionMode")]
    pub winner_election_mode: String,
    #[serde(rename = "numberOfWinners")]
    pub number_of_winners: Option<JSValue>,
    #[serde(rename = "hareQuota")]
    pub hare_quota: Option<bool>,
    #[serde(rename = "nonIntegerWinningThreshold")]
    pub non_integer_winning_threshold: Option<bool>,
    #[serde(rename = "decimalPlacesForVoteArithmetic")]
    pub decimal_places_for_vote_arithmetic: Option<JSValue>,
    #[serde(rename = "roundTalliesHalfToEven")]
    pub round_tallies_half_to_even: Option<bool>,
    #[serde(rename = "batchElimination")]
    pub batch_elimination: Option<bool>,
    #[serde(rename = "continueUntilTwoCandidatesRemain")]
    pub continue_until_two_candidates_remain: Option<bool>,
    #[serde(rename = "minimumVoteThreshold")]
    pub minimum_vote_threshold: Option<JSValue>,
    #[serde(rename = "maxSkippedRanksAllowed")]
    pub max_skipped_ranks_allowed: Option<String>,
    #[serde(rename = "maxRankingsAllowed")]
    pub max_rankings_allowed: Option<String>,
    #[serde(rename = "exhaustOnDuplicateCandidate")]
    pub exhaust_on_duplicate_candidate: Option<bool>,
    #[serde(rename = "duplicateCandidateRule")]
    pub duplicate_candidate_rule: Option<String>,
    #[serde(rename = "randomSeed")]
    pub random_seed: Option<String>,
    #[serde(rename = "candidatePermutation")]
    pub candidate_permutation: Option<Vec<String>>,
    #[serde(rename = "rejectMalformedBallots")]
    pub reject_malformed_ballots: Option<bool>,
    #[serde(rename = "rulesDescription")]
    pub rules_description: Option<String>,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct RcvConfig {
    #[serde(rename = "outputSettings")]
    pub output_settings: OutputSettings,
    #[serde(rename = "cvrFileSources")]
    pub cvr_file_sources: Vec<FileSource>,
    pub candidates: Vec<RcvCandidate>,
    pub rules: RcvRules,
}

/// Map the JSON configuration onto the engine's rule set, rejecting
/// combinations the engine cannot honor before tabulation starts.
pub fn validate_rules(config: &RcvConfig) -> RcvResult<(TabulationRules, Vec<Candidate>)> {
    let rcv_rules = &config.rules;
    let mut rules = TabulationRules::DEFAULT_RULES;

    let candidates: Vec<Candidate> = config
        .candidates
        .iter()
        .map(|c| Candidate {
            name: c.name.clone(),
            code: match c.code.clone() {
                Some(x) if x.is_empty() => None,
                x => x,
            },
            excluded: c.excluded.unwrap_or(false),
        })
        .collect();
    if candidates.is_empty() {
        whatever!("the configuration declares no candidates");
    }
    rules.excluded_candidates = candidates
        .iter()
        .filter(|c| c.excluded)
        .map(|c| c.name.clone())
        .collect();

    rules.number_of_winners = match &rcv_rules.number_of_winners {
        None => 1,
        some => read_js_int(some)? as u32,
    };
    if rules.number_of_winners == 0 {
        whatever!("numberOfWinners must be at least 1");
    }

    rules.tabulation_mode = match rcv_rules.winner_election_mode.as_str() {
        "singleWinnerMajority" => TabulationMode::SingleWinnerIrv,
        "multiWinnerAllowMultipleWinnersPerRound" => TabulationMode::MultiSeatStv,
        "bottomsUp" => TabulationMode::BottomsUpMultiSeat,
        "multiPassIrv" => TabulationMode::SequentialMultiSeat,
        x => whatever!("unknown winner election mode: {}", x),
    };
    if rcv_rules.continue_until_two_candidates_remain.unwrap_or(false) {
        if rules.tabulation_mode != TabulationMode::SingleWinnerIrv {
            whatever!("continueUntilTwoCandidatesRemain requires singleWinnerMajority");
        }
        rules.tabulation_mode = TabulationMode::ContinueUntilTwoRemain;
    }

    rules.hare_quota = rcv_rules.hare_quota.unwrap_or(false);
    rules.non_integer_winning_threshold =
        rcv_rules.non_integer_winning_threshold.unwrap_or(false);
    rules.round_tallies_half_to_even = rcv_rules.round_tallies_half_to_even.unwrap_or(false);
    rules.batch_elimination = rcv_rules.batch_elimination.unwrap_or(false);
    rules.reject_malformed_ballots = rcv_rules.reject_malformed_ballots.unwrap_or(false);

    rules.decimal_places_for_vote_arithmetic =
        match &rcv_rules.decimal_places_for_vote_arithmetic {
            None => 4,
            some => {
                let places = read_js_int(some)?;
                if places > 20 {
                    whatever!("decimalPlacesForVoteArithmetic must be between 0 and 20");
                }
                places as u8
            }
        };

    rules.minimum_vote_threshold = match &rcv_rules.minimum_vote_threshold {
        None => None,
        some => Some(read_js_int(some)? as u64),
    };

    rules.overvote_rule = match rcv_rules.overvote_rule.as_str() {
        "exhaustImmediately" => OvervoteRule::ExhaustImmediately,
        "alwaysSkipToNextRank" => OvervoteRule::AlwaysSkipToNextRank,
        "exhaustIfMultipleContinuing" => OvervoteRule::ExhaustIfMultipleContinuing,
        x => whatever!("unknown overvote rule: {}", x),
    };

    rules.skipped_rank_rule = match rcv_rules.max_skipped_ranks_allowed.as_deref() {
        None | Some("unlimited") | Some("max") => SkippedRankRule::Ignore,
        Some("0") => SkippedRankRule::ExhaustOnSkippedRank,
        Some("1") => SkippedRankRule::ExhaustOnTwoConsecutive,
        Some(x) => whatever!("unsupported maxSkippedRanksAllowed: {}", x),
    };

    rules.duplicate_candidate_rule = match rcv_rules.duplicate_candidate_rule.as_deref() {
        Some("exhaust") => DuplicateCandidateRule::Exhaust,
        Some("skipToNext") => DuplicateCandidateRule::SkipToNext,
        Some("ignore") => DuplicateCandidateRule::Ignore,
        Some(x) => whatever!("unknown duplicateCandidateRule: {}", x),
        None => match rcv_rules.exhaust_on_duplicate_candidate {
            Some(true) => DuplicateCandidateRule::Exhaust,
            _ => DuplicateCandidateRule::SkipToNext,
        },
    };

    rules.max_rankings_allowed = match rcv_rules.max_rankings_allowed.as_deref() {
        None | Some("max") => None,
        Some(x) => match x.parse::<u32>() {
            Ok(n) if n > 0 => Some(n),
            _ => whatever!("failed to understand maxRankingsAllowed option: {:?}", x),
        },
    };

    rules.random_seed = match &rcv_rules.random_seed {
        None => None,
        Some(s) => match s.parse::<u64>() {
            Ok(seed) => Some(seed),
            Err(_) => whatever!("randomSeed must be a non-negative integer: {:?}", s),
        },
    };

    rules.candidate_permutation = rcv_rules.candidate_permutation.clone();
    rules.tiebreak_mode = match rcv_rules.tiebreak_mode.as_str() {
        "random" => TieBreakMode::Random,
        "interactive" | "stopCountingAndAsk" => TieBreakMode::Interactive,
        "usePermutationInConfig" | "useCandidateOrder" => {
            if rules.candidate_permutation.is_none() {
                // The declared candidate order is the permutation.
                rules.candidate_permutation =
                    Some(candidates.iter().map(|c| c.name.clone()).collect());
            }
            TieBreakMode::UsePermutation
        }
        "generatePermutation" => TieBreakMode::GeneratePermutation,
        "previousRoundCountsThenRandom" => TieBreakMode::PreviousRoundCountsThenRandom,
        "previousRoundCountsThenInteractive" | "previousRoundCountsThenAsk" => {
            TieBreakMode::PreviousRoundCountsThenInteractive
        }
        x => whatever!("unknown tiebreak mode: {}", x),
    };
    let needs_seed = matches!(
        rules.tiebreak_mode,
        TieBreakMode::Random
            | TieBreakMode::GeneratePermutation
            | TieBreakMode::PreviousRoundCountsThenRandom
    );
    if needs_seed && rules.random_seed.is_none() {
        whatever!(
            "tiebreak mode {:?} requires a randomSeed",
            rcv_rules.tiebreak_mode
        );
    }

    rules.treat_blank_as_undeclared_write_in = config
        .cvr_file_sources
        .iter()
        .any(|s| s.treat_blank_as_undeclared_write_in.unwrap_or(false));

    Ok((rules, candidates))
}

/// Read an integer that configuration files write either as a number or as
/// a digit string.
pub fn read_js_int(x: &Option<JSValue>) -> RcvResult<usize> {
    match x {
        Some(JSValue::Number(n)) => match n.as_u64() {
            Some(v) => Ok(v as usize),
            None => whatever!("expected a non-negative integer, found {}", n),
        },
        Some(JSValue::String(s)) => match s.parse::<usize>() {
            Ok(v) => Ok(v),
            Err(_) => whatever!("expected an integer, found {:?}", s),
        },
        x => whatever!("expected an integer, found {:?}", x),
    }
}
