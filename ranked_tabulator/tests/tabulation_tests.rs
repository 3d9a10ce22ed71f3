//! End-to-end tabulations over small hand-built contests.
//!
//! Each test drives the public [`tabulate`] entry point and checks round
//! outcomes against results worked out by hand. The engine re-checks weight
//! conservation at every round boundary internally, so every test here also
//! exercises that invariant.

use ranked_tabulator::*;

fn candidates(names: &[&str]) -> Vec<Candidate> {
    names.iter().map(|n| Candidate::new(n)).collect()
}

/// `(count, [first choice, second choice, ...])` replicated into records.
fn ballots(shapes: &[(usize, &[&str])]) -> Vec<BallotRecord> {
    let mut records = Vec::new();
    for (count, choices) in shapes {
        for _ in 0..*count {
            let id = format!("b-{:04}", records.len() + 1);
            records.push(BallotRecord::simple(&id, choices));
        }
    }
    records
}

fn run(
    rules: &TabulationRules,
    names: &[&str],
    shapes: &[(usize, &[&str])],
) -> TabulationResult {
    run_records(rules, names, &ballots(shapes))
}

fn run_records(
    rules: &TabulationRules,
    names: &[&str],
    records: &[BallotRecord],
) -> TabulationResult {
    tabulate(
        "test-contest",
        records,
        &candidates(names),
        rules,
        &mut UnattendedOracle,
        &mut NullSink,
    )
    .unwrap()
}

fn round_tally(result: &TabulationResult, round: usize, name: &str) -> String {
    result.round_outcomes[round - 1]
        .tally
        .iter()
        .find(|(n, _)| n == name)
        .map(|(_, v)| v.clone())
        .unwrap_or_else(|| panic!("no tally for {} in round {}", name, round))
}

#[test]
fn single_winner_majority_in_round_one() {
    let rules = TabulationRules::DEFAULT_RULES;
    let result = run(
        &rules,
        &["A", "B", "C"],
        &[(6, &["A"]), (3, &["B"]), (2, &["C"])],
    );
    assert_eq!(result.elected_in_order, vec!["A"]);
    assert_eq!(result.round_outcomes.len(), 1);
    assert_eq!(result.round_outcomes[0].threshold, "6");
    assert_eq!(round_tally(&result, 1, "A"), "6");
    assert_eq!(result.termination, Termination::Completed);
}

#[test]
fn irv_elimination_transfers_to_next_choice() {
    let rules = TabulationRules::DEFAULT_RULES;
    let result = run(
        &rules,
        &["A", "B", "C"],
        &[(4, &["A", "B"]), (3, &["B", "A"]), (2, &["C", "A"])],
    );
    assert_eq!(result.round_outcomes.len(), 2);
    let r1 = &result.round_outcomes[0];
    assert!(r1.elected.is_empty());
    assert_eq!(r1.eliminated, vec!["C"]);
    assert_eq!(r1.transfers.len(), 1);
    assert_eq!(r1.transfers[0].from, "C");
    assert_eq!(
        r1.transfers[0].transfers,
        vec![("A".to_string(), "2".to_string())]
    );
    assert_eq!(r1.transfers[0].exhausted, "0");
    assert_eq!(round_tally(&result, 2, "A"), "6");
    assert_eq!(round_tally(&result, 2, "B"), "3");
    assert_eq!(result.elected_in_order, vec!["A"]);
}

#[test]
fn batch_elimination_takes_the_whole_trailing_prefix() {
    let mut rules = TabulationRules::DEFAULT_RULES;
    rules.batch_elimination = true;
    let result = run(
        &rules,
        &["A", "B", "C", "D", "E", "F"],
        &[
            (22, &["A"]),
            (20, &["E", "A"]),
            (1, &["B", "E"]),
            (1, &["C", "E"]),
            (1, &["D", "E"]),
            (1, &["F", "E"]),
        ],
    );
    // V = 46, threshold 24. Round 1 has no winner; the four single-vote
    // candidates sum to 4 < 20, so they all go at once.
    let r1 = &result.round_outcomes[0];
    assert_eq!(r1.threshold, "24");
    assert!(r1.elected.is_empty());
    assert_eq!(r1.eliminated.len(), 4);
    for name in ["B", "C", "D", "F"] {
        assert!(r1.eliminated.iter().any(|n| n == name));
    }
    // Round 2: E absorbs the four transfers and reaches the threshold.
    assert_eq!(round_tally(&result, 2, "E"), "24");
    assert_eq!(result.elected_in_order, vec!["E"]);
}

#[test]
fn surplus_transfers_at_a_third_each() {
    let mut rules = TabulationRules::DEFAULT_RULES;
    rules.tabulation_mode = TabulationMode::MultiSeatStv;
    rules.number_of_winners = 2;
    rules.non_integer_winning_threshold = true;
    let result = run(
        &rules,
        &["A", "B", "C", "D"],
        &[(6, &["A", "B"]), (3, &["B"]), (2, &["C"]), (1, &["D"])],
    );
    // V = 12, fractional Droop threshold 4 with a strict comparison.
    let r1 = &result.round_outcomes[0];
    assert_eq!(r1.threshold, "4");
    assert_eq!(r1.elected, vec!["A"]);
    // Surplus 2 over a tally of 6: each ballot keeps weight 1/3, so B
    // receives exactly 2 votes.
    assert_eq!(r1.transfers[0].from, "A");
    assert_eq!(
        r1.transfers[0].transfers,
        vec![("B".to_string(), "2".to_string())]
    );
    // A's recorded tally is frozen at the threshold from round 2 on.
    assert_eq!(round_tally(&result, 2, "A"), "4");
    assert_eq!(round_tally(&result, 2, "B"), "5");
    assert_eq!(result.elected_in_order, vec!["A", "B"]);
}

#[test]
fn overvote_exhausts_into_the_overvote_bucket() {
    let rules = TabulationRules::DEFAULT_RULES;
    let mut records = ballots(&[(3, &["A"]), (2, &["B"])]);
    records.push(BallotRecord {
        id: "b-ov".to_string(),
        precinct: None,
        ranks: vec![
            (1, vec!["A".to_string(), "B".to_string()]),
            (2, vec!["C".to_string()]),
        ],
    });
    let result = run_records(&rules, &["A", "B", "C"], &records);
    let r1 = &result.round_outcomes[0];
    assert_eq!(r1.overvote, "1");
    // V = 5 excludes the exhausted ballot, so the threshold is 3.
    assert_eq!(r1.threshold, "3");
    assert_eq!(result.elected_in_order, vec!["A"]);
}

#[test]
fn previous_round_counts_break_the_tie() {
    let mut rules = TabulationRules::DEFAULT_RULES;
    rules.tiebreak_mode = TieBreakMode::PreviousRoundCountsThenRandom;
    rules.random_seed = Some(1);
    let result = run(
        &rules,
        &["A", "B", "C", "D", "F"],
        &[
            (10, &["A"]),
            (4, &["B"]),
            (5, &["C"]),
            (1, &["D", "B"]),
            (2, &["D"]),
            (1, &["F"]),
        ],
    );
    // Round 1 eliminates F, round 2 eliminates D (one of whose ballots
    // flows to B), leaving B and C tied at 5 in round 3. B had the
    // uniquely lowest tally back in round 2, so B loses the tie.
    let r3 = &result.round_outcomes[2];
    assert_eq!(r3.eliminated, vec!["B"]);
    assert_eq!(r3.tie_breaks.len(), 1);
    let tie = &r3.tie_breaks[0];
    assert_eq!(tie.selected, "B");
    assert!(tie.explanation.contains("fewest votes (4) in round 2"));
    assert_eq!(result.elected_in_order, vec!["A"]);
    assert_eq!(result.tie_break_log.len(), 1);
}

#[test]
fn tabulation_is_deterministic() {
    let mut rules = TabulationRules::DEFAULT_RULES;
    rules.tiebreak_mode = TieBreakMode::Random;
    rules.random_seed = Some(77);
    let shapes: &[(usize, &[&str])] = &[(3, &["A"]), (3, &["B"]), (4, &["C"])];
    let first = run(&rules, &["A", "B", "C"], shapes);
    let second = run(&rules, &["A", "B", "C"], shapes);
    assert_eq!(first, second);
}

#[test]
fn ballot_order_does_not_change_the_result() {
    let rules = TabulationRules::DEFAULT_RULES;
    let records = ballots(&[(4, &["A", "B"]), (3, &["B", "A"]), (2, &["C", "A"])]);
    let mut reversed = records.clone();
    reversed.reverse();
    let forward = run_records(&rules, &["A", "B", "C"], &records);
    let backward = run_records(&rules, &["A", "B", "C"], &reversed);
    assert_eq!(forward, backward);
}

#[test]
fn multi_seat_elects_in_descending_tally_order_and_fills_remaining_seats() {
    let mut rules = TabulationRules::DEFAULT_RULES;
    rules.tabulation_mode = TabulationMode::MultiSeatStv;
    rules.number_of_winners = 3;
    let result = run(
        &rules,
        &["A", "B", "C", "D"],
        &[(5, &["A"]), (4, &["B"]), (1, &["C"]), (1, &["D"])],
    );
    // V = 11, threshold 3. A and B clear it together in round 1, A first.
    let r1 = &result.round_outcomes[0];
    assert_eq!(r1.elected, vec!["A", "B"]);
    // Their surpluses have nowhere to go: both transfer ledgers exhaust.
    assert_eq!(r1.transfers.len(), 2);
    assert_eq!(r1.transfers[0].exhausted, "2");
    assert_eq!(r1.transfers[1].exhausted, "1");
    // C and D tie at 1; the default permutation order eliminates D, and C
    // takes the last seat when only it remains in contention.
    assert_eq!(result.elected_in_order, vec!["A", "B", "C"]);
    assert!(result.elected_in_order.len() <= 3);
}

#[test]
fn continue_until_two_remain_ignores_the_threshold() {
    let mut rules = TabulationRules::DEFAULT_RULES;
    rules.tabulation_mode = TabulationMode::ContinueUntilTwoRemain;
    let result = run(
        &rules,
        &["A", "B", "C"],
        &[(5, &["A"]), (4, &["B", "C"]), (3, &["C"])],
    );
    assert_eq!(result.round_outcomes.len(), 2);
    assert_eq!(result.round_outcomes[0].threshold, "0");
    assert_eq!(result.round_outcomes[0].eliminated, vec!["C"]);
    assert_eq!(result.elected_in_order, vec!["A"]);
}

#[test]
fn bottoms_up_elects_all_remaining_at_the_seat_count() {
    let mut rules = TabulationRules::DEFAULT_RULES;
    rules.tabulation_mode = TabulationMode::BottomsUpMultiSeat;
    rules.number_of_winners = 2;
    let result = run(
        &rules,
        &["A", "B", "C", "D"],
        &[(5, &["A"]), (4, &["B"]), (2, &["C"]), (1, &["D"])],
    );
    assert_eq!(result.round_outcomes.len(), 3);
    assert_eq!(result.round_outcomes[0].eliminated, vec!["D"]);
    assert_eq!(result.round_outcomes[1].eliminated, vec!["C"]);
    // The final round seats the survivors in descending tally order.
    assert_eq!(result.elected_in_order, vec!["A", "B"]);
}

#[test]
fn sequential_multi_seat_runs_one_pass_per_seat() {
    let mut rules = TabulationRules::DEFAULT_RULES;
    rules.tabulation_mode = TabulationMode::SequentialMultiSeat;
    rules.number_of_winners = 2;
    let result = run(
        &rules,
        &["A", "B", "C"],
        &[(4, &["A", "B"]), (3, &["B"]), (2, &["C", "B"])],
    );
    // Pass 1: C is eliminated and B reaches the majority of 5. Pass 2
    // re-runs without B and seats A. Round numbering continues across
    // passes.
    assert_eq!(result.elected_in_order, vec!["B", "A"]);
    let rounds: Vec<u32> = result.round_outcomes.iter().map(|o| o.round).collect();
    assert_eq!(rounds, vec![1, 2, 3]);
    assert_eq!(result.round_outcomes[1].elected, vec!["B"]);
    assert_eq!(result.round_outcomes[2].elected, vec!["A"]);
}

#[test]
fn undeclared_write_ins_cannot_win() {
    let rules = TabulationRules::DEFAULT_RULES;
    let result = run(
        &rules,
        &["A", "B"],
        &[
            (5, &[UNDECLARED_WRITE_IN]),
            (3, &["A"]),
            (2, &["B"]),
        ],
    );
    // The write-in sentinel holds the most votes the whole way but is never
    // seated; the contest ends with no winner once only it continues.
    assert!(result.elected_in_order.is_empty());
    assert_eq!(result.termination, Termination::Completed);
    assert_eq!(round_tally(&result, 1, UNDECLARED_WRITE_IN), "5");
}

#[test]
fn excluded_candidates_never_receive_votes() {
    let mut rules = TabulationRules::DEFAULT_RULES;
    rules.excluded_candidates = vec!["C".to_string()];
    let result = run(
        &rules,
        &["A", "B", "C"],
        &[(3, &["C", "A"]), (2, &["B"])],
    );
    let r1 = &result.round_outcomes[0];
    assert!(r1.tally.iter().all(|(name, _)| name != "C"));
    assert_eq!(round_tally(&result, 1, "A"), "3");
    assert_eq!(result.elected_in_order, vec!["A"]);
}

#[test]
fn minimum_vote_threshold_eliminates_everyone_below_it_at_once() {
    let mut rules = TabulationRules::DEFAULT_RULES;
    rules.minimum_vote_threshold = Some(3);
    let result = run(
        &rules,
        &["A", "B", "C", "D"],
        &[
            (5, &["A"]),
            (4, &["B"]),
            (2, &["C", "B"]),
            (1, &["D", "B"]),
        ],
    );
    let r1 = &result.round_outcomes[0];
    assert_eq!(r1.eliminated, vec!["D", "C"]);
    assert_eq!(round_tally(&result, 2, "B"), "7");
    assert_eq!(result.elected_in_order, vec!["B"]);
}

#[test]
fn hare_quota_with_zero_surplus_spends_the_ballots() {
    let mut rules = TabulationRules::DEFAULT_RULES;
    rules.tabulation_mode = TabulationMode::MultiSeatStv;
    rules.number_of_winners = 2;
    rules.hare_quota = true;
    let result = run(
        &rules,
        &["A", "B", "C"],
        &[(6, &["A", "B"]), (4, &["B"]), (2, &["C"])],
    );
    // V = 12, Hare quota 6. A is elected exactly at quota, so its ballots
    // carry zero weight onward and B gains nothing from the transfer.
    let r1 = &result.round_outcomes[0];
    assert_eq!(r1.threshold, "6");
    assert_eq!(r1.elected, vec!["A"]);
    assert!(r1.transfers[0].transfers.is_empty());
    assert_eq!(round_tally(&result, 2, "B"), "4");
    assert_eq!(result.elected_in_order, vec!["A", "B"]);
}

#[test]
fn explicit_permutation_breaks_ties_from_the_tail() {
    let mut rules = TabulationRules::DEFAULT_RULES;
    rules.tiebreak_mode = TieBreakMode::UsePermutation;
    rules.candidate_permutation =
        Some(vec!["B".to_string(), "A".to_string(), "C".to_string()]);
    let result = run(
        &rules,
        &["A", "B", "C"],
        &[(2, &["A"]), (2, &["B"]), (3, &["C"])],
    );
    // A and B tie at the bottom; A sits later in the permutation and loses.
    let r1 = &result.round_outcomes[0];
    assert_eq!(r1.eliminated, vec!["A"]);
    assert!(r1.tie_breaks[0].explanation.contains("permutation"));
}

#[test]
fn generated_permutation_is_stable_across_runs() {
    let mut rules = TabulationRules::DEFAULT_RULES;
    rules.tiebreak_mode = TieBreakMode::GeneratePermutation;
    rules.random_seed = Some(5);
    let shapes: &[(usize, &[&str])] = &[(2, &["A"]), (2, &["B"]), (3, &["C"])];
    let first = run(&rules, &["A", "B", "C"], shapes);
    let second = run(&rules, &["A", "B", "C"], shapes);
    assert_eq!(first, second);
    assert_eq!(first.round_outcomes[0].eliminated.len(), 1);
}

#[test]
fn declining_oracle_cancels_the_tabulation() {
    let mut rules = TabulationRules::DEFAULT_RULES;
    rules.tiebreak_mode = TieBreakMode::Interactive;
    let records = ballots(&[(2, &["A"]), (2, &["B"])]);
    let result = tabulate(
        "test-contest",
        &records,
        &candidates(&["A", "B"]),
        &rules,
        &mut UnattendedOracle,
        &mut NullSink,
    )
    .unwrap();
    assert_eq!(result.termination, Termination::Cancelled);
    assert!(result.elected_in_order.is_empty());
}

#[test]
fn scripted_oracle_settles_an_interactive_tie() {
    let mut rules = TabulationRules::DEFAULT_RULES;
    rules.tiebreak_mode = TieBreakMode::Interactive;
    let records = ballots(&[(2, &["A", "B"]), (2, &["B"])]);
    let mut oracle = ScriptedOracle::new(&["A"]);
    let result = tabulate(
        "test-contest",
        &records,
        &candidates(&["A", "B"]),
        &rules,
        &mut oracle,
        &mut NullSink,
    )
    .unwrap();
    // The operator sends A out; A's ballots flow to B, which then holds a
    // majority.
    assert_eq!(result.round_outcomes[0].eliminated, vec!["A"]);
    assert_eq!(result.elected_in_order, vec!["B"]);
}

#[test]
fn random_tiebreak_without_a_seed_is_fatal() {
    let mut rules = TabulationRules::DEFAULT_RULES;
    rules.tiebreak_mode = TieBreakMode::Random;
    rules.random_seed = None;
    let records = ballots(&[(2, &["A"]), (2, &["B"])]);
    let err = tabulate(
        "test-contest",
        &records,
        &candidates(&["A", "B"]),
        &rules,
        &mut UnattendedOracle,
        &mut NullSink,
    )
    .unwrap_err();
    assert_eq!(err, TabulationError::TieUnresolvable { round: 1 });
}

#[test]
fn malformed_ballots_are_counted_or_fatal() {
    let mut records = ballots(&[(3, &["A"]), (2, &["B"])]);
    records.push(BallotRecord::simple("b-bad", &["Nobody"]));
    let rules = TabulationRules::DEFAULT_RULES;
    let result = run_records(&rules, &["A", "B"], &records);
    assert_eq!(result.malformed_ballots, 1);
    assert_eq!(result.malformed_sample.len(), 1);
    assert!(result.malformed_sample[0].contains("b-bad"));
    assert_eq!(result.elected_in_order, vec!["A"]);

    let mut strict = TabulationRules::DEFAULT_RULES;
    strict.reject_malformed_ballots = true;
    let err = tabulate(
        "test-contest",
        &records,
        &candidates(&["A", "B"]),
        &strict,
        &mut UnattendedOracle,
        &mut NullSink,
    )
    .unwrap_err();
    assert!(matches!(err, TabulationError::BallotMalformed { .. }));
}

#[test]
fn empty_elections_are_rejected() {
    let rules = TabulationRules::DEFAULT_RULES;
    let err = tabulate(
        "test-contest",
        &[],
        &candidates(&["A"]),
        &rules,
        &mut UnattendedOracle,
        &mut NullSink,
    )
    .unwrap_err();
    assert_eq!(err, TabulationError::EmptyElection);
}
