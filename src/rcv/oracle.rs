//! Interactive tie-break oracle reading choices from the operator console.

use std::io::{BufRead, Write};

use ranked_tabulator::TieBreakOracle;

pub struct InteractiveOracle;

impl InteractiveOracle {
    fn prompt(verb: &str, tied: &[String], round: u32, num_votes: &str) -> Option<String> {
        let stdout = std::io::stdout();
        let stdin = std::io::stdin();
        let mut out = stdout.lock();
        writeln!(
            out,
            "Tie in round {} among the following candidates, each holding {} votes:",
            round, num_votes
        )
        .ok()?;
        for (i, name) in tied.iter().enumerate() {
            writeln!(out, "{}. {}", i + 1, name).ok()?;
        }
        writeln!(
            out,
            "Enter the number of the candidate who should {} this tiebreaker.",
            verb
        )
        .ok()?;
        out.flush().ok()?;

        for line in stdin.lock().lines() {
            let line = line.ok()?;
            match line.trim().parse::<usize>() {
                Ok(choice) if choice >= 1 && choice <= tied.len() => {
                    return Some(tied[choice - 1].clone());
                }
                _ => {
                    println!("Invalid selection. Please try again.");
                }
            }
        }
        // Stdin closed without a usable answer.
        None
    }
}

impl TieBreakOracle for InteractiveOracle {
    fn choose_loser(&mut self, tied: &[String], round: u32, num_votes: &str) -> Option<String> {
        InteractiveOracle::prompt("lose", tied, round, num_votes)
    }

    fn choose_winner(&mut self, tied: &[String], round: u32, num_votes: &str) -> Option<String> {
        InteractiveOracle::prompt("win", tied, round, num_votes)
    }
}
