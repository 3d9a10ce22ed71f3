//! Reader for normalized ballot files: a JSON document carrying one record
//! per cast vote, with explicit rank/candidate pairs.

use std::collections::BTreeMap;
use std::fs;

use serde::{Deserialize, Serialize};
use snafu::ResultExt;

use ranked_tabulator::BallotRecord;

use crate::rcv::{
    mark_for_cell, FileSource, OpeningFileSnafu, ParsingJsonSnafu, RcvResult,
};

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
struct NormalizedBallot {
    id: String,
    #[serde(rename = "contestId")]
    contest_id: Option<String>,
    precinct: Option<String>,
    /// `[rank, candidateId]` pairs; duplicate ranks form the overvote set
    /// at that rank.
    ranks: Vec<(u32, String)>,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
struct NormalizedFile {
    ballots: Vec<NormalizedBallot>,
}

pub fn read_normalized(path: &str, cfs: &FileSource) -> RcvResult<Vec<BallotRecord>> {
    let contents = fs::read_to_string(path).context(OpeningFileSnafu {
        path: path.to_string(),
    })?;
    let file: NormalizedFile =
        serde_json::from_str(contents.as_str()).context(ParsingJsonSnafu {})?;

    let mut records = Vec::new();
    for ballot in file.ballots {
        if let (Some(want), Some(got)) = (&cfs.contest_id, &ballot.contest_id) {
            if want != got {
                continue;
            }
        }
        let mut by_rank: BTreeMap<u32, Vec<String>> = BTreeMap::new();
        for (rank, candidate) in &ballot.ranks {
            if let Some(mark) = mark_for_cell(candidate, cfs) {
                let slot = by_rank.entry(*rank).or_default();
                if !slot.contains(&mark) {
                    slot.push(mark);
                }
            }
        }
        records.push(BallotRecord {
            id: ballot.id,
            precinct: ballot.precinct,
            ranks: by_rank.into_iter().collect(),
        });
    }
    Ok(records)
}
