//! Reader for CSV rank-column files: each rank is a column, each row one
//! ballot, with optional id and precinct columns.

use std::path::Path;

use log::debug;
use snafu::{OptionExt, ResultExt};

use ranked_tabulator::BallotRecord;

use crate::rcv::{
    mark_for_cell, CsvLineParseSnafu, CsvLineTooShortSnafu, CsvOpenSnafu, FileSource, RcvResult,
};

pub fn read_csv_ranking(path: &str, cfs: &FileSource) -> RcvResult<Vec<BallotRecord>> {
    let default_id = make_default_id(path);

    let id_idx = cfs.id_column_index()?;
    let precinct_idx = cfs.precinct_column_index()?;
    let choices_start_col = cfs.first_vote_column_index()?;
    let first_row = cfs.first_vote_row_index()?;

    let rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .context(CsvOpenSnafu {
            path: path.to_string(),
        })?;
    let mut lines = rdr.into_records();
    // The index starts at 1 to respect spreadsheet conventions.
    for _ in 1..first_row {
        let _ = lines.next();
    }

    let mut records = Vec::new();
    for (idx, line) in lines.enumerate() {
        let lineno = idx + first_row;
        let line = line.context(CsvLineParseSnafu {})?;
        debug!("read_csv_ranking: line {}: {:?}", lineno, line);

        let id = match id_idx {
            Some(col) => line
                .get(col)
                .context(CsvLineTooShortSnafu { lineno })?
                .to_string(),
            None => default_id(lineno),
        };
        let precinct = match precinct_idx {
            Some(col) => Some(
                line.get(col)
                    .context(CsvLineTooShortSnafu { lineno })?
                    .to_string(),
            ),
            None => None,
        };

        let mut ranks: Vec<(u32, Vec<String>)> = Vec::new();
        for (offset, cell) in line.iter().skip(choices_start_col).enumerate() {
            let rank = offset as u32 + 1;
            let mut marks: Vec<String> = Vec::new();
            let pieces: Vec<&str> = match &cfs.overvote_delimiter {
                Some(delim) => cell.split(delim.as_str()).collect(),
                None => vec![cell],
            };
            for piece in pieces {
                if let Some(mark) = mark_for_cell(piece, cfs) {
                    if !marks.contains(&mark) {
                        marks.push(mark);
                    }
                }
            }
            if !marks.is_empty() {
                ranks.push((rank, marks));
            }
        }
        records.push(BallotRecord {
            id,
            precinct,
            ranks,
        });
    }
    Ok(records)
}

fn make_default_id(path: &str) -> impl Fn(usize) -> String {
    let simplified_file_name = Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string());
    move |lineno| format!("{}-{:08}", simplified_file_name, lineno)
}
