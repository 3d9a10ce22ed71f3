pub mod config_reader;
pub mod io_csv;
pub mod io_normalized;
pub mod oracle;

use std::fs;
use std::path::Path;

use chrono::Utc;
use log::{debug, info, warn};
use serde_json::{json, Map as JSMap, Value as JSValue};
use snafu::{ResultExt, Snafu};
use text_diff::print_diff;

use ranked_tabulator::{
    tabulate, TabulationEvent, TabulationEventSink, TabulationResult, TieBreakMode,
    UnattendedOracle, OVERVOTE_MARK, UNDECLARED_WRITE_IN,
};

pub use config_reader::{FileSource, OutputSettings, RcvConfig};
pub use snafu::whatever;

pub type RcvResult<T, E = RcvError> = Result<T, E>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum RcvError {
    #[snafu(display("could not open file {}: {}", path, source))]
    OpeningFile {
        path: String,
        source: std::io::Error,
    },
    #[snafu(display("could not parse JSON document: {}", source))]
    ParsingJson { source: serde_json::Error },
    #[snafu(display("could not open CSV file {}: {}", path, source))]
    CsvOpen { path: String, source: csv::Error },
    #[snafu(display("could not read CSV line: {}", source))]
    CsvLineParse { source: csv::Error },
    #[snafu(display("CSV line {} is too short", lineno))]
    CsvLineTooShort { lineno: usize },
    #[snafu(display("could not write summary to {}: {}", path, source))]
    WritingSummary {
        path: String,
        source: std::io::Error,
    },
    #[snafu(display("the tabulated summary differs from the reference summary"))]
    ReferenceMismatch,
    #[snafu(whatever, display("{}", message))]
    Whatever {
        message: String,
        #[snafu(source(from(Box<dyn std::error::Error + Send + Sync>, Some)))]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

/// Interpret one raw mark from a ballot file against the source options.
/// `None` drops the mark (undervote / blank without write-in mapping).
pub(crate) fn mark_for_cell(cell: &str, cfs: &FileSource) -> Option<String> {
    let trimmed = cell.trim();
    let is_blank =
        trimmed.is_empty() || cfs.undervote_label.as_deref() == Some(trimmed);
    if is_blank {
        if cfs.treat_blank_as_undeclared_write_in.unwrap_or(false) {
            return Some(UNDECLARED_WRITE_IN.to_string());
        }
        return None;
    }
    if cfs.overvote_label.as_deref() == Some(trimmed) {
        return Some(OVERVOTE_MARK.to_string());
    }
    if cfs.undeclared_write_in_label.as_deref() == Some(trimmed) {
        return Some(UNDECLARED_WRITE_IN.to_string());
    }
    Some(trimmed.to_string())
}

/// Render engine progress events through the process logger.
struct LogEventSink;

impl TabulationEventSink for LogEventSink {
    fn emit(&mut self, event: TabulationEvent) {
        match event {
            TabulationEvent::TabulationBegun {
                contest,
                candidates,
                ballots,
            } => info!(
                "Tabulating {:?}: {} candidates, {} ballots",
                contest, candidates, ballots
            ),
            TabulationEvent::RoundBegun { round } => debug!("Round {}", round),
            TabulationEvent::ThresholdComputed { threshold } => {
                info!("Winning threshold: {}", threshold)
            }
            TabulationEvent::CandidateElected { round, name, votes } => {
                info!("Round {}: {} -> elected ({} votes)", round, name, votes)
            }
            TabulationEvent::CandidateEliminated { round, name, votes } => {
                info!("Round {}: {} -> eliminated ({} votes)", round, name, votes)
            }
            TabulationEvent::TieBroken { record } => info!(
                "Round {}: tie among {} broken for {}: {}",
                record.round,
                record.tied.join(", "),
                record.selected,
                record.explanation
            ),
            TabulationEvent::TabulationFinished { elected } => {
                if elected.is_empty() {
                    warn!("Tabulation finished with no winner");
                } else {
                    info!("Winner(s): {}", elected.join(", "));
                }
            }
        }
    }
}

fn read_ballots(
    root: &Path,
    cfs: &FileSource,
) -> RcvResult<Vec<ranked_tabulator::BallotRecord>> {
    let full_path = root.join(&cfs.file_path);
    let full_path = full_path.to_string_lossy().to_string();
    info!("Reading ballots from {:?} ({})", full_path, cfs.provider);
    match cfs.provider.as_str() {
        "normalized" => io_normalized::read_normalized(&full_path, cfs),
        "csv" => io_csv::read_csv_ranking(&full_path, cfs),
        x => whatever!("ballot provider not supported: {:?}", x),
    }
}

fn result_rounds_to_json(result: &TabulationResult) -> Vec<JSValue> {
    let mut rounds: Vec<JSValue> = Vec::new();
    for outcome in &result.round_outcomes {
        let mut tally: JSMap<String, JSValue> = JSMap::new();
        for (name, votes) in &outcome.tally {
            tally.insert(name.clone(), json!(votes));
        }

        let transfers_for = |name: &String| -> JSValue {
            let mut transfers: JSMap<String, JSValue> = JSMap::new();
            if let Some(record) = outcome.transfers.iter().find(|t| &t.from == name) {
                for (to, amount) in &record.transfers {
                    transfers.insert(to.clone(), json!(amount));
                }
                if record.exhausted != "0" {
                    transfers.insert("exhausted".to_string(), json!(record.exhausted));
                }
            }
            JSValue::Object(transfers)
        };

        let mut tally_results: Vec<JSValue> = Vec::new();
        for name in &outcome.eliminated {
            tally_results.push(json!({
                "eliminated": name,
                "transfers": transfers_for(name)
            }));
        }
        for name in &outcome.elected {
            tally_results.push(json!({
                "elected": name,
                "transfers": transfers_for(name)
            }));
        }

        rounds.push(json!({
            "round": outcome.round,
            "tally": tally,
            "inactive": {
                "exhausted": outcome.exhausted,
                "overvote": outcome.overvote,
                "skipped": outcome.skipped,
            },
            "threshold": outcome.threshold,
            "tallyResults": tally_results,
        }));
    }
    rounds
}

pub fn build_summary(config: &RcvConfig, result: &TabulationResult) -> JSValue {
    let threshold = result
        .round_outcomes
        .last()
        .map(|outcome| outcome.threshold.clone());
    json!({
        "config": {
            "contest": config.output_settings.contest_name.clone(),
            "date": config.output_settings.contest_date.clone(),
            "jurisdiction": config.output_settings.contest_jurisdiction.clone(),
            "office": config.output_settings.contest_office.clone(),
            "threshold": threshold,
        },
        "generatedAt": Utc::now().to_rfc3339(),
        "winners": result.elected_in_order.clone(),
        "results": result_rounds_to_json(result),
    })
}

/// Drop the volatile timestamp so summaries from different runs compare
/// equal.
fn strip_generated_at(mut summary: JSValue) -> JSValue {
    if let Some(obj) = summary.as_object_mut() {
        obj.remove("generatedAt");
    }
    summary
}

fn check_against_reference(summary: &JSValue, reference_path: &str) -> RcvResult<()> {
    let contents = fs::read_to_string(reference_path).context(OpeningFileSnafu {
        path: reference_path.to_string(),
    })?;
    let reference: JSValue =
        serde_json::from_str(contents.as_str()).context(ParsingJsonSnafu {})?;
    let ours =
        serde_json::to_string_pretty(&strip_generated_at(summary.clone())).context(ParsingJsonSnafu {})?;
    let theirs =
        serde_json::to_string_pretty(&strip_generated_at(reference)).context(ParsingJsonSnafu {})?;
    if ours != theirs {
        warn!("the tabulated summary differs from the reference summary");
        print_diff(theirs.as_str(), ours.as_str(), "\n");
        return Err(RcvError::ReferenceMismatch);
    }
    info!("summary matches the reference at {:?}", reference_path);
    Ok(())
}

/// Load the configuration, read every ballot source, tabulate, and emit the
/// summary. `reference_path` turns on comparison against a known-good
/// summary; `out_path` writes the summary JSON instead of printing it.
pub fn run_election(
    config_path: String,
    reference_path: Option<String>,
    out_path: Option<String>,
) -> RcvResult<TabulationResult> {
    let config_str = fs::read_to_string(&config_path).context(OpeningFileSnafu {
        path: config_path.clone(),
    })?;
    let config: RcvConfig =
        serde_json::from_str(config_str.as_str()).context(ParsingJsonSnafu {})?;
    debug!("config: {:?}", config);

    let (rules, candidates) = config_reader::validate_rules(&config)?;
    if config.cvr_file_sources.is_empty() {
        whatever!("no cvr file sources in the configuration");
    }

    let root = Path::new(&config_path).parent().unwrap_or_else(|| Path::new("."));
    let mut records = Vec::new();
    for cfs in &config.cvr_file_sources {
        let mut data = read_ballots(root, cfs)?;
        records.append(&mut data);
    }
    info!(
        "read {} ballots from {} source(s)",
        records.len(),
        config.cvr_file_sources.len()
    );

    let mut sink = LogEventSink;
    let interactive = matches!(
        rules.tiebreak_mode,
        TieBreakMode::Interactive | TieBreakMode::PreviousRoundCountsThenInteractive
    );
    let outcome = if interactive {
        let mut oracle = oracle::InteractiveOracle;
        tabulate(
            &config.output_settings.contest_name,
            &records,
            &candidates,
            &rules,
            &mut oracle,
            &mut sink,
        )
    } else {
        let mut oracle = UnattendedOracle;
        tabulate(
            &config.output_settings.contest_name,
            &records,
            &candidates,
            &rules,
            &mut oracle,
            &mut sink,
        )
    };
    let result = match outcome {
        Ok(result) => result,
        Err(error) => whatever!("tabulation failed: {:?}", error),
    };
    if result.malformed_ballots > 0 {
        warn!(
            "{} malformed ballot(s) were dropped; first: {:?}",
            result.malformed_ballots, result.malformed_sample
        );
    }

    let summary = build_summary(&config, &result);
    let rendered = serde_json::to_string_pretty(&summary).context(ParsingJsonSnafu {})?;
    match &out_path {
        Some(path) => {
            fs::write(path, rendered.as_bytes()).context(WritingSummarySnafu {
                path: path.clone(),
            })?;
            info!("wrote summary to {:?}", path);
        }
        None => println!("{}", rendered),
    }

    if let Some(reference) = reference_path {
        check_against_reference(&summary, &reference)?;
    }

    Ok(result)
}
