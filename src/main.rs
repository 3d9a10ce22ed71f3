pub mod rcv;

use clap::Parser;
use env_logger::Env;

use crate::rcv::{run_election, RcvResult};

/// This is a ranked choice voting tabulation program.
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// (file path) The election configuration in JSON format. Ballot file
    /// sources are resolved relative to this file.
    #[clap(short, long, value_parser)]
    config: String,

    /// (file path) A reference summary in JSON format. If provided, the
    /// tabulated output is checked against it and any difference is an
    /// error.
    #[clap(short, long, value_parser)]
    reference: Option<String>,

    /// (file path) If specified, the summary of the election is written in
    /// JSON format to the given location instead of the standard output.
    #[clap(short, long, value_parser)]
    out: Option<String>,

    /// If passed as an argument, will turn on verbose logging to the
    /// standard output.
    #[clap(long, takes_value = false)]
    verbose: bool,
}

const VERSION: Option<&str> = option_env!("CARGO_PKG_VERSION");

fn main() -> RcvResult<()> {
    let args = Args::parse();
    let env = Env::new().default_filter_or({
        if args.verbose {
            "debug"
        } else {
            "info"
        }
    });
    let _ = env_logger::try_init_from_env(env);
    log::info!("This is rcvcount version {}", VERSION.unwrap_or("unknown"));

    run_election(args.config, args.reference, args.out).map(|_| ())
}
