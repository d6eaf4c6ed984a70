/// `bsample` -- Sample the batch scheduler into the shard store
///
/// Run with --help for brief help.  Every selected kind (jobs, queues, hosts, load, users) is
/// sampled once per pass, all kinds in parallel.  With --interval 0 (the default) there is a single
/// pass, otherwise passes repeat forever with that many seconds between them.
///
/// The configuration comes from the file named by --config or $LSFMONITOR_CONFIG, if any, and the
/// environment; see rustutils/src/configs.rs for the format.  Logging goes to stderr and is
/// controlled by RUST_LOG (default "info").
///
/// Quirks
///
/// A shard that is locked by another writer is skipped for the pass, with a warning, so two
/// samplers pointed at the same db_path will each see gaps in their history rather than block.
mod kinds;
mod sampler;

use anyhow::{bail, Result};
use clap::Parser;
use kinds::Kind;
use log::info;
use rustutils::{read_monitor_config, ShellRunner};
use std::env;
use std::process;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Sample jobs
    #[arg(long, short)]
    job: bool,

    /// Sample queues
    #[arg(long, short)]
    queue: bool,

    /// Sample hosts
    #[arg(long, short = 'H')]
    host: bool,

    /// Sample host load
    #[arg(long, short)]
    load: bool,

    /// Sample users
    #[arg(long, short)]
    user: bool,

    /// Seconds between passes, 0 for a single pass [default: 0]
    #[arg(long, short, default_value_t = 0, allow_negative_numbers = true)]
    interval: i64,

    /// Configuration file [default: $LSFMONITOR_CONFIG]
    #[arg(long)]
    config: Option<String>,
}

fn main() {
    match bsample() {
        Ok(()) => {}
        Err(msg) => {
            eprintln!("ERROR: {}", msg);
            process::exit(1);
        }
    }
}

fn bsample() -> Result<()> {
    let cli = Cli::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mode = sampler::Mode::from_interval(cli.interval)?;
    let kinds = selected_kinds(&cli)?;

    let config_file = match cli.config {
        Some(ref f) => Some(f.clone()),
        None => env::var("LSFMONITOR_CONFIG").ok().filter(|f| f != ""),
    };
    let config = read_monitor_config(config_file.as_deref())?;
    info!(
        "Sampling {} into {}",
        kinds.iter().map(|k| k.name()).collect::<Vec<&str>>().join(","),
        config.monitor_dir().display()
    );

    sampler::run(mode, &kinds, &config, &ShellRunner)
}

fn selected_kinds(cli: &Cli) -> Result<Vec<Kind>> {
    let mut kinds = vec![];
    if cli.job {
        kinds.push(Kind::Job);
    }
    if cli.queue {
        kinds.push(Kind::Queue);
    }
    if cli.host {
        kinds.push(Kind::Host);
    }
    if cli.load {
        kinds.push(Kind::Load);
    }
    if cli.user {
        kinds.push(Kind::User);
    }
    if kinds.is_empty() {
        bail!("Nothing to sample: select at least one of --job, --queue, --host, --load, --user");
    }
    Ok(kinds)
}

#[test]
fn test_cli() {
    let cli = Cli::try_parse_from(["bsample", "-j", "-H", "--user", "-i", "300"]).unwrap();
    assert!(selected_kinds(&cli).unwrap() == vec![Kind::Job, Kind::Host, Kind::User]);
    assert!(cli.interval == 300);
    assert!(cli.config.is_none());

    let cli = Cli::try_parse_from(["bsample", "--interval", "-5", "-q"]).unwrap();
    assert!(cli.interval == -5);
    assert!(sampler::Mode::from_interval(cli.interval).is_err());

    let cli = Cli::try_parse_from(["bsample", "--config", "x.json"]).unwrap();
    assert!(cli.interval == 0);
    assert!(cli.config == Some("x.json".to_string()));
    assert!(selected_kinds(&cli).is_err());

    assert!(Cli::try_parse_from(["bsample", "--interval", "soon"]).is_err());
}
