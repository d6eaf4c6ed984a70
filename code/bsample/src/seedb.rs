/// `seedb` -- Look inside a shard file written by bsample
///
/// With no --tables, list the tables in the file.  Otherwise print the chosen columns (--keys, all
/// of them by default) of each chosen table, at most --number rows of each (0 for all), with a
/// header line unless --no-header.
///
/// A relative --database is looked for in the current directory first and then below the
/// configured db_path, so `seedb -d monitor/queue.db -t queue_ALL` works from anywhere.
mod format;

use anyhow::{bail, Result};
use clap::Parser;
use format::{format_table, FormatOptions};
use rustutils::read_monitor_config;
use samplestore::{list_tables, read_table};
use std::env;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// The shard file
    #[arg(long, short)]
    database: String,

    /// Tables to print [default: list the tables]
    #[arg(long, short, num_args = 1..)]
    tables: Vec<String>,

    /// Columns to print [default: all]
    #[arg(long, short, num_args = 1..)]
    keys: Vec<String>,

    /// Print at most this many rows per table, 0 for all
    #[arg(long, short, default_value_t = 0)]
    number: usize,

    /// Print csv instead of aligned columns
    #[arg(long)]
    csv: bool,

    /// Leave out the line of column names
    #[arg(long)]
    no_header: bool,

    /// Configuration file, for db_path [default: $LSFMONITOR_CONFIG]
    #[arg(long)]
    config: Option<String>,
}

fn main() {
    match seedb() {
        Ok(()) => {}
        Err(msg) => {
            eprintln!("ERROR: {}", msg);
            process::exit(1);
        }
    }
}

fn seedb() -> Result<()> {
    let cli = Cli::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    // The configuration only matters for relative paths, and only an explicitly named file that
    // can't be read is an error.
    let db_path = match cli.config {
        Some(ref f) => Some(read_monitor_config(Some(f.as_str()))?.db_path),
        None => {
            let f = env::var("LSFMONITOR_CONFIG").ok().filter(|f| f != "");
            read_monitor_config(f.as_deref()).ok().map(|c| c.db_path)
        }
    };
    let path = resolve_database(&cli.database, db_path.as_deref())?;

    let keys = cli.keys.iter().map(|k| k.as_str()).collect::<Vec<&str>>();
    let opts = FormatOptions {
        csv: cli.csv,
        header: !cli.no_header,
    };
    let mut output = io::stdout();
    print_database(&mut output, &path, &cli.tables, &keys, cli.number, &opts)
}

fn resolve_database(name: &str, db_path: Option<&Path>) -> Result<PathBuf> {
    if name == "" {
        bail!("No database file");
    }
    let p = PathBuf::from(name);
    if p.exists() {
        return Ok(p);
    }
    if p.is_relative() {
        if let Some(base) = db_path {
            let q = base.join(&p);
            if q.exists() {
                return Ok(q);
            }
        }
    }
    bail!("{name}: No such database file");
}

fn print_database(
    output: &mut dyn Write,
    path: &Path,
    tables: &[String],
    keys: &[&str],
    number: usize,
    opts: &FormatOptions,
) -> Result<()> {
    if tables.is_empty() {
        for t in list_tables(path)? {
            let _ = writeln!(output, "{t}");
        }
        return Ok(());
    }
    for (i, t) in tables.iter().enumerate() {
        let table = read_table(path, t, keys, number)?;
        if !opts.csv {
            if i > 0 {
                let _ = writeln!(output);
            }
            let _ = writeln!(output, "TABLE: {t}");
        }
        format_table(output, &table, opts);
    }
    Ok(())
}

#[cfg(test)]
use samplestore::{write_shard, SampleRow, WritePolicy};

#[cfg(test)]
fn make_shard(dir: &Path) -> PathBuf {
    let shard = dir.join("monitor/queue.db");
    let policy = WritePolicy {
        retention_rows: 100,
        stale_after: None,
    };
    let row = |table: &str, vals: &[&str]| SampleRow {
        table: table.to_string(),
        values: vals.iter().map(|v| v.to_string()).collect(),
    };
    write_shard(
        &shard,
        &["sampleTime", "PEND", "RUN"],
        &[
            row("queue_normal", &["20240101_000000", "0", "2"]),
            row("queue_short", &["20240101_000000", "4", "6"]),
        ],
        &policy,
    )
    .unwrap();
    write_shard(
        &shard,
        &["sampleTime", "PEND", "RUN"],
        &[row("queue_short", &["20240101_000500", "1", "9"])],
        &policy,
    )
    .unwrap();
    shard
}

#[test]
fn test_resolve_database() {
    let dir = tempfile::TempDir::new().unwrap();
    let shard = make_shard(dir.path());
    assert!(resolve_database(shard.to_str().unwrap(), None).unwrap() == shard);
    assert!(resolve_database("monitor/queue.db", Some(dir.path())).unwrap() == shard);
    assert!(resolve_database("monitor/host.db", Some(dir.path())).is_err());
    assert!(resolve_database("monitor/queue.db", None).is_err());
    assert!(resolve_database("", Some(dir.path())).is_err());
}

#[test]
fn test_print_database() {
    let dir = tempfile::TempDir::new().unwrap();
    let shard = make_shard(dir.path());
    let fixed = FormatOptions {
        csv: false,
        header: true,
    };

    let mut out = Vec::new();
    print_database(&mut out, &shard, &[], &[], 0, &fixed).unwrap();
    assert!(String::from_utf8(out).unwrap() == "queue_normal\nqueue_short\n");

    let mut out = Vec::new();
    let tables = vec!["queue_short".to_string(), "queue_normal".to_string()];
    print_database(&mut out, &shard, &tables, &["sampleTime", "PEND"], 1, &fixed).unwrap();
    assert!(
        String::from_utf8(out).unwrap()
            == "TABLE: queue_short
sampleTime       PEND
20240101_000000  4

TABLE: queue_normal
sampleTime       PEND
20240101_000000  0
"
    );

    let mut out = Vec::new();
    let csv = FormatOptions {
        csv: true,
        header: true,
    };
    let tables = vec!["queue_short".to_string()];
    print_database(&mut out, &shard, &tables, &[], 0, &csv).unwrap();
    assert!(
        String::from_utf8(out).unwrap()
            == "sampleTime,PEND,RUN
20240101_000000,4,6
20240101_000500,1,9
"
    );

    let mut out = Vec::new();
    let bare = FormatOptions {
        csv: false,
        header: false,
    };
    print_database(&mut out, &shard, &tables, &["PEND", "RUN"], 0, &bare).unwrap();
    assert!(String::from_utf8(out).unwrap() == "TABLE: queue_short\n4  6\n1  9\n");

    let mut out = Vec::new();
    assert!(print_database(&mut out, &shard, &tables, &["NJOBS"], 0, &fixed).is_err());
}

#[test]
fn test_cli() {
    let cli = Cli::try_parse_from(["seedb", "-d", "monitor/queue.db", "-t", "queue_ALL", "queue_short"])
        .unwrap();
    assert!(cli.tables == vec!["queue_ALL".to_string(), "queue_short".to_string()]);
    assert!(!cli.no_header);
    assert!(!cli.csv);
    assert!(cli.number == 0);

    let cli = Cli::try_parse_from(["seedb", "-d", "x.db", "--csv", "--no-header", "-n", "5"]).unwrap();
    assert!(cli.csv && cli.no_header);
    assert!(cli.number == 5);
    assert!(cli.tables.is_empty());

    assert!(Cli::try_parse_from(["seedb", "-t", "queue_ALL"]).is_err());
}
