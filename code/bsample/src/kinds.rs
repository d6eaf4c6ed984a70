/// The resource kinds we sample and how each is sampled.
///
/// Every kind runs one report command, turns its output into one row per entity (job, queue,
/// host, ...) stamped with the pass's sample time, and writes the rows into the kind's shard(s).
/// Queues, hosts, load and users come from single-table reports and are described by a
/// `TabularKind`; jobs come from the detail report and are spread over job range shards.
use anyhow::{bail, Result};
use lsflog::{parse_tabular, DetailParser, Preprocess};
use log::{info, warn};
use regex::Regex;
use rustutils::{format_sample_time, CommandRunner, MonitorConfig, Timestamp};
use samplestore::{group_by_range, write_shard, SampleRow, WriteOutcome, WritePolicy};
use std::collections::HashMap;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Kind {
    Job,
    Queue,
    Host,
    Load,
    User,
}

impl Kind {
    pub fn name(self) -> &'static str {
        match self {
            Kind::Job => "job",
            Kind::Queue => "queue",
            Kind::Host => "host",
            Kind::Load => "load",
            Kind::User => "user",
        }
    }
}

pub const SAMPLE_TIME: &str = "sampleTime";

const JOB_COLUMNS: [&str; 2] = [SAMPLE_TIME, "mem"];

struct TabularKind {
    kind: Kind,

    // The report column naming the entity
    key: &'static str,

    // The report columns stored, after sampleTime
    metrics: &'static [&'static str],
    preprocess: Preprocess,

    // Also store a synthetic entity "ALL" holding the column sums
    with_total: bool,
}

const QUEUE: TabularKind = TabularKind {
    kind: Kind::Queue,
    key: "QUEUE_NAME",
    metrics: &["NJOBS", "PEND", "RUN", "SUSP"],
    preprocess: Preprocess::None,
    with_total: true,
};

const HOST: TabularKind = TabularKind {
    kind: Kind::Host,
    key: "HOST_NAME",
    metrics: &["NJOBS", "RUN", "SSUSP", "USUSP"],
    preprocess: Preprocess::None,
    with_total: false,
};

const LOAD: TabularKind = TabularKind {
    kind: Kind::Load,
    key: "HOST_NAME",
    metrics: &["ut", "tmp", "swp", "mem"],
    preprocess: Preprocess::StripOverloadMarks,
    with_total: false,
};

const USER: TabularKind = TabularKind {
    kind: Kind::User,
    key: "USER/GROUP",
    metrics: &["NJOBS", "PEND", "RUN", "SSUSP", "USUSP"],
    preprocess: Preprocess::None,
    with_total: false,
};

/// One sampling pass for one kind.  Returns the number of entities sampled.  `parser` is the
/// detail parser for the scheduler at hand, probed once by the caller; the job pass fails without
/// it.

pub fn sample_kind(
    kind: Kind,
    config: &MonitorConfig,
    runner: &dyn CommandRunner,
    parser: Option<&dyn DetailParser>,
    now: Timestamp,
) -> Result<usize> {
    let commands = &config.commands;
    match kind {
        Kind::Job => {
            let Some(parser) = parser else {
                bail!("No detail parser, the scheduler could not be identified");
            };
            sample_jobs(config, runner, parser, now)
        }
        Kind::Queue => sample_tabular(&QUEUE, &commands.bqueues, config, runner, now),
        Kind::Host => sample_tabular(&HOST, &commands.bhosts, config, runner, now),
        Kind::Load => sample_tabular(&LOAD, &commands.lsload, config, runner, now),
        Kind::User => sample_tabular(&USER, &commands.busers, config, runner, now),
    }
}

pub fn shard_path(config: &MonitorConfig, kind: Kind) -> PathBuf {
    config.monitor_dir().join(format!("{}.db", kind.name()))
}

fn sample_tabular(
    tk: &TabularKind,
    command: &str,
    config: &MonitorConfig,
    runner: &dyn CommandRunner,
    now: Timestamp,
) -> Result<usize> {
    let text = run_report(runner, command, None)?;
    let table = parse_tabular(&text, tk.preprocess);
    if table.columns().is_empty() {
        bail!("'{command}' produced no report");
    }
    let Some(keys) = table.column(tk.key) else {
        bail!("'{command}' report has no {} column", tk.key);
    };
    for m in tk.metrics {
        if table.column_index(m).is_none() {
            bail!("'{command}' report has no {m} column");
        }
    }

    let sample_time = format_sample_time(now);
    let mut rows = vec![];
    for (i, key) in keys.iter().enumerate() {
        let mut values = vec![sample_time.clone()];
        for m in tk.metrics {
            values.push(table.get(i, m).unwrap_or_default().to_string());
        }
        rows.push(SampleRow {
            table: format!("{}_{key}", tk.kind.name()),
            values,
        });
    }
    if tk.with_total {
        let mut values = vec![sample_time.clone()];
        for m in tk.metrics {
            values.push(column_sum(&table.column(m).unwrap_or_default()).to_string());
        }
        rows.push(SampleRow {
            table: format!("{}_ALL", tk.kind.name()),
            values,
        });
    }

    let mut columns = vec![SAMPLE_TIME];
    columns.extend(tk.metrics.iter());
    let policy = WritePolicy {
        retention_rows: config.retention_rows,
        stale_after: None,
    };
    let path = shard_path(config, tk.kind);
    match write_shard(&path, &columns, &rows, &policy)? {
        WriteOutcome::Written { .. } => {
            info!("Sampled {} {}s into {}", keys.len(), tk.kind.name(), path.display());
        }
        WriteOutcome::Locked => {}
    }
    Ok(keys.len())
}

// Non-numeric cells ("-") count as nothing.

fn column_sum(values: &[&str]) -> i64 {
    values.iter().filter_map(|v| v.parse::<i64>().ok()).sum()
}

fn sample_jobs(
    config: &MonitorConfig,
    runner: &dyn CommandRunner,
    parser: &dyn DetailParser,
    now: Timestamp,
) -> Result<usize> {
    let no_jobs = Regex::new(r"(?m)^No (?:\S+ )*job found")?;
    let text = run_report(runner, &config.commands.bjobs, Some(&no_jobs))?;
    let records = parser.parse(&text);

    let sample_time = format_sample_time(now);
    let mem = records
        .iter()
        .map(|r| {
            (
                r.job_id.as_str(),
                r.mem.map(|m| m.to_string()).unwrap_or_default(),
            )
        })
        .collect::<HashMap<&str, String>>();
    let groups = group_by_range(
        records.iter().map(|r| r.job_id.as_str()),
        config.job_range_size,
    )?;

    let policy = WritePolicy {
        retention_rows: config.retention_rows,
        stale_after: Some(chrono::Duration::seconds(config.stale_seconds as i64)),
    };
    let job_dir = config.monitor_dir().join("job");
    let mut failed = 0;
    for (range, ids) in &groups {
        let rows = ids
            .iter()
            .map(|id| SampleRow {
                table: format!("job_{id}"),
                values: vec![
                    sample_time.clone(),
                    mem.get(id.as_str()).cloned().unwrap_or_default(),
                ],
            })
            .collect::<Vec<SampleRow>>();
        let path = job_dir.join(range.file_name());
        match write_shard(&path, &JOB_COLUMNS, &rows, &policy) {
            Ok(_) => {}
            Err(e) => {
                // Other ranges are independent of this one.
                warn!("Could not write {}: {e}", path.display());
                failed += 1;
            }
        }
    }
    if failed > 0 && failed == groups.len() {
        bail!("No job shard could be written");
    }
    info!(
        "Sampled {} jobs into {} shards",
        records.len(),
        groups.len() - failed
    );
    Ok(records.len())
}

// Run a report command.  bjobs exits non-zero with eg "No unfinished job found" on stderr when there
// is nothing to report; if `empty` matches stderr that is an empty report and not a failure.  The
// shell's 126 and 127 (can't execute, not found) are always failures.

fn run_report(runner: &dyn CommandRunner, command: &str, empty: Option<&Regex>) -> Result<String> {
    let out = runner.run(command)?;
    if out.success() {
        return Ok(out.stdout_text());
    }
    let stderr = out.stderr_text();
    if let Some(empty) = empty {
        if out.status != 126
            && out.status != 127
            && out.stdout.is_empty()
            && empty.is_match(&stderr)
        {
            return Ok("".to_string());
        }
    }
    bail!(
        "'{command}' failed with status {}: {}",
        out.status,
        stderr.trim()
    );
}

#[cfg(test)]
pub mod testing {
    use anyhow::{bail, Result};
    use lsflog::{probe_detail_parser, DetailParser};
    use rustutils::{CommandOutput, CommandRunner, Commands, MonitorConfig};
    use std::collections::HashMap;
    use std::path::Path;
    use std::sync::Mutex;

    /// Canned scheduler output keyed by command name (the first word of the command line).

    pub struct FakeRunner {
        pub outputs: HashMap<String, (i32, String, String)>,
        calls: Mutex<HashMap<String, usize>>,
    }

    impl FakeRunner {
        pub fn new() -> FakeRunner {
            let mut outputs = HashMap::new();
            for (cmd, text) in [
                ("lsid", LSID),
                ("badmin", SHOWCONF),
                ("bjobs", BJOBS),
                ("bqueues", BQUEUES),
                ("bhosts", BHOSTS),
                ("lsload", LSLOAD),
                ("busers", BUSERS),
            ] {
                outputs.insert(cmd.to_string(), (0, text.to_string(), "".to_string()));
            }
            FakeRunner {
                outputs,
                calls: Mutex::new(HashMap::new()),
            }
        }

        /// How many times `cmd` has been run.

        pub fn calls(&self, cmd: &str) -> usize {
            *self.calls.lock().unwrap().get(cmd).unwrap_or(&0)
        }

        pub fn set(&mut self, cmd: &str, status: i32, stdout: &str, stderr: &str) {
            self.outputs.insert(
                cmd.to_string(),
                (status, stdout.to_string(), stderr.to_string()),
            );
        }
    }

    impl CommandRunner for FakeRunner {
        fn run(&self, command: &str) -> Result<CommandOutput> {
            let name = command.split_whitespace().next().unwrap_or_default();
            *self.calls.lock().unwrap().entry(name.to_string()).or_insert(0) += 1;
            let Some((status, stdout, stderr)) = self.outputs.get(name) else {
                bail!("Could not start '{command}'");
            };
            Ok(CommandOutput {
                status: *status,
                stdout: stdout.as_bytes().to_vec(),
                stderr: stderr.as_bytes().to_vec(),
            })
        }
    }

    pub fn config(dir: &Path) -> MonitorConfig {
        MonitorConfig::with_db_path(dir.to_path_buf())
    }

    pub fn parser(runner: &FakeRunner) -> Box<dyn DetailParser> {
        probe_detail_parser(runner, &Commands::default()).unwrap()
    }

    pub const LSID: &str = "IBM Spectrum LSF Standard 10.1.0.0, Jul 08 2016
My cluster name is cluster1
My master name is lsfmaster01
";

    pub const SHOWCONF: &str = "LSF_UNIT_FOR_LIMITS = MB\n";

    pub const BJOBS: &str = "
Job <101>, Job Name <sim>, User <liyanqing>, Project <lsf_test>, Status <RUN>, Queue <normal>, Command <sleep 12345>
Mon Oct 26 17:43:07: Submitted from host <cmp01>, CWD <$HOME>, 2 Task(s), Requested Resources <rusage[mem=2048]>;
Mon Oct 26 17:43:07: Started 2 Task(s) on Host(s) <2*cmp01>, Allocated 2 Slot(s) on Host(s) <2*cmp01>, Execution Home </home/liyanqing>, Execution CWD </home/liyanqing>;
Mon Oct 26 17:46:17: Resource usage collected. The CPU time used is 12 seconds. MEM: 2 Gbytes; SWAP: 238 Mbytes; NTHREAD: 4; PGID: 10643; PIDs: 10643;
Job <123456[2]>, Job Name <arr[2]>, User <zhangsan>, Project <default>, Status <RUN>, Queue <short>, Command <make>
Mon Oct 26 18:00:00: Submitted from host <cmp02>, CWD </proj/a>, Requested Resources <rusage[mem=500]>;
Mon Oct 26 18:00:01: Started 1 Task(s) on Host(s) <cmp02>, Allocated 1 Slot(s) on Host(s) <cmp02>, Execution Home </home/zhangsan>, Execution CWD </proj/a>;
";

    pub const BQUEUES: &str = "
QUEUE_NAME      PRIO STATUS          MAX JL/U JL/P JL/H NJOBS  PEND   RUN  SUSP  RSV PJOBS
normal           30  Open:Active       -    -    -    -     2     0     2     0    0     0
short            40  Open:Active       -    -    -    -    10     4     6     0    0     4
";

    pub const BHOSTS: &str = "
HOST_NAME          STATUS          JL/U    MAX  NJOBS    RUN  SSUSP  USUSP    RSV
cmp01              ok              -       8      2      2      0      0      0
cmp02              closed_Full     -       1      1      1      0      0      0
";

    pub const LSLOAD: &str = "
HOST_NAME               status  r15s   r1m  r15m   ut    pg    ls    it   tmp    swp   mem
cmp01                   ok      0.7    0.3  0.2    5%    0.0   1     0    7391M  1.9G  931M
cmp02                   busy    9.7*   9.3  8.2    98%*  0.0   1     0    7391M  1.9G  2G
cmp03                   unavail
";

    pub const BUSERS: &str = "
USER/GROUP          JL/P    MAX  NJOBS   PEND    RUN  SSUSP  USUSP    RSV
liyanqing           -       -    2       0       2    0      0        0
zhangsan            -       -    10      4       6    0      0        0
";
}

#[cfg(test)]
use samplestore::{list_tables, read_table};

#[cfg(test)]
fn test_time(s: &str) -> Timestamp {
    rustutils::parse_sample_time(s).unwrap()
}

#[test]
fn test_sample_queues() {
    let dir = tempfile::TempDir::new().unwrap();
    let config = testing::config(dir.path());
    let runner = testing::FakeRunner::new();

    let n = sample_kind(Kind::Queue, &config, &runner, None, test_time("20240101_000000")).unwrap();
    assert!(n == 2);
    let shard = dir.path().join("monitor/queue.db");
    assert!(shard_path(&config, Kind::Queue) == shard);
    assert!(
        list_tables(&shard).unwrap()
            == vec![
                "queue_ALL".to_string(),
                "queue_normal".to_string(),
                "queue_short".to_string()
            ]
    );
    let t = read_table(&shard, "queue_short", &[], 0).unwrap();
    assert!(
        t.columns()
            == &[
                "sampleTime".to_string(),
                "NJOBS".to_string(),
                "PEND".to_string(),
                "RUN".to_string(),
                "SUSP".to_string()
            ]
    );
    assert!(t.get(0, "PEND") == Some("4"));
    let t = read_table(&shard, "queue_ALL", &["NJOBS", "PEND", "RUN", "SUSP"], 0).unwrap();
    assert!(
        t.rows()[0]
            == vec![
                "12".to_string(),
                "4".to_string(),
                "8".to_string(),
                "0".to_string()
            ]
    );
}

#[test]
fn test_sample_hosts_load_users() {
    let dir = tempfile::TempDir::new().unwrap();
    let config = testing::config(dir.path());
    let runner = testing::FakeRunner::new();
    let now = test_time("20240101_000000");

    assert!(sample_kind(Kind::Host, &config, &runner, None, now).unwrap() == 2);
    let t = read_table(&shard_path(&config, Kind::Host), "host_cmp02", &["NJOBS", "RUN"], 0).unwrap();
    assert!(t.rows()[0] == vec!["1".to_string(), "1".to_string()]);

    assert!(sample_kind(Kind::Load, &config, &runner, None, now).unwrap() == 3);
    let load = shard_path(&config, Kind::Load);
    let t = read_table(&load, "load_cmp02", &["ut", "tmp", "swp", "mem"], 0).unwrap();
    assert!(
        t.rows()[0]
            == vec![
                "98%".to_string(),
                "7391M".to_string(),
                "1.9G".to_string(),
                "2G".to_string()
            ]
    );
    let t = read_table(&load, "load_cmp03", &["ut"], 0).unwrap();
    assert!(t.get(0, "ut") == Some(""));

    assert!(sample_kind(Kind::User, &config, &runner, None, now).unwrap() == 2);
    let t = read_table(&shard_path(&config, Kind::User), "user_zhangsan", &["PEND"], 0).unwrap();
    assert!(t.get(0, "PEND") == Some("4"));
}

#[test]
fn test_sample_jobs() {
    let dir = tempfile::TempDir::new().unwrap();
    let config = testing::config(dir.path());
    let runner = testing::FakeRunner::new();
    let parser = testing::parser(&runner);
    let p = Some(parser.as_ref());

    let n = sample_kind(Kind::Job, &config, &runner, p, test_time("20240101_000000")).unwrap();
    assert!(n == 2);
    let low = dir.path().join("monitor/job/0_99999.db");
    let t = read_table(&low, "job_101", &["sampleTime", "mem"], 0).unwrap();
    assert!(t.rows()[0] == vec!["20240101_000000".to_string(), "2048".to_string()]);

    // The array element lands in its parent's range, under its own name, with no memory reading.
    let high = dir.path().join("monitor/job/100000_199999.db");
    let t = read_table(&high, "job_123456[2]", &["mem"], 0).unwrap();
    assert!(t.get(0, "mem") == Some(""));

    // A second pass within the hour appends; one after more than an hour starts over.
    sample_kind(Kind::Job, &config, &runner, p, test_time("20240101_003000")).unwrap();
    assert!(read_table(&low, "job_101", &[], 0).unwrap().len() == 2);
    sample_kind(Kind::Job, &config, &runner, p, test_time("20240101_020000")).unwrap();
    assert!(read_table(&low, "job_101", &[], 0).unwrap().len() == 1);
}

#[test]
fn test_report_failures() {
    let dir = tempfile::TempDir::new().unwrap();
    let config = testing::config(dir.path());
    let now = test_time("20240101_000000");

    let mut runner = testing::FakeRunner::new();
    let parser = testing::parser(&runner);
    let p = Some(parser.as_ref());
    runner.set("bjobs", 255, "", "No running job found\n");
    assert!(sample_kind(Kind::Job, &config, &runner, p, now).unwrap() == 0);
    runner.set("bjobs", 255, "", "No unfinished job found\n");
    assert!(sample_kind(Kind::Job, &config, &runner, p, now).unwrap() == 0);

    // A command that is not there is a failure, whatever the shell says about it.
    runner.set("bjobs", 127, "", "sh: 1: bjobs: not found\n");
    assert!(sample_kind(Kind::Job, &config, &runner, p, now).is_err());
    runner.set("bjobs", 126, "", "sh: 1: bjobs: Permission denied\n");
    assert!(sample_kind(Kind::Job, &config, &runner, p, now).is_err());
    runner.set("bjobs", 255, "", "LSF is down. Please wait ...\n");
    assert!(sample_kind(Kind::Job, &config, &runner, p, now).is_err());
    assert!(!dir.path().join("monitor/job").exists());

    // Only the job report has an empty form.
    runner.set("bqueues", 255, "", "No queue found\n");
    assert!(sample_kind(Kind::Queue, &config, &runner, None, now).is_err());
    runner.set("bqueues", 127, "", "sh: 1: bqueues: not found\n");
    assert!(sample_kind(Kind::Queue, &config, &runner, None, now).is_err());
    assert!(!shard_path(&config, Kind::Queue).exists());

    runner.set("bhosts", 0, "HOST_NAME STATUS\ncmp01 ok\n", "");
    assert!(sample_kind(Kind::Host, &config, &runner, None, now).is_err());

    runner.set("bjobs", 0, testing::BJOBS, "");
    assert!(sample_kind(Kind::Job, &config, &runner, None, now).is_err());
}
