/// Parser for the long per-job report, `bjobs -UF`.
///
/// Each job is one block of lines: a header line starting `Job <id>` that carries most identity
/// fields as `Key <value>` pairs, followed by event lines (submitted, started, resource usage,
/// finished) and some indented sections (RUNLIMIT, MEMORY USAGE, PENDING REASONS, ...).  A block
/// ends where the next header starts, or at the end of the input.
///
///   Job <101>, Job Name <test>, User <lh>, Project <default>, Status <RUN>, Queue <normal>, ...
///   Mon Oct 26 17:43:07: Submitted from host <cmp01>, CWD <$HOME>, 2 Task(s), Requested ...
///   Mon Oct 26 17:43:07: Started 2 Task(s) on Host(s) <2*cmp01>, Allocated 2 Slot(s) on ...
///   Mon Oct 26 17:46:17: Resource usage collected. MEM: 2 Mbytes; SWAP: 238 Mbytes; ...
///
/// The scanner keeps one current record and every line is matched against an ordered set of line
/// rules; a rule that does not match, or a field that is absent from a matched line, leaves the
/// field at its default.  Nothing here fails on garbled input.
///
/// There are two output dialects.  LSF (and volclava) say "2 Task(s)" and "Started 2 Task(s) on
/// Host(s) <...>, Allocated ...", openlava says "2 Processors Requested" and "Started on 2
/// Hosts/Processors <...>".  The dialect is probed once per run (see probe.rs) and the matching
/// parser is used for the whole report.
use crate::units::MemUnit;

use anyhow::Result;
use log::warn;
use regex::Regex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Lsf,
    Openlava,
}

/// Everything we pick out of one job's block.  Memory values are in MB.  Times are kept as the
/// scheduler prints them (see bjobs_time.rs for conversion).

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetailRecord {
    pub job_id: String,
    pub job_name: String,
    pub job_description: String,
    pub user: String,
    pub project: String,
    pub status: String,
    pub interactive: bool,
    pub queue: String,
    pub command: String,
    pub submitted_from: String,
    pub submitted_time: String,
    pub cwd: String,
    pub processors_requested: u32,
    pub requested_resources: String,
    pub span_hosts: Option<u32>,
    pub rusage_mem: Option<f64>,
    pub started_on: String,
    pub exec_hosts: Vec<String>,
    pub started_time: String,
    pub finished_time: String,
    pub exit_code: Option<i32>,
    pub term_signal: String,
    pub cpu_time: Option<f64>,
    pub mem: Option<f64>,
    pub swap: Option<f64>,
    pub pids: Vec<String>,
    pub max_mem: Option<f64>,
    pub avg_mem: Option<f64>,
    pub run_limit: Vec<String>,
    pub pending_reasons: Vec<String>,

    /// The whole block, one trimmed line per line, for display.
    pub job_info: String,
}

impl DetailRecord {
    fn new(job_id: &str) -> DetailRecord {
        DetailRecord {
            job_id: job_id.to_string(),
            processors_requested: 1,
            ..Default::default()
        }
    }
}

/// The dialect-agnostic face of the detail parsers.

pub trait DetailParser: Send + Sync {
    fn dialect(&self) -> Dialect;

    /// Parse a whole report into records, in the order the jobs appear.
    fn parse(&self, text: &str) -> Vec<DetailRecord>;
}

/// `unit_for_limits` is the cluster's LSF_UNIT_FOR_LIMITS; openlava has no such setting and always
/// reserves in MB.

pub fn new_detail_parser(
    dialect: Dialect,
    unit_for_limits: MemUnit,
) -> Result<Box<dyn DetailParser>> {
    match dialect {
        Dialect::Lsf => Ok(Box::new(LsfDetailParser::new(unit_for_limits)?)),
        Dialect::Openlava => Ok(Box::new(OpenlavaDetailParser::new()?)),
    }
}

pub struct LsfDetailParser {
    grammar: Grammar,
    unit_for_limits: MemUnit,
}

impl LsfDetailParser {
    pub fn new(unit_for_limits: MemUnit) -> Result<LsfDetailParser> {
        Ok(LsfDetailParser {
            grammar: Grammar::new(&LSF_RULES)?,
            unit_for_limits,
        })
    }
}

impl DetailParser for LsfDetailParser {
    fn dialect(&self) -> Dialect {
        Dialect::Lsf
    }

    fn parse(&self, text: &str) -> Vec<DetailRecord> {
        scan(&self.grammar, self.unit_for_limits, text)
    }
}

pub struct OpenlavaDetailParser {
    grammar: Grammar,
}

impl OpenlavaDetailParser {
    pub fn new() -> Result<OpenlavaDetailParser> {
        Ok(OpenlavaDetailParser {
            grammar: Grammar::new(&OPENLAVA_RULES)?,
        })
    }
}

impl DetailParser for OpenlavaDetailParser {
    fn dialect(&self) -> Dialect {
        Dialect::Openlava
    }

    fn parse(&self, text: &str) -> Vec<DetailRecord> {
        scan(&self.grammar, MemUnit::MB, text)
    }
}

// The rules that differ between the dialects.  `started` must have the named groups `time` and
// `hosts`, `term_signal` the named group `signal`.

struct DialectRules {
    processors: &'static str,
    started: &'static str,
    cpu_time: Option<&'static str>,
    term_signal: &'static str,
    run_limit: Option<&'static str>,
}

const LSF_RULES: DialectRules = DialectRules {
    processors: r" (\d+) Task\(s\)",
    started: r"^(?P<time>.+?): (?:\[\d+\] )?(?:[sS]tarted|[dD]ispatched) \d+ Task\(s\) on Host\(s\) (?P<hosts>.+?), Allocated \d+ Slot\(s\) on Host\(s\)",
    cpu_time: Some(r"The CPU time used is (\d+(?:\.\d+)?) seconds"),
    term_signal: r"(?P<signal>TERM_[A-Z_]+): ",
    run_limit: Some(r"^RUNLIMIT$"),
};

const OPENLAVA_RULES: DialectRules = DialectRules {
    processors: r" ([1-9]\d*) Processors Requested",
    started: r"^(?P<time>.+?): (?:[sS]tarted|[dD]ispatched) on (?:\d+ Hosts/Processors )?(?P<hosts>[^;,]+)",
    cpu_time: None,
    term_signal: r"TERM_OWNER: (?P<signal>.+?\.)",
    run_limit: None,
};

struct Grammar {
    header: Regex,
    not_found: Regex,

    // Same-line fields of the header
    job_name: Regex,
    job_description: Regex,
    user: Regex,
    project: Regex,
    status: Regex,
    queue: Regex,
    interactive: Regex,
    command: Regex,

    // Event lines, in the order they are tried
    submitted: Regex,
    cwd: Regex,
    processors: Regex,
    requested_resources: Regex,
    span_hosts: Regex,
    rusage_mem: Regex,
    started: Regex,
    usage_collected: Regex,
    cpu_time: Option<Regex>,
    mem: Regex,
    swap: Regex,
    pids: Regex,
    finished: Regex,
    exit_code: Regex,
    term_signal: Regex,
    max_mem: Regex,

    // Section markers
    pending_reasons: Regex,
    run_limit: Option<Regex>,
}

impl Grammar {
    fn new(rules: &DialectRules) -> Result<Grammar> {
        Ok(Grammar {
            header: Regex::new(r"^Job <(\d+(?:\[\d+\])?)>")?,
            not_found: Regex::new(r"^Job <\d+(?:\[\d+\])?> is not found")?,
            job_name: Regex::new(r"Job Name <([^>]+)>")?,
            job_description: Regex::new(r"Job Description <([^>]+)>")?,
            user: Regex::new(r"User <([^>]+)>")?,
            project: Regex::new(r"Project <([^>]+)>")?,
            status: Regex::new(r"Status <([A-Z]+)>")?,
            queue: Regex::new(r"Queue <([^>]+)>")?,
            interactive: Regex::new(r"Interactive pseudo-terminal shell mode")?,
            command: Regex::new(r"Command <(.+?\S)>")?,
            submitted: Regex::new(r"^(.+?): Submitted from host <([^>]+)>")?,
            cwd: Regex::new(r"CWD <([^>]+)>")?,
            processors: Regex::new(rules.processors)?,
            requested_resources: Regex::new(r"Requested Resources <(.+?)>(?:;|,|$)")?,
            span_hosts: Regex::new(r"span\[hosts=(\d+)")?,
            rusage_mem: Regex::new(r"rusage\s*\[[^\]]*\bmem=(\d+(?:\.\d+)?)")?,
            started: Regex::new(rules.started)?,
            usage_collected: Regex::new(r"Resource usage collected")?,
            cpu_time: match rules.cpu_time {
                Some(r) => Some(Regex::new(r)?),
                None => None,
            },
            mem: Regex::new(r"[.;]\s+MEM:\s*(\d+(?:\.\d+)?)\s*([KMGT])[bB]ytes")?,
            swap: Regex::new(r"SWAP:\s*(\d+(?:\.\d+)?)\s*([KMGT])[bB]ytes")?,
            pids: Regex::new(r"PIDs:\s+(.+?);")?,
            finished: Regex::new(
                r"^(.+?): (?:Done successfully|Exited|Termination request issued)",
            )?,
            exit_code: Regex::new(r"Exited with exit code (\d+)\.")?,
            term_signal: Regex::new(rules.term_signal)?,
            max_mem: Regex::new(
                r"^MAX MEM: (\d+(?:\.\d+)?) ([KMGT])[bB]ytes;\s*AVG MEM: (\d+(?:\.\d+)?) ([KMGT])[bB]ytes",
            )?,
            pending_reasons: Regex::new(r"^PENDING REASONS:")?,
            run_limit: match rules.run_limit {
                Some(r) => Some(Regex::new(r)?),
                None => None,
            },
        })
    }
}

#[derive(PartialEq, Clone, Copy)]
enum Section {
    Body,
    PendingReasons,
    RunLimit,
}

fn scan(g: &Grammar, unit_for_limits: MemUnit, text: &str) -> Vec<DetailRecord> {
    let mut records: Vec<DetailRecord> = vec![];
    let mut section = Section::Body;

    for line in text.lines() {
        let line = line.trim();

        // bjobs reports jobs that vanished between listing and reporting this way; it is not a
        // new block.
        if g.not_found.is_match(line) {
            continue;
        }

        if let Some(caps) = g.header.captures(line) {
            let mut rec = DetailRecord::new(&caps[1]);
            parse_header(g, line, &mut rec);
            rec.job_info.push_str(line);
            records.push(rec);
            section = Section::Body;
            continue;
        }

        // Anything before the first header is noise.
        let Some(rec) = records.last_mut() else {
            continue;
        };
        rec.job_info.push('\n');
        rec.job_info.push_str(line);

        if line.is_empty() {
            section = Section::Body;
            continue;
        }

        match section {
            Section::PendingReasons => {
                rec.pending_reasons.push(line.to_string());
                continue;
            }
            Section::RunLimit => {
                rec.run_limit.push(line.to_string());
                section = Section::Body;
                continue;
            }
            Section::Body => {}
        }

        if let Some(caps) = g.submitted.captures(line) {
            rec.submitted_time = caps[1].to_string();
            rec.submitted_from = caps[2].to_string();
            if let Some(cwd) = grab(&g.cwd, line) {
                rec.cwd = cwd;
            }
            if let Some(n) = grab(&g.processors, line) {
                if let Ok(n) = n.parse::<u32>() {
                    rec.processors_requested = n;
                }
            }
            if let Some(resources) = grab(&g.requested_resources, line) {
                if let Some(n) = grab(&g.span_hosts, &resources) {
                    rec.span_hosts = n.parse::<u32>().ok();
                }
                if let Some(m) = grab(&g.rusage_mem, &resources) {
                    rec.rusage_mem = m.parse::<f64>().ok().map(|v| unit_for_limits.to_mb(v));
                }
                rec.requested_resources = resources;
            }
        } else if let Some(caps) = g.started.captures(line) {
            rec.started_time = caps["time"].to_string();
            rec.exec_hosts = parse_hosts(&caps["hosts"]);
            rec.started_on = rec.exec_hosts.first().cloned().unwrap_or_default();
        } else if g.usage_collected.is_match(line) {
            if let Some(ref cpu_time) = g.cpu_time {
                if let Some(t) = grab(cpu_time, line) {
                    rec.cpu_time = t.parse::<f64>().ok();
                }
            }
            // The first reading is the one that sticks, later ones are ignored.
            if rec.mem.is_none() {
                if let Some(caps) = g.mem.captures(line) {
                    rec.mem = memory_mb(&caps[1], &caps[2]);
                }
            }
            if let Some(caps) = g.swap.captures(line) {
                rec.swap = memory_mb(&caps[1], &caps[2]);
            }
            let pids = g
                .pids
                .captures_iter(line)
                .flat_map(|c| {
                    c[1].split_whitespace()
                        .map(|p| p.to_string())
                        .collect::<Vec<String>>()
                })
                .collect::<Vec<String>>();
            if !pids.is_empty() {
                rec.pids = pids;
            }
        } else if let Some(caps) = g.finished.captures(line) {
            rec.finished_time = caps[1].to_string();
            if let Some(code) = grab(&g.exit_code, line) {
                rec.exit_code = code.parse::<i32>().ok();
            }
        } else if let Some(caps) = g.term_signal.captures(line) {
            rec.term_signal = caps["signal"].to_string();
        } else if let Some(caps) = g.max_mem.captures(line) {
            rec.max_mem = memory_mb(&caps[1], &caps[2]);
            rec.avg_mem = memory_mb(&caps[3], &caps[4]);
        } else if g.pending_reasons.is_match(line) {
            section = Section::PendingReasons;
        } else if g.run_limit.as_ref().map_or(false, |r| r.is_match(line)) {
            section = Section::RunLimit;
        }
    }

    records
}

fn parse_header(g: &Grammar, line: &str, rec: &mut DetailRecord) {
    if let Some(s) = grab(&g.job_name, line) {
        rec.job_name = s;
    }
    if let Some(s) = grab(&g.job_description, line) {
        rec.job_description = s;
    }
    if let Some(s) = grab(&g.user, line) {
        rec.user = s;
    }
    if let Some(s) = grab(&g.project, line) {
        rec.project = s;
    }
    if let Some(s) = grab(&g.status, line) {
        rec.status = s;
    } else {
        warn!("No status in header of job {}: {line}", rec.job_id);
    }
    if let Some(s) = grab(&g.queue, line) {
        rec.queue = s;
    }
    rec.interactive = g.interactive.is_match(line);
    if let Some(s) = grab(&g.command, line) {
        rec.command = s;
    }
}

fn grab(re: &Regex, line: &str) -> Option<String> {
    re.captures(line).map(|c| c[1].to_string())
}

fn memory_mb(value: &str, prefix: &str) -> Option<f64> {
    let v = value.parse::<f64>().ok()?;
    Some(MemUnit::from_prefix(prefix)?.to_mb(v))
}

// "<2*cmp01> <cmp02>" => ["cmp01", "cmp02"], dropping multiplicity prefixes and duplicates.

fn parse_hosts(s: &str) -> Vec<String> {
    let mut hosts: Vec<String> = vec![];
    for h in s.replace(|c| c == '<' || c == '>', " ").split_whitespace() {
        let name = match h.split_once('*') {
            Some((n, rest)) if !n.is_empty() && n.chars().all(|c| c.is_ascii_digit()) => rest,
            _ => h,
        };
        if !name.is_empty() && !hosts.iter().any(|x| x == name) {
            hosts.push(name.to_string());
        }
    }
    hosts
}

#[cfg(test)]
const LSF_REPORT: &str = "
Job <101>, Job Name <Test for lsfMonitor>, User <liyanqing>, Project <lsf_test>, Status <RUN>, Queue <normal>, Command <sleep 12345>, Share group charged </liyanqing>
Mon Oct 26 17:43:07: Submitted from host <cmp01>, CWD <$HOME>, 2 Task(s), Requested Resources <span[hosts=1] rusage[mem=2048]>;
Mon Oct 26 17:43:07: Started 2 Task(s) on Host(s) <2*cmp01>, Allocated 2 Slot(s) on Host(s) <2*cmp01>, Execution Home </home/liyanqing>, Execution CWD </home/liyanqing>;
Mon Oct 26 17:46:17: Resource usage collected. The CPU time used is 12 seconds. MEM: 2 Gbytes; SWAP: 238 Mbytes; NTHREAD: 4; PGID: 10643; PIDs: 10643 10644 10646;
Mon Oct 26 17:50:17: Resource usage collected. The CPU time used is 30 seconds. MEM: 4 Gbytes; SWAP: 300 Mbytes; NTHREAD: 4; PGID: 10643; PIDs: 10643 10644;

 RUNLIMIT
 60.0 min

 MEMORY USAGE:
 MAX MEM: 3 Gbytes;  AVG MEM: 512 Mbytes

 SCHEDULING PARAMETERS:
           r15s   r1m  r15m   ut      pg    io   ls    it    tmp    swp    mem
 load_sched   -     -     -     -       -     -    -     -     -      -      -

 RESOURCE REQUIREMENT DETAILS:
 Combined: select[type == local] order[r15s:pg] rusage[mem=2048.00] span[hosts=1]
Job <102> is not found
Job <103>, User <zhangsan>, Project <default>, Status <PEND>, Queue <short>, Command <make -j8>
Mon Oct 26 18:00:00: Submitted from host <cmp02>, CWD </proj/a>, Requested Resources <rusage[mem=500]>;
 PENDING REASONS:
 Job's requirements for reserving resource (mem) not satisfied: 3 hosts;
 Not specified in job submission: 1 host;

 SCHEDULING PARAMETERS:
Job <104[3]>, Job Name <arr[3]>, User <lisi>, Project <default>, Status <EXIT>, Queue <normal>, Interactive pseudo-terminal shell mode, Command <echo a > b>
Mon Oct 26 17:00:00: Submitted from host <cmp03>, CWD <$HOME>, Requested Resources <select[mem>1000] rusage[mem=1]>, Specified Hosts <cmp04>;
Mon Oct 26 17:00:02: [3] started 1 Task(s) on Host(s) <cmp04>, Allocated 1 Slot(s) on Host(s) <cmp04>, Execution Home </home/lisi>, Execution CWD </home/lisi>;
Mon Oct 26 17:00:05: Exited with exit code 1. The CPU time used is 0.1 seconds.
Mon Oct 26 17:00:05: Completed <exit>; TERM_OWNER: job killed by owner.
";

#[cfg(test)]
const OPENLAVA_REPORT: &str = "
Job <305>, User <liyanqing.1987>, Project <default>, Status <RUN>, Queue <normal>, Interactive pseudo-terminal shell mode, Command <sleep 1000>, Job Description <this is a test>
Sun Mar 23 10:08:18: Submitted from host <openlava4-test-cmp1>, CWD <$HOME>, 2 Processors Requested, Requested Resources <rusage[mem=123]>;
Sun Mar 23 10:08:22: Started on 2 Hosts/Processors <openlava4-test-cmp1> <openlava4-test-cmp1>;
Sun Mar 23 10:08:36: Resource usage collected. MEM: 3 Mbytes; SWAP: 247 Mbytes; PGID: 23518; PIDs: 23518 ; PGID: 23523; PIDs: 23523 23524;

 MEMORY USAGE:
 MAX MEM: N/A MBytes;  AVG MEM: N/A MBytes
";

#[test]
fn test_lsf_running_job() {
    let p = new_detail_parser(Dialect::Lsf, MemUnit::MB).unwrap();
    assert!(p.dialect() == Dialect::Lsf);
    let recs = p.parse(LSF_REPORT);
    assert!(recs.len() == 3);

    let r = &recs[0];
    assert!(r.job_id == "101");
    assert!(r.job_name == "Test for lsfMonitor");
    assert!(r.user == "liyanqing");
    assert!(r.project == "lsf_test");
    assert!(r.status == "RUN");
    assert!(r.queue == "normal");
    assert!(r.command == "sleep 12345");
    assert!(!r.interactive);
    assert!(r.submitted_time == "Mon Oct 26 17:43:07");
    assert!(r.submitted_from == "cmp01");
    assert!(r.cwd == "$HOME");
    assert!(r.processors_requested == 2);
    assert!(r.requested_resources == "span[hosts=1] rusage[mem=2048]");
    assert!(r.span_hosts == Some(1));
    assert!(r.rusage_mem == Some(2048.0));
    assert!(r.started_time == "Mon Oct 26 17:43:07");
    assert!(r.started_on == "cmp01");
    assert!(r.exec_hosts == vec!["cmp01".to_string()]);

    // First memory reading sticks, the rest follow the latest line.
    assert!(r.mem == Some(2048.0));
    assert!(r.swap == Some(300.0));
    assert!(r.cpu_time == Some(30.0));
    assert!(r.pids == vec!["10643".to_string(), "10644".to_string()]);

    assert!(r.run_limit == vec!["60.0 min".to_string()]);
    assert!(r.max_mem == Some(3072.0));
    assert!(r.avg_mem == Some(512.0));
    assert!(r.finished_time == "");
    assert!(r.exit_code.is_none());
    assert!(r.pending_reasons.is_empty());
    assert!(r.job_info.starts_with("Job <101>, Job Name"));
    assert!(r.job_info.contains("\nRESOURCE REQUIREMENT DETAILS:\n"));
    assert!(!r.job_info.contains("not found"));
}

#[test]
fn test_lsf_pending_job() {
    let p = new_detail_parser(Dialect::Lsf, MemUnit::MB).unwrap();
    let recs = p.parse(LSF_REPORT);
    let r = &recs[1];
    assert!(r.job_id == "103");
    assert!(r.status == "PEND");
    assert!(r.job_name == "");
    assert!(r.processors_requested == 1);
    assert!(r.rusage_mem == Some(500.0));
    assert!(r.span_hosts.is_none());
    assert!(r.started_on == "");
    assert!(r.mem.is_none());
    assert!(
        r.pending_reasons
            == vec![
                "Job's requirements for reserving resource (mem) not satisfied: 3 hosts;"
                    .to_string(),
                "Not specified in job submission: 1 host;".to_string()
            ]
    );
}

#[test]
fn test_lsf_finished_array_job() {
    let p = new_detail_parser(Dialect::Lsf, MemUnit::MB).unwrap();
    let recs = p.parse(LSF_REPORT);
    let r = &recs[2];
    assert!(r.job_id == "104[3]");
    assert!(r.job_name == "arr[3]");
    assert!(r.interactive);
    assert!(r.command == "echo a > b");
    assert!(r.requested_resources == "select[mem>1000] rusage[mem=1]");
    assert!(r.rusage_mem == Some(1.0));
    assert!(r.started_time == "Mon Oct 26 17:00:02");
    assert!(r.started_on == "cmp04");
    assert!(r.finished_time == "Mon Oct 26 17:00:05");
    assert!(r.exit_code == Some(1));
    assert!(r.term_signal == "TERM_OWNER");
}

#[test]
fn test_reservation_unit() {
    let report = "
Job <101>, User <u>, Status <RUN>, Queue <normal>, Command <sleep 100>
Mon Oct 26 17:43:07: Submitted from host <cmp01>, CWD <$HOME>, Requested Resources <rusage[mem=2048]>;
";
    let recs = new_detail_parser(Dialect::Lsf, MemUnit::MB).unwrap().parse(report);
    assert!(recs.len() == 1);
    assert!(recs[0].job_id == "101");
    assert!(recs[0].rusage_mem == Some(2048.0));

    let recs = new_detail_parser(Dialect::Lsf, MemUnit::KB).unwrap().parse(report);
    assert!(recs[0].rusage_mem == Some(2.0));

    let recs = new_detail_parser(Dialect::Lsf, MemUnit::GB).unwrap().parse(report);
    assert!(recs[0].rusage_mem == Some(2048.0 * 1024.0));
}

#[test]
fn test_openlava_job() {
    let p = new_detail_parser(Dialect::Openlava, MemUnit::GB).unwrap();
    assert!(p.dialect() == Dialect::Openlava);
    let recs = p.parse(OPENLAVA_REPORT);
    assert!(recs.len() == 1);
    let r = &recs[0];
    assert!(r.job_id == "305");
    assert!(r.user == "liyanqing.1987");
    assert!(r.interactive);
    assert!(r.job_description == "this is a test");
    assert!(r.processors_requested == 2);
    // openlava reservations are always MB, whatever unit the caller passed.
    assert!(r.rusage_mem == Some(123.0));
    assert!(r.started_time == "Sun Mar 23 10:08:22");
    assert!(r.started_on == "openlava4-test-cmp1");
    assert!(r.exec_hosts.len() == 1);
    assert!(r.mem == Some(3.0));
    assert!(r.swap == Some(247.0));
    assert!(r.cpu_time.is_none());
    assert!(
        r.pids
            == vec![
                "23518".to_string(),
                "23523".to_string(),
                "23524".to_string()
            ]
    );
    assert!(r.max_mem.is_none());
}

#[test]
fn test_dialect_mismatch() {
    // The LSF grammar does not understand openlava's processor and start lines.
    let recs = new_detail_parser(Dialect::Lsf, MemUnit::MB)
        .unwrap()
        .parse(OPENLAVA_REPORT);
    assert!(recs.len() == 1);
    assert!(recs[0].processors_requested == 1);
    assert!(recs[0].started_on == "");
    assert!(recs[0].mem == Some(3.0));
}

#[test]
fn test_garbage() {
    let p = new_detail_parser(Dialect::Lsf, MemUnit::MB).unwrap();
    assert!(p.parse("").is_empty());
    assert!(p.parse("No unfinished job found\n").is_empty());
    let recs = p.parse("Job <7>\nMon: Submitted from host <\nResource usage collected. MEM: lots\n");
    assert!(recs.len() == 1);
    assert!(recs[0].job_id == "7");
    assert!(recs[0].status == "");
    assert!(recs[0].mem.is_none());
}

#[test]
fn test_parse_hosts() {
    assert!(parse_hosts("<2*cmp01> <cmp02>") == vec!["cmp01".to_string(), "cmp02".to_string()]);
    assert!(parse_hosts("<a> <a>") == vec!["a".to_string()]);
    assert!(parse_hosts("") == Vec::<String>::new());
}
