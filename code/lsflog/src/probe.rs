/// Find out what we're talking to.
///
/// `lsid` says which scheduler family and version is installed and names the cluster and its
/// master; that decides which detail grammar applies.  For LSF the unit of memory reservations is
/// a cluster setting (LSF_UNIT_FOR_LIMITS), read from `badmin showconf mbd all`.  Both probes are
/// cheap and are run once per job pass.
use crate::detail::{new_detail_parser, DetailParser, Dialect};
use crate::units::MemUnit;

use anyhow::{bail, Result};
use log::{debug, warn};
use regex::Regex;
use rustutils::{CommandRunner, Commands};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerFamily {
    /// IBM LSF and volclava, which speak the newer report dialect
    Lsf,

    /// openlava in all its spellings
    Openlava,

    Unknown,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerInfo {
    pub family: SchedulerFamily,

    /// The product as named on the banner line: "LSF", "volclava", "openlava", or ""
    pub tool: String,
    pub version: String,
    pub cluster: String,
    pub master: String,
}

impl SchedulerInfo {
    pub fn dialect(&self) -> Option<Dialect> {
        match self.family {
            SchedulerFamily::Lsf => Some(Dialect::Lsf),
            SchedulerFamily::Openlava => Some(Dialect::Openlava),
            SchedulerFamily::Unknown => None,
        }
    }
}

pub fn parse_lsid(text: &str) -> Result<SchedulerInfo> {
    let cluster_re = Regex::new(r"^My\s+cluster\s+name\s+is\s+(\S+)$")?;
    let master_re = Regex::new(r"^My\s+master\s+name\s+is\s+(\S+)$")?;
    let openlava_re = Regex::new(r"Open_lava|openlava|Openlava|OpenLava")?;
    let version_re = Regex::new(r"^.*\s+([\d.]+),")?;

    let mut info = SchedulerInfo {
        family: SchedulerFamily::Unknown,
        tool: "".to_string(),
        version: "".to_string(),
        cluster: "".to_string(),
        master: "".to_string(),
    };
    for line in text.lines() {
        let line = line.trim();
        if let Some(c) = cluster_re.captures(line) {
            info.cluster = c[1].to_string();
        } else if let Some(c) = master_re.captures(line) {
            info.master = c[1].to_string();
        } else if line.contains("LSF") || line.contains("volclava") || openlava_re.is_match(line) {
            if line.contains("LSF") {
                info.family = SchedulerFamily::Lsf;
                info.tool = "LSF".to_string();
            } else if line.contains("volclava") {
                info.family = SchedulerFamily::Lsf;
                info.tool = "volclava".to_string();
            } else {
                info.family = SchedulerFamily::Openlava;
                info.tool = "openlava".to_string();
            }
            if let Some(c) = version_re.captures(line) {
                info.version = c[1].to_string();
            }
        }
    }
    Ok(info)
}

/// The first LSF_UNIT_FOR_LIMITS setting, or MB if there is none or it makes no sense.

pub fn parse_unit_for_limits(text: &str) -> Result<MemUnit> {
    let re = Regex::new(r"^LSF_UNIT_FOR_LIMITS\s*=\s*(\S+)$")?;
    for line in text.lines() {
        if let Some(c) = re.captures(line.trim()) {
            return Ok(match MemUnit::parse(&c[1]) {
                Some(u) => u,
                None => {
                    warn!("Unrecognized LSF_UNIT_FOR_LIMITS '{}', assuming MB", &c[1]);
                    MemUnit::MB
                }
            });
        }
    }
    Ok(MemUnit::MB)
}

/// Run the probes and construct the detail parser for this cluster.  An unrecognizable scheduler is
/// an error; a failing unit probe is not, we then assume MB.

pub fn probe_detail_parser(
    runner: &dyn CommandRunner,
    commands: &Commands,
) -> Result<Box<dyn DetailParser>> {
    let out = runner.run(&commands.lsid)?;
    if !out.success() {
        bail!(
            "'{}' failed with status {}: {}",
            commands.lsid,
            out.status,
            out.stderr_text().trim()
        );
    }
    let info = parse_lsid(&out.stdout_text())?;
    let Some(dialect) = info.dialect() else {
        bail!("Could not determine the scheduler from '{}'", commands.lsid);
    };
    debug!(
        "Scheduler {} {} cluster {} master {}",
        info.tool, info.version, info.cluster, info.master
    );

    let unit = match dialect {
        Dialect::Openlava => MemUnit::MB,
        Dialect::Lsf => match runner.run(&commands.unit_for_limits) {
            Ok(out) if out.success() => parse_unit_for_limits(&out.stdout_text())?,
            Ok(out) => {
                warn!(
                    "'{}' failed with status {}, assuming MB",
                    commands.unit_for_limits, out.status
                );
                MemUnit::MB
            }
            Err(e) => {
                warn!("{e}, assuming MB");
                MemUnit::MB
            }
        },
    };

    new_detail_parser(dialect, unit)
}

#[cfg(test)]
use rustutils::CommandOutput;

#[cfg(test)]
struct CannedRunner {
    lsid: &'static str,
    showconf: Option<&'static str>,
}

#[cfg(test)]
impl CommandRunner for CannedRunner {
    fn run(&self, command: &str) -> Result<CommandOutput> {
        let (status, text) = if command == "lsid" {
            (0, self.lsid)
        } else {
            match self.showconf {
                Some(s) => (0, s),
                None => (255, ""),
            }
        };
        Ok(CommandOutput {
            status,
            stdout: text.as_bytes().to_vec(),
            stderr: vec![],
        })
    }
}

#[test]
fn test_parse_lsid() {
    let info = parse_lsid(
        "IBM Spectrum LSF Standard 10.1.0.0, Jul 08 2016
Copyright International Business Machines Corp. 1992, 2016.
US Government Users Restricted Rights - Use, duplication or disclosure restricted by GSA ADP Schedule Contract with IBM Corp.

My cluster name is cluster1
My master name is lsfmaster01
",
    )
    .unwrap();
    assert!(info.family == SchedulerFamily::Lsf);
    assert!(info.tool == "LSF");
    assert!(info.version == "10.1.0.0");
    assert!(info.cluster == "cluster1");
    assert!(info.master == "lsfmaster01");
    assert!(info.dialect() == Some(Dialect::Lsf));

    let info = parse_lsid(
        "openlava project 4.0, Jun 23 2017
My cluster name is openlava
My master name is openlava4-test-cmp1
",
    )
    .unwrap();
    assert!(info.family == SchedulerFamily::Openlava);
    assert!(info.version == "4.0");
    assert!(info.cluster == "openlava");

    let info = parse_lsid("volclava 1.0.1, Jan 1 2024\n").unwrap();
    assert!(info.family == SchedulerFamily::Lsf);
    assert!(info.tool == "volclava");

    let info = parse_lsid("command not found\n").unwrap();
    assert!(info.family == SchedulerFamily::Unknown);
    assert!(info.dialect().is_none());
}

#[test]
fn test_parse_unit_for_limits() {
    let text = "MBD configuration at Mon Oct 26 17:43:07 2020
    LSB_SHAREDIR = /share/lsf/work
    LSF_UNIT_FOR_LIMITS = GB
    LSF_UNIT_FOR_LIMITS = KB
";
    assert!(parse_unit_for_limits(text).unwrap() == MemUnit::GB);
    assert!(parse_unit_for_limits("").unwrap() == MemUnit::MB);
    assert!(parse_unit_for_limits("LSF_UNIT_FOR_LIMITS = PB").unwrap() == MemUnit::MB);
}

#[test]
fn test_probe_detail_parser() {
    let commands = Commands {
        lsid: "lsid".to_string(),
        unit_for_limits: "showconf".to_string(),
        ..Default::default()
    };
    let report = "Job <1>, User <u>, Status <PEND>, Queue <q>, Command <c>
Mon Oct 26 17:43:07: Submitted from host <h>, CWD <$HOME>, Requested Resources <rusage[mem=4096]>;
";

    let runner = CannedRunner {
        lsid: "IBM Spectrum LSF Standard 10.1.0.0, Jul 08 2016\n",
        showconf: Some("LSF_UNIT_FOR_LIMITS = KB\n"),
    };
    let p = probe_detail_parser(&runner, &commands).unwrap();
    assert!(p.dialect() == Dialect::Lsf);
    assert!(p.parse(report)[0].rusage_mem == Some(4.0));

    // No unit setting available: MB.
    let runner = CannedRunner {
        lsid: "IBM Spectrum LSF Standard 10.1.0.0, Jul 08 2016\n",
        showconf: None,
    };
    let p = probe_detail_parser(&runner, &commands).unwrap();
    assert!(p.parse(report)[0].rusage_mem == Some(4096.0));

    let runner = CannedRunner {
        lsid: "openlava project 4.0, Jun 23 2017\n",
        showconf: Some("LSF_UNIT_FOR_LIMITS = KB\n"),
    };
    let p = probe_detail_parser(&runner, &commands).unwrap();
    assert!(p.dialect() == Dialect::Openlava);

    let runner = CannedRunner {
        lsid: "Slurm 23.02\n",
        showconf: None,
    };
    assert!(probe_detail_parser(&runner, &commands).is_err());
}
