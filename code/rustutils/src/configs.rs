/// Read the sampler configuration.
///
/// The configuration is read once at process start and is immutable afterwards; components receive
/// a shared reference to it.  It comes from an optional JSON file plus the environment.
///
/// File format:
///
/// An object { ... } with the following named fields and value types, all optional:
///
///   db_path - string, the base directory for the databases; shard files live below
///      <db_path>/monitor.  Falls back to $LSFMONITOR_DB_PATH.  One of the two must be set.
///   retention_rows - integer, the maximum number of rows kept per table [10000]
///   stale_seconds - integer, a job table whose newest row is older than this relative to the
///      sample being written is dropped and recreated [3600]
///   job_range_size - integer > 0, how many job ids share one job shard file [100000]
///   commands - object of strings, overriding the report commands; recognized keys are bjobs,
///      bqueues, bhosts, lsload, busers, lsid, unit_for_limits, lmstat
///
/// Any field name starting with '#' is reserved for arbitrary comments.
use anyhow::{bail, Result};
use serde_json::Value;
use std::env;
use std::fs::File;
use std::io::BufReader;
use std::path::{self, PathBuf};

pub const DEFAULT_RETENTION_ROWS: usize = 10000;
pub const DEFAULT_STALE_SECONDS: u64 = 3600;
pub const DEFAULT_JOB_RANGE_SIZE: u64 = 100000;

#[derive(Debug, Clone)]
pub struct Commands {
    pub bjobs: String,
    pub bqueues: String,
    pub bhosts: String,
    pub lsload: String,
    pub busers: String,
    pub lsid: String,
    pub unit_for_limits: String,
    pub lmstat: String,
}

impl Default for Commands {
    fn default() -> Commands {
        Commands {
            bjobs: "bjobs -u all -r -UF".to_string(),
            bqueues: "bqueues -w".to_string(),
            bhosts: "bhosts -w".to_string(),
            lsload: "lsload -l".to_string(),
            busers: "busers all".to_string(),
            lsid: "lsid".to_string(),
            unit_for_limits: "badmin showconf mbd all".to_string(),
            lmstat: "lmstat -a -i".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub db_path: PathBuf,
    pub retention_rows: usize,
    pub stale_seconds: u64,
    pub job_range_size: u64,
    pub commands: Commands,
}

impl MonitorConfig {
    /// A configuration with every default in place.

    pub fn with_db_path(db_path: PathBuf) -> MonitorConfig {
        MonitorConfig {
            db_path,
            retention_rows: DEFAULT_RETENTION_ROWS,
            stale_seconds: DEFAULT_STALE_SECONDS,
            job_range_size: DEFAULT_JOB_RANGE_SIZE,
            commands: Default::default(),
        }
    }

    /// The directory holding every shard file.

    pub fn monitor_dir(&self) -> PathBuf {
        self.db_path.join("monitor")
    }
}

/// The file is human-written, so as with the cluster configs the generic JSON parser is used and
/// the fields are decoded explicitly.

pub fn read_monitor_config(filename: Option<&str>) -> Result<MonitorConfig> {
    let mut db_path = None;
    let mut retention_rows = DEFAULT_RETENTION_ROWS;
    let mut stale_seconds = DEFAULT_STALE_SECONDS;
    let mut job_range_size = DEFAULT_JOB_RANGE_SIZE;
    let mut commands: Commands = Default::default();

    if let Some(filename) = filename {
        let file = match File::open(path::Path::new(filename)) {
            Ok(f) => f,
            Err(e) => bail!("Could not open config file {filename}: {e}"),
        };
        let v = serde_json::from_reader(BufReader::new(file))?;
        if let Value::Object(fields) = v {
            for name in fields.keys() {
                if !name.starts_with('#') && !KNOWN_FIELDS.contains(&name.as_str()) {
                    bail!("Unknown config field '{name}'");
                }
            }
            let p = grab_string_opt(&fields, "db_path")?;
            if p != "" {
                db_path = Some(PathBuf::from(p));
            }
            if let Some(n) = grab_u64_opt(&fields, "retention_rows")? {
                retention_rows = n as usize;
            }
            if let Some(n) = grab_u64_opt(&fields, "stale_seconds")? {
                stale_seconds = n;
            }
            if let Some(n) = grab_u64_opt(&fields, "job_range_size")? {
                if n == 0 {
                    bail!("Field 'job_range_size' must be positive");
                }
                job_range_size = n;
            }
            if let Some(val) = fields.get("commands") {
                if let Value::Object(cmds) = val {
                    grab_command(cmds, "bjobs", &mut commands.bjobs)?;
                    grab_command(cmds, "bqueues", &mut commands.bqueues)?;
                    grab_command(cmds, "bhosts", &mut commands.bhosts)?;
                    grab_command(cmds, "lsload", &mut commands.lsload)?;
                    grab_command(cmds, "busers", &mut commands.busers)?;
                    grab_command(cmds, "lsid", &mut commands.lsid)?;
                    grab_command(cmds, "unit_for_limits", &mut commands.unit_for_limits)?;
                    grab_command(cmds, "lmstat", &mut commands.lmstat)?;
                } else {
                    bail!("Field 'commands' must be an object");
                }
            }
        } else {
            bail!("Expected an object value")
        }
    }

    if db_path.is_none() {
        if let Ok(val) = env::var("LSFMONITOR_DB_PATH") {
            if val != "" {
                db_path = Some(PathBuf::from(val));
            }
        }
    }
    let Some(db_path) = db_path else {
        bail!("No database path: set db_path in the config file or $LSFMONITOR_DB_PATH");
    };

    Ok(MonitorConfig {
        db_path,
        retention_rows,
        stale_seconds,
        job_range_size,
        commands,
    })
}

const KNOWN_FIELDS: [&str; 5] = [
    "db_path",
    "retention_rows",
    "stale_seconds",
    "job_range_size",
    "commands",
];

fn grab_command(fields: &serde_json::Map<String, Value>, name: &str, dest: &mut String) -> Result<()> {
    let s = grab_string_opt(fields, name)?;
    if s != "" {
        *dest = s;
    }
    Ok(())
}

fn grab_string_opt(fields: &serde_json::Map<String, Value>, name: &str) -> Result<String> {
    if let Some(val) = fields.get(name) {
        if let Value::String(s) = val {
            Ok(s.to_string())
        } else {
            bail!("Field '{name}' must have a string value");
        }
    } else {
        Ok("".to_string())
    }
}

fn grab_u64_opt(fields: &serde_json::Map<String, Value>, name: &str) -> Result<Option<u64>> {
    if let Some(val) = fields.get(name) {
        if let Value::Number(n) = val {
            if let Some(n) = n.as_u64() {
                return Ok(Some(n));
            }
        }
        bail!("Field '{name}' must have a nonnegative integer value");
    } else {
        Ok(None)
    }
}

// Basic whitebox test that the reading works.  The fixture lives next to the other test data.

#[test]
fn test_config() {
    let conf = read_monitor_config(Some("../tests/rustutils/whitebox-config.json")).unwrap();
    assert!(conf.db_path == PathBuf::from("/var/lib/lsfmonitor/db"));
    assert!(conf.monitor_dir() == PathBuf::from("/var/lib/lsfmonitor/db/monitor"));
    assert!(conf.retention_rows == 5000);
    assert!(conf.stale_seconds == 3600);
    assert!(conf.job_range_size == 10000);
    assert!(conf.commands.bjobs == "bjobs -u all -r -UF -m cluster1");
    assert!(conf.commands.bqueues == "bqueues -w");
}

#[test]
fn test_config_errors() {
    let dir = tempfile::TempDir::new().unwrap();

    let bad = dir.path().join("bad-range.json");
    std::fs::write(&bad, r#"{"db_path": "/tmp/x", "job_range_size": 0}"#).unwrap();
    assert!(read_monitor_config(Some(bad.to_str().unwrap())).is_err());

    let bad = dir.path().join("bad-type.json");
    std::fs::write(&bad, r#"{"db_path": "/tmp/x", "retention_rows": -5}"#).unwrap();
    assert!(read_monitor_config(Some(bad.to_str().unwrap())).is_err());

    let bad = dir.path().join("bad-field.json");
    std::fs::write(&bad, r#"{"db_path": "/tmp/x", "retention": 5}"#).unwrap();
    assert!(read_monitor_config(Some(bad.to_str().unwrap())).is_err());

    let good = dir.path().join("comment.json");
    std::fs::write(&good, r##"{"#note": "hi", "db_path": "/tmp/x"}"##).unwrap();
    let conf = read_monitor_config(Some(good.to_str().unwrap())).unwrap();
    assert!(conf.retention_rows == DEFAULT_RETENTION_ROWS);
    assert!(conf.job_range_size == DEFAULT_JOB_RANGE_SIZE);

    assert!(read_monitor_config(Some("/no/such/file.json")).is_err());
}
