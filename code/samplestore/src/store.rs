/// The partitioned sample store.
///
/// Samples live in sqlite files ("shards") below `<db_path>/monitor`: one file per resource kind
/// for queues, hosts, load and users, and one file per job id range for jobs.  Within a shard,
/// every entity has its own table named `<kind>_<id>`, whose first column is the time key
/// (`sampleTime`) and whose other columns are the kind's metrics.  Everything is stored as text;
/// readers parse numbers themselves.
///
/// A write pass over a shard takes the shard lock, applies all its rows in one transaction (create
/// missing tables, recreate stale ones, insert, trim) and commits.  Readers thus never see half a
/// pass.  If the lock is taken, the pass skips the shard.
use crate::lock::ShardLock;
use crate::retention::trim_table;

use anyhow::{bail, Result};
use chrono::Duration;
use log::{debug, warn};
use rusqlite::types::ValueRef;
use rusqlite::{params_from_iter, Connection, OpenFlags, OptionalExtension};
use rustutils::{parse_sample_time, Table};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

/// One sample for one entity: the table it goes into and its values, in column order.

#[derive(Debug, Clone, PartialEq)]
pub struct SampleRow {
    pub table: String,
    pub values: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct WritePolicy {
    /// Keep at most this many rows per table.
    pub retention_rows: usize,

    /// Recreate a table whose newest row is older than this relative to the row being written.
    /// None for kinds whose ids are never reused.
    pub stale_after: Option<Duration>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    Written {
        tables: usize,
        recreated: usize,
        trimmed: usize,
    },

    /// Somebody else is writing the shard; nothing was done.
    Locked,
}

/// Write a batch of rows into one shard.  `columns` is the schema of every table touched, the first
/// column being the time key.  A write of a single row to a single table is just a batch of one.

pub fn write_shard(
    path: &Path,
    columns: &[&str],
    rows: &[SampleRow],
    policy: &WritePolicy,
) -> Result<WriteOutcome> {
    if columns.is_empty() {
        bail!("No columns for {}", path.display());
    }
    if let Some(dir) = path.parent() {
        if let Err(e) = fs::create_dir_all(dir) {
            bail!("Could not create {}: {e}", dir.display());
        }
    }
    let Some(_lock) = ShardLock::try_lock(path)? else {
        warn!("{} is being written by somebody else, skipping it", path.display());
        return Ok(WriteOutcome::Locked);
    };

    let mut conn = Connection::open(path)?;
    let tx = conn.transaction()?;
    let mut tables = table_names(&tx)?.into_iter().collect::<HashSet<String>>();
    let mut touched: Vec<&str> = vec![];
    let mut seen: HashSet<&str> = HashSet::new();
    let mut recreated = 0;

    for row in rows {
        if row.values.len() != columns.len() {
            warn!(
                "Row for {} has {} values, expected {}, dropping it",
                row.table,
                row.values.len(),
                columns.len()
            );
            continue;
        }
        if tables.contains(&row.table) {
            if let Some(stale_after) = policy.stale_after {
                if is_stale(&tx, &row.table, columns[0], &row.values[0], stale_after)? {
                    warn!(
                        "Table {} in {} has not been written for more than {}s, recreating it",
                        row.table,
                        path.display(),
                        stale_after.num_seconds()
                    );
                    tx.execute_batch(&format!("DROP TABLE IF EXISTS {}", quote_ident(&row.table)))?;
                    tables.remove(&row.table);
                    recreated += 1;
                }
            }
        }
        if !tables.contains(&row.table) {
            create_table(&tx, &row.table, columns)?;
            tables.insert(row.table.clone());
        }
        insert_row(&tx, &row.table, &row.values)?;
        if seen.insert(&row.table) {
            touched.push(&row.table);
        }
    }

    let mut trimmed = 0;
    for table in &touched {
        trimmed += trim_table(&tx, table, columns[0], policy.retention_rows)?;
    }
    tx.commit()?;
    debug!(
        "Wrote {} rows into {} tables of {}",
        rows.len(),
        touched.len(),
        path.display()
    );

    Ok(WriteOutcome::Written {
        tables: touched.len(),
        recreated,
        trimmed,
    })
}

/// Read some columns of a table, in insertion order, at most `limit` rows (0 for all).  No columns
/// means all columns.  A missing or unreadable shard, or a missing table, yields an empty table and
/// a warning; asking for a column the table does not have is an error.

pub fn read_table(path: &Path, table: &str, columns: &[&str], limit: usize) -> Result<Table> {
    let requested = columns.iter().map(|c| c.to_string()).collect::<Vec<String>>();
    if !path.exists() {
        warn!("No database {}", path.display());
        return Ok(Table::new(requested));
    }
    let conn = match open_read_only(path) {
        Ok(c) => c,
        Err(e) => {
            warn!("{e}");
            return Ok(Table::new(requested));
        }
    };
    let have = match table_columns(&conn, table) {
        Ok(h) => h,
        Err(e) => {
            warn!("Could not read {}: {e}", path.display());
            return Ok(Table::new(requested));
        }
    };
    if have.is_empty() {
        warn!("No table {table} in {}", path.display());
        return Ok(Table::new(requested));
    }
    let wanted = if requested.is_empty() { have.clone() } else { requested };
    for c in &wanted {
        if !have.contains(c) {
            bail!("Table {table} in {} has no column '{c}'", path.display());
        }
    }

    let mut sql = format!(
        "SELECT {} FROM {} ORDER BY rowid",
        wanted
            .iter()
            .map(|c| quote_ident(c))
            .collect::<Vec<String>>()
            .join(", "),
        quote_ident(table)
    );
    if limit > 0 {
        sql += &format!(" LIMIT {limit}");
    }

    let mut result = Table::new(wanted);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let mut values = vec![];
        for i in 0..result.columns().len() {
            values.push(value_text(row.get_ref(i)?));
        }
        result.push_row(values);
    }
    Ok(result)
}

/// The tables of a shard, sorted by name.  A missing or unreadable shard has no tables.

pub fn list_tables(path: &Path) -> Result<Vec<String>> {
    if !path.exists() {
        warn!("No database {}", path.display());
        return Ok(vec![]);
    }
    let names = open_read_only(path).and_then(|conn| table_names(&conn));
    match names {
        Ok(names) => Ok(names),
        Err(e) => {
            warn!("Could not read {}: {e}", path.display());
            Ok(vec![])
        }
    }
}

/// The column names of a table, empty if there is no such table.

pub fn table_columns(conn: &Connection, table: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", quote_ident(table)))?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<rusqlite::Result<Vec<String>>>()?;
    Ok(names)
}

pub fn open_read_only(path: &Path) -> Result<Connection> {
    match Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY) {
        Ok(c) => Ok(c),
        Err(e) => bail!("Could not open {}: {e}", path.display()),
    }
}

pub(crate) fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn table_names(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt =
        conn.prepare("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<rusqlite::Result<Vec<String>>>()?;
    Ok(names)
}

fn create_table(conn: &Connection, table: &str, columns: &[&str]) -> Result<()> {
    let mut defs = vec![format!("{} VARCHAR(255) PRIMARY KEY", quote_ident(columns[0]))];
    for c in &columns[1..] {
        defs.push(format!("{} VARCHAR(255)", quote_ident(c)));
    }
    conn.execute_batch(&format!(
        "CREATE TABLE IF NOT EXISTS {} ({})",
        quote_ident(table),
        defs.join(", ")
    ))?;
    Ok(())
}

// Two passes in the same second have the same key; the later one wins.

fn insert_row(conn: &Connection, table: &str, values: &[String]) -> Result<()> {
    let slots = (1..=values.len())
        .map(|i| format!("?{i}"))
        .collect::<Vec<String>>()
        .join(", ");
    conn.execute(
        &format!("INSERT OR REPLACE INTO {} VALUES ({slots})", quote_ident(table)),
        params_from_iter(values.iter()),
    )?;
    Ok(())
}

fn is_stale(
    conn: &Connection,
    table: &str,
    key: &str,
    new_key: &str,
    stale_after: Duration,
) -> Result<bool> {
    let newest: Option<String> = conn
        .query_row(
            &format!(
                "SELECT {k} FROM {t} ORDER BY {k} DESC LIMIT 1",
                k = quote_ident(key),
                t = quote_ident(table)
            ),
            [],
            |row| row.get(0),
        )
        .optional()?;
    let Some(newest) = newest else {
        return Ok(false);
    };
    match (parse_sample_time(&newest), parse_sample_time(new_key)) {
        (Ok(then), Ok(now)) => Ok(now - then > stale_after),
        _ => {
            warn!("Can't compare times '{newest}' and '{new_key}' in {table}");
            Ok(false)
        }
    }
}

fn value_text(v: ValueRef) -> String {
    match v {
        ValueRef::Null => "".to_string(),
        ValueRef::Integer(i) => i.to_string(),
        ValueRef::Real(f) => f.to_string(),
        ValueRef::Text(t) | ValueRef::Blob(t) => String::from_utf8_lossy(t).into_owned(),
    }
}

#[cfg(test)]
fn row(table: &str, values: &[&str]) -> SampleRow {
    SampleRow {
        table: table.to_string(),
        values: values.iter().map(|v| v.to_string()).collect::<Vec<String>>(),
    }
}

#[cfg(test)]
fn job_policy() -> WritePolicy {
    WritePolicy {
        retention_rows: 10000,
        stale_after: Some(Duration::seconds(3600)),
    }
}

#[test]
fn test_round_trip() {
    let dir = tempfile::TempDir::new().unwrap();
    let shard = dir.path().join("monitor/job/0_99999.db");
    let outcome = write_shard(
        &shard,
        &["sampleTime", "mem"],
        &[row("job_101", &["20240101_000000", "2048"])],
        &job_policy(),
    )
    .unwrap();
    assert!(
        outcome
            == WriteOutcome::Written {
                tables: 1,
                recreated: 0,
                trimmed: 0
            }
    );
    // The lock is gone once the pass is over.
    assert!(!crate::lock::lock_path(&shard).exists());

    let t = read_table(&shard, "job_101", &["sampleTime", "mem"], 0).unwrap();
    assert!(t.len() == 1);
    assert!(t.rows()[0] == vec!["20240101_000000".to_string(), "2048".to_string()]);

    assert!(list_tables(&shard).unwrap() == vec!["job_101".to_string()]);
}

#[test]
fn test_stale_table_is_recreated() {
    let dir = tempfile::TempDir::new().unwrap();
    let shard = dir.path().join("0_99999.db");
    let cols = ["sampleTime", "mem"];
    let policy = job_policy();

    write_shard(&shard, &cols, &[row("job_7", &["20240101_000000", "1"])], &policy).unwrap();
    write_shard(&shard, &cols, &[row("job_7", &["20240101_003000", "2"])], &policy).unwrap();
    assert!(read_table(&shard, "job_7", &cols, 0).unwrap().len() == 2);

    // More than an hour after the newest row: a different job with a reused id.
    let outcome =
        write_shard(&shard, &cols, &[row("job_7", &["20240101_013001", "3"])], &policy).unwrap();
    assert!(
        outcome
            == WriteOutcome::Written {
                tables: 1,
                recreated: 1,
                trimmed: 0
            }
    );
    let t = read_table(&shard, "job_7", &cols, 0).unwrap();
    assert!(t.len() == 1);
    assert!(t.get(0, "mem") == Some("3"));

    // Without a staleness policy history just continues.
    let policy = WritePolicy {
        retention_rows: 10000,
        stale_after: None,
    };
    write_shard(&shard, &cols, &[row("job_7", &["20240301_000000", "4"])], &policy).unwrap();
    assert!(read_table(&shard, "job_7", &cols, 0).unwrap().len() == 2);
}

#[test]
fn test_retention_on_write() {
    let dir = tempfile::TempDir::new().unwrap();
    let shard = dir.path().join("queue.db");
    let cols = ["sampleTime", "NJOBS", "PEND", "RUN", "SUSP"];
    let policy = WritePolicy {
        retention_rows: 3,
        stale_after: None,
    };
    for i in 0..5 {
        let t = format!("20240101_00000{i}");
        write_shard(
            &shard,
            &cols,
            &[
                row("queue_normal", &[t.as_str(), "1", "0", "1", "0"]),
                row("queue_ALL", &[t.as_str(), "1", "0", "1", "0"]),
            ],
            &policy,
        )
        .unwrap();
    }
    let t = read_table(&shard, "queue_normal", &["sampleTime"], 0).unwrap();
    assert!(
        t.column("sampleTime")
            == Some(vec![
                "20240101_000002",
                "20240101_000003",
                "20240101_000004"
            ])
    );
    assert!(read_table(&shard, "queue_ALL", &[], 0).unwrap().len() == 3);
}

#[test]
fn test_locked_shard_is_skipped() {
    let dir = tempfile::TempDir::new().unwrap();
    let shard = dir.path().join("host.db");
    let _other = ShardLock::try_lock(&shard).unwrap().unwrap();
    let outcome = write_shard(
        &shard,
        &["sampleTime", "NJOBS"],
        &[row("host_a", &["20240101_000000", "1"])],
        &job_policy(),
    )
    .unwrap();
    assert!(outcome == WriteOutcome::Locked);
    assert!(!shard.exists());
}

#[test]
fn test_read_edge_cases() {
    let dir = tempfile::TempDir::new().unwrap();
    let shard = dir.path().join("user.db");

    // Missing file: empty, not an error.
    let t = read_table(&shard, "user_x", &["sampleTime"], 0).unwrap();
    assert!(t.is_empty());
    assert!(list_tables(&shard).unwrap().is_empty());

    let cols = ["sampleTime", "NJOBS"];
    let policy = WritePolicy {
        retention_rows: 100,
        stale_after: None,
    };
    for i in 0..5 {
        let t = format!("20240101_00000{i}");
        let n = i.to_string();
        write_shard(&shard, &cols, &[row("user_a\"b", &[t.as_str(), n.as_str()])], &policy)
            .unwrap();
    }

    let t = read_table(&shard, "user_a\"b", &["NJOBS"], 2).unwrap();
    assert!(t.column("NJOBS") == Some(vec!["0", "1"]));
    let t = read_table(&shard, "user_a\"b", &[], 0).unwrap();
    assert!(t.columns() == &["sampleTime".to_string(), "NJOBS".to_string()]);
    assert!(t.len() == 5);

    assert!(read_table(&shard, "user_a\"b", &["sampleTime", "PEND"], 0).is_err());
    assert!(read_table(&shard, "user_nobody", &["sampleTime"], 0).unwrap().is_empty());

    // Malformed rows are dropped, the rest of the batch goes in.
    let outcome = write_shard(
        &shard,
        &cols,
        &[
            row("user_c", &["20240101_000000"]),
            row("user_d", &["20240101_000000", "1"]),
        ],
        &policy,
    )
    .unwrap();
    assert!(
        outcome
            == WriteOutcome::Written {
                tables: 1,
                recreated: 0,
                trimmed: 0
            }
    );
    assert!(list_tables(&shard).unwrap() == vec!["user_a\"b".to_string(), "user_d".to_string()]);
}

#[test]
fn test_read_unreadable_shard() {
    let dir = tempfile::TempDir::new().unwrap();
    let shard = dir.path().join("load.db");
    fs::write(&shard, "not an sqlite file\n".repeat(200)).unwrap();

    let t = read_table(&shard, "load_cmp01", &["sampleTime", "ut"], 0).unwrap();
    assert!(t.is_empty());
    assert!(t.columns() == &["sampleTime".to_string(), "ut".to_string()]);
    assert!(read_table(&shard, "load_cmp01", &[], 0).unwrap().columns().is_empty());
    assert!(list_tables(&shard).unwrap().is_empty());
}

#[test]
fn test_orphaned_lock_does_not_block_writes() {
    let dir = tempfile::TempDir::new().unwrap();
    let shard = dir.path().join("queue.db");
    fs::write(crate::lock::lock_path(&shard), "999999\n").unwrap();

    let policy = WritePolicy {
        retention_rows: 100,
        stale_after: None,
    };
    for t in ["20240101_000000", "20240101_000500"] {
        let outcome = write_shard(
            &shard,
            &["sampleTime", "PEND"],
            &[row("queue_normal", &[t, "0"])],
            &policy,
        )
        .unwrap();
        assert!(outcome != WriteOutcome::Locked);
    }
    assert!(read_table(&shard, "queue_normal", &[], 0).unwrap().len() == 2);
}
