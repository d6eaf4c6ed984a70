/// Bound the history of a table: once it has more than `cap` rows, the oldest ones by the time key
/// are deleted so that exactly `cap` remain.
use crate::store::quote_ident;

use anyhow::Result;
use log::info;
use rusqlite::{params, Connection};

/// Returns the number of rows deleted.

pub fn trim_table(conn: &Connection, table: &str, key: &str, cap: usize) -> Result<usize> {
    let t = quote_ident(table);
    let count: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {t}"), [], |row| row.get(0))?;
    let excess = count - cap as i64;
    if excess <= 0 {
        return Ok(0);
    }
    let deleted = conn.execute(
        &format!(
            "DELETE FROM {t} WHERE rowid IN (SELECT rowid FROM {t} ORDER BY {} ASC LIMIT ?1)",
            quote_ident(key)
        ),
        params![excess],
    )?;
    info!("Trimmed {deleted} rows from {table}, keeping {cap}");
    Ok(deleted)
}

#[cfg(test)]
fn fill(conn: &Connection, n: usize) {
    conn.execute_batch("CREATE TABLE \"queue_normal\" (\"sampleTime\" TEXT PRIMARY KEY, \"PEND\" TEXT)")
        .unwrap();
    for i in 0..n {
        // Inserted out of time order on purpose: trimming goes by key, not by insertion.
        let t = format!("20240101_{:06}", (i * 7) % n);
        conn.execute(
            "INSERT INTO \"queue_normal\" VALUES (?1, ?2)",
            params![t, i.to_string()],
        )
        .unwrap();
    }
}

#[test]
fn test_trim_table() {
    let conn = Connection::open_in_memory().unwrap();
    fill(&conn, 10);

    assert!(trim_table(&conn, "queue_normal", "sampleTime", 4).unwrap() == 6);
    let keys = conn
        .prepare("SELECT sampleTime FROM queue_normal ORDER BY sampleTime")
        .unwrap()
        .query_map([], |row| row.get::<_, String>(0))
        .unwrap()
        .collect::<rusqlite::Result<Vec<String>>>()
        .unwrap();
    assert!(
        keys == vec![
            "20240101_000006".to_string(),
            "20240101_000007".to_string(),
            "20240101_000008".to_string(),
            "20240101_000009".to_string()
        ]
    );

    // A second trim with nothing new is a no-op.
    assert!(trim_table(&conn, "queue_normal", "sampleTime", 4).unwrap() == 0);
    let n: i64 = conn
        .query_row("SELECT COUNT(*) FROM queue_normal", [], |row| row.get(0))
        .unwrap();
    assert!(n == 4);

    assert!(trim_table(&conn, "queue_normal", "sampleTime", 100).unwrap() == 0);
    assert!(trim_table(&conn, "no_such_table", "sampleTime", 1).is_err());
}
