//! Direct writes into an SQLite database.

use std::path::Path;

use rusqlite::{params_from_iter, types::Value, Connection};
use tracing::info;

use crate::emit::Sink;
use crate::error::Result;
use crate::AddressRange;

/// SQLite refuses statements with more bound parameters than this.
const MAX_PARAMS: usize = 32766;
const ROW_PARAMS: usize = 4;

/// Range table in an SQLite database. The connection lives as long as the
/// store and is closed when it is dropped.
pub struct SqliteStore {
    conn: Connection,
    table: String,
}

impl SqliteStore {
    /// Opens (or creates) the database file and makes sure the table exists.
    pub fn open<P: AsRef<Path>>(path: P, table: &str) -> Result<SqliteStore> {
        SqliteStore::with_connection(Connection::open(path)?, table)
    }

    pub fn open_in_memory(table: &str) -> Result<SqliteStore> {
        SqliteStore::with_connection(Connection::open_in_memory()?, table)
    }

    /// `table` must be a plain identifier, see
    /// [`Settings::validate`](crate::Settings::validate).
    pub fn with_connection(conn: Connection, table: &str) -> Result<SqliteStore> {
        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {table} (
                start_ip INTEGER NOT NULL,
                end_ip   INTEGER NOT NULL,
                address1 TEXT NOT NULL,
                address2 TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS {table}_range ON {table} (start_ip, end_ip);",
            table = table
        ))?;

        Ok(SqliteStore {
            conn,
            table: table.to_owned(),
        })
    }

    /// Removes all existing ranges.
    pub fn clear(&mut self) -> Result<()> {
        let removed = self.conn.execute(&format!("DELETE FROM {}", self.table), [])?;
        info!(table = %self.table, removed, "cleared existing data");
        Ok(())
    }

    pub fn count(&self) -> Result<u64> {
        let count: i64 = self
            .conn
            .query_row(&format!("SELECT COUNT(*) FROM {}", self.table), [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Looks up the range containing `addr`.
    pub fn lookup(&self, addr: u32) -> Result<Option<(String, String)>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT address1, address2 FROM {} WHERE start_ip <= ?1 AND end_ip >= ?1 ORDER BY start_ip DESC LIMIT 1",
            self.table
        ))?;
        let mut rows = stmt.query([i64::from(addr)])?;
        match rows.next()? {
            Some(row) => Ok(Some((row.get(0)?, row.get(1)?))),
            None => Ok(None),
        }
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

fn insert_sql(table: &str, rows: usize) -> String {
    let mut sql = format!("INSERT INTO {} (start_ip, end_ip, address1, address2) VALUES ", table);
    for i in 0..rows {
        if i > 0 {
            sql.push_str(", ");
        }
        sql.push_str("(?, ?, ?, ?)");
    }
    sql
}

impl Sink for SqliteStore {
    /// Inserts the batch in one transaction. Any failure rolls the whole
    /// batch back.
    fn write_batch(&mut self, batch: &[AddressRange]) -> Result<()> {
        let tx = self.conn.transaction()?;
        for chunk in batch.chunks(MAX_PARAMS / ROW_PARAMS) {
            let params = chunk.iter().flat_map(|range| {
                [
                    Value::Integer(i64::from(range.start)),
                    Value::Integer(i64::from(range.end)),
                    Value::Text(range.locality.clone()),
                    Value::Text(range.provider.clone()),
                ]
            });
            let mut stmt = tx.prepare_cached(&insert_sql(&self.table, chunk.len()))?;
            stmt.execute(params_from_iter(params))?;
        }
        tx.commit()?;
        Ok(())
    }
}
