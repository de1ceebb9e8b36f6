use anyhow::{anyhow, Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use stake_execution::{Key, Prefix, State, Status, Value};
use std::path::Path;

/// Entity store on a SQLite database.
///
/// Every record is one row of `entities(kind, scope, id, value)` holding the
/// entity as JSON. A change set is applied in a single transaction.
pub struct SqliteState {
    conn: Connection,
}

impl SqliteState {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("open entity store {}", path.display()))?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory().context("open in-memory entity store")?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "PRAGMA journal_mode=WAL;
             PRAGMA synchronous=NORMAL;
             CREATE TABLE IF NOT EXISTS entities (
                 kind TEXT NOT NULL,
                 scope TEXT NOT NULL,
                 id TEXT NOT NULL,
                 value TEXT NOT NULL,
                 PRIMARY KEY (kind, scope, id)
             );",
        )
        .context("init entity store schema")?;
        Ok(Self { conn })
    }

    pub fn count(&self) -> Result<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM entities", [], |row| row.get(0))
            .context("count entities")?;
        Ok(count as u64)
    }
}

fn encode(value: &Value) -> Result<String> {
    let json = match value {
        Value::Bet(bet) => serde_json::to_string(bet),
        Value::Participant(participant) => serde_json::to_string(participant),
        Value::Stake(stake) => serde_json::to_string(stake),
    };
    json.context("encode entity")
}

fn decode(key: &Key, json: &str) -> Result<Value> {
    let value = match key {
        Key::Bet(_) => Value::Bet(serde_json::from_str(json)?),
        Key::Participant { .. } => Value::Participant(serde_json::from_str(json)?),
        Key::Stake { .. } => Value::Stake(serde_json::from_str(json)?),
    };
    Ok(value)
}

fn upsert(conn: &Connection, key: &Key, value: &Value) -> Result<()> {
    let (kind, scope, id) = key.columns();
    conn.execute(
        "INSERT INTO entities (kind, scope, id, value) VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT (kind, scope, id) DO UPDATE SET value = excluded.value",
        params![kind, scope, id, encode(value)?],
    )
    .with_context(|| format!("write {key:?}"))?;
    Ok(())
}

fn remove(conn: &Connection, key: &Key) -> Result<()> {
    let (kind, scope, id) = key.columns();
    conn.execute(
        "DELETE FROM entities WHERE kind = ?1 AND scope = ?2 AND id = ?3",
        params![kind, scope, id],
    )
    .with_context(|| format!("delete {key:?}"))?;
    Ok(())
}

impl State for SqliteState {
    fn get(&self, key: &Key) -> Result<Option<Value>> {
        let (kind, scope, id) = key.columns();
        let json: Option<String> = self
            .conn
            .query_row(
                "SELECT value FROM entities WHERE kind = ?1 AND scope = ?2 AND id = ?3",
                params![kind, scope, id],
                |row| row.get(0),
            )
            .optional()
            .with_context(|| format!("read {key:?}"))?;
        json.map(|json| decode(key, &json).with_context(|| format!("decode {key:?}")))
            .transpose()
    }

    fn insert(&mut self, key: Key, value: Value) -> Result<()> {
        upsert(&self.conn, &key, &value)
    }

    fn delete(&mut self, key: &Key) -> Result<()> {
        remove(&self.conn, key)
    }

    fn scan(&self, prefix: &Prefix) -> Result<Vec<(Key, Value)>> {
        let (kind, scope) = prefix.columns();
        let mut stmt = self.conn.prepare(
            "SELECT kind, scope, id, value FROM entities
             WHERE kind = ?1 AND (?2 IS NULL OR scope = ?2)
             ORDER BY scope, id",
        )?;
        let rows = stmt.query_map(params![kind, scope], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?;

        let mut records = Vec::new();
        for row in rows {
            let (kind, scope, id, json) = row.context("scan entities")?;
            let key = Key::from_columns(&kind, &scope, &id)
                .ok_or_else(|| anyhow!("unknown entity kind {kind}"))?;
            let value = decode(&key, &json).with_context(|| format!("decode {key:?}"))?;
            records.push((key, value));
        }
        Ok(records)
    }

    fn apply(&mut self, changes: Vec<(Key, Status)>) -> Result<()> {
        let tx = self.conn.transaction().context("begin commit")?;
        for (key, status) in &changes {
            match status {
                Status::Update(value) => upsert(&tx, key, value)?,
                Status::Delete => remove(&tx, key)?,
            }
        }
        tx.commit().context("commit changes")?;
        Ok(())
    }
}
