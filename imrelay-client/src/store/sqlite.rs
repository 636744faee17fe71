use super::{HistoryStore, StoreError};
use imrelay_protocol::{Channel, Message};
use rusqlite::{params, Connection};
use std::{
    collections::BTreeSet,
    path::{Path, PathBuf},
};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS user (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE
);

-- channel: 'p' private (peer_id is the other party), 'g' group (peer_id is the sender)
CREATE TABLE IF NOT EXISTS message (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    peer_id INTEGER NOT NULL REFERENCES user(id) ON DELETE CASCADE,
    sender TEXT NOT NULL,
    content TEXT NOT NULL,
    sent_at TEXT NOT NULL,
    channel TEXT NOT NULL CHECK (channel IN ('p', 'g'))
);
";

#[derive(Debug)]
enum Location {
    Directory(PathBuf),
    Memory,
}

/// History in a SQLite database, one database per identity
#[derive(Debug)]
pub struct SqliteStore {
    location: Location,
    owner: Option<String>,
    conn: Option<Connection>,
}

impl SqliteStore {
    /// Stores history as `msgsave_<name>.db` files under `dir`
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            location: Location::Directory(dir.into()),
            owner: None,
            conn: None,
        }
    }

    /// Keeps history in a private in-memory database
    pub fn in_memory() -> Self {
        Self {
            location: Location::Memory,
            owner: None,
            conn: None,
        }
    }

    /// Database file used for `name` under `dir`
    pub fn path_for(dir: &Path, name: &str) -> PathBuf {
        dir.join(format!("msgsave_{name}.db"))
    }

    fn conn(&self) -> Result<&Connection, StoreError> {
        self.conn.as_ref().ok_or(StoreError::NotInitialized)
    }

    fn append(&self, peer: &str, msg: &Message, channel: &str) -> Result<(), StoreError> {
        let conn = self.conn()?;
        let peer_id = user_id(conn, peer)?;
        conn.execute(
            "INSERT INTO message (peer_id, sender, content, sent_at, channel)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                peer_id,
                msg.sender,
                msg.content,
                msg.timestamp.format(&Rfc3339)?,
                channel
            ],
        )?;
        Ok(())
    }
}

impl HistoryStore for SqliteStore {
    fn init_schema(&mut self, own_name: &str) -> Result<(), StoreError> {
        if self.conn.is_none() || self.owner.as_deref() != Some(own_name) {
            let conn = match &self.location {
                Location::Directory(dir) => Connection::open(Self::path_for(dir, own_name))?,
                Location::Memory => Connection::open_in_memory()?,
            };
            self.conn = Some(conn);
            self.owner = Some(own_name.to_string());
        }
        let conn = self.conn()?;
        conn.execute_batch(SCHEMA_SQL)?;
        user_id(conn, own_name)?;
        tracing::debug!(name = %own_name, "history store ready");
        Ok(())
    }

    fn append_private_message(&mut self, peer: &str, msg: &Message) -> Result<(), StoreError> {
        self.append(peer, msg, "p")
    }

    fn append_group_message(&mut self, msg: &Message) -> Result<(), StoreError> {
        self.append(&msg.sender, msg, "g")
    }

    fn load_private_history(&self, peer: &str) -> Result<Vec<Message>, StoreError> {
        let mut stmt = self.conn()?.prepare(
            "SELECT m.sender, m.content, m.sent_at FROM message m
             JOIN user u ON u.id = m.peer_id
             WHERE u.name = ?1 AND m.channel = 'p'
             ORDER BY m.id",
        )?;
        let rows = stmt.query_map([peer], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;
        let messages = rows
            .map(|row| to_message(row?, Channel::Private(peer.to_string())))
            .collect::<Result<Vec<_>, StoreError>>()?;
        Ok(messages)
    }

    fn load_group_history(&self) -> Result<Vec<Message>, StoreError> {
        let mut stmt = self.conn()?.prepare(
            "SELECT sender, content, sent_at FROM message WHERE channel = 'g' ORDER BY id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;
        let messages = rows
            .map(|row| to_message(row?, Channel::Group))
            .collect::<Result<Vec<_>, StoreError>>()?;
        Ok(messages)
    }

    fn list_known_names(&self) -> Result<BTreeSet<String>, StoreError> {
        let mut stmt = self.conn()?.prepare("SELECT name FROM user")?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<BTreeSet<_>, _>>()?;
        Ok(names)
    }
}

// Looks up the row id for `name`, creating the user on first sight
fn user_id(conn: &Connection, name: &str) -> rusqlite::Result<i64> {
    conn.execute("INSERT OR IGNORE INTO user (name) VALUES (?1)", [name])?;
    conn.query_row("SELECT id FROM user WHERE name = ?1", [name], |row| {
        row.get(0)
    })
}

fn to_message(
    (sender, content, sent_at): (String, String, String),
    channel: Channel,
) -> Result<Message, StoreError> {
    let timestamp = OffsetDateTime::parse(&sent_at, &Rfc3339)?;
    Ok(Message::new(sender, content, timestamp, channel))
}
