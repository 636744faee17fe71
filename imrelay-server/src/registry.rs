/// Bidirectional registry of authenticated sessions
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// Opaque identifier for one accepted connection
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Reasons a name cannot be bound to a connection
#[derive(Debug, Error, Eq, PartialEq)]
pub enum RegisterError {
    #[error("name {0:?} is already in use")]
    NameTaken(String),

    #[error("{0} is already logged in")]
    AlreadyBound(ConnectionId),
}

/// Maps display names to live connections and back.
///
/// Both directions are only ever changed together through [`register`] and
/// [`unregister`], so they stay exact inverses of each other.
///
/// [`register`]: Registry::register
/// [`unregister`]: Registry::unregister
#[derive(Debug, Default)]
pub struct Registry {
    by_name: HashMap<String, ConnectionId>,
    by_conn: HashMap<ConnectionId, String>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `name` to `conn`. Nothing changes on conflict.
    pub fn register(&mut self, name: &str, conn: ConnectionId) -> Result<(), RegisterError> {
        if self.by_name.contains_key(name) {
            return Err(RegisterError::NameTaken(name.to_string()));
        }
        if self.by_conn.contains_key(&conn) {
            return Err(RegisterError::AlreadyBound(conn));
        }
        self.by_name.insert(name.to_string(), conn);
        self.by_conn.insert(conn, name.to_string());
        Ok(())
    }

    /// Removes whatever name `conn` held, returning it
    pub fn unregister(&mut self, conn: ConnectionId) -> Option<String> {
        let name = self.by_conn.remove(&conn)?;
        self.by_name.remove(&name);
        Some(name)
    }

    pub fn lookup(&self, name: &str) -> Option<ConnectionId> {
        self.by_name.get(name).copied()
    }

    pub fn lookup_name(&self, conn: ConnectionId) -> Option<&str> {
        self.by_conn.get(&conn).map(String::as_str)
    }

    /// Snapshot of every registered name, in no particular order
    pub fn names(&self) -> Vec<String> {
        self.by_name.keys().cloned().collect()
    }

    /// Every registered session as `(connection, name)`
    pub fn sessions(&self) -> impl Iterator<Item = (ConnectionId, &str)> {
        self.by_conn.iter().map(|(conn, name)| (*conn, name.as_str()))
    }

    pub fn len(&self) -> usize {
        self.by_conn.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_conn.is_empty()
    }
}
