/// Chat history persistence
///
/// The session hands every sent and received message to a [`HistoryStore`]
/// and reads it back to seed its caches at login. Storage is best-effort:
/// the session logs store failures and carries on.
use imrelay_protocol::Message;
use std::collections::BTreeSet;
use thiserror::Error;

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("timestamp parse error: {0}")]
    ParseTimestamp(#[from] time::error::Parse),

    #[error("timestamp format error: {0}")]
    FormatTimestamp(#[from] time::error::Format),

    #[error("history store used before init_schema")]
    NotInitialized,
}

/// Per-identity message history
pub trait HistoryStore {
    /// Prepares storage for `own_name`. Safe to call more than once.
    fn init_schema(&mut self, own_name: &str) -> Result<(), StoreError>;

    /// Records a message exchanged with `peer`, in either direction
    fn append_private_message(&mut self, peer: &str, msg: &Message) -> Result<(), StoreError>;

    fn append_group_message(&mut self, msg: &Message) -> Result<(), StoreError>;

    /// Private conversation with `peer`, oldest first
    fn load_private_history(&self, peer: &str) -> Result<Vec<Message>, StoreError>;

    /// Group conversation, oldest first
    fn load_group_history(&self) -> Result<Vec<Message>, StoreError>;

    /// Every name this identity has exchanged messages with
    fn list_known_names(&self) -> Result<BTreeSet<String>, StoreError>;
}
