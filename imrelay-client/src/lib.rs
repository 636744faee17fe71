/// Client side of the imrelay chat protocol
///
/// [`ClientSession`] holds all protocol state for one user and is driven by
/// whatever owns the socket (see [`connection`]). Chat history goes through a
/// [`HistoryStore`].
pub use session::{ClientSession, SessionError, SessionEvent, SessionState};
pub use store::{HistoryStore, MemoryStore, SqliteStore, StoreError};

pub mod connection;
pub mod session;
pub mod store;
