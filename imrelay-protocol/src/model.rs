/// Model definitions shared by the relay and its clients
use crate::Error;
use time::OffsetDateTime;

/// TCP port the relay listens on
pub const RELAY_PORT: u16 = 9876;

/// Longest message a client will send in one go, in characters
pub const MAX_CONTENT_CHARS: usize = 255;

// Characters that may never appear in a display name, besides whitespace
const ILLEGAL_NAME_CHARS: [char; 8] = [':', '"', '/', '*', '|', '?', '<', '>'];

/// Checks that `name` is usable as a display name.
///
/// A display name is non-empty, contains no whitespace and none of
/// `: " / * | ? < >`.
pub fn validate_name(name: &str) -> Result<(), Error> {
    if name.is_empty() {
        return Err(Error::EmptyName);
    }
    match name
        .chars()
        .find(|c| c.is_whitespace() || ILLEGAL_NAME_CHARS.contains(c))
    {
        Some(c) => Err(Error::IllegalNameChar(c)),
        None => Ok(()),
    }
}

/// Checks that `content` can be sent as a single message.
pub fn validate_content(content: &str) -> Result<(), Error> {
    if content.is_empty() {
        return Err(Error::EmptyContent);
    }
    if content.contains(&['\n', '\r'][..]) {
        return Err(Error::InvalidFrame);
    }
    if content.chars().count() > MAX_CONTENT_CHARS {
        return Err(Error::ContentTooLong);
    }
    Ok(())
}

/// Where a message was exchanged
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub enum Channel {
    /// One-to-one conversation with the named peer
    Private(String),
    /// Broadcast to everyone online
    Group,
}

/// A chat message as seen by a client
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Message {
    pub sender: String,
    pub content: String,
    pub timestamp: OffsetDateTime,
    pub channel: Channel,
}

impl Message {
    pub fn new(
        sender: impl Into<String>,
        content: impl Into<String>,
        timestamp: OffsetDateTime,
        channel: Channel,
    ) -> Self {
        Self {
            sender: sender.into(),
            content: content.into(),
            timestamp,
            channel,
        }
    }

    /// Creates a message stamped with the current time
    pub fn now(sender: impl Into<String>, content: impl Into<String>, channel: Channel) -> Self {
        Self::new(sender, content, OffsetDateTime::now_utc(), channel)
    }
}
