/// Protocol definitions for the imrelay chat relay
///
/// Every frame is a single line of UTF-8 text:
///
/// ```ignore
/// <function code> [<field> ...] [<free text>]
/// ```
///
/// Fields are separated by a single space. The last field of a frame is free
/// text and runs to the end of the line, so it may itself contain spaces.
/// Client and relay use separate function code tables, see [`ClientFrame`]
/// and [`ServerFrame`].
use thiserror::Error;

mod codec;
mod model;
mod util;

pub use codec::{ClientFrame, ClientFrameCodec, LoginResult, ServerFrame, ServerFrameCodec};
pub use model::{
    validate_content, validate_name, Channel, Message, MAX_CONTENT_CHARS, RELAY_PORT,
};

#[derive(Debug, Error)]
pub enum Error {
    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("lines parse error: {0}")]
    LinesParseError(#[from] tokio_util::codec::LinesCodecError),

    #[error("invalid frame")]
    InvalidFrame,

    #[error("unknown function code {0}")]
    UnknownFunction(u8),

    #[error("display name is empty")]
    EmptyName,

    #[error("display name contains illegal character {0:?}")]
    IllegalNameChar(char),

    #[error("message content is empty")]
    EmptyContent,

    #[error("message content is longer than {MAX_CONTENT_CHARS} characters")]
    ContentTooLong,
}
