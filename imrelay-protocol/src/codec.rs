/// Codecs for the imrelay line protocol
use crate::{
    util::{free_text, split_field, ResultExt},
    Error,
};
use std::io::ErrorKind;
use tokio_util::{
    bytes::{BufMut, BytesMut},
    codec::{Decoder, Encoder, LinesCodec, LinesCodecError},
};

// 640k ought to be enough for anyone
const MAX_LENGTH: usize = 1024 * 640;

/// Frames sent from client to relay
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub enum ClientFrame {
    Login(String),
    SendPrivateMessage { to: String, content: String },
    SendGroupMessage(String),
}

impl ClientFrame {
    pub const LOGIN: u8 = 1;
    pub const SEND_PRIVATE_MESSAGE: u8 = 2;
    pub const SEND_GROUP_MESSAGE: u8 = 3;

    pub fn login(name: impl Into<String>) -> Self {
        Self::Login(name.into())
    }

    pub fn private(to: impl Into<String>, content: impl Into<String>) -> Self {
        Self::SendPrivateMessage {
            to: to.into(),
            content: content.into(),
        }
    }

    pub fn group(content: impl Into<String>) -> Self {
        Self::SendGroupMessage(content.into())
    }

    /// Function code identifying this frame on the wire
    pub fn code(&self) -> u8 {
        use ClientFrame::*;
        match self {
            Login(_) => Self::LOGIN,
            SendPrivateMessage { .. } => Self::SEND_PRIVATE_MESSAGE,
            SendGroupMessage(_) => Self::SEND_GROUP_MESSAGE,
        }
    }

    /// Parses one line (without its terminator) into a frame
    pub fn parse(line: &str) -> Result<Self, Error> {
        let (code, rest) = split_code(line)?;
        match code {
            Self::LOGIN => Ok(Self::Login(free_text(rest)?)),
            Self::SEND_PRIVATE_MESSAGE => {
                let (to, content) = split_field(rest.or_invalid_frame()?)?;
                Ok(Self::private(to, content))
            }
            Self::SEND_GROUP_MESSAGE => Ok(Self::SendGroupMessage(free_text(rest)?)),
            other => Err(Error::UnknownFunction(other)),
        }
    }

    /// Renders the frame as one line, without its terminator
    pub fn to_line(&self) -> Result<String, Error> {
        use ClientFrame::*;
        match self {
            Login(name) => render(self.code(), &[name.as_str()]),
            SendPrivateMessage { to, content } => {
                render(self.code(), &[to.as_str(), content.as_str()])
            }
            SendGroupMessage(content) => render(self.code(), &[content.as_str()]),
        }
    }
}

/// Codec for client frames
#[derive(Debug)]
pub struct ClientFrameCodec {
    inner: LinesCodec,
}

impl Default for ClientFrameCodec {
    fn default() -> Self {
        Self {
            inner: LinesCodec::new_with_max_length(MAX_LENGTH),
        }
    }
}

impl Decoder for ClientFrameCodec {
    type Item = ClientFrame;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        decode_frame(src, &mut self.inner, false, ClientFrame::parse)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        decode_frame(src, &mut self.inner, true, ClientFrame::parse)
    }
}

impl Encoder<ClientFrame> for ClientFrameCodec {
    type Error = Error;

    fn encode(&mut self, frame: ClientFrame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        encode_line(&frame.to_line()?, dst);
        Ok(())
    }
}

/// Outcome of a login attempt as reported by the relay
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub enum LoginResult {
    /// Accepted; carries the names of everyone else online at that moment
    Ok(Vec<String>),
    /// Rejected, the name is taken or unusable
    Fail,
}

/// Frames sent from relay to client
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub enum ServerFrame {
    PrivateMessage { from: String, content: String },
    GroupMessage { from: String, content: String },
    UserOnline(String),
    UserOffline(String),
    LoginResult(LoginResult),
}

impl ServerFrame {
    pub const PRIVATE_MESSAGE: u8 = 1;
    pub const GROUP_MESSAGE: u8 = 2;
    pub const USER_ONLINE: u8 = 3;
    pub const USER_OFFLINE: u8 = 4;
    pub const LOGIN_RESULT: u8 = 10;

    pub fn private(from: impl Into<String>, content: impl Into<String>) -> Self {
        Self::PrivateMessage {
            from: from.into(),
            content: content.into(),
        }
    }

    pub fn group(from: impl Into<String>, content: impl Into<String>) -> Self {
        Self::GroupMessage {
            from: from.into(),
            content: content.into(),
        }
    }

    pub fn login_ok<I, S>(online: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::LoginResult(LoginResult::Ok(online.into_iter().map(Into::into).collect()))
    }

    pub fn login_fail() -> Self {
        Self::LoginResult(LoginResult::Fail)
    }

    /// Function code identifying this frame on the wire
    pub fn code(&self) -> u8 {
        match self {
            Self::PrivateMessage { .. } => Self::PRIVATE_MESSAGE,
            Self::GroupMessage { .. } => Self::GROUP_MESSAGE,
            Self::UserOnline(_) => Self::USER_ONLINE,
            Self::UserOffline(_) => Self::USER_OFFLINE,
            Self::LoginResult(_) => Self::LOGIN_RESULT,
        }
    }

    /// Parses one line (without its terminator) into a frame
    pub fn parse(line: &str) -> Result<Self, Error> {
        let (code, rest) = split_code(line)?;
        match code {
            Self::PRIVATE_MESSAGE => {
                let (from, content) = split_field(rest.or_invalid_frame()?)?;
                Ok(Self::private(from, content))
            }
            Self::GROUP_MESSAGE => {
                let (from, content) = split_field(rest.or_invalid_frame()?)?;
                Ok(Self::group(from, content))
            }
            Self::USER_ONLINE => Ok(Self::UserOnline(presence_name(rest)?)),
            Self::USER_OFFLINE => Ok(Self::UserOffline(presence_name(rest)?)),
            Self::LOGIN_RESULT => parse_login_result(rest.or_invalid_frame()?),
            other => Err(Error::UnknownFunction(other)),
        }
    }

    /// Renders the frame as one line, without its terminator
    pub fn to_line(&self) -> Result<String, Error> {
        match self {
            Self::PrivateMessage { from, content } | Self::GroupMessage { from, content } => {
                render(self.code(), &[from.as_str(), content.as_str()])
            }
            Self::UserOnline(name) | Self::UserOffline(name) => {
                render(self.code(), &[name.as_str()])
            }
            Self::LoginResult(LoginResult::Fail) => render(self.code(), &["1"]),
            Self::LoginResult(LoginResult::Ok(names)) => {
                let count = names.len().to_string();
                let mut fields = vec!["0", count.as_str()];
                fields.extend(names.iter().map(String::as_str));
                render(self.code(), &fields)
            }
        }
    }
}

/// Codec for server frames
#[derive(Debug)]
pub struct ServerFrameCodec {
    inner: LinesCodec,
}

impl Default for ServerFrameCodec {
    fn default() -> Self {
        Self {
            inner: LinesCodec::new_with_max_length(MAX_LENGTH),
        }
    }
}

impl Decoder for ServerFrameCodec {
    type Item = ServerFrame;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        decode_frame(src, &mut self.inner, false, ServerFrame::parse)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        decode_frame(src, &mut self.inner, true, ServerFrame::parse)
    }
}

impl Encoder<ServerFrame> for ServerFrameCodec {
    type Error = Error;

    fn encode(&mut self, frame: ServerFrame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        encode_line(&frame.to_line()?, dst);
        Ok(())
    }
}

// `10 1` or `10 0 <count> <name>...`
fn parse_login_result(rest: &str) -> Result<ServerFrame, Error> {
    let mut fields = rest.split(' ');
    match fields.next() {
        Some("1") => Ok(ServerFrame::login_fail()),
        Some("0") => {
            let count: usize = fields.next().or_invalid_frame()?.parse().or_invalid_frame()?;
            let names: Vec<String> = fields.map(String::from).collect();
            if names.len() != count || names.iter().any(String::is_empty) {
                return Err(Error::InvalidFrame);
            }
            Ok(ServerFrame::login_ok(names))
        }
        _ => Err(Error::InvalidFrame),
    }
}

// Name carried by a presence frame: one non-empty token
fn presence_name(rest: Option<&str>) -> Result<String, Error> {
    let name = free_text(rest)?;
    if name.is_empty() || name.contains(' ') {
        return Err(Error::InvalidFrame);
    }
    Ok(name)
}

// Splits the leading function code off a line. The remainder is `None` when
// the line holds nothing but the code.
fn split_code(line: &str) -> Result<(u8, Option<&str>), Error> {
    // `LinesCodec` only strips a trailing `\r`, a stray one can still be inside
    if line.contains(&['\n', '\r'][..]) {
        return Err(Error::InvalidFrame);
    }
    let (code, rest) = match line.split_once(' ') {
        Some((code, rest)) => (code, Some(rest)),
        None => (line, None),
    };
    Ok((code.parse().or_invalid_frame()?, rest))
}

// Common logic for decoding frames. Lines that fail to parse are logged and
// skipped so one bad frame never ends the stream.
fn decode_frame<T>(
    src: &mut BytesMut,
    frame_decoder: &mut LinesCodec,
    eof: bool,
    parse: fn(&str) -> Result<T, Error>,
) -> Result<Option<T>, Error> {
    loop {
        let next = if eof {
            frame_decoder.decode_eof(src)
        } else {
            frame_decoder.decode(src)
        };
        match next {
            Ok(Some(line)) => match parse(&line) {
                Ok(frame) => return Ok(Some(frame)),
                Err(e) => tracing::warn!(error = %e, %line, "discarding malformed frame"),
            },
            Ok(None) => return Ok(None),
            Err(LinesCodecError::MaxLineLengthExceeded) => {
                tracing::warn!(max = MAX_LENGTH, "discarding over-long frame")
            }
            Err(LinesCodecError::Io(e)) if e.kind() == ErrorKind::InvalidData => {
                tracing::warn!(error = %e, "discarding frame that is not utf-8")
            }
            Err(e) => return Err(e.into()),
        }
    }
}

// Common logic for rendering frames. Every field but the last must be a
// single non-empty token; no field may break the line.
fn render(code: u8, fields: &[&str]) -> Result<String, Error> {
    let mut line = code.to_string();
    if let Some((_, leading)) = fields.split_last() {
        if leading.iter().any(|f| f.is_empty() || f.contains(' ')) {
            return Err(Error::InvalidFrame);
        }
    }
    for field in fields {
        if field.contains(&['\n', '\r'][..]) {
            return Err(Error::InvalidFrame);
        }
        line.push(' ');
        line.push_str(field);
    }
    Ok(line)
}

fn encode_line(line: &str, dst: &mut BytesMut) {
    dst.reserve(line.len() + 1);
    dst.put_slice(line.as_bytes());
    dst.put_u8(b'\n');
}

#[cfg(test)]
mod test {
    use super::{ClientFrame, ClientFrameCodec, ServerFrame, ServerFrameCodec};
    use crate::Error;
    use tokio_util::{
        bytes::BytesMut,
        codec::{Decoder, Encoder},
    };

    fn do_encode<T, E>(item: T, mut encoder: E) -> String
    where
        E: Encoder<T>,
        <E as Encoder<T>>::Error: std::fmt::Debug,
    {
        let mut output = BytesMut::new();
        encoder.encode(item, &mut output).unwrap();
        String::from_utf8(output.to_vec()).unwrap()
    }

    fn do_decode<T, D>(bytes: &str, mut decoder: D) -> T
    where
        D: Decoder<Item = T, Error = Error>,
        <D as Decoder>::Error: std::fmt::Debug,
    {
        let mut buffer = BytesMut::from(bytes);
        decoder.decode(&mut buffer).unwrap().unwrap()
    }

    fn decode_all<D: Decoder<Error = Error>>(bytes: &str, mut decoder: D) -> Vec<D::Item> {
        let mut buffer = BytesMut::from(bytes);
        let mut frames = Vec::new();
        while let Some(frame) = decoder.decode(&mut buffer).unwrap() {
            frames.push(frame);
        }
        frames
    }

    #[test]
    fn test_client_codec() {
        #[rustfmt::skip]
        let tests = vec![
            (ClientFrame::login("alice"), "1 alice\n"),
            (ClientFrame::private("bob", "hi there  friend"), "2 bob hi there  friend\n"),
            (ClientFrame::private("bob", " leading"), "2 bob  leading\n"),
            (ClientFrame::group("hello: <all> / *"), "3 hello: <all> / *\n"),
            (ClientFrame::group(""), "3 \n"),
        ];
        for test in tests {
            let (item, bytes) = test;
            let encoded = do_encode(item.clone(), ClientFrameCodec::default());
            assert_eq!(encoded, bytes);
            let decoded = do_decode(bytes, ClientFrameCodec::default());
            assert_eq!(decoded, item);
        }
    }

    #[test]
    fn test_server_codec() {
        #[rustfmt::skip]
        let tests = vec![
            (ServerFrame::private("bob", "hi"), "1 bob hi\n"),
            (ServerFrame::group("alice", "hello everyone"), "2 alice hello everyone\n"),
            (ServerFrame::UserOnline("bob".into()), "3 bob\n"),
            (ServerFrame::UserOffline("alice".into()), "4 alice\n"),
            (ServerFrame::login_fail(), "10 1\n"),
            (ServerFrame::login_ok(Vec::<String>::new()), "10 0 0\n"),
            (ServerFrame::login_ok(["alice", "carol"]), "10 0 2 alice carol\n"),
        ];
        for test in tests {
            let (item, bytes) = test;
            let encoded = do_encode(item.clone(), ServerFrameCodec::default());
            assert_eq!(encoded, bytes);
            let decoded = do_decode(bytes, ServerFrameCodec::default());
            assert_eq!(decoded, item);
        }
    }

    #[test]
    fn test_codes_match_protocol_table() {
        assert_eq!(ClientFrame::login("a").code(), 1);
        assert_eq!(ClientFrame::private("a", "b").code(), 2);
        assert_eq!(ClientFrame::group("b").code(), 3);
        assert_eq!(ServerFrame::private("a", "b").code(), 1);
        assert_eq!(ServerFrame::group("a", "b").code(), 2);
        assert_eq!(ServerFrame::UserOnline("a".into()).code(), 3);
        assert_eq!(ServerFrame::UserOffline("a".into()).code(), 4);
        assert_eq!(ServerFrame::login_fail().code(), 10);
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(ClientFrame::parse("abc"), Err(Error::InvalidFrame)));
        assert!(matches!(ClientFrame::parse(""), Err(Error::InvalidFrame)));
        assert!(matches!(ClientFrame::parse("9 x"), Err(Error::UnknownFunction(9))));
        // fewer fields than the code requires
        assert!(matches!(ClientFrame::parse("1"), Err(Error::InvalidFrame)));
        assert!(matches!(ClientFrame::parse("2 bob"), Err(Error::InvalidFrame)));
        assert!(matches!(ClientFrame::parse("3"), Err(Error::InvalidFrame)));
        assert!(matches!(ServerFrame::parse("10"), Err(Error::InvalidFrame)));
        assert!(matches!(ServerFrame::parse("10 0"), Err(Error::InvalidFrame)));
        assert!(matches!(ServerFrame::parse("10 0 2 alice"), Err(Error::InvalidFrame)));
        assert!(matches!(ServerFrame::parse("10 7"), Err(Error::InvalidFrame)));
        assert!(matches!(ServerFrame::parse("1 bob"), Err(Error::InvalidFrame)));
        // presence frames must name someone
        assert!(matches!(ServerFrame::parse("3 "), Err(Error::InvalidFrame)));
        assert!(matches!(ServerFrame::parse("4 "), Err(Error::InvalidFrame)));
        assert!(matches!(ServerFrame::parse("3 bob smith"), Err(Error::InvalidFrame)));
    }

    #[test]
    fn test_parse_rejects_embedded_carriage_return() {
        assert!(matches!(ClientFrame::parse("3 evil\rtext"), Err(Error::InvalidFrame)));
        assert!(matches!(ClientFrame::parse("2 bob hi\r there"), Err(Error::InvalidFrame)));
        assert!(matches!(ServerFrame::parse("2 bob evil\rtext"), Err(Error::InvalidFrame)));

        // a trailing `\r` is part of the terminator, a stray one is not
        let frames = decode_all("3 evil\rtext\n3 fine\r\n", ClientFrameCodec::default());
        assert_eq!(frames, vec![ClientFrame::group("fine")]);
    }

    #[test]
    fn test_encode_rejects_line_breaks() {
        let mut output = BytesMut::new();
        let result = ClientFrameCodec::default().encode(ClientFrame::group("a\nb"), &mut output);
        assert!(matches!(result, Err(Error::InvalidFrame)));
        let result =
            ClientFrameCodec::default().encode(ClientFrame::private("bo b", "x"), &mut output);
        assert!(matches!(result, Err(Error::InvalidFrame)));
        assert!(output.is_empty());
    }

    #[test]
    fn test_decoder_skips_malformed_frames() {
        let frames = decode_all(
            "1 alice\nnonsense\n42 what\n2 bob\n3 still here\n",
            ClientFrameCodec::default(),
        );
        assert_eq!(
            frames,
            vec![ClientFrame::login("alice"), ClientFrame::group("still here")]
        );
    }

    #[test]
    fn test_decoder_handles_coalesced_and_partial_frames() {
        let mut decoder = ServerFrameCodec::default();
        let mut buffer = BytesMut::from("3 bob\r\n4 ali");
        assert_eq!(
            decoder.decode(&mut buffer).unwrap(),
            Some(ServerFrame::UserOnline("bob".into()))
        );
        assert_eq!(decoder.decode(&mut buffer).unwrap(), None);
        buffer.extend_from_slice(b"ce\n");
        assert_eq!(
            decoder.decode(&mut buffer).unwrap(),
            Some(ServerFrame::UserOffline("alice".into()))
        );
        assert_eq!(decoder.decode(&mut buffer).unwrap(), None);
    }

    #[test]
    fn test_decoder_skips_invalid_utf8() {
        let mut decoder = ClientFrameCodec::default();
        let mut buffer = BytesMut::from(&b"3 \xff\xfe\n3 ok\n"[..]);
        assert_eq!(
            decoder.decode(&mut buffer).unwrap(),
            Some(ClientFrame::group("ok"))
        );
    }
}
