/// TCP transport to the relay
use imrelay_protocol::{ClientFrameCodec, ServerFrameCodec};
use tokio::{
    io::{ReadHalf, WriteHalf},
    net::TcpStream,
};
use tokio_util::codec::{FramedRead, FramedWrite};

pub type FrameReader = FramedRead<ReadHalf<TcpStream>, ServerFrameCodec>;
pub type FrameWriter = FramedWrite<WriteHalf<TcpStream>, ClientFrameCodec>;

/// Opens a connection to the relay at `host:port`
pub async fn connect(host: &str, port: u16) -> std::io::Result<(FrameReader, FrameWriter)> {
    let stream = TcpStream::connect((host, port)).await?;
    stream.set_nodelay(true)?;
    let (rx, tx) = tokio::io::split(stream);
    let reader = FramedRead::new(rx, ServerFrameCodec::default());
    let writer = FramedWrite::new(tx, ClientFrameCodec::default());
    Ok((reader, writer))
}
