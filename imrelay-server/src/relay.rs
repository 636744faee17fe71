/// TCP front of the relay
///
/// Every accepted socket gets its own task that decodes frames and writes
/// whatever is queued for it. All routing goes through a single coordinator
/// task that owns the [`Router`], so registry changes happen one event at a
/// time no matter how many connections are active.
use crate::{
    registry::ConnectionId,
    router::{Delivery, RelayEvent, Router},
};
use anyhow::Result;
use futures::{SinkExt, StreamExt};
use imrelay_protocol::{ClientFrameCodec, Error, ServerFrame, ServerFrameCodec};
use std::{collections::HashMap, future::Future, net::SocketAddr};
use tokio::{
    net::{TcpListener, TcpStream, ToSocketAddrs},
    sync::mpsc,
};
use tokio_util::codec::{FramedRead, FramedWrite};

type Outbox = mpsc::UnboundedSender<ServerFrame>;

// Messages handled by the coordinator
#[derive(Debug)]
enum Command {
    Open(ConnectionId, Outbox),
    Route(RelayEvent),
    Shutdown,
}

/// A bound relay, ready to accept clients
#[derive(Debug)]
pub struct Relay {
    listener: TcpListener,
}

impl Relay {
    pub async fn bind(addr: impl ToSocketAddrs) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self { listener })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Serves clients until the process ends
    pub async fn run(self) -> Result<()> {
        self.run_until(std::future::pending()).await
    }

    /// Serves clients until `shutdown` resolves, then closes every connection
    pub async fn run_until(self, shutdown: impl Future<Output = ()>) -> Result<()> {
        tracing::info!(addr = ?self.listener.local_addr()?, "relay listening");
        let (commands, inbox) = mpsc::unbounded_channel();
        let coordinator = tokio::spawn(coordinate(inbox));
        let mut next_id = 0;
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        let conn = ConnectionId::new(next_id);
                        next_id += 1;
                        tokio::spawn(handle_client(conn, stream, addr, commands.clone()));
                    }
                    Err(e) => tracing::error!(error = %e, "accept failed"),
                },
            }
        }

        tracing::info!("relay shutting down");
        let _ = commands.send(Command::Shutdown);
        coordinator.await?;
        Ok(())
    }
}

// Single owner of all routing state
async fn coordinate(mut inbox: mpsc::UnboundedReceiver<Command>) {
    let mut router = Router::new();
    let mut outboxes: HashMap<ConnectionId, Outbox> = HashMap::new();

    while let Some(command) = inbox.recv().await {
        let deliveries = match command {
            Command::Open(conn, outbox) => {
                outboxes.insert(conn, outbox);
                router.handle(RelayEvent::Connected(conn))
            }
            Command::Route(RelayEvent::Closed(conn)) => {
                outboxes.remove(&conn);
                router.handle(RelayEvent::Closed(conn))
            }
            Command::Route(event) => router.handle(event),
            Command::Shutdown => {
                // dropping the outboxes ends every connection task
                tracing::info!(sessions = router.registry().len(), "closing all connections");
                break;
            }
        };
        for Delivery { to, frame } in deliveries {
            let delivered = match outboxes.get(&to) {
                Some(outbox) => outbox.send(frame).is_ok(),
                None => false,
            };
            if !delivered {
                tracing::debug!(conn = %to, "dropping frame for closed connection");
            }
        }
    }
}

async fn handle_client(
    conn: ConnectionId,
    stream: TcpStream,
    addr: SocketAddr,
    commands: mpsc::UnboundedSender<Command>,
) {
    tracing::info!(%conn, %addr, "connection accepted");
    let (rx, tx) = tokio::io::split(stream);
    let mut reader = FramedRead::new(rx, ClientFrameCodec::default());
    let mut writer = FramedWrite::new(tx, ServerFrameCodec::default());
    let (outbox, mut outbound) = mpsc::unbounded_channel();
    if commands.send(Command::Open(conn, outbox)).is_err() {
        return;
    }

    loop {
        tokio::select! {
            // Receive frames from the client
            maybe_frame = reader.next() => match maybe_frame {
                Some(Ok(frame)) => {
                    let event = RelayEvent::Frame(conn, frame);
                    if commands.send(Command::Route(event)).is_err() {
                        break;
                    }
                }
                Some(Err(e)) => {
                    tracing::warn!(%conn, error = %e, "read failed");
                    break;
                }
                None => break,
            },

            // Forward routed frames to the client
            maybe_out = outbound.recv() => match maybe_out {
                Some(frame) => match writer.send(frame).await {
                    Ok(()) => {}
                    Err(Error::InvalidFrame) => {
                        tracing::warn!(%conn, "dropping frame that cannot be encoded");
                    }
                    Err(e) => {
                        tracing::warn!(%conn, error = %e, "write failed");
                        break;
                    }
                },
                None => break,
            },
        }
    }

    let _ = commands.send(Command::Route(RelayEvent::Closed(conn)));
    tracing::info!(%conn, %addr, "connection closed");
}
