/// Routing decisions for the relay
///
/// The router owns the session registry and turns each connection event into
/// the frames that must be written in response. It performs no I/O itself;
/// the coordinator in [`crate::relay`] feeds it one event at a time and
/// writes the resulting deliveries in order.
use crate::registry::{ConnectionId, Registry};
use imrelay_protocol::{validate_name, ClientFrame, ServerFrame};

/// Something that happened on one connection
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum RelayEvent {
    Connected(ConnectionId),
    Frame(ConnectionId, ClientFrame),
    Closed(ConnectionId),
}

/// A frame to be written to one connection
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Delivery {
    pub to: ConnectionId,
    pub frame: ServerFrame,
}

impl Delivery {
    pub fn new(to: ConnectionId, frame: ServerFrame) -> Self {
        Self { to, frame }
    }
}

#[derive(Debug, Default)]
pub struct Router {
    registry: Registry,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Applies one event and returns the frames to write, in write order
    pub fn handle(&mut self, event: RelayEvent) -> Vec<Delivery> {
        match event {
            RelayEvent::Connected(conn) => {
                tracing::debug!(%conn, "connection opened");
                Vec::new()
            }
            RelayEvent::Frame(conn, frame) => self.handle_frame(conn, frame),
            RelayEvent::Closed(conn) => self.close(conn),
        }
    }

    fn handle_frame(&mut self, conn: ConnectionId, frame: ClientFrame) -> Vec<Delivery> {
        let Some(sender) = self.registry.lookup_name(conn).map(String::from) else {
            return match frame {
                ClientFrame::Login(name) => self.login(conn, name),
                other => {
                    tracing::debug!(%conn, code = other.code(), "ignoring frame before login");
                    Vec::new()
                }
            };
        };
        match frame {
            ClientFrame::Login(name) => {
                tracing::debug!(%conn, %sender, attempted = %name, "ignoring repeated login");
                Vec::new()
            }
            ClientFrame::SendPrivateMessage { to, content } => {
                self.private_message(&sender, &to, content)
            }
            ClientFrame::SendGroupMessage(content) => self.group_message(conn, &sender, content),
        }
    }

    fn login(&mut self, conn: ConnectionId, name: String) -> Vec<Delivery> {
        if let Err(e) = validate_name(&name) {
            tracing::info!(%conn, %name, error = %e, "login rejected");
            return vec![Delivery::new(conn, ServerFrame::login_fail())];
        }
        let online = self.registry.names();
        if let Err(e) = self.registry.register(&name, conn) {
            tracing::info!(%conn, %name, error = %e, "login rejected");
            return vec![Delivery::new(conn, ServerFrame::login_fail())];
        }
        tracing::info!(%conn, %name, online = online.len(), "user logged in");

        // the joiner hears about everyone else before anyone hears about it
        let mut deliveries = vec![Delivery::new(conn, ServerFrame::login_ok(online))];
        deliveries.extend(self.broadcast(conn, ServerFrame::UserOnline(name)));
        deliveries
    }

    fn private_message(&self, sender: &str, to: &str, content: String) -> Vec<Delivery> {
        match self.registry.lookup(to) {
            Some(target) => {
                tracing::debug!(from = %sender, %to, "forwarding private message");
                vec![Delivery::new(target, ServerFrame::private(sender, content))]
            }
            None => {
                tracing::debug!(from = %sender, %to, "dropping message for offline user");
                Vec::new()
            }
        }
    }

    fn group_message(&self, conn: ConnectionId, sender: &str, content: String) -> Vec<Delivery> {
        tracing::debug!(from = %sender, "broadcasting group message");
        self.broadcast(conn, ServerFrame::group(sender, content))
    }

    fn close(&mut self, conn: ConnectionId) -> Vec<Delivery> {
        match self.registry.unregister(conn) {
            Some(name) => {
                tracing::info!(%conn, %name, "user went offline");
                self.broadcast(conn, ServerFrame::UserOffline(name))
            }
            None => {
                tracing::debug!(%conn, "unauthenticated connection closed");
                Vec::new()
            }
        }
    }

    // Sends `frame` to every registered session except `except`
    fn broadcast(&self, except: ConnectionId, frame: ServerFrame) -> Vec<Delivery> {
        self.registry
            .sessions()
            .filter(|(conn, _)| *conn != except)
            .map(|(conn, _)| Delivery::new(conn, frame.clone()))
            .collect()
    }
}
