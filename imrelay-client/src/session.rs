/// Client side of a relay session
///
/// [`ClientSession`] tracks the connection lifecycle, who is online and the
/// cached chat history. It does no I/O: commands return the frame the caller
/// must write, and whatever the transport reports is fed back in through
/// [`ClientSession::handle_frame`] and the `on_*` methods, which return the
/// events to show the user.
///
/// ```text
/// Idle ──connect──▶ Connecting ──on_connected──▶ Connected ──login──▶ Authenticating
///  ▲                    │                           │  ▲                 │
///  │                    └──on_transport_error──▶ Error  └──LoginResult(fail)┤
///  └────────connect─────────────────────────────────┘                    │
///                                                   LoginResult(ok) ─▶ Authenticated
///
/// any state ──on_disconnected──▶ Closed
/// ```
use crate::store::HistoryStore;
use imrelay_protocol::{
    validate_content, validate_name, Channel, ClientFrame, LoginResult, Message, ServerFrame,
};
use std::collections::{BTreeSet, HashMap};
use thiserror::Error;

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SessionState {
    Idle,
    Connecting,
    Connected,
    Authenticating,
    Authenticated,
    /// Connecting failed or the socket broke before login
    Error(String),
    /// The relay went away; the session cannot be used again
    Closed,
}

/// Things the user should hear about
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SessionEvent {
    Connected,
    ConnectError(String),
    LoginResult(bool),
    MessageReceived(Message),
    PresenceChanged { name: String, online: bool },
    RelayClosed,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("cannot {action} while {state:?}")]
    InvalidState {
        action: &'static str,
        state: SessionState,
    },

    #[error(transparent)]
    Protocol(#[from] imrelay_protocol::Error),
}

#[derive(Debug)]
pub struct ClientSession<S> {
    state: SessionState,
    name: Option<String>,
    online: BTreeSet<String>,
    offline: BTreeSet<String>,
    private_history: HashMap<String, Vec<Message>>,
    group_history: Vec<Message>,
    store: S,
}

impl<S: HistoryStore> ClientSession<S> {
    pub fn new(store: S) -> Self {
        Self {
            state: SessionState::Idle,
            name: None,
            online: BTreeSet::new(),
            offline: BTreeSet::new(),
            private_history: HashMap::new(),
            group_history: Vec::new(),
            store,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Own display name, once a login has been attempted
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn online(&self) -> &BTreeSet<String> {
        &self.online
    }

    pub fn offline(&self) -> &BTreeSet<String> {
        &self.offline
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Starts connecting. Allowed when idle or after a failed attempt.
    pub fn connect(&mut self) -> Result<(), SessionError> {
        match self.state {
            SessionState::Idle | SessionState::Error(_) => {
                self.state = SessionState::Connecting;
                Ok(())
            }
            _ => Err(self.invalid("connect")),
        }
    }

    pub fn on_connected(&mut self) -> Vec<SessionEvent> {
        if self.state != SessionState::Connecting {
            tracing::debug!(state = ?self.state, "ignoring unexpected connect notification");
            return Vec::new();
        }
        self.state = SessionState::Connected;
        vec![SessionEvent::Connected]
    }

    pub fn on_transport_error(&mut self, description: impl Into<String>) -> Vec<SessionEvent> {
        let description = description.into();
        match self.state {
            SessionState::Connecting | SessionState::Connected => {
                tracing::warn!(error = %description, "transport error");
                self.state = SessionState::Error(description.clone());
                vec![SessionEvent::ConnectError(description)]
            }
            SessionState::Authenticating | SessionState::Authenticated => {
                tracing::warn!(error = %description, "transport error after login");
                self.close()
            }
            _ => Vec::new(),
        }
    }

    pub fn on_disconnected(&mut self) -> Vec<SessionEvent> {
        match self.state {
            SessionState::Idle | SessionState::Error(_) | SessionState::Closed => Vec::new(),
            _ => {
                tracing::info!("relay closed the connection");
                self.close()
            }
        }
    }

    /// Asks the relay for `name`. Returns the frame to send.
    pub fn login(&mut self, name: &str) -> Result<ClientFrame, SessionError> {
        if self.state != SessionState::Connected {
            return Err(self.invalid("log in"));
        }
        validate_name(name)?;
        self.name = Some(name.to_string());
        self.state = SessionState::Authenticating;
        Ok(ClientFrame::login(name))
    }

    /// Sends a private message; it is recorded locally right away
    pub fn send_private(&mut self, to: &str, content: &str) -> Result<ClientFrame, SessionError> {
        let own = self.authenticated_name("send a private message")?;
        validate_name(to)?;
        validate_content(content)?;
        let msg = Message::now(own, content, Channel::Private(to.to_string()));
        self.record_private(to, msg);
        Ok(ClientFrame::private(to, content))
    }

    /// Sends a group message; it is recorded locally right away
    pub fn send_group(&mut self, content: &str) -> Result<ClientFrame, SessionError> {
        let own = self.authenticated_name("send a group message")?;
        validate_content(content)?;
        self.record_group(Message::now(own, content, Channel::Group));
        Ok(ClientFrame::group(content))
    }

    /// Applies one frame from the relay
    pub fn handle_frame(&mut self, frame: ServerFrame) -> Vec<SessionEvent> {
        let authenticated = self.state == SessionState::Authenticated;
        match frame {
            ServerFrame::LoginResult(result) if self.state == SessionState::Authenticating => {
                self.finish_login(result)
            }
            ServerFrame::PrivateMessage { from, content } if authenticated => {
                let msg = Message::now(&from, content, Channel::Private(from.clone()));
                self.record_private(&from, msg.clone());
                vec![SessionEvent::MessageReceived(msg)]
            }
            ServerFrame::GroupMessage { from, content } if authenticated => {
                let msg = Message::now(from, content, Channel::Group);
                self.record_group(msg.clone());
                vec![SessionEvent::MessageReceived(msg)]
            }
            ServerFrame::UserOnline(name) if authenticated => self.set_presence(name, true),
            ServerFrame::UserOffline(name) if authenticated => self.set_presence(name, false),
            frame => {
                tracing::debug!(state = ?self.state, code = frame.code(), "ignoring frame");
                Vec::new()
            }
        }
    }

    /// Conversation with `peer`, loading it from the store on first use
    pub fn private_history(&mut self, peer: &str) -> &[Message] {
        self.private_entry(peer)
    }

    pub fn group_history(&self) -> &[Message] {
        &self.group_history
    }

    fn finish_login(&mut self, result: LoginResult) -> Vec<SessionEvent> {
        let online = match result {
            LoginResult::Ok(online) => online,
            LoginResult::Fail => {
                tracing::info!(name = ?self.name, "login rejected");
                self.state = SessionState::Connected;
                return vec![SessionEvent::LoginResult(false)];
            }
        };
        let own = self.name.clone().unwrap_or_default();
        if let Err(e) = self.store.init_schema(&own) {
            tracing::warn!(error = %e, "unable to open history");
        }
        let known = self.store.list_known_names().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "unable to list known names");
            BTreeSet::new()
        });
        self.group_history = self.store.load_group_history().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "unable to load group history");
            Vec::new()
        });
        self.private_history.clear();

        self.online = online.into_iter().filter(|n| *n != own).collect();
        self.offline = known
            .into_iter()
            .filter(|n| *n != own && !self.online.contains(n))
            .collect();
        self.state = SessionState::Authenticated;
        tracing::info!(name = %own, online = self.online.len(), "logged in");
        vec![SessionEvent::LoginResult(true)]
    }

    fn set_presence(&mut self, name: String, online: bool) -> Vec<SessionEvent> {
        if self.name.as_deref() == Some(name.as_str()) {
            return Vec::new();
        }
        let (from, to) = if online {
            (&mut self.offline, &mut self.online)
        } else {
            (&mut self.online, &mut self.offline)
        };
        from.remove(&name);
        to.insert(name.clone());
        vec![SessionEvent::PresenceChanged { name, online }]
    }

    fn record_private(&mut self, peer: &str, msg: Message) {
        // load first so the cache never misses what the store already had
        self.private_entry(peer);
        if let Err(e) = self.store.append_private_message(peer, &msg) {
            tracing::warn!(error = %e, %peer, "unable to save private message");
        }
        self.private_history
            .entry(peer.to_string())
            .or_default()
            .push(msg);
    }

    fn record_group(&mut self, msg: Message) {
        if let Err(e) = self.store.append_group_message(&msg) {
            tracing::warn!(error = %e, "unable to save group message");
        }
        self.group_history.push(msg);
    }

    fn private_entry(&mut self, peer: &str) -> &mut Vec<Message> {
        let store = &self.store;
        self.private_history
            .entry(peer.to_string())
            .or_insert_with(|| {
                store.load_private_history(peer).unwrap_or_else(|e| {
                    tracing::warn!(error = %e, %peer, "unable to load private history");
                    Vec::new()
                })
            })
    }

    fn authenticated_name(&self, action: &'static str) -> Result<String, SessionError> {
        match (&self.state, &self.name) {
            (SessionState::Authenticated, Some(name)) => Ok(name.clone()),
            _ => Err(self.invalid(action)),
        }
    }

    fn close(&mut self) -> Vec<SessionEvent> {
        self.state = SessionState::Closed;
        vec![SessionEvent::RelayClosed]
    }

    fn invalid(&self, action: &'static str) -> SessionError {
        SessionError::InvalidState {
            action,
            state: self.state.clone(),
        }
    }
}
