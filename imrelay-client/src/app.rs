/// Line-oriented chat front end
use anyhow::Result;
use futures::{SinkExt, StreamExt};
use imrelay_client::{
    connection::{self, FrameReader, FrameWriter},
    ClientSession, HistoryStore, SessionEvent,
};
use imrelay_protocol::{Channel, Message, ServerFrame};
use time::macros::format_description;
use tokio::io::{AsyncBufReadExt, BufReader};

const USAGE: &str = "commands: /connect [host] | /login <name> | /msg <name> <text> | \
                     /history [name] | /who | /quit | <text> sends to everyone";

/// Actions requested by the user
#[derive(Debug, Eq, PartialEq)]
pub(crate) enum Action {
    Connect(Option<String>),
    Login(String),
    Private { to: String, content: String },
    Group(String),
    History(Option<String>),
    Who,
    Quit,
}

/// Holds the session and the write half of the relay connection
#[derive(Debug)]
pub(crate) struct App<S> {
    session: ClientSession<S>,
    writer: Option<FrameWriter>,
    host: String,
    port: u16,
    quit: bool,
    closed: bool,
}

impl<S: HistoryStore> App<S> {
    fn new(store: S, host: String, port: u16) -> Self {
        Self {
            session: ClientSession::new(store),
            writer: None,
            host,
            port,
            quit: false,
            closed: false,
        }
    }

    // Returns the read half when a new connection was opened
    async fn update(&mut self, action: Action) -> Option<FrameReader> {
        match action {
            Action::Connect(host) => return self.do_connect(host).await,
            Action::Login(name) => match self.session.login(&name) {
                Ok(frame) => self.send(frame).await,
                Err(e) => println!("! {e}"),
            },
            Action::Private { to, content } => match self.session.send_private(&to, &content) {
                Ok(frame) => self.send(frame).await,
                Err(e) => println!("! {e}"),
            },
            Action::Group(content) => match self.session.send_group(&content) {
                Ok(frame) => self.send(frame).await,
                Err(e) => println!("! {e}"),
            },
            Action::History(Some(peer)) => {
                for msg in self.session.private_history(&peer) {
                    println!("{}", render_message(msg));
                }
            }
            Action::History(None) => {
                for msg in self.session.group_history() {
                    println!("{}", render_message(msg));
                }
            }
            Action::Who => {
                println!("online: {}", join(self.session.online()));
                println!("offline: {}", join(self.session.offline()));
            }
            Action::Quit => self.quit = true,
        }
        None
    }

    async fn do_connect(&mut self, host: Option<String>) -> Option<FrameReader> {
        if let Some(host) = host {
            self.host = host;
        }
        if let Err(e) = self.session.connect() {
            println!("! {e}");
            return None;
        }
        println!("* connecting to {}:{}", self.host, self.port);
        match connection::connect(&self.host, self.port).await {
            Ok((reader, writer)) => {
                self.writer = Some(writer);
                let events = self.session.on_connected();
                self.show(events);
                Some(reader)
            }
            Err(e) => {
                let events = self.session.on_transport_error(e.to_string());
                self.show(events);
                None
            }
        }
    }

    async fn send(&mut self, frame: imrelay_protocol::ClientFrame) {
        let Some(writer) = self.writer.as_mut() else {
            return;
        };
        if let Err(e) = writer.send(frame).await {
            self.writer = None;
            let events = self.session.on_transport_error(e.to_string());
            self.show(events);
        }
    }

    fn on_frame(&mut self, frame: ServerFrame) {
        let events = self.session.handle_frame(frame);
        self.show(events);
    }

    fn on_transport_error(&mut self, description: String) {
        self.writer = None;
        let events = self.session.on_transport_error(description);
        self.show(events);
    }

    fn on_disconnected(&mut self) {
        self.writer = None;
        let events = self.session.on_disconnected();
        self.show(events);
    }

    fn show(&mut self, events: Vec<SessionEvent>) {
        for event in events {
            match event {
                SessionEvent::Connected => println!("* connected, /login <name> to sign in"),
                SessionEvent::ConnectError(e) => {
                    println!("! unable to reach relay: {e} (/connect to retry)")
                }
                SessionEvent::LoginResult(true) => {
                    println!("* logged in, online: {}", join(self.session.online()))
                }
                SessionEvent::LoginResult(false) => {
                    println!("! name rejected, try another one")
                }
                SessionEvent::MessageReceived(msg) => println!("{}", render_message(&msg)),
                SessionEvent::PresenceChanged { name, online: true } => {
                    println!("* {name} is online")
                }
                SessionEvent::PresenceChanged { name, online: false } => {
                    println!("* {name} went offline")
                }
                SessionEvent::RelayClosed => {
                    println!("! relay closed the connection");
                    self.closed = true;
                    self.quit = true;
                }
            }
        }
    }
}

fn render_message(msg: &Message) -> String {
    let ts = msg
        .timestamp
        .format(format_description!("[hour]:[minute]:[second]"))
        .unwrap_or_default();
    match &msg.channel {
        Channel::Group => format!("[{ts}] <{}> {}", msg.sender, msg.content),
        Channel::Private(peer) if *peer == msg.sender => {
            format!("[{ts}] {} -> you: {}", msg.sender, msg.content)
        }
        Channel::Private(peer) => format!("[{ts}] you -> {peer}: {}", msg.content),
    }
}

fn join<'a>(names: impl IntoIterator<Item = &'a String>) -> String {
    let names: Vec<&str> = names.into_iter().map(String::as_str).collect();
    if names.is_empty() {
        "(nobody)".to_string()
    } else {
        names.join(", ")
    }
}

fn map_input_to_action(line: &str) -> Result<Option<Action>, &'static str> {
    let line = line.trim_end();
    let Some(command) = line.strip_prefix('/') else {
        return Ok((!line.is_empty()).then(|| Action::Group(line.to_string())));
    };
    let (verb, rest) = command.split_once(' ').unwrap_or((command, ""));
    let rest = rest.trim_start();
    let action = match verb {
        "connect" => Action::Connect((!rest.is_empty()).then(|| rest.to_string())),
        "login" if !rest.is_empty() => Action::Login(rest.to_string()),
        "msg" => match rest.split_once(' ') {
            Some((to, content)) => Action::Private {
                to: to.to_string(),
                content: content.to_string(),
            },
            None => return Err(USAGE),
        },
        "history" => Action::History((!rest.is_empty()).then(|| rest.to_string())),
        "who" => Action::Who,
        "quit" => Action::Quit,
        _ => return Err(USAGE),
    };
    Ok(Some(action))
}

async fn next_frame(
    reader: &mut Option<FrameReader>,
) -> Option<Result<ServerFrame, imrelay_protocol::Error>> {
    match reader {
        Some(reader) => reader.next().await,
        None => std::future::pending().await,
    }
}

pub async fn run<S: HistoryStore>(
    store: S,
    host: String,
    port: u16,
    name: Option<String>,
) -> Result<()> {
    let mut app = App::new(store, host, port);
    println!("{USAGE}");

    let mut reader = app.do_connect(None).await;
    if let (Some(name), Some(_)) = (name, reader.as_ref()) {
        app.update(Action::Login(name)).await;
    }
    let mut input = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            // apply frames from the relay
            maybe_frame = next_frame(&mut reader) => match maybe_frame {
                Some(Ok(frame)) => app.on_frame(frame),
                Some(Err(e)) => {
                    reader = None;
                    app.on_transport_error(e.to_string());
                }
                None => {
                    reader = None;
                    app.on_disconnected();
                }
            },

            // turn user input into actions
            maybe_line = input.next_line() => match maybe_line? {
                Some(line) => match map_input_to_action(&line) {
                    Ok(Some(action)) => {
                        if let Some(new_reader) = app.update(action).await {
                            reader = Some(new_reader);
                        }
                    }
                    Ok(None) => {}
                    Err(usage) => println!("{usage}"),
                },
                None => break,
            },
        }

        if app.quit {
            break;
        }
    }

    if app.closed {
        anyhow::bail!("relay closed the connection");
    }
    Ok(())
}
