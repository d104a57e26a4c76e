//! Per-connection lifecycle.
//!
//! [`SessionState::step`] is a pure transition function: it decides the next
//! state and the [`Effect`]s to perform, without touching sockets. [`Session`]
//! drives it, feeding lines read from the client and applying the effects to
//! the connection, the [`Registry`] and the [`Broadcaster`].

use std::{mem, net::SocketAddr};

use tokio::io::AsyncBufRead;
use tracing::{debug, info, warn};

use crate::{
    broadcaster::Broadcaster,
    error::{RegisterError, is_connection_closed},
    message::Message,
    protocol::{self, USERNAME_PROMPT, WELCOME},
    registry::{Registry, SessionId},
    sink::Sink,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    AwaitingUsername,
    Active { username: String },
    Terminating { username: String },
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    /// The connection has just been accepted.
    Accepted,
    Line(String),
    /// End of stream or a read error.
    Hangup,
    /// Departure bookkeeping may run.
    Finished,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    Send(String),
    Register(String),
    Broadcast(Message),
    Unregister(String),
    Close,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub next: SessionState,
    pub effects: Vec<Effect>,
}

impl Transition {
    fn to(next: SessionState, effects: Vec<Effect>) -> Self {
        Self { next, effects }
    }
}

impl SessionState {
    pub fn step(self, input: Input) -> Transition {
        match (self, input) {
            (SessionState::Connecting, Input::Accepted) => Transition::to(
                SessionState::AwaitingUsername,
                vec![
                    Effect::Send(WELCOME.to_string()),
                    Effect::Send(USERNAME_PROMPT.to_string()),
                ],
            ),
            (SessionState::AwaitingUsername, Input::Line(username)) if !username.is_empty() => {
                Transition::to(
                    SessionState::Active {
                        username: username.clone(),
                    },
                    vec![
                        Effect::Register(username.clone()),
                        Effect::Broadcast(Message::joined(username)),
                    ],
                )
            }
            (SessionState::AwaitingUsername, Input::Line(_) | Input::Hangup) => {
                Transition::to(SessionState::Closed, vec![Effect::Close])
            }
            (SessionState::Active { username }, Input::Line(line)) => {
                if protocol::is_quit(&line) {
                    Transition::to(SessionState::Terminating { username }, Vec::new())
                } else {
                    let message = Message::chat(username.clone(), line);
                    Transition::to(
                        SessionState::Active { username },
                        vec![Effect::Broadcast(message)],
                    )
                }
            }
            (SessionState::Active { username }, Input::Hangup) => {
                Transition::to(SessionState::Terminating { username }, Vec::new())
            }
            (SessionState::Terminating { username }, Input::Finished) => Transition::to(
                SessionState::Closed,
                vec![
                    Effect::Unregister(username.clone()),
                    Effect::Broadcast(Message::left(username)),
                    Effect::Close,
                ],
            ),
            (state, _) => Transition::to(state, Vec::new()),
        }
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, SessionState::Closed)
    }
}

/// One connected client on the server side.
pub struct Session<R> {
    id: SessionId,
    peer: Option<SocketAddr>,
    reader: R,
    sink: Sink,
    state: SessionState,
}

impl<R> Session<R>
where
    R: AsyncBufRead + Unpin,
{
    pub fn new(id: SessionId, peer: Option<SocketAddr>, reader: R, sink: Sink) -> Self {
        Self {
            id,
            peer,
            reader,
            sink,
            state: SessionState::Connecting,
        }
    }

    /// Runs the session until it reaches [`SessionState::Closed`].
    ///
    /// Errors are logged here and turned into state-machine inputs; nothing is
    /// returned to the caller.
    pub async fn run(mut self, registry: &Registry, broadcaster: &Broadcaster) {
        loop {
            let input = match &self.state {
                SessionState::Connecting => Input::Accepted,
                SessionState::AwaitingUsername | SessionState::Active { .. } => {
                    self.next_input().await
                }
                SessionState::Terminating { .. } => Input::Finished,
                SessionState::Closed => break,
            };

            let current = mem::replace(&mut self.state, SessionState::Closed);
            let Transition { next, effects } = current.step(input);
            self.state = next;

            for effect in effects {
                if !self.apply(effect, registry, broadcaster).await {
                    self.state = SessionState::Closed;
                    break;
                }
            }
        }

        debug!(session = self.id, peer = ?self.peer, "session closed");
    }

    async fn next_input(&mut self) -> Input {
        match protocol::read_line(&mut self.reader).await {
            Ok(Some(line)) => Input::Line(line),
            Ok(None) => {
                info!(session = self.id, peer = ?self.peer, "client connection closed");
                Input::Hangup
            }
            Err(err) if is_connection_closed(&err) => {
                info!(session = self.id, peer = ?self.peer, error = %err, "client connection closed");
                Input::Hangup
            }
            Err(err) => {
                warn!(session = self.id, peer = ?self.peer, error = ?err, "error reading from client");
                Input::Hangup
            }
        }
    }

    /// Returns false when the session has to stop without running the
    /// remaining effects.
    async fn apply(
        &self,
        effect: Effect,
        registry: &Registry,
        broadcaster: &Broadcaster,
    ) -> bool {
        match effect {
            Effect::Send(line) => {
                if let Err(err) = self.sink.send_line(&line).await {
                    debug!(session = self.id, error = ?err, "failed to write to client");
                }
            }
            Effect::Register(username) => {
                match registry
                    .register(&username, self.id, self.sink.clone())
                    .await
                {
                    Ok(displaced) => {
                        if let Some(previous) = displaced {
                            warn!(
                                %username,
                                session = self.id,
                                displaced = previous,
                                "username reused; previous client no longer receives messages"
                            );
                        }
                        info!(%username, session = self.id, peer = ?self.peer, "connected to chat");
                    }
                    Err(err @ RegisterError::UsernameTaken(_)) => {
                        info!(%username, session = self.id, "rejected duplicate username");
                        if let Err(write_err) = self.sink.send_line(&err.to_string()).await {
                            debug!(session = self.id, error = ?write_err, "failed to send rejection");
                        }
                        self.close_sink().await;
                        return false;
                    }
                }
            }
            Effect::Broadcast(message) => {
                broadcaster.broadcast(&message).await;
            }
            Effect::Unregister(username) => {
                if registry.unregister(&username, self.id).await {
                    info!(%username, session = self.id, "disconnected from chat");
                }
            }
            Effect::Close => self.close_sink().await,
        }
        true
    }

    async fn close_sink(&self) {
        if let Err(err) = self.sink.close().await {
            debug!(session = self.id, error = ?err, "failed to shut down client connection");
        }
    }
}
