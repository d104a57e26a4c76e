use std::{
    future::Future,
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use anyhow::Result;
use tokio::{
    io::BufReader,
    net::{TcpListener, TcpStream},
    select,
    sync::{OwnedSemaphorePermit, Semaphore},
    task::JoinSet,
    time::sleep,
};
use tracing::{debug, info, warn};

use crate::{
    broadcaster::Broadcaster,
    config::{MAX_SESSIONS_LIMIT, ServerConfig},
    error::ServerError,
    message::Message,
    protocol::{SERVER_FULL, write_line},
    registry::{Registry, SessionId},
    session::Session,
    sink::Sink,
};

pub const SHUTDOWN_NOTICE: &str = "Server is shutting down...";

/// Pause after a failed accept so persistent errors (EMFILE) do not spin the loop.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

pub struct Server {
    listener: TcpListener,
    state: Arc<ServerState>,
    slots: Arc<Semaphore>,
}

impl Server {
    /// Binds the listening socket. Failing here is fatal for the process.
    pub async fn bind(config: &ServerConfig) -> Result<Self, ServerError> {
        let addr = config.listen_addr();
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;
        Ok(Self::new(listener, config))
    }

    pub fn new(listener: TcpListener, config: &ServerConfig) -> Self {
        let max_sessions = config.max_sessions.min(MAX_SESSIONS_LIMIT);
        Self {
            listener,
            state: Arc::new(ServerState::new(config)),
            slots: Arc::new(Semaphore::new(max_sessions)),
        }
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn registry(&self) -> Arc<Registry> {
        Arc::clone(&self.state.registry)
    }

    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        let Server {
            listener,
            state,
            slots,
        } = self;
        let mut sessions = JoinSet::new();
        tokio::pin!(shutdown);

        loop {
            select! {
                _ = &mut shutdown => {
                    handle_shutdown(&state, &mut sessions).await;
                    break;
                }
                accept_result = listener.accept() => {
                    handle_accept_result(accept_result, &state, &slots, &mut sessions).await;
                }
                Some(finished) = sessions.join_next() => {
                    if let Err(err) = finished {
                        warn!(error = ?err, "session task ended abnormally");
                    }
                }
            }
        }

        Ok(())
    }

    /// Serves until Ctrl-C; under normal operation this never returns.
    pub async fn run_until_ctrl_c(self) -> Result<()> {
        self.run_until(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!(error = ?err, "failed to install ctrl-c handler");
                std::future::pending::<()>().await;
            }
        })
        .await
    }
}

async fn handle_shutdown(state: &ServerState, sessions: &mut JoinSet<()>) {
    info!(active = sessions.len(), "server shutting down");
    state
        .broadcaster
        .broadcast(&Message::notice(SHUTDOWN_NOTICE))
        .await;
    sessions.shutdown().await;
}

async fn handle_accept_result(
    result: std::io::Result<(TcpStream, SocketAddr)>,
    state: &Arc<ServerState>,
    slots: &Arc<Semaphore>,
    sessions: &mut JoinSet<()>,
) {
    match result {
        Ok((stream, peer)) => match Arc::clone(slots).try_acquire_owned() {
            Ok(permit) => spawn_session(stream, peer, permit, state, sessions),
            Err(_) => refuse_connection(stream, peer, sessions),
        },
        Err(err) => {
            warn!(error = ?err, "failed to accept connection");
            sleep(ACCEPT_BACKOFF).await;
        }
    }
}

fn spawn_session(
    stream: TcpStream,
    peer: SocketAddr,
    permit: OwnedSemaphorePermit,
    state: &Arc<ServerState>,
    sessions: &mut JoinSet<()>,
) {
    let state = Arc::clone(state);
    let id = state.next_id();
    info!(session = id, %peer, "client connected");

    sessions.spawn(async move {
        let _permit = permit;
        let (reader, writer) = stream.into_split();
        let session = Session::new(id, Some(peer), BufReader::new(reader), Sink::new(writer));
        session.run(&state.registry, &state.broadcaster).await;
    });
}

fn refuse_connection(mut stream: TcpStream, peer: SocketAddr, sessions: &mut JoinSet<()>) {
    warn!(%peer, "session limit reached; refusing connection");
    // Told off-loop so a slow peer cannot hold up accept.
    sessions.spawn(async move {
        if let Err(err) = write_line(&mut stream, SERVER_FULL).await {
            debug!(%peer, error = ?err, "failed to notify refused client");
        }
    });
}

struct ServerState {
    registry: Arc<Registry>,
    broadcaster: Broadcaster,
    next_id: AtomicU64,
}

impl ServerState {
    fn new(config: &ServerConfig) -> Self {
        let registry = Arc::new(Registry::new(config.duplicate_policy));
        let broadcaster = Broadcaster::new(Arc::clone(&registry), config.write_timeout);
        Self {
            registry,
            broadcaster,
            next_id: AtomicU64::new(1),
        }
    }

    fn next_id(&self) -> SessionId {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }
}
