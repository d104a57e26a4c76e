use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    time::Duration,
};

use clap::ValueEnum;
use tokio::sync::Semaphore;

pub const DEFAULT_MAX_SESSIONS: usize = 1024;
/// Largest session pool the server's semaphore can hold.
pub const MAX_SESSIONS_LIMIT: usize = Semaphore::MAX_PERMITS;
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_HOST: &str = "localhost";

/// What the registry does when a second client picks a username in use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum DuplicatePolicy {
    /// Replace the existing entry; the earlier client stops receiving messages.
    #[default]
    Overwrite,
    /// Refuse the newcomer and close its connection.
    Reject,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: IpAddr,
    pub port: u16,
    pub max_sessions: usize,
    /// Upper bound on a single broadcast write. `None` waits indefinitely.
    pub write_timeout: Option<Duration>,
    pub duplicate_policy: DuplicatePolicy,
}

impl ServerConfig {
    pub fn new(port: u16) -> Self {
        Self {
            bind: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port,
            max_sessions: DEFAULT_MAX_SESSIONS,
            write_timeout: Some(DEFAULT_WRITE_TIMEOUT),
            duplicate_policy: DuplicatePolicy::default(),
        }
    }

    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.port)
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub host: String,
    pub port: u16,
}
