use std::{net::IpAddr, time::Duration};

use clap::{Args, Parser, Subcommand};

use crate::config::{
    ClientConfig, DEFAULT_HOST, DEFAULT_MAX_SESSIONS, DEFAULT_WRITE_TIMEOUT, DuplicatePolicy,
    MAX_SESSIONS_LIMIT, ServerConfig,
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the chat server, relaying every line to all connected clients.
    Server(ServerArgs),
    /// Connect to a chat server from the terminal.
    Client(ClientArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ServerArgs {
    /// Port to listen on. Prompted for interactively when omitted; 0 picks an ephemeral port.
    #[arg(long)]
    pub port: Option<u16>,

    /// Address to bind the listener to.
    #[arg(long, default_value = "0.0.0.0")]
    pub bind: IpAddr,

    /// Maximum number of concurrently connected clients.
    #[arg(long, default_value_t = DEFAULT_MAX_SESSIONS, value_parser = parse_max_sessions)]
    pub max_sessions: usize,

    /// Seconds a single broadcast write may take before that recipient is skipped. 0 disables.
    #[arg(long, default_value_t = DEFAULT_WRITE_TIMEOUT.as_secs())]
    pub write_timeout_secs: u64,

    /// What to do when a client picks a username that is already connected.
    #[arg(long, value_enum, default_value_t = DuplicatePolicy::Overwrite)]
    pub duplicate_usernames: DuplicatePolicy,
}

impl ServerArgs {
    pub fn into_config(self, port: u16) -> ServerConfig {
        ServerConfig {
            bind: self.bind,
            port,
            max_sessions: self.max_sessions,
            write_timeout: (self.write_timeout_secs > 0)
                .then(|| Duration::from_secs(self.write_timeout_secs)),
            duplicate_policy: self.duplicate_usernames,
        }
    }
}

fn parse_max_sessions(value: &str) -> Result<usize, String> {
    let sessions: usize = value
        .parse()
        .map_err(|err| format!("'{value}' is not a session count: {err}"))?;
    if sessions > MAX_SESSIONS_LIMIT {
        return Err(format!("at most {MAX_SESSIONS_LIMIT} sessions are supported"));
    }
    Ok(sessions)
}

#[derive(Args, Debug, Clone)]
pub struct ClientArgs {
    /// Port of the server. Prompted for interactively when omitted.
    #[arg(long)]
    pub port: Option<u16>,

    /// Host the server runs on.
    #[arg(long, default_value = DEFAULT_HOST)]
    pub host: String,
}

impl ClientArgs {
    pub fn into_config(self, port: u16) -> ClientConfig {
        ClientConfig {
            host: self.host,
            port,
        }
    }
}
