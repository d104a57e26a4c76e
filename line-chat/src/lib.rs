//! Line-oriented multi-client chat over TCP.
//!
//! A server accepts connections, asks each client for a username and relays
//! every line it receives to all registered clients. Each module owns one
//! concern:
//!
//! - [`server`] binds the listener, accepts connections and runs one session
//!   task per client in a bounded pool.
//! - [`session`] is the per-connection state machine (handshake, relay,
//!   departure) and the driver that applies its effects.
//! - [`registry`] maps usernames to the [`sink::Sink`] of their connection.
//! - [`broadcaster`] fans a [`message::Message`] out to every registered sink,
//!   isolating failures per recipient.
//! - [`protocol`] holds the newline framing helpers and fixed wire texts.
//! - [`client`] connects to a server and relays between the terminal and the
//!   chat.
//! - [`cli`], [`config`] and [`prompt`] cover the command-line surface.

pub mod broadcaster;
pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod message;
pub mod prompt;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod session;
pub mod sink;
