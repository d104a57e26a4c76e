use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::{Result, anyhow};
use futures_util::future::join_all;
use line_chat::{
    config::{DuplicatePolicy, ServerConfig},
    protocol::{SERVER_FULL, USERNAME_PROMPT, WELCOME, read_line, write_line},
    registry::Registry,
    server::{SHUTDOWN_NOTICE, Server},
};
use tokio::{
    io::BufReader,
    net::{
        TcpListener, TcpStream,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
    },
    sync::oneshot,
    task::JoinHandle,
    time::{sleep, timeout},
};

const READ_TIMEOUT: Duration = Duration::from_secs(2);

struct TestServer {
    addr: SocketAddr,
    registry: Arc<Registry>,
    shutdown: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
}

impl TestServer {
    async fn start(config: ServerConfig) -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let server = Server::new(listener, &config);
        let addr = server.local_addr()?;
        let registry = server.registry();

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(async move {
            let shutdown = async move {
                let _ = shutdown_rx.await;
            };
            let _ = server.run_until(shutdown).await;
        });

        Ok(Self {
            addr,
            registry,
            shutdown: Some(shutdown_tx),
            handle,
        })
    }

    async fn stop(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        let _ = self.handle.await;
    }

    /// Polls the registry until it holds `expected` users.
    async fn wait_for_users(&self, expected: &[&str]) -> Result<()> {
        let deadline = tokio::time::Instant::now() + READ_TIMEOUT;
        loop {
            let usernames = self.registry.usernames().await;
            if usernames == expected {
                return Ok(());
            }
            if tokio::time::Instant::now() > deadline {
                return Err(anyhow!("registry holds {usernames:?}, expected {expected:?}"));
            }
            sleep(Duration::from_millis(10)).await;
        }
    }
}

struct ChatClient {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl ChatClient {
    async fn connect(addr: SocketAddr) -> Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        let (reader, writer) = stream.into_split();
        Ok(Self {
            reader: BufReader::new(reader),
            writer,
        })
    }

    /// Sends `username` once the welcome and prompt have arrived.
    async fn handshake(addr: SocketAddr, username: &str) -> Result<Self> {
        let mut client = Self::connect(addr).await?;
        assert_eq!(client.next_line().await?, WELCOME);
        assert_eq!(client.next_line().await?, USERNAME_PROMPT);
        client.send(username).await?;
        Ok(client)
    }

    /// Completes the handshake and waits for the client's own join notice.
    ///
    /// Announcements for clients joining concurrently may arrive first and
    /// are skipped.
    async fn join(addr: SocketAddr, username: &str) -> Result<Self> {
        let mut client = Self::handshake(addr, username).await?;
        let notice = format!("{username} joined the chat...");
        while client.next_line().await? != notice {}
        Ok(client)
    }

    /// Drains lines until the server closes the connection.
    async fn wait_for_close(&mut self) -> Result<()> {
        while self.try_next_line().await?.is_some() {}
        Ok(())
    }

    async fn send(&mut self, line: &str) -> Result<()> {
        write_line(&mut self.writer, line).await?;
        Ok(())
    }

    async fn next_line(&mut self) -> Result<String> {
        self.try_next_line()
            .await?
            .ok_or_else(|| anyhow!("server closed the connection"))
    }

    async fn try_next_line(&mut self) -> Result<Option<String>> {
        Ok(timeout(READ_TIMEOUT, read_line(&mut self.reader)).await??)
    }
}

fn config() -> ServerConfig {
    ServerConfig::new(0)
}

#[tokio::test]
async fn round_trip_join_chat_and_quit() -> Result<()> {
    let server = TestServer::start(config()).await?;

    let mut bob = ChatClient::join(server.addr, "bob").await?;
    let mut alice = ChatClient::join(server.addr, "alice").await?;
    assert_eq!(bob.next_line().await?, "alice joined the chat...");

    alice.send("hello").await?;
    assert_eq!(bob.next_line().await?, "alice: hello");
    assert_eq!(alice.next_line().await?, "alice: hello");

    alice.send("quit").await?;
    assert_eq!(bob.next_line().await?, "alice left the chat...");
    assert_eq!(alice.try_next_line().await?, None);

    server.wait_for_users(&["bob"]).await?;
    server.stop().await;
    Ok(())
}

#[tokio::test]
async fn registry_tracks_concurrent_handshakes() -> Result<()> {
    let server = TestServer::start(config()).await?;
    let usernames: Vec<String> = (0..8).map(|n| format!("user-{n}")).collect();

    let joins = usernames
        .iter()
        .map(|username| ChatClient::join(server.addr, username));
    let mut clients = join_all(joins)
        .await
        .into_iter()
        .collect::<Result<Vec<_>>>()?;

    assert_eq!(server.registry.len().await, usernames.len());

    let mut leaver = clients.pop().expect("eight clients");
    leaver.send("QUIT").await?;
    leaver.wait_for_close().await?;

    let expected: Vec<&str> = usernames[..7].iter().map(String::as_str).collect();
    server.wait_for_users(&expected).await?;

    server.stop().await;
    Ok(())
}

#[tokio::test]
async fn quit_in_any_case_stops_delivery() -> Result<()> {
    let server = TestServer::start(config()).await?;

    let mut bob = ChatClient::join(server.addr, "bob").await?;
    let mut alice = ChatClient::join(server.addr, "alice").await?;
    assert_eq!(bob.next_line().await?, "alice joined the chat...");

    alice.send("Quit").await?;
    assert_eq!(bob.next_line().await?, "alice left the chat...");
    assert_eq!(alice.try_next_line().await?, None);

    bob.send("anyone there?").await?;
    assert_eq!(bob.next_line().await?, "bob: anyone there?");
    server.wait_for_users(&["bob"]).await?;

    server.stop().await;
    Ok(())
}

#[tokio::test]
async fn severed_connection_is_deregistered() -> Result<()> {
    let server = TestServer::start(config()).await?;

    let mut bob = ChatClient::join(server.addr, "bob").await?;
    let alice = ChatClient::join(server.addr, "alice").await?;
    assert_eq!(bob.next_line().await?, "alice joined the chat...");

    drop(alice);
    assert_eq!(bob.next_line().await?, "alice left the chat...");
    server.wait_for_users(&["bob"]).await?;

    server.stop().await;
    Ok(())
}

#[tokio::test]
async fn hangup_before_username_is_not_announced() -> Result<()> {
    let server = TestServer::start(config()).await?;

    let mut bob = ChatClient::join(server.addr, "bob").await?;
    let mut silent = ChatClient::connect(server.addr).await?;
    assert_eq!(silent.next_line().await?, WELCOME);
    drop(silent);

    bob.send("still alone").await?;
    assert_eq!(bob.next_line().await?, "bob: still alone");
    server.wait_for_users(&["bob"]).await?;

    server.stop().await;
    Ok(())
}

#[tokio::test]
async fn duplicate_usernames_do_not_corrupt_registry() -> Result<()> {
    let server = TestServer::start(config()).await?;

    let mut carol = ChatClient::join(server.addr, "carol").await?;
    // Whichever registers second displaces the first, so neither is
    // guaranteed to see its own announcement.
    let (first, second) = tokio::join!(
        ChatClient::handshake(server.addr, "dup"),
        ChatClient::handshake(server.addr, "dup"),
    );
    let (_first, _second) = (first?, second?);

    server.wait_for_users(&["carol", "dup"]).await?;
    assert_eq!(carol.next_line().await?, "dup joined the chat...");
    assert_eq!(carol.next_line().await?, "dup joined the chat...");

    server.stop().await;
    Ok(())
}

#[tokio::test]
async fn reject_policy_refuses_duplicate() -> Result<()> {
    let mut config = config();
    config.duplicate_policy = DuplicatePolicy::Reject;
    let server = TestServer::start(config).await?;

    let _first = ChatClient::join(server.addr, "dup").await?;
    let mut second = ChatClient::handshake(server.addr, "dup").await?;
    assert_eq!(
        second.next_line().await?,
        "username 'dup' is already in use"
    );
    assert_eq!(second.try_next_line().await?, None);

    server.wait_for_users(&["dup"]).await?;
    server.stop().await;
    Ok(())
}

#[tokio::test]
async fn full_server_refuses_new_connections() -> Result<()> {
    let mut config = config();
    config.max_sessions = 1;
    let server = TestServer::start(config).await?;

    let _alice = ChatClient::join(server.addr, "alice").await?;
    let mut extra = ChatClient::connect(server.addr).await?;
    assert_eq!(extra.next_line().await?, SERVER_FULL);
    assert_eq!(extra.try_next_line().await?, None);

    server.stop().await;
    Ok(())
}

#[tokio::test]
async fn shutdown_notifies_connected_clients() -> Result<()> {
    let server = TestServer::start(config()).await?;

    let mut alice = ChatClient::join(server.addr, "alice").await?;
    server.stop().await;

    assert_eq!(alice.next_line().await?, SHUTDOWN_NOTICE);
    assert_eq!(alice.try_next_line().await?, None);
    Ok(())
}
