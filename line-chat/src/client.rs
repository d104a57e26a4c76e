use anyhow::{Context, Result};
use tokio::{
    io::{self, AsyncBufRead, AsyncWrite, AsyncWriteExt, BufReader},
    net::TcpStream,
    select,
};
use tracing::{debug, info, warn};

use crate::{
    config::ClientConfig,
    error::is_connection_closed,
    protocol::{is_quit, read_line, write_line},
};

pub const CONNECT_FAILED: &str =
    "Error connecting to server on the given socket. Please input a valid socket.";
pub const CONNECTION_CLOSED: &str = "Chat connection closed...";
pub const RECEIVE_FAILED: &str = "Error receiving message from server...";
pub const SEND_FAILED: &str = "Error sending message to server...";

/// Connects to the server and relays between the terminal and the chat.
///
/// `stdin` is taken already buffered so lines typed ahead of the port prompt
/// are not lost.
pub async fn run<R>(config: ClientConfig, stdin: R) -> Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let stream = match TcpStream::connect((config.host.as_str(), config.port)).await {
        Ok(stream) => stream,
        Err(err) => {
            write_stdout(CONNECT_FAILED).await?;
            return Err(err)
                .with_context(|| format!("failed to connect to {}:{}", config.host, config.port));
        }
    };
    info!("connected to {}:{}", config.host, config.port);

    let (reader, writer) = stream.into_split();
    let mut receiver = tokio::spawn(receive_loop(BufReader::new(reader), io::stdout()));

    select! {
        received = &mut receiver => {
            received.context("receive task failed")??;
        }
        sent = send_loop(stdin, writer) => {
            if let Err(err) = sent {
                write_stdout(SEND_FAILED).await?;
                warn!(error = ?err, "send loop failed");
            }
            receiver.await.context("receive task failed")??;
        }
    }

    Ok(())
}

/// Relays terminal lines to the server until `quit` or end of input, then
/// closes the write direction so the server sees the departure.
pub async fn send_loop<R, W>(mut input: R, mut server: W) -> io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    while let Some(line) = read_line(&mut input).await? {
        write_line(&mut server, &line).await?;
        if is_quit(&line) {
            break;
        }
    }

    server.shutdown().await
}

/// Prints every line the server sends until the connection ends.
pub async fn receive_loop<R, W>(mut server: R, mut output: W) -> io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    loop {
        match read_line(&mut server).await {
            Ok(Some(line)) => write_line(&mut output, &line).await?,
            Ok(None) => return write_line(&mut output, CONNECTION_CLOSED).await,
            Err(err) if is_connection_closed(&err) => {
                debug!(error = ?err, "server connection reset");
                return write_line(&mut output, CONNECTION_CLOSED).await;
            }
            Err(err) => {
                warn!(error = ?err, "failed to read from server");
                return write_line(&mut output, RECEIVE_FAILED).await;
            }
        }
    }
}

async fn write_stdout(line: &str) -> io::Result<()> {
    let mut stdout = io::stdout();
    write_line(&mut stdout, line).await
}
