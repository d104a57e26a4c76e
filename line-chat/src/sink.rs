use std::{fmt, io, sync::Arc, time::Duration};

use tokio::{
    io::{AsyncWrite, AsyncWriteExt},
    sync::Mutex,
    time::timeout,
};

use crate::protocol::write_line;

type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Shareable handle to the writable half of one client connection.
///
/// Clones refer to the same connection. Each line is written while holding the
/// handle's own lock, so concurrent senders never interleave partial lines.
#[derive(Clone)]
pub struct Sink {
    writer: Arc<Mutex<BoxedWriter>>,
}

impl Sink {
    pub fn new<W>(writer: W) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            writer: Arc::new(Mutex::new(Box::new(writer))),
        }
    }

    pub async fn send_line(&self, line: &str) -> io::Result<()> {
        let mut writer = self.writer.lock().await;
        write_line(&mut *writer, line).await
    }

    /// Like [`Sink::send_line`], but gives up once `limit` has elapsed.
    ///
    /// The limit covers waiting for the handle's lock as well as the write.
    pub async fn send_line_within(&self, line: &str, limit: Duration) -> io::Result<()> {
        match timeout(limit, self.send_line(line)).await {
            Ok(result) => result,
            Err(_) => Err(io::Error::new(
                io::ErrorKind::TimedOut,
                format!("write did not complete within {limit:?}"),
            )),
        }
    }

    /// Shuts down the write direction; the peer observes end of stream.
    pub async fn close(&self) -> io::Result<()> {
        let mut writer = self.writer.lock().await;
        writer.shutdown().await
    }

    pub fn same_connection(&self, other: &Sink) -> bool {
        Arc::ptr_eq(&self.writer, &other.writer)
    }
}

impl fmt::Debug for Sink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sink")
            .field("handles", &Arc::strong_count(&self.writer))
            .finish()
    }
}
