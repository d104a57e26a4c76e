use std::io;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

const LINE_ENDINGS: &[char] = &['\n', '\r'];

pub const WELCOME: &str = "Welcome to the chat !";
pub const USERNAME_PROMPT: &str = "Enter your username :";
pub const SERVER_FULL: &str = "Server is full, try again later.";
pub const QUIT: &str = "quit";

/// Returns true when a chat line asks to leave the room.
pub fn is_quit(line: &str) -> bool {
    line.eq_ignore_ascii_case(QUIT)
}

/// Reads one newline-delimited line, without its line ending.
///
/// Returns `Ok(None)` once the peer has closed its half of the stream. Empty
/// lines are returned as empty strings rather than skipped. Bytes that are not
/// valid UTF-8 are replaced with U+FFFD instead of failing the read.
pub async fn read_line<R>(reader: &mut R) -> io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    let mut raw = Vec::new();
    let bytes = reader.read_until(b'\n', &mut raw).await?;
    if bytes == 0 {
        return Ok(None);
    }

    let line = String::from_utf8_lossy(&raw);
    Ok(Some(line.trim_end_matches(LINE_ENDINGS).to_string()))
}

pub async fn write_line<W>(writer: &mut W, line: &str) -> io::Result<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    // One buffer per line so a line is never split across two write calls.
    let mut encoded = Vec::with_capacity(line.len() + 1);
    encoded.extend_from_slice(line.as_bytes());
    encoded.push(b'\n');
    writer.write_all(&encoded).await?;
    writer.flush().await?;
    Ok(())
}
