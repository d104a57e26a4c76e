use tokio::io::{AsyncBufRead, AsyncWrite, AsyncWriteExt};

use crate::{error::PromptError, protocol::read_line};

pub const SERVER_PORT_PROMPT: &str =
    "Enter the Port Number (e.g 9999 ) where you want the Server to Run : ";
pub const CLIENT_PORT_PROMPT: &str =
    "Enter the Port Number (e.g 9999 ) to Connect with Server : ";

/// Asks for a port number on `output` and reads the answer from `input`.
pub async fn prompt_port<R, W>(
    input: &mut R,
    output: &mut W,
    prompt: &str,
) -> Result<u16, PromptError>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    output.write_all(prompt.as_bytes()).await?;
    output.flush().await?;

    let answer = read_line(input).await?.ok_or(PromptError::InputClosed)?;
    let answer = answer.trim();
    answer
        .parse::<u16>()
        .map_err(|source| PromptError::InvalidPort {
            input: answer.to_string(),
            source,
        })
}
