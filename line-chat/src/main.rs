use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufRead, BufReader};
use tracing::{info, warn};

use line_chat::{
    cli::{Cli, Command},
    client,
    prompt::{CLIENT_PORT_PROMPT, SERVER_PORT_PROMPT, prompt_port},
    server::Server,
};

fn init_tracing() {
    use std::io::IsTerminal;
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(std::io::stdout().is_terminal())
        .try_init();
}

async fn resolve_port<R>(flag: Option<u16>, stdin: &mut R, prompt: &str) -> Result<u16>
where
    R: AsyncBufRead + Unpin,
{
    match flag {
        Some(port) => Ok(port),
        None => prompt_port(stdin, &mut tokio::io::stdout(), prompt)
            .await
            .context("failed to read port number"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let mut stdin = BufReader::new(tokio::io::stdin());

    match cli.command {
        Command::Server(args) => {
            let port = resolve_port(args.port, &mut stdin, SERVER_PORT_PROMPT).await?;
            drop(stdin);
            let config = args.into_config(port);
            let server = Server::bind(&config).await?;
            let addr = server.local_addr()?;
            info!("server listening on {}", addr);
            if let Err(err) = server.run_until_ctrl_c().await {
                warn!("server exited with error: {err:?}");
                return Err(err);
            }
        }
        Command::Client(args) => {
            let port = resolve_port(args.port, &mut stdin, CLIENT_PORT_PROMPT).await?;
            client::run(args.into_config(port), stdin).await?;
            // A stdin read still parked on its blocking thread would keep the
            // runtime from shutting down.
            std::process::exit(0);
        }
    }

    Ok(())
}
