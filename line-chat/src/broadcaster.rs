use std::{sync::Arc, time::Duration};

use futures_util::future::join_all;
use tracing::{debug, warn};

use crate::{error::is_connection_closed, message::Message, registry::Registry};

/// Outcome of one broadcast pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DeliveryReport {
    pub delivered: usize,
    /// Usernames whose write failed or timed out.
    pub failed: Vec<String>,
}

/// Fans a message out to every sink currently in the registry.
#[derive(Debug, Clone)]
pub struct Broadcaster {
    registry: Arc<Registry>,
    write_timeout: Option<Duration>,
}

impl Broadcaster {
    pub fn new(registry: Arc<Registry>, write_timeout: Option<Duration>) -> Self {
        Self {
            registry,
            write_timeout,
        }
    }

    /// Delivers `message` to each registered recipient at most once.
    ///
    /// Writes run concurrently. A failing recipient is logged and reported but
    /// never stops delivery to the others.
    pub async fn broadcast(&self, message: &Message) -> DeliveryReport {
        let recipients = self.registry.snapshot_sinks().await;
        let line = message.to_string();

        let deliveries = recipients.into_iter().map(|(username, sink)| {
            let line = line.as_str();
            async move {
                let result = match self.write_timeout {
                    Some(limit) => sink.send_line_within(line, limit).await,
                    None => sink.send_line(line).await,
                };
                (username, result)
            }
        });

        let mut report = DeliveryReport::default();
        for (username, result) in join_all(deliveries).await {
            match result {
                Ok(()) => report.delivered += 1,
                Err(err) => {
                    if is_connection_closed(&err) {
                        debug!(%username, "recipient connection closed during broadcast");
                    } else {
                        warn!(%username, error = ?err, "failed to deliver message");
                    }
                    report.failed.push(username);
                }
            }
        }
        report
    }
}
