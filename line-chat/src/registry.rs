use std::collections::HashMap;

use tokio::sync::Mutex;

use crate::{config::DuplicatePolicy, error::RegisterError, sink::Sink};

pub type SessionId = u64;

#[derive(Debug, Clone)]
struct Entry {
    owner: SessionId,
    sink: Sink,
}

/// Username to sink mapping shared by every session on the server.
///
/// The lock is held for one map operation at a time and never across a
/// network write; broadcasters work from [`Registry::snapshot_sinks`].
#[derive(Debug)]
pub struct Registry {
    entries: Mutex<HashMap<String, Entry>>,
    policy: DuplicatePolicy,
}

impl Registry {
    pub fn new(policy: DuplicatePolicy) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            policy,
        }
    }

    pub fn policy(&self) -> DuplicatePolicy {
        self.policy
    }

    /// Adds `username` for the session `owner`.
    ///
    /// With [`DuplicatePolicy::Overwrite`] an existing entry for the same
    /// username is replaced and its owner returned. The displaced session is
    /// left connected; it just stops receiving broadcasts.
    pub async fn register(
        &self,
        username: &str,
        owner: SessionId,
        sink: Sink,
    ) -> Result<Option<SessionId>, RegisterError> {
        let mut entries = self.entries.lock().await;

        if self.policy == DuplicatePolicy::Reject && entries.contains_key(username) {
            return Err(RegisterError::UsernameTaken(username.to_string()));
        }

        let displaced = entries
            .insert(username.to_string(), Entry { owner, sink })
            .map(|previous| previous.owner);
        Ok(displaced)
    }

    /// Removes `username` if it is still owned by `owner`.
    pub async fn unregister(&self, username: &str, owner: SessionId) -> bool {
        let mut entries = self.entries.lock().await;
        match entries.get(username) {
            Some(entry) if entry.owner == owner => {
                entries.remove(username);
                true
            }
            _ => false,
        }
    }

    pub async fn snapshot_sinks(&self) -> Vec<(String, Sink)> {
        let entries = self.entries.lock().await;
        entries
            .iter()
            .map(|(username, entry)| (username.clone(), entry.sink.clone()))
            .collect()
    }

    pub async fn usernames(&self) -> Vec<String> {
        let entries = self.entries.lock().await;
        let mut usernames: Vec<String> = entries.keys().cloned().collect();
        usernames.sort();
        usernames
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}
