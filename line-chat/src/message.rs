use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Chat,
    Joined,
    Left,
    Notice,
}

/// A line the server fans out to every registered client.
///
/// Built once per inbound chat line or lifecycle event and never mutated
/// afterwards; [`fmt::Display`] produces the exact wire text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    kind: MessageKind,
    sender_label: String,
    body: String,
}

impl Message {
    pub fn chat(username: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            kind: MessageKind::Chat,
            sender_label: username.into(),
            body: body.into(),
        }
    }

    pub fn joined(username: impl Into<String>) -> Self {
        Self {
            kind: MessageKind::Joined,
            sender_label: username.into(),
            body: "joined the chat...".to_string(),
        }
    }

    pub fn left(username: impl Into<String>) -> Self {
        Self {
            kind: MessageKind::Left,
            sender_label: username.into(),
            body: "left the chat...".to_string(),
        }
    }

    /// Server-originated announcement with no sender prefix.
    pub fn notice(body: impl Into<String>) -> Self {
        Self {
            kind: MessageKind::Notice,
            sender_label: String::new(),
            body: body.into(),
        }
    }

    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    pub fn sender_label(&self) -> &str {
        &self.sender_label
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            MessageKind::Chat => write!(f, "{}: {}", self.sender_label, self.body),
            MessageKind::Joined | MessageKind::Left => {
                write!(f, "{} {}", self.sender_label, self.body)
            }
            MessageKind::Notice => f.write_str(&self.body),
        }
    }
}
