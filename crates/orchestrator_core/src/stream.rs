//! State machine for a streamed analysis channel.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamMessageKind {
    Status,
    Chunk,
    Complete,
    Error,
}

/// One frame on the channel: `{ "type": ..., "content": ... }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamMessage {
    #[serde(rename = "type")]
    pub kind: StreamMessageKind,
    #[serde(default)]
    pub content: String,
}

impl StreamMessage {
    pub fn new(kind: StreamMessageKind, content: impl Into<String>) -> Self {
        Self {
            kind,
            content: content.into(),
        }
    }

    pub fn parse(frame: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(frame)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Streaming,
    Completed,
    Error,
}

impl StreamState {
    /// A channel is (or is about to be) open.
    pub fn is_open(self) -> bool {
        matches!(
            self,
            StreamState::Connecting | StreamState::Connected | StreamState::Streaming
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, StreamState::Completed | StreamState::Error)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    ConnectRequested { endpoint: String },
    Opened,
    ConnectFailed { reason: String },
    Message(StreamMessage),
    Closed,
    DisconnectRequested,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEffect {
    CloseChannel,
    OpenChannel { endpoint: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamSession {
    state: StreamState,
    endpoint: Option<String>,
    status: String,
    buffer: String,
    error: Option<String>,
}

impl StreamSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    pub fn endpoint(&self) -> Option<&str> {
        self.endpoint.as_deref()
    }

    /// Latest human-readable status line.
    pub fn status(&self) -> &str {
        &self.status
    }

    /// Accumulated chunk content.
    pub fn content(&self) -> &str {
        &self.buffer
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }
}

/// Pure update function for a stream session.
pub fn update(
    mut session: StreamSession,
    event: StreamEvent,
) -> (StreamSession, Vec<StreamEffect>) {
    let effects = match event {
        StreamEvent::ConnectRequested { endpoint } => {
            let mut effects = Vec::with_capacity(2);
            if session.state.is_open() {
                effects.push(StreamEffect::CloseChannel);
            }
            session.state = StreamState::Connecting;
            session.endpoint = Some(endpoint.clone());
            session.error = None;
            session.status.clear();
            effects.push(StreamEffect::OpenChannel { endpoint });
            effects
        }
        StreamEvent::Opened => {
            if session.state == StreamState::Connecting {
                session.state = StreamState::Connected;
                session.buffer.clear();
            }
            Vec::new()
        }
        StreamEvent::ConnectFailed { reason } => {
            if session.state == StreamState::Connecting {
                session.state = StreamState::Error;
                session.error = Some(reason);
            }
            Vec::new()
        }
        StreamEvent::Message(message) => {
            if !matches!(
                session.state,
                StreamState::Connected | StreamState::Streaming
            ) {
                return (session, Vec::new());
            }
            match message.kind {
                StreamMessageKind::Status => {
                    session.status = message.content;
                    Vec::new()
                }
                StreamMessageKind::Chunk => {
                    session.buffer.push_str(&message.content);
                    session.state = StreamState::Streaming;
                    Vec::new()
                }
                StreamMessageKind::Complete => {
                    session.state = StreamState::Completed;
                    vec![StreamEffect::CloseChannel]
                }
                StreamMessageKind::Error => {
                    session.state = StreamState::Error;
                    session.error = Some(message.content);
                    vec![StreamEffect::CloseChannel]
                }
            }
        }
        StreamEvent::Closed => {
            if session.state.is_open() {
                session.state = StreamState::Disconnected;
            }
            Vec::new()
        }
        StreamEvent::DisconnectRequested => {
            if session.state.is_open() {
                session.state = StreamState::Disconnected;
                vec![StreamEffect::CloseChannel]
            } else {
                Vec::new()
            }
        }
    };

    (session, effects)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_parses_from_wire_json() {
        let message = StreamMessage::parse(r#"{"type":"chunk","content":"abc"}"#).unwrap();
        assert_eq!(message, StreamMessage::new(StreamMessageKind::Chunk, "abc"));
        let message = StreamMessage::parse(r#"{"type":"complete"}"#).unwrap();
        assert_eq!(message.content, "");
        assert!(StreamMessage::parse(r#"{"type":"bogus","content":""}"#).is_err());
    }
}
