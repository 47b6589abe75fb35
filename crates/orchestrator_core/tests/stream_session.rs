use orchestrator_core::stream::{
    update, StreamEffect, StreamEvent, StreamMessage, StreamMessageKind, StreamSession,
    StreamState,
};

fn apply(session: StreamSession, events: Vec<StreamEvent>) -> StreamSession {
    events
        .into_iter()
        .fold(session, |session, event| update(session, event).0)
}

fn chunk(text: &str) -> StreamEvent {
    StreamEvent::Message(StreamMessage::new(StreamMessageKind::Chunk, text))
}

fn open() -> StreamSession {
    apply(
        StreamSession::new(),
        vec![
            StreamEvent::ConnectRequested {
                endpoint: "ws://host/ws/analytics/overall".to_string(),
            },
            StreamEvent::Opened,
        ],
    )
}

#[test]
fn chunks_accumulate_and_switch_to_streaming() {
    let session = open();
    assert_eq!(session.state(), StreamState::Connected);

    let session = apply(
        session,
        vec![
            StreamEvent::Message(StreamMessage::new(StreamMessageKind::Status, "warming up")),
            chunk("Occupancy "),
            chunk("is high"),
        ],
    );
    assert_eq!(session.state(), StreamState::Streaming);
    assert_eq!(session.status(), "warming up");
    assert_eq!(session.content(), "Occupancy is high");
}

#[test]
fn status_message_does_not_change_state() {
    let session = apply(
        open(),
        vec![StreamEvent::Message(StreamMessage::new(
            StreamMessageKind::Status,
            "queued",
        ))],
    );
    assert_eq!(session.state(), StreamState::Connected);
}

#[test]
fn chunks_after_complete_are_ignored() {
    let session = apply(open(), vec![chunk("done")]);
    let (session, effects) = update(
        session,
        StreamEvent::Message(StreamMessage::new(StreamMessageKind::Complete, "")),
    );
    assert_eq!(session.state(), StreamState::Completed);
    assert_eq!(effects, vec![StreamEffect::CloseChannel]);

    let session = apply(session, vec![chunk(" more"), StreamEvent::Closed]);
    assert_eq!(session.content(), "done");
    assert_eq!(session.state(), StreamState::Completed);
}

#[test]
fn error_message_is_terminal() {
    let session = apply(
        open(),
        vec![
            chunk("partial"),
            StreamEvent::Message(StreamMessage::new(StreamMessageKind::Error, "model crashed")),
            chunk(" ignored"),
        ],
    );
    assert_eq!(session.state(), StreamState::Error);
    assert_eq!(session.error(), Some("model crashed"));
    assert_eq!(session.content(), "partial");
}

#[test]
fn transport_close_without_terminal_message_disconnects() {
    let session = apply(open(), vec![chunk("half"), StreamEvent::Closed]);
    assert_eq!(session.state(), StreamState::Disconnected);
    assert_eq!(session.content(), "half");
}

#[test]
fn reconnect_closes_existing_channel_and_clears_buffer_on_open() {
    let session = apply(open(), vec![chunk("old")]);
    let (session, effects) = update(
        session,
        StreamEvent::ConnectRequested {
            endpoint: "ws://host/ws/analytics/daily-trends".to_string(),
        },
    );
    assert_eq!(
        effects,
        vec![
            StreamEffect::CloseChannel,
            StreamEffect::OpenChannel {
                endpoint: "ws://host/ws/analytics/daily-trends".to_string()
            },
        ]
    );
    assert_eq!(session.state(), StreamState::Connecting);
    let session = apply(session, vec![StreamEvent::Opened]);
    assert_eq!(session.content(), "");
    assert_eq!(session.endpoint(), Some("ws://host/ws/analytics/daily-trends"));
}

#[test]
fn disconnect_is_idempotent() {
    let (session, effects) = update(open(), StreamEvent::DisconnectRequested);
    assert_eq!(session.state(), StreamState::Disconnected);
    assert_eq!(effects, vec![StreamEffect::CloseChannel]);

    let (again, effects) = update(session.clone(), StreamEvent::DisconnectRequested);
    assert_eq!(again, session);
    assert!(effects.is_empty());
}

#[test]
fn connect_failure_surfaces_reason() {
    let (session, _) = update(
        StreamSession::new(),
        StreamEvent::ConnectRequested {
            endpoint: "ws://nowhere".to_string(),
        },
    );
    let session = apply(
        session,
        vec![StreamEvent::ConnectFailed {
            reason: "connection refused".to_string(),
        }],
    );
    assert_eq!(session.state(), StreamState::Error);
    assert_eq!(session.error(), Some("connection refused"));
}
