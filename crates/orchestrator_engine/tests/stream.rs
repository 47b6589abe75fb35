use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use futures_util::SinkExt;
use orchestrator_core::stream::StreamState;
use orchestrator_engine::{
    FrameStream, StreamConnector, StreamConsumer, StreamEndpoint, StreamKind, TransportError,
    WsConnector,
};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use pretty_assertions::assert_eq;
use url::Url;

fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(engine_logging::initialize_for_tests);
}

enum Script {
    /// Frames followed by a peer close.
    Frames(Vec<&'static str>),
    /// Frames, then the channel stays open.
    FramesThenHold(Vec<&'static str>),
    Refuse,
}

/// Hands out one script per `open`, in order.
struct ScriptedConnector {
    scripts: Mutex<Vec<Script>>,
    opened: Mutex<Vec<String>>,
}

impl ScriptedConnector {
    fn new(mut scripts: Vec<Script>) -> Arc<Self> {
        scripts.reverse();
        Arc::new(Self {
            scripts: Mutex::new(scripts),
            opened: Mutex::new(Vec::new()),
        })
    }
}

fn frames(
    items: Vec<&'static str>,
) -> impl futures_util::Stream<Item = Result<String, TransportError>> {
    stream::iter(items.into_iter().map(|frame| Ok(frame.to_string())))
}

#[async_trait]
impl StreamConnector for ScriptedConnector {
    async fn open(&self, url: &Url) -> Result<FrameStream, TransportError> {
        self.opened.lock().unwrap().push(url.to_string());
        let script = self.scripts.lock().unwrap().pop().unwrap_or(Script::Refuse);
        match script {
            Script::Frames(items) => Ok(frames(items).boxed()),
            Script::FramesThenHold(items) => Ok(frames(items).chain(stream::pending()).boxed()),
            Script::Refuse => Err(TransportError::Connect("connection refused".to_string())),
        }
    }
}

fn endpoint(kind: StreamKind) -> Url {
    let base = Url::parse("http://localhost:5000/api").unwrap();
    StreamEndpoint::new(kind).url(&base).unwrap()
}

async fn wait_for_state(consumer: &StreamConsumer, wanted: StreamState) {
    let mut receiver = consumer.subscribe();
    tokio::time::timeout(
        Duration::from_secs(5),
        receiver.wait_for(|session| session.state() == wanted),
    )
    .await
    .expect("state reached in time")
    .expect("session sender alive");
}

#[test]
fn endpoint_urls_follow_base_scheme() {
    let base = Url::parse("https://portal.example.com/api").unwrap();
    let url = StreamEndpoint::new(StreamKind::DailyTrends)
        .with_param("days", "30")
        .with_param("property", "a b")
        .url(&base)
        .unwrap();
    assert_eq!(
        url.as_str(),
        "wss://portal.example.com/ws/analytics/daily-trends?days=30&property=a+b"
    );

    assert_eq!(
        endpoint(StreamKind::RevenuePatterns).as_str(),
        "ws://localhost:5000/ws/analytics/revenue-patterns"
    );
    assert_eq!(
        "monthly_performance".parse::<StreamKind>().unwrap(),
        StreamKind::MonthlyPerformance
    );
    assert!("weekly".parse::<StreamKind>().is_err());
}

#[tokio::test]
async fn chunks_accumulate_until_complete() {
    init_logging();
    let connector = ScriptedConnector::new(vec![Script::FramesThenHold(vec![
        r#"{"type":"status","content":"warming up"}"#,
        r#"{"type":"chunk","content":"Occupancy "}"#,
        r#"{"type":"chunk","content":"is high."}"#,
        r#"{"type":"complete","content":""}"#,
        r#"{"type":"chunk","content":" ignored"}"#,
    ])]);
    let consumer = StreamConsumer::new(connector.clone());
    consumer.connect(endpoint(StreamKind::Overall));

    let session = consumer.wait_until_finished().await;
    assert_eq!(session.state(), StreamState::Completed);
    assert_eq!(session.content(), "Occupancy is high.");
    assert_eq!(session.status(), "warming up");
    assert_eq!(
        connector.opened.lock().unwrap().clone(),
        vec!["ws://localhost:5000/ws/analytics/overall".to_string()]
    );
}

#[tokio::test]
async fn error_message_is_terminal() {
    init_logging();
    let connector = ScriptedConnector::new(vec![Script::Frames(vec![
        r#"{"type":"chunk","content":"partial"}"#,
        "not json",
        r#"{"type":"error","content":"model overloaded"}"#,
        r#"{"type":"chunk","content":" more"}"#,
    ])]);
    let consumer = StreamConsumer::new(connector);
    consumer.connect(endpoint(StreamKind::Overall));

    let session = consumer.wait_until_finished().await;
    assert_eq!(session.state(), StreamState::Error);
    assert_eq!(session.error(), Some("model overloaded"));
    assert_eq!(session.content(), "partial");
}

#[tokio::test]
async fn peer_close_without_complete_is_disconnected() {
    init_logging();
    let connector = ScriptedConnector::new(vec![Script::Frames(vec![
        r#"{"type":"chunk","content":"half"}"#,
    ])]);
    let consumer = StreamConsumer::new(connector);
    consumer.connect(endpoint(StreamKind::DailyTrends));

    let session = consumer.wait_until_finished().await;
    assert_eq!(session.state(), StreamState::Disconnected);
    assert_eq!(session.content(), "half");
}

#[tokio::test]
async fn refused_connection_is_an_error() {
    init_logging();
    let consumer = StreamConsumer::new(ScriptedConnector::new(vec![Script::Refuse]));
    consumer.connect(endpoint(StreamKind::Overall));

    let session = consumer.wait_until_finished().await;
    assert_eq!(session.state(), StreamState::Error);
    assert!(session.error().unwrap().contains("connection refused"));
}

#[tokio::test]
async fn reconnect_supersedes_the_open_channel() {
    init_logging();
    let connector = ScriptedConnector::new(vec![
        Script::FramesThenHold(vec![r#"{"type":"chunk","content":"first"}"#]),
        Script::FramesThenHold(vec![r#"{"type":"chunk","content":"second"}"#]),
    ]);
    let consumer = StreamConsumer::new(connector.clone());

    consumer.connect(endpoint(StreamKind::Overall));
    wait_for_state(&consumer, StreamState::Streaming).await;
    assert_eq!(consumer.session().content(), "first");

    consumer.connect(endpoint(StreamKind::RevenuePatterns));
    wait_for_state(&consumer, StreamState::Streaming).await;
    let session = consumer.session();
    assert_eq!(session.content(), "second", "buffer cleared on open");
    assert_eq!(
        session.endpoint(),
        Some("ws://localhost:5000/ws/analytics/revenue-patterns")
    );
    assert_eq!(connector.opened.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn disconnect_is_idempotent() {
    init_logging();
    let connector = ScriptedConnector::new(vec![Script::FramesThenHold(vec![
        r#"{"type":"chunk","content":"live"}"#,
    ])]);
    let consumer = StreamConsumer::new(connector);

    consumer.disconnect();
    assert_eq!(consumer.session().state(), StreamState::Disconnected);

    consumer.connect(endpoint(StreamKind::MonthlyPerformance));
    wait_for_state(&consumer, StreamState::Streaming).await;

    consumer.disconnect();
    consumer.disconnect();
    let session = consumer.session();
    assert_eq!(session.state(), StreamState::Disconnected);
    assert_eq!(session.content(), "live");
}

/// Accepts one WebSocket client, sends `frames`, then keeps reading until
/// the client goes away.
async fn serve_frames(frames: Vec<Message>) -> (Url, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.unwrap();
        let mut socket = tokio_tungstenite::accept_async(tcp).await.unwrap();
        for frame in frames {
            if socket.send(frame).await.is_err() {
                return;
            }
        }
        while let Some(Ok(_)) = socket.next().await {}
    });
    let url = Url::parse(&format!("ws://{addr}/ws/analytics/overall")).unwrap();
    (url, server)
}

#[tokio::test]
async fn websocket_text_and_binary_frames_reach_the_session() {
    init_logging();
    let (url, server) = serve_frames(vec![
        Message::Text(r#"{"type":"status","content":"thinking"}"#.to_string()),
        Message::Text(r#"{"type":"chunk","content":"Occupancy "}"#.to_string()),
        Message::Binary(br#"{"type":"chunk","content":"is high."}"#.to_vec()),
        Message::Text(r#"{"type":"complete","content":""}"#.to_string()),
    ])
    .await;

    let consumer = StreamConsumer::new(Arc::new(WsConnector));
    consumer.connect(url);
    let session = consumer.wait_until_finished().await;
    assert_eq!(session.state(), StreamState::Completed);
    assert_eq!(session.content(), "Occupancy is high.");
    assert_eq!(session.status(), "thinking");
    server.abort();
}

#[tokio::test]
async fn websocket_invalid_utf8_frame_ends_the_channel() {
    init_logging();
    let (url, server) = serve_frames(vec![
        Message::Text(r#"{"type":"chunk","content":"half"}"#.to_string()),
        Message::Binary(vec![0xff, 0xfe, 0xfd]),
        Message::Text(r#"{"type":"chunk","content":" never"}"#.to_string()),
    ])
    .await;

    let consumer = StreamConsumer::new(Arc::new(WsConnector));
    consumer.connect(url);
    let session = consumer.wait_until_finished().await;
    assert_eq!(session.state(), StreamState::Disconnected);
    assert_eq!(session.content(), "half");
    server.abort();
}

#[tokio::test]
async fn websocket_connect_refused_is_an_error() {
    init_logging();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let consumer = StreamConsumer::new(Arc::new(WsConnector));
    consumer.connect(Url::parse(&format!("ws://{addr}/ws/analytics/overall")).unwrap());
    let session = consumer.wait_until_finished().await;
    assert_eq!(session.state(), StreamState::Error);
    assert!(session.error().is_some());
}
