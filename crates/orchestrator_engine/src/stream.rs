use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use engine_logging::{engine_debug, engine_info, engine_warn};
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use orchestrator_core::stream::{update, StreamEffect, StreamEvent, StreamMessage, StreamSession};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use url::Url;

use crate::{ParseStreamKindError, TransportError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
    Overall,
    DailyTrends,
    MonthlyPerformance,
    RevenuePatterns,
}

impl StreamKind {
    pub const ALL: [StreamKind; 4] = [
        StreamKind::Overall,
        StreamKind::DailyTrends,
        StreamKind::MonthlyPerformance,
        StreamKind::RevenuePatterns,
    ];

    pub fn slug(self) -> &'static str {
        match self {
            StreamKind::Overall => "overall",
            StreamKind::DailyTrends => "daily-trends",
            StreamKind::MonthlyPerformance => "monthly-performance",
            StreamKind::RevenuePatterns => "revenue-patterns",
        }
    }
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

impl FromStr for StreamKind {
    type Err = ParseStreamKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace('_', "-");
        StreamKind::ALL
            .into_iter()
            .find(|kind| kind.slug() == wanted)
            .ok_or_else(|| ParseStreamKindError(s.to_string()))
    }
}

/// `/ws/analytics/{kind}` with optional query parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamEndpoint {
    kind: StreamKind,
    params: Vec<(String, String)>,
}

impl StreamEndpoint {
    pub fn new(kind: StreamKind) -> Self {
        Self {
            kind,
            params: Vec::new(),
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((key.into(), value.into()));
        self
    }

    pub fn kind(&self) -> StreamKind {
        self.kind
    }

    /// Builds the socket URL on the origin of the HTTP base URL, switching
    /// `http` to `ws` and `https` to `wss`.
    pub fn url(&self, base: &Url) -> Result<Url, TransportError> {
        let scheme = match base.scheme() {
            "https" | "wss" => "wss",
            _ => "ws",
        };
        let mut url = base.clone();
        url.set_scheme(scheme)
            .map_err(|()| TransportError::InvalidUrl {
                url: base.to_string(),
                message: format!("cannot switch scheme to {scheme}"),
            })?;
        url.set_path(&format!("/ws/analytics/{}", self.kind.slug()));
        url.set_query(None);
        url.set_fragment(None);
        if !self.params.is_empty() {
            url.query_pairs_mut().extend_pairs(self.params.iter());
        }
        Ok(url)
    }
}

/// Text frames as they arrive on an open channel.
pub type FrameStream = BoxStream<'static, Result<String, TransportError>>;

#[async_trait]
pub trait StreamConnector: Send + Sync {
    async fn open(&self, url: &Url) -> Result<FrameStream, TransportError>;
}

/// WebSocket connector. Control frames are handled by the socket and never
/// reach the consumer.
#[derive(Debug, Default, Clone, Copy)]
pub struct WsConnector;

#[async_trait]
impl StreamConnector for WsConnector {
    async fn open(&self, url: &Url) -> Result<FrameStream, TransportError> {
        let (socket, _response) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(|err| TransportError::Connect(err.to_string()))?;
        let frames = socket.filter_map(|frame| async move {
            match frame {
                Ok(Message::Text(text)) => Some(Ok(text)),
                Ok(Message::Binary(bytes)) => Some(
                    String::from_utf8(bytes).map_err(|err| TransportError::Frame(err.to_string())),
                ),
                Ok(_) => None,
                Err(err) => Some(Err(TransportError::Frame(err.to_string()))),
            }
        });
        Ok(frames.boxed())
    }
}

/// Applies `event` if `admit` agrees, atomically with the session write.
fn apply(
    session: &watch::Sender<StreamSession>,
    event: StreamEvent,
    admit: impl FnOnce() -> bool,
) -> Option<Vec<StreamEffect>> {
    let mut effects = None;
    session.send_if_modified(|current| {
        if !admit() {
            return false;
        }
        let (next, produced) = update(current.clone(), event);
        effects = Some(produced);
        let changed = next != *current;
        *current = next;
        changed
    });
    effects
}

/// Owns at most one live channel. Reconnecting supersedes the previous
/// channel; events from a superseded channel are dropped.
pub struct StreamConsumer {
    connector: Arc<dyn StreamConnector>,
    session: Arc<watch::Sender<StreamSession>>,
    channel: Mutex<Option<JoinHandle<()>>>,
    generation: Arc<AtomicU64>,
}

impl StreamConsumer {
    pub fn new(connector: Arc<dyn StreamConnector>) -> Self {
        let (session, _) = watch::channel(StreamSession::new());
        Self {
            connector,
            session: Arc::new(session),
            channel: Mutex::new(None),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn connect(&self, url: Url) {
        let generation = &self.generation;
        let mut current = 0;
        let event = StreamEvent::ConnectRequested {
            endpoint: url.to_string(),
        };
        let effects = apply(&self.session, event, || {
            current = generation.fetch_add(1, Ordering::AcqRel) + 1;
            true
        })
        .unwrap_or_default();
        engine_info!("stream connecting to {}", url);
        for effect in effects {
            match effect {
                StreamEffect::CloseChannel => self.close_channel(),
                StreamEffect::OpenChannel { .. } => self.open_channel(current, url.clone()),
            }
        }
    }

    /// Safe to call in any state.
    pub fn disconnect(&self) {
        let generation = &self.generation;
        let effects = apply(&self.session, StreamEvent::DisconnectRequested, || {
            generation.fetch_add(1, Ordering::AcqRel);
            true
        })
        .unwrap_or_default();
        if effects.contains(&StreamEffect::CloseChannel) {
            engine_info!("stream disconnected by caller");
        }
        self.close_channel();
    }

    pub fn session(&self) -> StreamSession {
        self.session.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<StreamSession> {
        self.session.subscribe()
    }

    /// Waits until the session leaves the open states.
    pub async fn wait_until_finished(&self) -> StreamSession {
        let mut receiver = self.subscribe();
        // Bound to a local so the watch `Ref` is released before `receiver`.
        let finished = match receiver.wait_for(|session| !session.state().is_open()).await {
            Ok(session) => session.clone(),
            Err(_) => self.session(),
        };
        finished
    }

    fn open_channel(&self, generation: u64, url: Url) {
        self.close_channel();
        let channel = Channel {
            session: self.session.clone(),
            generation: self.generation.clone(),
            mine: generation,
        };
        let connector = self.connector.clone();
        let task = tokio::spawn(async move { channel.run(connector, url).await });
        *self.lock_channel() = Some(task);
    }

    fn close_channel(&self) {
        if let Some(task) = self.lock_channel().take() {
            task.abort();
        }
    }

    fn lock_channel(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.channel.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for StreamConsumer {
    fn drop(&mut self) {
        self.close_channel();
    }
}

struct Channel {
    session: Arc<watch::Sender<StreamSession>>,
    generation: Arc<AtomicU64>,
    mine: u64,
}

impl Channel {
    fn apply(&self, event: StreamEvent) -> Option<Vec<StreamEffect>> {
        apply(&self.session, event, || {
            self.generation.load(Ordering::Acquire) == self.mine
        })
    }

    async fn run(self, connector: Arc<dyn StreamConnector>, url: Url) {
        let mut frames = match connector.open(&url).await {
            Ok(frames) => frames,
            Err(err) => {
                engine_warn!("stream connect to {} failed: {}", url, err);
                self.apply(StreamEvent::ConnectFailed {
                    reason: err.to_string(),
                });
                return;
            }
        };
        if self.apply(StreamEvent::Opened).is_none() {
            return;
        }
        engine_info!("stream connected to {}", url);

        while let Some(frame) = frames.next().await {
            let text = match frame {
                Ok(text) => text,
                Err(err) => {
                    engine_warn!("stream transport error: {}", err);
                    break;
                }
            };
            let message = match StreamMessage::parse(&text) {
                Ok(message) => message,
                Err(err) => {
                    engine_warn!("ignoring unparseable stream frame: {}", err);
                    continue;
                }
            };
            let Some(effects) = self.apply(StreamEvent::Message(message)) else {
                return;
            };
            if effects.contains(&StreamEffect::CloseChannel) {
                let state = self.session.borrow().state();
                engine_info!("stream finished as {:?}", state);
                return;
            }
        }

        if self.apply(StreamEvent::Closed).is_some() {
            engine_debug!("stream to {} closed before completion", url);
        }
    }
}
