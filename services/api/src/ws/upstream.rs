//! Upstream realtime connection plumbing.
//!
//! One long-lived duplex connection per session. The reader half is pumped
//! into an ordered channel by a background task so the relay can select over
//! it; close frames and transport errors surface as a terminal
//! `Disconnected` item. There is no automatic reconnection: a dropped
//! upstream ends the session.

use crate::config::{Config, UpstreamAuth};
use futures_util::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::protocol::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

const EVENT_CHANNEL_CAPACITY: usize = 128;

#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("failed to open upstream connection: {0}")]
    Connect(String),
    #[error("upstream connection lost: {0}")]
    Disconnected(String),
    #[error("failed to send upstream: {0}")]
    Send(String),
}

/// Writer half of the upstream connection.
pub struct UpstreamSink {
    inner: SplitSink<WsStream, WsMessage>,
}

impl UpstreamSink {
    pub async fn send_text(&mut self, text: String) -> Result<(), UpstreamError> {
        self.inner
            .send(WsMessage::Text(text.into()))
            .await
            .map_err(|e| UpstreamError::Send(e.to_string()))
    }

    /// Flushes and closes the connection. Best effort; the session is over
    /// either way.
    pub async fn close(mut self) {
        let _ = self.inner.close().await;
    }
}

/// Reader half, normalized into an ordered stream of text events.
pub struct UpstreamEvents {
    rx: mpsc::Receiver<Result<String, UpstreamError>>,
    reader: JoinHandle<()>,
}

impl UpstreamEvents {
    pub async fn recv(&mut self) -> Option<Result<String, UpstreamError>> {
        self.rx.recv().await
    }

    pub fn abort(&self) {
        self.reader.abort();
    }
}

/// Builds the realtime websocket URL from the configured HTTP(S) endpoint.
pub fn realtime_url(endpoint: &str, path: &str, deployment: &str, api_version: &str) -> String {
    let base = endpoint.trim_end_matches('/');
    let base = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        base.to_string()
    };
    format!("{base}{path}?api-version={api_version}&deployment={deployment}")
}

/// Opens the upstream connection and splits it into sink and event stream.
pub async fn connect(
    config: &Config,
    path: &str,
) -> Result<(UpstreamSink, UpstreamEvents), UpstreamError> {
    let url = realtime_url(
        &config.voice_endpoint,
        path,
        &config.voice_deployment,
        &config.voice_api_version,
    );
    let mut request = url
        .into_client_request()
        .map_err(|e| UpstreamError::Connect(e.to_string()))?;
    let (header, value) = match &config.voice_auth {
        UpstreamAuth::ApiKey(key) => ("api-key", key.clone()),
        UpstreamAuth::Bearer(token) => ("Authorization", format!("Bearer {token}")),
    };
    request.headers_mut().insert(
        header,
        value
            .parse()
            .map_err(|_| UpstreamError::Connect("credential is not a valid header value".into()))?,
    );

    let (stream, _) = connect_async(request)
        .await
        .map_err(|e| UpstreamError::Connect(e.to_string()))?;
    info!("connected to upstream realtime endpoint");
    let (sink, source) = stream.split();

    let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
    let reader = tokio::spawn(pump_events(source, tx));

    Ok((
        UpstreamSink { inner: sink },
        UpstreamEvents { rx, reader },
    ))
}

async fn pump_events(
    mut source: SplitStream<WsStream>,
    tx: mpsc::Sender<Result<String, UpstreamError>>,
) {
    while let Some(frame) = source.next().await {
        match frame {
            Ok(WsMessage::Text(text)) => {
                if tx.send(Ok(text.to_string())).await.is_err() {
                    break;
                }
            }
            Ok(WsMessage::Close(frame)) => {
                let reason = frame
                    .map(|f| f.reason.to_string())
                    .filter(|r| !r.is_empty())
                    .unwrap_or_else(|| "closed by provider".to_string());
                let _ = tx.send(Err(UpstreamError::Disconnected(reason))).await;
                break;
            }
            Ok(other) => {
                debug!(frame = ?other, "ignoring non-text upstream frame");
            }
            Err(e) => {
                let _ = tx
                    .send(Err(UpstreamError::Disconnected(e.to_string())))
                    .await;
                break;
            }
        }
    }
}
