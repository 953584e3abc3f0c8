//! Socket.IO connection loop
//!
//! Connection sequence per attempt:
//! 1. Open the websocket at `/socket.io/?EIO=4&transport=websocket`
//! 2. Wait for the Engine.IO open packet (ping interval and timeout)
//! 3. Send the namespace connect (`40`) and wait for its ack
//! 4. Emit `join` with the user id when one is known
//! 5. Answer pings and dispatch events until the connection ends
//!
//! Failed attempts are retried a bounded number of times with a fixed delay.
//! The budget is restored after every successful connect. When it runs out
//! the channel gives up quietly; the upload phase keeps working without it.

use chlb_common::config::RealtimeConfig;
use chlb_common::events::ChannelStatus;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, Stream, StreamExt};
use serde_json::Value;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::packet::{EnginePacket, OpenHandshake, SocketPacket, DEFAULT_NAMESPACE};
use super::ChannelError;
use crate::models::decode_signal;
use crate::tracker::UploadProgressTracker;

const SOCKET_IO_PATH: &str = "/socket.io/?EIO=4&transport=websocket";
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(20);
const JOIN_EVENT: &str = "join";

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

/// Build the Socket.IO websocket URL from the REST base URL
pub fn websocket_url(api_url: &str) -> Result<String, ChannelError> {
    let trimmed = api_url.trim().trim_end_matches('/');
    let base = if let Some(rest) = trimmed.strip_prefix("https://") {
        format!("wss://{}", rest)
    } else if let Some(rest) = trimmed.strip_prefix("http://") {
        format!("ws://{}", rest)
    } else {
        return Err(ChannelError::InvalidUrl(api_url.to_string()));
    };
    Ok(format!("{}{}", base, SOCKET_IO_PATH))
}

/// Real-time channel feeding one tracker
pub struct RealtimeChannel {
    url: String,
    user_id: Option<String>,
    config: RealtimeConfig,
    tracker: UploadProgressTracker,
    cancel: CancellationToken,
}

impl RealtimeChannel {
    pub fn new(
        api_url: &str,
        user_id: Option<String>,
        config: RealtimeConfig,
        tracker: UploadProgressTracker,
    ) -> Result<Self, ChannelError> {
        let cancel = tracker.cancellation_token();
        Ok(Self {
            url: websocket_url(api_url)?,
            user_id,
            config,
            tracker,
            cancel,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Connect, serve and reconnect until cancelled or out of retries
    pub async fn run(self) {
        let mut retries_left = self.config.reconnection_attempts;
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            self.tracker
                .publish_channel_status(ChannelStatus::Connecting, attempt);

            let mut connected = false;
            let result = self.serve(&mut connected).await;

            if self.cancel.is_cancelled() {
                debug!("Real-time channel stopped");
                return;
            }

            match result {
                Ok(()) => info!("Real-time channel closed by server"),
                Err(e) => warn!(attempt, "Real-time channel error: {}", e),
            }
            self.tracker
                .publish_channel_status(ChannelStatus::Disconnected, 0);

            if connected {
                retries_left = self.config.reconnection_attempts;
                attempt = 0;
            }

            if retries_left == 0 {
                warn!(
                    "Real-time channel unavailable after {} reconnection attempts; \
                     processing updates will not be received",
                    self.config.reconnection_attempts
                );
                self.tracker
                    .publish_channel_status(ChannelStatus::Abandoned, 0);
                return;
            }
            retries_left -= 1;

            tokio::select! {
                _ = self.cancel.cancelled() => return,
                _ = tokio::time::sleep(self.config.reconnection_delay()) => {}
            }
        }
    }

    /// One connection lifetime
    ///
    /// Sets `connected` once the namespace connect is acknowledged. Returns
    /// `Ok(())` when the server or the tracker ends the session cleanly.
    /// Cancellation while connected sends the namespace disconnect first.
    async fn serve(&self, connected: &mut bool) -> Result<(), ChannelError> {
        let (mut sink, mut stream, handshake) = tokio::select! {
            _ = self.cancel.cancelled() => {
                debug!("Real-time channel cancelled while connecting");
                return Ok(());
            }
            negotiated = self.negotiate() => negotiated?,
        };
        let liveness = handshake.liveness_timeout();

        *connected = true;
        info!(sid = %handshake.sid, "Real-time channel connected");
        self.tracker
            .publish_channel_status(ChannelStatus::Connected, 0);

        // Join the notification room
        match &self.user_id {
            Some(user_id) => {
                let join = SocketPacket::event(JOIN_EVENT, vec![Value::String(user_id.clone())]);
                sink.send(Message::Text(join.to_frame())).await?;
                info!(user_id = %user_id, "Joined notification room");
            }
            None => debug!("Anonymous session; not joining a notification room"),
        }

        // Serve
        loop {
            let text = tokio::select! {
                _ = self.cancel.cancelled() => {
                    let disconnect = SocketPacket::Disconnect {
                        namespace: DEFAULT_NAMESPACE.to_string(),
                    };
                    let _ = sink.send(Message::Text(disconnect.to_frame())).await;
                    let _ = sink.send(Message::Close(None)).await;
                    return Ok(());
                }
                text = next_text(&mut stream, liveness) => text?,
            };

            let packet = match EnginePacket::decode(&text) {
                Ok(packet) => packet,
                Err(e) => {
                    warn!("Dropping malformed frame: {}", e);
                    continue;
                }
            };

            match packet {
                EnginePacket::Ping(data) => {
                    sink.send(Message::Text(EnginePacket::Pong(data).encode()))
                        .await?;
                }
                EnginePacket::Message(body) => match SocketPacket::decode(&body) {
                    Ok(SocketPacket::Event {
                        namespace,
                        name,
                        args,
                        ..
                    }) if namespace == DEFAULT_NAMESPACE => {
                        self.dispatch(&name, args).await;
                    }
                    Ok(SocketPacket::Disconnect { namespace }) if namespace == DEFAULT_NAMESPACE => {
                        return Ok(());
                    }
                    Ok(other) => debug!("Ignoring packet: {:?}", other),
                    Err(e) => warn!("Dropping malformed packet: {}", e),
                },
                EnginePacket::Close => return Ok(()),
                EnginePacket::Open(_)
                | EnginePacket::Pong(_)
                | EnginePacket::Upgrade
                | EnginePacket::Noop => {}
            }
        }
    }

    /// Open the websocket and complete the Engine.IO and namespace handshakes
    async fn negotiate(&self) -> Result<(WsSink, WsSource, OpenHandshake), ChannelError> {
        debug!(url = %self.url, "Connecting real-time channel");

        let (ws, _response) =
            tokio::time::timeout(HANDSHAKE_TIMEOUT, tokio_tungstenite::connect_async(self.url.as_str()))
                .await
                .map_err(|_| ChannelError::Timeout(HANDSHAKE_TIMEOUT.as_millis() as u64))??;
        let (mut sink, mut stream) = ws.split();

        // Engine.IO open packet
        let handshake = loop {
            let text = next_text(&mut stream, HANDSHAKE_TIMEOUT).await?;
            match EnginePacket::decode(&text)? {
                EnginePacket::Open(handshake) => break handshake,
                EnginePacket::Noop => continue,
                other => {
                    return Err(ChannelError::Handshake(format!(
                        "expected open packet, got {:?}",
                        other
                    )))
                }
            }
        };

        // Namespace connect
        sink.send(Message::Text(SocketPacket::connect().to_frame()))
            .await?;
        loop {
            let text = next_text(&mut stream, HANDSHAKE_TIMEOUT).await?;
            match EnginePacket::decode(&text)? {
                EnginePacket::Ping(data) => {
                    sink.send(Message::Text(EnginePacket::Pong(data).encode()))
                        .await?;
                }
                EnginePacket::Message(body) => match SocketPacket::decode(&body)? {
                    SocketPacket::Connect { namespace, .. } if namespace == DEFAULT_NAMESPACE => {
                        break
                    }
                    SocketPacket::ConnectError { data, .. } => {
                        return Err(ChannelError::Handshake(format!(
                            "namespace connect refused: {}",
                            data.map(|d| d.to_string()).unwrap_or_default()
                        )))
                    }
                    other => debug!("Ignoring packet before connect ack: {:?}", other),
                },
                EnginePacket::Close => return Err(ChannelError::Closed),
                _ => {}
            }
        }

        Ok((sink, stream, handshake))
    }

    /// Route one event through the signal table into the tracker
    async fn dispatch(&self, event: &str, args: Vec<Value>) {
        let payload = args.into_iter().next().unwrap_or(Value::Null);
        match decode_signal(event, payload) {
            Ok(Some(signal)) => {
                self.tracker.apply_signal(signal).await;
            }
            Ok(None) => debug!(event = %event, "Ignoring unhandled event"),
            Err(e) => warn!("{}", e),
        }
    }
}

/// Next text frame, skipping control and binary frames
async fn next_text<S>(stream: &mut S, wait: Duration) -> Result<String, ChannelError>
where
    S: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
{
    loop {
        let frame = tokio::time::timeout(wait, stream.next())
            .await
            .map_err(|_| ChannelError::Timeout(wait.as_millis() as u64))?;

        match frame {
            None => return Err(ChannelError::Closed),
            Some(Err(e)) => return Err(e.into()),
            Some(Ok(Message::Text(text))) => return Ok(text),
            Some(Ok(Message::Close(_))) => return Err(ChannelError::Closed),
            Some(Ok(_)) => continue,
        }
    }
}
