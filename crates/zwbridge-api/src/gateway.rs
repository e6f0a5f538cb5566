//! WebSocket driver gateway with auto-reconnect.
//!
//! Talks to a driver gateway process that owns the serial controller.
//! Commands are written as JSON text frames; every inbound text frame is
//! one [`DriverEvent`]. Events are forwarded through a bounded `mpsc`
//! channel so arrival order is preserved end to end.
//!
//! When the gateway link goes down the loop emits a synthetic
//! [`DriverEvent::DriverFailed`], so consumers see `connected = false`
//! instead of an error from some unrelated call.
//!
//! # Example
//!
//! ```rust,ignore
//! use zwbridge_api::{Driver, DriverCommand, GatewayDriver, ReconnectConfig};
//! use tokio_util::sync::CancellationToken;
//! use url::Url;
//!
//! let url = Url::parse("ws://127.0.0.1:3000")?;
//! let (driver, mut events) =
//!     GatewayDriver::spawn(url, ReconnectConfig::default(), CancellationToken::new());
//!
//! driver.send(DriverCommand::Connect { port: "/dev/ttyACM0".into() })?;
//! while let Some(event) = events.recv().await {
//!     println!("{}", event.kind());
//! }
//! ```

use std::time::Duration;

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::command::{Driver, DriverCommand};
use crate::error::Error;
use crate::event::DriverEvent;

// ── Channel capacity ─────────────────────────────────────────────────

const EVENT_CHANNEL_CAPACITY: usize = 1024;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsWrite = SplitSink<WsStream, Message>;

// ── ReconnectConfig ──────────────────────────────────────────────────

/// Exponential backoff configuration for gateway reconnection.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Delay before the first reconnection attempt. Default: 1s.
    pub initial_delay: Duration,

    /// Upper bound on backoff delay. Default: 30s.
    pub max_delay: Duration,

    /// Maximum reconnection attempts before giving up.
    /// `None` means retry forever.
    pub max_retries: Option<u32>,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_retries: None,
        }
    }
}

// ── GatewayDriver ────────────────────────────────────────────────────

/// [`Driver`] backed by a WebSocket link to a driver gateway.
///
/// Commands are queued on an unbounded channel and written once the
/// link is up; a command whose write fails is retried on the next
/// connection.
pub struct GatewayDriver {
    command_tx: mpsc::UnboundedSender<DriverCommand>,
    cancel: CancellationToken,
    /// Cancelled when the background loop has exited.
    finished: CancellationToken,
}

impl GatewayDriver {
    /// Spawn the connection loop and return the driver plus its event stream.
    ///
    /// Returns immediately; the first connection attempt happens in the
    /// background. Must be called from within a Tokio runtime.
    pub fn spawn(
        url: Url,
        reconnect: ReconnectConfig,
        cancel: CancellationToken,
    ) -> (Self, mpsc::Receiver<DriverEvent>) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

        let finished = CancellationToken::new();
        let task_cancel = cancel.clone();
        let done = finished.clone().drop_guard();
        tokio::spawn(async move {
            let _done = done;
            gateway_loop(url, command_rx, event_tx, reconnect, task_cancel).await;
        });

        (
            Self {
                command_tx,
                cancel,
                finished,
            },
            event_rx,
        )
    }

    /// Signal the background task to shut down gracefully.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Resolves once the background task has exited, after the final
    /// flush of queued commands.
    pub async fn closed(&self) {
        self.finished.cancelled().await;
    }
}

impl Driver for GatewayDriver {
    fn send(&self, command: DriverCommand) -> Result<(), Error> {
        if self.cancel.is_cancelled() {
            return Err(Error::Closed);
        }
        tracing::trace!(command = command.kind(), "queueing driver command");
        self.command_tx.send(command).map_err(|_| Error::Closed)
    }
}

// ── Frame codec ──────────────────────────────────────────────────────

/// Decode one inbound text frame.
pub fn decode_frame(text: &str) -> Result<DriverEvent, Error> {
    serde_json::from_str(text).map_err(|e| Error::Decode {
        message: e.to_string(),
        frame: text.to_owned(),
    })
}

/// Encode one outbound command as a text frame.
pub fn encode_command(command: &DriverCommand) -> Result<String, Error> {
    serde_json::to_string(command).map_err(Error::Encode)
}

// ── Background reconnection loop ─────────────────────────────────────

enum SessionEnd {
    Cancelled,
    Closed,
    /// Nobody is listening for events anymore.
    Abandoned,
}

/// Main loop: connect → pump frames → on error, backoff → reconnect.
async fn gateway_loop(
    url: Url,
    mut command_rx: mpsc::UnboundedReceiver<DriverCommand>,
    event_tx: mpsc::Sender<DriverEvent>,
    reconnect: ReconnectConfig,
    cancel: CancellationToken,
) {
    let mut attempt: u32 = 0;
    let mut unsent: Option<DriverCommand> = None;
    // None until the first attempt, so a failing first attempt is reported too.
    let mut link_up: Option<bool> = None;

    loop {
        let opened = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            result = open(&url) => result,
        };

        match opened {
            Ok(ws) => {
                attempt = 0;
                link_up = Some(true);

                match pump(ws, &mut command_rx, &event_tx, &cancel, &mut unsent).await {
                    Ok(SessionEnd::Cancelled | SessionEnd::Abandoned) => break,
                    Ok(SessionEnd::Closed) => {
                        tracing::info!("gateway closed the connection, reconnecting");
                    }
                    Err(e) => tracing::warn!(error = %e, "gateway connection lost"),
                }

                link_up = Some(false);
                if !report_link_down(&event_tx).await {
                    break;
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, attempt, "gateway connection failed");

                if link_up != Some(false) {
                    link_up = Some(false);
                    if !report_link_down(&event_tx).await {
                        break;
                    }
                }

                if let Some(max) = reconnect.max_retries {
                    if attempt >= max {
                        tracing::error!(
                            max_retries = max,
                            "gateway reconnection limit reached, giving up"
                        );
                        break;
                    }
                }

                let delay = calculate_backoff(attempt, &reconnect);
                tracing::info!(
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    attempt,
                    "waiting before reconnect"
                );

                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    () = tokio::time::sleep(delay) => {}
                }

                attempt += 1;
            }
        }
    }

    tracing::debug!("gateway loop exiting");
}

/// Forward a synthetic `DriverFailed`. Returns `false` if the receiver is gone.
async fn report_link_down(event_tx: &mpsc::Sender<DriverEvent>) -> bool {
    event_tx.send(DriverEvent::DriverFailed).await.is_ok()
}

async fn open(url: &Url) -> Result<WsStream, Error> {
    tracing::info!(url = %url, "connecting to driver gateway");

    let (ws, _response) = tokio_tungstenite::connect_async(url.as_str())
        .await
        .map_err(|e| Error::WebSocketConnect(e.to_string()))?;

    tracing::info!("driver gateway connected");
    Ok(ws)
}

// ── Single connection lifecycle ──────────────────────────────────────

/// Shuttle frames in both directions until the link drops.
async fn pump(
    ws: WsStream,
    command_rx: &mut mpsc::UnboundedReceiver<DriverCommand>,
    event_tx: &mpsc::Sender<DriverEvent>,
    cancel: &CancellationToken,
    unsent: &mut Option<DriverCommand>,
) -> Result<SessionEnd, Error> {
    let (mut write, mut read) = ws.split();

    if let Some(command) = unsent.take() {
        write_command(&mut write, command, unsent).await?;
    }

    let mut commands_open = true;

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                // Commands queued before shutdown still go out.
                while let Ok(command) = command_rx.try_recv() {
                    if write_command(&mut write, command, unsent).await.is_err() {
                        break;
                    }
                }
                let _ = write.send(Message::Close(None)).await;
                return Ok(SessionEnd::Cancelled);
            }
            frame = read.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => match decode_frame(&text) {
                        Ok(event) => {
                            tracing::trace!(event = event.kind(), "driver event");
                            if event_tx.send(event).await.is_err() {
                                return Ok(SessionEnd::Abandoned);
                            }
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "skipping undecodable gateway frame");
                        }
                    },
                    Some(Ok(Message::Ping(_))) => {
                        // tungstenite answers pings itself
                        tracing::trace!("gateway ping");
                    }
                    Some(Ok(Message::Close(frame))) => {
                        if let Some(ref cf) = frame {
                            tracing::info!(
                                code = %cf.code,
                                reason = %cf.reason,
                                "gateway close frame received"
                            );
                        }
                        return Ok(SessionEnd::Closed);
                    }
                    Some(Err(e)) => return Err(map_ws_error(e)),
                    None => {
                        tracing::info!("gateway stream ended");
                        return Ok(SessionEnd::Closed);
                    }
                    Some(Ok(_)) => {
                        // Binary, Pong, Frame -- ignore
                    }
                }
            }
            command = command_rx.recv(), if commands_open => {
                match command {
                    Some(command) => write_command(&mut write, command, unsent).await?,
                    None => {
                        tracing::debug!("all driver handles dropped, reading events only");
                        commands_open = false;
                    }
                }
            }
        }
    }
}

/// Write one command. On a transport failure the command is parked in
/// `unsent` so the next session can deliver it.
async fn write_command(
    write: &mut WsWrite,
    command: DriverCommand,
    unsent: &mut Option<DriverCommand>,
) -> Result<(), Error> {
    let frame = match encode_command(&command) {
        Ok(frame) => frame,
        Err(e) => {
            tracing::warn!(error = %e, command = command.kind(), "dropping unencodable command");
            return Ok(());
        }
    };

    tracing::debug!(command = command.kind(), "sending driver command");
    if let Err(e) = write.send(Message::text(frame)).await {
        *unsent = Some(command);
        return Err(map_ws_error(e));
    }
    Ok(())
}

fn map_ws_error(err: tungstenite::Error) -> Error {
    match err {
        tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
            Error::WebSocketClosed {
                code: 1006,
                reason: err.to_string(),
            }
        }
        other => Error::WebSocketConnect(other.to_string()),
    }
}

// ── Backoff calculation ──────────────────────────────────────────────

/// Exponential backoff with jitter.
///
/// `delay = min(initial * 2^attempt, max) + jitter`
///
/// Jitter is +-25% to spread out reconnection storms.
fn calculate_backoff(attempt: u32, config: &ReconnectConfig) -> Duration {
    let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
    let base = config.initial_delay.as_secs_f64() * 2.0_f64.powi(exponent);
    let capped = base.min(config.max_delay.as_secs_f64());

    // Deterministic jitter seeded from the attempt number.
    let jitter_factor = 1.0 + 0.25 * (f64::from(attempt) * 7.3).sin();
    let with_jitter = (capped * jitter_factor).max(0.0);

    Duration::from_secs_f64(with_jitter)
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::NetworkId;

    #[test]
    fn default_reconnect_config() {
        let config = ReconnectConfig::default();
        assert_eq!(config.initial_delay, Duration::from_secs(1));
        assert_eq!(config.max_delay, Duration::from_secs(30));
        assert!(config.max_retries.is_none());
    }

    #[test]
    fn backoff_grows_and_caps() {
        let config = ReconnectConfig::default();

        let first = calculate_backoff(0, &config);
        assert!(first <= Duration::from_millis(1250));

        let late = calculate_backoff(20, &config);
        assert!(late <= Duration::from_secs_f64(30.0 * 1.25));
        assert!(late >= Duration::from_secs_f64(30.0 * 0.75));
    }

    #[test]
    fn backoff_survives_huge_attempt_counts() {
        let config = ReconnectConfig::default();
        let delay = calculate_backoff(u32::MAX, &config);
        assert!(delay <= Duration::from_secs_f64(30.0 * 1.25));
    }

    #[test]
    fn decode_frame_keeps_raw_text_on_error() {
        let err = decode_frame("{\"event\":").unwrap_err();
        match err {
            Error::Decode { frame, .. } => assert_eq!(frame, "{\"event\":"),
            other => panic!("expected Decode, got {other:?}"),
        }

        let event = decode_frame(r#"{"event":"driver-ready","network_id":7}"#).unwrap();
        assert_eq!(
            event,
            DriverEvent::DriverReady {
                network_id: NetworkId(7)
            }
        );
    }

    #[tokio::test]
    async fn send_after_shutdown_is_rejected() {
        let url = Url::parse("ws://127.0.0.1:9").unwrap();
        let config = ReconnectConfig {
            max_retries: Some(0),
            ..ReconnectConfig::default()
        };
        let (driver, _events) = GatewayDriver::spawn(url, config, CancellationToken::new());

        assert!(driver.send(DriverCommand::WriteConfig).is_ok());
        driver.shutdown();
        assert!(matches!(
            driver.send(DriverCommand::WriteConfig),
            Err(Error::Closed)
        ));

        tokio::time::timeout(Duration::from_secs(5), driver.closed())
            .await
            .unwrap();
    }
}
