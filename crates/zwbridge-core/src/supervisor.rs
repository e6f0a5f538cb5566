// ── Connection supervisor ──
//
// Owns the single logical connection to the controller port. Connect
// and disconnect requests are serialized here, and at most one connect
// attempt is in flight at any time. Each attempt is observable through
// a `Rendezvous` that settles when the driver reports ready or failed.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use zwbridge_api::{Driver, DriverCommand, NetworkId};

use crate::error::CoreError;

// ── ConnectionState ──────────────────────────────────────────────────

/// Connection state observable by consumers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting {
        port: String,
    },
    Connected {
        port: Option<String>,
        network_id: NetworkId,
    },
    Failed {
        port: Option<String>,
    },
}

// ── Rendezvous ───────────────────────────────────────────────────────

/// Why a connect attempt did not succeed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptError {
    /// The driver reported failure.
    Failed { port: String },
    /// The attempt was abandoned by a disconnect or shutdown.
    Cancelled { port: String },
}

impl From<AttemptError> for CoreError {
    fn from(err: AttemptError) -> Self {
        match err {
            AttemptError::Failed { port } => CoreError::ConnectionFailed { port },
            AttemptError::Cancelled { port } => CoreError::ConnectionCancelled { port },
        }
    }
}

/// Outcome of a connect attempt so far.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptState {
    Pending,
    Resolved(NetworkId),
    Rejected(AttemptError),
}

impl AttemptState {
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }
}

/// Completion handle for one connect attempt.
///
/// Clones observe the same attempt.
#[derive(Debug, Clone)]
pub struct Rendezvous {
    port: String,
    rx: watch::Receiver<AttemptState>,
}

impl Rendezvous {
    /// Port the attempt was issued for.
    pub fn port(&self) -> &str {
        &self.port
    }

    /// Peek at the current outcome without waiting.
    pub fn state(&self) -> AttemptState {
        self.rx.borrow().clone()
    }

    /// Wait for the attempt to settle.
    pub async fn wait(mut self) -> Result<NetworkId, CoreError> {
        let settled = self
            .rx
            .wait_for(|state| !state.is_pending())
            .await
            .map(|state| state.clone());

        match settled {
            Ok(AttemptState::Resolved(network_id)) => Ok(network_id),
            Ok(AttemptState::Rejected(e)) => Err(e.into()),
            // Sender dropped while pending: nobody will ever settle it.
            Ok(AttemptState::Pending) | Err(_) => {
                Err(CoreError::ConnectionCancelled { port: self.port })
            }
        }
    }
}

/// The in-flight attempt, owned by the supervisor.
struct PendingAttempt {
    port: String,
    tx: watch::Sender<AttemptState>,
}

impl PendingAttempt {
    fn new(port: String) -> (Self, Rendezvous) {
        let (tx, rx) = watch::channel(AttemptState::Pending);
        let rendezvous = Rendezvous {
            port: port.clone(),
            rx,
        };
        (Self { port, tx }, rendezvous)
    }

    fn rendezvous(&self) -> Rendezvous {
        Rendezvous {
            port: self.port.clone(),
            rx: self.tx.subscribe(),
        }
    }

    fn settle(self, outcome: AttemptState) {
        self.tx.send_replace(outcome);
    }
}

// ── ConnectStatus ────────────────────────────────────────────────────

/// Result of a connect request.
#[derive(Debug, Clone)]
pub enum ConnectStatus {
    /// Already connected to the configured port.
    Connected { port: String, network_id: NetworkId },
    /// An attempt is in flight.
    Pending(Rendezvous),
    /// A port is configured but nothing is connected or in flight.
    Disconnected,
    /// No port configured; the driver was not contacted.
    Unconfigured,
}

impl ConnectStatus {
    /// Wait until the status settles. `Ok(None)` when there is nothing
    /// to wait for and no connection.
    pub async fn wait(self) -> Result<Option<NetworkId>, CoreError> {
        match self {
            Self::Connected { network_id, .. } => Ok(Some(network_id)),
            Self::Pending(rendezvous) => rendezvous.wait().await.map(Some),
            Self::Disconnected | Self::Unconfigured => Ok(None),
        }
    }
}

// ── ConnectionSupervisor ─────────────────────────────────────────────

#[derive(Default)]
struct SupervisorState {
    configured_port: Option<String>,
    active_port: Option<String>,
    connected: bool,
    network_id: Option<NetworkId>,
    pending: Option<PendingAttempt>,
}

impl SupervisorState {
    fn connected_status(&self) -> Option<ConnectStatus> {
        match (&self.active_port, &self.configured_port) {
            (Some(active), Some(configured)) if self.connected && active == configured => {
                Some(ConnectStatus::Connected {
                    port: active.clone(),
                    network_id: self.network_id.unwrap_or_default(),
                })
            }
            _ => None,
        }
    }
}

/// Sole mutator of the connection: configured and active port, the
/// connected flag, and the pending attempt.
pub struct ConnectionSupervisor {
    driver: Arc<dyn Driver>,
    state: Mutex<SupervisorState>,
    connection_state: watch::Sender<ConnectionState>,
}

impl ConnectionSupervisor {
    pub fn new(driver: Arc<dyn Driver>) -> Self {
        let (connection_state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            driver,
            state: Mutex::new(SupervisorState::default()),
            connection_state,
        }
    }

    // ── Requests ─────────────────────────────────────────────────────

    /// Record the port to connect to, without contacting the driver.
    pub fn set_configured_port(&self, port: Option<String>) {
        self.lock().configured_port = port;
    }

    /// Connect to `port`. A no-op when already connected to it.
    pub fn request_connect(&self, port: impl Into<String>) -> Result<ConnectStatus, CoreError> {
        let port = port.into();
        let mut st = self.lock();
        if st.configured_port.as_deref() == Some(port.as_str()) {
            if let Some(status) = st.connected_status() {
                debug!(port = %port, "already connected");
                return Ok(status);
            }
        }
        st.configured_port = Some(port);
        self.reconcile_locked(&mut st)
    }

    /// Drive the connection toward the configured port.
    pub fn reconcile(&self) -> Result<ConnectStatus, CoreError> {
        let mut st = self.lock();
        self.reconcile_locked(&mut st)
    }

    /// Current status, without contacting the driver.
    pub fn current(&self) -> ConnectStatus {
        let st = self.lock();
        if let Some(pending) = &st.pending {
            return ConnectStatus::Pending(pending.rendezvous());
        }
        if let Some(status) = st.connected_status() {
            return status;
        }
        if st.configured_port.is_some() {
            ConnectStatus::Disconnected
        } else {
            ConnectStatus::Unconfigured
        }
    }

    /// Reject the in-flight attempt, if any. Returns whether there was one.
    pub fn cancel_pending(&self) -> bool {
        let pending = self.lock().pending.take();
        match pending {
            Some(pending) => {
                info!(port = %pending.port, "cancelling pending connection attempt");
                let port = pending.port.clone();
                pending.settle(AttemptState::Rejected(AttemptError::Cancelled { port }));
                true
            }
            None => false,
        }
    }

    /// Cancel any attempt and close the active port. Returns the port
    /// that was closed.
    pub fn disconnect(&self) -> Option<String> {
        self.cancel_pending();

        let mut st = self.lock();
        st.connected = false;
        st.network_id = None;
        let port = st.active_port.take();
        if let Some(port) = &port {
            info!(port = %port, "disconnecting");
            self.send_disconnect(port);
        }
        self.publish(ConnectionState::Disconnected);
        port
    }

    // ── Driver events ────────────────────────────────────────────────

    pub fn on_driver_ready(&self, network_id: NetworkId) {
        let mut guard = self.lock();
        let st = &mut *guard;
        st.connected = true;
        st.network_id = Some(network_id);
        if st.active_port.is_none() {
            // The driver came up without a request from us.
            st.active_port.clone_from(&st.configured_port);
        }
        if let Some(pending) = st.pending.take() {
            pending.settle(AttemptState::Resolved(network_id));
        }

        info!(network_id = %network_id, port = ?st.active_port, "driver ready");
        self.publish(ConnectionState::Connected {
            port: st.active_port.clone(),
            network_id,
        });

        // The configured port moved while the attempt was in flight.
        if st.configured_port.is_some() && st.configured_port != st.active_port {
            info!(port = ?st.configured_port, "configured port changed, reconnecting");
            if let Err(e) = self.reconcile_locked(st) {
                warn!(error = %e, "reconnect to configured port failed");
            }
        }
    }

    pub fn on_driver_failed(&self) {
        let mut st = self.lock();
        st.connected = false;
        st.network_id = None;

        if let Some(pending) = st.pending.take() {
            warn!(port = %pending.port, "driver failed to start");
            if st.active_port.as_deref() == Some(pending.port.as_str()) {
                st.active_port = None;
            }
            self.send_disconnect(&pending.port);
            let port = pending.port.clone();
            pending.settle(AttemptState::Rejected(AttemptError::Failed { port }));
        } else {
            warn!(port = ?st.active_port, "driver failed");
        }

        self.publish(ConnectionState::Failed {
            port: st.active_port.clone().or_else(|| st.configured_port.clone()),
        });
    }

    // ── Accessors ────────────────────────────────────────────────────

    pub fn is_connected(&self) -> bool {
        self.lock().connected
    }

    pub fn configured_port(&self) -> Option<String> {
        self.lock().configured_port.clone()
    }

    pub fn active_port(&self) -> Option<String> {
        self.lock().active_port.clone()
    }

    pub fn network_id(&self) -> Option<NetworkId> {
        self.lock().network_id
    }

    pub fn has_pending(&self) -> bool {
        self.lock().pending.is_some()
    }

    /// Subscribe to connection state changes.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.connection_state.subscribe()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection_state.borrow().clone()
    }

    // ── Private helpers ──────────────────────────────────────────────

    fn lock(&self) -> MutexGuard<'_, SupervisorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn reconcile_locked(&self, st: &mut SupervisorState) -> Result<ConnectStatus, CoreError> {
        if let Some(pending) = &st.pending {
            return Ok(ConnectStatus::Pending(pending.rendezvous()));
        }
        if let Some(status) = st.connected_status() {
            return Ok(status);
        }

        if let Some(old) = st.active_port.take() {
            info!(port = %old, "closing previous port");
            st.connected = false;
            st.network_id = None;
            self.send_disconnect(&old);
        }

        let Some(port) = st.configured_port.clone() else {
            debug!("no port configured");
            self.publish(ConnectionState::Disconnected);
            return Ok(ConnectStatus::Unconfigured);
        };

        info!(port = %port, "connecting");
        self.driver.send(DriverCommand::Connect { port: port.clone() })?;
        st.active_port = Some(port.clone());

        let (pending, rendezvous) = PendingAttempt::new(port.clone());
        st.pending = Some(pending);
        self.publish(ConnectionState::Connecting { port });
        Ok(ConnectStatus::Pending(rendezvous))
    }

    fn send_disconnect(&self, port: &str) {
        if let Err(e) = self.driver.send(DriverCommand::Disconnect {
            port: port.to_owned(),
        }) {
            warn!(port, error = %e, "disconnect command not delivered");
        }
    }

    fn publish(&self, state: ConnectionState) {
        self.connection_state.send_replace(state);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct Recorder {
        sent: StdMutex<Vec<DriverCommand>>,
    }

    impl Recorder {
        fn take(&self) -> Vec<DriverCommand> {
            std::mem::take(&mut *self.sent.lock().unwrap())
        }
    }

    impl Driver for Recorder {
        fn send(&self, command: DriverCommand) -> Result<(), zwbridge_api::Error> {
            self.sent.lock().unwrap().push(command);
            Ok(())
        }
    }

    fn supervisor() -> (ConnectionSupervisor, Arc<Recorder>) {
        let driver = Arc::new(Recorder::default());
        (ConnectionSupervisor::new(driver.clone()), driver)
    }

    fn connect(port: &str) -> DriverCommand {
        DriverCommand::Connect { port: port.into() }
    }

    fn disconnect(port: &str) -> DriverCommand {
        DriverCommand::Disconnect { port: port.into() }
    }

    #[test]
    fn unconfigured_reconcile_does_no_io() {
        let (sup, driver) = supervisor();
        assert!(matches!(sup.reconcile().unwrap(), ConnectStatus::Unconfigured));
        assert!(driver.take().is_empty());
    }

    #[test]
    fn pending_attempt_is_shared() {
        let (sup, driver) = supervisor();
        let first = sup.request_connect("/dev/ttyACM0").unwrap();
        let second = sup.reconcile().unwrap();

        assert!(matches!(first, ConnectStatus::Pending(_)));
        assert!(matches!(second, ConnectStatus::Pending(ref r) if r.port() == "/dev/ttyACM0"));
        assert_eq!(driver.take(), vec![connect("/dev/ttyACM0")]);
        assert!(sup.has_pending());
    }

    #[tokio::test]
    async fn ready_resolves_and_second_request_is_idle() {
        let (sup, driver) = supervisor();
        let ConnectStatus::Pending(rendezvous) = sup.request_connect("/dev/ttyACM0").unwrap() else {
            panic!("expected pending");
        };

        sup.on_driver_ready(NetworkId(0x1234));
        assert_eq!(rendezvous.wait().await.unwrap(), NetworkId(0x1234));
        assert!(sup.is_connected());
        driver.take();

        let again = sup.request_connect("/dev/ttyACM0").unwrap();
        assert!(matches!(again, ConnectStatus::Connected { .. }));
        assert!(driver.take().is_empty());
    }

    #[tokio::test]
    async fn failure_rejects_and_disconnects_attempted_port() {
        let (sup, driver) = supervisor();
        let ConnectStatus::Pending(rendezvous) = sup.request_connect("/dev/ttyUSB0").unwrap() else {
            panic!("expected pending");
        };

        sup.on_driver_failed();
        let err = rendezvous.wait().await.unwrap_err();
        assert!(matches!(err, CoreError::ConnectionFailed { ref port } if port == "/dev/ttyUSB0"));
        assert!(!sup.is_connected());
        assert!(!sup.has_pending());
        assert_eq!(
            driver.take(),
            vec![connect("/dev/ttyUSB0"), disconnect("/dev/ttyUSB0")]
        );
        assert_eq!(
            sup.connection_state(),
            ConnectionState::Failed {
                port: Some("/dev/ttyUSB0".into())
            }
        );
    }

    #[test]
    fn failure_without_attempt_only_clears_connected() {
        let (sup, driver) = supervisor();
        sup.on_driver_failed();
        assert!(!sup.is_connected());
        assert!(driver.take().is_empty());
    }

    #[tokio::test]
    async fn disconnect_cancels_pending_attempt() {
        let (sup, driver) = supervisor();
        let ConnectStatus::Pending(rendezvous) = sup.request_connect("/dev/ttyACM0").unwrap() else {
            panic!("expected pending");
        };

        assert_eq!(sup.disconnect().as_deref(), Some("/dev/ttyACM0"));
        let err = rendezvous.wait().await.unwrap_err();
        assert!(matches!(err, CoreError::ConnectionCancelled { .. }));
        assert_eq!(
            driver.take(),
            vec![connect("/dev/ttyACM0"), disconnect("/dev/ttyACM0")]
        );
        assert_eq!(sup.connection_state(), ConnectionState::Disconnected);
    }

    #[test]
    fn port_change_closes_old_port_first() {
        let (sup, driver) = supervisor();
        sup.request_connect("/dev/ttyACM0").unwrap();
        sup.on_driver_ready(NetworkId(1));
        driver.take();

        let status = sup.request_connect("/dev/ttyACM1").unwrap();
        assert!(matches!(status, ConnectStatus::Pending(_)));
        assert_eq!(
            driver.take(),
            vec![disconnect("/dev/ttyACM0"), connect("/dev/ttyACM1")]
        );
        assert!(!sup.is_connected());
    }

    #[test]
    fn ready_with_stale_port_reconnects_to_configured() {
        let (sup, driver) = supervisor();
        sup.request_connect("/dev/ttyACM0").unwrap();
        // Port changes while the first attempt is still in flight.
        let status = sup.request_connect("/dev/ttyACM1").unwrap();
        assert!(matches!(status, ConnectStatus::Pending(ref r) if r.port() == "/dev/ttyACM0"));

        sup.on_driver_ready(NetworkId(1));
        assert_eq!(
            driver.take(),
            vec![
                connect("/dev/ttyACM0"),
                disconnect("/dev/ttyACM0"),
                connect("/dev/ttyACM1"),
            ]
        );
        assert!(sup.has_pending());
        assert_eq!(sup.active_port().as_deref(), Some("/dev/ttyACM1"));
    }

    #[test]
    fn current_reports_without_io() {
        let (sup, driver) = supervisor();
        assert!(matches!(sup.current(), ConnectStatus::Unconfigured));
        sup.set_configured_port(Some("/dev/ttyACM0".into()));
        assert!(matches!(sup.current(), ConnectStatus::Disconnected));
        assert!(driver.take().is_empty());
    }
}
