// ── Controller abstraction ──
//
// Composition root of the core: owns the connection supervisor and the
// node registry, consumes the driver's ordered event stream, and exposes
// the connection action surface (connect, add/remove device).

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use zwbridge_api::{Driver, DriverCommand, DriverEvent, NetworkId, NodeId};

use crate::config::ControllerConfig;
use crate::device::DeviceProxy;
use crate::discovery::{DeviceDirectory, Discovery};
use crate::error::CoreError;
use crate::model::NodeState;
use crate::settings::{CONTROLLER_SETTINGS_KEY, ControllerSettings, MemorySettings, SettingsStore};
use crate::store::NodeRegistry;
use crate::stream::EntityStream;
use crate::supervisor::{ConnectStatus, ConnectionState, ConnectionSupervisor};

/// Returned by [`Controller::add_device`].
pub const PAIR_INSTRUCTIONS: &str = "Press inclusion/action button on device to pair";

/// Returned by [`Controller::remove_device`].
pub const REMOVE_INSTRUCTIONS: &str = "Press inclusion/action button on device to remove";

// ── ControllerStatus ─────────────────────────────────────────────────

/// Point-in-time summary of the controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ControllerStatus {
    pub name: String,
    pub configured: bool,
    pub connected: bool,
    /// Configured port.
    pub port: Option<String>,
    /// Port currently open, if any.
    pub active_port: Option<String>,
    pub network_id: Option<NetworkId>,
    pub scan_complete: bool,
    pub node_count: usize,
    pub device_count: usize,
}

// ── Builder ──────────────────────────────────────────────────────────

/// Assembles a [`Controller`] around a driver.
pub struct ControllerBuilder {
    driver: Arc<dyn Driver>,
    config: ControllerConfig,
    settings: Option<Arc<dyn SettingsStore>>,
    discovery: Option<Arc<dyn Discovery>>,
}

impl ControllerBuilder {
    pub fn config(mut self, config: ControllerConfig) -> Self {
        self.config = config;
        self
    }

    /// Persistent settings store. Defaults to [`MemorySettings`].
    pub fn settings(mut self, settings: Arc<dyn SettingsStore>) -> Self {
        self.settings = Some(settings);
        self
    }

    /// Extra registration sink, fed alongside the built-in directory.
    pub fn discovery(mut self, discovery: Arc<dyn Discovery>) -> Self {
        self.discovery = Some(discovery);
        self
    }

    pub fn build(self) -> Controller {
        let directory = Arc::new(DeviceDirectory::new());
        let mut sinks: Vec<Arc<dyn Discovery>> = Vec::with_capacity(2);
        sinks.push(directory.clone());
        sinks.extend(self.discovery);

        let registry = NodeRegistry::new(
            Arc::clone(&self.driver),
            sinks,
            self.config.notification_capacity,
        );
        let supervisor = ConnectionSupervisor::new(Arc::clone(&self.driver));
        let settings = self
            .settings
            .unwrap_or_else(|| Arc::new(MemorySettings::new()));
        let (scan_complete, _) = watch::channel(false);

        Controller {
            inner: Arc::new(ControllerInner {
                config: self.config,
                driver: self.driver,
                supervisor,
                registry,
                directory,
                settings,
                settings_cache: Mutex::new(ControllerSettings::default()),
                scan_complete,
                cancel: CancellationToken::new(),
                task_handles: Mutex::new(Vec::new()),
                writer_started: AtomicBool::new(false),
            }),
        }
    }
}

// ── Controller ───────────────────────────────────────────────────────

/// The main entry point for consumers.
///
/// Cheaply cloneable via `Arc<ControllerInner>`. Driver events must be
/// fed in arrival order, either through [`run`](Self::run) /
/// [`spawn`](Self::spawn) or by calling
/// [`handle_event`](Self::handle_event) from a single task.
#[derive(Clone)]
pub struct Controller {
    inner: Arc<ControllerInner>,
}

struct ControllerInner {
    config: ControllerConfig,
    driver: Arc<dyn Driver>,
    supervisor: ConnectionSupervisor,
    registry: NodeRegistry,
    directory: Arc<DeviceDirectory>,
    settings: Arc<dyn SettingsStore>,
    /// Last persisted settings. Held across a port change to serialize
    /// concurrent `connect` calls.
    settings_cache: Mutex<ControllerSettings>,
    scan_complete: watch::Sender<bool>,
    cancel: CancellationToken,
    task_handles: Mutex<Vec<JoinHandle<()>>>,
    writer_started: AtomicBool,
}

impl Controller {
    pub fn builder(driver: Arc<dyn Driver>) -> ControllerBuilder {
        ControllerBuilder {
            driver,
            config: ControllerConfig::default(),
            settings: None,
            discovery: None,
        }
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.inner.config
    }

    pub fn supervisor(&self) -> &ConnectionSupervisor {
        &self.inner.supervisor
    }

    pub fn registry(&self) -> &NodeRegistry {
        &self.inner.registry
    }

    // ── Life cycle ───────────────────────────────────────────────────

    /// Load persisted settings, start the periodic config writer once, and
    /// connect to the stored port if there is one.
    pub async fn init(&self) -> Result<ConnectStatus, CoreError> {
        let stored = self
            .inner
            .settings
            .load(CONTROLLER_SETTINGS_KEY)?
            .unwrap_or_default();
        info!(port = ?stored.port, "loaded controller settings");

        self.inner.supervisor.set_configured_port(stored.port.clone());
        *self.inner.settings_cache.lock().await = stored;

        let interval = self.inner.config.write_config_interval;
        if !interval.is_zero() && !self.inner.writer_started.swap(true, Ordering::AcqRel) {
            let ctrl = self.clone();
            let cancel = self.inner.cancel.clone();
            let handle = tokio::spawn(write_config_task(ctrl, interval, cancel));
            self.inner.task_handles.lock().await.push(handle);
        }

        self.inner.supervisor.reconcile()
    }

    /// Consume driver events until the stream ends or the controller
    /// shuts down.
    pub async fn run(&self, mut events: mpsc::Receiver<DriverEvent>) {
        let cancel = self.inner.cancel.clone();
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                event = events.recv() => {
                    let Some(event) = event else {
                        info!("driver event stream ended");
                        break;
                    };
                    self.handle_event(&event);
                }
            }
        }
    }

    /// Run the dispatch loop as a background task owned by the controller.
    pub async fn spawn(&self, events: mpsc::Receiver<DriverEvent>) {
        let ctrl = self.clone();
        let handle = tokio::spawn(async move { ctrl.run(events).await });
        self.inner.task_handles.lock().await.push(handle);
    }

    /// Apply one driver event.
    pub fn handle_event(&self, event: &DriverEvent) {
        match event {
            DriverEvent::DriverReady { network_id } => {
                self.inner.scan_complete.send_replace(false);
                self.inner.supervisor.on_driver_ready(*network_id);
            }
            DriverEvent::DriverFailed => self.inner.supervisor.on_driver_failed(),
            DriverEvent::ScanComplete => {
                info!(
                    nodes = self.inner.registry.len(),
                    devices = self.inner.directory.len(),
                    "network scan complete"
                );
                self.inner.scan_complete.send_replace(true);
            }
            _ => {
                let network_id = self.inner.supervisor.network_id().unwrap_or_default();
                self.inner.registry.apply(event, network_id);
            }
        }
    }

    /// Cancel background tasks and wait for them to finish. A pending
    /// connect attempt is rejected.
    pub async fn shutdown(&self) {
        self.inner.cancel.cancel();
        self.inner.supervisor.cancel_pending();

        let mut handles = self.inner.task_handles.lock().await;
        for handle in handles.drain(..) {
            if let Err(e) = handle.await {
                warn!(error = %e, "background task failed");
            }
        }
        debug!("controller shut down");
    }

    // ── Connection actions ───────────────────────────────────────────

    /// Connect to `port`, persisting it first. Returns the current status
    /// untouched when `port` is already the stored one.
    pub async fn connect(&self, port: &str) -> Result<ConnectStatus, CoreError> {
        let port = port.trim();
        if port.is_empty() {
            return Err(CoreError::ValidationFailed {
                message: "port must not be empty".into(),
            });
        }

        let mut cache = self.inner.settings_cache.lock().await;
        if cache.port.as_deref() == Some(port) {
            debug!(port, "port unchanged");
            return Ok(self.inner.supervisor.current());
        }

        let next = ControllerSettings {
            port: Some(port.to_owned()),
        };
        self.inner.settings.save(CONTROLLER_SETTINGS_KEY, &next)?;
        *cache = next;
        info!(port, "controller port configured");

        // Nodes of the previous network are meaningless on the new port.
        if self
            .inner
            .supervisor
            .active_port()
            .is_some_and(|active| active != port)
        {
            let dropped = self.inner.registry.clear();
            debug!(dropped, "cleared nodes of previous port");
        }

        self.inner.supervisor.request_connect(port)
    }

    /// Retry the stored port, e.g. after the driver failed.
    pub fn reconnect(&self) -> Result<ConnectStatus, CoreError> {
        self.inner.supervisor.reconcile()
    }

    /// Close the port and drop every node. The stored port is kept.
    pub fn disconnect(&self) {
        self.inner.supervisor.disconnect();
        let dropped = self.inner.registry.clear();
        self.inner.scan_complete.send_replace(false);
        info!(dropped, "disconnected");
    }

    /// Start inclusion. Returns the instruction to show the user.
    pub fn add_device(&self, secure: bool) -> Result<&'static str, CoreError> {
        self.require_connected()?;
        self.inner.driver.send(DriverCommand::AddNode { secure })?;
        info!(secure, "inclusion started");
        Ok(PAIR_INSTRUCTIONS)
    }

    /// Start exclusion. Returns the instruction to show the user.
    pub fn remove_device(&self) -> Result<&'static str, CoreError> {
        self.require_connected()?;
        self.inner.driver.send(DriverCommand::RemoveNode)?;
        info!("exclusion started");
        Ok(REMOVE_INSTRUCTIONS)
    }

    // ── State access ─────────────────────────────────────────────────

    pub fn status(&self) -> ControllerStatus {
        let supervisor = &self.inner.supervisor;
        let port = supervisor.configured_port();
        ControllerStatus {
            name: self.inner.config.name.clone(),
            configured: port.is_some(),
            connected: supervisor.is_connected(),
            port,
            active_port: supervisor.active_port(),
            network_id: supervisor.network_id(),
            scan_complete: *self.inner.scan_complete.borrow(),
            node_count: self.inner.registry.len(),
            device_count: self.inner.directory.len(),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.inner.supervisor.is_connected()
    }

    /// Subscribe to connection state changes.
    pub fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.supervisor.subscribe()
    }

    /// The proxy of a ready node.
    pub fn device(&self, node_id: NodeId) -> Result<Arc<DeviceProxy>, CoreError> {
        if let Some(device) = self.inner.registry.device(node_id) {
            return Ok(device);
        }
        if self.inner.registry.node(node_id).is_some() {
            Err(CoreError::NodeNotReady { node_id })
        } else {
            Err(CoreError::UnknownNode { node_id })
        }
    }

    /// Subscribe to the set of ready devices.
    pub fn devices(&self) -> EntityStream<DeviceProxy> {
        self.inner.directory.subscribe()
    }

    pub fn devices_snapshot(&self) -> Arc<Vec<Arc<DeviceProxy>>> {
        self.inner.directory.snapshot()
    }

    /// Snapshot of a node, ready or not.
    pub fn node(&self, node_id: NodeId) -> Option<Arc<NodeState>> {
        self.inner.registry.node(node_id)
    }

    pub fn node_ids(&self) -> Vec<NodeId> {
        self.inner.registry.node_ids()
    }

    /// Wait until the driver reports the initial network scan complete.
    pub async fn wait_for_scan(&self) {
        let mut rx = self.inner.scan_complete.subscribe();
        // The sender lives as long as `self`, so this cannot observe a close.
        let _ = rx.wait_for(|done| *done).await;
    }

    // ── Private helpers ──────────────────────────────────────────────

    fn require_connected(&self) -> Result<(), CoreError> {
        if self.inner.supervisor.is_connected() {
            Ok(())
        } else {
            Err(CoreError::NotConnected)
        }
    }
}

// ── Background tasks ─────────────────────────────────────────────────

/// Ask the driver to persist its configuration on a fixed interval while
/// connected.
async fn write_config_task(controller: Controller, interval: Duration, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    ticker.tick().await; // consume the immediate first tick

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                if controller.is_connected() {
                    debug!("writing driver configuration");
                    if let Err(e) = controller.inner.driver.send(DriverCommand::WriteConfig) {
                        warn!(error = %e, "periodic config write failed");
                    }
                }
            }
        }
    }
}
