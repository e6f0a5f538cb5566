//! Command dispatch: bridges CLI args -> controller calls -> output formatting.

pub mod config_cmd;
pub mod network;
pub mod nodes;
pub mod watch;

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use zwbridge_api::{GatewayDriver, ReconnectConfig};
use zwbridge_config::{Config, FileSettings};
use zwbridge_core::{ConnectStatus, Controller, NetworkId};

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

/// Dispatch a gateway-bound command to its handler.
pub async fn dispatch(cmd: Command, cfg: &Config, global: &GlobalOpts) -> Result<(), CliError> {
    // Long-running commands ride out gateway restarts; one-shots fail fast.
    let reconnect = if matches!(cmd, Command::Watch(_)) {
        ReconnectConfig::default()
    } else {
        ReconnectConfig {
            max_retries: Some(0),
            ..ReconnectConfig::default()
        }
    };

    let (session, status) = Session::open(cfg, reconnect).await?;
    let result = match cmd {
        Command::Connect(args) => network::connect(&session, &args, global).await,
        Command::Status => network::status(&session, status, global).await,
        Command::AddDevice(args) => network::add_device(&session, status, &args, global).await,
        Command::RemoveDevice => network::remove_device(&session, status, global).await,
        Command::Nodes(args) => nodes::list(&session, status, args, global).await,
        Command::Inspect(args) => nodes::inspect(&session, status, &args, global).await,
        Command::Classes(args) => nodes::classes(&session, status, &args, global).await,
        Command::Values(args) => nodes::values(&session, status, &args, global).await,
        Command::Get(args) => nodes::get(&session, status, &args, global).await,
        Command::Set(args) => nodes::set(&session, status, &args, global).await,
        Command::Poll(args) => nodes::poll(&session, status, &args, global).await,
        Command::Rename(args) => nodes::rename(&session, status, &args, global).await,
        Command::Watch(args) => watch::handle(&session, status, &args, global).await,
        // Config and Completions are handled before dispatch
        Command::Config(_) | Command::Completions(_) => Ok(()),
    };
    session.close().await;
    result
}

// ── Session ──────────────────────────────────────────────────────────

/// A controller wired to a gateway for the lifetime of one command.
pub struct Session {
    controller: Controller,
    driver: Arc<GatewayDriver>,
    wait: Duration,
}

impl Session {
    /// Start the gateway link and the controller, and connect to the
    /// stored port (or the config's `port` when none is stored yet).
    pub async fn open(
        cfg: &Config,
        reconnect: ReconnectConfig,
    ) -> Result<(Self, ConnectStatus), CliError> {
        let url = cfg.gateway_url()?;
        let (driver, events) = GatewayDriver::spawn(url, reconnect, CancellationToken::new());
        let driver = Arc::new(driver);

        let controller = Controller::builder(driver.clone())
            .config(cfg.to_controller_config())
            .settings(Arc::new(FileSettings::new(cfg.state_path())))
            .build();
        controller.spawn(events).await;

        let session = Self {
            controller,
            driver,
            wait: cfg.scan_timeout(),
        };

        let status = match session.start(cfg).await {
            Ok(status) => status,
            Err(e) => {
                session.close().await;
                return Err(e.into());
            }
        };
        Ok((session, status))
    }

    async fn start(&self, cfg: &Config) -> Result<ConnectStatus, zwbridge_core::CoreError> {
        let status = self.controller.init().await?;
        match (&status, &cfg.port) {
            (ConnectStatus::Unconfigured, Some(port)) => self.controller.connect(port).await,
            _ => Ok(status),
        }
    }

    pub fn controller(&self) -> &Controller {
        &self.controller
    }

    /// Wait for the connect attempt to settle into a live network.
    pub async fn connected(&self, status: ConnectStatus) -> Result<NetworkId, CliError> {
        match tokio::time::timeout(self.wait, status.wait()).await {
            Err(_) => Err(self.timeout("the controller")),
            Ok(Ok(Some(network_id))) => Ok(network_id),
            Ok(Ok(None)) => {
                if self.controller.supervisor().configured_port().is_none() {
                    Err(CliError::NoPort)
                } else {
                    Err(CliError::NotConnected)
                }
            }
            Ok(Err(e)) => Err(e.into()),
        }
    }

    /// [`connected`](Self::connected), then wait for the initial scan.
    pub async fn scanned(&self, status: ConnectStatus) -> Result<NetworkId, CliError> {
        let network_id = self.connected(status).await?;
        tokio::time::timeout(self.wait, self.controller.wait_for_scan())
            .await
            .map_err(|_| self.timeout("the network scan"))?;
        Ok(network_id)
    }

    fn timeout(&self, what: &'static str) -> CliError {
        CliError::Timeout {
            what,
            seconds: self.wait.as_secs(),
        }
    }

    /// Stop the controller, then the gateway link. Queued commands are
    /// flushed first.
    pub async fn close(self) {
        self.controller.shutdown().await;
        self.driver.shutdown();
        self.driver.closed().await;
    }
}
