// ── Runtime controller configuration ──
//
// Tuning knobs for a `Controller`. The binary builds one from its
// config file; the core never reads config files itself.

use std::time::Duration;

/// Configuration for a single controller instance.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Display name of the controller.
    pub name: String,
    /// How often to ask the driver to persist its network configuration
    /// while connected. `Duration::ZERO` disables the task.
    pub write_config_interval: Duration,
    /// Capacity of each per-device notification channel.
    pub notification_capacity: usize,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            name: "Z-Wave Controller".into(),
            write_config_interval: Duration::from_secs(60 * 60),
            notification_capacity: 64,
        }
    }
}
