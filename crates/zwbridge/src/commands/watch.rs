//! Live notification stream.
//!
//! Follows every registered device, including ones registered while
//! watching, and prints value, node and scene notifications as they
//! arrive until interrupted or `--count` is reached.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use zwbridge_core::{
    ConnectStatus, DeviceProxy, NodeEventNotice, NodeId, SceneNotice, ValueChange,
};

use crate::cli::{GlobalOpts, OutputFormat, WatchArgs};
use crate::error::CliError;
use crate::output;

use super::Session;

#[derive(Debug, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
enum Notice {
    Value(Arc<ValueChange>),
    Node(Arc<NodeEventNotice>),
    Scene(Arc<SceneNotice>),
}

/// Devices currently followed, by the proxy instance being forwarded.
struct Followers {
    only: Option<NodeId>,
    watched: HashMap<NodeId, Weak<DeviceProxy>>,
    tasks: JoinSet<()>,
    tx: mpsc::UnboundedSender<Notice>,
}

impl Followers {
    fn follow(&mut self, devices: &[Arc<DeviceProxy>]) {
        for device in devices {
            let node_id = device.node_id();
            if self.only.is_some_and(|only| only != node_id) {
                continue;
            }
            let same = self
                .watched
                .get(&node_id)
                .is_some_and(|w| std::ptr::eq(w.as_ptr(), Arc::as_ptr(device)));
            if same {
                continue;
            }
            tracing::debug!(node = %node_id, "following device");
            self.watched.insert(node_id, Arc::downgrade(device));
            self.spawn_forwarder(device);
        }
    }

    fn spawn_forwarder(&mut self, device: &DeviceProxy) {
        let mut values = device.value_changes();
        let mut events = device.node_events();
        let mut scenes = device.scene_events();
        let node_id = device.node_id();
        let tx = self.tx.clone();

        self.tasks.spawn(async move {
            loop {
                let notice = tokio::select! {
                    r = values.recv() => r.map(Notice::Value),
                    r = events.recv() => r.map(Notice::Node),
                    r = scenes.recv() => r.map(Notice::Scene),
                };
                match notice {
                    Ok(notice) => {
                        if tx.send(notice).is_err() {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(node = %node_id, skipped, "watch fell behind, notifications dropped");
                    }
                    // The proxy was dropped.
                    Err(RecvError::Closed) => break,
                }
            }
        });
    }
}

pub async fn handle(
    session: &Session,
    status: ConnectStatus,
    args: &WatchArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    session.connected(status).await?;
    let controller = session.controller();

    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut followers = Followers {
        only: args.node,
        watched: HashMap::new(),
        tasks: JoinSet::new(),
        tx,
    };

    let mut devices = controller.devices();
    followers.follow(devices.current());
    let mut connection = controller.connection_state();

    let color = output::should_color(&global.color);
    let mut seen = 0usize;
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => break,
            snapshot = devices.changed() => {
                let Some(snapshot) = snapshot else { break };
                followers.follow(&snapshot);
            }
            changed = connection.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = connection.borrow_and_update().clone();
                tracing::info!(state = ?state, "connection state changed");
            }
            notice = rx.recv() => {
                let Some(notice) = notice else { break };
                let out = render(&global.output, &notice, color)?;
                output::print_output(&out, global.quiet);
                seen += 1;
                if args.count.is_some_and(|limit| seen >= limit) {
                    break;
                }
            }
        }
    }

    followers.tasks.abort_all();
    Ok(())
}

fn render(format: &OutputFormat, notice: &Notice, color: bool) -> Result<String, CliError> {
    match format {
        // One document per line keeps the stream parseable.
        OutputFormat::Json | OutputFormat::JsonCompact => output::render_json(notice, true),
        _ => output::render_single(format, notice, |n| line(n, color), |n| line(n, false)),
    }
}

fn line(notice: &Notice, color: bool) -> String {
    let stamp = |at: &chrono::DateTime<chrono::Utc>| {
        output::muted(&at.format("%H:%M:%S%.3f").to_string(), color)
    };
    let shown = |v: &Option<serde_json::Value>| v.as_ref().map_or_else(|| "-".into(), output::value_text);

    match notice {
        Notice::Value(c) => format!(
            "{} {} value {}/{}/{}: {} -> {}",
            stamp(&c.at),
            c.device,
            c.class_id,
            c.instance,
            c.index,
            shown(&c.old_value),
            shown(&c.new_value),
        ),
        Notice::Node(e) => format!("{} {} event {}", stamp(&e.at), e.device, e.data),
        Notice::Scene(s) => format!("{} {} scene {}", stamp(&s.at), s.device, s.scene_id),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;
    use zwbridge_core::{CommandClassId, DeviceId, NetworkId};

    fn change() -> Notice {
        Notice::Value(Arc::new(ValueChange {
            device: DeviceId::new(NetworkId(0xc0ffee), NodeId(5)),
            class_id: CommandClassId(0x25),
            instance: 1,
            index: 0,
            old_value: Some(json!(false)),
            new_value: Some(json!(true)),
            at: chrono::Utc.with_ymd_and_hms(2026, 3, 1, 12, 30, 5).unwrap(),
        }))
    }

    #[test]
    fn value_line_shows_transition() {
        assert_eq!(
            line(&change(), false),
            "12:30:05.000 zwave:00c0ffee:5 value 0x25/1/0: false -> true"
        );
    }

    #[test]
    fn json_notices_are_tagged_single_lines() {
        let out = render(&OutputFormat::Json, &change(), false).unwrap();
        assert!(!out.contains('\n'));
        let parsed: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(parsed["kind"], json!("value"));
        assert_eq!(parsed["device"], json!("zwave:00c0ffee:5"));
        assert_eq!(parsed["new_value"], json!(true));
    }
}
