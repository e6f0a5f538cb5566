//! Controller-level handlers: connect, status, inclusion and exclusion.

use serde::Serialize;
use zwbridge_core::{ConnectStatus, ControllerStatus, NetworkId};

use crate::cli::{AddDeviceArgs, ConnectArgs, GlobalOpts};
use crate::error::CliError;
use crate::output;

use super::Session;

#[derive(Serialize)]
struct Connected<'a> {
    port: &'a str,
    network_id: NetworkId,
}

#[derive(Serialize)]
struct Instructions {
    instructions: &'static str,
}

pub async fn connect(
    session: &Session,
    args: &ConnectArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let status = session.controller().connect(&args.port).await?;
    let network_id = session.connected(status).await?;

    let port = args.port.trim();
    let out = output::render_single(
        &global.output,
        &Connected { port, network_id },
        |c| format!("Connected to {} (network {})", c.port, c.network_id),
        |c| c.network_id.to_string(),
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}

pub async fn status(
    session: &Session,
    status: ConnectStatus,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    // Report whatever state the attempt settles in; failures are part of the answer.
    if matches!(status, ConnectStatus::Pending(_)) {
        if let Err(e) = session.connected(status).await {
            tracing::debug!(error = %e, "controller did not come up");
        }
    }

    let color = output::should_color(&global.color);
    let snapshot = session.controller().status();
    let out = output::render_single(
        &global.output,
        &snapshot,
        |s| detail(s, color),
        |s| if s.connected { "connected" } else { "disconnected" }.to_owned(),
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}

fn detail(s: &ControllerStatus, color: bool) -> String {
    [
        format!("Name:        {}", s.name),
        format!("Configured:  {}", output::flag(s.configured, color)),
        format!("Connected:   {}", output::flag(s.connected, color)),
        format!("Port:        {}", s.port.as_deref().unwrap_or("-")),
        format!("Active port: {}", s.active_port.as_deref().unwrap_or("-")),
        format!(
            "Network:     {}",
            s.network_id.map_or_else(|| "-".into(), |id| id.to_string())
        ),
        format!("Scanned:     {}", output::flag(s.scan_complete, color)),
        format!("Nodes:       {}", s.node_count),
        format!("Devices:     {}", s.device_count),
    ]
    .join("\n")
}

pub async fn add_device(
    session: &Session,
    status: ConnectStatus,
    args: &AddDeviceArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    session.connected(status).await?;
    let instructions = session.controller().add_device(args.secure)?;
    print_instructions(instructions, global)
}

pub async fn remove_device(
    session: &Session,
    status: ConnectStatus,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    session.connected(status).await?;
    let instructions = session.controller().remove_device()?;
    print_instructions(instructions, global)
}

fn print_instructions(instructions: &'static str, global: &GlobalOpts) -> Result<(), CliError> {
    let out = output::render_single(
        &global.output,
        &Instructions { instructions },
        |i| i.instructions.to_owned(),
        |i| i.instructions.to_owned(),
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}
