//! Node and value handlers.

use std::sync::Arc;

use serde::Serialize;
use tabled::Tabled;
use zwbridge_core::{
    ClassInfo, CommandClassId, ConnectStatus, DeviceFilter, DeviceId, DeviceProxy, Inspection,
    NodeId, ValueKey, ValueKind, ValueRecord,
};

use crate::cli::{GetArgs, GlobalOpts, NodeArg, NodesArgs, PollArgs, RenameArgs, SetArgs, ValuesArgs};
use crate::error::CliError;
use crate::output;

use super::Session;

// ── Serializable views ──────────────────────────────────────────────

#[derive(Serialize)]
struct DeviceSummary {
    node_id: NodeId,
    id: DeviceId,
    name: String,
    classes: Vec<ClassInfo>,
}

impl DeviceSummary {
    fn of(device: &DeviceProxy) -> Result<Self, CliError> {
        Ok(Self {
            node_id: device.node_id(),
            id: device.id(),
            name: device.name()?,
            classes: device.value_classes()?,
        })
    }
}

#[derive(Serialize)]
struct ValueEntry {
    class_id: CommandClassId,
    instance: u8,
    index: u16,
    label: String,
    value: serde_json::Value,
    #[serde(rename = "type")]
    kind: ValueKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    unit: Option<String>,
}

impl ValueEntry {
    fn new(key: ValueKey, record: &ValueRecord) -> Self {
        Self {
            class_id: key.class_id,
            instance: key.instance,
            index: key.index,
            label: record.label.clone(),
            value: record.value.clone(),
            kind: record.kind,
            unit: record.unit.clone(),
        }
    }
}

#[derive(Serialize)]
struct ValueReading {
    key: ValueKey,
    value: Option<serde_json::Value>,
}

#[derive(Serialize)]
struct Request {
    node_id: NodeId,
    action: String,
}

// ── Table rows ──────────────────────────────────────────────────────

#[derive(Tabled)]
struct DeviceRow {
    #[tabled(rename = "Node")]
    node: NodeId,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Classes")]
    classes: String,
}

impl From<&DeviceSummary> for DeviceRow {
    fn from(d: &DeviceSummary) -> Self {
        Self {
            node: d.node_id,
            name: d.name.clone(),
            classes: d
                .classes
                .iter()
                .map(|c| c.label)
                .collect::<Vec<_>>()
                .join(", "),
        }
    }
}

#[derive(Tabled)]
struct ClassRow {
    #[tabled(rename = "ID")]
    id: CommandClassId,
    #[tabled(rename = "Class")]
    label: &'static str,
}

#[derive(Tabled)]
struct ValueRow {
    #[tabled(rename = "Class")]
    class: CommandClassId,
    #[tabled(rename = "Inst")]
    instance: u8,
    #[tabled(rename = "Idx")]
    index: u16,
    #[tabled(rename = "Label")]
    label: String,
    #[tabled(rename = "Value")]
    value: String,
    #[tabled(rename = "Type")]
    kind: ValueKind,
    #[tabled(rename = "Unit")]
    unit: String,
}

impl From<&ValueEntry> for ValueRow {
    fn from(v: &ValueEntry) -> Self {
        Self {
            class: v.class_id,
            instance: v.instance,
            index: v.index,
            label: v.label.clone(),
            value: output::value_text(&v.value),
            kind: v.kind,
            unit: v.unit.clone().unwrap_or_default(),
        }
    }
}

#[derive(Tabled)]
struct ReadingRow {
    #[tabled(rename = "Key")]
    key: ValueKey,
    #[tabled(rename = "Value")]
    value: String,
}

// ── Helpers ─────────────────────────────────────────────────────────

fn device(session: &Session, node_id: NodeId) -> Result<Arc<DeviceProxy>, CliError> {
    Ok(session.controller().device(node_id)?)
}

fn entries(class_id: CommandClassId, values: &zwbridge_core::ClassValues) -> Vec<ValueEntry> {
    values
        .iter()
        .flat_map(|(instance, by_index)| {
            by_index.iter().map(move |(index, record)| {
                ValueEntry::new(ValueKey::new(class_id, *instance, *index), record)
            })
        })
        .collect()
}

fn inspection_entries(inspection: &Inspection) -> Vec<ValueEntry> {
    inspection
        .values
        .iter()
        .flat_map(|(class_id, values)| entries(*class_id, values))
        .collect()
}

fn value_table(entries: &[ValueEntry]) -> String {
    let rows: Vec<ValueRow> = entries.iter().map(ValueRow::from).collect();
    tabled::Table::new(rows)
        .with(tabled::settings::Style::rounded())
        .to_string()
}

/// A JSON literal, or the raw text as a string.
fn parse_value(raw: &str) -> serde_json::Value {
    serde_json::from_str(raw).unwrap_or_else(|_| serde_json::Value::String(raw.to_owned()))
}

fn print_request(request: &Request, global: &GlobalOpts) -> Result<(), CliError> {
    let out = output::render_single(
        &global.output,
        request,
        |r| format!("Node {}: {}", r.node_id, r.action),
        |r| r.node_id.to_string(),
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}

// ── Handlers ────────────────────────────────────────────────────────

pub async fn list(
    session: &Session,
    status: ConnectStatus,
    args: NodesArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    session.scanned(status).await?;

    let mut filters = Vec::new();
    if let Some(class_id) = args.class {
        filters.push(DeviceFilter::SupportsClass(class_id));
    }
    if let Some(name) = args.name {
        filters.push(DeviceFilter::NameContains(name));
    }

    let snapshot = session.controller().devices_snapshot();
    let mut summaries = Vec::with_capacity(snapshot.len());
    for device in snapshot.iter() {
        if !filters.iter().all(|f| f.matches(device)) {
            continue;
        }
        match DeviceSummary::of(device) {
            Ok(summary) => summaries.push(summary),
            // Removed between the snapshot and now.
            Err(CliError::NodeNotFound { .. }) => {}
            Err(e) => return Err(e),
        }
    }

    let out = output::render_list(
        &global.output,
        &summaries,
        |d| DeviceRow::from(d),
        |d| d.node_id.to_string(),
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}

pub async fn inspect(
    session: &Session,
    status: ConnectStatus,
    args: &NodeArg,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    session.scanned(status).await?;
    let device = device(session, args.node)?;
    let inspection = device.inspect()?;

    let out = output::render_single(
        &global.output,
        &inspection,
        |i| {
            let info = i.metadata.info();
            let mut lines = vec![
                format!("Node:         {}", device.node_id()),
                format!("ID:           {}", device.id()),
                format!("Name:         {}", i.metadata.display_name()),
                format!("Manufacturer: {}", info.manufacturer.as_deref().unwrap_or("-")),
                format!("Product:      {}", info.product.as_deref().unwrap_or("-")),
                format!("Type:         {}", info.node_type.as_deref().unwrap_or("-")),
                format!("Location:     {}", info.loc.as_deref().unwrap_or("-")),
            ];
            let values = inspection_entries(i);
            if !values.is_empty() {
                lines.push(String::new());
                lines.push(value_table(&values));
            }
            lines.join("\n")
        },
        |i| i.metadata.display_name(),
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}

pub async fn classes(
    session: &Session,
    status: ConnectStatus,
    args: &NodeArg,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    session.scanned(status).await?;
    let classes = device(session, args.node)?.value_classes()?;

    let out = output::render_list(
        &global.output,
        &classes,
        |c| ClassRow {
            id: c.id,
            label: c.label,
        },
        |c| c.id.to_string(),
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}

pub async fn values(
    session: &Session,
    status: ConnectStatus,
    args: &ValuesArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    session.scanned(status).await?;
    let values = device(session, args.node)?.values(args.class, args.instance)?;
    let entries = entries(args.class, &values);

    let out = output::render_list(&global.output, &entries, |v| ValueRow::from(v), |v| {
        output::value_text(&v.value)
    })?;
    output::print_output(&out, global.quiet);
    Ok(())
}

pub async fn get(
    session: &Session,
    status: ConnectStatus,
    args: &GetArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    session.scanned(status).await?;
    let keys: Vec<ValueKey> = args
        .index
        .iter()
        .map(|index| ValueKey::new(args.class, args.instance, *index))
        .collect();
    let values = device(session, args.node)?.get_values(&keys)?;

    let readings: Vec<ValueReading> = keys
        .into_iter()
        .zip(values)
        .map(|(key, value)| ValueReading { key, value })
        .collect();

    let text = |r: &ValueReading| {
        r.value
            .as_ref()
            .map_or_else(|| "-".to_owned(), output::value_text)
    };
    let out = output::render_list(
        &global.output,
        &readings,
        |r| ReadingRow {
            key: r.key,
            value: text(r),
        },
        text,
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}

pub async fn set(
    session: &Session,
    status: ConnectStatus,
    args: &SetArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    session.scanned(status).await?;
    let value = parse_value(&args.value);
    let key = ValueKey::new(args.class, args.instance, args.index);

    device(session, args.node)?.set_value(args.class, args.instance, args.index, value.clone())?;
    print_request(
        &Request {
            node_id: args.node,
            action: format!("set {key} to {value}"),
        },
        global,
    )
}

pub async fn poll(
    session: &Session,
    status: ConnectStatus,
    args: &PollArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    session.scanned(status).await?;
    let device = device(session, args.node)?;
    let action = if args.enable {
        device.enable_poll(args.class)?;
        format!("polling of {} enabled", args.class)
    } else {
        device.disable_poll(args.class)?;
        format!("polling of {} disabled", args.class)
    };
    print_request(
        &Request {
            node_id: args.node,
            action,
        },
        global,
    )
}

pub async fn rename(
    session: &Session,
    status: ConnectStatus,
    args: &RenameArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    session.scanned(status).await?;
    let device = device(session, args.node)?;
    device.rename(&args.name)?;
    print_request(
        &Request {
            node_id: args.node,
            action: format!("renamed to {}", device.name()?),
        },
        global,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn bare_words_become_strings() {
        assert_eq!(parse_value("true"), json!(true));
        assert_eq!(parse_value("42"), json!(42));
        assert_eq!(parse_value("\"Auto\""), json!("Auto"));
        assert_eq!(parse_value("Auto"), json!("Auto"));
    }
}
