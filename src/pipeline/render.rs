//! Plain-text rendering of digest and alert emails

use super::types::{Group, RecordFields, Snapshot};
use std::fmt::Write;

/// Rendered subject line and body for one outgoing email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendered {
    pub subject: String,
    pub body: String,
}

#[derive(Debug)]
pub struct RenderError(std::fmt::Error);

impl std::fmt::Display for RenderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "could not render digest: {}", self.0)
    }
}

impl std::error::Error for RenderError {}

impl From<std::fmt::Error> for RenderError {
    fn from(err: std::fmt::Error) -> Self {
        Self(err)
    }
}

/// Render the periodic digest for a drained snapshot.
///
/// Groups appear in reverse order of count; per-source counts are
/// ordered by host name.
pub fn render_digest(snapshot: &Snapshot, server_name: &str) -> Result<Rendered, RenderError> {
    let subject = format!(
        "[{}] {} errors ({} unique)",
        server_name,
        snapshot.total,
        snapshot.total_unique()
    );

    let mut body = String::new();
    writeln!(
        body,
        "{} errors ({} unique) since the last digest on {}",
        snapshot.total,
        snapshot.total_unique(),
        server_name
    )?;
    let kinds = snapshot.kinds();
    if !kinds.is_empty() {
        let kinds: Vec<&str> = kinds.iter().map(String::as_str).collect();
        writeln!(body, "kinds: {}", kinds.join(", "))?;
    }

    for group in snapshot.sorted_groups() {
        writeln!(body)?;
        write_group(&mut body, group)?;
    }

    Ok(Rendered { subject, body })
}

fn write_group(body: &mut String, group: &Group) -> Result<(), RenderError> {
    writeln!(body, "{}x {}", group.total, describe(&group.representative))?;
    if let Some(message) = &group.representative.message {
        writeln!(body, "    {}", message)?;
    }

    let sources: Vec<String> = group
        .per_source
        .iter()
        .map(|(source, count)| format!("{} ({})", source, count))
        .collect();
    writeln!(body, "    sources: {}", sources.join(", "))?;
    writeln!(
        body,
        "    first seen {} / last seen {}",
        group.first_seen.format("%Y-%m-%d %H:%M:%S UTC"),
        group.last_seen.format("%Y-%m-%d %H:%M:%S UTC")
    )?;
    if group.monitoring_only {
        writeln!(body, "    monitoring-only")?;
    }
    if let Some(exc_text) = &group.representative.exc_text {
        for line in exc_text.lines() {
            writeln!(body, "    | {}", line)?;
        }
    }
    Ok(())
}

/// One-line location summary for a group's representative record.
fn describe(fields: &RecordFields) -> String {
    let kind = fields.kind.as_deref().unwrap_or("unknown");
    let module = fields.module.as_deref().unwrap_or("?");
    let func_name = fields.func_name.as_deref().unwrap_or("?");
    let filename = fields.filename.as_deref().unwrap_or("?");
    match fields.lineno {
        Some(lineno) => format!(
            "[{}] {}.{} ({}:{})",
            kind, module, func_name, filename, lineno
        ),
        None => format!("[{}] {}.{} ({})", kind, module, func_name, filename),
    }
}

/// Render the out-of-band pager alert for an exceeded rate window.
pub fn render_alert(server_name: &str, windowed_total: u64) -> Rendered {
    Rendered {
        subject: format!("[{}] error rate exceeded", server_name),
        body: format!(
            "Danger: received {} errors within the alert window.",
            windowed_total
        ),
    }
}
