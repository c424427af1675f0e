//! Handler for the `status` command.

use std::path::PathBuf;

use chrono::Utc;
use serde_json::json;
use tabled::Tabled;

use crate::adapter::inbound::cli::command::StatusArgs;
use crate::adapter::inbound::cli::{config, output};
use crate::application::status::{StatusFile, StatusWriter};
use crate::error::Result;

#[derive(Tabled)]
struct SubjectRow {
    #[tabled(rename = "Subject")]
    subject: String,
    #[tabled(rename = "Connections")]
    connections: usize,
}

fn status_path(args: &StatusArgs) -> Result<Option<PathBuf>> {
    if let Some(file) = &args.file {
        return Ok(Some(file.clone()));
    }
    let config = config::load(&args.config)?;
    Ok(config.server.status_file.map(PathBuf::from))
}

/// Print the statistics snapshot written by a running gateway.
pub fn execute(args: &StatusArgs) -> Result<()> {
    if output::is_quiet() && !output::is_json() {
        return Ok(());
    }

    let Some(path) = status_path(args)? else {
        if output::is_json() {
            output::document(&json!({
                "command": "status",
                "status": "unconfigured",
            }));
            return Ok(());
        }
        output::warning("No status file configured");
        output::hint("pass --file or set server.status_file");
        return Ok(());
    };

    let status = match StatusWriter::read(&path) {
        Ok(status) => status,
        Err(e) => {
            if output::is_json() {
                output::document(&json!({
                    "command": "status",
                    "file": path.display().to_string(),
                    "status": "unavailable",
                    "error": e.to_string(),
                }));
            } else {
                output::warning(&format!("Status file unavailable ({}): {e}", path.display()));
                output::hint("is `wsgate serve` running with server.status_file set?");
            }
            return Ok(());
        }
    };

    if output::is_json() {
        output::document(&json!({
            "command": "status",
            "file": path.display().to_string(),
            "status": "ok",
            "snapshot": status,
        }));
        return Ok(());
    }

    display(&status);
    Ok(())
}

fn display(status: &StatusFile) {
    let stats = &status.stats;
    let age = (Utc::now() - status.updated_at).num_seconds().max(0);

    output::header(env!("CARGO_PKG_VERSION"));
    output::field("Bind address", &status.bind_address);
    output::field("PID", status.pid);
    output::field("Started", status.started_at.format("%Y-%m-%d %H:%M:%S UTC"));
    output::field("Updated", format!("{age}s ago"));
    if stats.is_shutdown {
        output::warning("Gateway has shut down");
    }

    output::section("Connections");
    output::usage("Active", stats.active_connections, stats.config.max_connections);
    output::field("Pending", stats.pending_connections);
    output::field("Subjects", stats.unique_subjects);
    output::field("Sources", stats.unique_sources);
    output::field("Channels", stats.active_channels);
    output::field("Peak", stats.peak_connections);

    output::section("Lifetime");
    output::field("Created", stats.total_created);
    output::field("Closed", stats.total_closed);
    output::field("Rejected", stats.total_rejected);
    output::field("Failed", stats.total_failed);
    output::field("Avg session", format!("{:.1}s", stats.average_session_secs));

    output::section("Resources");
    match (&stats.resource_status, &stats.latest_sample) {
        (Some(status), Some(sample)) => {
            output::field("Status", status);
            output::field("Memory", format!("{:.1}%", sample.memory_percent));
            output::field("CPU", format!("{:.1}%", sample.cpu_percent));
        }
        (Some(status), None) => output::field("Status", status),
        _ => output::field("Status", "unknown"),
    }

    if output::verbosity() > 0 && !stats.connections_by_subject.is_empty() {
        output::section("By subject");
        let rows: Vec<SubjectRow> = stats
            .connections_by_subject
            .iter()
            .map(|(subject, connections)| SubjectRow {
                subject: subject.clone(),
                connections: *connections,
            })
            .collect();
        output::table(rows);
    }
}
