//! Handler for the `tune` command.

use serde_json::json;
use tabled::Tabled;

use crate::adapter::inbound::cli::command::ConfigPathArg;
use crate::adapter::inbound::cli::{config, output};
use crate::application::tuner::{Finding, Severity, TuningReport};
use crate::error::Result;
use crate::infrastructure::bootstrap::build_tuner;

#[derive(Tabled)]
struct FindingRow {
    #[tabled(rename = "Check")]
    check: &'static str,
    #[tabled(rename = "Severity")]
    severity: String,
    #[tabled(rename = "Finding")]
    message: String,
    #[tabled(rename = "Recommendation")]
    recommendation: String,
}

impl From<&Finding> for FindingRow {
    fn from(finding: &Finding) -> Self {
        Self {
            check: finding.check,
            severity: output::severity(finding.severity),
            message: finding.message.clone(),
            recommendation: finding.recommendation.clone().unwrap_or_default(),
        }
    }
}

fn fmt_limit(value: Option<u64>) -> String {
    value.map_or_else(|| "unknown".to_string(), |v| v.to_string())
}

/// Diagnose OS limits against the configuration.
///
/// Returns the worst severity so the caller can pick an exit code.
pub fn execute(arg: &ConfigPathArg) -> Result<Severity> {
    let config = config::load(arg)?;
    let report = build_tuner().run(&config.pool, &config.server);

    if output::is_json() {
        output::document(&json!({
            "command": "tune",
            "worst": report.worst(),
            "report": report,
        }));
        return Ok(report.worst());
    }

    output::header(env!("CARGO_PKG_VERSION"));
    print_limits(&report);

    output::section("Findings");
    let shown: Vec<FindingRow> = report
        .findings
        .iter()
        .filter(|f| output::verbosity() > 0 || f.severity > Severity::Ok)
        .map(FindingRow::from)
        .collect();
    if shown.is_empty() {
        output::success("All limits support the configured capacity");
    } else {
        output::table(shown);
    }

    match report.worst() {
        Severity::Critical => output::error(&format!(
            "{} critical finding(s): the configured capacity cannot be reached",
            report.count(Severity::Critical)
        )),
        Severity::Warning => output::warning(&format!(
            "{} warning(s)",
            report.count(Severity::Warning)
        )),
        Severity::Ok | Severity::Advisory => {}
    }
    if output::verbosity() == 0 {
        output::hint("use -v to include passing checks");
    }

    Ok(report.worst())
}

fn print_limits(report: &TuningReport) {
    let limits = &report.limits;
    output::field("Target", report.target_connections);
    output::field(
        "Open files",
        format!(
            "{} (hard {})",
            fmt_limit(limits.open_files_soft),
            fmt_limit(limits.open_files_hard)
        ),
    );
    output::field("fs.file-max", fmt_limit(limits.system_file_max));
    output::field("somaxconn", fmt_limit(limits.somaxconn));
    output::field("tcp_max_syn_backlog", fmt_limit(limits.tcp_max_syn_backlog));
    output::field("Ephemeral ports", fmt_limit(limits.ephemeral_ports));
    output::field(
        "CPUs",
        limits
            .cpu_count
            .map_or_else(|| "unknown".to_string(), |n| n.to_string()),
    );
    output::field(
        "Memory",
        limits.total_memory_bytes.map_or_else(
            || "unknown".to_string(),
            |bytes| format!("{} MiB", bytes / (1024 * 1024)),
        ),
    );
}
