use std::sync::Arc;

use crate::domain::MonthlyReportRow;
use crate::error::AppError;
use crate::store::IncidentStore;
use crate::validate;

/// Read-only monthly downtime reports over the incident history.
pub struct ReportAggregator {
    store: Arc<IncidentStore>,
}

impl ReportAggregator {
    pub fn new(store: Arc<IncidentStore>) -> Self {
        Self { store }
    }

    pub fn monthly_report(&self, year: i32, month: u8) -> Result<Vec<MonthlyReportRow>, AppError> {
        validate::report_period(year, month)?;
        self.store.monthly_aggregate(year, month)
    }
}

fn format_duration_seconds(secs: f64) -> String {
    let s = secs.max(0.0).round() as i64;
    let minutes = s / 60;
    let rem = s % 60;
    if minutes >= 60 {
        let hours = minutes / 60;
        let m = minutes % 60;
        format!("{hours}h {m}m")
    } else if minutes > 0 {
        format!("{minutes}m {rem}s")
    } else {
        format!("{rem}s")
    }
}

fn escape_cell(s: &str) -> String {
    s.replace('|', "\\|").replace('\n', " ")
}

/// Render monthly rows as a Markdown table, keeping the row order given.
pub fn render_monthly_markdown(year: i32, month: u8, rows: &[MonthlyReportRow]) -> String {
    let mut out = String::new();
    out.push_str(&format!("# Downtime Report {year:04}-{month:02}\n\n"));

    if rows.is_empty() {
        out.push_str("No incidents were opened in this period.\n");
        return out;
    }

    let total_down: i64 = rows.iter().map(|r| r.down_count).sum();
    let total_resolved: i64 = rows.iter().map(|r| r.resolved_count).sum();
    out.push_str(&format!(
        "Targets affected: {}. Incidents: {total_down} ({total_resolved} resolved).\n\n",
        rows.len()
    ));

    out.push_str("| Target | Address | Down | Resolved | Mean resolution |\n");
    out.push_str("|---|---|---:|---:|---:|\n");
    for r in rows {
        out.push_str(&format!(
            "| {} | {} | {} | {} | {} |\n",
            escape_cell(&r.target_name),
            escape_cell(&r.target_address),
            r.down_count,
            r.resolved_count,
            format_duration_seconds(r.mean_resolution_seconds)
        ));
    }
    out
}
