use colored::Colorize;

use crate::runner::ScanReport;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "text" | "txt" => Some(Self::Text),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

pub fn format_kv_line(label: &str, value: &str) -> String {
    format!(":: {:<10}: {}", label, value)
}

pub fn info_line(message: &str) -> String {
    format!(
        "{}{}{} {}",
        "[".bold().white(),
        "INF".bold().blue(),
        "]".bold().white(),
        message
    )
}

pub fn warn_line(message: &str) -> String {
    format!(
        "{}{}{} {}",
        "[".bold().white(),
        "WRN".bold().yellow(),
        "]".bold().white(),
        message
    )
}

pub fn error_line(message: &str) -> String {
    format!(
        "{}{}{} {}",
        "[".bold().white(),
        "ERR".bold().red(),
        "]".bold().white(),
        message
    )
}

pub fn render_text(report: &ScanReport) -> String {
    let mut out = String::new();
    if report.vulnerable.is_empty() {
        out.push_str("\nNo vulnerable URLs found.\n");
    } else {
        out.push_str(&format!("\n{}\n", "vuln URL(s) found:".bold().red()));
        for url in &report.vulnerable {
            out.push_str(url);
            out.push('\n');
        }
    }
    out.push('\n');
    out.push_str(&format_kv_line(
        "Scanned",
        &format!(
            "{}/{} clean={} failed={} workers={}",
            report.processed, report.total, report.clean, report.failed, report.workers
        ),
    ));
    out.push('\n');
    out.push_str(&format!(
        "\nTime: {:.2} seconds\n",
        report.elapsed.as_secs_f64()
    ));
    out
}

pub fn render_json(report: &ScanReport) -> String {
    serde_json::to_string_pretty(report).unwrap_or_else(|_| "{}".to_string())
}

pub fn render(report: &ScanReport, format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => render_text(report),
        OutputFormat::Json => render_json(report),
    }
}
