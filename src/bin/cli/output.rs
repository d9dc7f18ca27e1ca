//! Output formatting for CLI operations.

use serde_json::json;
use nestpack::{ArchiveSummary, BatchReport};

/// Trait for output formatting
pub trait OutputFormatter {
    /// Formats the outcome of a batch run
    fn format_report(&self, report: &BatchReport) -> String;

    /// Formats an archive summary
    fn format_summary(&self, summary: &ArchiveSummary) -> String;
}

/// Human-readable output formatter
pub struct HumanFormatter {
    /// Print per-file recursion counters
    pub verbose: bool,
}

impl OutputFormatter for HumanFormatter {
    fn format_report(&self, report: &BatchReport) -> String {
        let mut output = String::new();

        for file in &report.processed {
            let marker = if file.changed { "M" } else { "-" };
            output.push_str(&format!("{} {}\n", marker, file.relative_path));
            if self.verbose {
                let r = &file.report;
                output.push_str(&format!(
                    "    archives: {}, recursed: {}, replaced: {}, kept: {}, raw: {}\n",
                    r.archives_processed,
                    r.entries_recursed,
                    r.entries_replaced,
                    r.entries_fell_back + r.entries_unreadable,
                    r.entries_copied_raw
                ));
            }
        }

        let nested: usize = report
            .processed
            .iter()
            .map(|f| f.report.entries_recursed)
            .sum();
        let fell_back: usize = report
            .processed
            .iter()
            .map(|f| f.report.entries_fell_back)
            .sum();

        output.push_str(&"-".repeat(40));
        output.push('\n');
        output.push_str(&format!(
            "{} processed, {} changed, {} nested archives visited\n",
            report.processed.len(),
            report.changed_count(),
            nested
        ));
        if fell_back > 0 {
            output.push_str(&format!(
                "{} entries kept their original bytes (replacement missing)\n",
                fell_back
            ));
        }

        if !report.failed.is_empty() {
            output.push_str(&format!("\n{} failed:\n", report.failed.len()));
            for failure in &report.failed {
                output.push_str(&format!("  {}: {}\n", failure.relative_path, failure.error));
            }
        }

        output
    }

    fn format_summary(&self, summary: &ArchiveSummary) -> String {
        let mut output = String::new();

        output.push_str(&format!("Archive: {}\n", summary.path.display()));
        output.push_str(&"-".repeat(40));
        output.push('\n');
        output.push_str(&format!("  Entries:          {}\n", summary.entries.len()));
        output.push_str(&format!(
            "  Conditioned:      {}\n",
            if summary.is_conditioned() { "Yes" } else { "No" }
        ));
        output.push_str(&format!(
            "  Exclude children: {}\n",
            if summary.excludes_children() { "Yes" } else { "No" }
        ));

        if let Some(metadata) = &summary.metadata {
            output.push_str("\nMetadata:\n");
            for (key, value) in metadata.iter() {
                output.push_str(&format!("  {} = {}\n", key, value));
            }
        }

        output.push_str("\nEntries:\n");
        for name in &summary.entries {
            output.push_str(&format!("  {}\n", name));
        }

        output
    }
}

/// JSON output formatter
pub struct JsonFormatter;

impl OutputFormatter for JsonFormatter {
    fn format_report(&self, report: &BatchReport) -> String {
        let obj = json!({
            "success": report.is_success(),
            "processed": report.processed.iter().map(|f| json!({
                "path": f.relative_path,
                "output": f.output.display().to_string(),
                "changed": f.changed,
                "archives_processed": f.report.archives_processed,
                "entries_recursed": f.report.entries_recursed,
                "entries_replaced": f.report.entries_replaced,
                "entries_fell_back": f.report.entries_fell_back,
                "entries_unreadable": f.report.entries_unreadable,
                "entries_copied_raw": f.report.entries_copied_raw,
            })).collect::<Vec<_>>(),
            "failed": report.failed.iter().map(|f| json!({
                "path": f.relative_path,
                "error": f.error,
            })).collect::<Vec<_>>(),
        });

        serde_json::to_string_pretty(&obj).unwrap_or_else(|_| "{}".to_string())
    }

    fn format_summary(&self, summary: &ArchiveSummary) -> String {
        let metadata = summary.metadata.as_ref().map(|m| {
            m.iter()
                .map(|(k, v)| (k.to_string(), json!(v)))
                .collect::<serde_json::Map<_, _>>()
        });
        let obj = json!({
            "path": summary.path.display().to_string(),
            "entries": summary.entries,
            "conditioned": summary.is_conditioned(),
            "exclude_children": summary.excludes_children(),
            "metadata": metadata,
        });

        serde_json::to_string_pretty(&obj).unwrap_or_else(|_| "{}".to_string())
    }
}

/// Creates the appropriate formatter based on output format
pub fn create_formatter(format: super::OutputFormat, verbose: bool) -> Box<dyn OutputFormatter> {
    match format {
        super::OutputFormat::Human => Box::new(HumanFormatter { verbose }),
        super::OutputFormat::Json => Box::new(JsonFormatter),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nestpack::{ProcessReport, ProcessedFile};

    fn report() -> BatchReport {
        BatchReport {
            processed: vec![ProcessedFile {
                relative_path: "app.pkg".to_string(),
                output: "out/app.pkg".into(),
                changed: true,
                report: ProcessReport {
                    archives_processed: 2,
                    entries_recursed: 1,
                    entries_replaced: 1,
                    entries_copied_raw: 3,
                    ..ProcessReport::default()
                },
            }],
            failed: Vec::new(),
        }
    }

    #[test]
    fn test_verbose_lists_counters_per_file() {
        let text = HumanFormatter { verbose: true }.format_report(&report());

        assert!(text.starts_with("M app.pkg\n"));
        assert!(text.contains("    archives: 2, recursed: 1, replaced: 1, kept: 0, raw: 3\n"));
    }

    #[test]
    fn test_default_output_has_no_counters() {
        let text = HumanFormatter { verbose: false }.format_report(&report());

        assert!(text.starts_with("M app.pkg\n"));
        assert!(!text.contains("recursed:"));
    }
}
