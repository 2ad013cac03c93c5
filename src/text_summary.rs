//! Text summary builder for CLI output.

use crate::model::SessionReport;

/// Pre-formatted lines for text output.
pub(crate) struct TextSummary {
    pub lines: Vec<String>,
}

pub(crate) fn build_text_summary(report: &SessionReport) -> TextSummary {
    let mut lines = Vec::new();

    lines.push(format!("Destination: {} ({})", report.era_name, report.era_id));
    lines.push(format!("Original: {}", report.original.describe()));
    lines.push(format!("Result:   {}", report.result.describe()));

    if !report.edits.is_empty() {
        lines.push("Edits:".to_string());
        for (i, edit) in report.edits.iter().enumerate() {
            lines.push(format!("  {}. {edit}", i + 1));
        }
    }

    if let Some(analysis) = report.analysis.as_deref() {
        lines.push("Analysis:".to_string());
        lines.extend(analysis.lines().map(|l| format!("  {l}")));
    }

    if let Some(path) = report.saved_path.as_deref() {
        lines.push(format!("Saved: {}", path.display()));
    }

    TextSummary { lines }
}
