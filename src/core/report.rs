//! Progress and final report formatting.
//!
//! Everything here is plain text; the bot layer puts it into embeds and picks
//! the colour from [`ReportColor`].

use crate::core::engine::{
    Counts, ExecutionReport, Notice, NoticeKind, ProgressSnapshot, RunState,
};

/// Discord embed descriptions are capped at 4096 characters.
pub const MAX_DESCRIPTION_LEN: usize = 4096;

/// Colour family of a report embed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportColor {
    /// Nothing failed or was skipped
    Green,
    /// Skips but no failures, or in progress
    Orange,
    /// At least one failure, or the run did not complete
    Red,
    /// Preparing
    Grey,
}

/// Generates a progress bar string like `[####......] (4/10)`.
///
/// # Arguments
/// * `done` - Statements processed
/// * `total` - Statements in the file
/// * `bar_length` - Length of the bar in characters (default 10)
#[must_use]
pub fn format_progress_bar(done: usize, total: usize, bar_length: Option<usize>) -> String {
    let length = bar_length.unwrap_or(10);
    let filled = if total == 0 {
        0
    } else {
        (done.min(total) * length) / total
    };
    let empty = length.saturating_sub(filled);
    format!("[{}{}] ({done}/{total})", "#".repeat(filled), ".".repeat(empty))
}

/// Short counter line used while running.
#[must_use]
pub fn format_status_line(counts: &Counts) -> String {
    format!(
        "✅ {} | ❌ {} | ⚠️ {}",
        counts.succeeded, counts.failed, counts.skipped
    )
}

/// Labelled counter line used in the final report.
#[must_use]
pub fn format_summary_line(counts: &Counts) -> String {
    format!(
        "✅ {} Succeeded | ❌ {} Failed | ⚠️ {} Skipped",
        counts.succeeded, counts.failed, counts.skipped
    )
}

/// One log line. Failures and skips already carry their own icon or wording;
/// everything else is quoted with an info marker.
#[must_use]
pub fn format_notice(notice: &Notice) -> String {
    match notice.kind {
        NoticeKind::Failed | NoticeKind::Skipped => notice.to_string(),
        NoticeKind::Message | NoticeKind::Info => format!("> ℹ️ {notice}"),
    }
}

/// Description body of a progress update.
#[must_use]
pub fn render_progress(snapshot: &ProgressSnapshot) -> String {
    let notices = snapshot
        .recent
        .iter()
        .map(format_notice)
        .collect::<Vec<_>>()
        .join("\n");
    let mut text = format!(
        "Processing file: `{}`\nProgress: {}\n{}\n\n{notices}",
        snapshot.file_name,
        format_progress_bar(snapshot.processed, snapshot.counts.total, None),
        format_status_line(&snapshot.counts),
    );
    if let Some(line) = &snapshot.loading_line {
        text.push_str(&format!("\n\n```{line}```"));
    }
    truncate(&text, MAX_DESCRIPTION_LEN)
}

/// Embed title for a finished run.
#[must_use]
pub const fn report_title(report: &ExecutionReport) -> &'static str {
    match (report.state, report.is_undo) {
        (RunState::Cancelled, _) => "Execution Terminated",
        (RunState::Stalled, _) => "Execution Stalled",
        (_, true) => "Execution Undo Finished",
        (_, false) => "Execution Finished",
    }
}

/// Embed colour for a finished run.
#[must_use]
pub const fn report_color(report: &ExecutionReport) -> ReportColor {
    match report.state {
        RunState::Cancelled | RunState::Stalled => ReportColor::Red,
        RunState::Preparing => ReportColor::Grey,
        RunState::Running | RunState::Completed => {
            if report.counts.failed > 0 {
                ReportColor::Red
            } else if report.counts.skipped > 0 {
                ReportColor::Orange
            } else {
                ReportColor::Green
            }
        }
    }
}

/// Description body of a finished run.
///
/// When the log does not fit, the oldest lines are dropped and a marker says
/// how many.
#[must_use]
pub fn render_report(report: &ExecutionReport) -> String {
    let mut header = format!(
        "File: `{}`\nTook {:.2} seconds.\n\n**Summary:** {}",
        report.artifact.display_name(),
        report.duration.as_secs_f64(),
        format_summary_line(&report.counts),
    );
    if report.unprocessed > 0 {
        header.push_str(&format!("\n{} statement(s) not processed.", report.unprocessed));
    }
    header.push_str("\n\n**Log:**\n");

    if report.notices.is_empty() {
        header.push_str("*No notices*");
        return header;
    }

    let lines: Vec<String> = report.notices.iter().map(format_notice).collect();
    let budget = MAX_DESCRIPTION_LEN.saturating_sub(header.chars().count() + 40);
    let mut kept = Vec::new();
    let mut used = 0;
    for line in lines.iter().rev() {
        let len = line.chars().count() + 1;
        if used + len > budget {
            break;
        }
        used += len;
        kept.push(line.as_str());
    }
    kept.reverse();

    let dropped = lines.len() - kept.len();
    if dropped > 0 {
        header.push_str(&format!("*… {dropped} earlier line(s) omitted*\n"));
    }
    header.push_str(&kept.join("\n"));
    header
}

/// Cuts `text` to at most `max` characters, ending with `…` when cut.
#[must_use]
pub fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(max.saturating_sub(1)).collect();
    cut.push('…');
    cut
}
