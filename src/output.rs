//! Progress/summary formatting (SPEC_FULL.md component C10).
//!
//! `JsonFormatter` emits the same newline-delimited JSON event stream shape
//! as the teacher's `sync::output::SyncEvent`, adapted to this spec's
//! `FileDifference`/`Report` shapes; `HumanFormatter` prints colored
//! per-category summaries the way the teacher's `main.rs` does with the
//! `colored` crate.

use crate::model::{Action, DifferenceReason};
use crate::report::{Report, StatsSnapshot};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::sync::Mutex;

/// One action about to be (or, in dry-run, hypothetically) taken on a path.
pub struct ReportEvent<'a> {
    pub relative_path: &'a str,
    pub action: Action,
    pub reason: Option<&'a str>,
}

pub trait OutputFormatter: Send + Sync {
    fn on_scan_complete(&self, total: u64);
    fn on_progress(&self, path: &str, bytes_processed: u64, total_bytes: u64);
    fn on_event(&self, event: &ReportEvent<'_>);
    fn on_finish(&self, report: &Report);
}

/// Renders a single `indicatif` spinner-turned-bar across the whole run,
/// the way the teacher's `main.rs` drives one progress bar per sync rather
/// than one per file (per-file bars would thrash the terminal under the
/// worker pool's concurrency).
#[derive(Default)]
pub struct HumanFormatter {
    pub verbose: bool,
    bar: Mutex<Option<ProgressBar>>,
}

impl HumanFormatter {
    pub fn new(verbose: bool) -> Self {
        Self { verbose, bar: Mutex::new(None) }
    }
}

impl OutputFormatter for HumanFormatter {
    fn on_scan_complete(&self, total: u64) {
        println!("{} {} entries", "scanned".blue(), total);
        if self.verbose || total == 0 {
            return;
        }
        let bar = ProgressBar::new(total);
        if let Ok(style) = ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})",
        ) {
            bar.set_style(style.progress_chars("#>-"));
        }
        *self.bar.lock().expect("progress bar mutex poisoned") = Some(bar);
    }

    fn on_progress(&self, path: &str, bytes_processed: u64, total_bytes: u64) {
        if self.verbose {
            println!("  {} {}/{} bytes", path.dimmed(), bytes_processed, total_bytes);
            return;
        }
        if let Some(bar) = self.bar.lock().expect("progress bar mutex poisoned").as_ref() {
            bar.set_message(path.to_string());
        }
    }

    fn on_event(&self, event: &ReportEvent<'_>) {
        if let Some(bar) = self.bar.lock().expect("progress bar mutex poisoned").as_ref() {
            bar.inc(1);
        }
        if !self.verbose {
            return;
        }
        let label = match event.action {
            Action::Copy => "copy".green(),
            Action::Update => "update".yellow(),
            Action::Delete => "delete".red(),
            Action::Skip => "skip".dimmed(),
            Action::Conflict => "conflict".magenta(),
            Action::None => "ok".normal(),
        };
        match event.reason {
            Some(reason) => println!("{label} {} ({reason})", event.relative_path),
            None => println!("{label} {}", event.relative_path),
        }
    }

    fn on_finish(&self, report: &Report) {
        if let Some(bar) = self.bar.lock().expect("progress bar mutex poisoned").take() {
            bar.finish_and_clear();
        }
        let snapshot = report.snapshot();
        println!(
            "{} copied, {} updated, {} deleted, {} skipped, {} unchanged, {} errored, {} conflicts",
            snapshot.copied.to_string().green(),
            snapshot.updated.to_string().yellow(),
            snapshot.deleted.to_string().red(),
            snapshot.skipped.to_string().dimmed(),
            snapshot.unchanged,
            snapshot.errored.to_string().red(),
            snapshot.conflicts.to_string().magenta(),
        );
        for error in report.errors() {
            eprintln!("{} {error}", "error:".red().bold());
        }
    }
}

#[derive(Default)]
pub struct JsonFormatter;

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum SyncEvent<'a> {
    ScanComplete {
        total: u64,
    },
    Progress {
        path: &'a str,
        bytes_processed: u64,
        total_bytes: u64,
    },
    Action {
        path: &'a str,
        action: &'static str,
        reason: Option<&'a str>,
    },
    Summary {
        stats: StatsSnapshot,
        status: &'static str,
        errors: Vec<String>,
        differences: Vec<DifferenceSummary>,
    },
}

#[derive(Serialize)]
struct DifferenceSummary {
    path: String,
    reason: &'static str,
    details: String,
}

fn action_label(action: Action) -> &'static str {
    match action {
        Action::None => "none",
        Action::Copy => "copy",
        Action::Update => "update",
        Action::Delete => "delete",
        Action::Skip => "skip",
        Action::Conflict => "conflict",
    }
}

fn emit(event: &SyncEvent<'_>) {
    if let Ok(json) = serde_json::to_string(event) {
        println!("{json}");
    }
}

impl OutputFormatter for JsonFormatter {
    fn on_scan_complete(&self, total: u64) {
        emit(&SyncEvent::ScanComplete { total });
    }

    fn on_progress(&self, path: &str, bytes_processed: u64, total_bytes: u64) {
        emit(&SyncEvent::Progress { path, bytes_processed, total_bytes });
    }

    fn on_event(&self, event: &ReportEvent<'_>) {
        emit(&SyncEvent::Action {
            path: event.relative_path,
            action: action_label(event.action),
            reason: event.reason,
        });
    }

    fn on_finish(&self, report: &Report) {
        let differences = report
            .differences()
            .into_iter()
            .map(|d| DifferenceSummary {
                path: d.relative_path,
                reason: reason_label(d.reason),
                details: d.details,
            })
            .collect();
        emit(&SyncEvent::Summary {
            stats: report.snapshot(),
            status: status_label(report.status()),
            errors: report.errors(),
            differences,
        });
    }
}

fn reason_label(reason: DifferenceReason) -> &'static str {
    reason.as_str()
}

/// Which bucket of spec.md section 6's difference-report `changes` object a
/// [`DifferenceReason`] falls into. Errors are not a `changes` bucket but
/// are still surfaced (section 7: "differences reports always include
/// errored files even under `sync` where unchanged files are suppressed").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChangeBucket {
    Addition,
    Modification,
    Deletion,
    Conflict,
    Skipped,
    Error,
}

fn bucket_for(reason: DifferenceReason) -> ChangeBucket {
    match reason {
        DifferenceReason::OnlyInSource => ChangeBucket::Addition,
        DifferenceReason::HashDifferent | DifferenceReason::ContentDifferent | DifferenceReason::SizeDifferent => {
            ChangeBucket::Modification
        }
        DifferenceReason::Deleted | DifferenceReason::OnlyInDest => ChangeBucket::Deletion,
        DifferenceReason::Skipped => ChangeBucket::Skipped,
        DifferenceReason::CopyError | DifferenceReason::UpdateError => ChangeBucket::Error,
    }
}

#[derive(Serialize)]
struct DiffEntry {
    path: String,
    size: u64,
    reason: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

#[derive(Serialize, Default)]
struct Changes {
    additions: Vec<DiffEntry>,
    modifications: Vec<DiffEntry>,
    deletions: Vec<DiffEntry>,
    conflicts: Vec<DiffEntry>,
}

#[derive(Serialize)]
struct DiffSummary {
    total_changes: usize,
    total_size: u64,
    unchanged: u64,
}

#[derive(Serialize)]
struct DiffReportJson {
    operation_id: String,
    dry_run: bool,
    changes: Changes,
    summary: DiffSummary,
}

fn entry_size(difference: &crate::model::FileDifference) -> u64 {
    difference
        .source_info
        .as_ref()
        .or(difference.dest_info.as_ref())
        .map(|info| info.size)
        .unwrap_or(0)
}

fn to_entry(difference: &crate::model::FileDifference) -> DiffEntry {
    DiffEntry {
        path: difference.relative_path.clone(),
        size: entry_size(difference),
        reason: difference.reason.as_str(),
        details: if difference.details.is_empty() { None } else { Some(difference.details.clone()) },
    }
}

/// Renders the structured differences report spec.md section 6 describes:
/// `json` is `{operation_id, dry_run, changes: {additions, modifications,
/// deletions, conflicts}, summary: {total_changes, total_size, unchanged}}`;
/// `human` is grouped text headings per reason. Conflicts (bidirectional
/// only) are reported separately from the plain `differences[]` list since
/// they carry resolution/winner information the `changes` bucket does not.
pub fn render_diff_report(report: &Report, dry_run: bool, format: DiffReportFormat) -> String {
    let differences = report.differences();
    let mut changes = Changes::default();
    let mut total_size = 0u64;
    for difference in &differences {
        let bucket = bucket_for(difference.reason);
        let entry = to_entry(difference);
        match bucket {
            ChangeBucket::Addition => {
                total_size += entry.size;
                changes.additions.push(entry);
            }
            ChangeBucket::Modification => {
                total_size += entry.size;
                changes.modifications.push(entry);
            }
            ChangeBucket::Deletion => changes.deletions.push(entry),
            ChangeBucket::Error => changes.conflicts.push(entry),
            ChangeBucket::Skipped => {}
        }
    }
    for conflict in report.conflicts() {
        changes.conflicts.push(DiffEntry {
            path: conflict.relative_path.clone(),
            size: conflict
                .source_entry
                .as_ref()
                .or(conflict.dest_entry.as_ref())
                .map(|info| info.size)
                .unwrap_or(0),
            reason: "Conflict",
            details: conflict.result_description.clone(),
        });
    }

    let snapshot = report.snapshot();
    let total_changes =
        changes.additions.len() + changes.modifications.len() + changes.deletions.len() + changes.conflicts.len();

    match format {
        DiffReportFormat::Json => {
            let payload = DiffReportJson {
                operation_id: report.operation_id().to_string(),
                dry_run,
                changes,
                summary: DiffSummary { total_changes, total_size, unchanged: snapshot.unchanged },
            };
            serde_json::to_string_pretty(&payload).unwrap_or_default()
        }
        DiffReportFormat::Human => {
            let mut sections = Vec::new();
            push_human_section(&mut sections, "Additions", &changes.additions);
            push_human_section(&mut sections, "Modifications", &changes.modifications);
            push_human_section(&mut sections, "Deletions", &changes.deletions);
            push_human_section(&mut sections, "Conflicts", &changes.conflicts);
            sections.push(format!(
                "\nSummary: {total_changes} changes, {total_size} bytes, {} unchanged",
                snapshot.unchanged
            ));
            sections.join("\n")
        }
    }
}

fn push_human_section(sections: &mut Vec<String>, heading: &str, entries: &[DiffEntry]) {
    if entries.is_empty() {
        return;
    }
    let mut section = format!("{heading}:");
    for entry in entries {
        section.push_str(&format!("\n  {} ({} bytes)", entry.path, entry.size));
        if let Some(details) = &entry.details {
            section.push_str(&format!(" - {details}"));
        }
    }
    sections.push(section);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffReportFormat {
    Json,
    Human,
}

fn status_label(status: crate::report::ReportStatus) -> &'static str {
    use crate::report::ReportStatus;
    match status {
        ReportStatus::Success => "success",
        ReportStatus::Partial => "partial",
        ReportStatus::Failed => "failed",
        ReportStatus::Cancelled => "cancelled",
    }
}
