//! Console output: progress bars, status lines and the verbose error table.

use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use packmirror::fetch::{ErrorMap, FallbackReport, ProgressSink};
use packmirror::mirror::MirrorNotice;
use packmirror::sync::{SyncObserver, SyncPhase, SyncStatus, SyncSummary};

const BAR_TEMPLATE: &str = "{spinner:.blue} [{elapsed_precise}] {wide_bar:.cyan/blue} {pos}/{len} ({per_sec}, {eta})";
const SPINNER_TEMPLATE: &str = "{spinner:.blue} [{elapsed_precise}] {pos} files ({per_sec})";

/// One progress bar per scheduler batch.
#[derive(Default)]
pub struct BarProgress {
    bar: Option<ProgressBar>,
}

impl BarProgress {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProgressSink for BarProgress {
    fn start(&mut self, total: Option<usize>) {
        let (bar, template) = match total {
            Some(len) => (ProgressBar::new(len as u64), BAR_TEMPLATE),
            None => (ProgressBar::new_spinner(), SPINNER_TEMPLATE),
        };
        if let Ok(style) = ProgressStyle::with_template(template) {
            bar.set_style(style.progress_chars("=> "));
        }
        self.bar = Some(bar);
    }

    fn progress(&mut self) {
        if let Some(bar) = &self.bar {
            bar.inc(1);
        }
    }

    fn end(&mut self) {
        if let Some(bar) = self.bar.take() {
            bar.finish_and_clear();
        }
    }
}

/// Prints status lines as the run advances.
pub struct ConsoleObserver {
    verbose: bool,
}

impl ConsoleObserver {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }
}

impl SyncObserver for ConsoleObserver {
    fn on_phase(&mut self, phase: SyncPhase) {
        let label = match phase {
            SyncPhase::ShardFetch => "Fetching shards",
            SyncPhase::PackageFetch => "Fetching packages",
            SyncPhase::Publish => "Publishing",
            SyncPhase::Clean => "Cleaning",
            _ => return,
        };
        println!("{}", style(label).bold());
    }

    fn on_shard_start(&mut self, index: usize, total: usize, uri: &str) {
        println!("  [{}/{}] {}", index + 1, total, style(uri).cyan());
    }

    fn on_batch_errors(&mut self, errors: &ErrorMap) {
        if self.verbose {
            for line in error_table(errors) {
                println!("    {}", line);
            }
        }
    }

    fn on_mirror_notice(&mut self, notice: &MirrorNotice) {
        match notice {
            MirrorNotice::Disabled { .. } => {
                println!("  {} {}", style("disabled:").red().bold(), notice)
            }
            MirrorNotice::Warning { .. } => {
                println!("  {} {}", style("warning:").yellow(), notice)
            }
        }
    }

    fn on_fallback(&mut self, report: &FallbackReport) {
        println!(
            "  retried {} on origin, {} recovered",
            report.retried.len(),
            report.recovered.len()
        );
    }
}

/// Render `mirror | path | error` rows with aligned columns.
pub fn error_table(errors: &ErrorMap) -> Vec<String> {
    if errors.is_empty() {
        return Vec::new();
    }

    let headers = ("Mirror", "Path", "Error");
    let mirror_width = errors
        .values()
        .map(|f| f.mirror.len())
        .chain([headers.0.len()])
        .max()
        .unwrap_or(0);
    let path_width = errors
        .keys()
        .map(String::len)
        .chain([headers.1.len()])
        .max()
        .unwrap_or(0);

    let mut lines = Vec::with_capacity(errors.len() + 2);
    lines.push(format!(
        "{:<mw$}  {:<pw$}  {}",
        headers.0,
        headers.1,
        headers.2,
        mw = mirror_width,
        pw = path_width
    ));
    lines.push(format!(
        "{}  {}  {}",
        "-".repeat(mirror_width),
        "-".repeat(path_width),
        "-".repeat(headers.2.len())
    ));
    for (path, failure) in errors {
        lines.push(format!(
            "{:<mw$}  {:<pw$}  {}",
            failure.mirror,
            path,
            failure.message,
            mw = mirror_width,
            pw = path_width
        ));
    }
    lines
}

/// Format a byte count for humans.
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} bytes", bytes)
    }
}

/// Final status lines. Always printed, whatever the verbosity.
pub fn print_summary(summary: &SyncSummary, verbose: bool) {
    match summary.status {
        SyncStatus::UpToDate => println!("{}", style("Mirror is up to date").green()),
        SyncStatus::ShardsUpToDate => {
            println!("{}", style("Root index updated, shards up to date").green())
        }
        SyncStatus::Updated => println!(
            "{} {} shards, {} packages fetched",
            style("Mirror updated:").green().bold(),
            summary.shards_fetched,
            summary.packages_fetched()
        ),
        SyncStatus::Incomplete => println!(
            "{} {} of {} shards failed, mirror not published (will retry next run)",
            style("warning:").yellow().bold(),
            summary.shard_errors.len(),
            summary.shards_total
        ),
    }

    let failures = summary.final_failure_count();
    if failures > 0 {
        println!(
            "{} {} packages could not be fetched",
            style("warning:").yellow().bold(),
            failures
        );
        if verbose {
            let errors: ErrorMap = summary
                .final_failures()
                .map(|(uri, f)| (uri.to_string(), f.clone()))
                .collect();
            for line in error_table(&errors) {
                println!("  {}", line);
            }
        }
    }

    if verbose {
        for (host, count) in &summary.mirror_errors {
            println!("  {} fetch errors from {}", count, host);
        }
    }

    if let Some(clean) = &summary.clean {
        if !clean.refused {
            println!(
                "Removed {} unreferenced files ({})",
                clean.files_removed,
                format_bytes(clean.bytes_freed)
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use packmirror::fetch::{FailureKind, FetchFailure};

    #[test]
    fn test_error_table_aligns_columns() {
        let mut errors = ErrorMap::new();
        errors.insert(
            "p/acme/tool$aa.json".to_string(),
            FetchFailure::new(FailureKind::Status(503), "https://m1.example.org", "HTTP 503"),
        );
        errors.insert(
            "p/b$bb.json".to_string(),
            FetchFailure::new(FailureKind::Timeout, "https://m2", "request timed out"),
        );

        let lines = error_table(&errors);
        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("Mirror"));
        let column = lines[0].find("Path").unwrap();
        assert_eq!(lines[2].find("p/acme").unwrap(), column);
        assert_eq!(lines[3].find("p/b$").unwrap(), column);
    }

    #[test]
    fn test_error_table_empty() {
        assert!(error_table(&ErrorMap::new()).is_empty());
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 bytes");
        assert_eq!(format_bytes(2048), "2.00 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.00 MB");
    }

    #[test]
    fn test_bar_progress_lifecycle() {
        let mut progress = BarProgress::new();
        progress.start(Some(2));
        progress.progress();
        progress.progress();
        progress.end();
        assert!(progress.bar.is_none());
        progress.progress();
    }
}
