use colored::{ColoredString, Colorize};
use confligt::{
    ConflictReport, Event, EventSink, GitRepository, Phase, PredictOptions, PredictResult,
    RunContext, Summary, TracingSink, predict,
};
use serde::Serialize;

/// JSON output structure for a run
#[derive(Debug, Serialize)]
struct StatusOutput<'a> {
    summary: Summary,
    report: &'a ConflictReport,
}

/// Prints conflicts as comparisons finish; other events go to the log
pub struct ConsoleSink {
    /// Suppress live output so stdout stays valid JSON
    json: bool,
}

impl ConsoleSink {
    pub fn new(json: bool) -> Self {
        Self { json }
    }
}

impl EventSink for ConsoleSink {
    fn emit(&self, event: &Event<'_>) {
        match event {
            Event::Checked { phase, check } => {
                let Ok(merge) = &check.result else {
                    return TracingSink.emit(event);
                };
                let count = merge.conflicts();
                if count == 0 || self.json {
                    return;
                }
                let (first, second) = match phase {
                    Phase::AgainstMain => (
                        severity(&check.target.short, count),
                        check.source.short.cyan(),
                    ),
                    Phase::Pairwise => (
                        severity(&check.source.short, count),
                        severity(&check.target.short, count),
                    ),
                };
                println!("{} conflicts with {} [{} conflict(s)]", first, second, count);
            }
            // A local branch tracking main is expected to be merged
            Event::AlreadyMerged { branch, main } if main.short.contains(branch.short.as_str()) => {}
            Event::Finished { .. } => {}
            _ => TracingSink.emit(event),
        }
    }
}

/// Yellow for a single conflict, red for more
fn severity(text: &str, count: usize) -> ColoredString {
    if count == 1 {
        text.yellow()
    } else {
        text.red()
    }
}

/// Green when `good`, red otherwise
fn verdict(value: usize, good: bool) -> ColoredString {
    if good {
        value.to_string().green()
    } else {
        value.to_string().red()
    }
}

/// Display summary statistics
pub fn print_summary(report: &ConflictReport) {
    let summary = report.summary();

    println!(
        "Found {} branch(es) conflicting with {}",
        verdict(
            summary.conflicting_with_main,
            summary.conflicting_with_main == 0
        ),
        report.main.bright_white().bold()
    );
    println!(
        "Inspected {} branch combination(s)",
        report.pairs_checked.to_string().bright_blue().bold()
    );

    if !summary.any_conflicts {
        println!("{}", "No conflicting branches found".green());
    } else {
        println!(
            "Found {} branch(es) conflicting with each other",
            verdict(
                summary.conflicting_with_each_other,
                summary.conflicting_with_each_other == 0
            )
        );
    }

    if !report.already_merged.is_empty() {
        println!(
            "{} branch(es) already merged into {}",
            report.already_merged.len().to_string().yellow(),
            report.main
        );
    }
    if summary.failed > 0 {
        println!(
            "  {} {} could not be checked",
            summary.failed.to_string().bright_red().bold(),
            if summary.failed == 1 {
                "comparison"
            } else {
                "comparisons"
            }
        );
    }
    if report.cancelled {
        println!("{}", "Run was cancelled; results are partial".bright_yellow());
    }
}

/// Predict once and print the results.
///
/// Returns the report so callers can pick an exit code.
pub fn run_status(
    repo: &GitRepository,
    options: &PredictOptions,
    verbose: bool,
    json: bool,
) -> PredictResult<ConflictReport> {
    let sink = ConsoleSink::new(json);
    let ctx = RunContext::new(&sink, verbose);

    let report = predict(repo, options, &ctx)?;

    if json {
        let output = StatusOutput {
            summary: report.summary(),
            report: &report,
        };
        match serde_json::to_string_pretty(&output) {
            Ok(json_str) => println!("{}", json_str),
            Err(e) => eprintln!("Error serializing to JSON: {}", e),
        }
    } else if ctx.verbose {
        print_summary(&report);
    }

    Ok(report)
}
