//! Re-run the prediction whenever branch references change

mod watcher;

use crate::status::{self, ConsoleSink};
use colored::Colorize;
use confligt::{GitRepository, PredictOptions, RunContext, predict};
use std::io;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::{Duration, Instant};

/// Wait this long after the last ref change before re-checking
const DEBOUNCE: Duration = Duration::from_secs(1);

/// How often the loop wakes up to check the debounce timer
const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Entry point for watch mode - runs until the process is interrupted
pub fn run_watch_mode(
    repo: &GitRepository,
    options: &PredictOptions,
    verbose: bool,
) -> Result<(), io::Error> {
    let (tx, rx) = mpsc::channel();
    let _watcher = watcher::setup_watcher(repo.git_dir(), tx)?;

    print_event(&format!("Watching {}", repo.git_dir().display()));
    refresh(repo, options, verbose);

    // Debouncing: track when we last saw an event
    let mut last_event_time: Option<Instant> = None;

    loop {
        match rx.recv_timeout(POLL_INTERVAL) {
            Ok(()) => last_event_time = Some(Instant::now()),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => return Ok(()),
        }

        if let Some(last_time) = last_event_time
            && last_time.elapsed() > DEBOUNCE
        {
            last_event_time = None;
            print_event("Refs changed - re-checking");
            refresh(repo, options, verbose);
        }
    }
}

/// Run one prediction and print a one-line summary; errors don't stop watching
fn refresh(repo: &GitRepository, options: &PredictOptions, verbose: bool) {
    let sink = ConsoleSink::new(false);
    let ctx = RunContext::new(&sink, verbose);

    match predict(repo, options, &ctx) {
        Ok(report) => {
            let summary = report.summary();
            let msg = if summary.any_conflicts {
                format!(
                    "{} branch(es) conflicting with {}, {} conflicting with each other",
                    summary.conflicting_with_main, report.main, summary.conflicting_with_each_other
                )
            } else {
                "no conflicts".to_string()
            };
            print_event(&msg);
            if ctx.verbose {
                status::print_summary(&report);
            }
        }
        Err(e) => print_event(&format!("{} {}", "Refresh error:".red(), e)),
    }
}

fn print_event(event: &str) {
    let timestamp = chrono::Local::now().format("%H:%M:%S").to_string();
    println!("[{}] {}", timestamp.bright_black(), event);
}
