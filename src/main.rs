use clap::Parser;
use colored::control;
use confligt::{GitRepository, Settings};
use std::num::NonZeroUsize;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod status;
mod watch;

const EXAMPLES: &str = "\
Examples:
  # Filter by branches that were updated a day ago
  $ confligt --since='1 day'

  # Filter by branches that start with foo- or bar-
  $ confligt --filter='\\b(foo|bar)-'

  # Inspect branches in the remote named alice. Use develop as the default branch.
  $ confligt --remote=alice --main=develop";

#[derive(Parser)]
#[command(name = "confligt")]
#[command(version)]
#[command(about = "Find conflicting branches in git repositories")]
#[command(
    long_about = "Confligt finds conflicting branches in git repositories.\n\n\
Without any arguments or flags, confligt will inspect all local branches in the current working \
directory - that have commits since 7 days ago - against each other and against the main branch \
of the default remote (origin) to find conflicting pairs."
)]
#[command(after_help = EXAMPLES)]
struct Cli {
    /// Path to the git repository
    #[arg(default_value = ".")]
    path: PathBuf,

    /// Config file (default is $HOME/.confligt.toml)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Name of remote [default: origin]
    #[arg(short, long)]
    remote: Option<String>,

    /// Name of main branch [default: master]
    #[arg(short, long)]
    main: Option<String>,

    /// Consider branches with commits since [default: "7 days"]
    #[arg(short, long)]
    since: Option<String>,

    /// Regular expression to match branch names against
    #[arg(long)]
    filter: Option<String>,

    /// Display verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Fetch from remote before inspecting
    #[arg(long)]
    fetch: bool,

    /// Inspect only your own branches
    #[arg(long)]
    mine: bool,

    /// Find conflicts for local branches only [default: true]
    #[arg(long, value_name = "BOOL", num_args = 0..=1, default_missing_value = "true")]
    local_only: Option<bool>,

    /// Number of branches to check concurrently [default: NUMCPUs/2]
    #[arg(long)]
    concurrency: Option<NonZeroUsize>,

    #[arg(long, help = "Output results as JSON")]
    json: bool,

    #[arg(long, help = "Re-check whenever branches change")]
    watch: bool,
}

impl Cli {
    /// Flags as the highest-precedence settings layer
    fn settings(&self) -> Settings {
        Settings {
            remote: self.remote.clone(),
            main: self.main.clone(),
            since: self.since.clone(),
            filter: self.filter.clone(),
            verbose: self.verbose.then_some(true),
            fetch: self.fetch.then_some(true),
            mine: self.mine.then_some(true),
            local_only: self.local_only,
            concurrency: self.concurrency,
        }
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "info" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();
}

fn fail(e: impl std::fmt::Display) -> ! {
    eprintln!("Error: {}", e);
    std::process::exit(1);
}

fn main() {
    let cli = Cli::parse();

    let settings = match Settings::load(cli.config.as_deref()) {
        Ok(file) => file.merge(cli.settings()),
        Err(e) => fail(e),
    };
    init_tracing(settings.verbose());

    // Force colors unless the output is meant for machines
    control::set_override(!cli.json);

    let options = settings.to_options().unwrap_or_else(|e| fail(e));
    let repo = GitRepository::discover(&cli.path).unwrap_or_else(|e| fail(e));

    if settings.fetch() {
        info!("Fetching from remote {}...", settings.remote());
        if let Err(e) = repo.fetch(settings.remote()) {
            fail(e);
        }
    }

    if cli.watch {
        if let Err(e) = watch::run_watch_mode(&repo, &options, settings.verbose()) {
            eprintln!("Error running watch mode: {}", e);
            std::process::exit(1);
        }
        return;
    }

    match status::run_status(&repo, &options, settings.verbose(), cli.json) {
        Ok(report) if report.summary().any_conflicts => std::process::exit(2),
        Ok(_) => {}
        Err(e) => fail(e),
    }
}
