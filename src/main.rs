use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use genrelay::cli::{Cli, Command};
use genrelay::ui::{self, JobProgress};
use genrelay::{
    Dispatcher, GenerationRequest, GenrelayConfig, JobHandle, JobSnapshot, JobState,
    OptimizeMode, Submission,
};

const REFRESH: Duration = Duration::from_millis(250);

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match &cli.command {
        Command::Providers => {
            let dispatcher = load_dispatcher(&cli)?;
            ui::print_providers(&dispatcher.providers());
        }
        Command::TestProvider { id } => {
            let dispatcher = load_dispatcher(&cli)?;
            let check = dispatcher.test_provider(id).await?;
            ui::print_check(&check);
            if !check.is_ok() {
                bail!("provider {id} failed the check");
            }
        }
        Command::Batch { .. } => {
            let dispatcher = load_dispatcher(&cli)?;
            run_batch(&dispatcher, cli.command.batch_requests(cli.provider.as_deref()), cli.verbose)
                .await?;
        }
        Command::Demo => run_demo(cli.verbose).await?,
        command => {
            let request = command
                .to_request(cli.provider.as_deref())
                .context("command does not describe a generation request")?;
            let dispatcher = load_dispatcher(&cli)?;
            let snapshot = execute(&dispatcher, request, cli.verbose).await?;
            if snapshot.state == JobState::Failed {
                bail!("job {} failed", snapshot.id);
            }
        }
    }

    Ok(())
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "genrelay=debug" } else { "genrelay=error" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn load_dispatcher(cli: &Cli) -> Result<Dispatcher> {
    let config = GenrelayConfig::load(cli.config.as_deref()).context("loading configuration")?;
    Ok(Dispatcher::from_config(&config)?)
}

/// Submits a request and reports it until it settles (or Ctrl-C cancels it).
async fn execute(
    dispatcher: &Dispatcher,
    request: GenerationRequest,
    verbose: bool,
) -> Result<JobSnapshot> {
    let snapshot = match dispatcher.run(request).await? {
        Submission::Finished(snapshot) => {
            ui::print_snapshot(&snapshot);
            snapshot
        }
        Submission::Pending(handle) => follow(dispatcher, &handle).await?,
    };
    if verbose {
        ui::print_audit(&snapshot);
    }
    Ok(snapshot)
}

async fn follow(dispatcher: &Dispatcher, handle: &JobHandle) -> Result<JobSnapshot> {
    let mut progress = JobProgress::start(&format!("{} job {}", handle.kind, handle.id));
    loop {
        tokio::select! {
            snapshot = dispatcher.wait(handle.id, REFRESH) => {
                let snapshot = snapshot?;
                if snapshot.is_terminal() {
                    progress.finish(&snapshot);
                    return Ok(snapshot);
                }
                progress.update(&snapshot);
            }
            _ = tokio::signal::ctrl_c() => {
                dispatcher.cancel(handle.id)?;
                let snapshot = dispatcher.poll(handle.id)?;
                progress.finish(&snapshot);
                return Ok(snapshot);
            }
        }
    }
}

/// Submits all requests at once, then reports each job in input order.
async fn run_batch(
    dispatcher: &Dispatcher,
    requests: Vec<GenerationRequest>,
    verbose: bool,
) -> Result<()> {
    let total = requests.len();
    let mut failed = 0;
    for (i, submitted) in dispatcher.submit_batch(requests).into_iter().enumerate() {
        println!();
        println!("▶ {}/{total}", i + 1);
        let handle = match submitted {
            Ok(handle) => handle,
            Err(err) => {
                println!("  rejected: {err}");
                failed += 1;
                continue;
            }
        };
        let snapshot = follow(dispatcher, &handle).await?;
        if verbose {
            ui::print_audit(&snapshot);
        }
        if snapshot.state == JobState::Failed {
            failed += 1;
        }
    }
    if failed > 0 {
        bail!("{failed} of {total} batch jobs failed");
    }
    Ok(())
}

/// Runs one job of each kind against scripted providers: the first text
/// provider is always rate limited, the TTS provider fails once.
async fn run_demo(verbose: bool) -> Result<()> {
    let dispatcher = Dispatcher::from_config(&GenrelayConfig::demo())?;
    ui::print_providers(&dispatcher.providers());

    let requests = [
        GenerationRequest::text(
            "Our new coffee shop opens downtown this weekend.",
            OptimizeMode::Social,
        ),
        GenerationRequest::video("A paper boat drifting down a rainy street"),
        GenerationRequest::audio("Welcome to the demo."),
    ];

    for request in requests {
        println!();
        println!("▶ {} request", request.kind());
        execute(&dispatcher, request, verbose).await?;
    }
    Ok(())
}
