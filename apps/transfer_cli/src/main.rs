use std::{path::PathBuf, process::ExitCode, sync::Arc};

use anyhow::Result;
use clap::{Parser, Subcommand};
use shared::domain::Location;
use transfer_core::{
    executor::TransferOutcome, search::SearchCommit, transport::HttpDataEngine, HostContext,
    TransferSession,
};
use tracing::info;

mod config;

use config::{load_settings, Settings};

#[derive(Parser, Debug)]
#[command(name = "transfer-cli", about = "Move a tracked case to a new owning location")]
struct Args {
    /// Settings file; defaults to ./transfer.toml when present.
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    base_url: Option<String>,
    #[arg(long)]
    username: Option<String>,
    #[arg(long)]
    password: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List top-level locations.
    Roots,
    /// Search locations by partial name.
    Search { text: String },
    /// Show the case's current owning location.
    Locate {
        #[arg(long)]
        case: String,
    },
    /// Transfer ownership of a case within a program.
    Transfer {
        #[arg(long)]
        case: String,
        #[arg(long)]
        program: String,
        #[arg(long)]
        to: String,
        /// Current owner, when already known; otherwise it is looked up.
        #[arg(long)]
        current: Option<String>,
        #[arg(long)]
        cascade_enrollment: bool,
    },
}

fn apply_overrides(settings: &mut Settings, args: &Args) {
    if let Some(v) = &args.base_url {
        settings.base_url = v.clone();
    }
    if let Some(v) = &args.username {
        settings.username = Some(v.clone());
    }
    if let Some(v) = &args.password {
        settings.password = Some(v.clone());
    }
    if let Command::Transfer {
        cascade_enrollment: true,
        ..
    } = args.command
    {
        settings.cascade_enrollment_location = true;
    }
}

fn print_locations(locations: &[Location]) {
    for location in locations {
        match &location.path {
            Some(path) => println!("{}\t{}\t{path}", location.id, location.display_name),
            None => println!("{}\t{}", location.id, location.display_name),
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
    let args = Args::parse();

    let mut settings = load_settings(args.config.as_deref())?;
    apply_overrides(&mut settings, &args);
    info!(base_url = %settings.base_url, "transfer-cli starting");

    let engine = Arc::new(HttpDataEngine::new(&settings.base_url, settings.auth())?);
    let config = settings.transfer_config();

    let code = match args.command {
        Command::Roots => {
            let session = TransferSession::new(engine, config, HostContext::default());
            session.load_roots().await;
            let snapshot = session.snapshot().await;
            match snapshot.tree_error {
                Some(err) => {
                    eprintln!("{err}");
                    ExitCode::FAILURE
                }
                None => {
                    print_locations(&snapshot.roots);
                    ExitCode::SUCCESS
                }
            }
        }
        Command::Search { text } => {
            let min_chars = config.search_min_chars;
            let session = TransferSession::new(engine, config, HostContext::default());
            let commit = session.run_search(&text).await;
            let snapshot = session.snapshot().await;
            match commit {
                SearchCommit::Cleared => {
                    eprintln!("Type at least {min_chars} characters to search.");
                    ExitCode::FAILURE
                }
                SearchCommit::Failed | SearchCommit::Stale => {
                    eprintln!(
                        "{}",
                        snapshot
                            .search_error
                            .unwrap_or_else(|| "Search was interrupted.".to_string())
                    );
                    ExitCode::FAILURE
                }
                SearchCommit::Results(0) => {
                    println!("No matching org units.");
                    ExitCode::SUCCESS
                }
                SearchCommit::Results(_) => {
                    print_locations(&snapshot.search_results);
                    ExitCode::SUCCESS
                }
            }
        }
        Command::Locate { case } => {
            let context = HostContext::new(Some(case.as_str()), None, None);
            let session = TransferSession::new(engine, config, context);
            session.refresh_current_location().await;
            let snapshot = session.snapshot().await;
            match snapshot.current_location_id {
                Some(id) => println!("{id}\t{}", snapshot.current_location_label),
                None => println!("{}", snapshot.current_location_label),
            }
            ExitCode::SUCCESS
        }
        Command::Transfer {
            case,
            program,
            to,
            current,
            ..
        } => {
            let context = HostContext::new(
                Some(case.as_str()),
                Some(program.as_str()),
                current.as_deref(),
            );
            let session = TransferSession::new(engine, config, context);
            session.refresh_current_location().await;
            session.select_from_tree(&[], &to).await;

            let snapshot = session.snapshot().await;
            println!("Current owner: {}", snapshot.current_location_label);
            match (&snapshot.destination, &snapshot.destination_error) {
                (Some(destination), _) => println!("New owner: {}", destination.display_name),
                (None, Some(err)) => eprintln!("{err}"),
                (None, None) => {}
            }
            for warning in &snapshot.decision.warnings {
                eprintln!("warning: {}", warning.message());
            }

            match session.submit().await {
                None => {
                    eprintln!("Transfer is not allowed for this selection.");
                    ExitCode::from(2)
                }
                Some(outcome @ TransferOutcome::Success { .. }) => {
                    println!("{}", outcome.message());
                    ExitCode::SUCCESS
                }
                Some(outcome) => {
                    eprintln!("{}", outcome.message());
                    ExitCode::FAILURE
                }
            }
        }
    };

    Ok(code)
}
