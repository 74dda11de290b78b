mod prompt;

use std::process::ExitCode;

use anyhow::Result;
use jira2gh::{
    Backend, Config, Credentials, DryRun, GhCli, GraphQlBoard, JiraClient, Outcome, ProjectBoard,
    Progress, RunOptions, parse_args, run,
};
use prompt::StdinPrompter;
use tracing::debug;

const EXIT_ERROR: u8 = 2;

fn handle_clap_help_version(clap_err: &clap::Error) -> ExitCode {
    use clap::error::ErrorKind;
    match clap_err.kind() {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
            print!("{clap_err}");
            ExitCode::SUCCESS
        }
        _ => {
            eprint!("{clap_err}");
            ExitCode::from(EXIT_ERROR)
        }
    }
}

fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();
}

type Board = Box<dyn ProjectBoard + Send + Sync>;

fn select_board(options: &RunOptions, credentials: &Credentials) -> Result<Board> {
    let board: Board = match options.backend {
        Backend::Gh => Box::new(GhCli::new()),
        Backend::Api => Box::new(GraphQlBoard::new(&credentials.github_token)?),
    };
    debug!(backend = ?options.backend, dry_run = options.dry_run, "selected GitHub backend");

    Ok(if options.dry_run {
        Box::new(DryRun::new(board))
    } else {
        board
    })
}

async fn sync(config: Config, options: RunOptions, credentials: Credentials) -> Result<Outcome> {
    let jira = JiraClient::new(&config.jira, credentials.jira_token.clone())?;
    let board = select_board(&options, &credentials)?;

    let mut progress = Progress::new(std::io::stdout(), options.quiet);
    if options.dry_run {
        progress.line(format_args!("Dry run: the GitHub project will not be modified."))?;
    }

    let mut prompter = StdinPrompter::new();
    run(&config, &jira, &board, &mut prompter, &mut progress).await
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    let (config, options) = match parse_args(std::env::args_os()) {
        Ok(result) => result,
        Err(err) => {
            if let Some(clap_err) = err.downcast_ref::<clap::Error>() {
                return handle_clap_help_version(clap_err);
            }
            eprintln!("Error: {err:#}");
            return ExitCode::from(EXIT_ERROR);
        }
    };

    let credentials = match Credentials::from_env() {
        Ok(credentials) => credentials,
        Err(err) => {
            eprintln!("Error: {err}");
            return ExitCode::from(EXIT_ERROR);
        }
    };

    match sync(config, options, credentials).await {
        Ok(outcome) => ExitCode::from(outcome.exit_code()),
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::from(EXIT_ERROR)
        }
    }
}
