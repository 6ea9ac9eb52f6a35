//! tsync CLI entry point.

use clap::Parser;
use std::process::ExitCode;
use tripsync::cli::commands;
use tripsync::cli::{Cli, Commands};
use tripsync::error::Error;

fn main() -> ExitCode {
    let cli = Cli::parse();

    if cli.no_color {
        colored::control::set_override(false);
    }

    // Set up tracing based on verbosity
    init_tracing(cli.verbose, cli.quiet);

    // Resolve effective JSON mode: --json OR non-TTY stdout
    let json = cli.json || !std::io::IsTerminal::is_terminal(&std::io::stdout());

    match run(&cli, json) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if json {
                eprintln!("{}", e.to_structured_json());
            } else if !cli.quiet {
                if let Some(hint) = e.hint() {
                    eprintln!("Error: {e}\n  Hint: {hint}");
                } else {
                    eprintln!("Error: {e}");
                }
            }
            ExitCode::from(e.exit_code())
        }
    }
}

fn init_tracing(verbose: u8, quiet: bool) {
    use tracing_subscriber::EnvFilter;

    if quiet {
        return;
    }

    // Honor RUST_LOG if set, otherwise use verbosity flag
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        match verbose {
            0 => EnvFilter::new("warn"),
            1 => EnvFilter::new("info"),
            2 => EnvFilter::new("debug,rusqlite=info,hyper=info,reqwest=info"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn run(cli: &Cli, json: bool) -> Result<(), Error> {
    match &cli.command {
        Commands::Init { force } => commands::init::execute(cli.db.as_deref(), *force, json),
        Commands::Version => commands::version::execute(json),

        // Records
        Commands::Save(args) => commands::entity::execute_save(args, cli, json),
        Commands::Get { kind, id } => commands::entity::execute_get(*kind, id, cli, json),
        Commands::List(args) => commands::entity::execute_list(args, cli, json),
        Commands::Delete { kind, id, cascade } => {
            commands::entity::execute_delete(*kind, id, *cascade, cli, json)
        }
        Commands::History { kind, id, limit } => {
            commands::entity::execute_history(*kind, id, *limit, cli, json)
        }

        // Field toggles
        Commands::Field { command } => commands::field::execute(command, cli, json),

        // Sync
        Commands::Sync { command } => commands::sync::execute(command, cli, json),

        // Shell completions
        Commands::Completions { shell } => commands::completions::execute(shell),
    }
}
