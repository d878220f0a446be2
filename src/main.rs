//! Main entry point for treepass.

use clap::Parser;
use colored::Colorize;
use treepass::cli::{Cli, Commands};
use treepass::interactive::InteractiveStore;
use treepass::utils::error_exit;

#[tokio::main]
async fn main() {
    // Set up colored output for Windows
    #[cfg(windows)]
    colored::control::set_virtual_terminal(true).ok();

    let cli = Cli::parse();
    treepass::logging::init(cli.verbose);

    match &cli.command {
        None | Some(Commands::Shell) => run_interactive(&cli).await,
        Some(command) => {
            if let Err(e) = cli.execute(command).await {
                error_exit(&e.to_string(), 1);
            }
        }
    }
}

/// Run the interactive shell.
async fn run_interactive(cli: &Cli) {
    if !(atty::is(atty::Stream::Stdin) && atty::is(atty::Stream::Stdout)) {
        eprintln!(
            "{}",
            "The shell needs a terminal. Run 'treepass --help' for one-shot commands.".yellow()
        );
        std::process::exit(2);
    }

    let config = match cli.load_config() {
        Ok(config) => config,
        Err(e) => error_exit(&e.to_string(), 1),
    };

    match InteractiveStore::new(config) {
        Ok(mut shell) => {
            if let Err(e) = shell.run().await {
                error_exit(&e.to_string(), 1);
            }
        }
        Err(e) => error_exit(&e.to_string(), 1),
    }
}
