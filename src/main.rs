use clap::Parser;
use tracing::error;

use sentient_race::cli::{self, Cli, Command, ConfigCommand};
use sentient_race::config::Config;
use sentient_race::logging::init_logging;
use sentient_race::server::http::serve;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Some(Command::Version) = cli.command {
        cli::handle_version();
        return;
    }

    let config = match Config::load(cli.config_path.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(2);
        }
    };

    if let Err(e) = init_logging(&config.logging) {
        eprintln!("Warning: {}", e);
    }

    let result: Result<(), Box<dyn std::error::Error>> = match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(&config).await.map_err(Into::into),
        Command::Resolve { handle, size, out } => {
            cli::handle_resolve(&config, &handle, size, out.as_deref()).await
        }
        Command::Config(ConfigCommand::Show) => cli::handle_config_show(&config),
        Command::Config(ConfigCommand::Get { key }) => cli::handle_config_get(&config, &key),
        Command::Version => {
            cli::handle_version();
            Ok(())
        }
    };

    if let Err(e) = result {
        error!(error = %e, "command failed");
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
