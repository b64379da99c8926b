use clap::{Parser, Subcommand};
use common::{Config, Extensions, Location, PaginationState};
use std::path::PathBuf;

mod dashboard;
mod render;

use dashboard::Dashboard;
use render::OutputFormat;

#[derive(Parser)]
#[command(author, version, about = "Terminal dashboard for batch executions", long_about = None)]
struct Cli {
    /// Config file (.yaml, .yml or .toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
    /// Base URL of the backend, overrides the config file
    #[arg(long, global = true)]
    url: Option<String>,
    #[arg(short, long, global = true, value_enum, default_value = "table")]
    format: OutputFormat,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Welcome page and menu
    Home,
    /// Paginated execution history
    Executions {
        /// 1-based page
        #[arg(long)]
        page: Option<u32>,
        #[arg(long)]
        size: Option<u32>,
        /// Only executions of this batch
        #[arg(long)]
        batch: Option<String>,
    },
    /// Latest execution of every batch
    LastExecutions,
    /// One execution and its steps
    Execution {
        id: String,
    },
    /// Open a location such as "/executions?page=2"
    Open {
        location: String,
    },
    /// Interactive paging, commands are read from stdin
    Browse {
        #[arg(default_value = "/executions")]
        location: String,
    },
}

fn executions_location(page: Option<u32>, size: Option<u32>, batch: Option<String>, default_size: u32) -> Location {
    let state = PaginationState {
        page: page.unwrap_or(1).saturating_sub(1),
        page_size: size.filter(|s| *s > 0).unwrap_or(default_size),
        batch: batch.filter(|b| !b.is_empty()),
    };
    Location::parse(&format!("/executions?{}", state.to_query()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(url) = cli.url {
        config.client.base_url = url;
    }

    env_logger::Builder::new()
        .filter_level(config.logging.level_filter())
        .parse_default_env()
        .init();

    let default_size = config.client.page_size;
    let dashboard = Dashboard::new(config, Extensions::default())?;
    let format = cli.format;

    match cli.command {
        Commands::Home => {
            dashboard.home();
            Ok(())
        }
        Commands::Executions { page, size, batch } => {
            let location = executions_location(page, size, batch, default_size);
            dashboard.open(&location, format).await
        }
        Commands::LastExecutions => dashboard.last_executions(format).await,
        Commands::Execution { id } => dashboard.execution(&id, format).await,
        Commands::Open { location } => dashboard.open(&Location::parse(&location), format).await,
        Commands::Browse { location } => dashboard.browse(&Location::parse(&location), format).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn executions_flags_become_a_location() {
        let location = executions_location(Some(3), Some(20), Some("nightly".into()), 10);
        assert_eq!(location.to_string(), "/executions?page=3&size=20&batch=nightly");

        let location = executions_location(None, Some(0), Some(String::new()), 15);
        assert_eq!(location.to_string(), "/executions?page=1&size=15");
    }

    #[test]
    fn cli_parses_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["batchui", "execution", "42", "--format", "json"]).unwrap();
        assert_eq!(cli.format, OutputFormat::Json);
        assert!(matches!(cli.command, Commands::Execution { id } if id == "42"));
    }
}
