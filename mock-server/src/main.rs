use batchui_mock::{app, AppState, Dataset};
use clap::Parser;
use common::{Config, LoggingConfig};
use std::path::PathBuf;
use tokio::net::TcpListener;

#[derive(Parser)]
#[command(author, version, about = "JSON-RPC server answering the batch execution methods from fixtures", long_about = None)]
struct Cli {
    /// Config file (.yaml, .yml or .toml)
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Address to listen on, overrides the config file
    #[arg(short, long)]
    bind: Option<String>,
    /// JSON array of executions, overrides the config file
    #[arg(long)]
    fixtures: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(bind) = cli.bind {
        config.server.bind = bind;
    }
    if cli.fixtures.is_some() {
        config.server.fixtures = cli.fixtures;
    }

    setup_logging(&config.logging)?;
    log::info!("Starting batchui-mock...");

    let dataset = Dataset::load(config.server.fixtures.as_deref())?;
    log::info!("Loaded {} executions", dataset.len());

    let state = AppState {
        dataset,
        max_page_size: config.server.max_page_size as u64,
    };
    let router = app(state, &config.server.endpoint);

    let listener = TcpListener::bind(&config.server.bind).await?;
    log::info!(
        "Listening on http://{}{}",
        listener.local_addr()?,
        config.server.endpoint
    );
    axum::serve(listener, router).await?;
    Ok(())
}

fn setup_logging(logging: &LoggingConfig) -> anyhow::Result<()> {
    let mut dispatch = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{}][{}][{}] {}",
                chrono::Local::now().format("%Y-%m-%d][%H:%M:%S"),
                record.target(),
                record.level(),
                message
            ))
        })
        .level(logging.level_filter())
        .chain(std::io::stdout());

    if let Some(path) = &logging.output {
        dispatch = dispatch.chain(fern::log_file(path)?);
    }

    dispatch.apply()?;
    Ok(())
}
