use clap::Parser;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod app;
mod cli;
mod config;
mod enrich;
mod memory;
mod semantic;
mod storage;
mod store;
#[cfg(test)]
mod tests;
mod web;

use app::AppFactory;
use cli::Command;

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(filter)
        .init();
}

fn main() -> anyhow::Result<()> {
    init_logging();

    let args = cli::Args::parse();
    let config = AppFactory::load_config()?;

    // everything but `enrich` needs the model and the store
    let service = || AppFactory::create_service(&config);

    match args.command {
        Command::Daemon { bind } => cli::handle_daemon(service()?, &config, bind),

        Command::Ingest {
            title,
            url,
            content,
            timestamp,
        } => cli::handle_ingest(
            &service()?,
            cli::activity_record(title, url, content, timestamp),
        ),

        Command::Recall { text, top_k } => cli::handle_recall(&service()?, &text, top_k),

        Command::List { limit } => cli::handle_list(&service()?, limit),

        Command::Delete { ids, all, yes } => cli::handle_delete(&service()?, ids, all, yes),

        Command::Enrich {
            url,
            title,
            content,
        } => cli::handle_enrich(&config, cli::activity_record(title, url, content, None)),
    }
}
