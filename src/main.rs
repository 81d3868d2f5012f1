#![allow(clippy::enum_variant_names)]

use clap::Parser as _;
use tracing::{Subscriber, debug};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::util::SubscriberInitExt as _;

use crate::{
    application::{Application, ApplicationError, LogLevel},
    cli::Cli,
};

mod application;
mod backup;
mod cli;
mod config;
mod driver;
mod ext;
mod scanner;
mod scheduler;
mod watcher;

#[compio::main]
#[snafu::report]
async fn main() -> Result<(), ApplicationError> {
    let cli_args = Cli::parse();
    setup_tracing(&cli_args);
    debug!("Parsed CLI arguments: {cli_args:?}");

    Application::run(cli_args).await?;

    Ok(())
}

fn setup_tracing(cli_args: &Cli) {
    if let Some(subscriber) = log_subscriber(cli_args.log_level, std::io::stdout) {
        subscriber.init();
    }
}

/// Compact lines with wall-clock timestamps. `None` for `LogLevel::Silent`.
fn log_subscriber<W>(
    log_level: LogLevel,
    writer: W,
) -> Option<impl Subscriber + Send + Sync + 'static>
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    log_level.to_tracing_level().map(|level| {
        tracing_subscriber::fmt()
            .with_max_level(level)
            .with_writer(writer)
            .compact()
            .finish()
    })
}
