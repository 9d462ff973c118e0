extern crate dotenv;
extern crate serenity;

use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dotenv::dotenv;
use serenity::prelude::*;
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use prediction_bot::app::App;
use prediction_bot::config::Settings;
use prediction_bot::discord::{AppKey, DiscordGateway, Handler};
use prediction_bot::leaguepedia::Leaguepedia;
use prediction_bot::store::pg::PgStore;

const DB_CONNECTIONS: u32 = 8;

/// Logs to stderr, or to a daily file when a log directory is configured.
fn init_tracing(settings: &Settings) -> Option<WorkerGuard> {
    let filter = || EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match &settings.log_dir {
        Some(dir) => {
            let file_appender = tracing_appender::rolling::daily(dir, "prediction-bot.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            tracing_subscriber::fmt()
                .with_env_filter(filter())
                .with_writer(non_blocking)
                .with_ansi(false)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter())
                .with_writer(std::io::stderr)
                .init();
            None
        }
    }
}

fn main() {
    dotenv().ok();
    let settings = match Settings::from_env() {
        Ok(settings) => settings,
        Err(err) => {
            eprintln!("Invalid configuration: {}", err);
            process::exit(1);
        }
    };
    let _log_guard = init_tracing(&settings);

    if let Err(err) = run(settings) {
        error!("{}", err);
        process::exit(1);
    }
}

fn run(settings: Settings) -> Result<(), Box<dyn std::error::Error>> {
    let store = Arc::new(PgStore::connect(&settings.database_url, DB_CONNECTIONS)?);
    let schedule = Arc::new(Leaguepedia::new(
        &settings.wiki_api_endpoint,
        settings.wiki_page_size,
        settings.wiki_timeout,
    )?);

    let mut client = Client::new(&settings.discord_token, Handler)?;
    let chat = Arc::new(DiscordGateway::connect(client.cache_and_http.http.clone())?);

    let interval = settings.reconcile_interval;
    let app = Arc::new(App::new(store, chat, schedule, settings));
    {
        let mut data = client.data.write();
        data.insert::<AppKey>(app.clone());
    }

    let shutdown = Arc::new(AtomicBool::new(false));
    let reconciler = app.reconciler.clone().spawn(interval, shutdown.clone());

    info!("starting Discord client");
    let result = client.start();

    shutdown.store(true, Ordering::SeqCst);
    if reconciler.join().is_err() {
        error!("reconciliation thread panicked");
    }
    result?;
    Ok(())
}
