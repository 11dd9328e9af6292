// Panflute - plays what you point it at, remembers the playlist between runs
// Engine, playlist and scanner live in the library; this is just the front door

use anyhow::Result;
use clap::Parser;
use panflute::audio::backend::RodioBackend;
use panflute::audio::EngineEvent;
use panflute::notify::Observable;
use panflute::{App, FileTagReader, RunExit, Settings};
use std::path::PathBuf;
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "panflute")]
#[command(about = "Play music files and folders, continuing the saved playlist")]
struct Args {
    /// Files or directories to add to the playlist
    paths: Vec<PathBuf>,

    /// Pick tracks at random
    #[arg(long)]
    shuffle: bool,

    /// Start over after the last track
    #[arg(long)]
    repeat: bool,

    /// Enable developer logging (stderr + debug output)
    #[arg(long)]
    dev: bool,
}

fn init_logging(dev: bool) -> Result<WorkerGuard> {
    let log_dir = PathBuf::from("logs");
    std::fs::create_dir_all(&log_dir)?;

    // Daily rotating file appender
    let file_appender = tracing_appender::rolling::daily(&log_dir, "panflute.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let base_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,panflute=debug"));

    let file_layer = fmt::layer()
        .with_writer(file_writer)
        .with_target(true)
        .with_level(true)
        .with_ansi(false);

    // Dev mode mirrors everything to stderr as well
    let stderr_layer = dev.then(|| fmt::layer().with_writer(std::io::stderr).with_target(true));

    tracing_subscriber::registry()
        .with(base_filter)
        .with(file_layer)
        .with(stderr_layer)
        .try_init()?;

    Ok(guard)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let _log_guard = init_logging(args.dev)?;

    let settings = Settings::load()?;
    let mut app = App::new(RodioBackend::create, FileTagReader::new(), settings);
    app.force_modes(args.shuffle, args.repeat);
    if !app.configure() {
        error!("No usable audio output");
        anyhow::bail!("could not open the audio device (details in logs/)");
    }

    app.load_playlist();
    if !args.paths.is_empty() {
        let added = app.add_paths(args.paths).await?;
        info!("Added {} records from the command line", added);
        println!("Added {} tracks", added);
    }

    if app.playlist().is_empty() {
        println!("Nothing to play");
        app.shutdown()?;
        return Ok(());
    }

    app.engine_mut().subscribe(Box::new(|event: &EngineEvent| {
        if let EngineEvent::CurrentMediaChanged(Some(path)) = event {
            println!("Playing {}", path.display());
        }
    }));
    app.set_exit_when_finished(true);
    app.play_current();

    let exit = app
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Cannot listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await;
    match exit {
        RunExit::Shutdown => info!("Interrupted"),
        RunExit::PlaylistFinished => info!("Playlist finished"),
    }

    app.shutdown()?;
    Ok(())
}
