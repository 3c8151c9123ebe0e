use flexi_logger::{Cleanup, Criterion, Duplicate, FileSpec, Logger, Naming};
use log::{error, info};
use reqwest::Client;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tokio::sync::watch;

use tunebridge::bus::{dbus, Bus};
use tunebridge::config::{get_or, AppDirs, ConfigStore, TomlConfig, DOWNLOAD_PATH, UPDATE_SOURCES};
use tunebridge::control::{self, ControlContext};
use tunebridge::download::HttpDownloader;
use tunebridge::error::App;
use tunebridge::headless::{HeadlessShell, HeadlessTray, HeadlessWindows};
use tunebridge::media::StandardOrdering;
use tunebridge::plugin::{DirectLinkPlugin, PluginManager};
use tunebridge::update::{HttpManifestSource, DEFAULT_UPDATE_SOURCES};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), App> {
    let dirs = AppDirs::from_env()?;
    dirs.ensure().await?;

    // Logger setup
    Logger::try_with_str("info")?
        .log_to_file(FileSpec::default().directory(&dirs.logs))
        .rotate(
            Criterion::Size(1_000_000),
            Naming::Timestamps,
            Cleanup::KeepLogFiles(3),
        )
        .duplicate_to_stderr(Duplicate::None)
        .start()?;

    let config = Arc::new(TomlConfig::load(&dirs.config_file, &dirs).await?);
    let (stop_sender, stop_receiver) = watch::channel(());
    let ctx = Arc::new(build_context(config, &dirs, stop_sender).await);

    let bus = Bus::connect(dbus::serve().await?);
    control::setup(&bus, &ctx)?;
    for (channel, kind) in bus.channels() {
        info!("Listening on {} ({:?})", channel, kind);
    }

    wait_for_stop_signal(stop_receiver).await;
    info!("tunebridge stopped");
    process::exit(0);
}

async fn build_context(
    config: Arc<TomlConfig>,
    dirs: &AppDirs,
    stop_sender: watch::Sender<()>,
) -> ControlContext {
    let client = Client::new();
    let download_dir: String =
        get_or(config.as_ref(), DOWNLOAD_PATH, dirs.downloads.to_string_lossy().into_owned()).await;
    let default_sources: Vec<String> = DEFAULT_UPDATE_SOURCES.iter().map(|url| (*url).to_string()).collect();
    let update_sources = get_or(config.as_ref(), UPDATE_SOURCES, default_sources).await;

    let mut plugins = PluginManager::new();
    plugins.register(Arc::new(DirectLinkPlugin));

    ControlContext {
        store: Arc::new(control::playback_store(Arc::new(HeadlessTray::new()))),
        config: config as Arc<dyn ConfigStore>,
        windows: Arc::new(HeadlessWindows::with_main()),
        shell: Arc::new(HeadlessShell::new(stop_sender)),
        plugins: Arc::new(plugins),
        ordering: Arc::new(StandardOrdering),
        downloader: Arc::new(HttpDownloader::new(client.clone(), PathBuf::from(download_dir))),
        manifests: Arc::new(HttpManifestSource::new(client)),
        update_sources,
        version: env!("CARGO_PKG_VERSION").to_string(),
    }
}

async fn wait_for_stop_signal(mut stop_receiver: watch::Receiver<()>) {
    tokio::select! {
        changed = stop_receiver.changed() => {
            if let Err(e) = changed {
                error!("Stop signal lost: {}", e);
            }
        }
        interrupted = tokio::signal::ctrl_c() => {
            if let Err(e) = interrupted {
                error!("Failed to listen for SIGINT: {}", e);
            }
            info!("Interrupted");
        }
    }
}
