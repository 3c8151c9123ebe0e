//! Channel handlers of the control process.

use log::{debug, error, info, warn};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task;

use crate::bus::channel::{
    CheckUpdate, DownloadMedia, Event, ExitApp, IgnoreMouse, MinWindow, OpenUrl, Ping, SendToLyricWindow,
    SetDesktopLyricLock, SetLyricWindow, ShowOpenDialog, ShowSaveDialog, SyncCurrentMusic,
    SyncCurrentPlayingState, SyncCurrentRepeatMode,
};
use crate::bus::Bus;
use crate::config::{ConfigStore, DownloadSettings, LOCK_LYRIC};
use crate::download::Downloader;
use crate::error::App;
use crate::media::{MediaItem, QualityOrdering};
use crate::plugin::PluginLookup;
use crate::resolver::SourceResolver;
use crate::store::{PlaybackSnapshot, Store};
use crate::update::{check_update, ManifestSource};
use crate::window::{Shell, Tray, WindowHandle, WindowKind, WindowProvider};

/// Everything the handlers touch, owned once and shared by reference.
pub struct ControlContext {
    pub store: Arc<Store<PlaybackSnapshot>>,
    pub config: Arc<dyn ConfigStore>,
    pub windows: Arc<dyn WindowProvider>,
    pub shell: Arc<dyn Shell>,
    pub plugins: Arc<dyn PluginLookup>,
    pub ordering: Arc<dyn QualityOrdering>,
    pub downloader: Arc<dyn Downloader>,
    pub manifests: Arc<dyn ManifestSource>,
    pub update_sources: Vec<String>,
    pub version: String,
}

/// Playback store whose every mutation refreshes the tray.
pub fn playback_store(tray: Arc<dyn Tray>) -> Store<PlaybackSnapshot> {
    let store = Store::new(PlaybackSnapshot::default());
    store.observe(move |snapshot| tray.refresh(snapshot));
    store
}

impl ControlContext {
    fn main_window(&self) -> Result<Arc<dyn WindowHandle>, App> {
        self.windows
            .get_window(WindowKind::Main)
            .ok_or_else(|| App::WindowMissing(WindowKind::Main.to_string()))
    }

    /// Resolves the best available source and downloads it. `Ok(None)` when
    /// there is no main window to download for.
    pub async fn download_media(&self, item: &MediaItem) -> Result<Option<PathBuf>, App> {
        if self.windows.get_window(WindowKind::Main).is_none() {
            return Ok(None);
        }

        let settings = DownloadSettings::read(self.config.as_ref()).await;
        let resolved = SourceResolver::new(self.plugins.as_ref(), self.ordering.as_ref())
            .resolve(item, settings.default_quality, settings.when_quality_missing)
            .await?;
        if resolved.quality != settings.default_quality {
            info!(
                "{} not available at {}, downloading {}",
                item, settings.default_quality, resolved.quality
            );
        }

        let path = self
            .downloader
            .download(item, resolved.quality, &resolved.source.url, &resolved.headers)
            .await?;
        Ok(Some(path))
    }

    pub async fn set_lyric_lock(&self, locked: bool) -> Result<(), App> {
        if !self.config.set(LOCK_LYRIC, toml::Value::Boolean(locked)).await? {
            return Ok(());
        }
        if let Some(lyric) = self.windows.get_window(WindowKind::Lyric) {
            lyric.set_ignore_mouse_events(locked, locked);
        }
        Ok(())
    }

    fn set_lyric_window(&self, enabled: bool) {
        if !enabled {
            self.windows.close_window(WindowKind::Lyric);
        } else if self.windows.get_window(WindowKind::Lyric).is_none() {
            self.windows.create_window(WindowKind::Lyric);
        }
    }
}

/// Registers every control-process channel on `bus`.
pub fn setup(bus: &Bus, ctx: &Arc<ControlContext>) -> Result<(), App> {
    on_window_events(bus, ctx);
    on_playback_sync(bus, ctx);
    on_lyric_events(bus, ctx);

    let c = Arc::clone(ctx);
    bus.on::<DownloadMedia, _>(move |request| {
        let ctx = Arc::clone(&c);
        task::spawn(async move {
            let item = request.media_item;
            match ctx.download_media(&item).await {
                Ok(Some(path)) => info!("Saved {} as {}", item, path.display()),
                Ok(None) => debug!("No main window, ignoring download of {}", item),
                Err(e) => error!("Download of {} failed: {}", item, e),
            }
        });
    });

    let c = Arc::clone(ctx);
    bus.handle::<ShowOpenDialog, _, _>(move |options| {
        let ctx = Arc::clone(&c);
        async move {
            ctx.main_window()?;
            ctx.shell.show_open_dialog(options).await
        }
    })?;

    let c = Arc::clone(ctx);
    bus.handle::<ShowSaveDialog, _, _>(move |options| {
        let ctx = Arc::clone(&c);
        async move {
            ctx.main_window()?;
            ctx.shell.show_save_dialog(options).await
        }
    })?;

    let c = Arc::clone(ctx);
    bus.handle::<CheckUpdate, _, _>(move |()| {
        let ctx = Arc::clone(&c);
        async move { Ok(check_update(&ctx.update_sources, &ctx.version, ctx.manifests.as_ref()).await) }
    })?;

    let c = Arc::clone(ctx);
    bus.handle::<SetLyricWindow, _, _>(move |enabled| {
        let ctx = Arc::clone(&c);
        async move {
            ctx.set_lyric_window(enabled);
            Ok(())
        }
    })?;

    let version = ctx.version.clone();
    bus.handle::<Ping, _, _>(move |()| {
        let version = version.clone();
        async move { Ok(version) }
    })?;

    info!("Control channels ready: {}", bus.channels().len());
    Ok(())
}

fn on_window_events(bus: &Bus, ctx: &Arc<ControlContext>) {
    let c = Arc::clone(ctx);
    bus.on::<MinWindow, _>(move |options| {
        let Some(main) = c.windows.get_window(WindowKind::Main) else {
            return;
        };
        if options.skip_task_bar {
            main.hide();
            main.set_skip_taskbar(true);
        }
        main.minimize();
    });

    let c = Arc::clone(ctx);
    bus.on::<OpenUrl, _>(move |url| c.shell.open_external(&url));

    let c = Arc::clone(ctx);
    bus.on::<ExitApp, _>(move |()| {
        info!("Exit requested");
        c.shell.exit(0);
    });

    let c = Arc::clone(ctx);
    bus.on::<IgnoreMouse, _>(move |request| {
        if let Some(window) = c.windows.get_window(request.window) {
            window.set_ignore_mouse_events(request.ignore, true);
        }
    });
}

fn on_playback_sync(bus: &Bus, ctx: &Arc<ControlContext>) {
    let store = Arc::clone(&ctx.store);
    bus.on::<SyncCurrentMusic, _>(move |music| {
        store.set_value(|prev| PlaybackSnapshot {
            current_music: music,
            ..prev.clone()
        });
    });

    let store = Arc::clone(&ctx.store);
    bus.on::<SyncCurrentPlayingState, _>(move |state| {
        store.set_value(|prev| PlaybackSnapshot {
            current_player_state: state.unwrap_or_default(),
            ..prev.clone()
        });
    });

    let store = Arc::clone(&ctx.store);
    bus.on::<SyncCurrentRepeatMode, _>(move |mode| {
        store.set_value(|prev| PlaybackSnapshot {
            current_repeat_mode: mode,
            ..prev.clone()
        });
    });
}

fn on_lyric_events(bus: &Bus, ctx: &Arc<ControlContext>) {
    let c = Arc::clone(ctx);
    bus.on::<SendToLyricWindow, _>(move |data| {
        if let Some(lyric) = c.windows.get_window(WindowKind::Lyric) {
            lyric.post_message(SendToLyricWindow::NAME, &data);
        }
    });

    let c = Arc::clone(ctx);
    bus.on::<SetDesktopLyricLock, _>(move |locked| {
        let ctx = Arc::clone(&c);
        task::spawn(async move {
            if let Err(e) = ctx.set_lyric_lock(locked).await {
                warn!("Failed to apply lyric lock: {}", e);
            }
        });
    });
}
