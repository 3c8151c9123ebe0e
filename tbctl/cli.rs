use clap::{Parser, Subcommand, ValueEnum};
use serde::de::DeserializeOwned;
use serde_json::{json, Map, Value};
use tokio::process::Command;

use tunebridge::bus::channel::{
    CheckUpdate, DownloadMedia, DownloadRequest, ExitApp, IgnoreMouse, IgnoreMouseEvent, MinWindow,
    MinWindowOptions, OpenUrl, Ping, SendToLyricWindow, SetDesktopLyricLock, SetLyricWindow, ShowOpenDialog,
    ShowSaveDialog, SyncCurrentMusic, SyncCurrentPlayingState, SyncCurrentRepeatMode,
};
use tunebridge::bus::{dbus, Bus};
use tunebridge::error::App;
use tunebridge::media::MediaItem;
use tunebridge::update::should_prompt;
use tunebridge::window::WindowKind;

type StdResult<T> = std::result::Result<T, App>;

#[derive(Parser)]
#[command(
    name = "tbctl",
    about = "Talk to the tunebridge control process.",
    version = "1.0.0"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Start tunebridge if it is not running")]
    Start,

    #[command(about = "Check that tunebridge answers")]
    Ping,

    #[command(about = "Minimize the main window")]
    Minimize {
        #[arg(short = 's', long = "skip-taskbar", help = "Also hide it from the taskbar")]
        skip_taskbar: bool,
    },

    #[command(about = "Open a URL in the default browser")]
    OpenUrl { url: String },

    #[command(about = "Show an open-file dialog")]
    OpenDialog {
        #[arg(short = 'o', long = "options", help = "Dialog options as JSON")]
        options: Option<String>,
    },

    #[command(about = "Show a save-file dialog")]
    SaveDialog {
        #[arg(short = 'o', long = "options", help = "Dialog options as JSON")]
        options: Option<String>,
    },

    #[command(about = "Quit tunebridge")]
    Exit,

    #[command(about = "Report the current track, or clear it")]
    SyncMusic {
        #[arg(help = "Media item as JSON; omit to clear")]
        item: Option<String>,
    },

    #[command(about = "Report the playback state (playing, paused, buffering, stopped)")]
    SyncState {
        #[arg(help = "Omit to reset")]
        state: Option<String>,
    },

    #[command(about = "Report the repeat mode (queue, shuffle, single)")]
    SyncRepeat { mode: String },

    #[command(about = "Check for a newer release")]
    CheckUpdate {
        #[arg(long = "skip-version", help = "Version the user chose to skip")]
        skip_version: Option<String>,
        #[arg(long = "ignore-skip", help = "Report the update even if it was skipped")]
        ignore_skip: bool,
    },

    #[command(about = "Download a media item")]
    Download {
        platform: String,
        id: String,
        #[arg(short = 't', long = "title")]
        title: Option<String>,
        #[arg(short = 'u', long = "url", help = "Direct URL, for the direct platform")]
        url: Option<String>,
    },

    #[command(about = "Open or close the desktop lyric window")]
    LyricWindow { toggle: Toggle },

    #[command(about = "Send data to the desktop lyric window")]
    LyricSend {
        #[arg(help = "Data as JSON")]
        data: String,
    },

    #[command(about = "Lock or unlock the desktop lyric window")]
    LyricLock { toggle: Toggle },

    #[command(about = "Let mouse events pass through a window")]
    IgnoreMouse {
        #[arg(value_enum)]
        window: Target,
        toggle: Toggle,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Toggle {
    On,
    Off,
}

impl From<Toggle> for bool {
    fn from(toggle: Toggle) -> Self {
        matches!(toggle, Toggle::On)
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum Target {
    Main,
    Lyric,
}

impl From<Target> for WindowKind {
    fn from(target: Target) -> Self {
        match target {
            Target::Main => WindowKind::Main,
            Target::Lyric => WindowKind::Lyric,
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> StdResult<()> {
    let cli = Cli::parse();
    let bus = Bus::connect(dbus::connect().await?);

    if let Commands::Start = cli.command {
        return start_tunebridge(&bus).await;
    }
    if !is_tunebridge_running(&bus).await {
        eprintln!("tunebridge is not running");
        return Ok(());
    }
    handle_command(cli.command, &bus).await
}

async fn handle_command(command: Commands, bus: &Bus) -> StdResult<()> {
    match command {
        Commands::Start => start_tunebridge(bus).await?,
        Commands::Ping => println!("tunebridge {}", bus.invoke::<Ping>(&()).await?),
        Commands::Minimize { skip_taskbar } => {
            bus.send::<MinWindow>(&MinWindowOptions {
                skip_task_bar: skip_taskbar,
            })
            .await?;
        }
        Commands::OpenUrl { url } => bus.send::<OpenUrl>(&url).await?,
        Commands::OpenDialog { options } => {
            let result = bus.invoke::<ShowOpenDialog>(&parse_options(options)?).await?;
            println!("{result}");
        }
        Commands::SaveDialog { options } => {
            let result = bus.invoke::<ShowSaveDialog>(&parse_options(options)?).await?;
            println!("{result}");
        }
        Commands::Exit => {
            bus.send::<ExitApp>(&()).await?;
            println!("tunebridge exited");
        }
        Commands::SyncMusic { item } => {
            let item: Option<MediaItem> = item.as_deref().map(serde_json::from_str).transpose()?;
            bus.send::<SyncCurrentMusic>(&item).await?;
        }
        Commands::SyncState { state } => {
            let state = state.map(parse_keyword).transpose()?;
            bus.send::<SyncCurrentPlayingState>(&state).await?;
        }
        Commands::SyncRepeat { mode } => {
            bus.send::<SyncCurrentRepeatMode>(&parse_keyword(mode)?).await?;
        }
        Commands::CheckUpdate {
            skip_version,
            ignore_skip,
        } => {
            let update_info = bus.invoke::<CheckUpdate>(&()).await?;
            match &update_info.update {
                Some(update) if should_prompt(&update_info, skip_version.as_deref(), ignore_skip) => {
                    println!("Update available: {} -> {}", update_info.version, update.version);
                }
                _ => println!("tunebridge {} is up to date", update_info.version),
            }
        }
        Commands::Download {
            platform,
            id,
            title,
            url,
        } => {
            let mut media_item = MediaItem::new(platform, id);
            media_item.title = title;
            if let Some(url) = url {
                media_item.extra.insert("url".to_string(), Value::String(url));
            }
            println!("Downloading {media_item}");
            bus.send::<DownloadMedia>(&DownloadRequest { media_item }).await?;
        }
        Commands::LyricWindow { toggle } => bus.invoke::<SetLyricWindow>(&toggle.into()).await?,
        Commands::LyricSend { data } => {
            bus.send::<SendToLyricWindow>(&serde_json::from_str(&data)?).await?;
        }
        Commands::LyricLock { toggle } => bus.send::<SetDesktopLyricLock>(&toggle.into()).await?,
        Commands::IgnoreMouse { window, toggle } => {
            bus.send::<IgnoreMouse>(&IgnoreMouseEvent {
                window: window.into(),
                ignore: toggle.into(),
            })
            .await?;
        }
    }
    Ok(())
}

fn parse_options(options: Option<String>) -> StdResult<Value> {
    match options {
        Some(raw) => Ok(serde_json::from_str(&raw)?),
        None => Ok(Value::Object(Map::new())),
    }
}

/// Lowercase keyword to one of the serde enums, e.g. `paused`.
fn parse_keyword<T: DeserializeOwned>(keyword: String) -> StdResult<T> {
    Ok(serde_json::from_value(json!(keyword.to_lowercase()))?)
}

async fn is_tunebridge_running(bus: &Bus) -> bool {
    bus.invoke::<Ping>(&()).await.is_ok()
}

async fn start_tunebridge(bus: &Bus) -> StdResult<()> {
    if is_tunebridge_running(bus).await {
        println!("tunebridge is already running");
        return Ok(());
    }

    let current_exe_path = std::env::current_exe()?;
    let exe_dir = current_exe_path.parent().ok_or_else(|| {
        App::InvalidInput("Failed to get the directory of the executable".to_string())
    })?;
    let tunebridge_path = exe_dir.join("tunebridge");

    if !tunebridge_path.exists() {
        return Err(App::InvalidInput(
            "tunebridge executable not found in the same directory".to_string(),
        ));
    }

    let child = Command::new(tunebridge_path).spawn()?;
    println!("tunebridge started, process ID: {:?}", child.id());
    Ok(())
}
