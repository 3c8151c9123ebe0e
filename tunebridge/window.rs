//! Desktop collaborators the control process drives but does not implement.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

use crate::error::App;
use crate::store::{PlaybackSnapshot, PlayerState};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum WindowKind {
    Main,
    Lyric,
}

impl fmt::Display for WindowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WindowKind::Main => f.write_str("main"),
            WindowKind::Lyric => f.write_str("lyric"),
        }
    }
}

pub trait WindowHandle: Send + Sync {
    fn post_message(&self, channel: &str, data: &Value);
    fn set_ignore_mouse_events(&self, ignore: bool, forward: bool);
    fn minimize(&self);
    fn hide(&self);
    fn set_skip_taskbar(&self, skip: bool);
}

pub trait WindowProvider: Send + Sync {
    fn get_window(&self, kind: WindowKind) -> Option<Arc<dyn WindowHandle>>;
    fn create_window(&self, kind: WindowKind) -> Arc<dyn WindowHandle>;
    fn close_window(&self, kind: WindowKind);
}

pub trait Tray: Send + Sync {
    /// Redraws the tray menu from a snapshot. Called on every store mutation.
    fn refresh(&self, snapshot: &PlaybackSnapshot);
}

#[async_trait]
pub trait Shell: Send + Sync {
    fn open_external(&self, url: &str);
    async fn show_open_dialog(&self, options: Value) -> Result<Value, App>;
    async fn show_save_dialog(&self, options: Value) -> Result<Value, App>;
    fn exit(&self, code: i32);
}

/// Tray tooltip text for a snapshot.
pub fn tray_tooltip(snapshot: &PlaybackSnapshot) -> String {
    let Some(music) = &snapshot.current_music else {
        return "tunebridge".to_string();
    };
    let title = music.title.as_deref().unwrap_or(&music.id);
    let marker = match snapshot.current_player_state {
        PlayerState::Playing => "▶",
        PlayerState::Buffering => "…",
        PlayerState::Paused => "⏸",
        PlayerState::None | PlayerState::Stopped => "■",
    };
    match &music.artist {
        Some(artist) => format!("{marker} {title} - {artist}"),
        None => format!("{marker} {title}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::MediaItem;

    #[test]
    fn tooltip_follows_the_snapshot() {
        let mut snapshot = PlaybackSnapshot::default();
        assert_eq!(tray_tooltip(&snapshot), "tunebridge");

        let mut item = MediaItem::new("direct", "42");
        snapshot.current_music = Some(item.clone());
        assert_eq!(tray_tooltip(&snapshot), "■ 42");

        item.title = Some("Song".to_string());
        item.artist = Some("Band".to_string());
        snapshot.current_music = Some(item);
        snapshot.current_player_state = PlayerState::Playing;
        assert_eq!(tray_tooltip(&snapshot), "▶ Song - Band");
    }
}
