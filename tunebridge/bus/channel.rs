//! Channel definitions shared by the control and presentation processes.
//!
//! Each channel is a zero-sized marker type. Fire-and-forget channels
//! implement [`Event`] and can only be used with `on`/`send`; request
//! channels implement [`Request`] and can only be used with
//! `handle`/`invoke`.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::media::MediaItem;
use crate::store::{PlayerState, RepeatMode};
use crate::update::UpdateInfo;
use crate::window::WindowKind;

pub trait Event {
    const NAME: &'static str;
    type Payload: Serialize + DeserializeOwned + Send + 'static;
}

pub trait Request {
    const NAME: &'static str;
    type Payload: Serialize + DeserializeOwned + Send + 'static;
    type Reply: Serialize + DeserializeOwned + Send + 'static;
}

macro_rules! event {
    ($(#[$meta:meta])* $ty:ident, $name:literal, $payload:ty) => {
        $(#[$meta])*
        pub struct $ty;

        impl Event for $ty {
            const NAME: &'static str = $name;
            type Payload = $payload;
        }
    };
}

macro_rules! request {
    ($(#[$meta:meta])* $ty:ident, $name:literal, $payload:ty => $reply:ty) => {
        $(#[$meta])*
        pub struct $ty;

        impl Request for $ty {
            const NAME: &'static str = $name;
            type Payload = $payload;
            type Reply = $reply;
        }
    };
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MinWindowOptions {
    #[serde(default)]
    pub skip_task_bar: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DownloadRequest {
    pub media_item: MediaItem,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct IgnoreMouseEvent {
    pub window: WindowKind,
    pub ignore: bool,
}

/// Native dialog options and results are passed through untouched.
pub type DialogOptions = Value;
pub type DialogResult = Value;

event!(MinWindow, "min-window", MinWindowOptions);
event!(OpenUrl, "open-url", String);
event!(
    /// Terminates the control process.
    ExitApp,
    "exit-app",
    ()
);
event!(SyncCurrentMusic, "sync-current-music", Option<MediaItem>);
event!(
    SyncCurrentPlayingState,
    "sync-current-playing-state",
    Option<PlayerState>
);
event!(SyncCurrentRepeatMode, "sync-current-repeat-mode", RepeatMode);
event!(DownloadMedia, "download-media", DownloadRequest);
event!(
    /// Forwarded verbatim to the lyric window, if one is open.
    SendToLyricWindow,
    "send-to-lyric-window",
    Value
);
event!(SetDesktopLyricLock, "set-desktop-lyric-lock", bool);
event!(IgnoreMouse, "ignore-mouse-event", IgnoreMouseEvent);

request!(ShowOpenDialog, "show-open-dialog", DialogOptions => DialogResult);
request!(ShowSaveDialog, "show-save-dialog", DialogOptions => DialogResult);
request!(CheckUpdate, "check-update", () => UpdateInfo);
request!(SetLyricWindow, "set-lyric-window", bool => ());
request!(
    /// Liveness probe; replies with the control process version.
    Ping,
    "ping",
    () => String
);
