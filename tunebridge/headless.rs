//! Window, tray and shell stand-ins for running the control process without
//! a UI toolkit attached. They log what a real desktop would do and remember
//! it so callers can inspect the outcome.

use async_trait::async_trait;
use log::{debug, info, warn};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::watch;

use crate::error::App;
use crate::store::PlaybackSnapshot;
use crate::window::{tray_tooltip, Shell, Tray, WindowHandle, WindowKind, WindowProvider};

pub struct HeadlessWindow {
    kind: WindowKind,
    messages: Mutex<Vec<(String, Value)>>,
    mouse_events: Mutex<Option<(bool, bool)>>,
    minimized: AtomicBool,
    hidden: AtomicBool,
    skip_taskbar: AtomicBool,
}

impl HeadlessWindow {
    fn new(kind: WindowKind) -> Self {
        Self {
            kind,
            messages: Mutex::new(Vec::new()),
            mouse_events: Mutex::new(None),
            minimized: AtomicBool::new(false),
            hidden: AtomicBool::new(false),
            skip_taskbar: AtomicBool::new(false),
        }
    }

    pub fn messages(&self) -> Vec<(String, Value)> {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Last `(ignore, forward)` pair applied, if any.
    pub fn mouse_events(&self) -> Option<(bool, bool)> {
        *self.mouse_events.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_minimized(&self) -> bool {
        self.minimized.load(Ordering::SeqCst)
    }

    pub fn is_hidden(&self) -> bool {
        self.hidden.load(Ordering::SeqCst)
    }

    pub fn skips_taskbar(&self) -> bool {
        self.skip_taskbar.load(Ordering::SeqCst)
    }
}

impl WindowHandle for HeadlessWindow {
    fn post_message(&self, channel: &str, data: &Value) {
        debug!("{} window <- {}: {}", self.kind, channel, data);
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((channel.to_string(), data.clone()));
    }

    fn set_ignore_mouse_events(&self, ignore: bool, forward: bool) {
        info!("{} window ignores mouse events: {} (forward: {})", self.kind, ignore, forward);
        *self.mouse_events.lock().unwrap_or_else(PoisonError::into_inner) = Some((ignore, forward));
    }

    fn minimize(&self) {
        info!("{} window minimized", self.kind);
        self.minimized.store(true, Ordering::SeqCst);
    }

    fn hide(&self) {
        info!("{} window hidden", self.kind);
        self.hidden.store(true, Ordering::SeqCst);
    }

    fn set_skip_taskbar(&self, skip: bool) {
        self.skip_taskbar.store(skip, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub struct HeadlessWindows {
    windows: Mutex<HashMap<WindowKind, Arc<HeadlessWindow>>>,
}

impl HeadlessWindows {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts with the main window open, as after application launch.
    pub fn with_main() -> Self {
        let windows = Self::new();
        windows.open(WindowKind::Main);
        windows
    }

    pub fn window(&self, kind: WindowKind) -> Option<Arc<HeadlessWindow>> {
        self.windows
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&kind)
            .cloned()
    }

    fn open(&self, kind: WindowKind) -> Arc<HeadlessWindow> {
        let mut windows = self.windows.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(windows.entry(kind).or_insert_with(|| {
            info!("Created {} window", kind);
            Arc::new(HeadlessWindow::new(kind))
        }))
    }
}

impl WindowProvider for HeadlessWindows {
    fn get_window(&self, kind: WindowKind) -> Option<Arc<dyn WindowHandle>> {
        self.window(kind).map(|window| window as Arc<dyn WindowHandle>)
    }

    fn create_window(&self, kind: WindowKind) -> Arc<dyn WindowHandle> {
        self.open(kind)
    }

    fn close_window(&self, kind: WindowKind) {
        let closed = self
            .windows
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&kind);
        if closed.is_some() {
            info!("Closed {} window", kind);
        }
    }
}

#[derive(Default)]
pub struct HeadlessTray {
    refreshes: AtomicUsize,
    tooltip: Mutex<String>,
}

impl HeadlessTray {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn refreshes(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }

    pub fn tooltip(&self) -> String {
        self.tooltip
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Tray for HeadlessTray {
    fn refresh(&self, snapshot: &PlaybackSnapshot) {
        let tooltip = tray_tooltip(snapshot);
        debug!("Tray: {} ({:?})", tooltip, snapshot.current_repeat_mode);
        *self.tooltip.lock().unwrap_or_else(PoisonError::into_inner) = tooltip;
        self.refreshes.fetch_add(1, Ordering::SeqCst);
    }
}

pub struct HeadlessShell {
    stop_signal: watch::Sender<()>,
    opened: Mutex<Vec<String>>,
    exit_code: Mutex<Option<i32>>,
}

impl HeadlessShell {
    pub fn new(stop_signal: watch::Sender<()>) -> Self {
        Self {
            stop_signal,
            opened: Mutex::new(Vec::new()),
            exit_code: Mutex::new(None),
        }
    }

    pub fn opened(&self) -> Vec<String> {
        self.opened
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn exit_code(&self) -> Option<i32> {
        *self.exit_code.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Shell for HeadlessShell {
    fn open_external(&self, url: &str) {
        info!("Open external: {}", url);
        self.opened
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(url.to_string());
    }

    async fn show_open_dialog(&self, options: Value) -> Result<Value, App> {
        info!("No dialog available, cancelling open dialog {}", options);
        Ok(json!({ "canceled": true, "filePaths": [] }))
    }

    async fn show_save_dialog(&self, options: Value) -> Result<Value, App> {
        info!("No dialog available, cancelling save dialog {}", options);
        Ok(json!({ "canceled": true }))
    }

    fn exit(&self, code: i32) {
        *self.exit_code.lock().unwrap_or_else(PoisonError::into_inner) = Some(code);
        if let Err(e) = self.stop_signal.send(()) {
            warn!("Exit requested but nobody is waiting: {}", e);
        }
    }
}
