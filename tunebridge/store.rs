use serde::{Deserialize, Serialize};
use std::sync::{Mutex, PoisonError, RwLock};

use crate::media::MediaItem;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum PlayerState {
    #[default]
    None,
    Playing,
    Paused,
    Buffering,
    Stopped,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum RepeatMode {
    #[default]
    Queue,
    Shuffle,
    Single,
}

/// What the control process knows about playback in the main window.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlaybackSnapshot {
    pub current_music: Option<MediaItem>,
    pub current_player_state: PlayerState,
    pub current_repeat_mode: RepeatMode,
}

pub type Observer<T> = Box<dyn Fn(&T) + Send + Sync>;

/// Single-writer value with change observers.
///
/// Every `set_value` runs all observers with the value it produced before it
/// returns, so observers see each mutation exactly once and in call order.
pub struct Store<T> {
    value: Mutex<T>,
    observers: RwLock<Vec<Observer<T>>>,
}

impl<T: Clone> Store<T> {
    pub fn new(initial: T) -> Self {
        Self {
            value: Mutex::new(initial),
            observers: RwLock::new(Vec::new()),
        }
    }

    pub fn observe(&self, observer: impl Fn(&T) + Send + Sync + 'static) {
        self.observers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Box::new(observer));
    }

    pub fn value(&self) -> T {
        self.value
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set_value(&self, updater: impl FnOnce(&T) -> T) {
        let next = {
            let mut value = self.value.lock().unwrap_or_else(PoisonError::into_inner);
            let next = updater(&value);
            *value = next.clone();
            next
        };
        let observers = self.observers.read().unwrap_or_else(PoisonError::into_inner);
        for observer in observers.iter() {
            observer(&next);
        }
    }
}

impl<T: Clone + Default> Default for Store<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn defaults_describe_an_idle_player() {
        let snapshot = PlaybackSnapshot::default();
        assert!(snapshot.current_music.is_none());
        assert_eq!(snapshot.current_player_state, PlayerState::None);
        assert_eq!(snapshot.current_repeat_mode, RepeatMode::Queue);
    }

    #[test]
    fn back_to_back_mutations_notify_twice_in_order() {
        let store = Store::new(PlaybackSnapshot::default());
        let seen = Arc::new(Mutex::new(Vec::new()));
        {
            let seen = Arc::clone(&seen);
            store.observe(move |snapshot: &PlaybackSnapshot| {
                seen.lock().unwrap().push(snapshot.clone());
            });
        }

        store.set_value(|prev| PlaybackSnapshot {
            current_player_state: PlayerState::Playing,
            ..prev.clone()
        });
        store.set_value(|prev| PlaybackSnapshot {
            current_repeat_mode: RepeatMode::Single,
            ..prev.clone()
        });

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].current_player_state, PlayerState::Playing);
        assert_eq!(seen[0].current_repeat_mode, RepeatMode::Queue);
        assert_eq!(seen[1].current_player_state, PlayerState::Playing);
        assert_eq!(seen[1].current_repeat_mode, RepeatMode::Single);
    }

    #[test]
    fn observers_may_read_the_store() {
        let store = Arc::new(Store::new(0_u32));
        let reads = Arc::new(Mutex::new(Vec::new()));
        {
            let reads = Arc::clone(&reads);
            let weak = Arc::downgrade(&store);
            store.observe(move |_| {
                if let Some(store) = weak.upgrade() {
                    reads.lock().unwrap().push(store.value());
                }
            });
        }
        store.set_value(|n| n + 1);
        assert_eq!(*reads.lock().unwrap(), vec![1]);
        assert_eq!(store.value(), 1);
    }

    #[test]
    fn snapshots_are_copies() {
        let store = Store::new(vec![1]);
        let before = store.value();
        store.set_value(|prev| {
            let mut next = prev.clone();
            next.push(2);
            next
        });
        assert_eq!(before, vec![1]);
        assert_eq!(store.value(), vec![1, 2]);
    }
}
