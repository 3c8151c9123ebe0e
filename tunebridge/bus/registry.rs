use futures_util::future::BoxFuture;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use crate::error::{App, RemoteError};

pub type Listener = Arc<dyn Fn(Value) + Send + Sync>;
pub type Handler = Arc<dyn Fn(Value) -> BoxFuture<'static, Result<Value, RemoteError>> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ChannelKind {
    FireAndForget,
    RequestResponse,
}

/// Per-process channel table. A request channel owns exactly one handler, an
/// event channel any number of listeners.
#[derive(Default)]
pub struct Registry {
    listeners: RwLock<HashMap<String, Vec<Listener>>>,
    handlers: RwLock<HashMap<String, Handler>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_listener(&self, channel: &str, listener: Listener) {
        let mut listeners = self.listeners.write().unwrap_or_else(PoisonError::into_inner);
        listeners.entry(channel.to_string()).or_default().push(listener);
    }

    pub fn set_handler(&self, channel: &str, handler: Handler) -> Result<(), App> {
        let mut handlers = self.handlers.write().unwrap_or_else(PoisonError::into_inner);
        if handlers.contains_key(channel) {
            return Err(App::HandlerAlreadyRegistered(channel.to_string()));
        }
        handlers.insert(channel.to_string(), handler);
        Ok(())
    }

    /// Listeners in registration order. The table lock is released before the
    /// caller runs them.
    pub fn listeners(&self, channel: &str) -> Vec<Listener> {
        let listeners = self.listeners.read().unwrap_or_else(PoisonError::into_inner);
        listeners.get(channel).cloned().unwrap_or_default()
    }

    pub fn handler(&self, channel: &str) -> Option<Handler> {
        let handlers = self.handlers.read().unwrap_or_else(PoisonError::into_inner);
        handlers.get(channel).cloned()
    }

    pub fn channels(&self) -> Vec<(String, ChannelKind)> {
        let mut channels: Vec<_> = {
            let listeners = self.listeners.read().unwrap_or_else(PoisonError::into_inner);
            listeners
                .keys()
                .map(|name| (name.clone(), ChannelKind::FireAndForget))
                .collect()
        };
        {
            let handlers = self.handlers.read().unwrap_or_else(PoisonError::into_inner);
            channels.extend(
                handlers
                    .keys()
                    .map(|name| (name.clone(), ChannelKind::RequestResponse)),
            );
        }
        channels.sort();
        channels
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::FutureExt;
    use std::sync::Mutex;

    fn echo() -> Handler {
        Arc::new(|payload: Value| async move { Ok::<_, RemoteError>(payload) }.boxed())
    }

    #[test]
    fn second_handler_is_refused() {
        let registry = Registry::new();
        registry.set_handler("check-update", echo()).unwrap();
        let err = registry.set_handler("check-update", echo()).unwrap_err();
        assert!(matches!(err, App::HandlerAlreadyRegistered(name) if name == "check-update"));
    }

    #[test]
    fn listeners_keep_registration_order() {
        let registry = Registry::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        for tag in ["first", "second", "third"] {
            let seen = Arc::clone(&seen);
            registry.add_listener(
                "open-url",
                Arc::new(move |_: Value| seen.lock().unwrap().push(tag)),
            );
        }
        for listener in registry.listeners("open-url") {
            listener(Value::Null);
        }
        assert_eq!(*seen.lock().unwrap(), vec!["first", "second", "third"]);
        assert!(registry.listeners("exit-app").is_empty());
    }

    #[test]
    fn channel_listing_reports_kinds() {
        let registry = Registry::new();
        registry.add_listener("open-url", Arc::new(|_: Value| {}));
        registry.set_handler("check-update", echo()).unwrap();
        assert_eq!(
            registry.channels(),
            vec![
                ("check-update".to_string(), ChannelKind::RequestResponse),
                ("open-url".to_string(), ChannelKind::FireAndForget),
            ]
        );
    }
}
