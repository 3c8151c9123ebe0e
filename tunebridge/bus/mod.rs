pub mod channel;
pub mod dbus;
pub mod frame;
pub mod registry;
pub mod transport;

use futures_util::FutureExt;
use log::{debug, error, warn};
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{mpsc, oneshot};
use tokio::task;

use crate::error::{App, RemoteError, RemoteErrorKind};
use channel::{Event, Request};
use frame::{CallId, Frame, Outcome};
use registry::{ChannelKind, Registry};
use transport::{Link, Transport};

type Pending = Arc<Mutex<HashMap<CallId, oneshot::Sender<Outcome>>>>;

/// One process's end of the command bus.
///
/// Incoming frames are pumped by a background task: event listeners run
/// inline in arrival order, request handlers are spawned and reply when they
/// finish. Outgoing invokes wait for the reply carrying their [`CallId`].
#[derive(Clone)]
pub struct Bus {
    registry: Arc<Registry>,
    transport: Arc<dyn Transport>,
    pending: Pending,
    origin: u32,
    next_seq: Arc<AtomicU64>,
}

impl Bus {
    pub fn connect(link: Link) -> Self {
        let Link {
            transport,
            incoming,
        } = link;
        let bus = Self {
            registry: Arc::new(Registry::new()),
            transport,
            pending: Arc::default(),
            origin: rand::random(),
            next_seq: Arc::new(AtomicU64::new(1)),
        };
        task::spawn(bus.clone().pump(incoming));
        bus
    }

    pub fn on<E, F>(&self, listener: F)
    where
        E: Event,
        F: Fn(E::Payload) + Send + Sync + 'static,
    {
        self.registry.add_listener(
            E::NAME,
            Arc::new(move |raw: Value| match serde_json::from_value::<E::Payload>(raw) {
                Ok(payload) => listener(payload),
                Err(e) => warn!("Ignoring malformed payload on {}: {}", E::NAME, e),
            }),
        );
    }

    /// Registers the single handler of a request channel. Fails if the channel
    /// already has one.
    pub fn handle<R, F, Fut>(&self, handler: F) -> Result<(), App>
    where
        R: Request + 'static,
        F: Fn(R::Payload) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R::Reply, App>> + Send + 'static,
    {
        let handler = Arc::new(handler);
        self.registry.set_handler(
            R::NAME,
            Arc::new(move |raw: Value| run_handler::<R, F, Fut>(Arc::clone(&handler), raw).boxed()),
        )
    }

    pub async fn send<E: Event>(&self, payload: &E::Payload) -> Result<(), App> {
        let frame = Frame::Send {
            channel: E::NAME.to_string(),
            payload: serde_json::to_value(payload)?,
        };
        self.transport.post(frame.encode()?).await
    }

    pub async fn invoke<R: Request>(&self, payload: &R::Payload) -> Result<R::Reply, App> {
        let id = CallId {
            origin: self.origin,
            seq: self.next_seq.fetch_add(1, Ordering::Relaxed),
        };
        let raw = Frame::Invoke {
            id,
            channel: R::NAME.to_string(),
            payload: serde_json::to_value(payload)?,
        }
        .encode()?;

        let (reply_tx, reply_rx) = oneshot::channel();
        self.pending_calls().insert(id, reply_tx);
        let _pending = PendingGuard {
            pending: &self.pending,
            id,
        };
        self.transport.post(raw).await?;

        match reply_rx.await.map_err(|_| App::TransportClosed)? {
            Outcome::Resolved { value } => Ok(serde_json::from_value(value)?),
            Outcome::Rejected { error } => Err(error.into_app(R::NAME)),
        }
    }

    pub fn channels(&self) -> Vec<(String, ChannelKind)> {
        self.registry.channels()
    }

    fn pending_calls(&self) -> std::sync::MutexGuard<'_, HashMap<CallId, oneshot::Sender<Outcome>>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn pump(self, mut incoming: mpsc::UnboundedReceiver<String>) {
        while let Some(raw) = incoming.recv().await {
            match Frame::decode(&raw) {
                Ok(frame) => self.dispatch(frame),
                Err(e) => warn!("Dropping malformed frame: {}", e),
            }
        }
        debug!("Transport closed, failing pending calls");
        self.pending_calls().clear();
    }

    fn dispatch(&self, frame: Frame) {
        match frame {
            Frame::Send { channel, payload } => {
                let listeners = self.registry.listeners(&channel);
                if listeners.is_empty() {
                    debug!("No listener on {}", channel);
                }
                for listener in listeners {
                    listener(payload.clone());
                }
            }
            Frame::Invoke {
                id,
                channel,
                payload,
            } => {
                let handler = self.registry.handler(&channel);
                let transport = Arc::clone(&self.transport);
                task::spawn(async move {
                    let result = if let Some(handler) = handler {
                        handler(payload).await
                    } else {
                        error!("Invoke on unregistered channel {}", channel);
                        Err(RemoteError::new(
                            RemoteErrorKind::ChannelNotRegistered,
                            format!("No handler registered for {channel}"),
                        ))
                    };
                    let reply = Frame::Reply {
                        id,
                        outcome: Outcome::from(result),
                    };
                    match reply.encode() {
                        Ok(raw) => {
                            if let Err(e) = transport.post(raw).await {
                                error!("Failed to reply on {}: {}", channel, e);
                            }
                        }
                        Err(e) => error!("Failed to encode reply on {}: {}", channel, e),
                    }
                });
            }
            Frame::Reply { id, outcome } => {
                // Replies addressed to another peer on the same transport are ignored.
                if let Some(waiter) = self.pending_calls().remove(&id) {
                    let _ = waiter.send(outcome);
                }
            }
        }
    }
}

/// Forgets an outstanding call when `invoke` returns or its future is dropped.
struct PendingGuard<'a> {
    pending: &'a Pending,
    id: CallId,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.id);
    }
}

async fn run_handler<R, F, Fut>(handler: Arc<F>, raw: Value) -> Result<Value, RemoteError>
where
    R: Request,
    F: Fn(R::Payload) -> Fut,
    Fut: Future<Output = Result<R::Reply, App>>,
{
    let payload: R::Payload = serde_json::from_value(raw)
        .map_err(|e| RemoteError::new(RemoteErrorKind::InvalidPayload, e.to_string()))?;
    let reply = handler(payload).await.map_err(|e| {
        warn!("Handler on {} failed: {}", R::NAME, e);
        RemoteError::from(&e)
    })?;
    serde_json::to_value(reply).map_err(|e| RemoteError::new(RemoteErrorKind::Handler, e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::channel::{CheckUpdate, OpenUrl, Ping, SetLyricWindow, ShowOpenDialog};
    use super::transport::memory_pair;
    use super::*;
    use serde_json::json;

    fn connected() -> (Bus, Bus) {
        let (control, presentation) = memory_pair();
        let control = Bus::connect(control);
        control
            .handle::<Ping, _, _>(|()| async { Ok("test".to_string()) })
            .unwrap();
        (control, Bus::connect(presentation))
    }

    #[tokio::test]
    async fn send_reaches_every_listener_in_order() {
        let (control, presentation) = connected();
        let seen = Arc::new(Mutex::new(Vec::new()));
        for tag in ["a", "b"] {
            let seen = Arc::clone(&seen);
            control.on::<OpenUrl, _>(move |url| seen.lock().unwrap().push(format!("{tag}:{url}")));
        }

        presentation.send::<OpenUrl>(&"https://one".to_string()).await.unwrap();
        presentation.send::<OpenUrl>(&"https://two".to_string()).await.unwrap();
        presentation.invoke::<Ping>(&()).await.unwrap();

        assert_eq!(
            *seen.lock().unwrap(),
            vec!["a:https://one", "b:https://one", "a:https://two", "b:https://two"]
        );
    }

    #[tokio::test]
    async fn invoke_resolves_with_the_handler_value() {
        let (control, presentation) = connected();
        control
            .handle::<ShowOpenDialog, _, _>(|options| async move {
                Ok(json!({ "canceled": false, "filePaths": [options["title"]] }))
            })
            .unwrap();

        let result = presentation
            .invoke::<ShowOpenDialog>(&json!({ "title": "pick" }))
            .await
            .unwrap();
        assert_eq!(result["filePaths"][0], "pick");
        assert_eq!(presentation.invoke::<Ping>(&()).await.unwrap(), "test");
    }

    #[tokio::test]
    async fn invoke_without_handler_is_channel_not_registered() {
        let (_control, presentation) = connected();
        let err = presentation.invoke::<CheckUpdate>(&()).await.unwrap_err();
        assert!(matches!(err, App::ChannelNotRegistered(channel) if channel == "check-update"));
    }

    #[tokio::test]
    async fn handler_errors_reject_only_the_caller() {
        let (control, presentation) = connected();
        control
            .handle::<SetLyricWindow, _, _>(|_| async { Err(App::WindowMissing("lyric".to_string())) })
            .unwrap();

        let err = presentation.invoke::<SetLyricWindow>(&true).await.unwrap_err();
        match err {
            App::Rejected { channel, message } => {
                assert_eq!(channel, "set-lyric-window");
                assert_eq!(message, "Invalid window: lyric");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(presentation.invoke::<Ping>(&()).await.is_ok());
    }

    #[tokio::test]
    async fn malformed_payload_is_rejected() {
        let (control, presentation) = connected();
        control
            .handle::<SetLyricWindow, _, _>(|_| async { Ok(()) })
            .unwrap();

        let raw = Frame::Invoke {
            id: CallId { origin: 1, seq: 1 },
            channel: "set-lyric-window".to_string(),
            payload: json!("not a bool"),
        };
        // Going through the typed API cannot produce this payload, so post it raw.
        let (reply_tx, reply_rx) = oneshot::channel();
        presentation.pending_calls().insert(CallId { origin: 1, seq: 1 }, reply_tx);
        presentation.transport.post(raw.encode().unwrap()).await.unwrap();
        match reply_rx.await.unwrap() {
            Outcome::Rejected { error } => assert_eq!(error.kind, RemoteErrorKind::InvalidPayload),
            Outcome::Resolved { .. } => panic!("payload should not have been accepted"),
        }
    }

    #[tokio::test]
    async fn abandoned_invokes_leave_nothing_pending() {
        let (control, presentation) = connected();
        control
            .handle::<SetLyricWindow, _, _>(|_| futures_util::future::pending::<Result<(), App>>())
            .unwrap();

        for _ in 0..100 {
            let result = tokio::time::timeout(
                std::time::Duration::from_millis(1),
                presentation.invoke::<SetLyricWindow>(&true),
            )
            .await;
            assert!(result.is_err());
        }
        assert!(presentation.pending_calls().is_empty());

        assert_eq!(presentation.invoke::<Ping>(&()).await.unwrap(), "test");
        assert!(presentation.pending_calls().is_empty());
    }

    #[tokio::test]
    async fn second_handler_fails_at_registration() {
        let (control, _presentation) = connected();
        let err = control
            .handle::<Ping, _, _>(|()| async { Ok("again".to_string()) })
            .unwrap_err();
        assert!(matches!(err, App::HandlerAlreadyRegistered(channel) if channel == "ping"));
    }

    #[tokio::test]
    async fn invoke_over_a_dead_link_fails() {
        let (link, peer) = memory_pair();
        drop(peer);
        let bus = Bus::connect(link);
        assert!(matches!(bus.invoke::<Ping>(&()).await, Err(App::TransportClosed)));
    }

    #[tokio::test]
    async fn channel_listing_reflects_registrations() {
        let (control, _presentation) = connected();
        control.on::<OpenUrl, _>(|_| {});
        assert_eq!(
            control.channels(),
            vec![
                ("open-url".to_string(), ChannelKind::FireAndForget),
                ("ping".to_string(), ChannelKind::RequestResponse),
            ]
        );
    }
}
