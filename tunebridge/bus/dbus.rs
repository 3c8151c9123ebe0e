use async_trait::async_trait;
use futures_util::stream::StreamExt;
use log::{info, warn};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task;
use zbus::{fdo, interface, proxy, Connection, ConnectionBuilder, SignalContext};

use super::transport::{Link, Transport};
use crate::error::App;

pub const BUS_NAME: &str = "org.tunebridge.Bus";
pub const OBJECT_PATH: &str = "/org/tunebridge/Bus";

/// Object served by the control process. Presentation processes call `Post`
/// to deliver a frame; the control process answers through the
/// `FramePosted` signal.
pub struct BusInterface {
    incoming: mpsc::UnboundedSender<String>,
}

#[interface(name = "org.tunebridge.Bus")]
impl BusInterface {
    async fn post(&self, frame: String) -> fdo::Result<()> {
        self.incoming
            .send(frame)
            .map_err(|e| fdo::Error::Failed(format!("Control bus is shutting down: {e}")))
    }

    #[zbus(signal)]
    async fn frame_posted(ctxt: &SignalContext<'_>, frame: &str) -> zbus::Result<()>;
}

#[proxy(
    interface = "org.tunebridge.Bus",
    default_service = "org.tunebridge.Bus",
    default_path = "/org/tunebridge/Bus"
)]
trait ControlBus {
    async fn post(&self, frame: &str) -> zbus::Result<()>;

    #[zbus(signal)]
    fn frame_posted(&self, frame: &str) -> zbus::Result<()>;
}

struct SignalTransport {
    connection: Connection,
}

#[async_trait]
impl Transport for SignalTransport {
    async fn post(&self, frame: String) -> Result<(), App> {
        let iface = self
            .connection
            .object_server()
            .interface::<_, BusInterface>(OBJECT_PATH)
            .await?;
        BusInterface::frame_posted(iface.signal_context(), &frame).await?;
        Ok(())
    }
}

struct ProxyTransport {
    proxy: ControlBusProxy<'static>,
}

#[async_trait]
impl Transport for ProxyTransport {
    async fn post(&self, frame: String) -> Result<(), App> {
        self.proxy.post(&frame).await?;
        Ok(())
    }
}

/// Claims the bus name on the session bus and returns the control side link.
pub async fn serve() -> Result<Link, App> {
    let (incoming_tx, incoming_rx) = mpsc::unbounded_channel();
    let bus_interface = BusInterface {
        incoming: incoming_tx,
    };

    let connection = ConnectionBuilder::session()?
        .name(BUS_NAME)?
        .serve_at(OBJECT_PATH, bus_interface)?
        .build()
        .await?;
    info!("Serving {} at {}", BUS_NAME, OBJECT_PATH);

    Ok(Link {
        transport: Arc::new(SignalTransport { connection }),
        incoming: incoming_rx,
    })
}

/// Connects a presentation process to the running control process.
pub async fn connect() -> Result<Link, App> {
    let connection = Connection::session().await?;
    let proxy = ControlBusProxy::new(&connection).await?;
    let mut frames = proxy.receive_frame_posted().await?;
    let (incoming_tx, incoming_rx) = mpsc::unbounded_channel();

    task::spawn(async move {
        while let Some(signal) = frames.next().await {
            match signal.args() {
                Ok(args) => {
                    if incoming_tx.send(args.frame().to_string()).is_err() {
                        break;
                    }
                }
                Err(e) => warn!("Malformed FramePosted signal: {}", e),
            }
        }
    });

    Ok(Link {
        transport: Arc::new(ProxyTransport { proxy }),
        incoming: incoming_rx,
    })
}
