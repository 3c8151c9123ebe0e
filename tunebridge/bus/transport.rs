use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::error::App;

/// Outgoing half of a process boundary. Frames are already serialized, so
/// nothing but plain data ever leaves the process.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn post(&self, frame: String) -> Result<(), App>;
}

/// One side of a connection: where to post frames and where peer frames land.
pub struct Link {
    pub transport: Arc<dyn Transport>,
    pub incoming: mpsc::UnboundedReceiver<String>,
}

pub struct MemoryTransport {
    peer: mpsc::UnboundedSender<String>,
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn post(&self, frame: String) -> Result<(), App> {
        self.peer.send(frame).map_err(|_| App::TransportClosed)
    }
}

/// Two links wired back to back, standing in for a real process pair.
pub fn memory_pair() -> (Link, Link) {
    let (left_tx, left_rx) = mpsc::unbounded_channel();
    let (right_tx, right_rx) = mpsc::unbounded_channel();
    let left = Link {
        transport: Arc::new(MemoryTransport { peer: right_tx }),
        incoming: left_rx,
    };
    let right = Link {
        transport: Arc::new(MemoryTransport { peer: left_tx }),
        incoming: right_rx,
    };
    (left, right)
}
