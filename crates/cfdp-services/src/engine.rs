//! Engine handoff: the queues between the router and the two protocol
//! engines.
//!
//! Each engine owns the receiving half of a bounded channel and the router
//! holds the sending halves in an [`EngineSet`]. Only the store handle
//! crosses the channel; the PDU bytes stay in the [`PacketStore`].
//!
//! [`PacketStore`]: crate::store::PacketStore

use cfdp_core::wire::{FileDirective, PduType};
use tokio::sync::mpsc::{self, error::TrySendError};

use crate::error::RouteError;
use crate::routing::Target;
use crate::store::StoreId;

/// What an engine receives for each forwarded PDU.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketInfo {
    pub pdu_type: PduType,
    /// Handle of the stored PDU. The engine deletes it once consumed.
    pub store_id: StoreId,
    /// Directive already classified by the router. `None` for file data.
    pub directive: Option<FileDirective>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    #[error("engine queue full")]
    QueueFull,

    #[error("engine inbox closed")]
    EngineGone,
}

/// Receiving half, drained by the engine's state machine.
pub type EngineInbox = mpsc::Receiver<PacketInfo>;

/// Sending half of one engine's inbound queue.
#[derive(Debug, Clone)]
pub struct EngineQueue {
    target: Target,
    tx: mpsc::Sender<PacketInfo>,
}

/// Create the inbound queue for one engine. `depth` is clamped to at least 1.
pub fn engine_channel(target: Target, depth: usize) -> (EngineQueue, EngineInbox) {
    let (tx, rx) = mpsc::channel(depth.max(1));
    (EngineQueue { target, tx }, rx)
}

impl EngineQueue {
    pub fn target(&self) -> Target {
        self.target
    }

    /// Enqueue without waiting.
    pub fn send(&self, info: PacketInfo) -> Result<(), DispatchError> {
        self.tx.try_send(info).map_err(|e| match e {
            TrySendError::Full(_) => DispatchError::QueueFull,
            TrySendError::Closed(_) => DispatchError::EngineGone,
        })
    }

    /// Free slots left in the queue.
    pub fn capacity(&self) -> usize {
        self.tx.capacity()
    }
}

/// The engines attached to one entity. A destination engine is always
/// present; the source engine is optional for receive-only entities.
#[derive(Debug, Clone)]
pub struct EngineSet {
    destination: EngineQueue,
    source: Option<EngineQueue>,
}

impl EngineSet {
    pub fn new(destination: EngineQueue, source: Option<EngineQueue>) -> Self {
        Self {
            destination,
            source,
        }
    }

    pub fn has_source(&self) -> bool {
        self.source.is_some()
    }

    /// Hand a packet to the engine for `target`.
    pub fn dispatch(&self, target: Target, info: PacketInfo) -> Result<(), RouteError> {
        let queue = match target {
            Target::Destination => &self.destination,
            Target::Source => self
                .source
                .as_ref()
                .ok_or(RouteError::UnhandledDirective {
                    directive: info.directive,
                    target: Some(target),
                })?,
        };
        queue
            .send(info)
            .map_err(|reason| RouteError::DispatchFailure { target, reason })
    }
}
