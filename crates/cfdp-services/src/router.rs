//! Inbound PDU router: drains the entity's inbound queue and forwards
//! every PDU to the destination or source engine.
//!
//! One router per entity, one packet at a time, in arrival order. A
//! packet is fully parsed and classified before anything is sent; if any
//! step fails the store accessor drops and the slot is freed. Only after
//! a successful handoff is the accessor detached.

use std::time::Duration;

use cfdp_core::config::CfdpConfig;
use cfdp_core::wire::PduHeader;
use tokio::sync::{broadcast, mpsc};
use tokio::sync::mpsc::error::{TryRecvError, TrySendError};

use crate::engine::{engine_channel, EngineInbox, EngineSet, PacketInfo};
use crate::error::RouteError;
use crate::routing::{self, Route, Target};
use crate::store::{PacketStore, StoreAccessor, StoreError, StoreId};

/// Bytes of an offending PDU included in rejection logs.
const LOG_PREFIX_LEN: usize = 16;

/// Shortest drain period `run` accepts.
const MIN_POLL_PERIOD: Duration = Duration::from_millis(1);

/// Queue entry referencing a stored PDU.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InboundMessage {
    pub store_id: StoreId,
}

/// Result of one drain cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub to_destination: u64,
    pub to_source: u64,
    pub rejected: u64,
    /// Last per-packet failure of the cycle, if any.
    pub last_error: Option<RouteError>,
    /// All senders are gone and the queue is empty.
    pub inbound_closed: bool,
}

impl DrainReport {
    pub fn routed(&self) -> u64 {
        self.to_destination + self.to_source
    }

    fn record(&mut self, result: Result<Route, RouteError>) {
        match result {
            Ok(route) => match route.target {
                Target::Destination => self.to_destination += 1,
                Target::Source => self.to_source += 1,
            },
            Err(e) => {
                self.rejected += 1;
                self.last_error = Some(e);
            }
        }
    }
}

/// Cumulative counters over the router's lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RouterStats {
    pub to_destination: u64,
    pub to_source: u64,
    pub rejected: u64,
    pub drain_cycles: u64,
}

impl RouterStats {
    fn merge(&mut self, report: &DrainReport) {
        self.to_destination += report.to_destination;
        self.to_source += report.to_source;
        self.rejected += report.rejected;
        self.drain_cycles += 1;
    }
}

pub struct PduRouter {
    local_entity_id: u64,
    store: PacketStore,
    inbound: mpsc::Receiver<InboundMessage>,
    engines: EngineSet,
    stats: RouterStats,
}

impl PduRouter {
    pub fn new(
        local_entity_id: u64,
        store: PacketStore,
        inbound: mpsc::Receiver<InboundMessage>,
        engines: EngineSet,
    ) -> Self {
        Self {
            local_entity_id,
            store,
            inbound,
            engines,
            stats: RouterStats::default(),
        }
    }

    /// Build a router and all of its queues from config.
    pub fn from_config(config: &CfdpConfig) -> (Self, RouterHandles) {
        let store = PacketStore::new(config.store.max_packets);
        let (inbound_tx, inbound_rx) = mpsc::channel(config.router.inbound_queue_depth.max(1));
        let (dest_queue, destination) =
            engine_channel(Target::Destination, config.router.destination_queue_depth);
        let (source_queue, source) = if config.router.source_engine {
            let (queue, inbox) = engine_channel(Target::Source, config.router.source_queue_depth);
            (Some(queue), Some(inbox))
        } else {
            (None, None)
        };

        let router = Self::new(
            config.entity.local_entity_id,
            store.clone(),
            inbound_rx,
            EngineSet::new(dest_queue, source_queue),
        );
        let handles = RouterHandles {
            store,
            inbound: inbound_tx,
            destination,
            source,
        };
        (router, handles)
    }

    pub fn local_entity_id(&self) -> u64 {
        self.local_entity_id
    }

    pub fn stats(&self) -> RouterStats {
        self.stats
    }

    /// Route one stored PDU.
    ///
    /// On success the store slot belongs to the selected engine. On any
    /// error the slot has been freed.
    pub fn handle_packet(&self, msg: InboundMessage) -> Result<Route, RouteError> {
        let accessor = match self.store.accessor(msg.store_id) {
            Ok(accessor) => accessor,
            Err(e) => {
                tracing::warn!(
                    local_entity_id = self.local_entity_id,
                    store_id = %msg.store_id,
                    error = %e,
                    "PDU rejected"
                );
                return Err(e.into());
            }
        };
        match self.forward(&accessor) {
            Ok(route) => {
                accessor.detach();
                Ok(route)
            }
            Err(e) => {
                let data = accessor.data();
                tracing::warn!(
                    local_entity_id = self.local_entity_id,
                    store_id = %msg.store_id,
                    len = data.len(),
                    bytes = hex::encode(&data[..data.len().min(LOG_PREFIX_LEN)]),
                    error = %e,
                    "PDU rejected"
                );
                Err(e)
            }
        }
    }

    fn forward(&self, accessor: &StoreAccessor) -> Result<Route, RouteError> {
        let header = PduHeader::parse(accessor.data()).map_err(RouteError::InvalidPduFormat)?;
        let route = routing::decide(&header)?;

        let info = PacketInfo {
            pdu_type: route.pdu_type,
            store_id: accessor.id(),
            directive: route.directive,
        };
        self.engines.dispatch(route.target, info)?;

        tracing::debug!(
            store_id = %accessor.id(),
            target = %route.target,
            directive = ?route.directive,
            transaction = %header.transaction_id(),
            "PDU forwarded"
        );
        Ok(route)
    }

    /// Route everything currently queued, then return. Never waits for
    /// new messages.
    pub fn drain(&mut self) -> DrainReport {
        let mut report = DrainReport::default();
        loop {
            match self.inbound.try_recv() {
                Ok(msg) => report.record(self.handle_packet(msg)),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    report.inbound_closed = true;
                    break;
                }
            }
        }

        if report.routed() == 0 && report.rejected == 0 {
            tracing::trace!("inbound queue empty");
        }
        self.stats.merge(&report);
        report
    }

    /// Drain the inbound queue once per `period` until shutdown or until
    /// every sender is gone. Returns the lifetime counters.
    ///
    /// Periods below one millisecond are raised to one millisecond.
    pub async fn run(
        mut self,
        period: Duration,
        mut shutdown: broadcast::Receiver<()>,
    ) -> RouterStats {
        let period = period.max(MIN_POLL_PERIOD);
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        tracing::info!(
            local_entity_id = self.local_entity_id,
            source_engine = self.engines.has_source(),
            period_ms = period.as_millis() as u64,
            "PDU router started"
        );

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    tracing::info!("PDU router shutting down");
                    break;
                }

                _ = interval.tick() => {
                    if self.drain().inbound_closed {
                        tracing::info!("inbound queue closed, PDU router stopping");
                        break;
                    }
                }
            }
        }

        tracing::info!(
            to_destination = self.stats.to_destination,
            to_source = self.stats.to_source,
            rejected = self.stats.rejected,
            "PDU router stopped"
        );
        self.stats
    }
}

/// Everything outside the router needs to talk to it: the shared store,
/// the inbound sender, and the engines' inboxes.
pub struct RouterHandles {
    pub store: PacketStore,
    pub inbound: mpsc::Sender<InboundMessage>,
    pub destination: EngineInbox,
    pub source: Option<EngineInbox>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubmitError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("router inbound queue full")]
    QueueFull,

    #[error("router stopped")]
    RouterGone,
}

impl RouterHandles {
    /// Store a PDU and queue it for routing. If queueing fails the slot is
    /// freed again.
    pub fn submit(&self, pdu: impl Into<bytes::Bytes>) -> Result<StoreId, SubmitError> {
        let store_id = self.store.add(pdu)?;
        match self.inbound.try_send(InboundMessage { store_id }) {
            Ok(()) => Ok(store_id),
            Err(e) => {
                self.store.delete(store_id);
                Err(match e {
                    TrySendError::Full(_) => SubmitError::QueueFull,
                    TrySendError::Closed(_) => SubmitError::RouterGone,
                })
            }
        }
    }
}
