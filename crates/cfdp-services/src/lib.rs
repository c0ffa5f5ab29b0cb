//! cfdp-services: inbound PDU routing for a CFDP entity.
//!
//! Every PDU that reaches the entity sits in the shared [`PacketStore`].
//! The [`PduRouter`] drains the inbound queue, reads each PDU's header and
//! directive, and hands the store handle to either the destination engine
//! (file receiver) or the source engine (file sender).

pub mod engine;
pub mod error;
pub mod router;
pub mod routing;
pub mod store;

pub use engine::{engine_channel, DispatchError, EngineInbox, EngineQueue, EngineSet, PacketInfo};
pub use error::RouteError;
pub use router::{DrainReport, InboundMessage, PduRouter, RouterHandles, RouterStats, SubmitError};
pub use routing::{decide, route_directive, Route, Target};
pub use store::{PacketStore, StoreAccessor, StoreError, StoreId};
