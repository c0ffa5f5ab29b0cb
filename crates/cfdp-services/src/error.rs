use cfdp_core::wire::{FileDirective, WireError};

use crate::engine::DispatchError;
use crate::routing::Target;
use crate::store::StoreError;

/// Why a single PDU was not forwarded. Every variant is terminal for that
/// PDU only; the router keeps draining.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RouteError {
    /// Header unparsable, or a directive PDU without a data field.
    #[error("invalid PDU format: {0}")]
    InvalidPduFormat(#[source] WireError),

    #[error("invalid file directive field: 0x{0:02x}")]
    InvalidDirectiveField(u8),

    #[error("invalid ACK directive fields: {0}")]
    InvalidAckDirectiveFields(#[source] WireError),

    #[error("dispatch to {target} engine failed: {reason}")]
    DispatchFailure {
        target: Target,
        #[source]
        reason: DispatchError,
    },

    /// Routed to an engine this entity does not run, or not routable at all.
    #[error("no attached engine handles this PDU (directive {directive:?}, target {target:?})")]
    UnhandledDirective {
        directive: Option<FileDirective>,
        target: Option<Target>,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}
