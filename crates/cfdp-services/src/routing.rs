//! PDU forwarding rules (CCSDS 727.0-B-5 §4.5.3).
//!
//! Decides which local engine consumes a PDU. Stateless: the result
//! depends only on the PDU type, the directive code and, for ACK PDUs,
//! the acknowledged directive.

use std::fmt;

use cfdp_core::wire::{self, AckedDirective, FileDirective, PduHeader, PduType};

use crate::error::RouteError;

/// Local engine a PDU is forwarded to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Target {
    /// File receiver.
    Destination,
    /// File sender.
    Source,
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Destination => f.write_str("destination"),
            Target::Source => f.write_str("source"),
        }
    }
}

/// Outcome of a routing decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Route {
    pub target: Target,
    pub pdu_type: PduType,
    /// Set for every directive PDU, `None` for file data.
    pub directive: Option<FileDirective>,
}

/// Forwarding table for directive PDUs.
///
/// `acked` is only looked at for [`FileDirective::Ack`]; an ACK without it
/// cannot be routed and yields `None`.
pub fn route_directive(directive: FileDirective, acked: Option<AckedDirective>) -> Option<Target> {
    match directive {
        // b) always for the file receiver
        FileDirective::Metadata | FileDirective::Eof | FileDirective::Prompt => {
            Some(Target::Destination)
        }
        // c) always for the file sender
        FileDirective::Finished | FileDirective::Nak | FileDirective::KeepAlive => {
            Some(Target::Source)
        }
        // a) whoever sent the acknowledged PDU
        FileDirective::Ack => acked.map(|acked| match acked {
            AckedDirective::Eof => Target::Source,
            AckedDirective::Finished => Target::Destination,
        }),
    }
}

/// Route a parsed PDU.
pub fn decide(header: &PduHeader<'_>) -> Result<Route, RouteError> {
    let pdu_type = header.pdu_type();
    if pdu_type == PduType::FileData {
        return Ok(Route {
            target: Target::Destination,
            pdu_type,
            directive: None,
        });
    }

    // A directive PDU needs at least the directive code.
    let data_field = header
        .data_field()
        .ok_or(RouteError::InvalidPduFormat(wire::WireError::EmptyDataField))?;

    let directive = wire::classify_directive(data_field)
        .map_err(|_| RouteError::InvalidDirectiveField(data_field[0]))?;

    let acked = match directive {
        FileDirective::Ack => Some(
            wire::classify_acked_directive(data_field)
                .map_err(RouteError::InvalidAckDirectiveFields)?,
        ),
        _ => None,
    };

    let target = route_directive(directive, acked)
        .ok_or(RouteError::UnhandledDirective {
            directive: Some(directive),
            target: None,
        })?;

    Ok(Route {
        target,
        pdu_type,
        directive: Some(directive),
    })
}
