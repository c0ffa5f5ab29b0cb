use crate::*;

use cfdp_core::wire::FileDirective;
use cfdp_services::{DispatchError, RouteError, StoreError, SubmitError, Target};

/// The engine side of the handoff: read the PDU, then free the slot.
fn consume(handles: &RouterHandles, info: &PacketInfo) -> Result<usize> {
    let accessor = handles.store.accessor(info.store_id)?;
    Ok(accessor.data().len())
}

#[test]
fn forwarded_slot_is_owned_by_engine_until_consumed() -> Result<()> {
    let (mut router, mut handles) = entity(&test_config());
    let pdu = directive_pdu(3, &[FileDirective::Eof.code(), 0x00])?;
    let pdu_len = pdu.len();
    let id = handles.submit(pdu)?;

    router.drain();
    assert!(handles.store.contains(id), "router must not free a forwarded slot");

    let received = collect(&mut handles.destination);
    assert_eq!(consume(&handles, &received[0])?, pdu_len);
    assert!(!handles.store.contains(id), "engine frees the slot after use");
    Ok(())
}

#[test]
fn slot_is_never_forwarded_twice() -> Result<()> {
    let (router, mut handles) = entity(&test_config());
    let id = handles.submit(file_data_pdu(1, 0, b"x")?)?;
    let msg = cfdp_services::InboundMessage { store_id: id };

    router.handle_packet(msg)?;
    let received = collect(&mut handles.destination);
    consume(&handles, &received[0])?;

    // A duplicate message for a consumed slot is refused.
    assert_eq!(
        router.handle_packet(msg),
        Err(RouteError::Store(StoreError::UnknownId(id)))
    );
    assert!(collect(&mut handles.destination).is_empty());
    Ok(())
}

#[test]
fn backpressure_frees_only_the_refused_packet() -> Result<()> {
    let mut config = test_config();
    config.router.source_queue_depth = 2;
    let (mut router, mut handles) = entity(&config);

    let ids = (0..3)
        .map(|seq| -> Result<_> {
            Ok(handles.submit(directive_pdu(seq, &[FileDirective::Nak.code()])?)?)
        })
        .collect::<Result<Vec<_>>>()?;
    let report = router.drain();

    assert_eq!(report.to_source, 2);
    assert_eq!(report.rejected, 1);
    assert_eq!(
        report.last_error,
        Some(RouteError::DispatchFailure {
            target: Target::Source,
            reason: DispatchError::QueueFull,
        })
    );
    assert!(handles.store.contains(ids[0]));
    assert!(handles.store.contains(ids[1]));
    assert!(!handles.store.contains(ids[2]));

    let forwarded = collect(handles.source.as_mut().context("source inbox")?);
    assert_eq!(
        forwarded.iter().map(|info| info.store_id).collect::<Vec<_>>(),
        ids[..2].to_vec()
    );
    Ok(())
}

#[test]
fn stopped_engine_does_not_leak_slots() -> Result<()> {
    let (mut router, handles) = entity(&test_config());
    let RouterHandles {
        store,
        inbound,
        destination,
        source,
    } = handles;
    drop(destination);

    let store_id = store.add(file_data_pdu(1, 0, b"lost")?)?;
    inbound.try_send(cfdp_services::InboundMessage { store_id })?;
    let report = router.drain();

    assert_eq!(
        report.last_error,
        Some(RouteError::DispatchFailure {
            target: Target::Destination,
            reason: DispatchError::EngineGone,
        })
    );
    assert!(store.is_empty());
    drop(source);
    Ok(())
}

#[test]
fn full_store_refuses_submission() -> Result<()> {
    let mut config = test_config();
    config.store.max_packets = 1;
    let (_router, handles) = entity(&config);

    handles.submit(file_data_pdu(1, 0, b"a")?)?;
    let err = handles.submit(file_data_pdu(1, 1, b"b")?).unwrap_err();
    assert_eq!(err, SubmitError::Store(StoreError::Full { capacity: 1 }));
    Ok(())
}

#[test]
fn submit_after_router_stopped() -> Result<()> {
    let (router, handles) = entity(&test_config());
    drop(router);

    let err = handles.submit(file_data_pdu(1, 0, b"late")?).unwrap_err();
    assert_eq!(err, SubmitError::RouterGone);
    assert!(handles.store.is_empty());
    Ok(())
}
