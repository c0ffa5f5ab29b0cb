use crate::*;

use std::time::Duration;

use cfdp_core::wire::FileDirective;
use tokio::sync::broadcast;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);

fn period(config: &CfdpConfig) -> Duration {
    Duration::from_millis(config.router.poll_interval_ms)
}

#[tokio::test]
async fn run_forwards_packets_submitted_while_running() -> Result<()> {
    let config = test_config();
    let (router, mut handles) = entity(&config);
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let task = tokio::spawn(router.run(period(&config), shutdown_rx));

    let id = handles.submit(directive_pdu(1, &[FileDirective::Prompt.code(), 0x00])?)?;
    let info = timeout(WAIT, handles.destination.recv())
        .await
        .context("destination engine never received the PDU")?
        .context("destination inbox closed")?;
    assert_eq!(info.store_id, id);
    assert_eq!(info.directive, Some(FileDirective::Prompt));

    shutdown_tx.send(())?;
    let stats = timeout(WAIT, task).await??;
    assert_eq!(stats.to_destination, 1);
    assert_eq!(stats.rejected, 0);
    Ok(())
}

#[tokio::test]
async fn run_stops_when_inbound_closes() -> Result<()> {
    let config = test_config();
    let (router, handles) = entity(&config);
    let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);

    handles.submit(file_data_pdu(1, 0, b"segment")?)?;
    handles.submit(directive_pdu(1, &[0x01])?)?;
    let RouterHandles {
        inbound,
        destination: _destination,
        source: _source,
        ..
    } = handles;
    drop(inbound);

    let stats = timeout(WAIT, router.run(period(&config), shutdown_rx)).await?;
    assert_eq!(stats.to_destination, 1);
    assert_eq!(stats.rejected, 1);
    Ok(())
}

#[tokio::test]
async fn malformed_stream_does_not_starve_valid_pdus() -> Result<()> {
    let config = test_config();
    let (router, mut handles) = entity(&config);
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

    let mut expected = Vec::new();
    for seq in 0..20u64 {
        handles.submit(vec![0xffu8; (seq % 6) as usize])?;
        handles.submit(directive_pdu(seq, &[0x7f])?)?;
        expected.push(handles.submit(file_data_pdu(seq, 0, &[seq as u8])?)?);
    }

    let task = tokio::spawn(router.run(period(&config), shutdown_rx));
    let mut received = Vec::new();
    while received.len() < expected.len() {
        let info = timeout(WAIT, handles.destination.recv())
            .await
            .context("valid PDU was starved")?
            .context("destination inbox closed")?;
        received.push(info.store_id);
    }

    // Arrival order is kept.
    assert_eq!(received, expected);

    shutdown_tx.send(())?;
    let stats = timeout(WAIT, task).await??;
    assert_eq!(stats.rejected, 40);
    assert_eq!(stats.to_destination, 20);
    assert_eq!(handles.store.len(), 20);
    Ok(())
}

#[tokio::test]
async fn transaction_pdus_keep_their_order_per_engine() -> Result<()> {
    let config = test_config();
    let (router, mut handles) = entity(&config);
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

    // PDUs of one transaction, interleaved across both engines.
    let metadata = handles.submit(directive_pdu(9, &[FileDirective::Metadata.code(), 0x00])?)?;
    let data = handles.submit(file_data_pdu(9, 0, b"abc")?)?;
    let nak = handles.submit(directive_pdu(9, &[FileDirective::Nak.code(), 0x00])?)?;
    let eof = handles.submit(directive_pdu(9, &[FileDirective::Eof.code(), 0x00])?)?;
    let finished = handles.submit(directive_pdu(9, &[FileDirective::Finished.code(), 0x00])?)?;

    let task = tokio::spawn(router.run(period(&config), shutdown_rx));

    let mut destination = Vec::new();
    for _ in 0..3 {
        let info = timeout(WAIT, handles.destination.recv()).await?.context("closed")?;
        destination.push(info.store_id);
    }
    let source_inbox = handles.source.as_mut().context("source inbox")?;
    let mut source = Vec::new();
    for _ in 0..2 {
        let info = timeout(WAIT, source_inbox.recv()).await?.context("closed")?;
        source.push(info.store_id);
    }

    assert_eq!(destination, vec![metadata, data, eof]);
    assert_eq!(source, vec![nak, finished]);

    shutdown_tx.send(())?;
    timeout(WAIT, task).await??;
    Ok(())
}
