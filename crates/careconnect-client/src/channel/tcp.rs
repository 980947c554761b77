//! Line-delimited JSON transport over TCP.
//!
//! Each line carries one event envelope. The reader task turns lines into
//! [`InboundEvent`]s and reports end-of-stream as `disconnect`; the writer
//! task serializes [`OutboundEvent`]s.

use std::net::SocketAddr;

use careconnect_core::{InboundEvent, OutboundEvent};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;

use super::retry::{retry_with_backoff, RetryPolicy};
use super::{Channel, INBOUND_CAPACITY, OUTBOUND_CAPACITY};
use crate::error::ChannelError;

pub(crate) async fn connect(addr: SocketAddr, policy: RetryPolicy) -> Result<Channel, ChannelError> {
    let stream = retry_with_backoff(policy, || async {
        TcpStream::connect(addr).await.map_err(ChannelError::from)
    })
    .await?;
    stream.set_nodelay(true)?;
    tracing::info!(%addr, "realtime channel open");

    let (read_half, write_half) = stream.into_split();
    let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_CAPACITY);
    let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_CAPACITY);

    inbound_tx
        .try_send(InboundEvent::Connect)
        .map_err(|_| ChannelError::Closed)?;

    let reader = tokio::spawn(read_loop(read_half, inbound_tx));
    let writer = tokio::spawn(write_loop(write_half, outbound_rx));

    Ok(Channel::from_parts(outbound_tx, inbound_rx, vec![reader, writer]))
}

/// Encodes one outbound envelope as a newline-terminated frame.
pub(crate) fn encode_frame(event: &OutboundEvent) -> Result<String, ChannelError> {
    let mut frame = serde_json::to_string(event).map_err(|source| ChannelError::Encode {
        event: event.name(),
        source,
    })?;
    frame.push('\n');
    Ok(frame)
}

pub(crate) fn decode_frame(line: &str) -> Result<InboundEvent, serde_json::Error> {
    serde_json::from_str(line)
}

async fn read_loop(read_half: OwnedReadHalf, events: mpsc::Sender<InboundEvent>) {
    let mut lines = BufReader::new(read_half).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if line.trim().is_empty() {
                    continue;
                }
                match decode_frame(&line) {
                    Ok(event) => {
                        if events.send(event).await.is_err() {
                            return;
                        }
                    }
                    Err(e) => tracing::warn!(error = %e, "skipping unreadable frame"),
                }
            }
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(error = %e, "realtime channel read failed");
                break;
            }
        }
    }
    let _ = events.send(InboundEvent::Disconnect).await;
}

async fn write_loop(mut write_half: OwnedWriteHalf, mut outbound: mpsc::Receiver<OutboundEvent>) {
    while let Some(event) = outbound.recv().await {
        let frame = match encode_frame(&event) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::error!(error = %e, "dropping outbound event");
                continue;
            }
        };
        if let Err(e) = write_half.write_all(frame.as_bytes()).await {
            tracing::warn!(error = %e, event = event.name(), "realtime channel write failed");
            break;
        }
    }
    let _ = write_half.shutdown().await;
}
