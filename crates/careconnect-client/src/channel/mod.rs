//! Realtime channel to the backend resolver.
//!
//! A [`Channel`] is an owned connection object: it is opened explicitly,
//! handed to whoever drives the controller, and closed when dropped. There
//! is no process-wide socket.

mod retry;
mod tcp;

use std::net::SocketAddr;

use careconnect_core::{FinalResponse, InboundEvent, OutboundEvent, SubmissionRequest};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub use retry::RetryPolicy;

use crate::error::ChannelError;

const INBOUND_CAPACITY: usize = 64;
const OUTBOUND_CAPACITY: usize = 16;

/// Client end of a realtime connection.
#[derive(Debug)]
pub struct Channel {
    outbound: mpsc::Sender<OutboundEvent>,
    inbound: mpsc::Receiver<InboundEvent>,
    tasks: Vec<JoinHandle<()>>,
}

impl Channel {
    fn from_parts(
        outbound: mpsc::Sender<OutboundEvent>,
        inbound: mpsc::Receiver<InboundEvent>,
        tasks: Vec<JoinHandle<()>>,
    ) -> Self {
        Self {
            outbound,
            inbound,
            tasks,
        }
    }

    /// An in-process connection. The returned [`BackendEnd`] plays the server.
    ///
    /// A `connect` event is queued immediately, as a freshly opened socket would.
    #[must_use]
    pub fn memory() -> (Self, BackendEnd) {
        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_CAPACITY);
        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_CAPACITY);
        let _ = inbound_tx.try_send(InboundEvent::Connect);
        (
            Self::from_parts(outbound_tx, inbound_rx, Vec::new()),
            BackendEnd {
                events: inbound_tx,
                requests: outbound_rx,
            },
        )
    }

    /// Opens a TCP connection to `addr`, retrying refused connects per `policy`.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Io`] once retries are exhausted or on a
    /// non-transient socket error.
    pub async fn connect_tcp(addr: SocketAddr, policy: RetryPolicy) -> Result<Self, ChannelError> {
        tcp::connect(addr, policy).await
    }

    /// Queues `event` for delivery to the backend.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Closed`] if the connection has gone away.
    pub async fn emit(&self, event: OutboundEvent) -> Result<(), ChannelError> {
        tracing::debug!(event = event.name(), "emit");
        self.outbound
            .send(event)
            .await
            .map_err(|_| ChannelError::Closed)
    }

    /// Next inbound event, or `None` once the connection is gone.
    pub async fn next_event(&mut self) -> Option<InboundEvent> {
        self.inbound.recv().await
    }

    /// Closes the connection and stops its transport tasks.
    ///
    /// Events still queued on either side are discarded.
    pub fn close(mut self) {
        tracing::info!("closing realtime channel");
        self.inbound.close();
        self.stop_tasks();
    }

    fn stop_tasks(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

impl Drop for Channel {
    fn drop(&mut self) {
        self.stop_tasks();
    }
}

/// Server side of [`Channel::memory`].
#[derive(Debug)]
pub struct BackendEnd {
    events: mpsc::Sender<InboundEvent>,
    requests: mpsc::Receiver<OutboundEvent>,
}

impl BackendEnd {
    /// Delivers `event` to the client.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Closed`] if the client end was dropped.
    pub async fn send(&self, event: InboundEvent) -> Result<(), ChannelError> {
        self.events.send(event).await.map_err(|_| ChannelError::Closed)
    }

    /// Sends one `update` progress line.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Closed`] if the client end was dropped.
    pub async fn update(&self, message: impl Into<String>) -> Result<(), ChannelError> {
        self.send(InboundEvent::update(message)).await
    }

    /// Sends the terminal `final_res` event.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Closed`] if the client end was dropped.
    pub async fn finish(&self, response: FinalResponse) -> Result<(), ChannelError> {
        self.send(InboundEvent::FinalRes(response)).await
    }

    /// Waits for the client's next `on_submit_query`.
    pub async fn next_request(&mut self) -> Option<SubmissionRequest> {
        match self.requests.recv().await? {
            OutboundEvent::SubmitQuery(request) => Some(request),
        }
    }

    /// Sends `disconnect` and hangs up.
    pub async fn disconnect(self) {
        let _ = self.events.send(InboundEvent::Disconnect).await;
    }
}

#[cfg(test)]
mod tests {
    use careconnect_core::{Coordinate, Query};

    use super::*;

    #[tokio::test]
    async fn memory_channel_starts_connected() {
        let (mut channel, _backend) = Channel::memory();
        assert_eq!(channel.next_event().await, Some(InboundEvent::Connect));
    }

    #[tokio::test]
    async fn memory_channel_carries_both_directions() {
        let (mut channel, mut backend) = Channel::memory();
        let request = SubmissionRequest {
            query: Query::parse("shelter").unwrap(),
            location: Coordinate::new(43.65, -79.38),
        };
        channel
            .emit(OutboundEvent::SubmitQuery(request.clone()))
            .await
            .unwrap();
        assert_eq!(backend.next_request().await, Some(request));

        backend.update("Searching...").await.unwrap();
        assert_eq!(channel.next_event().await, Some(InboundEvent::Connect));
        assert_eq!(
            channel.next_event().await,
            Some(InboundEvent::update("Searching..."))
        );
    }

    #[tokio::test]
    async fn dropped_backend_ends_the_event_stream() {
        let (mut channel, backend) = Channel::memory();
        backend.disconnect().await;
        assert_eq!(channel.next_event().await, Some(InboundEvent::Connect));
        assert_eq!(channel.next_event().await, Some(InboundEvent::Disconnect));
        assert_eq!(channel.next_event().await, None);
    }

    #[tokio::test]
    async fn backend_cannot_send_after_close() {
        let (channel, backend) = Channel::memory();
        channel.close();
        assert!(matches!(
            backend.update("too late").await,
            Err(ChannelError::Closed)
        ));
    }

    #[tokio::test]
    async fn emit_after_backend_hangs_up_is_closed() {
        let (channel, backend) = Channel::memory();
        drop(backend);
        let result = channel
            .emit(OutboundEvent::SubmitQuery(SubmissionRequest {
                query: Query::parse("shelter").unwrap(),
                location: Coordinate::new(0.0, 0.0),
            }))
            .await;
        assert!(matches!(result, Err(ChannelError::Closed)));
    }
}
