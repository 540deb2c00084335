use super::messages::connected_frame;
use super::registry::{ConnectionHandle, ConnectionRegistry, Role};
use bytes::Bytes;
use futures::Stream;
use std::convert::Infallible;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio_stream::wrappers::ReceiverStream;
use uuid::Uuid;

/// Unsubscribes its connection when dropped.
///
/// Actix drops the response body when the client goes away, so this is the
/// disconnect path as well as the normal end-of-stream path.
struct ConnectionGuard {
    registry: ConnectionRegistry,
    handle: ConnectionHandle,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.registry.unsubscribe(self.handle);
    }
}

/// Body of one long-lived push response
pub struct PushStream {
    greeting: Option<Bytes>,
    frames: ReceiverStream<Bytes>,
    guard: ConnectionGuard,
}

impl PushStream {
    /// Register a connection and build the stream that drains it
    pub fn open(registry: &ConnectionRegistry, user_id: Uuid, role: Role) -> Self {
        let (handle, rx) = registry.subscribe(user_id, role);
        Self {
            greeting: Some(connected_frame(handle.id.as_uuid())),
            frames: ReceiverStream::new(rx),
            guard: ConnectionGuard {
                registry: registry.clone(),
                handle,
            },
        }
    }

    pub fn handle(&self) -> ConnectionHandle {
        self.guard.handle
    }
}

impl Stream for PushStream {
    type Item = Result<Bytes, Infallible>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if let Some(greeting) = self.greeting.take() {
            return Poll::Ready(Some(Ok(greeting)));
        }
        Pin::new(&mut self.frames)
            .poll_next(cx)
            .map(|frame| frame.map(Ok))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn test_stream_greets_then_forwards_frames() {
        let registry = ConnectionRegistry::default();
        let user_id = Uuid::new_v4();
        let mut stream = PushStream::open(&registry, user_id, Role::User);

        let greeting = stream.next().await.unwrap().unwrap();
        assert!(greeting.starts_with(b"event: connected\n"));

        registry.send_to(user_id, &Bytes::from_static(b"data: x\n\n"));
        let frame = stream.next().await.unwrap().unwrap();
        assert_eq!(&frame[..], b"data: x\n\n");
    }

    #[tokio::test]
    async fn test_dropping_stream_unsubscribes() {
        let registry = ConnectionRegistry::default();
        let user_id = Uuid::new_v4();
        let stream = PushStream::open(&registry, user_id, Role::User);
        let handle = stream.handle();
        assert_eq!(registry.connection_count(user_id), 1);

        drop(stream);

        assert_eq!(registry.connection_count(user_id), 0);
        assert!(!registry.unsubscribe(handle));
    }
}
