/// Real-time push delivery
///
/// Architecture:
/// 1. ConnectionRegistry: live connections keyed by user, bounded per-connection queues
/// 2. PushEvent / PushEnvelope: versioned events encoded as SSE frames
/// 3. PushStream: response body that drains one connection and unsubscribes on drop
pub mod messages;
pub mod registry;
pub mod stream;

pub use messages::{ItemTombstone, PushEnvelope, PushEvent};
pub use registry::{ConnectionHandle, ConnectionId, ConnectionRegistry, DeliveryReport, Role};
pub use stream::PushStream;
