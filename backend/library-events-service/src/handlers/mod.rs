/// HTTP handlers for library-events-service
pub mod collections;
pub mod events;
pub mod health;

pub use collections::register_routes as register_collections;
pub use events::register_routes as register_events;
pub use health::health;
