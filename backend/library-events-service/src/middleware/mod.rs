pub mod identity;

pub use identity::AuthenticatedUser;
