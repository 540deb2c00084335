mod memory_repository;
mod postgres_repository;
mod r#trait;

pub use memory_repository::InMemoryLibraryRepository;
pub use postgres_repository::PostgresLibraryRepository;
pub use r#trait::{LibraryRepository, RepositoryError, RepositoryResult};

#[cfg(test)]
pub use r#trait::MockLibraryRepository;
