// Module declarations
pub mod persistence;
pub mod search;

// Re-export all implementations
pub use persistence::InMemoryAuthorRepository;
pub use search::in_memory_index::InMemoryAuthorIndex;
