pub mod in_memory_index;
pub mod query;

pub use in_memory_index::InMemoryAuthorIndex;
pub use query::{QueryError, QueryString, analyze};
