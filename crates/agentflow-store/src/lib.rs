pub mod memory;
pub mod sqlite;

pub use memory::MemoryConversationStore;
pub use sqlite::SqliteConversationStore;
