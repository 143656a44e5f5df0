pub mod models;
pub mod repository;
#[cfg(test)]
pub mod memory;

pub use models::Entry;
pub use repository::{EntryStore, PgEntryStore};
