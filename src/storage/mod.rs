pub mod sqlite;

pub use sqlite::BaselineStore;
