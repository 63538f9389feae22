pub mod store;

pub use store::{DatabaseProvider, DocumentCursor, DocumentStore, InsertOutcome, Rejection};
