pub mod codec;
pub mod value;

pub use value::{Binary, Document, ObjectId, Value, ID_FIELD};
