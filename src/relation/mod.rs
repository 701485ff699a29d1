// Agent/entity relation store

mod store;

pub use store::{EntityRecord, RelationSnapshot, RelationStore};
