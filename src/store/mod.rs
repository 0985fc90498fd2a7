pub mod memory;
pub mod models;
pub mod traits;

pub use memory::InMemoryPostStore;
pub use models::{PostCaption, PostRecord, TagWrite};
pub use traits::{PostSource, TagSink};
