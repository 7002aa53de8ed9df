pub mod document;
pub mod embed;
pub mod index;
pub mod indexer;
pub mod journal;
pub mod memory;

pub use document::*;
pub use embed::*;
pub use index::*;
pub use indexer::*;
pub use journal::*;
pub use memory::*;
