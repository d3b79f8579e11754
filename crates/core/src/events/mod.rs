pub mod event;
pub mod metadata;

pub use event::*;
pub use metadata::*;
