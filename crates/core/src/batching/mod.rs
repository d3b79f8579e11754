pub mod batcher;
pub mod batcher_builder;
pub mod flush;
pub mod metrics;

pub use batcher::*;
pub use batcher_builder::*;
pub use flush::*;
pub use metrics::*;
