pub mod center;
pub mod notification;

pub use center::*;
pub use notification::*;
