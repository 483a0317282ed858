pub mod battery;
pub mod battery_enhanced;
pub mod core;
pub mod ev;
pub mod fleet;
pub mod portfolio;
pub mod time_base;

pub use self::core::*;
pub use battery::*;
pub use battery_enhanced::*;
pub use ev::*;
pub use fleet::*;
pub use portfolio::*;
pub use time_base::*;
