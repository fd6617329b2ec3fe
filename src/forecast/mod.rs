pub mod capabilities;
pub mod engine;
pub mod naive;
#[cfg(feature = "ml")]
pub mod sequence;
#[cfg(feature = "stats")]
pub mod statistical;
pub mod strategy;

pub use capabilities::*;
pub use engine::*;
pub use naive::*;
#[cfg(feature = "ml")]
pub use sequence::*;
#[cfg(feature = "stats")]
pub use statistical::*;
pub use strategy::*;
