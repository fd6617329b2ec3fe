pub mod forecast;
pub mod machine;
pub mod optimization;

pub use forecast::*;
pub use machine::*;
pub use optimization::*;
