pub mod forecast;
pub mod plan;

pub use forecast::*;
pub use plan::*;
