pub mod arbitrage;
pub mod constraints;

pub use arbitrage::*;
pub use constraints::*;
