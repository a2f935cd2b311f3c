pub mod features;
pub mod history;
pub mod predictor;

pub use features::*;
pub use history::*;
pub use predictor::*;
