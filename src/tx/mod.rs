//! Transaction submission and confirmation for badge scripts

mod confirm;
mod gas;
mod sender;

pub use gas::GasEstimator;
pub use sender::{BadgeSender, MintOutcome};
