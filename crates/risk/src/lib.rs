pub mod gate;
pub mod ledger;

pub use gate::{Decision, RiskConfig, RiskGate};
pub use ledger::Ledger;
