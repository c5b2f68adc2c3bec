pub mod deriv;
pub mod executor;
pub mod lifecycle;
pub mod session;

pub use deriv::{BackoffPolicy, DerivClient, DerivStream};
pub use executor::OrderExecutor;
pub use lifecycle::{Engine, EngineHandle};
pub use session::{Session, Step};
