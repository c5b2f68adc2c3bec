pub mod client;
pub mod protocol;
pub mod stream;

pub use client::DerivClient;
pub use stream::{BackoffPolicy, DerivStream};
