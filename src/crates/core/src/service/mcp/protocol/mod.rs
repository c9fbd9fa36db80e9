pub mod transport_remote;
pub mod types;

pub use types::*;
