// Application layer - use cases and orchestration

pub mod command;
pub mod error;
mod service;

pub use command::*;
pub use error::*;
pub use service::*;
