mod application;
mod data;
mod runtime_config;

pub use application::{Application, ApplicationError};
pub use data::LogLevel;
pub use runtime_config::RuntimeConfig;
