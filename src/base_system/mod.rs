pub mod config;
pub mod context;
pub mod error;
pub mod logging;
pub mod retry;
pub mod scratch;
