pub mod adapters;
pub mod configuration;
pub mod core;
pub mod error;
pub mod event;
pub mod observability;
pub mod utils;

pub use http::StatusCode;
