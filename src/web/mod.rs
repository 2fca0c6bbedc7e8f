//! HTTP surface of the broker

pub mod error;
pub mod server;
pub mod stream;


pub use error::ApiError;
pub use server::{build_router, AppState, WebServer};
