pub mod api;
pub mod cache;
pub mod cli;
pub mod client;
pub mod error;
pub mod models;
pub mod session;
pub mod store;
pub mod token;

pub use client::{ApiClient, ClientConfig};
pub use error::Error;
pub use session::SessionManager;
pub use store::SessionStore;
