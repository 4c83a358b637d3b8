//! HTTP interface: routing, handlers and error mapping.

mod error;
mod extract;
mod handlers;
mod routes;
mod server;
mod state;

pub use error::ApiError;
pub use extract::{client_ip, Principal};
pub use routes::router;
pub use server::HttpServer;
pub use state::{AppState, HttpSettings};
