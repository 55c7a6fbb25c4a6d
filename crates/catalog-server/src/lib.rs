pub mod config;
pub mod handlers;
pub mod metrics;
pub mod observability;
pub mod server;

pub use config::AppConfig;
pub use server::{AppState, CatalogServer, ServerBuilder, build_app};

pub use observability::{init_tracing, shutdown_tracing};
