//! The HTTP API (component, spec §6.1): a thin surface over the store,
//! scheduler, and coordinator. No ORM, no auth layer — the spec's route
//! table is read/write access to proxies plus crawl/validation control and
//! monitoring endpoints.

pub mod handlers;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod server;

pub use models::{ApiErrorBody, ApiResult};
pub use server::{ApiServer, AppState};
