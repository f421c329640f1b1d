//! HTTP surface: router and health

pub mod routes;

pub use routes::build_router;
