//! API Module
//!
//! Thin HTTP surface over the `Cache` facade.
//!
//! # Endpoints
//! - `PUT /set` - Store a key-value pair
//! - `GET /get/:key` - Retrieve a value by key
//! - `DELETE /del/:key` - Delete a key
//! - `GET /ttl/:key` - Remaining lifetime of a key
//! - `POST /incr/:key` - Add to an integer counter
//! - `GET /stats` - Engine statistics where available
//! - `GET /health` - Live readiness check

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
