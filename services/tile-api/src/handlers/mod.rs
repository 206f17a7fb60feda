//! HTTP request handlers.
//!
//! - `tile`: PNG tiles by query string or path
//! - `archive`: byte ranges of vector tile archives
//! - `health`: health, source listing and Prometheus metrics
//! - `common`: structured error responses

pub mod archive;
pub mod common;
pub mod health;
pub mod tile;

pub use archive::archive_handler;
pub use common::error_response;
pub use health::{health_handler, metrics_handler, sources_handler};
pub use tile::{tile_path_handler, tile_query_handler, TileQuery};
