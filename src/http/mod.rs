//! REST client with bearer authentication, a GET response cache and error
//! classification.

mod cache;
mod client;
mod error;

pub use cache::{DEFAULT_CACHE_CAPACITY, DEFAULT_CACHE_TIME, ResponseCache, cache_key};
pub use client::{ApiClient, GetOptions, RequestOptions, path_segment};
pub use error::{ApiError, ErrorKind};
