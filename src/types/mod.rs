//! Public types for the Muninn API.

mod request;
mod response;

pub use request::{Destination, Request, RequestKey};
pub use response::{CachedResponse, Response, ResponseSource, Served};
