//! Arcade index integration tests.

mod support;
mod concurrency;


#[cfg(feature = "http")]
mod http;
