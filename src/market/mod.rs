pub mod client;
pub mod errors;
pub mod fetcher;
pub mod rate_limiter;
pub mod types;
