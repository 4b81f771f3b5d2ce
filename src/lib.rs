pub mod alert;
pub mod analytics;
pub mod market;
pub mod scheduler;
pub mod store;

pub mod config;
pub mod error;
pub mod logger;
pub mod time;
