pub mod bus;
pub mod config;
pub mod db;
pub mod error;
pub mod payload;
pub mod queues;
pub mod redis_pool;
pub mod types;
