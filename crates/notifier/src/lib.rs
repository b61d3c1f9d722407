pub mod consumer;
pub mod dispatch;
