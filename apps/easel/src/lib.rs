pub mod cli;
pub mod config;
pub mod handlers;
pub mod rate_limit;
pub mod router;
pub mod storage;
pub mod telemetry;
pub mod websocket;
