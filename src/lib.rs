//! Bot platform gateways: long-polling and HTTPS webhook delivery of
//! incoming messages to a single handler.

pub mod config;
pub mod gateway;
pub mod handler;
pub mod logging;
pub mod platform;
