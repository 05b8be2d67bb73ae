//! # socketor-net
//!
//! TCP transport for the socketor server: a timed-accept listener and a
//! heap-free, line-buffered connection that worker contexts can drive,
//! plus the one-shot client used by the command-line front-end.

pub mod conn;
pub mod listener;
pub mod client;

pub use conn::TcpConnection;
pub use listener::TcpLineListener;
pub use client::request;
