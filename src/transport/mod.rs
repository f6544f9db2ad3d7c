//! 传输层模块：封装对外部生成服务的 HTTPS 调用。
//!
//! # Transport Module
//!
//! Thin reqwest wrapper used by provider implementations. It knows nothing about
//! signing or provider payloads.

mod http;

pub use http::{HttpTransport, TransportError, TransportSettings};
