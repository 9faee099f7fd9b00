//! Transport layer for the Stepwise SDK.

pub mod http;

pub use http::HttpTransport;
