//! HTTP adapters

pub mod body_builder;
pub mod reqwest_transport;

pub use body_builder::{BodyBuildError, BuiltBody, build_body};
pub use reqwest_transport::ReqwestTransport;
