//! Request model: method, headers, parameters, body, and the full spec.

mod body;
mod header;
mod method;
mod param;
mod spec;

pub use body::{FormField, MultipartField, MultipartValue, RequestBody};
pub use header::{Header, Headers};
pub use method::HttpMethod;
pub use param::{Param, ParamKind};
pub use spec::RequestSpec;
