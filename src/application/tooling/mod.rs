pub mod error;
pub mod http;
pub mod interface;
pub mod invoker;

pub use error::ToolInvokeError;
pub use http::StreamableHttpSession;
pub use interface::{ToolContent, ToolSession};
pub use invoker::{InvocationError, MAIL_SEARCH_TOOL, invoke, shape_output};
