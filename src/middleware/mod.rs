pub mod logging;
pub mod metrics;

pub use logging::{RequestLogging, REQUEST_ID_HEADER};
pub use metrics::MetricsMiddleware;
