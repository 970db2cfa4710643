pub mod extraction;
pub mod metrics;

pub use extraction::{Argument, Extraction};
pub use metrics::{MetricsReport, Span, SpanMetrics, spans};
