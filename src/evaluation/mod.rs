pub mod metrics;
pub mod validation;

pub use metrics::{CaseMetrics, MetricsCalculator, MetricsSummary};
pub use validation::{CaseReport, ValidationCase, ValidationReport, load_cases, validate};
