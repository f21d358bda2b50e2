/// Errors raised while validating or authenticating a metric.
///
/// Transports map each variant to a distinct status so a producer can tell
/// a malformed payload from a protocol mismatch.
///
/// # Examples
///
/// ```
/// use vigil_common::MetricKind;
///
/// let err = "histogram".parse::<MetricKind>().unwrap_err();
/// assert!(err.to_string().contains("histogram"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MetricError {
    /// The metric is structurally invalid (empty id, value/delta mismatch,
    /// unparsable number).
    #[error("invalid metric: {0}")]
    Validation(String),

    /// The integrity tag does not match the one recomputed with the shared
    /// secret.
    #[error("integrity check failed for metric '{id}'")]
    Integrity { id: String },

    /// The metric kind is not one of the supported kinds.
    #[error("unknown metric type '{0}', expected \"gauge\" or \"counter\"")]
    UnknownType(String),
}

pub type Result<T> = std::result::Result<T, MetricError>;
