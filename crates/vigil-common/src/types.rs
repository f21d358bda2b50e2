use crate::error::{MetricError, Result};
use crate::proto::MetricProto;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Kind of a metric, fixed when the metric is created.
///
/// # Examples
///
/// ```
/// use vigil_common::MetricKind;
///
/// let kind: MetricKind = "counter".parse().unwrap();
/// assert_eq!(kind, MetricKind::Counter);
/// assert_eq!(kind.to_string(), "counter");
/// assert!("Counter".parse::<MetricKind>().is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    /// Point-in-time value; later writes replace earlier ones.
    Gauge,
    /// Delta; writes accumulate into a running total.
    Counter,
}

impl MetricKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Gauge => "gauge",
            MetricKind::Counter => "counter",
        }
    }
}

impl std::fmt::Display for MetricKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MetricKind {
    type Err = MetricError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "gauge" => Ok(MetricKind::Gauge),
            "counter" => Ok(MetricKind::Counter),
            _ => Err(MetricError::UnknownType(s.to_string())),
        }
    }
}

/// A single gauge or counter sample.
///
/// Exactly one of `value` (gauges) and `delta` (counters) is populated;
/// [`Metric::validate`] enforces this for metrics that arrive from the
/// network. `hash` carries the hex HMAC-SHA256 integrity tag and is absent
/// when no secret is configured.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: MetricKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
}

impl Metric {
    pub fn gauge(id: impl Into<String>, value: f64) -> Self {
        Self {
            id: id.into(),
            kind: MetricKind::Gauge,
            value: Some(value),
            delta: None,
            hash: None,
        }
    }

    pub fn counter(id: impl Into<String>, delta: i64) -> Self {
        Self {
            id: id.into(),
            kind: MetricKind::Counter,
            value: None,
            delta: Some(delta),
            hash: None,
        }
    }

    /// Builds a metric from the `kind/id/value` segments of the path-form
    /// update route.
    ///
    /// # Errors
    ///
    /// [`MetricError::UnknownType`] for an unsupported kind, and
    /// [`MetricError::Validation`] when the value does not parse as the
    /// kind's number type.
    pub fn from_parts(kind: &str, id: &str, raw_value: &str) -> Result<Self> {
        let metric = match kind.parse::<MetricKind>()? {
            MetricKind::Gauge => {
                let value = raw_value.parse::<f64>().map_err(|_| {
                    MetricError::Validation(format!("expected a float value, got \"{raw_value}\""))
                })?;
                Metric::gauge(id, value)
            }
            MetricKind::Counter => {
                let delta = raw_value.parse::<i64>().map_err(|_| {
                    MetricError::Validation(format!(
                        "expected an integer value, got \"{raw_value}\""
                    ))
                })?;
                Metric::counter(id, delta)
            }
        };
        metric.validate()?;
        Ok(metric)
    }

    /// Checks the id and the value/delta invariant. Gauge values must be
    /// finite, since JSON has no encoding for NaN or infinity.
    pub fn validate(&self) -> Result<()> {
        if self.id.is_empty() {
            return Err(MetricError::Validation("metric id is empty".to_string()));
        }
        match (self.kind, self.value, self.delta) {
            (MetricKind::Gauge, Some(value), None) if !value.is_finite() => Err(
                MetricError::Validation(format!("gauge '{}' has non-finite value {value}", self.id)),
            ),
            (MetricKind::Gauge, Some(_), None) | (MetricKind::Counter, None, Some(_)) => Ok(()),
            (MetricKind::Gauge, _, _) => Err(MetricError::Validation(format!(
                "gauge '{}' must carry a value and no delta",
                self.id
            ))),
            (MetricKind::Counter, _, _) => Err(MetricError::Validation(format!(
                "counter '{}' must carry a delta and no value",
                self.id
            ))),
        }
    }

    fn canonical(&self) -> String {
        match self.kind {
            MetricKind::Gauge => format!("{}:gauge:{:.6}", self.id, self.value.unwrap_or_default()),
            MetricKind::Counter => {
                format!("{}:counter:{}", self.id, self.delta.unwrap_or_default())
            }
        }
    }

    fn mac(&self, key: &str) -> HmacSha256 {
        let mut mac =
            HmacSha256::new_from_slice(key.as_bytes()).expect("HMAC can take key of any size");
        mac.update(self.canonical().as_bytes());
        mac
    }

    /// Returns the integrity tag for `key`, or `None` when `key` is empty.
    pub fn compute_hash(&self, key: &str) -> Option<String> {
        if key.is_empty() {
            return None;
        }
        Some(hex::encode(self.mac(key).finalize().into_bytes()))
    }

    /// Replaces the stored tag with one computed for `key`.
    pub fn sign(&mut self, key: &str) {
        self.hash = self.compute_hash(key);
    }

    /// Verifies the stored tag against `key`. An empty key disables the
    /// check.
    pub fn verify_hash(&self, key: &str) -> Result<()> {
        if key.is_empty() {
            return Ok(());
        }
        let integrity = || MetricError::Integrity {
            id: self.id.clone(),
        };
        let tag = self.hash.as_deref().ok_or_else(integrity)?;
        let bytes = hex::decode(tag).map_err(|_| integrity())?;
        self.mac(key).verify_slice(&bytes).map_err(|_| integrity())
    }

    /// Plain-text rendering of the current value.
    ///
    /// ```
    /// use vigil_common::Metric;
    ///
    /// assert_eq!(Metric::gauge("temp", 37.1).value_text(), "37.1");
    /// assert_eq!(Metric::counter("hits", 8).value_text(), "8");
    /// ```
    pub fn value_text(&self) -> String {
        match self.kind {
            MetricKind::Gauge => self.value.unwrap_or_default().to_string(),
            MetricKind::Counter => self.delta.unwrap_or_default().to_string(),
        }
    }
}

/// Combines an incoming metric with the previously stored one of the same
/// identity.
///
/// Gauges are replaced, counters accumulate. A previous metric of another
/// kind is kept as is.
///
/// # Examples
///
/// ```
/// use vigil_common::{merge, Metric};
///
/// let total = merge(Some(&Metric::counter("hits", 5)), Metric::counter("hits", 3));
/// assert_eq!(total.delta, Some(8));
///
/// let temp = merge(Some(&Metric::gauge("temp", 36.6)), Metric::gauge("temp", 37.1));
/// assert_eq!(temp.value, Some(37.1));
/// ```
pub fn merge(previous: Option<&Metric>, incoming: Metric) -> Metric {
    let Some(previous) = previous else {
        return incoming;
    };
    if previous.kind != incoming.kind {
        return previous.clone();
    }
    match incoming.kind {
        MetricKind::Gauge => incoming,
        MetricKind::Counter => {
            let total = previous
                .delta
                .unwrap_or_default()
                .saturating_add(incoming.delta.unwrap_or_default());
            Metric::counter(incoming.id, total)
        }
    }
}

impl From<&Metric> for MetricProto {
    fn from(metric: &Metric) -> Self {
        MetricProto {
            id: metric.id.clone(),
            kind: metric.kind.to_string(),
            value: metric.value,
            delta: metric.delta,
            hash: metric.hash.clone(),
        }
    }
}

impl TryFrom<MetricProto> for Metric {
    type Error = MetricError;

    fn try_from(proto: MetricProto) -> Result<Self> {
        Ok(Metric {
            kind: proto.kind.parse()?,
            id: proto.id,
            value: proto.value,
            delta: proto.delta,
            hash: proto.hash,
        })
    }
}
