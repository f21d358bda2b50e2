use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderName, Request, StatusCode};
use axum::middleware::Next;
use axum::response::Response;
use std::net::IpAddr;
use std::str::FromStr;

use crate::api::error_response;
use crate::logging::TraceId;
use crate::state::AppState;

/// Header set by the reverse proxy with the client address.
static X_REAL_IP: HeaderName = HeaderName::from_static("x-real-ip");

#[derive(Debug, thiserror::Error)]
#[error("invalid CIDR '{0}', expected e.g. 192.168.1.0/24")]
pub struct InvalidSubnet(String);

/// An IPv4 or IPv6 network in CIDR notation.
///
/// # Examples
///
/// ```
/// use vigil_server::middleware::TrustedSubnet;
///
/// let subnet: TrustedSubnet = "10.1.0.0/16".parse().unwrap();
/// assert!(subnet.contains("10.1.200.3".parse().unwrap()));
/// assert!(!subnet.contains("10.2.0.1".parse().unwrap()));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrustedSubnet {
    network: IpAddr,
    prefix: u8,
}

impl TrustedSubnet {
    pub fn contains(&self, ip: IpAddr) -> bool {
        match (self.network, ip) {
            (IpAddr::V4(net), IpAddr::V4(ip)) => {
                let mask = u32::MAX.checked_shl(32 - u32::from(self.prefix)).unwrap_or(0);
                u32::from(net) & mask == u32::from(ip) & mask
            }
            (IpAddr::V6(net), IpAddr::V6(ip)) => {
                let mask = u128::MAX.checked_shl(128 - u32::from(self.prefix)).unwrap_or(0);
                u128::from(net) & mask == u128::from(ip) & mask
            }
            _ => false,
        }
    }
}

impl FromStr for TrustedSubnet {
    type Err = InvalidSubnet;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || InvalidSubnet(s.to_string());
        let (addr, prefix) = s.trim().split_once('/').ok_or_else(invalid)?;
        let network: IpAddr = addr.parse().map_err(|_| invalid())?;
        let prefix: u8 = prefix.parse().map_err(|_| invalid())?;
        let max = if network.is_ipv4() { 32 } else { 128 };
        if prefix > max {
            return Err(invalid());
        }
        Ok(Self { network, prefix })
    }
}

/// Rejects requests whose `X-Real-IP` is missing or outside the configured
/// trusted subnet. Passes everything through when no subnet is configured.
pub async fn trusted_subnet_middleware(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let Some(subnet) = state.trusted_subnet else {
        return next.run(req).await;
    };

    let trace_id = req
        .extensions()
        .get::<TraceId>()
        .map(|t| t.0.clone())
        .unwrap_or_default();

    let real_ip = req
        .headers()
        .get(&X_REAL_IP)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<IpAddr>().ok());

    match real_ip {
        Some(ip) if subnet.contains(ip) => next.run(req).await,
        Some(ip) => {
            tracing::warn!(trace_id = %trace_id, real_ip = %ip, "Request rejected: address outside trusted subnet");
            error_response(
                StatusCode::FORBIDDEN,
                &trace_id,
                "forbidden",
                "X-Real-IP is outside the trusted subnet",
            )
        }
        None => {
            tracing::warn!(trace_id = %trace_id, "Request rejected: missing or invalid X-Real-IP");
            error_response(
                StatusCode::FORBIDDEN,
                &trace_id,
                "forbidden",
                "missing or invalid X-Real-IP header",
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use axum::routing::get;
    use axum::Router;
    use std::sync::Arc;
    use tower::ServiceExt;
    use vigil_storage::MemStorage;

    fn build_app(trusted_subnet: Option<&str>) -> Router {
        let config = ServerConfig {
            trusted_subnet: trusted_subnet.map(str::to_string),
            ..ServerConfig::default()
        };
        let state = AppState::new(config, Arc::new(MemStorage::new(""))).unwrap();
        Router::new()
            .route("/ping", get(|| async { "pong" }))
            .layer(axum::middleware::from_fn_with_state(
                state.clone(),
                trusted_subnet_middleware,
            ))
            .with_state(state)
    }

    async fn status_for(app: Router, real_ip: Option<&str>) -> StatusCode {
        let mut builder = Request::builder().uri("/ping");
        if let Some(ip) = real_ip {
            builder = builder.header("X-Real-IP", ip);
        }
        let resp = app.oneshot(builder.body(Body::empty()).unwrap()).await.unwrap();
        resp.status()
    }

    #[test]
    fn parses_and_matches_cidrs() {
        let v4: TrustedSubnet = "192.168.1.0/24".parse().unwrap();
        assert!(v4.contains("192.168.1.77".parse().unwrap()));
        assert!(!v4.contains("192.168.2.1".parse().unwrap()));
        assert!(!v4.contains("::1".parse().unwrap()));

        let any: TrustedSubnet = "0.0.0.0/0".parse().unwrap();
        assert!(any.contains("8.8.8.8".parse().unwrap()));

        let v6: TrustedSubnet = "fd00::/8".parse().unwrap();
        assert!(v6.contains("fd12:3456::1".parse().unwrap()));

        assert!("192.168.1.0".parse::<TrustedSubnet>().is_err());
        assert!("192.168.1.0/33".parse::<TrustedSubnet>().is_err());
        assert!("not-an-ip/8".parse::<TrustedSubnet>().is_err());
    }

    #[tokio::test]
    async fn passes_through_without_subnet() {
        assert_eq!(status_for(build_app(None), None).await, StatusCode::OK);
    }

    #[tokio::test]
    async fn enforces_subnet_when_configured() {
        let subnet = Some("10.0.0.0/8");
        assert_eq!(status_for(build_app(subnet), Some("10.4.5.6")).await, StatusCode::OK);
        assert_eq!(
            status_for(build_app(subnet), Some("172.16.0.1")).await,
            StatusCode::FORBIDDEN
        );
        assert_eq!(status_for(build_app(subnet), None).await, StatusCode::FORBIDDEN);
        assert_eq!(
            status_for(build_app(subnet), Some("garbage")).await,
            StatusCode::FORBIDDEN
        );
    }
}
