//! Liveness endpoint
//!
//! `GET /health` always answers 200 with the service name and the current
//! time. It reads no shared state and has no side effects.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use warp::Filter;

/// Body of the liveness response
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HealthReport {
    pub status: String,
    pub service: String,
    /// RFC 3339 timestamp
    pub timestamp: String,
}

impl HealthReport {
    pub fn healthy(service: &str) -> Self {
        Self {
            status: "healthy".to_string(),
            service: service.to_string(),
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        }
    }
}

/// GET /health
pub fn health_route(
    service_name: impl Into<String>,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    let service_name: Arc<str> = Arc::from(service_name.into());

    warp::path("health")
        .and(warp::path::end())
        .and(warp::get())
        .and_then(move || {
            let service_name = service_name.clone();
            async move {
                Ok::<_, Infallible>(warp::reply::json(&HealthReport::healthy(&service_name)))
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_healthy_report() {
        let report = HealthReport::healthy("async-calculation-service");
        assert_eq!(report.status, "healthy");
        assert_eq!(report.service, "async-calculation-service");
        assert!(chrono::DateTime::parse_from_rfc3339(&report.timestamp).is_ok());
    }

    #[tokio::test]
    async fn test_health_route_responds_ok() {
        let route = health_route("svc");

        let response = warp::test::request()
            .method("GET")
            .path("/health")
            .reply(&route)
            .await;

        assert_eq!(response.status(), 200);
        let report: HealthReport = serde_json::from_slice(response.body()).unwrap();
        assert_eq!(report.status, "healthy");
        assert_eq!(report.service, "svc");
    }

    #[tokio::test]
    async fn test_health_route_rejects_post() {
        let route = health_route("svc");

        let response = warp::test::request()
            .method("POST")
            .path("/health")
            .reply(&route)
            .await;

        assert_eq!(response.status(), 405);
    }
}
