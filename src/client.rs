use crate::devices::{DevicesResponse, ScanResponse};
use crate::error::PollError;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::time::Duration;

/// Validated coordinates of the scanning station.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScanRequest {
    pub latitude: f64,
    pub longitude: f64,
}

impl ScanRequest {
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, PollError> {
        if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
            return Err(PollError::Input(format!(
                "latitude must be a number between -90 and 90, got {latitude}"
            )));
        }
        if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
            return Err(PollError::Input(format!(
                "longitude must be a number between -180 and 180, got {longitude}"
            )));
        }
        Ok(Self {
            latitude,
            longitude,
        })
    }

    /// Parses raw form input. Nothing reaches the backend unless both fields parse.
    pub fn parse(latitude: &str, longitude: &str) -> Result<Self, PollError> {
        let lat = parse_coordinate("latitude", latitude)?;
        let lon = parse_coordinate("longitude", longitude)?;
        Self::new(lat, lon)
    }
}

fn parse_coordinate(field: &str, raw: &str) -> Result<f64, PollError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(PollError::Input(format!("{field} is required")));
    }
    trimmed
        .parse::<f64>()
        .map_err(|_| PollError::Input(format!("{field} is not a number: {trimmed:?}")))
}

#[derive(Clone)]
pub struct BackendClient {
    http: reqwest::Client,
    base_url: String,
}

impl BackendClient {
    pub fn new(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn fetch_devices(&self) -> Result<DevicesResponse, PollError> {
        let url = format!("{}/api/devices", self.base_url);
        let request = self.http.get(&url);
        self.execute(url, request).await
    }

    pub async fn scan(&self, req: ScanRequest) -> Result<ScanResponse, PollError> {
        let url = format!("{}/api/scan", self.base_url);
        let request = self.http.post(&url).json(&req);
        self.execute(url, request).await
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        url: String,
        request: reqwest::RequestBuilder,
    ) -> Result<T, PollError> {
        let response = match request.send().await {
            Ok(resp) => resp,
            Err(source) => return Err(PollError::Network { url, source }),
        };
        let status = response.status();
        if !status.is_success() {
            return Err(PollError::Status { url, status });
        }
        let body = match response.bytes().await {
            Ok(body) => body,
            Err(source) => return Err(PollError::Network { url, source }),
        };
        serde_json::from_slice(&body).map_err(|source| PollError::Decode { url, source })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use axum::routing::get;
    use axum::{Json, Router};
    use serde_json::json;

    #[test]
    fn coordinates_are_validated_before_sending() {
        let ok = ScanRequest::parse(" 40.0 ", "-3.0").map_err(|e| e.to_string());
        assert_eq!(
            ok,
            Ok(ScanRequest {
                latitude: 40.0,
                longitude: -3.0
            })
        );

        for (lat, lon) in [("", "-3"), ("abc", "-3"), ("40", "NaN"), ("91", "0"), ("0", "-180.5")] {
            let err = ScanRequest::parse(lat, lon).expect_err("input should be rejected");
            assert_eq!(err.kind(), ErrorKind::Input, "{lat} / {lon}");
        }
    }

    #[test]
    fn non_finite_numbers_are_rejected() {
        assert!(ScanRequest::new(f64::INFINITY, 0.0).is_err());
        assert!(ScanRequest::new(0.0, f64::NAN).is_err());
    }

    #[tokio::test]
    async fn unreachable_backend_is_a_network_error() -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        drop(listener);

        let client = BackendClient::new(&format!("http://{addr}/"), Duration::from_millis(500))?;
        assert_eq!(client.base_url(), format!("http://{addr}"));
        let err = client.fetch_devices().await.expect_err("nothing is listening");
        assert_eq!(err.kind(), ErrorKind::Network);
        Ok(())
    }

    #[tokio::test]
    async fn slow_backend_times_out_as_a_network_error() -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let app = Router::new().route(
            "/api/devices",
            get(|| async {
                tokio::time::sleep(Duration::from_millis(300)).await;
                Json(json!({"devices": [], "new_devices": []}))
            }),
        );
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        let client = BackendClient::new(&format!("http://{addr}"), Duration::from_millis(100))?;
        let err = client.fetch_devices().await.expect_err("request outlives the timeout");
        assert_eq!(err.kind(), ErrorKind::Network);
        assert!(matches!(err, PollError::Network { ref source, .. } if source.is_timeout()));
        Ok(())
    }
}
