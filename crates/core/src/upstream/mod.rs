pub mod chat;
pub mod supavec;

pub use chat::ChatCompletionsModel;
pub use supavec::SupavecStore;

use crate::GatewayError;
use reqwest::Response;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::warn;

pub(crate) fn build_client(
    service: &str,
    timeout: Duration,
) -> Result<reqwest::Client, GatewayError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|error| GatewayError::internal(format!("cannot build {service} client: {error}")))
}

/// Checks the status and decodes the body, mapping every failure mode onto
/// the gateway taxonomy with the upstream payload kept as detail.
pub(crate) async fn read_json<T: DeserializeOwned>(
    service: &str,
    response: Response,
) -> Result<T, GatewayError> {
    let status = response.status();
    let body = response
        .bytes()
        .await
        .map_err(|error| GatewayError::from_transport(service, error))?;

    if !status.is_success() {
        let payload = String::from_utf8_lossy(&body).into_owned();
        warn!(service, %status, payload = %payload, "upstream returned an error status");
        return Err(GatewayError::upstream(service, format!("{status}: {payload}")));
    }

    serde_json::from_slice(&body).map_err(|error| {
        warn!(service, %error, "upstream returned malformed json");
        GatewayError::upstream(service, format!("malformed response: {error}"))
    })
}
