use std::time::Duration;

use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{ServiceError, ServiceResult};

/// Decode a service response into `T`.
///
/// The backends report failures as `{"error": "..."}`, sometimes with a 2xx
/// status, so the error field is checked before the status code.
pub(crate) async fn decode<T: DeserializeOwned>(response: Response) -> ServiceResult<T> {
    let status = response.status();
    let body = response.text().await?;

    let value: Value = match serde_json::from_str(&body) {
        Ok(value) => value,
        Err(e) if status.is_success() => {
            return Err(ServiceError::Protocol(format!("expected JSON body: {e}")));
        }
        Err(_) => {
            return Err(ServiceError::Status {
                status: status.as_u16(),
                body,
            });
        }
    };

    if let Some(message) = value.get("error").and_then(Value::as_str) {
        return Err(ServiceError::Server(message.to_string()));
    }

    if !status.is_success() {
        return Err(ServiceError::Status {
            status: status.as_u16(),
            body,
        });
    }

    serde_json::from_value(value).map_err(|e| ServiceError::Protocol(e.to_string()))
}

/// Shared client setup. Every request is bounded by `timeout`.
pub(crate) fn build_client(timeout: Duration) -> ServiceResult<Client> {
    Ok(Client::builder().timeout(timeout).build()?)
}

pub(crate) fn trim_base_url(base_url: &str) -> String {
    base_url.trim_end_matches('/').to_string()
}
