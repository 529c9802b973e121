use std::sync::Arc;
use std::time::Duration;

use dw_core::config::PushConfig;
use dw_core::error::{codes, AppError};
use dw_core::notify::{PushMessage, PushProvider, SendReceipt};
use serde::Deserialize;

use crate::message::build_send_request;

/// Firebase Cloud Messaging over the HTTP v1 API.
#[derive(Debug, Clone)]
pub struct FcmProvider {
    endpoint: String,
    project_id: String,
    access_token: String,
    timeout: Duration,
}

#[derive(Debug, Clone, Deserialize)]
struct SendResponse {
    name: String,
}

fn validate_endpoint(endpoint: &str) -> Result<String, AppError> {
    let endpoint = endpoint.trim().trim_end_matches('/').to_string();

    // TLS everywhere except a local emulator.
    let is_https = endpoint
        .strip_prefix("https://")
        .is_some_and(|rest| !rest.is_empty() && !rest.contains(['/', '@', ' ']));
    let is_local = endpoint == "http://127.0.0.1"
        || endpoint
            .strip_prefix("http://127.0.0.1:")
            .and_then(|port| port.parse::<u16>().ok())
            .is_some_and(|port| port != 0);

    if !is_https && !is_local {
        return Err(
            AppError::provider_unavailable("FCM endpoint must be an https:// origin")
                .with_details(format!("endpoint={endpoint}")),
        );
    }
    Ok(endpoint)
}

impl FcmProvider {
    pub fn new(
        endpoint: &str,
        project_id: &str,
        access_token: &str,
        timeout: Duration,
    ) -> Result<Self, AppError> {
        let endpoint = validate_endpoint(endpoint)?;
        if project_id.trim().is_empty() {
            return Err(AppError::provider_unavailable("FCM project id is not configured"));
        }
        if access_token.trim().is_empty() {
            return Err(AppError::provider_unavailable("FCM access token is not configured"));
        }
        Ok(Self {
            endpoint,
            project_id: project_id.trim().to_string(),
            access_token: access_token.trim().to_string(),
            timeout,
        })
    }

    pub fn from_config(config: &PushConfig) -> Result<Self, AppError> {
        let project_id = config.project_id.as_deref().ok_or_else(|| {
            AppError::provider_unavailable("FCM project id is not configured")
                .with_details("set FCM_PROJECT_ID")
        })?;
        let access_token = config.access_token.as_deref().ok_or_else(|| {
            AppError::provider_unavailable("FCM access token is not configured")
                .with_details("set FCM_ACCESS_TOKEN")
        })?;
        Self::new(&config.endpoint, project_id, access_token, config.timeout())
    }

    pub fn send_url(&self) -> String {
        format!(
            "{}/v1/projects/{}/messages:send",
            self.endpoint, self.project_id
        )
    }
}

/// Build the provider handed to `NotificationDispatcher::from_provider`.
pub fn provider_from_config(config: &PushConfig) -> Result<Arc<dyn PushProvider>, AppError> {
    let provider = FcmProvider::from_config(config)?;
    Ok(Arc::new(provider))
}

impl PushProvider for FcmProvider {
    fn send(&self, message: &PushMessage) -> Result<SendReceipt, AppError> {
        let body = serde_json::to_value(build_send_request(message)).map_err(|e| {
            AppError::new(codes::PROVIDER_SEND_FAILED, "Failed to encode FCM request")
                .with_details(e.to_string())
        })?;

        let resp = ureq::post(&self.send_url())
            .timeout(self.timeout)
            .set("Authorization", &format!("Bearer {}", self.access_token))
            .send_json(body);

        match resp {
            Ok(r) if r.status() == 200 => {
                let v: SendResponse = r.into_json().map_err(|e| {
                    AppError::new(codes::PROVIDER_SEND_FAILED, "Failed to decode FCM response")
                        .with_details(e.to_string())
                })?;
                tracing::debug!(message_name = %v.name, topic = %message.topic, "FCM accepted message");
                // A topic send is a single fan-out request; FCM does not report per-device results.
                Ok(SendReceipt {
                    success_count: 1,
                    failure_count: 0,
                })
            }
            Ok(r) => Err(
                AppError::new(codes::PROVIDER_SEND_FAILED, "FCM send failed")
                    .with_details(format!("status={}", r.status())),
            ),
            Err(ureq::Error::Status(status, r)) => {
                let body = r.into_string().unwrap_or_default();
                Err(
                    AppError::new(codes::PROVIDER_SEND_FAILED, "FCM rejected message")
                        .with_details(format!("status={status}; body={body}"))
                        .with_retryable(status == 429 || status >= 500),
                )
            }
            Err(e) => Err(
                AppError::new(codes::PROVIDER_SEND_FAILED, "Failed to reach FCM")
                    .with_details(e.to_string())
                    .with_retryable(true),
            ),
        }
    }
}
