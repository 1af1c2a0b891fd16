// Copyright (c) The dedup-probe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The notification-submission client.
//!
//! [`NotificationClient`] is the seam between the harness and the network. The harness only ever
//! needs one operation: submit a notification and get back the HTTP status along with the
//! `error` flag from the response body. [`HttpNotificationClient`] is the real implementation.

use crate::{
    case_source::{CaseValue, TestCase},
    config::ProbeProfile,
    errors::{ClientBuildError, TransportError},
};
use reqwest::{
    Url,
    header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue},
};
use serde::{Deserialize, Serialize};
use std::{future::Future, time::Duration};
use tracing::{debug, warn};

/// The header carrying the API key.
pub const API_KEY_HEADER: &str = "x-api-key";

/// The message recorded for a submission that failed in transport.
pub const TRANSPORT_FAILURE_MESSAGE: &str = "transport failure";

/// The JSON payload of a notification submission.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct NotificationRequest {
    /// The phone number.
    #[serde(rename = "celular")]
    pub phone: String,

    /// The management (job) ID.
    #[serde(rename = "id_gestion")]
    pub management_id: CaseValue,

    /// The notification type.
    #[serde(rename = "tipo")]
    pub notification_type: CaseValue,
}

impl NotificationRequest {
    /// Builds the payload submitted for a test case.
    pub fn for_case(case: &TestCase) -> Self {
        Self {
            phone: case.phone.clone(),
            management_id: case.management_id.clone(),
            notification_type: case.notification_type.clone(),
        }
    }
}

/// A response to a notification submission, reduced to what the classifier needs.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SubmitResponse {
    /// The HTTP status code.
    pub status: u16,

    /// The `error` flag. Always true for non-200 and malformed responses.
    pub error_flag: bool,

    /// The message carried by the body, if any.
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseBody {
    #[serde(default)]
    error: Option<serde_json::Value>,
    #[serde(default)]
    message: Option<serde_json::Value>,
}

impl SubmitResponse {
    /// Interprets a response body.
    ///
    /// A boolean `error` field is the flag. Non-200 responses carry a string `error` field, which
    /// becomes the message. A 200 response that isn't a JSON object with a boolean `error` field is
    /// malformed, and is treated as flagged.
    pub fn from_body(status: u16, body: &[u8]) -> Self {
        let parsed = serde_json::from_slice::<ResponseBody>(body).ok();
        let message = parsed.as_ref().and_then(|body| {
            let error_message = match &body.error {
                Some(serde_json::Value::String(message)) => Some(message.clone()),
                _ => None,
            };
            error_message.or_else(|| match &body.message {
                Some(serde_json::Value::String(message)) => Some(message.clone()),
                Some(serde_json::Value::Null) | None => None,
                Some(other) => Some(other.to_string()),
            })
        });
        let flag = parsed.as_ref().and_then(|body| match body.error {
            Some(serde_json::Value::Bool(flag)) => Some(flag),
            _ => None,
        });

        match (status, flag) {
            (200, Some(error_flag)) => Self {
                status,
                error_flag,
                message,
            },
            (200, None) => Self {
                status,
                error_flag: true,
                message: Some(match parsed {
                    Some(_) => "malformed response: no boolean `error` field".to_owned(),
                    None => "malformed response: body is not a JSON object".to_owned(),
                }),
            },
            _ => Self {
                status,
                error_flag: true,
                message,
            },
        }
    }

    /// The outcome recorded when a submission fails in transport.
    pub fn transport_failure() -> Self {
        Self {
            status: 0,
            error_flag: true,
            message: Some(TRANSPORT_FAILURE_MESSAGE.to_owned()),
        }
    }

    /// Returns true if this response delivered the notification: status 200 and not flagged.
    pub fn is_delivered(&self) -> bool {
        self.status == 200 && !self.error_flag
    }
}

/// Submits notifications.
///
/// Implementations never retry and never deduplicate: every call is one request.
pub trait NotificationClient {
    /// Submits a single notification.
    fn submit(
        &self,
        request: &NotificationRequest,
    ) -> impl Future<Output = Result<SubmitResponse, TransportError>>;
}

/// Settings used to construct an [`HttpNotificationClient`].
#[derive(Clone, Debug)]
pub struct ClientSettings {
    /// The base URL of the API.
    pub base_url: String,

    /// The path submissions are POSTed to.
    pub send_path: String,

    /// The API key, and the environment variable it was read from.
    pub api_key: Option<(String, String)>,

    /// The connect timeout.
    pub connect_timeout: Duration,

    /// The overall per-request timeout.
    pub request_timeout: Duration,
}

impl ClientSettings {
    /// Resolves client settings from a profile.
    ///
    /// `base_url` overrides the profile's base URL. The API key is read from the environment
    /// variable the profile names.
    pub fn from_profile(
        profile: &ProbeProfile<'_>,
        base_url: Option<&str>,
    ) -> Result<Self, ClientBuildError> {
        let base_url = base_url
            .or(profile.base_url())
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| ClientBuildError::MissingBaseUrl {
                profile: profile.name().to_owned(),
            })?;

        let env_var = profile.api_key_env();
        let api_key = match std::env::var(env_var) {
            Ok(key) if !key.trim().is_empty() => Some((env_var.to_owned(), key)),
            _ => {
                warn!("{env_var} is not set, submitting without an {API_KEY_HEADER} header");
                None
            }
        };

        Ok(Self {
            base_url: base_url.to_owned(),
            send_path: profile.send_path().to_owned(),
            api_key,
            connect_timeout: profile.connect_timeout(),
            request_timeout: profile.request_timeout(),
        })
    }

    /// Returns the full URL submissions are sent to.
    pub fn endpoint(&self) -> Result<Url, ClientBuildError> {
        let url = format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            self.send_path.trim_start_matches('/')
        );
        let parsed = Url::parse(&url).map_err(|error| ClientBuildError::InvalidUrl {
            url: url.clone(),
            message: error.to_string(),
        })?;
        if matches!(parsed.scheme(), "http" | "https") {
            Ok(parsed)
        } else {
            Err(ClientBuildError::InvalidUrl {
                message: format!("unsupported scheme `{}`", parsed.scheme()),
                url,
            })
        }
    }
}

/// A [`NotificationClient`] backed by a shared `reqwest` client.
///
/// Headers, base URL and timeouts are fixed at construction.
#[derive(Clone, Debug)]
pub struct HttpNotificationClient {
    client: reqwest::Client,
    endpoint: Url,
}

impl HttpNotificationClient {
    /// Creates a new client.
    pub fn new(settings: &ClientSettings) -> Result<Self, ClientBuildError> {
        let endpoint = settings.endpoint()?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some((env_var, key)) = &settings.api_key {
            let mut value =
                HeaderValue::from_str(key).map_err(|error| ClientBuildError::InvalidApiKey {
                    env_var: env_var.clone(),
                    error,
                })?;
            value.set_sensitive(true);
            headers.insert(HeaderName::from_static(API_KEY_HEADER), value);
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .connect_timeout(settings.connect_timeout)
            .timeout(settings.request_timeout)
            .build()
            .map_err(ClientBuildError::Http)?;

        Ok(Self { client, endpoint })
    }

    /// Returns the URL submissions are sent to.
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

impl NotificationClient for HttpNotificationClient {
    async fn submit(
        &self,
        request: &NotificationRequest,
    ) -> Result<SubmitResponse, TransportError> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(request)
            .send()
            .await
            .map_err(TransportError::http)?;
        let status = response.status().as_u16();
        let body = response.bytes().await.map_err(TransportError::http)?;
        debug!(
            status,
            body = %String::from_utf8_lossy(&body),
            "received response for management ID {}",
            request.management_id,
        );
        Ok(SubmitResponse::from_body(status, &body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    #[test_case(
        200, br#"{"error": false, "message": "sent"}"#,
        false, Some("sent")
        ; "delivered"
    )]
    #[test_case(
        200, br#"{"error": true, "message": "duplicate"}"#,
        true, Some("duplicate")
        ; "duplicate"
    )]
    #[test_case(
        400, br#"{"error": "invalid phone"}"#,
        true, Some("invalid phone")
        ; "non-200 string error becomes message"
    )]
    #[test_case(
        500, br#"{"error": false}"#,
        true, None
        ; "non-200 is always flagged"
    )]
    #[test_case(
        502, b"<html>bad gateway</html>",
        true, None
        ; "non-200 non-json"
    )]
    #[test_case(
        200, br#"{"message": "ok"}"#,
        true, Some("malformed response: no boolean `error` field")
        ; "200 without error field"
    )]
    #[test_case(
        200, b"OK",
        true, Some("malformed response: body is not a JSON object")
        ; "200 non-json"
    )]
    fn interpret_body(status: u16, body: &[u8], error_flag: bool, message: Option<&str>) {
        let response = SubmitResponse::from_body(status, body);
        assert_eq!(
            response,
            SubmitResponse {
                status,
                error_flag,
                message: message.map(str::to_owned),
            }
        );
    }

    #[test]
    fn request_payload() {
        let request = NotificationRequest {
            phone: "926208479".to_owned(),
            management_id: CaseValue::Number(160864065),
            notification_type: CaseValue::Number(7),
        };
        assert_eq!(
            serde_json::to_value(&request).expect("serializes"),
            serde_json::json!({
                "celular": "926208479",
                "id_gestion": 160864065,
                "tipo": 7,
            })
        );
    }

    #[test_case(
        "https://api.example.com", "/mobile/whatsapp/send",
        Some("https://api.example.com/mobile/whatsapp/send")
        ; "plain"
    )]
    #[test_case(
        "https://api.example.com/dev/", "/mobile/whatsapp/send",
        Some("https://api.example.com/dev/mobile/whatsapp/send")
        ; "base with path"
    )]
    #[test_case("ftp://api.example.com", "/send", None; "bad scheme")]
    #[test_case("not a url", "/send", None; "unparseable")]
    fn endpoint(base_url: &str, send_path: &str, expected: Option<&str>) {
        let settings = ClientSettings {
            base_url: base_url.to_owned(),
            send_path: send_path.to_owned(),
            api_key: None,
            connect_timeout: Duration::from_secs(1),
            request_timeout: Duration::from_secs(1),
        };
        let endpoint = settings.endpoint().ok().map(|url| url.to_string());
        assert_eq!(endpoint.as_deref(), expected);
    }

    #[test]
    fn transport_failure_is_flagged() {
        let response = SubmitResponse::transport_failure();
        assert_eq!(response.status, 0);
        assert!(response.error_flag);
        assert!(!response.is_delivered());
        assert_eq!(response.message.as_deref(), Some("transport failure"));
    }
}
