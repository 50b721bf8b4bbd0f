// SPDX-FileCopyrightText: 2026 Plaudit Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Twilio Programmable Messaging.

use async_trait::async_trait;
use plaudit_config::model::SmsConfig;
use plaudit_core::{
    AdapterType, Channel, ChannelProvider, HealthStatus, OutboundMessage, PlauditError,
    PluginAdapter, ProviderReceipt, SendError,
};
use reqwest::header::CONTENT_TYPE;
use serde::Deserialize;
use tracing::debug;

use crate::{classify_status, classify_transport, http_client};

const PROVIDER: &str = "twilio";

#[derive(Debug, Deserialize)]
struct MessageResource {
    sid: String,
}

/// SMS provider backed by the Twilio Messages API.
#[derive(Debug, Clone)]
pub struct TwilioProvider {
    client: reqwest::Client,
    account_sid: String,
    auth_token: String,
    from_number: String,
    endpoint: String,
}

impl TwilioProvider {
    pub fn new(config: &SmsConfig) -> Result<Self, PlauditError> {
        let account_sid = config
            .account_sid
            .clone()
            .ok_or_else(|| PlauditError::Config("sms.account_sid is required".into()))?;
        let auth_token = config
            .auth_token
            .clone()
            .ok_or_else(|| PlauditError::Config("sms.auth_token is required".into()))?;
        let from_number = config
            .from_number
            .clone()
            .ok_or_else(|| PlauditError::Config("sms.from_number is required".into()))?;
        let endpoint = format!(
            "{}/2010-04-01/Accounts/{account_sid}/Messages.json",
            config.base_url.trim_end_matches('/')
        );

        Ok(Self {
            client: http_client()?,
            account_sid,
            auth_token,
            from_number,
            endpoint,
        })
    }
}

#[async_trait]
impl PluginAdapter for TwilioProvider {
    fn name(&self) -> &str {
        PROVIDER
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Provider
    }

    async fn health_check(&self) -> Result<HealthStatus, PlauditError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), PlauditError> {
        Ok(())
    }
}

#[async_trait]
impl ChannelProvider for TwilioProvider {
    fn channel(&self) -> Channel {
        Channel::Sms
    }

    async fn send(&self, message: &OutboundMessage) -> Result<ProviderReceipt, SendError> {
        let form = serde_urlencoded::to_string([
            ("To", message.recipient.as_str()),
            ("From", self.from_number.as_str()),
            ("Body", message.body.as_str()),
        ])
        .map_err(|e| SendError::permanent(format!("failed to encode twilio form: {e}")))?;

        let response = self
            .client
            .post(&self.endpoint)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(form)
            .send()
            .await
            .map_err(|e| classify_transport(PROVIDER, &e))?;

        let status = response.status();
        debug!(status = %status, dispatch_id = message.dispatch_id.as_str(), "twilio response");

        let text = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(classify_status(PROVIDER, status, &text));
        }

        let resource: MessageResource = serde_json::from_str(&text).map_err(|e| {
            SendError::permanent(format!("twilio accepted the message but the response was unreadable: {e}"))
        })?;
        Ok(ProviderReceipt {
            provider_message_id: resource.sid,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use wiremock::matchers::{body_string_contains, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(base_url: &str) -> TwilioProvider {
        TwilioProvider::new(&SmsConfig {
            account_sid: Some("AC123".into()),
            auth_token: Some("secret".into()),
            from_number: Some("+15550001111".into()),
            base_url: base_url.to_string(),
        })
        .unwrap()
    }

    fn message() -> OutboundMessage {
        OutboundMessage {
            dispatch_id: "d-2".into(),
            channel: Channel::Sms,
            recipient: "+15550100001".into(),
            subject: None,
            body: "Thanks! Review us: https://x/r/t".into(),
            metadata: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn created_message_returns_sid() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/2010-04-01/Accounts/AC123/Messages.json"))
            .and(header_exists("authorization"))
            .and(body_string_contains("To=%2B15550100001"))
            .and(body_string_contains("From=%2B15550001111"))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
                "sid": "SM0001",
                "status": "queued"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let receipt = provider(&server.uri()).send(&message()).await.unwrap();
        assert_eq!(receipt.provider_message_id, "SM0001");
    }

    #[tokio::test]
    async fn throttled_send_is_retryable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let err = provider(&server.uri()).send(&message()).await.unwrap_err();
        assert!(err.retryable);
    }

    #[tokio::test]
    async fn invalid_number_is_permanent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "code": 21211,
                "message": "The 'To' number is not a valid phone number."
            })))
            .mount(&server)
            .await;

        let err = provider(&server.uri()).send(&message()).await.unwrap_err();
        assert!(!err.retryable);
        assert!(err.reason.contains("21211"));
    }

    #[test]
    fn missing_token_is_a_config_error() {
        let err = TwilioProvider::new(&SmsConfig {
            account_sid: Some("AC1".into()),
            ..SmsConfig::default()
        })
        .unwrap_err();
        assert!(matches!(err, PlauditError::Config(_)));
    }
}
