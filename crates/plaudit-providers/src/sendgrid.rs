// SPDX-FileCopyrightText: 2026 Plaudit Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SendGrid v3 mail send.
//!
//! The message identifier comes back in the `X-Message-Id` header of the
//! 202 response; SendGrid's event webhook reports it as the prefix of
//! `sg_message_id`.

use async_trait::async_trait;
use plaudit_config::model::EmailConfig;
use plaudit_core::{
    AdapterType, Channel, ChannelProvider, HealthStatus, OutboundMessage, PlauditError,
    PluginAdapter, ProviderReceipt, SendError,
};
use serde::Serialize;
use tracing::debug;

use crate::{classify_status, classify_transport, http_client};

const PROVIDER: &str = "sendgrid";

#[derive(Debug, Serialize)]
struct MailSend<'a> {
    personalizations: [Personalization<'a>; 1],
    from: Address<'a>,
    subject: &'a str,
    content: [Content<'a>; 1],
}

#[derive(Debug, Serialize)]
struct Personalization<'a> {
    to: [Address<'a>; 1],
    custom_args: &'a std::collections::BTreeMap<String, String>,
}

#[derive(Debug, Serialize)]
struct Address<'a> {
    email: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    value: &'a str,
}

/// Email provider backed by the SendGrid v3 API.
#[derive(Debug, Clone)]
pub struct SendGridProvider {
    client: reqwest::Client,
    api_key: String,
    from_address: String,
    from_name: Option<String>,
    endpoint: String,
}

impl SendGridProvider {
    pub fn new(config: &EmailConfig) -> Result<Self, PlauditError> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| PlauditError::Config("email.api_key is required".into()))?;
        let from_address = config
            .from_address
            .clone()
            .ok_or_else(|| PlauditError::Config("email.from_address is required".into()))?;

        Ok(Self {
            client: http_client()?,
            api_key,
            from_address,
            from_name: config.from_name.clone(),
            endpoint: format!("{}/v3/mail/send", config.base_url.trim_end_matches('/')),
        })
    }
}

#[async_trait]
impl PluginAdapter for SendGridProvider {
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
impl ChannelProvider for SendGridProvider {
    fn channel(&self) -> Channel {
        Channel::Email
    }

    async fn send(&self, message: &OutboundMessage) -> Result<ProviderReceipt, SendError> {
        let body = MailSend {
            personalizations: [Personalization {
                to: [Address {
                    email: &message.recipient,
                    name: None,
                }],
                custom_args: &message.metadata,
            }],
            from: Address {
                email: &self.from_address,
                name: self.from_name.as_deref(),
            },
            subject: message.subject.as_deref().unwrap_or_default(),
            content: [Content {
                kind: "text/html",
                value: &message.body,
            }],
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| classify_transport(PROVIDER, &e))?;

        let status = response.status();
        debug!(status = %status, dispatch_id = message.dispatch_id.as_str(), "sendgrid response");

        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(classify_status(PROVIDER, status, &text));
        }

        let message_id = response
            .headers()
            .get("x-message-id")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        // Accepted but unidentifiable: retrying would send a duplicate.
        message_id
            .map(|provider_message_id| ProviderReceipt {
                provider_message_id,
            })
            .ok_or_else(|| SendError::permanent("sendgrid accepted the message without X-Message-Id"))
    }
}
