// SPDX-FileCopyrightText: 2026 Plaudit Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for end-to-end pipeline tests.
//!
//! `TestHarness` opens a temp SQLite store, seeds one business with one
//! customer and per-channel credit, and builds the worker and reconciler
//! against scripted providers.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use plaudit_config::model::{DispatchConfig, PlauditConfig, WebhookConfig};
use plaudit_core::{
    AuditEventType, Channel, DispatchRecord, NewDispatch, PlauditError,
};
use plaudit_dispatch::DispatchWorker;
use plaudit_storage::queries::{audit, dispatches, tenants};
use plaudit_storage::{Business, Customer, Database};
use plaudit_suppression::SuppressionRegistry;
use plaudit_usage::UsageLimiter;
use plaudit_webhook::WebhookReconciler;

use crate::mock_provider::{ScriptedOutcome, ScriptedProvider};

pub const BUSINESS_ID: &str = "biz-1";
pub const CUSTOMER_ID: &str = "cust-1";
pub const CUSTOMER_EMAIL: &str = "ada@example.com";
pub const CUSTOMER_PHONE: &str = "+15550100001";
pub const REVIEW_LINK: &str = "https://g.page/r/corner-bakery/review";

/// Builder for configuring the test environment.
pub struct TestHarnessBuilder {
    email_quota: Option<u32>,
    sms_quota: Option<u32>,
    email_script: Vec<ScriptedOutcome>,
    sms_script: Vec<ScriptedOutcome>,
    review_link: Option<String>,
    website: Option<String>,
    config: PlauditConfig,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        Self {
            email_quota: Some(100),
            sms_quota: Some(100),
            email_script: Vec::new(),
            sms_script: Vec::new(),
            review_link: Some(REVIEW_LINK.to_string()),
            website: Some("https://corner-bakery.example".to_string()),
            config: PlauditConfig::default(),
        }
    }

    /// `None` leaves the business without an email counter.
    pub fn with_email_quota(mut self, quota: Option<u32>) -> Self {
        self.email_quota = quota;
        self
    }

    pub fn with_sms_quota(mut self, quota: Option<u32>) -> Self {
        self.sms_quota = quota;
        self
    }

    pub fn with_email_script(mut self, script: Vec<ScriptedOutcome>) -> Self {
        self.email_script = script;
        self
    }

    pub fn with_sms_script(mut self, script: Vec<ScriptedOutcome>) -> Self {
        self.sms_script = script;
        self
    }

    /// Override the business's review link and website.
    pub fn with_business_links(mut self, review_link: Option<&str>, website: Option<&str>) -> Self {
        self.review_link = review_link.map(str::to_string);
        self.website = website.map(str::to_string);
        self
    }

    pub fn with_dispatch_config(mut self, dispatch: DispatchConfig) -> Self {
        self.config.dispatch = dispatch;
        self
    }

    pub fn with_webhook_config(mut self, webhook: WebhookConfig) -> Self {
        self.config.webhook = webhook;
        self
    }

    pub fn with_public_base_url(mut self, url: &str) -> Self {
        self.config.gateway.public_base_url = url.to_string();
        self
    }

    pub async fn build(self) -> Result<TestHarness, PlauditError> {
        let temp_dir = tempfile::TempDir::new().map_err(PlauditError::storage)?;
        let db_path = temp_dir.path().join("test.db");
        let mut config = self.config;
        config.storage.database_path = db_path.to_string_lossy().to_string();

        let db = Database::open_from_config(&config.storage).await?;
        let now = Utc::now();

        tenants::upsert_business(
            &db,
            &Business {
                id: BUSINESS_ID.to_string(),
                name: "Corner Bakery".to_string(),
                review_link: self.review_link,
                website: self.website,
            },
            now,
        )
        .await?;
        tenants::upsert_customer(
            &db,
            &Customer {
                id: CUSTOMER_ID.to_string(),
                business_id: BUSINESS_ID.to_string(),
                first_name: Some("Ada".to_string()),
                last_name: Some("Lovelace".to_string()),
                email: Some(CUSTOMER_EMAIL.to_string()),
                phone: Some(CUSTOMER_PHONE.to_string()),
            },
            now,
        )
        .await?;

        let usage = UsageLimiter::new(db.clone(), &config.usage);
        if let Some(quota) = self.email_quota {
            usage.set_quota(BUSINESS_ID, Channel::Email, quota, now).await?;
        }
        if let Some(quota) = self.sms_quota {
            usage.set_quota(BUSINESS_ID, Channel::Sms, quota, now).await?;
        }

        Ok(TestHarness {
            email: Arc::new(ScriptedProvider::with_script(Channel::Email, self.email_script)),
            sms: Arc::new(ScriptedProvider::with_script(Channel::Sms, self.sms_script)),
            suppression: SuppressionRegistry::new(db.clone()),
            usage,
            db,
            config,
            _temp_dir: temp_dir,
        })
    }
}

/// A complete pipeline environment over a temp store.
pub struct TestHarness {
    pub db: Database,
    pub config: PlauditConfig,
    pub email: Arc<ScriptedProvider>,
    pub sms: Arc<ScriptedProvider>,
    pub suppression: SuppressionRegistry,
    pub usage: UsageLimiter,
    /// Temp directory kept alive for cleanup on drop.
    _temp_dir: tempfile::TempDir,
}

impl TestHarness {
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    /// A worker with both scripted providers registered.
    pub fn worker(&self) -> DispatchWorker {
        DispatchWorker::new(
            self.db.clone(),
            self.suppression.clone(),
            self.usage.clone(),
            &self.config,
        )
        .with_provider(self.email.clone())
        .with_provider(self.sms.clone())
    }

    pub fn reconciler(&self) -> WebhookReconciler {
        WebhookReconciler::new(self.db.clone(), &self.config.webhook)
    }

    /// Queue a dispatch to the seeded customer on `channel`.
    pub async fn queue(
        &self,
        channel: Channel,
        scheduled_for: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<DispatchRecord, PlauditError> {
        let (contact, subject) = match channel {
            Channel::Email => (CUSTOMER_EMAIL, Some("How did we do?".to_string())),
            Channel::Sms => (CUSTOMER_PHONE, None),
        };
        dispatches::create_dispatch(
            &self.db,
            NewDispatch {
                business_id: BUSINESS_ID.to_string(),
                customer_id: CUSTOMER_ID.to_string(),
                channel,
                contact: contact.to_string(),
                subject,
                body: "Hi Ada, tell us how we did: {{tracking_url}}".to_string(),
                review_url: None,
                scheduled_for,
            },
            now,
        )
        .await
    }

    /// Reload a dispatch, failing if it vanished.
    pub async fn reload(&self, id: &str) -> Result<DispatchRecord, PlauditError> {
        dispatches::get_dispatch(&self.db, id)
            .await?
            .ok_or_else(|| PlauditError::NotFound {
                entity: "dispatch",
                id: id.to_string(),
            })
    }

    /// Audit event types for a dispatch, oldest first.
    pub async fn audit_types(&self, id: &str) -> Result<Vec<AuditEventType>, PlauditError> {
        Ok(audit::list_audit_events(&self.db, id)
            .await?
            .into_iter()
            .map(|e| e.event_type)
            .collect())
    }
}
