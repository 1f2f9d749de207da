//! HTTP adapter for the payroll system.
//!
//! Creates and updates are sent as `PUT /employees/{id}` with the entity
//! snapshot as the JSON body, so repeating a sync overwrites instead of
//! duplicating. Deletes are `DELETE /employees/{id}` and treat `404` as
//! already done. The id is always sent as a single percent-encoded path
//! segment.

use std::time::Duration;

use reqwest::{StatusCode, Url};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use staffsync_core::EntityAction;
use tracing::{debug, info_span, warn, Instrument};

use crate::{
    adapter::{AdapterHealth, IntegrationAdapter, SyncOutcome},
    error::{DeliveryError, Result},
};

/// Maximum number of response body bytes kept in a failure message.
const MAX_ERROR_BODY: usize = 512;

/// Configuration for the payroll adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayrollConfig {
    /// Base URL of the payroll API.
    pub base_url: String,
    /// Timeout for a single HTTP request.
    pub timeout: Duration,
    /// User agent string for requests.
    pub user_agent: String,
}

impl Default for PayrollConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:9090".to_string(),
            timeout: Duration::from_secs(10),
            user_agent: "staffsync-outbox/0.1".to_string(),
        }
    }
}

/// Adapter that mirrors employee records into the payroll system.
#[derive(Debug, Clone)]
pub struct PayrollAdapter {
    client: reqwest::Client,
    base_url: Url,
}

impl PayrollAdapter {
    /// Adapter name used in configuration.
    pub const NAME: &'static str = "payroll";

    /// Creates a new payroll adapter.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::Configuration` if the base URL is not an
    /// absolute HTTP URL or the HTTP client cannot be built.
    pub fn new(config: PayrollConfig) -> Result<Self> {
        let base_url = Url::parse(config.base_url.trim()).map_err(|e| {
            DeliveryError::configuration(format!(
                "invalid payroll base URL {:?}: {e}",
                config.base_url
            ))
        })?;
        if base_url.cannot_be_a_base() || !matches!(base_url.scheme(), "http" | "https") {
            return Err(DeliveryError::configuration(format!(
                "payroll base URL must be http(s): {base_url}"
            )));
        }

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| {
                DeliveryError::configuration(format!("failed to build HTTP client: {e}"))
            })?;

        Ok(Self { client, base_url })
    }

    fn employee_url(&self, entity_id: &str) -> Result<Url> {
        if matches!(entity_id.trim(), "" | "." | "..") {
            return Err(DeliveryError::adapter(
                Self::NAME,
                format!("entity id {entity_id:?} cannot address a payroll record"),
            ));
        }
        self.endpoint(&["employees", entity_id])
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| DeliveryError::configuration("payroll base URL cannot carry a path"))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn failure_from(response: reqwest::Response) -> SyncOutcome {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let body: String = body.chars().take(MAX_ERROR_BODY).collect();

        SyncOutcome::failed(format!("payroll responded HTTP {}: {}", status.as_u16(), body.trim()))
    }
}

#[async_trait::async_trait]
impl IntegrationAdapter for PayrollAdapter {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn sync(
        &self,
        entity_id: &str,
        payload: &Value,
        action: EntityAction,
    ) -> Result<SyncOutcome> {
        let url = self.employee_url(entity_id)?;
        let span = info_span!("payroll_sync", entity_id, action = %action);

        async move {
            let request = match action {
                EntityAction::Create | EntityAction::Update => self.client.put(url).json(payload),
                EntityAction::Delete => self.client.delete(url),
            };

            let response = request.send().await.map_err(|e| {
                warn!(error = %e, "payroll request failed");
                DeliveryError::adapter(Self::NAME, e.to_string())
            })?;

            let status = response.status();
            debug!(status = status.as_u16(), "payroll responded");

            if status.is_success() {
                Ok(SyncOutcome::ok(format!("payroll {} {entity_id}", action.as_str().to_lowercase())))
            } else if action == EntityAction::Delete && status == StatusCode::NOT_FOUND {
                Ok(SyncOutcome::ok(format!("payroll has no record of {entity_id}")))
            } else {
                Ok(Self::failure_from(response).await)
            }
        }
        .instrument(span)
        .await
    }

    async fn health_check(&self) -> Result<AdapterHealth> {
        let url = self.endpoint(&["health"])?;

        match self.client.get(url).send().await {
            Ok(response) if response.status().is_success() => {
                Ok(AdapterHealth::healthy("payroll API reachable"))
            },
            Ok(response) => Ok(AdapterHealth::unhealthy(format!(
                "payroll health endpoint returned HTTP {}",
                response.status().as_u16()
            ))),
            Err(e) => Ok(AdapterHealth::unhealthy(format!("payroll API unreachable: {e}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_slash_is_trimmed() {
        let adapter = PayrollAdapter::new(PayrollConfig {
            base_url: "http://payroll.internal/".to_string(),
            ..Default::default()
        })
        .unwrap();

        assert_eq!(
            adapter.employee_url("EMP0042").unwrap().as_str(),
            "http://payroll.internal/employees/EMP0042"
        );
    }

    #[test]
    fn base_path_is_kept() {
        let adapter = PayrollAdapter::new(PayrollConfig {
            base_url: "https://hr.example.com/api/v2".to_string(),
            ..Default::default()
        })
        .unwrap();

        assert_eq!(
            adapter.employee_url("EMP0042").unwrap().as_str(),
            "https://hr.example.com/api/v2/employees/EMP0042"
        );
    }

    #[test]
    fn entity_id_is_one_encoded_segment() {
        let adapter = PayrollAdapter::new(PayrollConfig::default()).unwrap();

        for (entity_id, path) in [
            ("EMP1#x", "/employees/EMP1%23x"),
            ("EMP1?salary=0", "/employees/EMP1%3Fsalary=0"),
            ("EMP1/../EMP2", "/employees/EMP1%2F..%2FEMP2"),
            ("EMP 7%", "/employees/EMP%207%25"),
        ] {
            assert_eq!(adapter.employee_url(entity_id).unwrap().path(), path, "{entity_id}");
        }
        assert!(adapter.employee_url("..").is_err());
    }

    #[test]
    fn invalid_base_url_rejected() {
        for base_url in ["/", "", "payroll.internal", "mailto:hr@example.com"] {
            let result =
                PayrollAdapter::new(PayrollConfig { base_url: base_url.to_string(), ..Default::default() });
            assert!(matches!(result, Err(DeliveryError::Configuration { .. })), "{base_url}");
        }
    }
}
