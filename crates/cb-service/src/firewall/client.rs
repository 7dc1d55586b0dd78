//! HTTP client for the firewall upstream API.

use crate::errors::CbError;
use crate::firewall::{FirewallApi, FirewallRule, SetRulesRequest, SetRulesResponse};
use async_trait::async_trait;
use std::time::Duration;
use tracing::{instrument, warn};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Firewall client talking JSON over HTTPS with a bearer token.
pub struct HttpFirewallClient {
    http: reqwest::Client,
    base_url: String,
    api_token: String,
}

impl HttpFirewallClient {
    /// Create a client for the given API base URL.
    ///
    /// # Errors
    ///
    /// Returns `CbError::Config` if the underlying HTTP client cannot be
    /// constructed.
    pub fn new(base_url: &str, api_token: &str) -> Result<Self, CbError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| CbError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_token: api_token.to_string(),
        })
    }
}

#[async_trait]
impl FirewallApi for HttpFirewallClient {
    #[instrument(skip_all, fields(firewall_id = %firewall_id, rule_count = rules.len()))]
    async fn set_rules(
        &self,
        firewall_id: &str,
        rules: &[FirewallRule],
    ) -> Result<SetRulesResponse, CbError> {
        let url = format!(
            "{}/firewalls/{}/actions/set_rules",
            self.base_url, firewall_id
        );

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_token)
            .json(&SetRulesRequest {
                rules: rules.to_vec(),
            })
            .send()
            .await
            .map_err(|e| CbError::Upstream(format!("set_rules request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(
                target: "cb.firewall.client",
                status = %status,
                body = %body,
                "Firewall upstream rejected set_rules"
            );
            return Err(CbError::Upstream(format!(
                "set_rules returned HTTP {status}"
            )));
        }

        response
            .json::<SetRulesResponse>()
            .await
            .map_err(|e| CbError::Upstream(format!("invalid set_rules response: {e}")))
    }
}
