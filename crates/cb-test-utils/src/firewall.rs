//! Firewall upstream stub.

use async_trait::async_trait;
use cb_service::errors::CbError;
use cb_service::firewall::{FirewallApi, FirewallRule, RuleAction, RuleError, SetRulesResponse};
use std::collections::VecDeque;
use tokio::sync::Mutex;

/// One recorded `set_rules` invocation.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub firewall_id: String,
    pub rules: Vec<FirewallRule>,
}

/// Records every `set_rules` call and replays scripted responses.
///
/// With no scripted response queued, the stub answers with an empty action
/// list, which counts as success.
#[derive(Default)]
pub struct StubFirewallApi {
    calls: Mutex<Vec<RecordedCall>>,
    responses: Mutex<VecDeque<Result<SetRulesResponse, CbError>>>,
}

impl StubFirewallApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the next response, consumed in FIFO order.
    pub async fn push_response(&self, response: Result<SetRulesResponse, CbError>) {
        self.responses.lock().await.push_back(response);
    }

    /// Script one response whose action list carries a rule error.
    pub async fn push_rule_error(&self, code: &str, message: &str) {
        self.push_response(Ok(SetRulesResponse {
            actions: vec![RuleAction {
                error: Some(RuleError {
                    code: code.to_string(),
                    message: message.to_string(),
                }),
            }],
        }))
        .await;
    }

    pub async fn call_count(&self) -> usize {
        self.calls.lock().await.len()
    }

    pub async fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().await.clone()
    }

    /// Rules of the most recent call, if any call was made.
    pub async fn last_rules(&self) -> Option<Vec<FirewallRule>> {
        self.calls.lock().await.last().map(|call| call.rules.clone())
    }
}

#[async_trait]
impl FirewallApi for StubFirewallApi {
    async fn set_rules(
        &self,
        firewall_id: &str,
        rules: &[FirewallRule],
    ) -> Result<SetRulesResponse, CbError> {
        self.calls.lock().await.push(RecordedCall {
            firewall_id: firewall_id.to_string(),
            rules: rules.to_vec(),
        });

        match self.responses.lock().await.pop_front() {
            Some(response) => response,
            None => Ok(SetRulesResponse::default()),
        }
    }
}
