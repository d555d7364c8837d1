//! Periodic local-readiness checks.
//!
//! The probe verifies that the local model service answers on its loopback
//! endpoint, that the configured default model is present, and that the
//! tier-derived required models are installed. Missing models are
//! repairable issues carrying a `pull_<name>` action. Non-loopback
//! endpoints never reach the wire; the boundary check surfaces them as
//! `endpoint_blocked`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

use udos_config::WizardConfig;
use udos_loopback::{HttpError, LoopbackClient};

/// Outcome of one check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Pass,
    Warn,
    Fail,
}

/// One readiness issue (or passing check).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Issue {
    pub name: String,
    pub status: CheckStatus,
    pub details: String,
    /// Present on repairable issues, e.g. `pull_llama3.2`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
}

/// Full probe output. Checks are name-sorted for stable emission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealReport {
    pub emitted_at: DateTime<Utc>,
    pub ok: bool,
    pub issues: Vec<Issue>,
    pub repairable: Vec<Issue>,
}

/// The self-heal probe.
pub struct SelfHeal {
    client: LoopbackClient,
    config: WizardConfig,
}

impl SelfHeal {
    #[must_use]
    pub fn new(client: LoopbackClient, config: WizardConfig) -> Self {
        Self { client, config }
    }

    /// Run all checks.
    pub async fn check(&self) -> HealReport {
        let mut checks = Vec::new();

        let listed_models = match self.check_service_reachable(&mut checks).await {
            Some(models) => models,
            None => {
                // Service unreachable or blocked; model checks cannot run.
                return Self::finish(checks);
            }
        };

        self.check_default_model(&listed_models, &mut checks);
        self.check_tier_models(&listed_models, &mut checks);

        Self::finish(checks)
    }

    /// Execute the repairable actions of a report. Each `pull_<name>`
    /// action asks the local model service to pull the missing model; the
    /// outcome of every action is returned as its own issue record.
    pub async fn repair(&self, report: &HealReport) -> Vec<Issue> {
        let mut outcomes = Vec::new();
        let url = format!(
            "{}/api/pull",
            self.config.model_endpoint.trim_end_matches('/')
        );

        for issue in &report.repairable {
            let Some(model) = issue.action.as_deref().and_then(|a| a.strip_prefix("pull_"))
            else {
                continue;
            };

            let body = serde_json::json!({ "name": model });
            let result = self
                .client
                .http_post(
                    &url,
                    &body,
                    &HashMap::new(),
                    Some(std::time::Duration::from_secs(30)),
                )
                .await;

            match result {
                Ok(_) => {
                    debug!(model = %model, "Model pull requested");
                    outcomes.push(Issue {
                        name: format!("pull_{model}"),
                        status: CheckStatus::Pass,
                        details: format!("model '{model}' pull requested"),
                        action: None,
                    });
                }
                Err(e) => outcomes.push(Issue {
                    name: format!("pull_{model}"),
                    status: CheckStatus::Fail,
                    details: format!("model '{model}' pull failed: {e}"),
                    action: issue.action.clone(),
                }),
            }
        }

        outcomes
    }

    fn finish(mut checks: Vec<Issue>) -> HealReport {
        checks.sort_by(|a, b| a.name.cmp(&b.name));
        let ok = checks.iter().all(|c| c.status == CheckStatus::Pass);
        let repairable = checks
            .iter()
            .filter(|c| c.action.is_some())
            .cloned()
            .collect();
        HealReport {
            emitted_at: Utc::now(),
            ok,
            issues: checks,
            repairable,
        }
    }

    /// Reachability of the local model service. Returns the listed model
    /// names on success.
    async fn check_service_reachable(&self, checks: &mut Vec<Issue>) -> Option<Vec<String>> {
        let url = format!(
            "{}/api/tags",
            self.config.model_endpoint.trim_end_matches('/')
        );

        match self.client.http_get(&url, &HashMap::new(), None).await {
            Ok(response) => {
                let models: Vec<String> = response
                    .parsed_json
                    .as_ref()
                    .and_then(|json| json.get("models"))
                    .and_then(|models| models.as_array())
                    .map(|models| {
                        models
                            .iter()
                            .filter_map(|m| m.get("name"))
                            .filter_map(|n| n.as_str())
                            .map(str::to_string)
                            .collect()
                    })
                    .unwrap_or_default();

                debug!(count = models.len(), "Model service listed models");
                checks.push(Issue {
                    name: "model_service_reachable".to_string(),
                    status: CheckStatus::Pass,
                    details: format!("{} models listed", models.len()),
                    action: None,
                });
                Some(models)
            }
            Err(HttpError::NonLoopback { host }) => {
                // With mode boundaries relaxed the block is advisory; the
                // outbound primitive still refuses the host either way.
                let status = if udos_config::mode_boundaries_enforced() {
                    CheckStatus::Fail
                } else {
                    CheckStatus::Warn
                };
                checks.push(Issue {
                    name: "endpoint_blocked".to_string(),
                    status,
                    details: format!("model endpoint host '{host}' is not loopback"),
                    action: None,
                });
                None
            }
            Err(e) => {
                checks.push(Issue {
                    name: "model_service_reachable".to_string(),
                    status: CheckStatus::Fail,
                    details: format!("model service not reachable: {e}"),
                    action: None,
                });
                None
            }
        }
    }

    /// The configured default model must appear in the service listing.
    fn check_default_model(&self, listed: &[String], checks: &mut Vec<Issue>) {
        let default = &self.config.default_model;
        if model_present(listed, default) {
            checks.push(Issue {
                name: "default_model_present".to_string(),
                status: CheckStatus::Pass,
                details: format!("default model '{default}' is installed"),
                action: None,
            });
        } else {
            checks.push(Issue {
                name: "default_model_present".to_string(),
                status: CheckStatus::Fail,
                details: format!("default model '{default}' is not installed"),
                action: Some(format!("pull_{default}")),
            });
        }
    }

    /// Every tier-required model must be present; each missing one is a
    /// separately repairable issue.
    fn check_tier_models(&self, listed: &[String], checks: &mut Vec<Issue>) {
        for required in self.config.model_tier.required_models() {
            let name = format!("tier_model_{required}");
            if model_present(listed, required) {
                checks.push(Issue {
                    name,
                    status: CheckStatus::Pass,
                    details: format!("required model '{required}' is installed"),
                    action: None,
                });
            } else {
                checks.push(Issue {
                    name,
                    status: CheckStatus::Warn,
                    details: format!("required model '{required}' is missing"),
                    action: Some(format!("pull_{required}")),
                });
            }
        }
    }
}

/// Listed names may carry a tag suffix (`llama3.2:latest`); a requirement
/// matches with or without it.
fn model_present(listed: &[String], required: &str) -> bool {
    listed.iter().any(|name| {
        name == required || name.strip_suffix(":latest") == Some(required) || {
            // A required name with an explicit tag must match exactly.
            !required.contains(':') && name.split(':').next() == Some(required)
        }
    })
}
