//! Engine-backed command handlers.
//!
//! The catalog registry starts with acknowledge-only handlers; the engine
//! overrides the commands that have a real subsystem behind them. Overrides
//! can only replace existing entries, so catalog parity survives wiring.

use std::sync::Arc;

use udos_catalog::{CommandHandler, CommandKind, CommandOutcome, CommandRequest, HandlerRegistry};
use udos_config::WizardConfig;
use udos_contract::ContractManager;
use udos_core::error::UdosError;
use udos_session::SessionLog;

/// `HEALTH`: engine liveness plus contract posture.
struct HealthHandler {
    contract: ContractManager,
}

impl CommandHandler for HealthHandler {
    fn kind(&self) -> CommandKind {
        CommandKind::ReadOnly
    }

    fn handle(&self, _req: &CommandRequest) -> Result<CommandOutcome, UdosError> {
        let status = self.contract.status()?;
        Ok(CommandOutcome {
            output: Some(serde_json::json!({
                "engine": "ok",
                "contract_ok": status.ok,
                "drift_count": status.drift.len(),
            })),
        })
    }
}

/// `CONFIG`: the active server configuration. It holds no secret values.
struct ConfigHandler {
    config: WizardConfig,
}

impl CommandHandler for ConfigHandler {
    fn kind(&self) -> CommandKind {
        CommandKind::ReadOnly
    }

    fn handle(&self, _req: &CommandRequest) -> Result<CommandOutcome, UdosError> {
        let value = serde_json::to_value(&self.config)
            .map_err(|e| UdosError::internal(e.to_string()))?;
        Ok(CommandOutcome {
            output: Some(value),
        })
    }
}

/// `LOGS`: local session-log counters.
struct LogsHandler {
    session: SessionLog,
}

impl CommandHandler for LogsHandler {
    fn kind(&self) -> CommandKind {
        CommandKind::ReadOnly
    }

    fn handle(&self, _req: &CommandRequest) -> Result<CommandOutcome, UdosError> {
        let summary = self
            .session
            .summary()
            .map_err(|e| UdosError::internal(e.to_string()))?;
        let value =
            serde_json::to_value(&summary).map_err(|e| UdosError::internal(e.to_string()))?;
        Ok(CommandOutcome {
            output: Some(value),
        })
    }
}

/// `VERIFY`: the admin-secret contract status in full.
struct VerifyHandler {
    contract: ContractManager,
}

impl CommandHandler for VerifyHandler {
    fn kind(&self) -> CommandKind {
        CommandKind::ReadOnly
    }

    fn handle(&self, _req: &CommandRequest) -> Result<CommandOutcome, UdosError> {
        let status = self.contract.status()?;
        let value =
            serde_json::to_value(&status).map_err(|e| UdosError::internal(e.to_string()))?;
        Ok(CommandOutcome {
            output: Some(value),
        })
    }
}

/// `REPAIR`: run contract repair and report what was performed.
struct RepairHandler {
    contract: ContractManager,
}

impl CommandHandler for RepairHandler {
    fn kind(&self) -> CommandKind {
        CommandKind::Mutating
    }

    fn handle(&self, _req: &CommandRequest) -> Result<CommandOutcome, UdosError> {
        let outcome = self.contract.repair()?;
        let value =
            serde_json::to_value(&outcome).map_err(|e| UdosError::internal(e.to_string()))?;
        Ok(CommandOutcome {
            output: Some(value),
        })
    }
}

/// `TOKEN`: admin-token posture. Reports presence only, never the value.
struct TokenHandler {
    contract: ContractManager,
    key_id: String,
}

impl CommandHandler for TokenHandler {
    fn kind(&self) -> CommandKind {
        CommandKind::ReadOnly
    }

    fn handle(&self, _req: &CommandRequest) -> Result<CommandOutcome, UdosError> {
        let present = self.contract.admin_token()?.is_some();
        Ok(CommandOutcome {
            output: Some(serde_json::json!({
                "key_id": self.key_id,
                "env_token_present": present,
            })),
        })
    }
}

/// `UID`: a fresh opaque identifier.
struct UidHandler;

impl CommandHandler for UidHandler {
    fn kind(&self) -> CommandKind {
        CommandKind::ReadOnly
    }

    fn handle(&self, _req: &CommandRequest) -> Result<CommandOutcome, UdosError> {
        let bytes = udos_contract::random_bytes(16);
        let uid: String = bytes.iter().map(|b| format!("{b:02x}")).collect();
        Ok(CommandOutcome {
            output: Some(serde_json::json!({ "uid": uid })),
        })
    }
}

/// `WIZARD`: where the wizard server lives and whether the contract holds.
struct WizardHandler {
    config: WizardConfig,
    contract: ContractManager,
}

impl CommandHandler for WizardHandler {
    fn kind(&self) -> CommandKind {
        CommandKind::ReadOnly
    }

    fn handle(&self, _req: &CommandRequest) -> Result<CommandOutcome, UdosError> {
        let status = self.contract.status()?;
        Ok(CommandOutcome {
            output: Some(serde_json::json!({
                "bind": self.config.bind,
                "contract_ok": status.ok,
            })),
        })
    }
}

/// Override the acknowledge-only entries that have a real subsystem.
pub(crate) fn wire_handlers(
    registry: &mut HandlerRegistry,
    config: &WizardConfig,
    contract: &ContractManager,
    session: &SessionLog,
) {
    registry.register_override(
        "HEALTH",
        Arc::new(HealthHandler {
            contract: contract.clone(),
        }),
    );
    registry.register_override(
        "CONFIG",
        Arc::new(ConfigHandler {
            config: config.clone(),
        }),
    );
    registry.register_override(
        "LOGS",
        Arc::new(LogsHandler {
            session: session.clone(),
        }),
    );
    registry.register_override(
        "VERIFY",
        Arc::new(VerifyHandler {
            contract: contract.clone(),
        }),
    );
    registry.register_override(
        "REPAIR",
        Arc::new(RepairHandler {
            contract: contract.clone(),
        }),
    );
    registry.register_override(
        "TOKEN",
        Arc::new(TokenHandler {
            contract: contract.clone(),
            key_id: config.admin_api_key_id.clone(),
        }),
    );
    registry.register_override("UID", Arc::new(UidHandler));
    registry.register_override(
        "WIZARD",
        Arc::new(WizardHandler {
            config: config.clone(),
            contract: contract.clone(),
        }),
    );
}

#[cfg(test)]
mod tests {
    use crate::testing::engine_in_dir;
    use udos_core::types::{Caller, Request, ResponsePayload, ResponseStatus};

    #[tokio::test]
    async fn verify_reports_contract_drift_through_dispatch() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine_in_dir(dir.path(), None);

        let response = engine
            .dispatch(&Request::new("VERIFY", Caller::Interactive))
            .await;
        assert_eq!(response.status, ResponseStatus::Success);
        match &response.payload {
            ResponsePayload::Ucode { output, .. } => {
                let output = output.as_ref().expect("VERIFY produces output");
                assert_eq!(output["ok"], false);
            }
            other => panic!("expected ucode payload, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn repair_command_heals_the_contract() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine_in_dir(dir.path(), None);

        let response = engine
            .dispatch(&Request::new("REPAIR", Caller::Interactive))
            .await;
        assert_eq!(response.status, ResponseStatus::Success);

        let status = engine.contract_status().unwrap();
        assert!(status.ok);
    }

    #[tokio::test]
    async fn logs_command_reports_counters() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine_in_dir(dir.path(), None);

        engine
            .dispatch(&Request::new("HEALTH", Caller::Interactive))
            .await;
        let response = engine
            .dispatch(&Request::new("LOGS", Caller::Interactive))
            .await;

        match &response.payload {
            ResponsePayload::Ucode { output, .. } => {
                let output = output.as_ref().expect("LOGS produces output");
                assert_eq!(output["total"], 1);
                assert_eq!(output["per_command"]["HEALTH"], 1);
            }
            other => panic!("expected ucode payload, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn uid_command_generates_distinct_identifiers() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine_in_dir(dir.path(), None);

        let mut uids = std::collections::BTreeSet::new();
        for _ in 0..3 {
            let response = engine
                .dispatch(&Request::new("UID", Caller::Interactive))
                .await;
            match &response.payload {
                ResponsePayload::Ucode { output, .. } => {
                    let uid = output.as_ref().unwrap()["uid"].as_str().unwrap().to_string();
                    assert_eq!(uid.len(), 32);
                    uids.insert(uid);
                }
                other => panic!("expected ucode payload, got {other:?}"),
            }
        }
        assert_eq!(uids.len(), 3);
    }

    #[tokio::test]
    async fn token_command_never_exposes_the_token_value() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine_in_dir(dir.path(), None);
        engine.repair_contract().unwrap();

        let token = engine.admin_token().unwrap().expect("token after repair");
        let response = engine
            .dispatch(&Request::new("TOKEN", Caller::Interactive))
            .await;
        let json = serde_json::to_string(&response).unwrap();
        assert!(!json.contains(&token), "TOKEN output must not leak the value");
        match &response.payload {
            ResponsePayload::Ucode { output, .. } => {
                assert_eq!(output.as_ref().unwrap()["env_token_present"], true);
            }
            other => panic!("expected ucode payload, got {other:?}"),
        }
    }
}
