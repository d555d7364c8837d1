//! The engine: owns the process-wide singletons and exposes the stable
//! surface the three frontends consume.
//!
//! Callers hold one [`Engine`] constructed at startup. The catalog, the
//! resolved provider chain, and the contract manager are read-mostly; a
//! reload constructs a fresh engine and swaps the whole value.

mod handlers;
mod orchestrator;
mod workspace;

use camino::Utf8PathBuf;
use tracing::warn;

use udos_catalog::HandlerRegistry;
use udos_config::WizardConfig;
use udos_contract::{ContractManager, ContractStatus, RepairOutcome};
use udos_core::error::UdosError;
use udos_dispatch::ShellValidatorConfig;
use udos_doctor::{HealReport, SelfHeal};
use udos_loopback::LoopbackClient;
use udos_session::{SessionLog, SessionSummary};
use udos_vibe::{AssistantClient, resolve_chain};

pub use udos_core::types::{Request, Response};

/// The dispatch engine.
pub struct Engine {
    config: WizardConfig,
    registry: HandlerRegistry,
    validator: ShellValidatorConfig,
    assistant: AssistantClient,
    contract: ContractManager,
    session: SessionLog,
    loopback: LoopbackClient,
}

/// Builder with injection points for paths and collaborators; production
/// callers use [`Engine::from_default_paths`].
#[derive(Default)]
pub struct EngineBuilder {
    config: Option<WizardConfig>,
    contract: Option<ContractManager>,
    session: Option<SessionLog>,
    assistant: Option<AssistantClient>,
}

impl EngineBuilder {
    #[must_use]
    pub fn config(mut self, config: WizardConfig) -> Self {
        self.config = Some(config);
        self
    }

    #[must_use]
    pub fn contract(mut self, contract: ContractManager) -> Self {
        self.contract = Some(contract);
        self
    }

    #[must_use]
    pub fn session(mut self, session: SessionLog) -> Self {
        self.session = Some(session);
        self
    }

    #[must_use]
    pub fn assistant(mut self, assistant: AssistantClient) -> Self {
        self.assistant = Some(assistant);
        self
    }

    /// Construct the engine. Evaluates the admin-secret contract once and
    /// logs a warning on drift; drift never blocks startup.
    pub fn build(self) -> Result<Engine, UdosError> {
        let config = match self.config {
            Some(config) => config,
            None => WizardConfig::load(&udos_core::paths::wizard_config_path())
                .map_err(|e| UdosError::internal(e.to_string()))?,
        };

        let assistant = match self.assistant {
            Some(assistant) => assistant,
            None => AssistantClient::new(resolve_chain(|key| std::env::var(key).ok()))?,
        };

        let loopback = LoopbackClient::with_allowed_remotes(assistant.endpoint_hosts())
            .map_err(|e| UdosError::internal(e.to_string()))?;

        let contract = self.contract.unwrap_or_else(ContractManager::from_default_paths);
        let session = self.session.unwrap_or_else(SessionLog::from_default_paths);

        let validator = ShellValidatorConfig {
            allowlist: config.shell_allowlist.clone(),
            require_on_path: false,
        };

        match contract.status() {
            Ok(status) if !status.ok => {
                warn!(
                    drift = ?status.drift,
                    "Admin-secret contract drift detected at startup"
                );
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "Admin-secret contract check failed at startup"),
        }

        let workspace_dir = config
            .workspace_dir
            .clone()
            .map(Utf8PathBuf::from)
            .unwrap_or_else(|| udos_core::paths::state_dir().join("workspace"));

        let mut registry = HandlerRegistry::builtin();
        handlers::wire_handlers(&mut registry, &config, &contract, &session);
        workspace::wire_workspace_handlers(&mut registry, &workspace_dir);

        Ok(Engine {
            config,
            registry,
            validator,
            assistant,
            contract,
            session,
            loopback,
        })
    }
}

impl Engine {
    /// Builder with injection points, used by the surfaces' tests.
    #[must_use]
    pub fn builder() -> EngineBuilder {
        EngineBuilder::default()
    }

    /// Production construction from the platform config/state layout.
    pub fn from_default_paths() -> Result<Self, UdosError> {
        EngineBuilder::default().build()
    }

    /// The active server configuration.
    #[must_use]
    pub fn config(&self) -> &WizardConfig {
        &self.config
    }

    /// Admin-secret contract status.
    pub fn contract_status(&self) -> Result<ContractStatus, UdosError> {
        self.contract.status()
    }

    /// Run contract repair.
    pub fn repair_contract(&self) -> Result<RepairOutcome, UdosError> {
        self.contract.repair()
    }

    /// Run the local-readiness probe.
    pub async fn self_heal(&self) -> HealReport {
        SelfHeal::new(self.loopback.clone(), self.config.clone())
            .check()
            .await
    }

    /// Execute a probe report's repairable actions (model pulls).
    pub async fn self_heal_repair(&self, report: &HealReport) -> Vec<udos_doctor::Issue> {
        SelfHeal::new(self.loopback.clone(), self.config.clone())
            .repair(report)
            .await
    }

    /// The admin token from the env file, if present. Used by the wizard
    /// server to authenticate admin endpoints.
    pub fn admin_token(&self) -> Result<Option<String>, UdosError> {
        self.contract.admin_token()
    }

    /// Aggregate session-log counters.
    pub fn session_summary(&self) -> Result<SessionSummary, UdosError> {
        self.session
            .summary()
            .map_err(|e| UdosError::internal(e.to_string()))
    }

    pub(crate) fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    pub(crate) fn validator(&self) -> &ShellValidatorConfig {
        &self.validator
    }

    pub(crate) fn assistant(&self) -> &AssistantClient {
        &self.assistant
    }

    pub(crate) fn session(&self) -> &SessionLog {
        &self.session
    }
}

/// Test-support constructors keeping every artifact inside a temp directory.
pub mod testing {
    use super::*;

    /// An engine wired to the given directory, with an empty provider
    /// chain unless one is supplied.
    pub fn engine_in_dir(
        dir: &std::path::Path,
        assistant: Option<AssistantClient>,
    ) -> Engine {
        let root = Utf8PathBuf::from_path_buf(dir.to_path_buf()).unwrap();
        let contract = ContractManager::new(
            root.join("env"),
            root.join("wizard.json"),
            root.join("secrets.tomb"),
        );
        let session = SessionLog::new(root.join("session.log.jsonl"));
        let assistant = assistant.unwrap_or_else(|| {
            AssistantClient::new(vec![]).expect("assistant client for tests")
        });

        let mut config = WizardConfig::default();
        config.workspace_dir = Some(root.join("workspace").to_string());

        Engine::builder()
            .config(config)
            .contract(contract)
            .session(session)
            .assistant(assistant)
            .build()
            .expect("test engine builds")
    }
}
