//! Handler registry keyed by canonical command name.
//!
//! The catalog is the source of truth; the registry must cover exactly the
//! dispatchable set. Handlers are selected by the orchestrator after a
//! Stage-1 match.

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Arc;

use udos_core::error::UdosError;
use udos_core::types::Caller;

use crate::{CommandKind, dispatchable_commands, kind_of};

/// Input handed to a command handler after Stage-1 matching.
#[derive(Debug, Clone)]
pub struct CommandRequest {
    /// Canonical command name (already alias-resolved and uppercased).
    pub command: String,
    /// Remaining tokens after the command.
    pub args: Vec<String>,
    /// Which surface submitted the request.
    pub caller: Caller,
}

/// Output of a command handler.
#[derive(Debug, Clone, Default)]
pub struct CommandOutcome {
    /// Optional structured output attached to the response payload.
    pub output: Option<serde_json::Value>,
}

/// A command handler capability.
pub trait CommandHandler: Send + Sync {
    /// The kind tag this handler operates under.
    fn kind(&self) -> CommandKind;

    /// Execute the command.
    fn handle(&self, req: &CommandRequest) -> Result<CommandOutcome, UdosError>;
}

/// Default handler: acknowledges the dispatch. Concrete subsystem handlers
/// replace these entries when their subsystem registers.
struct AckHandler {
    kind: CommandKind,
}

impl CommandHandler for AckHandler {
    fn kind(&self) -> CommandKind {
        self.kind
    }

    fn handle(&self, _req: &CommandRequest) -> Result<CommandOutcome, UdosError> {
        Ok(CommandOutcome::default())
    }
}

/// `HELP` lists the dispatchable commands.
struct HelpHandler;

impl CommandHandler for HelpHandler {
    fn kind(&self) -> CommandKind {
        CommandKind::ReadOnly
    }

    fn handle(&self, _req: &CommandRequest) -> Result<CommandOutcome, UdosError> {
        Ok(CommandOutcome {
            output: Some(serde_json::json!({
                "commands": dispatchable_commands(),
            })),
        })
    }
}

/// `HEALTH` reports engine liveness.
struct HealthHandler;

impl CommandHandler for HealthHandler {
    fn kind(&self) -> CommandKind {
        CommandKind::ReadOnly
    }

    fn handle(&self, _req: &CommandRequest) -> Result<CommandOutcome, UdosError> {
        Ok(CommandOutcome::default())
    }
}

/// Registry of handlers, immutable after construction.
pub struct HandlerRegistry {
    handlers: BTreeMap<String, Arc<dyn CommandHandler>>,
}

impl HandlerRegistry {
    /// Build the registry covering every dispatchable command.
    #[must_use]
    pub fn builtin() -> Self {
        let mut handlers: BTreeMap<String, Arc<dyn CommandHandler>> = BTreeMap::new();

        for name in dispatchable_commands() {
            let kind = kind_of(name).unwrap_or(CommandKind::Mutating);
            handlers.insert(name.to_string(), Arc::new(AckHandler { kind }));
        }

        handlers.insert("HELP".to_string(), Arc::new(HelpHandler));
        handlers.insert("HEALTH".to_string(), Arc::new(HealthHandler));

        Self { handlers }
    }

    /// Replace the handler for an already-registered command. Returns
    /// `false` (and changes nothing) for names outside the catalog, so the
    /// registry can never drift from the dispatchable set.
    pub fn register_override(
        &mut self,
        command: &str,
        handler: Arc<dyn CommandHandler>,
    ) -> bool {
        let key = command.to_uppercase();
        if self.handlers.contains_key(&key) {
            self.handlers.insert(key, handler);
            true
        } else {
            false
        }
    }

    /// Look up a handler by canonical name.
    #[must_use]
    pub fn get(&self, command: &str) -> Option<&Arc<dyn CommandHandler>> {
        self.handlers.get(&command.to_uppercase())
    }

    /// The registered command names, for catalog-parity enforcement.
    #[must_use]
    pub fn registered_handlers(&self) -> BTreeSet<String> {
        self.handlers.keys().cloned().collect()
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Catalog parity: any divergence between the catalog and the registered
    /// handlers is a build-time failure.
    #[test]
    fn registry_matches_catalog_exactly() {
        let registry = HandlerRegistry::builtin();
        let registered = registry.registered_handlers();
        let dispatchable: BTreeSet<String> = dispatchable_commands()
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(registered, dispatchable);
    }

    #[test]
    fn help_lists_commands() {
        let registry = HandlerRegistry::builtin();
        let handler = registry.get("HELP").unwrap();
        let outcome = handler
            .handle(&CommandRequest {
                command: "HELP".to_string(),
                args: vec![],
                caller: Caller::Interactive,
            })
            .unwrap();
        let output = outcome.output.expect("HELP produces output");
        let commands = output["commands"].as_array().unwrap();
        assert!(commands.iter().any(|c| c == "HEALTH"));
    }

    #[test]
    fn handler_kinds_follow_the_catalog() {
        let registry = HandlerRegistry::builtin();
        for name in dispatchable_commands() {
            let handler = registry.get(name).unwrap();
            assert_eq!(
                handler.kind(),
                kind_of(name).unwrap(),
                "handler kind for {name} diverges from the catalog"
            );
        }
    }

    #[test]
    fn lookup_is_case_insensitive() {
        let registry = HandlerRegistry::builtin();
        assert!(registry.get("health").is_some());
        assert!(registry.get("Health").is_some());
    }

    #[test]
    fn overrides_cannot_extend_the_catalog() {
        let mut registry = HandlerRegistry::builtin();
        let before = registry.registered_handlers();

        assert!(!registry.register_override(
            "NOT_A_COMMAND",
            Arc::new(AckHandler {
                kind: CommandKind::ReadOnly,
            }),
        ));
        assert!(registry.register_override(
            "CONFIG",
            Arc::new(AckHandler {
                kind: CommandKind::ReadOnly,
            }),
        ));

        assert_eq!(registry.registered_handlers(), before);
    }
}
