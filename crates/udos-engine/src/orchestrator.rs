//! The three-stage dispatch orchestrator.
//!
//! Fixed order: command match, shell validation, assistant fallback. Each
//! request owns its state; the only shared mutation is the session-log
//! append. Every response carries the contract metadata; under
//! `--dispatch-debug` a route-trace record is attached for every stage
//! entered.

use std::time::Instant;

use chrono::Utc;
use tracing::{debug, info, warn};

use udos_catalog::CommandRequest;
use udos_core::error::{ErrorKind, UdosError};
use udos_core::types::{
    DebugInfo, DispatchTarget, Request, Response, ResponsePayload, RouteTraceRecord,
    StageDecision,
};
use udos_dispatch::{match_input, validate_shell};
use udos_session::{SessionEntry, hash_input};
use udos_vibe::AttemptOutcome;

use crate::Engine;

impl Engine {
    /// Dispatch one request through the three-stage pipeline.
    ///
    /// Never returns `Err`: failures become error envelopes so every
    /// surface renders the same contract.
    pub async fn dispatch(&self, request: &Request) -> Response {
        let started = Instant::now();
        let mut trace: Vec<RouteTraceRecord> = Vec::new();

        let response = self.run_stages(request, &mut trace).await;

        let response = if request.flags.dispatch_debug {
            let mut debug_info = response.debug.clone().unwrap_or_default();
            debug_info.route_trace = trace;
            let mut response = response;
            response.debug = None;
            response.with_debug(debug_info)
        } else {
            response
        };

        self.log_dispatch(request, &response, started.elapsed().as_millis() as u64);
        response
    }

    async fn run_stages(&self, request: &Request, trace: &mut Vec<RouteTraceRecord>) -> Response {
        if request.input.trim().is_empty() {
            return Response::error(
                DispatchTarget::None,
                UdosError::new(ErrorKind::InputInvalid, "empty input").to_body(),
            );
        }

        // Stage 1: command match.
        let stage_started = Instant::now();
        let matched = match_input(&request.input);
        let stage1_elapsed = stage_started.elapsed().as_millis() as u64;

        if let Some(command) = matched.command.clone() {
            trace.push(RouteTraceRecord {
                stage: 1,
                decision: StageDecision::Dispatch,
                reason: matched.reason.clone(),
                confidence: Some(matched.confidence),
                elapsed_ms: stage1_elapsed,
            });
            return self.dispatch_ucode(request, &command, matched.args);
        }

        trace.push(RouteTraceRecord {
            stage: 1,
            decision: StageDecision::Skip,
            reason: matched.reason.clone(),
            confidence: Some(matched.confidence),
            elapsed_ms: stage1_elapsed,
        });

        // Stage 2: shell validation.
        let stage_started = Instant::now();
        let validation = validate_shell(&request.input, self.validator());
        let stage2_elapsed = stage_started.elapsed().as_millis() as u64;

        if validation.safe {
            let payload = validation
                .payload
                .expect("safe validation carries a payload");

            if payload.requires_confirmation && !request.flags.confirm {
                trace.push(RouteTraceRecord {
                    stage: 2,
                    decision: StageDecision::Dispatch,
                    reason: "confirmation_required".to_string(),
                    confidence: None,
                    elapsed_ms: stage2_elapsed,
                });
                info!(command = %payload.command, "Shell dispatch held at confirmation gate");
                return Response::pending(ResponsePayload::Shell {
                    shell: payload,
                    output: None,
                });
            }

            trace.push(RouteTraceRecord {
                stage: 2,
                decision: StageDecision::Dispatch,
                reason: validation.reason.clone(),
                confidence: None,
                elapsed_ms: stage2_elapsed,
            });

            if request.flags.dry_run {
                return Response::skipped(
                    DispatchTarget::Shell,
                    ResponsePayload::Shell {
                        shell: payload,
                        output: None,
                    },
                );
            }

            return self.execute_shell(payload).await;
        }

        trace.push(RouteTraceRecord {
            stage: 2,
            decision: StageDecision::Skip,
            reason: validation.reason.clone(),
            confidence: None,
            elapsed_ms: stage2_elapsed,
        });

        // Stage 3: generative assistant.
        if request.flags.dry_run {
            trace.push(RouteTraceRecord {
                stage: 3,
                decision: StageDecision::Skip,
                reason: "dry_run".to_string(),
                confidence: None,
                elapsed_ms: 0,
            });
            return Response::skipped(DispatchTarget::Vibe, ResponsePayload::Empty {});
        }

        let stage_started = Instant::now();
        let result = self
            .assistant()
            .ask(&request.input, "", &request.cancel)
            .await;
        let stage3_elapsed = stage_started.elapsed().as_millis() as u64;

        match result {
            Ok(answer) => {
                trace.push(RouteTraceRecord {
                    stage: 3,
                    decision: StageDecision::Dispatch,
                    reason: format!("provider_{}", answer.provider_used),
                    confidence: None,
                    elapsed_ms: stage3_elapsed,
                });
                let debug_info = DebugInfo {
                    route_trace: vec![],
                    attempts: attempts_info(&answer.attempts),
                };
                Response::success(
                    DispatchTarget::Vibe,
                    ResponsePayload::Vibe {
                        text: answer.text,
                        provider_used: answer.provider_used,
                    },
                )
                .with_debug(debug_info)
            }
            Err((error, attempts)) => {
                trace.push(RouteTraceRecord {
                    stage: 3,
                    decision: StageDecision::Fail,
                    reason: error.reason.as_str().to_string(),
                    confidence: None,
                    elapsed_ms: stage3_elapsed,
                });
                warn!(reason = %error.reason, "Assistant chain failed");
                let debug_info = DebugInfo {
                    route_trace: vec![],
                    attempts: attempts_info(&attempts),
                };
                Response::error(DispatchTarget::Vibe, error.to_udos_error().to_body())
                    .with_debug(debug_info)
            }
        }
    }

    /// Stage-1 terminal: run the matched command's handler.
    fn dispatch_ucode(&self, request: &Request, command: &str, args: Vec<String>) -> Response {
        if request.flags.dry_run {
            return Response::skipped(
                DispatchTarget::Ucode,
                ResponsePayload::Ucode {
                    command: command.to_string(),
                    args,
                    output: None,
                },
            );
        }

        let Some(handler) = self.registry().get(command) else {
            // Catalog parity makes this unreachable; fail closed anyway.
            return Response::error(
                DispatchTarget::Ucode,
                UdosError::internal(format!("no handler registered for '{command}'")).to_body(),
            );
        };

        let command_request = CommandRequest {
            command: command.to_string(),
            args: args.clone(),
            caller: request.caller,
        };

        match handler.handle(&command_request) {
            Ok(outcome) => Response::success(
                DispatchTarget::Ucode,
                ResponsePayload::Ucode {
                    command: command.to_string(),
                    args,
                    output: outcome.output,
                },
            ),
            Err(error) => Response::error(DispatchTarget::Ucode, error.to_body()),
        }
    }

    /// Stage-2 terminal: run a validated shell command without a shell.
    async fn execute_shell(&self, payload: udos_core::types::ShellPayload) -> Response {
        debug!(command = %payload.command, "Executing validated shell command");

        let output = tokio::process::Command::new(&payload.command)
            .args(&payload.args)
            .output()
            .await;

        match output {
            Ok(output) => {
                if !output.status.success() {
                    debug!(
                        command = %payload.command,
                        code = output.status.code().unwrap_or(-1),
                        "Shell command exited non-zero"
                    );
                }
                let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
                Response::success(
                    DispatchTarget::Shell,
                    ResponsePayload::Shell {
                        shell: payload,
                        output: Some(stdout),
                    },
                )
            }
            Err(e) => Response::error(
                DispatchTarget::Shell,
                UdosError::internal(format!(
                    "failed to execute '{}': {e}",
                    payload.command
                ))
                .to_body(),
            ),
        }
    }

    /// Append the dispatch record; logging failures are reported, never
    /// propagated into the response.
    fn log_dispatch(&self, request: &Request, response: &Response, elapsed_ms: u64) {
        let command = match &response.payload {
            ResponsePayload::Ucode { command, .. } => Some(command.clone()),
            _ => None,
        };
        let failover = response
            .debug
            .as_ref()
            .and_then(|d| d.attempts.iter().rev().find_map(|a| a.failover_reason.clone()))
            .or_else(|| {
                // No attempts recorded (e.g. an empty chain): fall back to
                // the provider error code on the envelope.
                response.error.as_ref().and_then(|e| {
                    e.code
                        .strip_prefix("provider_")
                        .map(str::to_string)
                        .or_else(|| (e.code == "cancelled").then(|| e.code.clone()))
                })
            });
        // Provider error text was scrubbed before it reached the envelope;
        // record which redaction classes fired.
        let redactions = response
            .error
            .as_ref()
            .map(|e| udos_core::redact::redaction_markers(&e.message))
            .unwrap_or_default();

        let entry = SessionEntry {
            timestamp_utc: Utc::now(),
            caller: request.caller,
            input_hash: hash_input(&request.input),
            route: response.dispatch_to,
            status: response.status,
            elapsed_ms,
            failover,
            redactions,
            command,
            input: request.flags.record_input.then(|| request.input.clone()),
        };

        if let Err(e) = self.session().record(&entry) {
            warn!(error = %e, "Failed to append session-log entry");
        }
    }
}

fn attempts_info(attempts: &[AttemptOutcome]) -> Vec<udos_core::types::AttemptInfo> {
    attempts
        .iter()
        .map(|a| udos_core::types::AttemptInfo {
            provider: a.provider.clone(),
            ok: a.ok,
            failover_reason: a.failover_reason.map(|r| r.as_str().to_string()),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use crate::testing::engine_in_dir;
    use udos_core::types::{
        Caller, DispatchTarget, Request, RequestFlags, ResponsePayload, ResponseStatus,
        StageDecision,
    };

    fn request(input: &str) -> Request {
        Request::new(input, Caller::Interactive)
    }

    fn debug_request(input: &str) -> Request {
        request(input).with_flags(RequestFlags {
            dispatch_debug: true,
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn canonical_command_dispatches_to_ucode() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine_in_dir(dir.path(), None);

        let response = engine.dispatch(&request("HEALTH")).await;
        assert_eq!(response.status, ResponseStatus::Success);
        assert_eq!(response.dispatch_to, DispatchTarget::Ucode);
        assert_eq!(response.contract.version, "m1.1");
        match &response.payload {
            ResponsePayload::Ucode { command, args, .. } => {
                assert_eq!(command, "HEALTH");
                assert!(args.is_empty());
            }
            other => panic!("expected ucode payload, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn alias_dispatches_to_canonical_target() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine_in_dir(dir.path(), None);

        let response = engine.dispatch(&request("RESTART")).await;
        assert_eq!(response.dispatch_to, DispatchTarget::Ucode);
        match &response.payload {
            ResponsePayload::Ucode { command, .. } => assert_eq!(command, "REBOOT"),
            other => panic!("expected ucode payload, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn read_only_shell_executes_without_confirmation() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine_in_dir(dir.path(), None);

        let response = engine.dispatch(&request("pwd")).await;
        assert_eq!(response.status, ResponseStatus::Success);
        assert_eq!(response.dispatch_to, DispatchTarget::Shell);
        match &response.payload {
            ResponsePayload::Shell { shell, output } => {
                assert!(!shell.requires_confirmation);
                assert!(output.as_ref().is_some_and(|o| !o.is_empty()));
            }
            other => panic!("expected shell payload, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn mutating_shell_is_held_at_the_gate() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine_in_dir(dir.path(), None);

        let response = engine.dispatch(&request("mv a b")).await;
        assert_eq!(response.status, ResponseStatus::Pending);
        assert_eq!(response.dispatch_to, DispatchTarget::Confirm);
        match &response.payload {
            ResponsePayload::Shell { shell, output } => {
                assert!(shell.requires_confirmation);
                assert!(output.is_none());
            }
            other => panic!("expected shell payload, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn confirmed_mutating_shell_executes() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine_in_dir(dir.path(), None);

        // mkdir inside the temp dir so execution succeeds and is contained.
        let target = dir.path().join("made-by-test");
        let input = format!("mkdir {}", target.display());
        let confirmed = request(&input).with_flags(RequestFlags {
            confirm: true,
            ..Default::default()
        });

        let response = engine.dispatch(&confirmed).await;
        assert_eq!(response.status, ResponseStatus::Success);
        assert_eq!(response.dispatch_to, DispatchTarget::Shell);
        assert!(target.is_dir());
    }

    #[tokio::test]
    async fn unmatched_input_falls_through_to_vibe() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine_in_dir(dir.path(), None);

        // Empty provider chain: stage 3 reports missing auth.
        let response = engine.dispatch(&request("summarize my day please")).await;
        assert_eq!(response.status, ResponseStatus::Error);
        assert_eq!(response.dispatch_to, DispatchTarget::Vibe);
        let error = response.error.expect("error body");
        assert_eq!(error.code, "provider_missing_auth");
    }

    #[tokio::test]
    async fn blocked_shell_input_reaches_vibe() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine_in_dir(dir.path(), None);

        let response = engine
            .dispatch(&debug_request("cat file; rm important"))
            .await;
        assert_eq!(response.status, ResponseStatus::Error);
        assert_eq!(response.dispatch_to, DispatchTarget::Vibe);

        let debug = response.debug.expect("debug block");
        let stage2 = debug
            .route_trace
            .iter()
            .find(|r| r.stage == 2)
            .expect("stage 2 trace");
        assert_eq!(stage2.decision, StageDecision::Skip);
        assert_eq!(stage2.reason, "metachar_chain");
    }

    #[tokio::test]
    async fn route_trace_is_attached_only_under_debug() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine_in_dir(dir.path(), None);

        let plain = engine.dispatch(&request("HEALTH")).await;
        assert!(plain.debug.is_none());

        let debugged = engine.dispatch(&debug_request("HEALTH")).await;
        let debug = debugged.debug.expect("debug block");
        assert_eq!(debug.route_trace.len(), 1);
        assert_eq!(debug.route_trace[0].stage, 1);
        assert_eq!(debug.route_trace[0].decision, StageDecision::Dispatch);
    }

    #[tokio::test]
    async fn trace_stages_are_non_decreasing() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine_in_dir(dir.path(), None);

        let response = engine
            .dispatch(&debug_request("definitely not a command"))
            .await;
        let debug = response.debug.expect("debug block");
        let stages: Vec<u8> = debug.route_trace.iter().map(|r| r.stage).collect();
        assert_eq!(stages, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn dry_run_resolves_route_without_executing() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine_in_dir(dir.path(), None);

        let dry = request("pwd").with_flags(RequestFlags {
            dry_run: true,
            ..Default::default()
        });
        let response = engine.dispatch(&dry).await;
        assert_eq!(response.status, ResponseStatus::Skipped);
        assert_eq!(response.dispatch_to, DispatchTarget::Shell);
        match &response.payload {
            ResponsePayload::Shell { output, .. } => assert!(output.is_none()),
            other => panic!("expected shell payload, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_input_is_rejected_before_stage_one() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine_in_dir(dir.path(), None);

        let response = engine.dispatch(&request("   ")).await;
        assert_eq!(response.status, ResponseStatus::Error);
        assert_eq!(response.dispatch_to, DispatchTarget::None);
        assert_eq!(response.error.unwrap().code, "input_invalid");
    }

    #[tokio::test]
    async fn dispatches_are_recorded_in_the_session_log() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine_in_dir(dir.path(), None);

        engine.dispatch(&request("HEALTH")).await;
        engine.dispatch(&request("pwd")).await;

        let summary = engine.session_summary().unwrap();
        assert_eq!(summary.total, 2);
        assert_eq!(summary.per_route.get("ucode"), Some(&1));
        assert_eq!(summary.per_route.get("shell"), Some(&1));
        assert_eq!(summary.per_command.get("HEALTH"), Some(&1));
    }

    #[tokio::test]
    async fn session_entries_carry_redaction_markers_only_when_scrubbing_fired() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine_in_dir(dir.path(), None);

        // A missing-auth failure carries no secret-bearing text, so no
        // markers are recorded and the field is elided from the line.
        let response = engine.dispatch(&request("summarize my day please")).await;
        assert_eq!(response.status, ResponseStatus::Error);

        let log_path = dir.path().join("session.log.jsonl");
        let content = std::fs::read_to_string(log_path).unwrap();
        let line: serde_json::Value =
            serde_json::from_str(content.lines().next().unwrap()).unwrap();
        assert!(line.get("redactions").is_none());
        assert_eq!(line["failover"], "missing_auth");
    }

    #[tokio::test]
    async fn raw_input_stays_out_of_the_log_by_default() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine_in_dir(dir.path(), None);

        engine.dispatch(&request("HEALTH top secret args")).await;

        let log_path = dir.path().join("session.log.jsonl");
        let content = std::fs::read_to_string(log_path).unwrap();
        assert!(!content.contains("top secret"));
    }
}
