//! Workspace-backed file commands.
//!
//! `FILE`, `FILE NEW`, `FILE EDIT`, `READ`, and `FIND` operate on a single
//! workspace directory. Paths are sandboxed: absolute paths and parent
//! escapes are rejected before any filesystem access.

use std::fs;
use std::sync::Arc;

use camino::Utf8PathBuf;

use udos_catalog::{CommandHandler, CommandKind, CommandOutcome, CommandRequest, HandlerRegistry};
use udos_core::error::{ErrorKind, UdosError};

/// Upper bound on bytes returned by `READ`.
const READ_CAP_BYTES: usize = 64 * 1024;

/// Resolve a workspace-relative name, refusing traversal.
fn resolve(workspace: &Utf8PathBuf, name: &str) -> Result<Utf8PathBuf, UdosError> {
    if name.is_empty() {
        return Err(UdosError::new(ErrorKind::InputInvalid, "missing file name"));
    }
    if name.starts_with('/') || name.starts_with('\\') {
        return Err(UdosError::new(
            ErrorKind::InputInvalid,
            format!("absolute paths are not allowed: {name}"),
        ));
    }
    let candidate = Utf8PathBuf::from(name);
    if candidate
        .components()
        .any(|c| matches!(c, camino::Utf8Component::ParentDir))
    {
        return Err(UdosError::new(
            ErrorKind::InputInvalid,
            format!("parent-directory escapes are not allowed: {name}"),
        ));
    }
    Ok(workspace.join(candidate))
}

fn ensure_workspace(workspace: &Utf8PathBuf) -> Result<(), UdosError> {
    fs::create_dir_all(workspace.as_std_path())
        .map_err(|e| UdosError::internal(format!("cannot create workspace: {e}")))
}

/// `FILE`: list workspace entries.
struct FileListHandler {
    workspace: Utf8PathBuf,
}

impl CommandHandler for FileListHandler {
    fn kind(&self) -> CommandKind {
        CommandKind::Mutating
    }

    fn handle(&self, _req: &CommandRequest) -> Result<CommandOutcome, UdosError> {
        ensure_workspace(&self.workspace)?;
        let mut files = Vec::new();
        let entries = fs::read_dir(self.workspace.as_std_path())
            .map_err(|e| UdosError::internal(format!("cannot read workspace: {e}")))?;
        for entry in entries.flatten() {
            if let Ok(name) = entry.file_name().into_string() {
                files.push(name);
            }
        }
        files.sort();
        Ok(CommandOutcome {
            output: Some(serde_json::json!({ "files": files })),
        })
    }
}

/// `FILE NEW <name>`: create an empty file; refuses to clobber.
struct FileNewHandler {
    workspace: Utf8PathBuf,
}

impl CommandHandler for FileNewHandler {
    fn kind(&self) -> CommandKind {
        CommandKind::Mutating
    }

    fn handle(&self, req: &CommandRequest) -> Result<CommandOutcome, UdosError> {
        let name = req.args.first().map(String::as_str).unwrap_or_default();
        let path = resolve(&self.workspace, name)?;
        ensure_workspace(&self.workspace)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent.as_std_path())
                .map_err(|e| UdosError::internal(e.to_string()))?;
        }
        fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path.as_std_path())
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::AlreadyExists => UdosError::new(
                    ErrorKind::InputInvalid,
                    format!("file already exists: {name}"),
                ),
                _ => UdosError::internal(e.to_string()),
            })?;
        Ok(CommandOutcome {
            output: Some(serde_json::json!({ "created": name })),
        })
    }
}

/// `FILE EDIT <name> <text...>`: append one line of text.
struct FileEditHandler {
    workspace: Utf8PathBuf,
}

impl CommandHandler for FileEditHandler {
    fn kind(&self) -> CommandKind {
        CommandKind::Mutating
    }

    fn handle(&self, req: &CommandRequest) -> Result<CommandOutcome, UdosError> {
        let name = req.args.first().map(String::as_str).unwrap_or_default();
        let path = resolve(&self.workspace, name)?;
        if !path.as_std_path().is_file() {
            return Err(UdosError::new(
                ErrorKind::InputInvalid,
                format!("no such file: {name}"),
            ));
        }
        let text = req.args[1..].join(" ");
        let mut content = fs::read_to_string(path.as_std_path())
            .map_err(|e| UdosError::internal(e.to_string()))?;
        if !content.is_empty() && !content.ends_with('\n') {
            content.push('\n');
        }
        content.push_str(&text);
        content.push('\n');
        udos_core::atomic_write::write_file_atomic(&path, &content)
            .map_err(|e| UdosError::internal(e.to_string()))?;
        Ok(CommandOutcome {
            output: Some(serde_json::json!({
                "edited": name,
                "appended_bytes": text.len() + 1,
            })),
        })
    }
}

/// `READ <name>`: return file content, capped.
struct ReadHandler {
    workspace: Utf8PathBuf,
}

impl CommandHandler for ReadHandler {
    fn kind(&self) -> CommandKind {
        CommandKind::ReadOnly
    }

    fn handle(&self, req: &CommandRequest) -> Result<CommandOutcome, UdosError> {
        let name = req.args.first().map(String::as_str).unwrap_or_default();
        let path = resolve(&self.workspace, name)?;
        let bytes = fs::read(path.as_std_path()).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => {
                UdosError::new(ErrorKind::InputInvalid, format!("no such file: {name}"))
            }
            _ => UdosError::internal(e.to_string()),
        })?;
        let truncated = bytes.len() > READ_CAP_BYTES;
        let slice = &bytes[..bytes.len().min(READ_CAP_BYTES)];
        Ok(CommandOutcome {
            output: Some(serde_json::json!({
                "name": name,
                "content": String::from_utf8_lossy(slice),
                "truncated": truncated,
            })),
        })
    }
}

/// `FIND <pattern>`: workspace entries whose names contain the pattern.
struct FindHandler {
    workspace: Utf8PathBuf,
}

impl CommandHandler for FindHandler {
    fn kind(&self) -> CommandKind {
        CommandKind::ReadOnly
    }

    fn handle(&self, req: &CommandRequest) -> Result<CommandOutcome, UdosError> {
        let pattern = req.args.first().map(String::as_str).unwrap_or_default();
        if pattern.is_empty() {
            return Err(UdosError::new(
                ErrorKind::InputInvalid,
                "missing search pattern",
            ));
        }
        let mut matches = Vec::new();
        if let Ok(entries) = fs::read_dir(self.workspace.as_std_path()) {
            for entry in entries.flatten() {
                if let Ok(name) = entry.file_name().into_string()
                    && name.to_lowercase().contains(&pattern.to_lowercase())
                {
                    matches.push(name);
                }
            }
        }
        matches.sort();
        Ok(CommandOutcome {
            output: Some(serde_json::json!({
                "pattern": pattern,
                "matches": matches,
            })),
        })
    }
}

/// Wire the workspace-backed handlers.
pub(crate) fn wire_workspace_handlers(registry: &mut HandlerRegistry, workspace: &Utf8PathBuf) {
    registry.register_override(
        "FILE",
        Arc::new(FileListHandler {
            workspace: workspace.clone(),
        }),
    );
    registry.register_override(
        "FILE NEW",
        Arc::new(FileNewHandler {
            workspace: workspace.clone(),
        }),
    );
    registry.register_override(
        "FILE EDIT",
        Arc::new(FileEditHandler {
            workspace: workspace.clone(),
        }),
    );
    registry.register_override(
        "READ",
        Arc::new(ReadHandler {
            workspace: workspace.clone(),
        }),
    );
    registry.register_override(
        "FIND",
        Arc::new(FindHandler {
            workspace: workspace.clone(),
        }),
    );
}
