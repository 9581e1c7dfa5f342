//! The `bash` tool: a façade over one persistent [`ShellSession`].
//!
//! The façade owns at most one session at a time, creates it lazily on first
//! use, and recreates it from scratch on an explicit restart. All session
//! results and failures are surfaced verbatim; the only thing the façade adds
//! is the `system` annotation on restart acknowledgments.

use std::time::Duration;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::session::{SessionError, ShellSession};

/// Tool name as exposed over the protocol.
pub const TOOL_NAME: &str = "bash";

/// Tool description advertised in `tools/list`.
pub const DESCRIPTION: &str = "\
Run commands in a bash shell
* State is persistent across command calls and discussions with the user.
* To inspect a particular line range of a file, e.g. lines 10-25, try 'sed -n 10,25p /path/to/the/file'.
* Please avoid commands that may produce a very large amount of output.
* Please run long lived commands in the background, e.g. 'sleep 10 &' or start a server in the background.
";

/// Arguments accepted by the `bash` tool. Only presence is checked here;
/// the command text is passed to the shell untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct BashArgs {
    /// The bash command to run. Required unless the tool is being restarted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    /// Specifying true will restart this tool. Otherwise, leave this unspecified.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restart: Option<bool>,
}

/// Result of one tool invocation.
///
/// A non-empty `error` means the call failed. `system` is an advisory
/// annotation (for example "tool has been restarted."); callers should
/// prepend it to the visible text, never treat it as an error.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolResult {
    /// Command output.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    /// Failure description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Advisory system annotation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
}

impl ToolResult {
    /// A successful result carrying command output.
    #[must_use]
    pub fn output(text: impl Into<String>) -> Self {
        Self {
            output: Some(text.into()),
            ..Self::default()
        }
    }

    /// A side-effect-only acknowledgment carrying a system annotation.
    #[must_use]
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            system: Some(text.into()),
            ..Self::default()
        }
    }

    /// Whether this result signals a failed call.
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.error.as_deref().is_some_and(|error| !error.is_empty())
    }

    /// Render as user-visible text, prepending any system annotation.
    #[must_use]
    pub fn into_text(self) -> String {
        let body = self.error.or(self.output).unwrap_or_default();
        match self.system {
            Some(system) => format!("<system>{system}</system>\n{body}"),
            None => body,
        }
    }
}

/// Errors produced by [`BashTool::invoke`].
#[derive(Debug, Error)]
pub enum ToolError {
    /// Neither `command` nor `restart` was provided.
    #[error("no command provided")]
    MissingCommand,

    /// The underlying session failed.
    #[error(transparent)]
    Session(#[from] SessionError),
}

/// The tool façade. Holds zero or one live [`ShellSession`].
#[derive(Debug, Default)]
pub struct BashTool {
    session: Option<ShellSession>,
    timeout: Option<Duration>,
}

impl BashTool {
    /// Create a façade with no session; one is created lazily on first use.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            session: None,
            timeout: None,
        }
    }

    /// Override the per-command timeout of sessions created by this façade.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    fn new_session(&self) -> ShellSession {
        match self.timeout {
            Some(timeout) => ShellSession::new().with_timeout(timeout),
            None => ShellSession::new(),
        }
    }

    /// Invoke the tool.
    ///
    /// `restart: true` tears down any existing session (ignoring absence)
    /// and starts a fresh one, acknowledging with a `system` annotation and
    /// no output. Otherwise the command is delegated to the session, which
    /// is created and started on first use.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::MissingCommand`] when neither field is present,
    /// or the session's failure verbatim.
    pub async fn invoke(&mut self, args: BashArgs) -> Result<ToolResult, ToolError> {
        if args.restart.unwrap_or(false) {
            debug!("restarting bash session");
            if let Some(mut session) = self.session.take() {
                // The old session may already be gone; that is fine.
                let _ = session.stop();
            }
            let mut session = self.new_session();
            session.start().await?;
            self.session = Some(session);
            return Ok(ToolResult::system("tool has been restarted."));
        }

        if self.session.is_none() {
            debug!("starting bash session");
            let mut session = self.new_session();
            session.start().await?;
            self.session = Some(session);
        }

        match (&mut self.session, args.command) {
            (Some(session), Some(command)) => {
                let output = session.run(&command).await?;
                Ok(ToolResult::output(output))
            }
            _ => Err(ToolError::MissingCommand),
        }
    }
}

/// JSON schema for [`BashArgs`], advertised in `tools/list`.
#[must_use]
pub fn input_schema() -> serde_json::Value {
    serde_json::to_value(schemars::schema_for!(BashArgs)).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_tool() -> BashTool {
        BashTool::new().with_timeout(Duration::from_secs(5))
    }

    #[test]
    fn schema_declares_both_fields() {
        let schema = input_schema();
        let properties = schema.get("properties").unwrap();
        assert!(properties.get("command").is_some());
        assert!(properties.get("restart").is_some());
    }

    #[test]
    fn system_annotation_is_prepended() {
        let result = ToolResult {
            output: Some("hello".to_string()),
            error: None,
            system: Some("tool has been restarted.".to_string()),
        };
        assert_eq!(
            result.into_text(),
            "<system>tool has been restarted.</system>\nhello"
        );
    }

    #[test]
    fn error_text_wins_over_output() {
        let result = ToolResult {
            output: Some("partial".to_string()),
            error: Some("boom".to_string()),
            system: None,
        };
        assert!(result.is_error());
        assert_eq!(result.into_text(), "boom");
    }

    #[tokio::test]
    async fn invoke_without_fields_fails() {
        let mut tool = fast_tool();
        let err = tool.invoke(BashArgs::default()).await.unwrap_err();
        assert!(matches!(err, ToolError::MissingCommand));
    }

    #[tokio::test]
    async fn restart_alone_acknowledges_without_output() {
        let mut tool = fast_tool();
        let result = tool
            .invoke(BashArgs {
                command: None,
                restart: Some(true),
            })
            .await
            .unwrap();
        assert!(result.output.is_none());
        assert!(!result.is_error());
        assert_eq!(result.system.as_deref(), Some("tool has been restarted."));
    }

    #[tokio::test]
    async fn invoke_runs_command_lazily() {
        let mut tool = fast_tool();
        let result = tool
            .invoke(BashArgs {
                command: Some("echo hello".to_string()),
                restart: None,
            })
            .await
            .unwrap();
        assert_eq!(result.output.as_deref(), Some("hello"));
    }

    #[tokio::test]
    async fn restart_discards_previous_session() {
        let mut tool = fast_tool();
        tool.invoke(BashArgs {
            command: Some("MARKER=7".to_string()),
            restart: None,
        })
        .await
        .unwrap();

        tool.invoke(BashArgs {
            command: None,
            restart: Some(true),
        })
        .await
        .unwrap();

        let result = tool
            .invoke(BashArgs {
                command: Some("echo $MARKER".to_string()),
                restart: None,
            })
            .await
            .unwrap();
        assert_eq!(result.output.as_deref(), Some(""));
    }

    #[tokio::test]
    async fn timeout_is_reported_and_session_recycled() {
        let mut tool = BashTool::new().with_timeout(Duration::from_millis(500));

        let err = tool
            .invoke(BashArgs {
                command: Some("sleep 10".to_string()),
                restart: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Session(SessionError::Timeout(_))));

        // The same façade recovers on the next call.
        let result = tool
            .invoke(BashArgs {
                command: Some("echo recovered".to_string()),
                restart: None,
            })
            .await
            .unwrap();
        assert_eq!(result.output.as_deref(), Some("recovered"));
    }
}
