//! Builder for configuring and spawning the Copilot CLI server process.
//!
//! This module provides [`CliServerBuilder`] for constructing the CLI server
//! command line. The builder always configures:
//!
//! - `--server` for JSON-RPC server mode
//! - `--log-level` with the configured level
//! - either `--stdio` (pipe transport) or `--port` (TCP transport)
//!
//! In TCP mode the CLI announces its listening port on stdout; readiness is
//! waiting for that announcement. In stdio mode the process is ready as soon
//! as it has been spawned.

use crate::error::{Error, Result};
use crate::types::LogLevel;
use log::{debug, warn};
use regex::Regex;
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdout, Command};

/// Default time to wait for the CLI server to become ready.
pub(crate) const DEFAULT_READINESS_TIMEOUT: Duration = Duration::from_secs(10);

/// Environment variables stripped before spawn: they make the node-based
/// CLI write debug output to stdout, which would corrupt the frame stream.
const DEBUG_ENV_VARS: [&str; 2] = ["DEBUG", "NODE_DEBUG"];

/// Builder for the Copilot CLI server command.
#[derive(Debug, Clone)]
pub struct CliServerBuilder {
    cli_path: String,
    cwd: Option<PathBuf>,
    log_level: LogLevel,
    use_stdio: bool,
    port: u16,
    env: Option<HashMap<String, String>>,
}

impl Default for CliServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl CliServerBuilder {
    /// Create a builder for the CLI found at `COPILOT_CLI_PATH`, falling
    /// back to `copilot` on `PATH`.
    pub fn new() -> Self {
        Self {
            cli_path: std::env::var("COPILOT_CLI_PATH").unwrap_or_else(|_| "copilot".to_string()),
            cwd: None,
            log_level: LogLevel::default(),
            use_stdio: true,
            port: 0,
            env: None,
        }
    }

    /// Set a custom path to the CLI executable.
    pub fn cli_path(mut self, path: impl Into<String>) -> Self {
        self.cli_path = path.into();
        self
    }

    /// Set the working directory for the CLI process.
    pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    /// Set the CLI server log level.
    pub fn log_level(mut self, level: LogLevel) -> Self {
        self.log_level = level;
        self
    }

    /// Use stdio pipes (true, the default) or a TCP socket (false).
    pub fn use_stdio(mut self, use_stdio: bool) -> Self {
        self.use_stdio = use_stdio;
        self
    }

    /// TCP port to listen on; 0 lets the CLI pick a free port.
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Replace the inherited environment entirely.
    pub fn env(mut self, env: HashMap<String, String>) -> Self {
        self.env = Some(env);
        self
    }

    /// Compose the full argument vector, including the program when the CLI
    /// path needs a runtime or shell in front of it.
    fn build_command_line(&self) -> Vec<String> {
        let mut args = vec![
            "--server".to_string(),
            "--log-level".to_string(),
            self.log_level.as_str().to_string(),
        ];

        if self.use_stdio {
            args.push("--stdio".to_string());
        } else if self.port > 0 {
            args.push("--port".to_string());
            args.push(self.port.to_string());
        }

        // A .js entry point cannot rely on its shebang (Windows has none),
        // so run it under node explicitly.
        let mut command_line = if self.cli_path.ends_with(".js") {
            vec!["node".to_string(), self.cli_path.clone()]
        } else if cfg!(windows) && !std::path::Path::new(&self.cli_path).is_absolute() {
            // Non-absolute executables on Windows resolve via the command
            // processor (covers .cmd/.bat shims).
            vec!["cmd".to_string(), "/C".to_string(), self.cli_path.clone()]
        } else {
            vec![self.cli_path.clone()]
        };
        command_line.extend(args);
        command_line
    }

    /// Spawn the CLI server process with pipes attached.
    pub fn spawn(&self) -> Result<Child> {
        let command_line = self.build_command_line();
        debug!("[CLI] spawning: {}", command_line.join(" "));

        let mut cmd = Command::new(&command_line[0]);
        cmd.args(&command_line[1..])
            .stdin(if self.use_stdio {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(cwd) = &self.cwd {
            cmd.current_dir(cwd);
        }

        match &self.env {
            Some(env) => {
                cmd.env_clear();
                cmd.envs(env);
            }
            None => {
                for var in DEBUG_ENV_VARS {
                    cmd.env_remove(var);
                }
            }
        }

        cmd.spawn()
            .map_err(|e| Error::Spawn(format!("{}: {}", self.cli_path, e)))
    }
}

/// Read the CLI's stdout until it announces its listening port, within the
/// given timeout. Consumes lines; anything before the announcement is
/// discarded.
pub(crate) async fn wait_for_port(stdout: ChildStdout, timeout: Duration) -> Result<u16> {
    let scan = async {
        let port_line =
            Regex::new(r"(?i)listening on port (\d+)").expect("port announcement pattern");
        let mut lines = BufReader::new(stdout).lines();

        while let Some(line) = lines.next_line().await? {
            debug!("[CLI] stdout: {}", line);
            if let Some(captures) = port_line.captures(&line) {
                let port = captures[1]
                    .parse::<u16>()
                    .map_err(|_| Error::Protocol(format!("invalid port announcement: {}", line)))?;
                return Ok(port);
            }
        }

        Err(Error::Spawn(
            "CLI process exited before announcing port".to_string(),
        ))
    };

    tokio::time::timeout(timeout, scan)
        .await
        .map_err(|_| Error::Spawn("Timeout waiting for CLI server to start".to_string()))?
}

/// Forward the CLI's stderr to the host log, line by line, prefixed so it
/// is distinguishable from host output.
pub(crate) fn forward_stderr(stderr: ChildStderr) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            warn!("[CLI stderr] {}", line);
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder() -> CliServerBuilder {
        CliServerBuilder::new().cli_path("copilot")
    }

    #[test]
    fn test_server_flags_always_present() {
        let command_line = builder().build_command_line();
        assert!(command_line.contains(&"--server".to_string()));
        assert!(command_line.contains(&"--log-level".to_string()));
        assert!(command_line.contains(&"info".to_string()));
    }

    #[test]
    fn test_stdio_mode_flag() {
        let command_line = builder().build_command_line();
        assert!(command_line.contains(&"--stdio".to_string()));
        assert!(!command_line.contains(&"--port".to_string()));
    }

    #[test]
    fn test_tcp_mode_with_port() {
        let command_line = builder().use_stdio(false).port(9000).build_command_line();
        assert!(!command_line.contains(&"--stdio".to_string()));
        assert!(command_line.contains(&"--port".to_string()));
        assert!(command_line.contains(&"9000".to_string()));
    }

    #[test]
    fn test_tcp_mode_with_auto_port() {
        // Port 0 means "let the CLI pick"; no --port flag is passed.
        let command_line = builder().use_stdio(false).build_command_line();
        assert!(!command_line.contains(&"--port".to_string()));
    }

    #[test]
    fn test_js_path_runs_under_node() {
        let command_line = builder()
            .cli_path("/opt/copilot/index.js")
            .build_command_line();
        assert_eq!(command_line[0], "node");
        assert_eq!(command_line[1], "/opt/copilot/index.js");
        assert!(command_line.contains(&"--server".to_string()));
    }

    #[test]
    fn test_log_level_flag_value() {
        let command_line = builder().log_level(LogLevel::Debug).build_command_line();
        let position = command_line
            .iter()
            .position(|a| a == "--log-level")
            .unwrap();
        assert_eq!(command_line[position + 1], "debug");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_wait_for_port_times_out_without_announcement() {
        let mut child = Command::new("sleep")
            .arg("5")
            .stdout(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .unwrap();
        let stdout = child.stdout.take().unwrap();

        let result = wait_for_port(stdout, Duration::from_millis(100)).await;
        assert!(matches!(result, Err(Error::Spawn(_))));
    }
}
