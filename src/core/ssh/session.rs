use crate::config::Target;
use crate::error::{Error, Result};
use crate::utils::shell;
use std::path::PathBuf;
use std::process::{Command, Stdio};

pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub success: bool,
    pub exit_code: i32,
}

/// One remote session shared by every step of a deploy.
///
/// The seam exists so pipelines can be exercised against a recording fake;
/// production code uses [`SshSession`].
pub trait RemoteSession {
    /// Run a command, capturing output.
    fn run(&mut self, command: &str) -> CommandOutput;
    /// Run a command with a pseudo-terminal, output passed through to the
    /// operator's terminal. Returns the remote exit code.
    fn run_interactive(&mut self, command: &str) -> i32;
    /// Upload a local file to a remote path, overwriting it.
    fn upload(&mut self, local_path: &str, remote_path: &str) -> CommandOutput;
    /// Release the session. Must be idempotent.
    fn close(&mut self);
}

/// A scoped OpenSSH connection using a ControlMaster socket.
///
/// Established once per deploy; every subsequent command multiplexes over
/// the master. `close` tears the master down and `Drop` is the backstop so
/// the connection is released on every exit path, early error included.
/// When the target host is localhost/127.0.0.1/::1 no master is opened and
/// commands run locally with the same step semantics.
pub struct SshSession {
    target: Target,
    identity_file: Option<String>,
    control_path: PathBuf,
    is_local: bool,
    closed: bool,
}

impl SshSession {
    pub fn connect(target: &Target) -> Result<Self> {
        let identity_file = match &target.identity_file {
            Some(path) if !path.is_empty() => {
                let expanded = shellexpand::tilde(path).to_string();
                if !std::path::Path::new(&expanded).exists() {
                    return Err(Error::ssh_identity_file_not_found(
                        target.host.clone(),
                        expanded,
                    ));
                }
                Some(expanded)
            }
            _ => None,
        };

        let control_path = std::env::temp_dir().join(format!(
            "dockhand-{}-{}.ctl",
            target.host,
            std::process::id()
        ));

        let is_local = is_local_host(&target.host);
        let mut session = Self {
            target: target.clone(),
            identity_file,
            control_path,
            is_local,
            closed: false,
        };

        if is_local {
            log_status!("ssh", "Target '{}' is localhost — using local execution", target.host);
            return Ok(session);
        }

        // Open the master in the background; it owns the TCP connection for
        // the lifetime of the session.
        let mut args = vec![
            "-fNM".to_string(),
            "-S".to_string(),
            session.control_path.to_string_lossy().to_string(),
            "-o".to_string(),
            "ConnectTimeout=10".to_string(),
            "-o".to_string(),
            "ServerAliveInterval=15".to_string(),
        ];
        session.push_connection_args(&mut args);

        let output = Command::new("ssh").args(&args).output().map_err(|e| {
            Error::internal_io(e.to_string(), Some("spawn ssh master".to_string()))
        })?;

        if !output.status.success() {
            session.closed = true;
            return Err(Error::ssh_connect_failed(
                target.host.clone(),
                target.user.clone(),
                target.port,
                String::from_utf8_lossy(&output.stderr).to_string(),
            ));
        }

        log_status!("ssh", "Connected to {}@{}", target.user, target.host);
        Ok(session)
    }

    fn push_connection_args(&self, args: &mut Vec<String>) {
        if let Some(identity_file) = &self.identity_file {
            args.push("-i".to_string());
            args.push(identity_file.clone());
        }

        if self.target.port != 22 {
            args.push("-p".to_string());
            args.push(self.target.port.to_string());
        }

        args.push(format!("{}@{}", self.target.user, self.target.host));
    }

    fn multiplexed_args(&self, pty: bool) -> Vec<String> {
        let mut args = vec![
            "-S".to_string(),
            self.control_path.to_string_lossy().to_string(),
        ];
        if pty {
            args.push("-t".to_string());
        } else {
            args.push("-o".to_string());
            args.push("BatchMode=yes".to_string());
        }
        self.push_connection_args(&mut args);
        args
    }
}

impl RemoteSession for SshSession {
    fn run(&mut self, command: &str) -> CommandOutput {
        if self.is_local {
            return execute_local_command(command);
        }

        let mut args = self.multiplexed_args(false);
        args.push(command.to_string());

        match Command::new("ssh").args(&args).output() {
            Ok(out) => CommandOutput {
                stdout: String::from_utf8_lossy(&out.stdout).to_string(),
                stderr: String::from_utf8_lossy(&out.stderr).to_string(),
                success: out.status.success(),
                exit_code: out.status.code().unwrap_or(-1),
            },
            Err(e) => CommandOutput {
                stdout: String::new(),
                stderr: format!("SSH error: {}", e),
                success: false,
                exit_code: -1,
            },
        }
    }

    fn run_interactive(&mut self, command: &str) -> i32 {
        if self.is_local {
            return execute_local_command_interactive(command);
        }

        let mut args = self.multiplexed_args(true);
        args.push(command.to_string());

        let status = Command::new("ssh")
            .args(&args)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status();

        match status {
            Ok(s) => s.code().unwrap_or(-1),
            Err(_) => -1,
        }
    }

    fn upload(&mut self, local_path: &str, remote_path: &str) -> CommandOutput {
        if self.is_local {
            let command = format!(
                "cat {} > {}",
                shell::quote_path(local_path),
                shell::quote_path(remote_path)
            );
            return execute_local_command(&command);
        }

        let file = match std::fs::File::open(local_path) {
            Ok(file) => file,
            Err(err) => {
                return CommandOutput {
                    stdout: String::new(),
                    stderr: format!("Failed to open local file: {}", err),
                    success: false,
                    exit_code: -1,
                };
            }
        };

        let mut args = self.multiplexed_args(false);
        args.push(format!("cat > {}", shell::quote_path(remote_path)));

        match Command::new("ssh").args(&args).stdin(file).output() {
            Ok(out) => CommandOutput {
                stdout: String::from_utf8_lossy(&out.stdout).to_string(),
                stderr: String::from_utf8_lossy(&out.stderr).to_string(),
                success: out.status.success(),
                exit_code: out.status.code().unwrap_or(-1),
            },
            Err(e) => CommandOutput {
                stdout: String::new(),
                stderr: format!("SSH error: {}", e),
                success: false,
                exit_code: -1,
            },
        }
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        if self.is_local {
            return;
        }

        let mut args = vec![
            "-S".to_string(),
            self.control_path.to_string_lossy().to_string(),
            "-O".to_string(),
            "exit".to_string(),
        ];
        self.push_connection_args(&mut args);

        // Best effort: a dead master leaves nothing to tear down.
        let _ = Command::new("ssh")
            .args(&args)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();

        log_status!("ssh", "Closed connection to {}", self.target.host);
    }
}

impl Drop for SshSession {
    fn drop(&mut self) {
        self.close();
    }
}

pub fn execute_local_command(command: &str) -> CommandOutput {
    execute_local_command_in_dir(command, None, None)
}

pub fn execute_local_command_in_dir(
    command: &str,
    current_dir: Option<&str>,
    env: Option<&[(&str, &str)]>,
) -> CommandOutput {
    #[cfg(windows)]
    let mut cmd = {
        let mut cmd = Command::new("cmd");
        cmd.args(["/C", command]);
        cmd
    };

    #[cfg(not(windows))]
    let mut cmd = {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", command]);
        cmd
    };

    if let Some(dir) = current_dir {
        cmd.current_dir(dir);
    }

    if let Some(env_pairs) = env {
        cmd.envs(env_pairs.iter().copied());
    }

    match cmd.output() {
        Ok(out) => CommandOutput {
            stdout: String::from_utf8_lossy(&out.stdout).to_string(),
            stderr: String::from_utf8_lossy(&out.stderr).to_string(),
            success: out.status.success(),
            exit_code: out.status.code().unwrap_or(-1),
        },
        Err(e) => CommandOutput {
            stdout: String::new(),
            stderr: format!("Command error: {}", e),
            success: false,
            exit_code: -1,
        },
    }
}

pub fn execute_local_command_interactive(command: &str) -> i32 {
    #[cfg(windows)]
    let mut cmd = {
        let mut cmd = Command::new("cmd");
        cmd.args(["/C", command]);
        cmd
    };

    #[cfg(not(windows))]
    let mut cmd = {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", command]);
        cmd
    };

    let status = cmd
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .status();

    match status {
        Ok(s) => s.code().unwrap_or(-1),
        Err(_) => -1,
    }
}

/// Check if a host address refers to the local machine.
pub fn is_local_host(host: &str) -> bool {
    matches!(host, "localhost" | "127.0.0.1" | "::1")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_host_detection() {
        assert!(is_local_host("localhost"));
        assert!(is_local_host("127.0.0.1"));
        assert!(is_local_host("::1"));
        assert!(!is_local_host("deploy-host"));
        assert!(!is_local_host("192.168.1.10"));
    }
}
