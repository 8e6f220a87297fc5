// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Command execution on migrated VMs over SSH.
//!
//! Sessions are opened and released per command; a connection is never held
//! across calls. Network-level failures all collapse into a single
//! "not accessible" error carrying the target address, which the polling
//! helpers retry against.

use std::io::Read;
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use camino::Utf8PathBuf;
use ssh2::Session;
use thiserror::Error;
use tracing::debug;

use crate::config::SshOptions;

/// How many once-per-second `pwd` probes to attempt before declaring a VM
/// unreachable.
pub const VM_ACCESSIBILITY_ATTEMPTS: usize = 20;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum RemoteExecError {
    #[error("VM with ip {ip} is not accessible")]
    Unreachable { ip: String },

    #[error("VM with ip {ip} is not accessible via ssh after {attempts} attempts")]
    ProbeExhausted { ip: String, attempts: usize },

    #[error("command {command:?} on {ip} exited with status {status}: {stderr}")]
    CommandFailed {
        ip: String,
        command: String,
        status: i32,
        stderr: String,
    },

    #[error("ssh session error on {ip}")]
    Session {
        ip: String,
        #[source]
        source: ssh2::Error,
    },
}

type Result<T> = std::result::Result<T, RemoteExecError>;

/// Per-invocation overrides for [`RemoteExec::execute_command_on_vm`].
///
/// Credentials default to the configured SSH username/password unless a key
/// or an explicit username/password is supplied here.
#[derive(Clone, Debug)]
pub struct ExecOptions {
    pub username: Option<String>,
    pub password: Option<String>,
    pub private_key_path: Option<Utf8PathBuf>,
    pub use_sudo: bool,
    /// Treat a non-zero exit status as a warning instead of an error.
    pub warn_only: bool,
}

impl Default for ExecOptions {
    fn default() -> Self {
        Self {
            username: None,
            password: None,
            private_key_path: None,
            use_sudo: true,
            warn_only: false,
        }
    }
}

impl ExecOptions {
    pub fn as_root() -> Self {
        Self { username: Some("root".to_string()), ..Default::default() }
    }

    pub fn with_key(username: &str, key_path: Utf8PathBuf) -> Self {
        Self {
            username: Some(username.to_string()),
            private_key_path: Some(key_path),
            use_sudo: false,
            ..Default::default()
        }
    }
}

/// Executes shell commands on VMs using the configured default credentials.
#[derive(Debug)]
pub struct RemoteExec {
    ssh: SshOptions,
}

impl RemoteExec {
    pub fn new(ssh: SshOptions) -> Self {
        Self { ssh }
    }

    /// Runs `cmd` on the VM at `ip` and returns its captured stdout, with
    /// trailing line endings removed. The SSH session is released on every
    /// exit path.
    pub fn execute_command_on_vm(
        &self,
        ip: &str,
        cmd: &str,
        opts: &ExecOptions,
    ) -> Result<String> {
        let username = opts.username.as_deref().unwrap_or(&self.ssh.username);
        debug!(%ip, %username, %cmd, "executing command over ssh");

        let session = self.open_session(ip, username, opts)?;
        let mut channel = session
            .channel_session()
            .map_err(|source| RemoteExecError::Session {
                ip: ip.to_string(),
                source,
            })?;

        let full_cmd = if opts.use_sudo && username != "root" {
            format!("sudo {cmd}")
        } else {
            cmd.to_string()
        };
        channel.exec(&full_cmd).map_err(|source| RemoteExecError::Session {
            ip: ip.to_string(),
            source,
        })?;

        let mut stdout = String::new();
        let mut stderr = String::new();
        channel
            .read_to_string(&mut stdout)
            .map_err(|_| RemoteExecError::Unreachable { ip: ip.to_string() })?;
        let _ = channel.stderr().read_to_string(&mut stderr);
        let _ = channel.wait_close();

        let status = channel.exit_status().map_err(|source| {
            RemoteExecError::Session { ip: ip.to_string(), source }
        })?;
        if status != 0 && !opts.warn_only {
            return Err(RemoteExecError::CommandFailed {
                ip: ip.to_string(),
                command: cmd.to_string(),
                status,
                stderr: stderr.trim_end().to_string(),
            });
        }

        Ok(stdout.trim_end().to_string())
    }

    /// Polls the VM with a trivial `pwd` probe until it answers, once per
    /// second for [`VM_ACCESSIBILITY_ATTEMPTS`] attempts. Exhausting the
    /// budget is fatal.
    pub fn wait_until_vm_accessible_via_ssh(&self, ip: &str) -> Result<()> {
        probe_until_accessible(
            ip,
            VM_ACCESSIBILITY_ATTEMPTS,
            Duration::from_secs(1),
            || self.execute_command_on_vm(ip, "pwd", &ExecOptions::default()),
        )
    }

    fn open_session(
        &self,
        ip: &str,
        username: &str,
        opts: &ExecOptions,
    ) -> Result<Session> {
        let addr = format!("{ip}:22")
            .to_socket_addrs()
            .ok()
            .and_then(|mut addrs| addrs.next())
            .ok_or_else(|| RemoteExecError::Unreachable {
                ip: ip.to_string(),
            })?;
        let tcp = TcpStream::connect_timeout(&addr, CONNECT_TIMEOUT)
            .map_err(|_| RemoteExecError::Unreachable { ip: ip.to_string() })?;

        let mut session =
            Session::new().map_err(|source| RemoteExecError::Session {
                ip: ip.to_string(),
                source,
            })?;
        session.set_tcp_stream(tcp);
        session
            .handshake()
            .map_err(|_| RemoteExecError::Unreachable { ip: ip.to_string() })?;

        if let Some(key_path) = &opts.private_key_path {
            session
                .userauth_pubkey_file(
                    username,
                    None,
                    key_path.as_std_path(),
                    None,
                )
                .map_err(|source| RemoteExecError::Session {
                    ip: ip.to_string(),
                    source,
                })?;
        } else {
            let password =
                opts.password.as_deref().unwrap_or(&self.ssh.password);
            session.userauth_password(username, password).map_err(
                |source| RemoteExecError::Session {
                    ip: ip.to_string(),
                    source,
                },
            )?;
        }
        Ok(session)
    }
}

fn probe_until_accessible(
    ip: &str,
    attempts: usize,
    interval: Duration,
    mut probe: impl FnMut() -> Result<String>,
) -> Result<()> {
    for attempt in 0..attempts {
        match probe() {
            Ok(_) => return Ok(()),
            Err(e) => {
                debug!(%ip, attempt, error = %e, "ssh probe failed");
                if attempt + 1 < attempts {
                    std::thread::sleep(interval);
                }
            }
        }
    }
    Err(RemoteExecError::ProbeExhausted { ip: ip.to_string(), attempts })
}
