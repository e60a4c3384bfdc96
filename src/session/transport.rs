//! Pluggable transports behind a live session.
//!
//! The default factory spawns a local shell or an `ssh` process inside a
//! portable-pty PTY. Tests and alternative backends implement `Transport`
//! directly; the manager never sees anything but the trait.

use super::SessionError;
use crate::config;
use crate::profile::ConnectionProfile;
use crate::{log_debug, log_error};
use portable_pty::{Child, CommandBuilder, MasterPty, PtySize, native_pty_system};
use std::io::{Read, Write};

pub trait Transport: Send {
    fn clone_reader(&mut self) -> Result<Box<dyn Read + Send>, SessionError>;
    fn take_writer(&mut self) -> Result<Box<dyn Write + Send>, SessionError>;
    fn resize(&self, rows: u16, cols: u16) -> Result<(), SessionError>;
    /// Terminate the underlying process or channel. Idempotent; the reader
    /// side must unblock promptly after this returns.
    fn shutdown(&mut self);
}

pub trait TransportFactory: Send + Sync {
    /// Establish a transport for the given profile, or a local shell when
    /// no profile is given. `secret` is the unsealed credential, if any.
    fn connect(
        &self,
        profile: Option<&ConnectionProfile>,
        secret: Option<&[u8]>,
        rows: u16,
        cols: u16,
    ) -> Result<Box<dyn Transport>, SessionError>;
}

/// PTY-backed transport around a spawned child process
pub struct PtyTransport {
    master: Box<dyn MasterPty + Send>,
    child: Box<dyn Child + Send>,
}

impl Transport for PtyTransport {
    fn clone_reader(&mut self) -> Result<Box<dyn Read + Send>, SessionError> {
        self.master.try_clone_reader().map_err(|err| SessionError::Connect(err.to_string()))
    }

    fn take_writer(&mut self) -> Result<Box<dyn Write + Send>, SessionError> {
        self.master.take_writer().map_err(|err| SessionError::Connect(err.to_string()))
    }

    fn resize(&self, rows: u16, cols: u16) -> Result<(), SessionError> {
        self.master
            .resize(PtySize {
                rows: rows.max(1),
                cols: cols.max(1),
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|err| SessionError::IoError(std::io::Error::other(err.to_string())))
    }

    fn shutdown(&mut self) {
        // Killing the child makes PTY reads return promptly; dropping the
        // master (with the transport) releases the descriptor.
        if let Err(err) = self.child.kill() {
            log_debug!("PTY child kill returned: {}", err);
        }
        let _ = self.child.try_wait();
    }
}

impl Drop for PtyTransport {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Spawns local shells and ssh processes in PTYs
#[derive(Default)]
pub struct PtyTransportFactory;

impl PtyTransportFactory {
    pub fn new() -> Self {
        Self
    }

    fn local_shell_command() -> Result<CommandBuilder, SessionError> {
        let configured = config::get_config().read().ok().and_then(|config| config.settings.default_shell.clone());
        let shell = match configured {
            Some(shell) => shell,
            None => match std::env::var("SHELL") {
                Ok(shell) if !shell.is_empty() => shell,
                _ => which::which("sh")
                    .map_err(|err| SessionError::Connect(format!("no usable shell: {}", err)))?
                    .to_string_lossy()
                    .into_owned(),
            },
        };
        log_debug!("Spawning local shell: {}", shell);
        Ok(CommandBuilder::new(shell))
    }

    fn remote_command(profile: &ConnectionProfile, secret: Option<&[u8]>) -> Result<CommandBuilder, SessionError> {
        let ssh_path = which::which("ssh").map_err(|err| SessionError::Connect(format!("ssh not found: {}", err)))?;

        // Route the password through sshpass when it is available; ssh
        // itself refuses passwords from anywhere but a TTY.
        let mut cmd = match secret {
            Some(_) if which::which("sshpass").is_ok() => {
                let mut pass_cmd = CommandBuilder::new("sshpass");
                pass_cmd.arg("-e");
                pass_cmd.arg(&ssh_path);
                pass_cmd
            }
            _ => CommandBuilder::new(&ssh_path),
        };

        cmd.arg("-p");
        cmd.arg(profile.port.to_string());
        cmd.arg(&profile.host);

        if let Some(secret) = secret {
            cmd.env("SSHPASS", String::from_utf8_lossy(secret).into_owned());
        }

        log_debug!("Spawning ssh for {} ({}:{})", profile.label, profile.host, profile.port);
        Ok(cmd)
    }
}

impl TransportFactory for PtyTransportFactory {
    fn connect(
        &self,
        profile: Option<&ConnectionProfile>,
        secret: Option<&[u8]>,
        rows: u16,
        cols: u16,
    ) -> Result<Box<dyn Transport>, SessionError> {
        let pty_system = native_pty_system();

        // Open the PTY at the current content-area size to avoid startup
        // geometry mismatches in full-screen programs.
        let pty_pair = pty_system
            .openpty(PtySize {
                rows: rows.max(1),
                cols: cols.max(1),
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|err| SessionError::Connect(err.to_string()))?;

        let cmd = match profile {
            Some(profile) => Self::remote_command(profile, secret)?,
            None => Self::local_shell_command()?,
        };

        let child = pty_pair.slave.spawn_command(cmd).map_err(|err| {
            log_error!("Failed to spawn session process: {}", err);
            SessionError::Connect(err.to_string())
        })?;

        Ok(Box::new(PtyTransport {
            master: pty_pair.master,
            child,
        }))
    }
}
