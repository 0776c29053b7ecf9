// SSH transport (libssh2)
//
// libssh2 is blocking, so every call runs on tokio's blocking pool. The
// `ssh2::Session` is moved into the worker and handed back with the result,
// which keeps `SshSession` free of locks.

use std::io::Read;
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, trace, warn};

use crate::error::Error;
use crate::session::{DeviceSession, Transport};

/// Answers every keyboard-interactive prompt with the password.
///
/// Some RouterOS builds only offer keyboard-interactive once password auth
/// is disabled in `/ip ssh`.
struct PasswordPrompt {
    password: String,
}

impl ssh2::KeyboardInteractivePrompt for PasswordPrompt {
    fn prompt<'a>(
        &mut self,
        _username: &str,
        _instructions: &str,
        prompts: &[ssh2::Prompt<'a>],
    ) -> Vec<String> {
        prompts.iter().map(|_| self.password.clone()).collect()
    }
}

/// An authenticated SSH session. Each command runs on its own exec channel.
pub struct SshSession {
    address: String,
    command_timeout: Duration,
    inner: Option<ssh2::Session>,
}

impl std::fmt::Debug for SshSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SshSession")
            .field("address", &self.address)
            .field("command_timeout", &self.command_timeout)
            .field("open", &self.inner.is_some())
            .finish()
    }
}

impl SshSession {
    /// Connect and authenticate with username + password.
    ///
    /// `connect_timeout` bounds the TCP connect, handshake and login;
    /// `command_timeout` bounds every later exec.
    pub async fn connect(
        address: &str,
        port: u16,
        username: &str,
        password: &SecretString,
        connect_timeout: Duration,
        command_timeout: Duration,
    ) -> Result<Self, Error> {
        let host = address.to_owned();
        let user = username.to_owned();
        let pass = password.expose_secret().to_owned();

        let session = tokio::task::spawn_blocking(move || {
            connect_blocking(&host, port, &user, &pass, connect_timeout, command_timeout)
        })
        .await
        .map_err(|e| Error::Worker(e.to_string()))??;

        debug!(address, "ssh session established");
        Ok(Self {
            address: address.to_owned(),
            command_timeout,
            inner: Some(session),
        })
    }

    /// The device address this session is bound to.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Upper bound on a single command exchange.
    pub fn command_timeout(&self) -> Duration {
        self.command_timeout
    }
}

impl DeviceSession for SshSession {
    async fn run(&mut self, command: &str) -> Result<String, Error> {
        let session = self.inner.take().ok_or_else(|| Error::Closed {
            address: self.address.clone(),
        })?;
        let cmd = command.to_owned();

        trace!(address = %self.address, command, "ssh exec");
        let (session, result) = tokio::task::spawn_blocking(move || {
            let result = exec_blocking(&session, &cmd);
            (session, result)
        })
        .await
        .map_err(|e| Error::Worker(e.to_string()))?;

        self.inner = Some(session);
        result
    }

    fn transport(&self) -> Transport {
        Transport::Ssh
    }

    async fn close(mut self) {
        let Some(session) = self.inner.take() else {
            return;
        };
        let address = self.address.clone();
        let outcome = tokio::task::spawn_blocking(move || {
            session.disconnect(None, "provisioning finished", None)
        })
        .await;
        match outcome {
            Ok(Ok(())) => debug!(address, "ssh session closed"),
            Ok(Err(e)) => warn!(address, error = %e, "ssh disconnect failed"),
            Err(e) => warn!(address, error = %e, "ssh disconnect worker failed"),
        }
    }
}

// ── Blocking helpers ────────────────────────────────────────────────

fn timeout_millis(timeout: Duration) -> u32 {
    u32::try_from(timeout.as_millis()).unwrap_or(u32::MAX)
}

/// Bound libssh2 calls and the underlying socket by `timeout`.
fn apply_timeouts(session: &ssh2::Session, tcp: &TcpStream, timeout: Duration) {
    tcp.set_read_timeout(Some(timeout)).ok();
    tcp.set_write_timeout(Some(timeout)).ok();
    session.set_timeout(timeout_millis(timeout));
}

fn connect_blocking(
    host: &str,
    port: u16,
    user: &str,
    pass: &str,
    connect_timeout: Duration,
    command_timeout: Duration,
) -> Result<ssh2::Session, Error> {
    let connect_err = |reason: String| Error::Connect {
        address: host.to_owned(),
        transport: Transport::Ssh,
        reason,
    };

    let addr = (host, port)
        .to_socket_addrs()
        .map_err(|e| connect_err(format!("cannot resolve: {e}")))?
        .next()
        .ok_or_else(|| connect_err("no address resolved".into()))?;

    let tcp = TcpStream::connect_timeout(&addr, connect_timeout)
        .map_err(|e| connect_err(format!("TCP connect failed: {e}")))?;
    // The clone shares the socket, so timeouts set on it reach libssh2's stream.
    let socket = tcp
        .try_clone()
        .map_err(|e| connect_err(format!("cannot clone socket: {e}")))?;

    let mut session = ssh2::Session::new().map_err(|e| connect_err(e.to_string()))?;
    session.set_tcp_stream(tcp);
    apply_timeouts(&session, &socket, connect_timeout);
    session
        .handshake()
        .map_err(|e| connect_err(format!("handshake failed: {e}")))?;

    if !(session.userauth_password(user, pass).is_ok() && session.authenticated()) {
        let mut prompter = PasswordPrompt {
            password: pass.to_owned(),
        };
        let _ = session.userauth_keyboard_interactive(user, &mut prompter);
    }

    if session.authenticated() {
        apply_timeouts(&session, &socket, command_timeout);
        Ok(session)
    } else {
        Err(Error::Authentication {
            address: host.to_owned(),
            transport: Transport::Ssh,
        })
    }
}

fn exec_blocking(session: &ssh2::Session, command: &str) -> Result<String, Error> {
    let mut channel = session.channel_session()?;
    channel.exec(command)?;

    let mut output = String::new();
    channel.read_to_string(&mut output)?;

    // RouterOS reports most errors on stdout, but keep stderr for the rest.
    let mut stderr = String::new();
    channel.stderr().read_to_string(&mut stderr)?;
    if !stderr.trim().is_empty() {
        output.push_str(&stderr);
    }

    channel.wait_close()?;
    Ok(output)
}
