// RouterOS connector
//
// Chooses the wire transport per host and enforces the single bounded
// attempt: SSH hosts get one SSH attempt; Telnet hosts get one SSH attempt
// first (when `ssh_preferred` is set) and then one Telnet attempt.

use std::time::Duration;

use secrecy::SecretString;
use tracing::{debug, info, warn};

use crate::error::Error;
use crate::session::{Connector, DeviceSession, Transport};
use crate::ssh::SshSession;
use crate::telnet::TelnetSession;

/// Credentials and tuning shared by every session a connector opens.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub username: String,
    pub password: SecretString,
    /// Deadline for TCP connect + login, applied once per transport tried.
    pub connect_timeout: Duration,
    /// Deadline for a single command round-trip.
    pub command_timeout: Duration,
    pub ssh_port: u16,
    pub telnet_port: u16,
    /// Try SSH before Telnet for hosts declared as Telnet.
    pub ssh_preferred: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            username: "admin".into(),
            password: SecretString::from(String::new()),
            connect_timeout: Duration::from_secs(30),
            command_timeout: Duration::from_secs(30),
            ssh_port: Transport::Ssh.default_port(),
            telnet_port: Transport::Telnet.default_port(),
            ssh_preferred: true,
        }
    }
}

/// A session over whichever transport succeeded.
#[derive(Debug)]
pub enum AnySession {
    Ssh(SshSession),
    Telnet(TelnetSession),
}

impl DeviceSession for AnySession {
    async fn run(&mut self, command: &str) -> Result<String, Error> {
        match self {
            Self::Ssh(s) => s.run(command).await,
            Self::Telnet(s) => s.run(command).await,
        }
    }

    fn transport(&self) -> Transport {
        match self {
            Self::Ssh(_) => Transport::Ssh,
            Self::Telnet(_) => Transport::Telnet,
        }
    }

    async fn close(self) {
        match self {
            Self::Ssh(s) => s.close().await,
            Self::Telnet(s) => s.close().await,
        }
    }
}

/// Opens real SSH/Telnet sessions to RouterOS devices.
#[derive(Debug, Clone)]
pub struct RouterOsConnector {
    config: SessionConfig,
}

impl RouterOsConnector {
    pub fn new(config: SessionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Transports to try, in order, for a host declared with `declared`.
    pub fn attempt_order(&self, declared: Transport) -> Vec<Transport> {
        match declared {
            Transport::Ssh => vec![Transport::Ssh],
            Transport::Telnet if self.config.ssh_preferred => {
                vec![Transport::Ssh, Transport::Telnet]
            }
            Transport::Telnet => vec![Transport::Telnet],
        }
    }

    async fn open_with(&self, address: &str, transport: Transport) -> Result<AnySession, Error> {
        let cfg = &self.config;
        match transport {
            Transport::Ssh => SshSession::connect(
                address,
                cfg.ssh_port,
                &cfg.username,
                &cfg.password,
                cfg.connect_timeout,
                cfg.command_timeout,
            )
            .await
            .map(AnySession::Ssh),
            Transport::Telnet => TelnetSession::connect(
                address,
                cfg.telnet_port,
                &cfg.username,
                &cfg.password,
                cfg.connect_timeout,
                cfg.command_timeout,
            )
            .await
            .map(AnySession::Telnet),
        }
    }
}

impl Connector for RouterOsConnector {
    type Session = AnySession;

    async fn open(&self, address: &str, transport: Transport) -> Result<AnySession, Error> {
        let order = self.attempt_order(transport);
        let mut failures = Vec::with_capacity(order.len());

        for candidate in order {
            debug!(address, transport = %candidate, "opening session");
            match self.open_with(address, candidate).await {
                Ok(session) => {
                    info!(address, transport = %candidate, "connected");
                    return Ok(session);
                }
                // Wrong credentials will not improve on another transport.
                Err(e @ Error::Authentication { .. }) => return Err(e),
                Err(e) => {
                    warn!(address, transport = %candidate, error = %e, "connect attempt failed");
                    failures.push(e);
                }
            }
        }

        if failures.len() == 1 {
            if let Some(only) = failures.pop() {
                return Err(only);
            }
        }
        Err(Error::Exhausted {
            address: address.to_owned(),
            attempts: failures.iter().map(ToString::to_string).collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connector(ssh_preferred: bool) -> RouterOsConnector {
        RouterOsConnector::new(SessionConfig {
            ssh_preferred,
            ..SessionConfig::default()
        })
    }

    #[test]
    fn ssh_hosts_get_a_single_ssh_attempt() {
        assert_eq!(connector(true).attempt_order(Transport::Ssh), vec![Transport::Ssh]);
    }

    #[test]
    fn telnet_hosts_try_ssh_first_when_preferred() {
        assert_eq!(
            connector(true).attempt_order(Transport::Telnet),
            vec![Transport::Ssh, Transport::Telnet]
        );
        assert_eq!(
            connector(false).attempt_order(Transport::Telnet),
            vec![Transport::Telnet]
        );
    }

    #[tokio::test]
    async fn unreachable_host_fails_without_retrying_forever() {
        let connector = RouterOsConnector::new(SessionConfig {
            connect_timeout: Duration::from_millis(200),
            command_timeout: Duration::from_millis(200),
            ssh_port: 1,
            telnet_port: 1,
            ..SessionConfig::default()
        });
        let result = connector.open("127.0.0.1", Transport::Telnet).await;
        let err = result.expect_err("nothing listens on port 1");
        assert!(err.is_connect_failure() || err.is_timeout(), "got: {err}");
    }
}
