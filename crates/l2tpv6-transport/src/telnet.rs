// Telnet transport
//
// RouterOS telnet: "Login: " / "Password: " prompts, then a "[user@identity] > "
// shell prompt after every command. Option negotiation is refused wholesale;
// the device falls back to a plain NVT which is all we need.

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, trace, warn};

use crate::error::Error;
use crate::session::{DeviceSession, Transport};

const IAC: u8 = 255;
const DONT: u8 = 254;
const DO: u8 = 253;
const WONT: u8 = 252;
const WILL: u8 = 251;
const SB: u8 = 250;
const SE: u8 = 240;

const LOGIN_PROMPT: &[u8] = b"Login: ";
const PASSWORD_PROMPT: &[u8] = b"Password: ";
const SHELL_PROMPT: &[u8] = b"] > ";

/// Login suffix that disables colors (`c`) and terminal auto-detection (`t`).
const CONSOLE_FLAGS: &str = "+ct";

// ── Negotiation decoder ─────────────────────────────────────────────

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
enum DecodeState {
    #[default]
    Data,
    Iac,
    Option(u8),
    Subnegotiation,
    SubnegotiationIac,
}

/// Streaming filter that strips telnet commands from received bytes and
/// queues refusals for every option the peer proposes.
#[derive(Debug, Default)]
pub struct TelnetDecoder {
    state: DecodeState,
    replies: Vec<u8>,
}

impl TelnetDecoder {
    /// Feed raw bytes; returns the data bytes they contain.
    ///
    /// Sequences split across reads are carried over to the next call.
    pub fn decode(&mut self, input: &[u8]) -> Vec<u8> {
        let mut data = Vec::with_capacity(input.len());
        for &byte in input {
            self.state = match (self.state, byte) {
                (DecodeState::Data, IAC) => DecodeState::Iac,
                (DecodeState::Data, b) => {
                    data.push(b);
                    DecodeState::Data
                }
                (DecodeState::Iac, IAC) => {
                    data.push(IAC);
                    DecodeState::Data
                }
                (DecodeState::Iac, cmd @ (WILL | WONT | DO | DONT)) => DecodeState::Option(cmd),
                (DecodeState::Iac, SB) => DecodeState::Subnegotiation,
                (DecodeState::Iac, _) => DecodeState::Data,
                (DecodeState::Option(cmd), option) => {
                    match cmd {
                        DO => self.replies.extend_from_slice(&[IAC, WONT, option]),
                        WILL => self.replies.extend_from_slice(&[IAC, DONT, option]),
                        _ => {}
                    }
                    DecodeState::Data
                }
                (DecodeState::Subnegotiation, IAC) => DecodeState::SubnegotiationIac,
                (DecodeState::Subnegotiation, _) => DecodeState::Subnegotiation,
                (DecodeState::SubnegotiationIac, SE) => DecodeState::Data,
                (DecodeState::SubnegotiationIac, _) => DecodeState::Subnegotiation,
            };
        }
        data
    }

    /// Drain the negotiation replies queued so far.
    pub fn take_replies(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.replies)
    }
}

// ── Session ─────────────────────────────────────────────────────────

/// An authenticated Telnet shell on a RouterOS device.
#[derive(Debug)]
pub struct TelnetSession {
    address: String,
    stream: TcpStream,
    decoder: TelnetDecoder,
    buffer: Vec<u8>,
    command_timeout: Duration,
}

impl TelnetSession {
    /// Connect, log in, and wait for the first shell prompt.
    pub async fn connect(
        address: &str,
        port: u16,
        username: &str,
        password: &SecretString,
        connect_timeout: Duration,
        command_timeout: Duration,
    ) -> Result<Self, Error> {
        let stream = timeout(connect_timeout, TcpStream::connect((address, port)))
            .await
            .map_err(|_| Error::Timeout {
                timeout_secs: connect_timeout.as_secs(),
                during: format!("connecting to {address}:{port}"),
            })?
            .map_err(|e| Error::Connect {
                address: address.to_owned(),
                transport: Transport::Telnet,
                reason: e.to_string(),
            })?;

        let mut session = Self {
            address: address.to_owned(),
            stream,
            decoder: TelnetDecoder::default(),
            buffer: Vec::new(),
            command_timeout: connect_timeout,
        };

        session.read_until(LOGIN_PROMPT).await?;
        session
            .send_line(&format!("{username}{CONSOLE_FLAGS}"))
            .await?;
        session.read_until(PASSWORD_PROMPT).await?;
        session.send_line(password.expose_secret()).await?;

        let banner = session.read_until_any(&[SHELL_PROMPT, LOGIN_PROMPT]).await?;
        if banner.ends_with(LOGIN_PROMPT) || contains(&banner, b"Login failed") {
            return Err(Error::Authentication {
                address: address.to_owned(),
                transport: Transport::Telnet,
            });
        }

        session.command_timeout = command_timeout;
        debug!(address, "telnet session established");
        Ok(session)
    }

    /// The device address this session is bound to.
    pub fn address(&self) -> &str {
        &self.address
    }

    async fn send_line(&mut self, line: &str) -> Result<(), Error> {
        self.stream.write_all(line.as_bytes()).await?;
        self.stream.write_all(b"\r\n").await?;
        self.stream.flush().await?;
        Ok(())
    }

    async fn read_until(&mut self, marker: &[u8]) -> Result<Vec<u8>, Error> {
        self.read_until_any(&[marker]).await
    }

    /// Read until the buffered data ends with one of `markers`; returns and
    /// consumes everything received up to and including the marker.
    async fn read_until_any(&mut self, markers: &[&[u8]]) -> Result<Vec<u8>, Error> {
        let deadline = self.command_timeout;
        let address = self.address.clone();
        timeout(deadline, async {
            let mut chunk = [0_u8; 4096];
            loop {
                if let Some(end) = find_marker(&self.buffer, markers) {
                    return Ok(self.buffer.drain(..end).collect());
                }
                let n = self.stream.read(&mut chunk).await?;
                if n == 0 {
                    return Err(Error::Closed {
                        address: address.clone(),
                    });
                }
                let data = self.decoder.decode(chunk.get(..n).unwrap_or_default());
                self.buffer.extend_from_slice(&data);
                let replies = self.decoder.take_replies();
                if !replies.is_empty() {
                    self.stream.write_all(&replies).await?;
                }
            }
        })
        .await
        .map_err(|_| Error::Timeout {
            timeout_secs: deadline.as_secs(),
            during: format!("waiting for {address}"),
        })?
    }
}

impl DeviceSession for TelnetSession {
    async fn run(&mut self, command: &str) -> Result<String, Error> {
        trace!(address = %self.address, command, "telnet exec");
        self.buffer.clear();
        self.send_line(command).await?;
        let raw = self.read_until(SHELL_PROMPT).await?;
        Ok(strip_echo_and_prompt(&String::from_utf8_lossy(&raw)))
    }

    fn transport(&self) -> Transport {
        Transport::Telnet
    }

    async fn close(mut self) {
        if let Err(e) = self.send_line("/quit").await {
            warn!(address = %self.address, error = %e, "telnet quit failed");
        }
        if let Err(e) = self.stream.shutdown().await {
            debug!(address = %self.address, error = %e, "telnet shutdown failed");
        }
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

/// Position just past the first marker found in `buffer`.
fn find_marker(buffer: &[u8], markers: &[&[u8]]) -> Option<usize> {
    markers
        .iter()
        .filter_map(|marker| {
            buffer
                .windows(marker.len())
                .position(|w| w == *marker)
                .map(|pos| pos + marker.len())
        })
        .min()
}

/// Drop the echoed command (first line) and the trailing prompt line.
fn strip_echo_and_prompt(raw: &str) -> String {
    let mut lines: Vec<&str> = raw.lines().collect();
    if !lines.is_empty() {
        lines.remove(0);
    }
    if lines.last().is_some_and(|l| l.trim_end().ends_with(']') || l.contains("] >")) {
        lines.pop();
    }
    lines
        .into_iter()
        .map(|l| l.trim_end_matches('\r'))
        .collect::<Vec<_>>()
        .join("\n")
}
