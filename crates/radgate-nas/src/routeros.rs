//! Mikrotik RouterOS API client
//!
//! Speaks the RouterOS API sentence protocol over TCP (default port
//! 8728): length-prefixed words, empty word terminating a sentence,
//! `!re`/`!done`/`!trap` replies. Hotspot sessions are looked up in
//! `/ip/hotspot/active` by user (or MAC) and removed by `.id`.
//!
//! Connections are opened per command; the lifecycle dispatcher
//! already retries, so there is nothing to gain from pooling a
//! channel to a device that may be rebooting.

use crate::{DisconnectAck, DisconnectRequest, NasClient, NasError};
use async_trait::async_trait;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

/// RouterOS API client for one device
pub struct RouterOsClient {
    addr: SocketAddr,
    username: String,
    password: String,
    timeout: Duration,
}

impl RouterOsClient {
    /// New client for a device API endpoint
    pub fn new(addr: SocketAddr, username: &str, password: &str, timeout: Duration) -> Self {
        Self {
            addr,
            username: username.to_string(),
            password: password.to_string(),
            timeout,
        }
    }

    async fn run(&self, req: &DisconnectRequest) -> Result<DisconnectAck, NasError> {
        let mut stream = TcpStream::connect(self.addr)
            .await
            .map_err(|e| NasError::Transport(e.to_string()))?;

        // Plain login (RouterOS >= 6.43)
        write_sentence(
            &mut stream,
            &[
                "/login".into(),
                format!("=name={}", self.username),
                format!("=password={}", self.password),
            ],
        )
        .await?;
        let reply = read_reply(&mut stream).await?;
        if reply.trapped {
            return Err(NasError::Rejected("login failed".into()));
        }

        // Find the active session id
        let mut print = vec!["/ip/hotspot/active/print".to_string()];
        if let Some(mac) = &req.mac {
            print.push(format!("?mac-address={mac}"));
        } else {
            print.push(format!("?user={}", req.username));
        }
        write_sentence(&mut stream, &print).await?;
        let reply = read_reply(&mut stream).await?;
        if reply.trapped {
            return Err(NasError::Rejected(reply.message.unwrap_or_default()));
        }

        let Some(id) = reply.first_value(".id") else {
            debug!(username = %req.username, "no active hotspot session on device");
            return Ok(DisconnectAck::AlreadyGone);
        };

        write_sentence(
            &mut stream,
            &["/ip/hotspot/active/remove".into(), format!("=.id={id}")],
        )
        .await?;
        let reply = read_reply(&mut stream).await?;
        if reply.trapped {
            return Err(NasError::Rejected(reply.message.unwrap_or_default()));
        }

        Ok(DisconnectAck::Removed)
    }
}

#[async_trait]
impl NasClient for RouterOsClient {
    async fn disconnect(&self, req: &DisconnectRequest) -> Result<DisconnectAck, NasError> {
        crate::with_timeout(self.timeout, self.run(req)).await
    }

    fn name(&self) -> &str {
        "routeros"
    }
}

/// Accumulated reply to one command
#[derive(Debug, Default)]
struct Reply {
    /// `!re` attribute words, flattened as (key, value)
    attributes: Vec<(String, String)>,
    /// A `!trap` was seen
    trapped: bool,
    /// Trap message, if any
    message: Option<String>,
}

impl Reply {
    fn first_value(&self, key: &str) -> Option<String> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
    }
}

async fn write_sentence(stream: &mut TcpStream, words: &[String]) -> Result<(), NasError> {
    let mut buf = Vec::new();
    for word in words {
        encode_length(word.len() as u32, &mut buf);
        buf.extend_from_slice(word.as_bytes());
    }
    buf.push(0); // empty word ends the sentence
    stream
        .write_all(&buf)
        .await
        .map_err(|e| NasError::Transport(e.to_string()))
}

async fn read_reply(stream: &mut TcpStream) -> Result<Reply, NasError> {
    let mut reply = Reply::default();
    loop {
        let sentence = read_sentence(stream).await?;
        match sentence.first().map(String::as_str) {
            Some("!done") => return Ok(reply),
            Some("!trap") | Some("!fatal") => {
                reply.trapped = true;
                reply.message = sentence
                    .iter()
                    .find_map(|w| w.strip_prefix("=message=").map(str::to_string));
            }
            Some("!re") => {
                for word in &sentence[1..] {
                    if let Some(rest) = word.strip_prefix('=') {
                        if let Some((k, v)) = rest.split_once('=') {
                            reply.attributes.push((k.to_string(), v.to_string()));
                        }
                    }
                }
            }
            _ => {}
        }
    }
}

async fn read_sentence(stream: &mut TcpStream) -> Result<Vec<String>, NasError> {
    let mut words = Vec::new();
    loop {
        let len = read_length(stream).await?;
        if len == 0 {
            return Ok(words);
        }
        let mut word = vec![0u8; len as usize];
        stream
            .read_exact(&mut word)
            .await
            .map_err(|e| NasError::Transport(e.to_string()))?;
        words.push(String::from_utf8_lossy(&word).into_owned());
    }
}

/// RouterOS variable-length word size encoding
fn encode_length(len: u32, out: &mut Vec<u8>) {
    match len {
        0..=0x7f => out.push(len as u8),
        0x80..=0x3fff => out.extend_from_slice(&((len | 0x8000) as u16).to_be_bytes()),
        0x4000..=0x1f_ffff => {
            let v = len | 0xc0_0000;
            out.extend_from_slice(&v.to_be_bytes()[1..]);
        }
        _ => {
            let v = len | 0xe000_0000;
            out.extend_from_slice(&v.to_be_bytes());
        }
    }
}

async fn read_length(stream: &mut TcpStream) -> Result<u32, NasError> {
    let b0 = read_byte(stream).await?;
    let len = if b0 & 0x80 == 0 {
        b0 as u32
    } else if b0 & 0xc0 == 0x80 {
        let b1 = read_byte(stream).await?;
        (((b0 & 0x3f) as u32) << 8) | b1 as u32
    } else if b0 & 0xe0 == 0xc0 {
        let b1 = read_byte(stream).await?;
        let b2 = read_byte(stream).await?;
        (((b0 & 0x1f) as u32) << 16) | ((b1 as u32) << 8) | b2 as u32
    } else {
        let b1 = read_byte(stream).await?;
        let b2 = read_byte(stream).await?;
        let b3 = read_byte(stream).await?;
        (((b0 & 0x0f) as u32) << 24) | ((b1 as u32) << 16) | ((b2 as u32) << 8) | b3 as u32
    };
    Ok(len)
}

async fn read_byte(stream: &mut TcpStream) -> Result<u8, NasError> {
    let mut byte = [0u8; 1];
    stream
        .read_exact(&mut byte)
        .await
        .map_err(|e| NasError::Transport(e.to_string()))?;
    Ok(byte[0])
}
