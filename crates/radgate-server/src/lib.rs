//! RADIUS UDP front end
//!
//! Two listeners, authentication and accounting, each a recv loop that
//! spawns a task per datagram over a shared [`Handlers`]. UDP has no
//! back-pressure, so per-datagram tasks keep one slow partition from
//! delaying every NAS behind the socket.

#![warn(missing_docs)]

pub mod handler;

pub use handler::Handlers;

use radgate_common::{RadError, RadResult};
use radgate_proto::packet::MAX_PACKET_LEN;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tracing::{debug, error, info};

/// The two bound sockets and their shared handler state
pub struct RadiusServer {
    auth: Arc<UdpSocket>,
    acct: Arc<UdpSocket>,
    handlers: Arc<Handlers>,
}

/// Which port a loop serves; selects the handler entry point
#[derive(Debug, Clone, Copy)]
enum Port {
    Auth,
    Acct,
}

impl RadiusServer {
    /// Bind both listeners
    pub async fn bind(
        auth_addr: &str,
        acct_addr: &str,
        handlers: Arc<Handlers>,
    ) -> RadResult<Self> {
        let auth = Arc::new(UdpSocket::bind(auth_addr).await?);
        let acct = Arc::new(UdpSocket::bind(acct_addr).await?);
        info!(auth = %auth_addr, acct = %acct_addr, "RADIUS listeners bound");
        Ok(Self {
            auth,
            acct,
            handlers,
        })
    }

    /// Serve both ports until one loop fails fatally
    pub async fn run(self) -> RadResult<()> {
        let auth_loop = recv_loop(self.auth, self.handlers.clone(), Port::Auth);
        let acct_loop = recv_loop(self.acct, self.handlers, Port::Acct);
        tokio::try_join!(auth_loop, acct_loop)?;
        Ok(())
    }
}

async fn recv_loop(socket: Arc<UdpSocket>, handlers: Arc<Handlers>, port: Port) -> RadResult<()> {
    let mut buf = vec![0u8; MAX_PACKET_LEN];
    loop {
        let (len, src) = match socket.recv_from(&mut buf).await {
            Ok(rx) => rx,
            Err(e) => {
                // Transient ICMP-induced errors are normal on UDP
                debug!(error = %e, "recv_from error");
                if fatal_io(&e) {
                    error!(error = %e, "listener socket failed");
                    return Err(RadError::Io(e));
                }
                continue;
            }
        };
        let datagram = buf[..len].to_vec();
        let socket = socket.clone();
        let handlers = handlers.clone();
        tokio::spawn(async move {
            let response = match port {
                Port::Auth => handlers.handle_auth(&datagram, src),
                Port::Acct => handlers.handle_acct(&datagram, src),
            };
            if let Some(wire) = response {
                if let Err(e) = socket.send_to(&wire, src).await {
                    debug!(dst = %src, error = %e, "failed to send response");
                }
            }
        });
    }
}

fn fatal_io(e: &std::io::Error) -> bool {
    !matches!(
        e.kind(),
        std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::ConnectionRefused
            | std::io::ErrorKind::Interrupted
            | std::io::ErrorKind::WouldBlock
    )
}
