//! UDP transport loop.
//!
//! The [`Server`] owns a single fixed-size buffer and processes one datagram
//! at a time:
//! 1. Receive a datagram into the buffer
//! 2. Run the engine, which writes the response over the same buffer
//! 3. Send the response back to the source, unless it is empty
//!
//! Malformed datagrams either terminate the loop or are dropped, depending
//! on the configured [`ErrorPolicy`]. Allocation and socket failures always
//! terminate it. There is no clean stop: [`Server::run`] only returns the
//! error that ended it.
//!
//! # Example
//!
//! ```ignore
//! use etherbone_server::{Config, RamRegion, Server};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     let mut server = Server::bind(Config::default(), RamRegion::new(4096))
//!         .await
//!         .unwrap();
//!     let err = server.run().await;
//!     eprintln!("Aborting: {}", err);
//! }
//! ```

use std::net::{Ipv4Addr, SocketAddr};

use tokio::net::UdpSocket;
use tracing::{debug, error, info, warn};

use crate::config::{Config, ErrorPolicy};
use crate::error::{EtherboneError, Result};
use crate::memory::MemoryAccess;
use crate::protocol::Engine;

/// Transport loop state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Waiting for (or processing) datagrams.
    Listening,
    /// Stopped after a failure.
    Terminated,
}

/// A running EtherBone responder.
pub struct Server<M> {
    socket: UdpSocket,
    engine: Engine<M>,
    buf: Vec<u8>,
    config: Config,
    state: State,
}

impl<M: MemoryAccess> Server<M> {
    /// Bind `0.0.0.0:<udp_port>` and create the server.
    pub async fn bind(config: Config, memory: M) -> Result<Self> {
        config.validate()?;
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, config.udp_port)).await?;
        Self::from_socket(socket, config, memory)
    }

    /// Create a server on an already bound socket.
    ///
    /// The socket's address takes precedence over `config.udp_port`.
    pub fn from_socket(socket: UdpSocket, config: Config, memory: M) -> Result<Self> {
        config.validate()?;

        let mut buf = Vec::new();
        buf.try_reserve_exact(config.buffer_size)
            .map_err(|_| EtherboneError::Allocation {
                len: config.buffer_size,
            })?;
        buf.resize(config.buffer_size, 0);

        Ok(Self {
            socket,
            engine: Engine::new(memory),
            buf,
            config,
            state: State::Listening,
        })
    }

    /// Address the server is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// The configuration the server was created with.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Current loop state.
    pub fn state(&self) -> State {
        self.state
    }

    /// The engine (and through it, the memory).
    pub fn engine(&self) -> &Engine<M> {
        &self.engine
    }

    /// The receive/response buffer.
    pub fn buffer_mut(&mut self) -> &mut [u8] {
        &mut self.buf
    }

    /// Serve datagrams until a terminating failure, and return it.
    pub async fn run(&mut self) -> EtherboneError {
        info!(
            "Serving on {} (policy: {:?}, buffer: {} bytes)",
            self.socket
                .local_addr()
                .map(|a| a.to_string())
                .unwrap_or_else(|_| format!("port {}", self.config.udp_port)),
            self.config.policy,
            self.buf.len()
        );

        loop {
            if let Err(e) = self.serve_one().await {
                self.state = State::Terminated;
                return e;
            }
        }
    }

    /// Receive, process and answer a single datagram.
    pub async fn serve_one(&mut self) -> Result<()> {
        let (received_len, peer) = match self.socket.recv_from(&mut self.buf).await {
            Ok(received) => received,
            Err(e) => {
                error!("Failed to receive data from socket: {}", e);
                return Err(e.into());
            }
        };
        debug!("Received {} byte packet from {}", received_len, peer);

        let response_len = self.handle_datagram(received_len, peer)?;
        if response_len == 0 {
            return Ok(());
        }

        debug!("Sending {} byte response to {}", response_len, peer);
        if let Err(e) = self
            .socket
            .send_to(&self.buf[..response_len], peer)
            .await
        {
            error!("Failed to reply to {}: {}", peer, e);
            return Err(e.into());
        }
        Ok(())
    }

    /// Run the engine on the first `received_len` bytes of the buffer and
    /// apply the error policy.
    ///
    /// Returns the number of response bytes now at the start of the buffer
    /// (0 for no reply, including a dropped datagram under the continue
    /// policy).
    pub fn handle_datagram(&mut self, received_len: usize, peer: SocketAddr) -> Result<usize> {
        match self.engine.process(&mut self.buf, received_len) {
            Ok(len) => Ok(len),
            Err(e) if e.is_fatal() => {
                error!("Error while processing a packet from {}: {}", peer, e);
                Err(e)
            }
            Err(e) => match self.config.policy {
                ErrorPolicy::Abort => {
                    error!("Error while processing a packet from {}: {}", peer, e);
                    Err(e)
                }
                ErrorPolicy::Continue => {
                    warn!("Dropping packet from {}: {}", peer, e);
                    Ok(0)
                }
            },
        }
    }
}
