//! Streaming of tracked landmark positions to a consumer.
//!
//! Every emitted frame is one datagram: a little-endian `u32` landmark count `N` followed by `N`
//! triples of little-endian `f32` coordinates (`x`, `y`, `z`), for `4 + 12 * N` bytes in total.

use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, ToSocketAddrs, UdpSocket};

use anyhow::Context;

use crate::landmark::Landmarks;

/// Default address tracking results are sent to.
pub const DEFAULT_UDP_TARGET: &str = "127.0.0.1:5005";

/// Encodes landmark positions in the datagram format described in the module docs.
pub fn encode_packet(landmarks: &Landmarks) -> Vec<u8> {
    let mut packet = Vec::with_capacity(4 + 12 * landmarks.len());
    packet.extend_from_slice(&(landmarks.len() as u32).to_le_bytes());
    for pos in landmarks.iter() {
        for coord in [pos.x, pos.y, pos.z] {
            packet.extend_from_slice(&coord.to_le_bytes());
        }
    }
    packet
}

/// A consumer of tracked 3D landmark positions.
pub trait Emitter {
    /// Hands a frame's landmark positions to the consumer.
    ///
    /// Emission is fire-and-forget: implementations must not block on, or report, delivery
    /// failures.
    fn emit(&mut self, landmarks: &Landmarks);
}

impl<E: Emitter + ?Sized> Emitter for &mut E {
    fn emit(&mut self, landmarks: &Landmarks) {
        (**self).emit(landmarks)
    }
}

impl<E: Emitter + ?Sized> Emitter for Box<E> {
    fn emit(&mut self, landmarks: &Landmarks) {
        (**self).emit(landmarks)
    }
}

/// Collects all emitted frames in memory.
impl Emitter for Vec<Landmarks> {
    fn emit(&mut self, landmarks: &Landmarks) {
        self.push(landmarks.clone());
    }
}

/// Sends every frame as a UDP datagram.
pub struct UdpEmitter {
    socket: UdpSocket,
    target: SocketAddr,
    sent: u64,
    dropped: u64,
}

impl UdpEmitter {
    /// Creates an emitter sending to `target`, from an ephemeral local port.
    pub fn new(target: impl ToSocketAddrs) -> anyhow::Result<Self> {
        let target = target
            .to_socket_addrs()
            .context("failed to resolve UDP target")?
            .next()
            .context("UDP target did not resolve to any address")?;
        let bind_addr = if target.is_ipv4() {
            SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0))
        } else {
            SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0))
        };
        let socket = UdpSocket::bind(bind_addr)
            .with_context(|| format!("failed to bind UDP socket to {bind_addr}"))?;
        log::info!(
            "streaming landmarks from {} to {target}",
            socket.local_addr()?
        );

        Ok(Self {
            socket,
            target,
            sent: 0,
            dropped: 0,
        })
    }

    pub fn target(&self) -> SocketAddr {
        self.target
    }

    /// Number of datagrams handed to the OS so far.
    pub fn sent(&self) -> u64 {
        self.sent
    }

    /// Number of datagrams that could not be sent.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

impl Emitter for UdpEmitter {
    fn emit(&mut self, landmarks: &Landmarks) {
        let packet = encode_packet(landmarks);
        match self.socket.send_to(&packet, self.target) {
            Ok(_) => self.sent += 1,
            Err(e) => {
                self.dropped += 1;
                log::debug!("dropped packet to {}: {e}", self.target);
            }
        }
    }
}
