//! Wire transport W: owns the UDP endpoint, serializes S's routing table
//! into the DV datagram format, broadcasts to live neighbors, and decodes
//! inbound datagrams (spec.md §4.2). Generalized from the teacher's
//! `runtime::transport::UdpTransport` (bind/recv-with-timeout/send), kept
//! nearly verbatim since the blocking-with-timeout receive idiom already
//! matches this spec's "receive loop blocks on UDP receive" suspension
//! point (spec.md §5).

use std::collections::BTreeMap;
use std::io;
use std::net::{Ipv4Addr, SocketAddr, UdpSocket};
use std::time::Duration;

use tracing::warn;

use crate::state::RouteEntry;
use crate::topology::Registry;

pub struct Transport {
    sock: UdpSocket,
}

impl Transport {
    pub fn bind(bind_port: u16) -> io::Result<Self> {
        let sock = UdpSocket::bind(("0.0.0.0", bind_port))?;
        Ok(Self { sock })
    }

    /// Block for up to `timeout` waiting for a datagram. Returns `Ok(None)`
    /// on timeout, never on a transient per-datagram error (those are
    /// logged and swallowed by the caller's decode step).
    pub fn recv(&self, timeout: Duration) -> io::Result<Option<(Vec<u8>, SocketAddr)>> {
        self.sock.set_read_timeout(Some(timeout))?;
        let mut buf = vec![0_u8; 4096];
        match self.sock.recv_from(&mut buf) {
            Ok((n, addr)) => {
                buf.truncate(n);
                Ok(Some((buf, addr)))
            }
            Err(err)
                if err.kind() == io::ErrorKind::WouldBlock
                    || err.kind() == io::ErrorKind::TimedOut =>
            {
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    /// Build one datagram from the given routing snapshot and send the
    /// identical bytes to every neighbor whose link cost is currently
    /// finite. Per-destination send failures are logged and do not abort
    /// the broadcast (spec.md §4.2).
    pub fn broadcast(
        &self,
        registry: &Registry,
        sender_ip: Ipv4Addr,
        sender_port: u16,
        routing: &BTreeMap<u32, RouteEntry>,
        live_neighbors: impl Iterator<Item = (u32, Ipv4Addr, u16)>,
    ) {
        let datagram = crate::wire::pack_update(registry, sender_port, sender_ip, routing);
        for (neighbor_id, ip, port) in live_neighbors {
            let addr = SocketAddr::from((ip, port));
            if let Err(err) = self.sock.send_to(&datagram, addr) {
                warn!("broadcast send to server {neighbor_id} at {addr} failed: {err}");
            }
        }
    }
}
