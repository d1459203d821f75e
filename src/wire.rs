//! UDP datagram wire format (spec.md §4.2): network byte order, unpadded.
//!
//! ```text
//! offset   size  field
//! 0        2     number of entries N
//! 2        2     sender UDP port
//! 4        4     sender IPv4 address
//! 8+12*i   4     entry i: destination IPv4
//! 12+12*i  2     entry i: destination UDP port
//! 14+12*i  2     entry i: destination server id
//! 16+12*i  2     entry i: advertised cost (0xFFFF = infinity)
//! ```
//! N always equals the size of the topology registry R; every known server
//! appears in every broadcast, even unreachable ones, to keep the layout
//! fixed-size (spec.md §9).

use std::collections::BTreeMap;
use std::net::Ipv4Addr;

use anyhow::{bail, Result};

use crate::cost::Cost;
use crate::topology::Registry;

const HEADER_LEN: usize = 8;
const ENTRY_LEN: usize = 12;

/// Build a broadcast datagram from a snapshot of `routing`, covering every
/// server in R in ascending id order (not just entries present in
/// `routing`).
pub fn pack_update(
    registry: &Registry,
    sender_port: u16,
    sender_ip: Ipv4Addr,
    routing: &BTreeMap<u32, crate::state::RouteEntry>,
) -> Vec<u8> {
    let ids: Vec<u32> = registry.ids().collect();
    let mut buf = Vec::with_capacity(HEADER_LEN + ENTRY_LEN * ids.len());

    buf.extend_from_slice(&(ids.len() as u16).to_be_bytes());
    buf.extend_from_slice(&sender_port.to_be_bytes());
    buf.extend_from_slice(&sender_ip.octets());

    for dest_id in ids {
        let (dest_ip, dest_port) = registry
            .get(dest_id)
            .expect("id came from registry.ids(), must resolve");
        let cost = routing
            .get(&dest_id)
            .map(|entry| entry.cost)
            .unwrap_or(Cost::Infinity);

        buf.extend_from_slice(&dest_ip.octets());
        buf.extend_from_slice(&dest_port.to_be_bytes());
        buf.extend_from_slice(&(dest_id as u16).to_be_bytes());
        buf.extend_from_slice(&cost.to_wire().to_be_bytes());
    }

    buf
}

pub struct DecodedUpdate {
    pub sender_ip: Ipv4Addr,
    pub sender_port: u16,
    pub vector: BTreeMap<u32, Cost>,
}

/// Decode a received datagram into the sender's advertised (ip, port) and
/// its distance vector. Does not resolve the sender to a server id —
/// that's the receive loop's job (spec.md §4.2: "resolve sender_id by
/// exact (ip, port) match against R"), so this function alone can be
/// round-trip tested without a registry in scope.
pub fn unpack_update(data: &[u8]) -> Result<DecodedUpdate> {
    if data.len() < HEADER_LEN {
        bail!("datagram shorter than the {HEADER_LEN}-byte header");
    }

    let num_entries = u16::from_be_bytes([data[0], data[1]]) as usize;
    let sender_port = u16::from_be_bytes([data[2], data[3]]);
    let sender_ip = Ipv4Addr::new(data[4], data[5], data[6], data[7]);

    let expected_len = HEADER_LEN + ENTRY_LEN * num_entries;
    if data.len() < expected_len {
        bail!(
            "datagram truncated: expected {expected_len} bytes for {num_entries} entries, got {}",
            data.len()
        );
    }

    let mut vector = BTreeMap::new();
    for i in 0..num_entries {
        let base = HEADER_LEN + ENTRY_LEN * i;
        let dest_id = u16::from_be_bytes([data[base + 6], data[base + 7]]) as u32;
        let cost_raw = u16::from_be_bytes([data[base + 8], data[base + 9]]);
        vector.insert(dest_id, Cost::from_wire(cost_raw));
    }

    Ok(DecodedUpdate {
        sender_ip,
        sender_port,
        vector,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::RouteEntry;

    fn two_server_registry() -> Registry {
        let mut raw = String::from("2\n1\n");
        raw.push_str("1 10.0.0.1 5001\n2 10.0.0.2 5002\n");
        raw.push_str("1 2 7\n");
        crate::topology::parse(&raw).expect("fixture topology parses").registry
    }

    #[test]
    fn pack_update_has_fixed_length() {
        let registry = two_server_registry();
        let mut routing = BTreeMap::new();
        routing.insert(1, RouteEntry { next_hop: None, cost: Cost::Finite(0) });
        routing.insert(2, RouteEntry { next_hop: Some(2), cost: Cost::Finite(7) });

        let datagram = pack_update(&registry, 5001, Ipv4Addr::new(10, 0, 0, 1), &routing);
        assert_eq!(datagram.len(), HEADER_LEN + ENTRY_LEN * registry.len());
    }

    #[test]
    fn pack_then_unpack_round_trips_costs() {
        let registry = two_server_registry();
        let mut routing = BTreeMap::new();
        routing.insert(1, RouteEntry { next_hop: None, cost: Cost::Finite(0) });
        routing.insert(2, RouteEntry { next_hop: Some(2), cost: Cost::Finite(7) });

        let datagram = pack_update(&registry, 5001, Ipv4Addr::new(10, 0, 0, 1), &routing);
        let decoded = unpack_update(&datagram).expect("decode should succeed");

        assert_eq!(decoded.sender_port, 5001);
        assert_eq!(decoded.sender_ip, Ipv4Addr::new(10, 0, 0, 1));
        assert_eq!(decoded.vector.get(&1), Some(&Cost::Finite(0)));
        assert_eq!(decoded.vector.get(&2), Some(&Cost::Finite(7)));
    }

    #[test]
    fn unreachable_destination_encodes_as_wire_infinity() {
        let registry = two_server_registry();
        let routing = BTreeMap::new(); // no entry for server 2 at all

        let datagram = pack_update(&registry, 5001, Ipv4Addr::new(10, 0, 0, 1), &routing);
        let decoded = unpack_update(&datagram).unwrap();
        assert_eq!(decoded.vector.get(&2), Some(&Cost::Infinity));
    }

    #[test]
    fn unpack_rejects_truncated_datagram() {
        let bytes = [0u8, 1, 0, 0, 10, 0, 0, 1]; // claims 1 entry, has 0
        assert!(unpack_update(&bytes).is_err());
    }
}
