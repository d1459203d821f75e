//! Routing state S: the authoritative per-node distance-vector data model
//! and the Bellman-Ford-with-poison-reverse recompute step that is the
//! single writer of `routing`. This is THE CORE's largest component
//! (spec.md §2: ~35%).

use std::collections::BTreeMap;
use std::time::Instant;

use crate::cost::Cost;

/// One entry of `routing`: next hop (`None` only for the self route) and
/// the cost to reach the destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteEntry {
    pub next_hop: Option<u32>,
    pub cost: Cost,
}

pub struct RoutingState {
    self_id: u32,
    neighbors: BTreeMap<u32, Cost>,
    neighbor_vectors: BTreeMap<u32, BTreeMap<u32, Cost>>,
    last_seen: BTreeMap<u32, Instant>,
    routing: BTreeMap<u32, RouteEntry>,
    pkt_count: u64,
    update_interval_s: f64,
}

impl RoutingState {
    /// `init(self_id, initial_neighbors, update_interval)` (spec.md §4.1).
    pub fn new(self_id: u32, initial_neighbors: BTreeMap<u32, Cost>, update_interval_s: f64) -> Self {
        let now = Instant::now();
        let mut last_seen = BTreeMap::new();
        let mut routing = BTreeMap::new();

        routing.insert(
            self_id,
            RouteEntry {
                next_hop: None,
                cost: Cost::Finite(0),
            },
        );
        for (&neighbor, &cost) in &initial_neighbors {
            last_seen.insert(neighbor, now);
            if cost.is_finite() {
                routing.insert(
                    neighbor,
                    RouteEntry {
                        next_hop: Some(neighbor),
                        cost,
                    },
                );
            }
        }

        Self {
            self_id,
            neighbors: initial_neighbors,
            neighbor_vectors: BTreeMap::new(),
            last_seen,
            routing,
            pkt_count: 0,
            update_interval_s,
        }
    }

    pub fn self_id(&self) -> u32 {
        self.self_id
    }

    pub fn update_interval_s(&self) -> f64 {
        self.update_interval_s
    }

    /// Direct neighbor ids, regardless of current link cost (spec.md
    /// GLOSSARY: "Neighbor" membership never changes after init).
    pub fn neighbor_ids(&self) -> impl Iterator<Item = u32> + '_ {
        self.neighbors.keys().copied()
    }

    pub fn neighbor_cost(&self, id: u32) -> Option<Cost> {
        self.neighbors.get(&id).copied()
    }

    pub fn is_neighbor(&self, id: u32) -> bool {
        self.neighbors.contains_key(&id)
    }

    /// `snapshot_routing()` (spec.md §4.1): a consistent copy for console
    /// display or packet serialization, in destination-id-sorted order
    /// (BTreeMap already iterates that way).
    pub fn snapshot_routing(&self) -> BTreeMap<u32, RouteEntry> {
        self.routing.clone()
    }

    pub fn route_to(&self, destination: u32) -> Option<RouteEntry> {
        self.routing.get(&destination).copied()
    }

    /// Read-and-reset of `pkt_count` for the console `packets` command.
    pub fn take_pkt_count(&mut self) -> u64 {
        std::mem::take(&mut self.pkt_count)
    }

    pub fn increment_pkt_count(&mut self) {
        self.pkt_count += 1;
    }

    /// `update_link(a, b, cost)` (spec.md §4.1). `cost_token` is the raw
    /// console/topology token ("inf" or a decimal integer). No-ops (but
    /// the console still acknowledges) if this node is neither endpoint.
    pub fn update_link(&mut self, a: u32, b: u32, cost_token: &str) {
        if self.self_id != a && self.self_id != b {
            return;
        }
        let other = if self.self_id == a { b } else { a };
        let new_cost = Cost::parse(cost_token);

        self.neighbors.insert(other, new_cost);
        if !new_cost.is_finite() {
            self.neighbor_vectors.remove(&other);
        }
        self.recompute();
    }

    /// `handle_update(sender_id, vector)` (spec.md §4.1), invoked by the
    /// wire transport after decoding a datagram.
    pub fn handle_update(&mut self, sender_id: u32, vector: BTreeMap<u32, Cost>) {
        self.last_seen.insert(sender_id, Instant::now());

        let Some(link_cost) = self.neighbors.get(&sender_id).copied() else {
            // Unknown sender: W should have dropped this before it reaches
            // S, but S stays total and just ignores it defensively.
            return;
        };
        if !link_cost.is_finite() {
            // A dead link's neighbor keeps its last_seen refreshed but its
            // vector is discarded — preserved as-is per spec.md §9 open
            // questions (means a still-transmitting dead neighbor never
            // times out).
            return;
        }

        self.neighbor_vectors.insert(sender_id, vector);
        self.recompute();
    }

    /// `maintenance()` (spec.md §4.1), invoked by the wire transport on
    /// each periodic tick.
    pub fn maintenance(&mut self, dead_multiplier: f64) {
        let now = Instant::now();
        let timeout_s = dead_multiplier * self.update_interval_s;
        let mut expired = false;

        let stale: Vec<u32> = self
            .neighbors
            .iter()
            .filter(|(_, cost)| cost.is_finite())
            .filter(|(id, _)| {
                // A neighbor with no `last_seen` entry at all (e.g. one added
                // after init via `update_link` with a finite cost, which
                // never seeds `last_seen`) defaults to "never seen", which
                // is always stale — matches `original_source/logic.py`'s
                // `last_seen.get(nid, 0.0)` defaulting to epoch 0.0.
                self.last_seen
                    .get(id)
                    .map(|seen| now.duration_since(*seen).as_secs_f64())
                    .unwrap_or(f64::INFINITY)
                    > timeout_s
            })
            .map(|(id, _)| *id)
            .collect();

        for id in stale {
            self.neighbors.insert(id, Cost::Infinity);
            self.neighbor_vectors.remove(&id);
            expired = true;
        }

        if expired {
            self.recompute();
        }
    }

    /// Bellman-Ford with poison reverse (spec.md §4.1 step-by-step
    /// algorithm). The sole writer of `routing`; installs a freshly built
    /// table as a single assignment so readers never observe a torn
    /// half-recomputed table.
    fn recompute(&mut self) {
        let mut table: BTreeMap<u32, RouteEntry> = BTreeMap::new();
        table.insert(
            self.self_id,
            RouteEntry {
                next_hop: None,
                cost: Cost::Finite(0),
            },
        );
        for (&neighbor, &cost) in &self.neighbors {
            if cost.is_finite() {
                table.insert(
                    neighbor,
                    RouteEntry {
                        next_hop: Some(neighbor),
                        cost,
                    },
                );
            }
        }

        let mut destinations: Vec<u32> = table.keys().copied().collect();
        for vector in self.neighbor_vectors.values() {
            destinations.extend(vector.keys().copied());
        }
        destinations.sort_unstable();
        destinations.dedup();

        for dest in destinations {
            if dest == self.self_id {
                continue;
            }

            let mut best = table
                .get(&dest)
                .copied()
                .unwrap_or(RouteEntry { next_hop: None, cost: Cost::Infinity });

            for (&neighbor, &link_cost) in &self.neighbors {
                if !link_cost.is_finite() {
                    continue;
                }
                let empty = BTreeMap::new();
                let vector = self.neighbor_vectors.get(&neighbor).unwrap_or(&empty);
                let advertised = vector.get(&dest).copied().unwrap_or(Cost::Infinity);

                // Poison-reverse filter (spec.md §4.1): if the neighbor
                // advertises zero cost to us, it believes it IS us or
                // routes to us directly, so any path it advertises to a
                // different destination may loop through us.
                let neighbor_cost_to_us = vector.get(&self.self_id).copied().unwrap_or(Cost::Infinity);
                if neighbor_cost_to_us == Cost::Finite(0) && dest != neighbor {
                    continue;
                }

                let candidate_cost = link_cost + advertised;
                if candidate_cost < best.cost {
                    best = RouteEntry {
                        next_hop: Some(neighbor),
                        cost: candidate_cost,
                    };
                }
            }

            if best.cost.is_finite() {
                table.insert(dest, best);
            }
        }

        self.routing = table;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn neighbors(pairs: &[(u32, Cost)]) -> BTreeMap<u32, Cost> {
        pairs.iter().copied().collect()
    }

    #[test]
    fn init_installs_self_route_and_direct_neighbors() {
        let s = RoutingState::new(1, neighbors(&[(2, Cost::Finite(1)), (3, Cost::Infinity)]), 1.0);
        assert_eq!(
            s.route_to(1),
            Some(RouteEntry { next_hop: None, cost: Cost::Finite(0) })
        );
        assert_eq!(
            s.route_to(2),
            Some(RouteEntry { next_hop: Some(2), cost: Cost::Finite(1) })
        );
        assert_eq!(s.route_to(3), None);
    }

    #[test]
    fn handle_update_learns_multihop_route() {
        let mut s = RoutingState::new(1, neighbors(&[(2, Cost::Finite(1))]), 1.0);
        let mut vector = BTreeMap::new();
        vector.insert(3, Cost::Finite(1));
        vector.insert(1, Cost::Finite(1));
        s.handle_update(2, vector);

        assert_eq!(
            s.route_to(3),
            Some(RouteEntry { next_hop: Some(2), cost: Cost::Finite(2) })
        );
    }

    #[test]
    fn handle_update_from_down_link_is_discarded_but_marks_last_seen() {
        let mut s = RoutingState::new(1, neighbors(&[(2, Cost::Infinity)]), 1.0);
        let mut vector = BTreeMap::new();
        vector.insert(3, Cost::Finite(1));
        s.handle_update(2, vector);
        assert_eq!(s.route_to(3), None);
    }

    #[test]
    fn update_link_to_infinity_drops_neighbor_vector_and_routes() {
        let mut s = RoutingState::new(1, neighbors(&[(2, Cost::Finite(1))]), 1.0);
        let mut vector = BTreeMap::new();
        vector.insert(3, Cost::Finite(1));
        s.handle_update(2, vector);
        assert!(s.route_to(3).is_some());

        s.update_link(1, 2, "inf");
        assert_eq!(s.neighbor_cost(2), Some(Cost::Infinity));
        assert_eq!(s.route_to(3), None);
        assert_eq!(s.route_to(2), None);
    }

    #[test]
    fn update_link_ignored_when_self_not_an_endpoint() {
        let mut s = RoutingState::new(1, neighbors(&[(2, Cost::Finite(1))]), 1.0);
        s.update_link(2, 3, "5");
        assert_eq!(s.neighbor_cost(2), Some(Cost::Finite(1)));
        assert_eq!(s.is_neighbor(3), false);
    }

    #[test]
    fn poison_reverse_blocks_route_when_neighbor_advertises_zero_cost_to_us() {
        // Node 2 thinks its cost to node 1 (us) is 0 — e.g. it believes it
        // IS us — and separately advertises a route to node 3. We must
        // refuse to adopt that route to 3 through node 2.
        let mut s = RoutingState::new(1, neighbors(&[(2, Cost::Finite(1))]), 1.0);
        let mut vector = BTreeMap::new();
        vector.insert(1, Cost::Finite(0));
        vector.insert(3, Cost::Finite(2));
        s.handle_update(2, vector);

        assert_eq!(s.route_to(3), None);
    }

    #[test]
    fn poison_reverse_does_not_block_the_neighbor_itself() {
        let mut s = RoutingState::new(1, neighbors(&[(2, Cost::Finite(1))]), 1.0);
        let mut vector = BTreeMap::new();
        vector.insert(1, Cost::Finite(0));
        s.handle_update(2, vector);

        // Direct route to the neighbor itself is unaffected by the filter
        // (d == n is exempted).
        assert_eq!(
            s.route_to(2),
            Some(RouteEntry { next_hop: Some(2), cost: Cost::Finite(1) })
        );
    }

    #[test]
    fn tie_breaks_favor_the_direct_neighbor_entry() {
        // Node 1 has a direct link to 2 at cost 5. Node 3 advertises a
        // route to 2 at cost 5 as well (via node 1's link to node 3 at
        // cost also arranged to tie). Strict "<" in the recompute means
        // the initial direct entry wins ties.
        let mut s = RoutingState::new(
            1,
            neighbors(&[(2, Cost::Finite(5)), (3, Cost::Finite(5))]),
            1.0,
        );
        let mut vector = BTreeMap::new();
        vector.insert(2, Cost::Finite(0));
        s.handle_update(3, vector);

        assert_eq!(
            s.route_to(2),
            Some(RouteEntry { next_hop: Some(2), cost: Cost::Finite(5) })
        );
    }

    #[test]
    fn maintenance_times_out_silent_neighbor() {
        let mut s = RoutingState::new(1, neighbors(&[(2, Cost::Finite(1))]), 0.0);
        // A zero update interval means any elapsed time exceeds the
        // 3x-multiplier timeout immediately.
        std::thread::sleep(std::time::Duration::from_millis(5));
        s.maintenance(3.0);
        assert_eq!(s.neighbor_cost(2), Some(Cost::Infinity));
        assert_eq!(s.route_to(2), None);
    }

    #[test]
    fn maintenance_times_out_phantom_neighbor_with_no_last_seen_entry() {
        // A neighbor added after init via `update_link` (not part of the
        // initial topology) never gets a `last_seen` entry from `init` or
        // `handle_update`. `maintenance` must still treat it as stale —
        // never-seen defaults to "always stale", not "never stale".
        let mut s = RoutingState::new(1, BTreeMap::new(), 1.0);
        s.update_link(1, 2, "5");
        assert_eq!(s.neighbor_cost(2), Some(Cost::Finite(5)));

        s.maintenance(3.0);
        assert_eq!(s.neighbor_cost(2), Some(Cost::Infinity));
        assert_eq!(s.route_to(2), None);
    }

    #[test]
    fn take_pkt_count_resets_to_zero() {
        let mut s = RoutingState::new(1, BTreeMap::new(), 1.0);
        s.increment_pkt_count();
        s.increment_pkt_count();
        assert_eq!(s.take_pkt_count(), 2);
        assert_eq!(s.take_pkt_count(), 0);
    }
}
