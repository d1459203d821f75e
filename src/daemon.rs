//! Daemon supervisor: owns R, S, W and C, starts the three concurrent
//! activities (console reader, receive loop, periodic loop) and wires
//! them together (spec.md §2, §5). No global state — everything lives in
//! one `RouterDaemon` instance per process, per spec.md §9's design note.

use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::cost::Cost;
use crate::state::RoutingState;
use crate::topology::Registry;
use crate::transport::Transport;

/// Neighbor-timeout multiplier: 3x the update interval (spec.md §4.1,
/// §5).
pub const DEAD_MULTIPLIER: f64 = 3.0;

/// State shared across the console reader, receive loop and periodic
/// loop. A single coarse mutex over S (here including `pkt_count`, which
/// the spec only requires be read-and-reset atomically — folding it into
/// the same lock as the rest of S gets that for free) is the recommended
/// design in spec.md §5 and §9.
pub struct Shared {
    pub registry: Registry,
    pub state: Mutex<RoutingState>,
    pub transport: Transport,
}

impl Shared {
    /// Build and send one broadcast datagram from the current routing
    /// snapshot to every neighbor whose link cost is currently finite.
    /// Used by both the periodic loop and the console's `step` command
    /// (spec.md §4.2's "explicit broadcast").
    pub fn broadcast_now(&self) {
        let (self_ip, self_port) = self
            .registry
            .get(self.registry.self_id)
            .expect("local node must have a registry entry");

        // Single lock acquisition: the routing snapshot and the live-neighbor
        // set must come from the same consistent view of S (spec.md §5).
        let (routing, live_neighbors) = {
            let state = self.state.lock().expect("routing state lock poisoned");
            let routing = state.snapshot_routing();
            let live_neighbors: Vec<(u32, Ipv4Addr, u16)> = state
                .neighbor_ids()
                .filter_map(|id| {
                    let cost = state.neighbor_cost(id)?;
                    if !cost.is_finite() {
                        return None;
                    }
                    let (ip, port) = self.registry.get(id)?;
                    Some((id, ip, port))
                })
                .collect();
            (routing, live_neighbors)
        };

        self.transport.broadcast(
            &self.registry,
            self_ip,
            self_port,
            &routing,
            live_neighbors.into_iter(),
        );
    }
}

pub struct RouterDaemon {
    shared: Arc<Shared>,
    running: Arc<AtomicBool>,
}

impl RouterDaemon {
    pub fn new(
        registry: Registry,
        initial_neighbors: std::collections::BTreeMap<u32, Cost>,
        update_interval_s: f64,
    ) -> Result<Self> {
        let (_self_ip, self_port) = registry
            .get(registry.self_id)
            .context("local node id has no registry entry")?;
        let transport = Transport::bind(self_port)
            .with_context(|| format!("failed to bind UDP socket on port {self_port}"))?;
        let state = RoutingState::new(registry.self_id, initial_neighbors, update_interval_s);

        Ok(Self {
            shared: Arc::new(Shared {
                registry,
                state: Mutex::new(state),
                transport,
            }),
            running: Arc::new(AtomicBool::new(true)),
        })
    }

    /// Start the receive loop and periodic loop on their own threads, run
    /// the operator console on the calling thread, and block until EOF on
    /// stdin (clean shutdown) or a `crash` console command (immediate
    /// process exit, spec.md §4.3/§6).
    pub fn run_forever(&self) -> Result<()> {
        self.install_signal_handlers()?;

        let (neighbor_ids, update_interval_s) = {
            let state = self.shared.state.lock().expect("routing state lock poisoned");
            (state.neighbor_ids().collect::<Vec<_>>(), state.update_interval_s())
        };
        info!(
            "dvrouted start: self_id={} neighbors={:?} update_interval={}s",
            self.shared.registry.self_id, neighbor_ids, update_interval_s,
        );

        let receive_handle = spawn_receive_loop(Arc::clone(&self.shared), Arc::clone(&self.running));
        let periodic_handle =
            spawn_periodic_loop(Arc::clone(&self.shared), Arc::clone(&self.running));

        crate::console::run(Arc::clone(&self.shared), Arc::clone(&self.running));

        self.running.store(false, Ordering::Relaxed);
        let _ = receive_handle.join();
        let _ = periodic_handle.join();

        info!("dvrouted stopped");
        Ok(())
    }

    fn install_signal_handlers(&self) -> Result<()> {
        let running = Arc::clone(&self.running);
        ctrlc::set_handler(move || {
            running.store(false, Ordering::Relaxed);
        })?;
        Ok(())
    }
}

/// Receive loop: single-threaded cooperative reader over the UDP socket
/// (spec.md §4.2). Decodes, resolves the sender against R, drops silently
/// on an unknown sender or decode failure, else increments `pkt_count`,
/// emits the spec-mandated console line, and hands the vector to
/// `handle_update`.
fn spawn_receive_loop(shared: Arc<Shared>, running: Arc<AtomicBool>) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        while running.load(Ordering::Relaxed) {
            let received = match shared.transport.recv(Duration::from_millis(200)) {
                Ok(received) => received,
                Err(err) => {
                    warn!("UDP receive error: {err}");
                    continue;
                }
            };
            let Some((payload, _addr)) = received else {
                continue;
            };

            let decoded = match crate::wire::unpack_update(&payload) {
                Ok(decoded) => decoded,
                Err(err) => {
                    debug!("drop malformed datagram: {err}");
                    continue;
                }
            };

            let Some(sender_id) = shared
                .registry
                .resolve(decoded.sender_ip, decoded.sender_port)
            else {
                debug!(
                    "drop datagram from unknown sender {}:{}",
                    decoded.sender_ip, decoded.sender_port
                );
                continue;
            };

            let mut state = shared.state.lock().expect("routing state lock poisoned");
            state.increment_pkt_count();
            println!("RECEIVED A MESSAGE FROM SERVER {sender_id}");
            state.handle_update(sender_id, decoded.vector);
        }
    })
}

/// Granularity of the periodic loop's shutdown check, matching the receive
/// loop's own poll interval so `crash`/EOF shutdown is promptly noticed
/// regardless of how large `update_interval` is.
const SHUTDOWN_POLL: Duration = Duration::from_millis(200);

/// Sleep for `total`, checking `running` every `SHUTDOWN_POLL` so a shutdown
/// signalled mid-sleep doesn't block process exit until the full interval
/// elapses. Returns `false` if shutdown was observed before `total` elapsed.
fn sleep_interruptible(total: Duration, running: &AtomicBool) -> bool {
    let mut remaining = total;
    while remaining > Duration::ZERO {
        if !running.load(Ordering::Relaxed) {
            return false;
        }
        let slice = remaining.min(SHUTDOWN_POLL);
        thread::sleep(slice);
        remaining -= slice;
    }
    running.load(Ordering::Relaxed)
}

/// Periodic loop: sleeps for `update_interval` seconds, then runs
/// maintenance and broadcasts — the first broadcast therefore occurs one
/// interval after startup, not immediately (spec.md §4.2). The sleep is
/// sliced so a shutdown signalled mid-interval is noticed promptly instead
/// of blocking process exit for up to a full interval.
fn spawn_periodic_loop(shared: Arc<Shared>, running: Arc<AtomicBool>) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let interval_s = shared
            .state
            .lock()
            .expect("routing state lock poisoned")
            .update_interval_s();
        let interval = Duration::from_secs_f64(interval_s.max(0.0));

        while running.load(Ordering::Relaxed) {
            if !sleep_interruptible(interval, &running) {
                break;
            }
            {
                let mut state = shared.state.lock().expect("routing state lock poisoned");
                state.maintenance(DEAD_MULTIPLIER);
            }
            shared.broadcast_now();
        }
    })
}
