//! Operator console C: a line-oriented, blocking reader on standard input
//! (spec.md §4.3). Each line is whitespace-tokenized; the first token is
//! the command, lowercased. Every command emits exactly one line ending
//! in `SUCCESS`, `invalid_arguments`, `not_a_neighbor`, or
//! `unknown_command` (spec.md §7); `packets` and `display` print extra
//! data lines before their terminator.

use std::io::{self, BufRead};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::daemon::Shared;

pub fn run(shared: Arc<Shared>, running: Arc<AtomicBool>) {
    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        if !running.load(Ordering::Relaxed) {
            return;
        }
        let line = match line {
            Ok(line) => line,
            Err(_) => return,
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let mut tokens = line.split_whitespace();
        let cmd = tokens.next().unwrap_or_default().to_ascii_lowercase();
        let args: Vec<&str> = tokens.collect();

        dispatch(&shared, &cmd, &args);
    }
}

fn dispatch(shared: &Arc<Shared>, cmd: &str, args: &[&str]) {
    match cmd {
        "update" => cmd_update(shared, args),
        "step" => cmd_step(shared),
        "packets" => cmd_packets(shared),
        "display" => cmd_display(shared),
        "disable" => cmd_disable(shared, args),
        "crash" => cmd_crash(shared),
        other => println!("{other} unknown_command"),
    }
}

fn cmd_update(shared: &Arc<Shared>, args: &[&str]) {
    let [a, b, cost] = args else {
        println!("update invalid_arguments");
        return;
    };
    let (Ok(a), Ok(b)) = (a.parse::<u32>(), b.parse::<u32>()) else {
        println!("update invalid_arguments");
        return;
    };

    let mut state = shared.state.lock().expect("routing state lock poisoned");
    state.update_link(a, b, cost);
    println!("update SUCCESS");
}

fn cmd_step(shared: &Arc<Shared>) {
    shared.broadcast_now();
    println!("step SUCCESS");
}

fn cmd_packets(shared: &Arc<Shared>) {
    let count = shared
        .state
        .lock()
        .expect("routing state lock poisoned")
        .take_pkt_count();
    println!("{count}");
    println!("packets SUCCESS");
}

fn cmd_display(shared: &Arc<Shared>) {
    let routing = shared
        .state
        .lock()
        .expect("routing state lock poisoned")
        .snapshot_routing();
    for (dest, entry) in routing {
        let next_hop = entry.next_hop.map(|id| id as i64).unwrap_or(-1);
        println!("{dest} {next_hop} {}", entry.cost.to_display());
    }
    println!("display SUCCESS");
}

fn cmd_disable(shared: &Arc<Shared>, args: &[&str]) {
    let [id] = args else {
        println!("disable invalid_arguments");
        return;
    };
    let Ok(id) = id.parse::<u32>() else {
        println!("disable invalid_arguments");
        return;
    };

    let mut state = shared.state.lock().expect("routing state lock poisoned");
    match state.neighbor_cost(id) {
        Some(cost) if cost.is_finite() => {
            state.update_link(shared.registry.self_id, id, "inf");
            println!("disable SUCCESS");
        }
        _ => println!("disable not_a_neighbor"),
    }
}

fn cmd_crash(shared: &Arc<Shared>) {
    let neighbor_ids: Vec<u32> = {
        let state = shared.state.lock().expect("routing state lock poisoned");
        state.neighbor_ids().collect()
    };
    {
        let mut state = shared.state.lock().expect("routing state lock poisoned");
        for id in neighbor_ids {
            state.update_link(shared.registry.self_id, id, "inf");
        }
    }
    println!("crash SUCCESS");
    std::process::exit(0);
}
