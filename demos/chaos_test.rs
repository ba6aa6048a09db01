// demos/chaos_test.rs
// Run with: cargo run --example chaos_test
//
// Spawns a handful of test_backend instances and randomly kills/restarts
// them, for poking at the load balancer's reactive eviction and proactive
// recovery behavior by hand while requests are in flight.

use rand::Rng;
use std::collections::HashMap;
use std::process::{Child, Command};
use tokio::time::{sleep, Duration};

const PORTS: [u16; 3] = [9001, 9002, 9003];

fn spawn_backend(port: u16) -> Child {
    Command::new("cargo")
        .args(["run", "--quiet", "--example", "test_backend", "--", &port.to_string()])
        .spawn()
        .expect("failed to start test_backend")
}

#[tokio::main]
async fn main() {
    let mut children: HashMap<u16, Child> = PORTS.iter().map(|&p| (p, spawn_backend(p))).collect();
    sleep(Duration::from_secs(2)).await;

    loop {
        let port = PORTS[rand::thread_rng().gen_range(0..PORTS.len())];

        println!("killing backend on port {port}");
        if let Some(mut child) = children.remove(&port) {
            let _ = child.kill();
            let _ = child.wait();
        }

        let down_for = Duration::from_secs(rand::thread_rng().gen_range(5..30));
        sleep(down_for).await;

        println!("restarting backend on port {port}");
        children.insert(port, spawn_backend(port));
        sleep(Duration::from_secs(2)).await;
    }
}
