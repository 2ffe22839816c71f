//! Throughput and latency microbenchmark for the key-value store.
//!
//! Two modes:
//! - `engine` drives `hkv_engine::Keyspace` directly in-process, isolating
//!   the data-structure core from any socket overhead.
//! - `client` spins up a real `EventLoop` on loopback and drives it through
//!   `hkv-client`, measuring the whole stack including the wire protocol.
//!
//! Arguments are parsed by hand rather than pulling in a CLI crate, since a
//! throwaway bench binary has no argument surface worth a derive macro.

use std::env;
use std::process::ExitCode;
use std::thread;
use std::time::{Duration, Instant};

use hkv_client::{ClientConfig, KVClient};
use hkv_engine::Keyspace;
use hkv_server::{EventLoop, ServerConfig};
use mio::Events;

struct Args {
    mode: String,
    ops: usize,
    keyspace_size: usize,
    threads: usize,
}

impl Args {
    fn parse() -> Self {
        let mut mode = "engine".to_string();
        let mut ops = 200_000usize;
        let mut keyspace_size = 10_000usize;
        let mut threads = 1usize;

        let mut it = env::args().skip(1);
        while let Some(arg) = it.next() {
            match arg.as_str() {
                "--mode" => mode = it.next().unwrap_or(mode),
                "--ops" => ops = it.next().and_then(|v| v.parse().ok()).unwrap_or(ops),
                "--keys" => {
                    keyspace_size = it.next().and_then(|v| v.parse().ok()).unwrap_or(keyspace_size)
                }
                "--threads" => threads = it.next().and_then(|v| v.parse().ok()).unwrap_or(threads),
                other => {
                    eprintln!("unrecognized argument: {other}");
                }
            }
        }

        Args { mode, ops, keyspace_size, threads }
    }
}

/// Small, fast, non-cryptographic PRNG; deterministic seeding keeps bench
/// runs reproducible across invocations.
struct XorShift64(u64);

impl XorShift64 {
    fn new(seed: u64) -> Self {
        XorShift64(seed | 1)
    }

    fn next_u64(&mut self) -> u64 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.0 = x;
        x
    }

    fn next_key(&mut self, keyspace_size: usize) -> String {
        format!("key:{}", self.next_u64() as usize % keyspace_size)
    }
}

fn main() -> ExitCode {
    let args = Args::parse();
    match args.mode.as_str() {
        "engine" => run_engine_bench(&args),
        "client" => run_client_bench(&args),
        other => {
            eprintln!("unknown --mode {other} (expected \"engine\" or \"client\")");
            return ExitCode::FAILURE;
        }
    }
    ExitCode::SUCCESS
}

fn run_engine_bench(args: &Args) {
    let mut keyspace = Keyspace::new(1, 10_000);
    let mut rng = XorShift64::new(0xC0FFEE);

    let started = Instant::now();
    for _ in 0..args.ops {
        let key = rng.next_key(args.keyspace_size);
        if rng.next_u64() % 5 == 0 {
            let _ = keyspace.get(key.as_bytes());
        } else {
            keyspace.set(key.as_bytes(), b"v".to_vec());
        }
    }
    let elapsed = started.elapsed();
    report("engine", args.ops, elapsed);
}

fn run_client_bench(args: &Args) {
    let config = ServerConfig {
        bind: "127.0.0.1".to_string(),
        port: 0,
        workers: Some(2),
        zset_offload_threshold: 10_000,
        max_frame_size: 32 * 1024 * 1024,
        max_argv_count: 200_000,
        max_expirations_per_tick: 2_000,
    };
    let mut event_loop = EventLoop::bind(config).expect("bind");
    let addr = event_loop.local_addr().expect("addr").to_string();

    thread::spawn(move || {
        let mut events = Events::with_capacity(256);
        loop {
            if event_loop.run_once(&mut events).is_err() {
                return;
            }
        }
    });
    // Give the accept loop a moment to be ready for the first connection.
    thread::sleep(Duration::from_millis(20));

    let ops_per_thread = args.ops / args.threads.max(1);
    let started = Instant::now();

    let handles: Vec<_> = (0..args.threads)
        .map(|t| {
            let addr = addr.clone();
            let keyspace_size = args.keyspace_size;
            thread::spawn(move || {
                let client = KVClient::with_config(ClientConfig {
                    addr,
                    max_idle: 1,
                    max_total: 1,
                    read_timeout: Some(Duration::from_secs(5)),
                    write_timeout: Some(Duration::from_secs(5)),
                    connect_timeout: Some(Duration::from_secs(5)),
                })
                .expect("client");

                let mut rng = XorShift64::new(0xC0FFEE ^ t as u64);
                for _ in 0..ops_per_thread {
                    let key = rng.next_key(keyspace_size);
                    if rng.next_u64() % 5 == 0 {
                        let _ = client.get(key.as_bytes());
                    } else {
                        let _ = client.set(key.as_bytes(), b"v");
                    }
                }
            })
        })
        .collect();

    for handle in handles {
        let _ = handle.join();
    }
    let elapsed = started.elapsed();
    report("client", ops_per_thread * args.threads, elapsed);
}

fn report(mode: &str, ops: usize, elapsed: Duration) {
    let secs = elapsed.as_secs_f64();
    let ops_per_sec = ops as f64 / secs.max(f64::EPSILON);
    println!("mode={mode} ops={ops} elapsed={elapsed:?} ops_per_sec={ops_per_sec:.0}");
}
