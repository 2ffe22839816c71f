//! Server configuration (spec.md §4.8): every field has the spec's default
//! baked in, so the binary runs with zero required arguments (spec.md §6).

use clap::Parser;

/// Command-line configuration for `hkv-server`.
#[derive(Debug, Clone, Parser)]
#[command(name = "hkv-server", about = "In-memory key-value server")]
pub struct ServerConfig {
    /// Address to bind the listening socket to.
    #[arg(long, default_value = "0.0.0.0")]
    pub bind: String,

    /// TCP port to listen on.
    #[arg(long, default_value_t = 1234)]
    pub port: u16,

    /// Number of background worker threads used to free large ZSets.
    #[arg(long)]
    pub workers: Option<usize>,

    /// ZSet member count above which teardown is offloaded to the worker pool.
    #[arg(long, default_value_t = 10_000)]
    pub zset_offload_threshold: usize,

    /// Maximum accepted request frame size, in bytes.
    #[arg(long, default_value_t = 32 * 1024 * 1024)]
    pub max_frame_size: u32,

    /// Maximum number of argv strings accepted in a single request.
    #[arg(long, default_value_t = 200_000)]
    pub max_argv_count: u32,

    /// Maximum number of TTL expirations processed per event-loop tick.
    #[arg(long, default_value_t = 2_000)]
    pub max_expirations_per_tick: usize,
}

impl ServerConfig {
    /// Resolves the configured worker count, defaulting to the machine's
    /// available parallelism when unset.
    pub fn worker_count(&self) -> usize {
        self.workers.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        })
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            bind: "0.0.0.0".to_string(),
            port: 1234,
            workers: None,
            zset_offload_threshold: 10_000,
            max_frame_size: 32 * 1024 * 1024,
            max_argv_count: 200_000,
            max_expirations_per_tick: 2_000,
        }
    }
}
