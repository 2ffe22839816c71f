use clap::Parser;
use hkv_server::{EventLoop, ServerConfig};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = ServerConfig::parse();
    let mut event_loop = EventLoop::bind(config)?;
    let addr = event_loop.local_addr()?;
    tracing::info!(%addr, "hkv-server listening");

    event_loop.run()?;
    Ok(())
}
