//! Connect, authenticate if credentials are configured, ping and evaluate
//! a trivial expression.
//!
//! ```text
//! RUST_LOG=tarantool_wire=debug cargo run --example ping -- [options.json]
//! ```

use tarantool_wire::{Client, ConnectionOptions};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let options = match std::env::args().nth(1) {
        Some(path) => ConnectionOptions::from_file(path)?,
        None => ConnectionOptions::default(),
    };
    let has_credentials = options.username.is_some();

    let client = Client::new(options);
    client.connect().await?;
    tracing::info!("Connected to {}", client.options().address());

    if has_credentials {
        client.login().await?;
        tracing::info!("Authenticated");
    }

    client.ping().await?;
    let answer = client.eval("return 1 + ...", &(41,)).await?;
    println!("1 + 41 = {}", answer);

    client.destroy(false).await?;
    Ok(())
}
