//! Offline background removal CLI
//!
//! Thin wrapper around [`offline_bgremove::cli::main`].

#[cfg(feature = "cli")]
use offline_bgremove::cli;

#[cfg(feature = "cli")]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    cli::main().await
}

#[cfg(not(feature = "cli"))]
fn main() {
    eprintln!("CLI feature not enabled. Please rebuild with --features cli");
    std::process::exit(2);
}
