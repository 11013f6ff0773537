//! Spotless film dust removal CLI
//!
//! Detects dust on scanned film frames and writes cleaned copies next to the
//! inputs (or into `--output-dir`).

#[cfg(feature = "cli")]
use spotless_film::cli;

#[cfg(feature = "cli")]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    cli::main().await
}

#[cfg(not(feature = "cli"))]
fn main() {
    panic!("CLI feature not enabled. Please rebuild with --features cli");
}
