//! SOCKS endpoint list output
//!
//! One `127.0.0.1:<port>` line per instance, for client tooling that
//! consumes the cluster as a plain proxy list.

use std::path::Path;

use tracing::info;

use crate::error::Result;

/// Write the endpoint list, truncating any existing file
pub async fn write_endpoint_list(path: &Path, count: u16, base_proxy_port: u16) -> Result<()> {
    let mut out = String::new();
    for n in 0..count {
        out.push_str("127.0.0.1:");
        out.push_str(&(base_proxy_port + n).to_string());
        out.push('\n');
    }

    tokio::fs::write(path, out).await?;
    info!("Wrote {} proxy endpoints to {}", count, path.display());
    Ok(())
}
