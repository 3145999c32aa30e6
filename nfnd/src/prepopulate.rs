use std::path::Path;

use anyhow::Context;
use log::{debug, info, warn};
use nfn_core::{Packet, WireCodec};
use nfn_relay::Relay;

/// Load every encoded Content packet in `dir` into the cache as static
/// content. Files that cannot be read or decoded are skipped. Returns the
/// number of entries loaded.
pub async fn load_directory(relay: &mut Relay, codec: &dyn WireCodec, dir: &Path) -> anyhow::Result<usize> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .with_context(|| format!("opening data directory {}", dir.display()))?;
    info!("Populating cache from {}", dir.display());

    let mut loaded = 0;
    while let Some(entry) = entries.next_entry().await? {
        let file_name = entry.file_name();
        if file_name.to_string_lossy().starts_with('.') {
            continue;
        }
        let path = entry.path();
        if !entry.file_type().await?.is_file() {
            continue;
        }

        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Skipping {}: {}", path.display(), e);
                continue;
            }
        };
        if bytes.len() < 2 {
            warn!("Skipping {}: only {} bytes", path.display(), bytes.len());
            continue;
        }

        let content = match codec.decode(&bytes) {
            Ok(Packet::Content(content)) => content,
            Ok(Packet::Interest(interest)) => {
                warn!("Skipping {}: holds an Interest for {}", path.display(), interest.prefix);
                continue;
            }
            Err(e) => {
                warn!("Skipping {}: {}", path.display(), e);
                continue;
            }
        };

        let name = content.name.to_string();
        match relay.cache_content(content, true) {
            Ok(_) => {
                debug!("Loaded {} from {}", name, path.display());
                loaded += 1;
            }
            Err(e) => warn!("Not caching {}: {}", name, e),
        }
    }

    info!("Loaded {} cache entries", loaded);
    Ok(loaded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nfn_core::{Content, Interest, NdnTlvCodec, Prefix};
    use nfn_relay::RelayConfig;

    #[tokio::test]
    async fn test_loads_content_and_skips_the_rest() {
        let dir = tempfile::tempdir().unwrap();
        let codec = NdnTlvCodec;
        let content = Content::new(Prefix::from_uri("/docs/a").unwrap(), b"alpha".to_vec());
        std::fs::write(dir.path().join("a.ndntlv"), codec.encode_content(&content).unwrap()).unwrap();
        let interest = Interest::new(Prefix::from_uri("/docs/b").unwrap()).with_nonce(1);
        std::fs::write(dir.path().join("b.ndntlv"), codec.encode_interest(&interest).unwrap()).unwrap();
        std::fs::write(dir.path().join("garbage"), b"\xff\xff\xff").unwrap();
        std::fs::write(dir.path().join(".hidden"), codec.encode_content(&content).unwrap()).unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();

        let mut relay = Relay::new(RelayConfig::default()).unwrap();
        let loaded = load_directory(&mut relay, &codec, dir.path()).await.unwrap();
        assert_eq!(loaded, 1);

        let entry = relay.content_store().get(&content.name).unwrap();
        assert_eq!(entry.content.payload, b"alpha");
        assert!(entry.flags.is_static);
    }

    #[tokio::test]
    async fn test_missing_directory() {
        let mut relay = Relay::new(RelayConfig::default()).unwrap();
        let result = load_directory(&mut relay, &NdnTlvCodec, Path::new("/nonexistent/nfn-data")).await;
        assert!(result.is_err());
    }
}
