//! Utility functions
//!
use std::{
    fs::File,
    io::Cursor,
    path::{Path, PathBuf},
};

use anyhow::{bail, Context, Result};
use reqwest::Client;

/// Download a file from a URL to a given filepath.
pub async fn download_file(
    client: &Client,
    url: &str,
    filepath: impl AsRef<std::path::Path>,
) -> Result<()> {
    let resp = client.get(url).send().await?.error_for_status()?;

    let mut file = File::create(filepath)?;
    let mut content = Cursor::new(resp.bytes().await?);
    std::io::copy(&mut content, &mut file)?;

    Ok(())
}

/// Find the model file, downloading it into the cache directory if needed.
///
/// Looks at `model_path` first, then at the same file name in the cache directory.
pub async fn resolve_model_path(model_path: &Path, model_url: Option<&str>) -> Result<PathBuf> {
    let cache_dir = dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("detect_server");

    resolve_model_path_in(model_path, model_url, &cache_dir).await
}

async fn resolve_model_path_in(
    model_path: &Path,
    model_url: Option<&str>,
    cache_dir: &Path,
) -> Result<PathBuf> {
    if model_path.is_file() {
        return Ok(model_path.to_owned());
    }

    let file_name = model_path
        .file_name()
        .with_context(|| format!("model path {} has no file name", model_path.display()))?;
    let cached = cache_dir.join(file_name);
    if cached.is_file() {
        log::info!("Using cached model {}", cached.display());
        return Ok(cached);
    }

    let url = match model_url {
        Some(url) => url,
        None => bail!(
            "model file {} not found and no download URL given",
            model_path.display()
        ),
    };

    std::fs::create_dir_all(cache_dir)
        .with_context(|| format!("failed to create {}", cache_dir.display()))?;
    log::info!("Downloading model from {} to {}", url, cached.display());

    // Only a complete download may show up under the cached name
    let partial = cached.with_extension("part");
    if let Err(err) = download_file(&Client::new(), url, &partial).await {
        if let Err(remove_err) = std::fs::remove_file(&partial) {
            log::debug!("No partial download to remove: {}", remove_err);
        }
        return Err(err.context(format!("failed to download model from {url}")));
    }
    std::fs::rename(&partial, &cached)
        .with_context(|| format!("failed to move model into {}", cached.display()))?;

    Ok(cached)
}
