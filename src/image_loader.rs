//! Image Loader Module
//!
//! Fetches and decodes the gallery images before the document is assembled.
//! Loads run in parallel; each one is bounded by a timeout and the step
//! finishes only when every image has loaded, failed or timed out. Failed
//! images are dropped from the report, never replaced by a placeholder.

use anyhow::{Context, Result, anyhow, bail};
use base64::Engine;
use image::RgbImage;
use indicatif::{ProgressBar, ProgressStyle};
use log::{info, warn};
use rayon::prelude::*;
use std::sync::Arc;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

/// Where gallery image bytes come from.
pub trait ImageSource: Send + Sync {
    fn fetch(&self, url: &str) -> Result<Vec<u8>>;
}

/// A decoded gallery image.
#[derive(Debug, Clone)]
pub struct LoadedImage {
    pub url: String,
    pub image: RgbImage,
}

/// Fetches `http(s)` URLs with ureq and decodes `data:` URIs in place.
pub struct HttpImageSource {
    agent: ureq::Agent,
}

impl HttpImageSource {
    pub fn new(timeout: Duration) -> Self {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build();
        Self {
            agent: config.into(),
        }
    }
}

impl ImageSource for HttpImageSource {
    fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        if url.starts_with("data:") {
            return decode_data_uri(url);
        }
        if url.starts_with("blob:") {
            bail!("Blob URLs only resolve inside the browser that created them");
        }
        let response = self
            .agent
            .get(url)
            .call()
            .with_context(|| format!("Request for {} failed", url))?;
        response
            .into_body()
            .read_to_vec()
            .with_context(|| format!("Failed to read image body from {}", url))
    }
}

/// Decodes a base64 `data:` URI into raw bytes.
pub fn decode_data_uri(uri: &str) -> Result<Vec<u8>> {
    let (header, payload) = uri
        .split_once(',')
        .ok_or_else(|| anyhow!("Invalid data URI: missing comma"))?;
    if !header.ends_with(";base64") {
        bail!("Only base64 data URIs are supported");
    }
    base64::engine::general_purpose::STANDARD
        .decode(payload.trim())
        .context("Base64 decode error")
}

fn fetch_and_decode(source: &dyn ImageSource, url: &str) -> Result<RgbImage> {
    let bytes = source.fetch(url)?;
    let image = image::load_from_memory(&bytes).context("Failed to decode image")?;
    Ok(image.to_rgb8())
}

/// Loads one image on its own thread, giving up after `timeout`.
///
/// A timed-out thread is left running. It still ends on its own, because
/// `HttpImageSource` applies the same timeout to the whole request.
fn load_with_timeout(source: Arc<dyn ImageSource>, url: &str, timeout: Duration) -> Result<RgbImage> {
    let (tx, rx) = mpsc::channel();
    let owned_url = url.to_string();
    thread::spawn(move || {
        // The receiver is gone once the load timed out; nothing to report then.
        let _ = tx.send(fetch_and_decode(source.as_ref(), &owned_url));
    });
    match rx.recv_timeout(timeout) {
        Ok(result) => result,
        Err(mpsc::RecvTimeoutError::Timeout) => Err(anyhow!("Timed out after {:?}", timeout)),
        Err(mpsc::RecvTimeoutError::Disconnected) => Err(anyhow!("Loader thread exited without a result")),
    }
}

/// Loads every URL in parallel and returns the ones that succeeded, in input
/// order.
pub fn load_images(urls: &[String], source: Arc<dyn ImageSource>, timeout: Duration) -> Vec<LoadedImage> {
    if urls.is_empty() {
        return Vec::new();
    }

    let pb = ProgressBar::new(urls.len() as u64);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("{spinner:.green} Loading images [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
    {
        pb.set_style(style.progress_chars("##-"));
    }

    let loaded: Vec<LoadedImage> = urls
        .par_iter()
        .filter_map(|url| {
            let result = load_with_timeout(Arc::clone(&source), url, timeout);
            pb.inc(1);
            match result {
                Ok(image) => Some(LoadedImage {
                    url: url.clone(),
                    image,
                }),
                Err(e) => {
                    warn!("Skipping image {}: {:#}", short_url(url), e);
                    None
                }
            }
        })
        .collect();

    pb.finish_with_message("Images loaded");
    info!("Loaded {} of {} gallery images.", loaded.len(), urls.len());
    loaded
}

// Data URIs can be megabytes long; keep log lines readable.
fn short_url(url: &str) -> String {
    match url.char_indices().nth(80) {
        Some((cut, _)) => format!("{}...", &url[..cut]),
        None => url.to_string(),
    }
}
