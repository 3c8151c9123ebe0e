use async_trait::async_trait;
use futures_util::stream::{Stream, StreamExt};
use log::{info, warn};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Client;
use std::collections::BTreeMap;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::pin::pin;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::error::App;
use crate::media::{MediaItem, QualityKey};

/// Where a resolved source ends up.
#[async_trait]
pub trait Downloader: Send + Sync {
    async fn download(
        &self,
        item: &MediaItem,
        quality: QualityKey,
        url: &str,
        headers: &BTreeMap<String, String>,
    ) -> Result<PathBuf, App>;
}

pub struct HttpDownloader {
    client: Client,
    directory: PathBuf,
}

impl HttpDownloader {
    pub fn new(client: Client, directory: PathBuf) -> Self {
        Self { client, directory }
    }
}

fn header_map(headers: &BTreeMap<String, String>) -> Result<HeaderMap, App> {
    let mut map = HeaderMap::new();
    for (name, value) in headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| App::InvalidInput(format!("Header name {name}: {e}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| App::InvalidInput(format!("Header value for {name}: {e}")))?;
        map.insert(name, value);
    }
    Ok(map)
}

/// `<title or id>-<quality>.<ext>` with path separators and control
/// characters replaced. The extension comes from the URL path when it looks
/// like one.
pub fn file_name(item: &MediaItem, quality: QualityKey, url: &str) -> String {
    let stem: String = item
        .title
        .as_deref()
        .unwrap_or(&item.id)
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    let path = url.split_once("://").map_or(url, |(_, rest)| rest);
    let path = path.split_once('/').map_or("", |(_, path)| path);
    let path = path.split(|c: char| c == '?' || c == '#').next().unwrap_or_default();
    let extension = Path::new(path)
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| (1..=5).contains(&ext.len()) && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .unwrap_or("mp3");

    format!("{}-{}.{}", stem.trim(), quality, extension)
}

#[async_trait]
impl Downloader for HttpDownloader {
    async fn download(
        &self,
        item: &MediaItem,
        quality: QualityKey,
        url: &str,
        headers: &BTreeMap<String, String>,
    ) -> Result<PathBuf, App> {
        fs::create_dir_all(&self.directory).await?;
        let target = self.directory.join(file_name(item, quality, url));
        info!("Downloading {} to {}", item, target.display());

        let response = self
            .client
            .get(url)
            .headers(header_map(headers)?)
            .send()
            .await?
            .error_for_status()?;

        save_stream(response.bytes_stream(), &target).await?;
        info!("Downloaded {}", target.display());
        Ok(target)
    }
}

fn partial_path(target: &Path) -> PathBuf {
    let mut name = target.file_name().map(OsStr::to_os_string).unwrap_or_default();
    name.push(".part");
    target.with_file_name(name)
}

/// Streams `body` into `<target>.part` and moves it over `target` once the
/// last chunk is written. A failed transfer leaves neither file behind.
async fn save_stream<S, B, E>(body: S, target: &Path) -> Result<(), App>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    App: From<E>,
{
    let partial = partial_path(target);
    match write_stream(body, &partial).await {
        Ok(()) => Ok(fs::rename(&partial, target).await?),
        Err(e) => {
            if let Err(cleanup) = fs::remove_file(&partial).await {
                warn!("Failed to remove {}: {}", partial.display(), cleanup);
            }
            Err(e)
        }
    }
}

async fn write_stream<S, B, E>(body: S, path: &Path) -> Result<(), App>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    App: From<E>,
{
    let mut body = pin!(body);
    let mut file = fs::File::create(path).await?;
    while let Some(chunk) = body.next().await {
        file.write_all(chunk?.as_ref()).await?;
    }
    file.flush().await?;
    Ok(())
}
