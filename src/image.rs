use std::path::{Path, PathBuf};
use std::time::SystemTime;

use futures_util::StreamExt;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use tokio::io::AsyncWriteExt;

use crate::backend::Fetcher;
use crate::error::WslDevError;
use crate::host::Arch;
use crate::util::format_size;

/// Root filesystem archives, one per (release, architecture).
///
/// Layout: `<root>/<release>/ubuntu-<release>-wsl-<arch>-wsl.rootfs.tar.gz`
#[derive(Debug, Clone)]
pub struct ImageCache {
    root: PathBuf,
    url_template: String,
}

/// A cached archive as reported by [`ImageCache::list`].
#[derive(Debug, Clone)]
pub struct CachedImage {
    pub release: String,
    pub file_name: String,
    pub path: PathBuf,
    pub size: u64,
    pub modified: Option<SystemTime>,
}

impl ImageCache {
    pub fn new(root: impl Into<PathBuf>, url_template: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            url_template: url_template.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn url(&self, release: &str, arch: Arch) -> String {
        self.url_template
            .replace("{release}", release)
            .replace("{arch}", arch.as_str())
    }

    pub fn path(&self, release: &str, arch: Arch) -> PathBuf {
        self.root
            .join(release)
            .join(format!("ubuntu-{release}-wsl-{arch}-wsl.rootfs.tar.gz"))
    }

    /// Return the cached archive, downloading it first when it is missing
    /// or `force` is set.
    pub async fn ensure<F: Fetcher>(
        &self,
        fetcher: &F,
        release: &str,
        arch: Arch,
        force: bool,
    ) -> Result<PathBuf, WslDevError> {
        let dest = self.path(release, arch);
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| WslDevError::Io {
                    context: format!("creating cache dir {}", parent.display()),
                    source: e,
                })?;
        }

        if !force && dest.exists() {
            tracing::info!(path = %dest.display(), "using cached image");
            return Ok(dest);
        }

        let url = self.url(release, arch);
        tracing::info!(%url, force, "downloading image");
        fetcher.fetch(&url, &dest).await?;
        tracing::info!(path = %dest.display(), "image cached");
        Ok(dest)
    }

    /// All cached archives, sorted by release then file name.
    pub fn list(&self) -> Result<Vec<CachedImage>, WslDevError> {
        let mut images = Vec::new();
        if !self.root.exists() {
            return Ok(images);
        }

        for release_dir in read_dir_sorted(&self.root)? {
            if !release_dir.is_dir() {
                continue;
            }
            let release = release_dir
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            for path in read_dir_sorted(&release_dir)? {
                // Interrupted downloads are not images.
                if !path.is_file() || path.extension().is_some_and(|e| e == "part") {
                    continue;
                }
                let meta = std::fs::metadata(&path).map_err(|e| WslDevError::Io {
                    context: format!("reading metadata for {}", path.display()),
                    source: e,
                })?;
                images.push(CachedImage {
                    release: release.clone(),
                    file_name: path
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_default(),
                    path,
                    size: meta.len(),
                    modified: meta.modified().ok(),
                });
            }
        }
        Ok(images)
    }

    /// Delete the archive for one (release, arch). Returns its size.
    pub fn delete(&self, release: &str, arch: Arch) -> Result<u64, WslDevError> {
        let path = self.path(release, arch);
        if !path.exists() {
            return Err(WslDevError::Io {
                context: format!("no cached image for {release}/{arch} in {}", self.root.display()),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "file not found"),
            });
        }
        let size = std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
        std::fs::remove_file(&path).map_err(|e| WslDevError::Io {
            context: format!("deleting {}", path.display()),
            source: e,
        })?;
        // Drop the release dir once it is empty; ignore failure if it is not.
        if let Some(parent) = path.parent() {
            let _ = std::fs::remove_dir(parent);
        }
        Ok(size)
    }

    /// Delete every cached archive. Returns (count, total bytes).
    pub fn clear(&self) -> Result<(usize, u64), WslDevError> {
        let images = self.list()?;
        let total = images.iter().map(|i| i.size).sum();
        for image in &images {
            std::fs::remove_file(&image.path).map_err(|e| WslDevError::Io {
                context: format!("deleting {}", image.path.display()),
                source: e,
            })?;
        }
        for dir in read_dir_sorted(&self.root).unwrap_or_default() {
            if dir.is_dir() {
                let _ = std::fs::remove_dir(&dir);
            }
        }
        Ok((images.len(), total))
    }
}

fn read_dir_sorted(dir: &Path) -> Result<Vec<PathBuf>, WslDevError> {
    let mut entries: Vec<PathBuf> = std::fs::read_dir(dir)
        .map_err(|e| WslDevError::Io {
            context: format!("reading directory {}", dir.display()),
            source: e,
        })?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .collect();
    entries.sort();
    Ok(entries)
}

// ── cache subcommands ────────────────────────────────────

pub fn print_cached(cache: &ImageCache) -> Result<(), WslDevError> {
    let images = cache.list()?;
    if images.is_empty() {
        println!("No cached images.");
        return Ok(());
    }

    let mut total_size: u64 = 0;
    for image in &images {
        total_size += image.size;
        let modified = image
            .modified
            .map(crate::util::format_time)
            .unwrap_or_else(|| "unknown".into());
        println!(
            "  {:<10} {}  {}  {}",
            image.release,
            image.file_name,
            format_size(image.size),
            modified
        );
    }
    println!("\n{} image(s), {} total", images.len(), format_size(total_size));
    Ok(())
}

pub fn delete_cached(cache: &ImageCache, release: &str, arch: Arch) -> Result<(), WslDevError> {
    let size = cache.delete(release, arch)?;
    println!("Deleted {release}/{arch} ({})", format_size(size));
    Ok(())
}

pub fn clear_cache(cache: &ImageCache) -> Result<(), WslDevError> {
    let (count, size) = cache.clear()?;
    if count == 0 {
        println!("No cached images.");
    } else {
        println!("Deleted {count} image(s) ({})", format_size(size));
    }
    Ok(())
}

// ── HTTP download ────────────────────────────────────────

/// [`Fetcher`] that streams a URL over HTTP(S) into a file.
pub struct HttpFetcher {
    client: reqwest::Client,
    multi: Option<MultiProgress>,
}

impl HttpFetcher {
    /// `multi` receives a byte progress bar per download; `None` downloads silently.
    pub fn new(multi: Option<MultiProgress>) -> Self {
        Self {
            client: reqwest::Client::new(),
            multi,
        }
    }

    fn progress_bar(&self, total_size: u64) -> ProgressBar {
        let Some(multi) = &self.multi else {
            return ProgressBar::hidden();
        };
        let pb = multi.add(ProgressBar::new(total_size));
        if let Ok(style) = ProgressStyle::default_bar()
            .template("      {spinner:.green} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})")
        {
            pb.set_style(style.progress_chars("#>-"));
        }
        pb
    }
}

impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str, dest: &Path) -> Result<(), WslDevError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| WslDevError::ImageDownload {
                message: format!("request to {url} failed"),
                source: Box::new(e),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(WslDevError::ImageDownload {
                message: format!("HTTP {status} from {url}"),
                source: format!("HTTP {status}").into(),
            });
        }

        let part = part_path(dest);
        let pb = self.progress_bar(response.content_length().unwrap_or(0));

        let streamed = async {
            let mut file = tokio::fs::File::create(&part)
                .await
                .map_err(|e| WslDevError::Io {
                    context: format!("creating {}", part.display()),
                    source: e,
                })?;
            let mut body = response.bytes_stream();
            while let Some(chunk) = body.next().await {
                let chunk = chunk.map_err(|e| WslDevError::ImageDownload {
                    message: format!("connection to {url} broke off"),
                    source: Box::new(e),
                })?;
                file.write_all(&chunk).await.map_err(|e| WslDevError::Io {
                    context: format!("writing {}", part.display()),
                    source: e,
                })?;
                pb.inc(chunk.len() as u64);
            }
            file.sync_all().await.map_err(|e| WslDevError::Io {
                context: format!("syncing {}", part.display()),
                source: e,
            })
        }
        .await;

        if let Err(e) = streamed {
            pb.abandon();
            let _ = tokio::fs::remove_file(&part).await;
            return Err(e);
        }
        pb.finish_and_clear();

        // The archive only appears under its final name once complete.
        tokio::fs::rename(&part, dest)
            .await
            .map_err(|e| WslDevError::Io {
                context: format!("moving {} into place", part.display()),
                source: e,
            })
    }
}

/// `<dest>.part`, where a download lands until it is complete.
fn part_path(dest: &Path) -> PathBuf {
    let mut part = dest.as_os_str().to_owned();
    part.push(".part");
    PathBuf::from(part)
}
