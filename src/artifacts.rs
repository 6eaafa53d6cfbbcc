//! Third-party artifact download and unpacking.
//!
//! Archives are always the "latest" builds and are not checksummed. Tarballs
//! are unpacked with their top-level directory stripped so that
//! `wordpress/index.php` lands at `<dest>/index.php`.

use std::fs::{self, File};
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use flate2::read::GzDecoder;
use reqwest::blocking::Client;
use tar::Archive;
use tracing::{debug, info};

use crate::error::{ProvisionError, Result};

/// Downloads artifacts.
pub trait ArtifactFetcher {
    /// Save the body of `url` at `dest`, replacing any existing file.
    fn download(&self, url: &str, dest: &Path) -> Result<()>;

    /// Return the body of `url` as text.
    fn fetch_text(&self, url: &str) -> Result<String>;
}

/// Blocking HTTP fetcher; follows redirects.
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("wpprovision/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }

    fn get(&self, url: &str) -> Result<reqwest::blocking::Response> {
        debug!(url, "HTTP GET");
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|e| ProvisionError::http(format!("request to {url} failed: {e}")))?;
        debug!(url, status = %response.status(), "HTTP response");
        response
            .error_for_status()
            .map_err(|e| ProvisionError::http(format!("{url}: {e}")))
    }
}

impl ArtifactFetcher for HttpFetcher {
    fn download(&self, url: &str, dest: &Path) -> Result<()> {
        let bytes = self.get(url)?.bytes()?;

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(dest, &bytes)?;

        info!(url, dest = %dest.display(), bytes = bytes.len(), "downloaded");
        Ok(())
    }

    fn fetch_text(&self, url: &str) -> Result<String> {
        Ok(self.get(url)?.text()?)
    }
}

/// Unpack a `.tar.gz` into `dest`, dropping the first `strip_components`
/// path components of every entry.
///
/// Entries that would escape `dest` (absolute paths, `..`) are rejected.
/// Returns the number of entries written.
pub fn extract_tar_gz(archive: &Path, dest: &Path, strip_components: usize) -> Result<usize> {
    debug!(archive = %archive.display(), dest = %dest.display(), "extracting");

    let file = File::open(archive)?;
    let mut tar = Archive::new(GzDecoder::new(file));
    tar.set_preserve_ownerships(false);

    fs::create_dir_all(dest)?;
    let mut written = 0;

    for entry in tar.entries()? {
        let mut entry = entry?;
        let path = entry.path()?.into_owned();

        let Some(relative) = strip_path(&path, strip_components)? else {
            continue;
        };

        let target = dest.join(&relative);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        entry.unpack(&target)?;
        written += 1;
    }

    info!(archive = %archive.display(), entries = written, "extracted");
    Ok(written)
}

/// `None` for entries consumed entirely by the strip (e.g. `wordpress/`).
fn strip_path(path: &Path, strip_components: usize) -> Result<Option<PathBuf>> {
    let mut stripped = PathBuf::new();
    let mut seen = 0;
    for component in path.components() {
        match component {
            Component::Normal(part) => {
                if seen >= strip_components {
                    stripped.push(part);
                }
                seen += 1;
            }
            Component::CurDir => {}
            _ => {
                return Err(ProvisionError::Io(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("archive entry escapes destination: {}", path.display()),
                )));
            }
        }
    }

    if stripped.as_os_str().is_empty() {
        Ok(None)
    } else {
        Ok(Some(stripped))
    }
}

/// Recursively copy `src` into `dst`, overwriting files that exist.
pub fn copy_tree(src: &Path, dst: &Path) -> Result<()> {
    fs::create_dir_all(dst)?;

    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        let target = dst.join(entry.file_name());

        if file_type.is_dir() {
            copy_tree(&entry.path(), &target)?;
        } else if file_type.is_symlink() {
            let link = fs::read_link(entry.path())?;
            if target.symlink_metadata().is_ok() {
                fs::remove_file(&target)?;
            }
            std::os::unix::fs::symlink(link, &target)?;
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }

    Ok(())
}

/// Set mode 0755 on `path`.
pub fn make_executable(path: &Path) -> Result<()> {
    fs::set_permissions(path, fs::Permissions::from_mode(0o755))?;
    Ok(())
}
