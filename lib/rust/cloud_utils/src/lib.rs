//! Module for moving data between local scratch and platform storage.
#![deny(missing_docs)]

use anyhow::{ensure, Context, Result};
use std::fs::{self, File};
use std::io;
use std::path::Path;
use std::process::Command;
use std::time::Duration;

/// Transfer CLI used for destinations on the platform data plane.
const PLATFORM_CLI: &str = "latch";

const HTTP_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const HTTP_TRANSFER_TIMEOUT: Duration = Duration::from_secs(3600);

/// True when the string names an object behind a URI scheme rather than a
/// path on the local filesystem.
pub fn is_remote(location: &str) -> bool {
    url::Url::parse(location).is_ok()
}

fn http_client() -> Result<reqwest::blocking::Client> {
    reqwest::blocking::Client::builder()
        .connect_timeout(HTTP_CONNECT_TIMEOUT)
        .timeout(HTTP_TRANSFER_TIMEOUT)
        .user_agent(concat!("pipwrap/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("failed to construct an HTTP client")
}

/// Size of a remote object in bytes, taken from a HEAD request without
/// fetching the body.
pub fn head_content_length(url: &str) -> Result<u64> {
    let response = http_client()?
        .head(url)
        .send()
        .and_then(|r| r.error_for_status())
        .with_context(|| format!("HEAD {url}"))?;
    response
        .content_length()
        .with_context(|| format!("no Content-Length reported for {url}"))
}

/// Stream a remote object into a local file, creating or truncating it.
pub fn download_to(url: &str, dest: &Path) -> Result<()> {
    let mut response = http_client()?
        .get(url)
        .send()
        .and_then(|r| r.error_for_status())
        .with_context(|| format!("GET {url}"))?;
    let mut file = File::create(dest).with_context(|| format!("creating {}", dest.display()))?;
    io::copy(&mut response, &mut file).with_context(|| format!("writing {}", dest.display()))?;
    Ok(())
}

/// Deliver a local directory to a destination. Remote destinations are
/// handed to the platform transfer CLI, local ones are copied in place.
pub fn upload_dir(local: &Path, dest: &str) -> Result<()> {
    if is_remote(dest) {
        let mut cmd = Command::new(PLATFORM_CLI);
        cmd.arg("cp").arg(local).arg(dest);
        let status = cmd
            .status()
            .with_context(|| format!("failed to run {PLATFORM_CLI} cp"))?;
        ensure!(
            status.success(),
            "{PLATFORM_CLI} cp {} {dest} exited with {status}",
            local.display(),
        );
        Ok(())
    } else {
        copy_dir_recursive(local, Path::new(dest))
    }
}

fn copy_dir_recursive(src: &Path, dst: &Path) -> Result<()> {
    fs::create_dir_all(dst).with_context(|| format!("creating {}", dst.display()))?;
    for entry in fs::read_dir(src).with_context(|| format!("reading {}", src.display()))? {
        let entry = entry?;
        let target = dst.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir_recursive(&entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), &target)
                .with_context(|| format!("copying {}", target.display()))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_remote() {
        assert!(is_remote("https://bucket.example.com/refs/GRCh38.tar.gz"));
        assert!(is_remote("s3://bucket/refs/GRCh38.tar.gz"));
        assert!(is_remote("latch:///PIPseeker_Output"));
        assert!(!is_remote("/data/refs/GRCh38.tar.gz"));
        assert!(!is_remote("refs/GRCh38.tar.gz"));
        assert!(!is_remote("GRCh38.tar.gz"));
    }

    #[test]
    fn test_upload_dir_local_copies_tree() {
        let src = tempfile::tempdir().unwrap();
        fs::create_dir(src.path().join("logs")).unwrap();
        fs::write(src.path().join("summary.html"), "<html/>").unwrap();
        fs::write(src.path().join("logs/run.log"), "done").unwrap();

        let dst = tempfile::tempdir().unwrap();
        let dest = dst.path().join("out");
        upload_dir(src.path(), dest.to_str().unwrap()).unwrap();

        assert_eq!(
            fs::read_to_string(dest.join("summary.html")).unwrap(),
            "<html/>"
        );
        assert_eq!(fs::read_to_string(dest.join("logs/run.log")).unwrap(), "done");
    }
}
