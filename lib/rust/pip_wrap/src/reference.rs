//! Staging of reference genomes: download or accept an archive, unpack it
//! into scratch, and hand back the directory PIPseeker maps against.

use anyhow::{bail, ensure, Context, Result};
use log::info;
use pip_types::{archive_stem, ArchiveKind, ReferenceSource};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use thiserror::Error;

/// The unpacked archive did not contain the single top-level directory
/// named after the archive file.
#[derive(Error, Debug, PartialEq, Eq)]
#[error(
    "Unpacking failed. The directory {} was not found.\n\
     Please ensure that you compressed your reference with a single top-level \
     directory containing the reference genome.\n\
     Also ensure the top-level folder matches the prefix of your compressed file.",
    .expected.display()
)]
pub struct UnpackLayoutError {
    /// Directory the archive was required to unpack into.
    pub expected: PathBuf,
}

/// Filename component of a hosted archive URL.
fn hosted_archive_name(url: &str) -> Result<String> {
    url.rsplit('/')
        .next()
        .filter(|name| !name.is_empty())
        .map(String::from)
        .with_context(|| format!("no filename in {url}"))
}

/// Where a reference source will sit locally once staged, computed without
/// staging anything. Fails on archives whose format the staging step would
/// not be able to unpack.
pub fn staged_reference_path(source: &ReferenceSource, staging_dir: &Path) -> Result<PathBuf> {
    match source {
        ReferenceSource::Directory(dir) => Ok(dir.clone()),
        ReferenceSource::Prebuilt(genome) => {
            let url = genome.archive_url();
            let archive = hosted_archive_name(url)?;
            let stem = archive_stem(Path::new(&archive))
                .with_context(|| format!("{archive} is not a supported reference archive"))?;
            Ok(staging_dir.join(stem))
        }
        ReferenceSource::Archive(archive) => {
            let stem = archive_stem(archive).with_context(|| {
                format!(
                    "{} is not a supported reference archive; supply a .tar.gz or .zip \
                     file, or the unpacked directory instead",
                    archive.display()
                )
            })?;
            Ok(staging_dir.join(stem))
        }
    }
}

/// Make the reference available locally: directories pass through, the
/// hosted archive of a prebuilt genome is downloaded first, and any archive
/// is unpacked into the staging directory.
pub fn stage_reference(source: &ReferenceSource, staging_dir: &Path) -> Result<PathBuf> {
    info!("Preparing reference genome");
    let target = staged_reference_path(source, staging_dir)?;
    match source {
        ReferenceSource::Directory(_) => return Ok(target),
        ReferenceSource::Prebuilt(genome) => {
            let url = genome.archive_url();
            let archive = staging_dir.join(hosted_archive_name(url)?);
            info!("Downloading {url}");
            cloud_utils::download_to(url, &archive)?;
            unpack_archive(&archive, staging_dir)?;
        }
        ReferenceSource::Archive(archive) => {
            unpack_archive(archive, staging_dir)?;
        }
    }
    if !target.is_dir() {
        return Err(UnpackLayoutError { expected: target }.into());
    }
    Ok(target)
}

/// Unpack a .tar.gz or .zip archive into the staging directory. The
/// archiver's listing output is discarded; its errors stay on stderr.
fn unpack_archive(archive: &Path, staging_dir: &Path) -> Result<()> {
    let Some(kind) = ArchiveKind::detect(archive) else {
        bail!("{} is not a supported reference archive", archive.display());
    };
    info!("Unpacking {}", archive.display());
    let mut cmd = match kind {
        ArchiveKind::TarGz => {
            let mut cmd = Command::new("tar");
            cmd.arg("-zxf").arg(archive).arg("-C").arg(staging_dir);
            cmd
        }
        ArchiveKind::Zip => {
            let mut cmd = Command::new("unzip");
            cmd.arg("-o").arg(archive).arg("-d").arg(staging_dir);
            cmd
        }
    };
    let status = cmd
        .stdout(Stdio::null())
        .status()
        .with_context(|| format!("Unpacking {}", archive.display()))?;
    ensure!(
        status.success(),
        "unpacking {} exited with {status}",
        archive.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pip_types::GenomeType;
    use std::fs;

    #[test]
    fn test_staged_reference_path() {
        let staging = Path::new("/scratch");
        assert_eq!(
            staged_reference_path(
                &ReferenceSource::Directory(PathBuf::from("/refs/custom")),
                staging
            )
            .unwrap(),
            Path::new("/refs/custom")
        );
        assert_eq!(
            staged_reference_path(&ReferenceSource::Prebuilt(GenomeType::Human), staging)
                .unwrap(),
            Path::new("/scratch/pipseeker-gex-reference-GRCh38-2022.04")
        );
        assert_eq!(
            staged_reference_path(
                &ReferenceSource::Archive(PathBuf::from("/uploads/myref.tar.gz")),
                staging
            )
            .unwrap(),
            Path::new("/scratch/myref")
        );
        assert!(staged_reference_path(
            &ReferenceSource::Archive(PathBuf::from("/uploads/myref.fa")),
            staging
        )
        .is_err());
    }

    #[test]
    fn test_stage_reference_unpacks_a_tarball() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let staging = dir.path().join("staging");
        fs::create_dir(&staging)?;
        let payload = dir.path().join("myref");
        fs::create_dir(&payload)?;
        fs::write(payload.join("genome.fa"), ">chr1\nACGT\n")?;
        let archive = dir.path().join("myref.tar.gz");
        let status = Command::new("tar")
            .arg("-czf")
            .arg(&archive)
            .arg("-C")
            .arg(dir.path())
            .arg("myref")
            .status()?;
        assert!(status.success());

        let staged = stage_reference(&ReferenceSource::Archive(archive), &staging)?;
        assert_eq!(staged, staging.join("myref"));
        assert!(staged.join("genome.fa").is_file());
        Ok(())
    }

    #[test]
    fn test_stage_reference_rejects_a_mismatched_top_level() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let staging = dir.path().join("staging");
        fs::create_dir(&staging)?;
        let payload = dir.path().join("contents");
        fs::create_dir(&payload)?;
        fs::write(payload.join("genome.fa"), ">chr1\nACGT\n")?;
        // The top-level directory "contents" does not match the archive
        // name "myref".
        let archive = dir.path().join("myref.tar.gz");
        let status = Command::new("tar")
            .arg("-czf")
            .arg(&archive)
            .arg("-C")
            .arg(dir.path())
            .arg("contents")
            .status()?;
        assert!(status.success());

        let err = stage_reference(&ReferenceSource::Archive(archive), &staging).unwrap_err();
        let layout = err.downcast_ref::<UnpackLayoutError>().unwrap();
        assert_eq!(layout.expected, staging.join("myref"));
        assert!(layout.to_string().starts_with("Unpacking failed."));
        Ok(())
    }
}
