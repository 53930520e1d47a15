//! Recipe archive extraction

use async_compression::tokio::bufread::XzDecoder;
use dop_errors::{CacheError, Error};
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::BufReader;

/// Extract a `.tar.xz` archive into `dest_dir`
///
/// The archive is decompressed to a temporary file first, then unpacked;
/// archives are small enough that streaming extraction is not worth the
/// extra machinery.
///
/// # Errors
///
/// Returns a `CacheError::ExtractionFailed` when decompression or
/// unpacking fails.
pub async fn extract_tar_xz(archive_path: &Path, dest_dir: &Path) -> Result<(), Error> {
    tokio::fs::create_dir_all(dest_dir)
        .await
        .map_err(|e| Error::io_with_path(&e, dest_dir))?;

    let tar_file = tempfile::NamedTempFile::new().map_err(|e| CacheError::ExtractionFailed {
        message: format!("creating temp file: {e}"),
    })?;
    let tar_path = tar_file.path().to_path_buf();

    decompress(archive_path, &tar_path).await?;
    unpack(tar_path, dest_dir.to_path_buf()).await
}

async fn decompress(archive_path: &Path, tar_path: &Path) -> Result<(), Error> {
    let input = File::open(archive_path)
        .await
        .map_err(|e| Error::io_with_path(&e, archive_path))?;
    let mut output = File::create(tar_path)
        .await
        .map_err(|e| Error::io_with_path(&e, tar_path))?;

    let mut decoder = XzDecoder::new(BufReader::new(input));
    tokio::io::copy(&mut decoder, &mut output)
        .await
        .map_err(|e| CacheError::ExtractionFailed {
            message: format!("decompressing {}: {e}", archive_path.display()),
        })?;
    Ok(())
}

async fn unpack(tar_path: PathBuf, dest_dir: PathBuf) -> Result<(), Error> {
    tokio::task::spawn_blocking(move || {
        let file = std::fs::File::open(&tar_path).map_err(|e| CacheError::ExtractionFailed {
            message: format!("opening {}: {e}", tar_path.display()),
        })?;
        let mut archive = tar::Archive::new(file);
        archive
            .unpack(&dest_dir)
            .map_err(|e| CacheError::ExtractionFailed {
                message: format!("unpacking into {}: {e}", dest_dir.display()),
            })?;
        Ok(())
    })
    .await
    .map_err(|e| Error::internal(format!("extraction task failed: {e}")))?
}
