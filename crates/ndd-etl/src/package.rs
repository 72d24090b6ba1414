//! Study archive housekeeping and ZIP packaging.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info};
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

use crate::archive::{DATASETS_DIR, LISTS_DIR};
use crate::error::{EtlError, Result, io_error};

pub const ARCHIVE_FILE_NAME: &str = "studyArchiveToImport.zip";

fn remove_tsv_under(dir: &Path) -> Result<usize> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(source) => return Err(io_error(dir)(source)),
    };
    let mut removed = 0;
    for entry in entries {
        let path = entry.map_err(io_error(dir))?.path();
        if path.is_dir() {
            removed += remove_tsv_under(&path)?;
        } else if path.extension().is_some_and(|ext| ext == "tsv") {
            fs::remove_file(&path).map_err(io_error(&path))?;
            debug!(path = %path.display(), "old table removed");
            removed += 1;
        }
    }
    Ok(removed)
}

/// Delete `.tsv` files left in `lists/` and `study/datasets/` by the last run.
pub fn remove_old_tables(archive: &Path) -> Result<usize> {
    let mut removed = 0;
    for dir in [LISTS_DIR, DATASETS_DIR] {
        removed += remove_tsv_under(&archive.join(dir))?;
    }
    Ok(removed)
}

/// Archive-relative paths of every file and directory, sorted, `/`-separated.
fn archive_entries(root: &Path, dir: &Path, entries: &mut Vec<(String, PathBuf, bool)>) -> Result<()> {
    let mut children: Vec<PathBuf> = fs::read_dir(dir)
        .map_err(io_error(dir))?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<io::Result<_>>()
        .map_err(io_error(dir))?;
    children.sort();
    for path in children {
        let name = path
            .strip_prefix(root)
            .unwrap_or(&path)
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        if path.is_dir() {
            entries.push((format!("{name}/"), path.clone(), true));
            archive_entries(root, &path, entries)?;
        } else {
            entries.push((name, path, false));
        }
    }
    Ok(())
}

/// Zip the archive directory into `studyArchiveToImport.zip` beside it,
/// replacing any earlier package.
pub fn package_archive(archive: &Path) -> Result<PathBuf> {
    let parent = archive.parent().unwrap_or_else(|| Path::new("."));
    let zip_path = parent.join(ARCHIVE_FILE_NAME);
    match fs::remove_file(&zip_path) {
        Ok(()) => debug!(path = %zip_path.display(), "previous package removed"),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(source) => return Err(io_error(&zip_path)(source)),
    }

    let mut entries = Vec::new();
    archive_entries(archive, archive, &mut entries)?;

    let zip_error = |err: zip::result::ZipError| EtlError::Zip {
        path: zip_path.clone(),
        message: err.to_string(),
    };
    let file = File::create(&zip_path).map_err(io_error(&zip_path))?;
    let mut zip = ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);
    let mut files = 0usize;
    for (name, path, is_dir) in entries {
        if is_dir {
            zip.add_directory(name, options).map_err(zip_error)?;
            continue;
        }
        zip.start_file(name, options).map_err(zip_error)?;
        let mut source = File::open(&path).map_err(io_error(&path))?;
        io::copy(&mut source, &mut zip).map_err(io_error(&path))?;
        files += 1;
    }
    zip.finish().map_err(zip_error)?;
    info!(path = %zip_path.display(), files, "study archive packaged");
    Ok(zip_path)
}
