// Dataset preparation: folder layout, parameter sync, raw image intake
// and temp-folder removal

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};

use crate::models::{Channel, DatasetPaths};
use crate::pipeline::{ChannelFailure, DatasetError};

/// Parameter files pulled from the shared parameter folder when present
pub const SYNCED_PARAMETERS: [&str; 2] = ["options_mnt", "options_curvelets"];

/// True when `path` is a regular file with content
pub fn is_present(path: &Path) -> bool {
    fs::metadata(path)
        .map(|meta| meta.is_file() && meta.len() > 0)
        .unwrap_or(false)
}

/// Create every folder of the dataset layout plus the results destination
pub fn create_folders(paths: &DatasetPaths, results_dest: &Path) -> Result<(), DatasetError> {
    for folder in paths.folders().into_iter().chain(std::iter::once(results_dest)) {
        fs::create_dir_all(folder).map_err(|source| DatasetError::Bootstrap {
            path: folder.to_path_buf(),
            source,
        })?;
    }
    debug!("Folder layout ready under {}", paths.root.display());
    Ok(())
}

/// Copy shared parameter files into `Parameters`.
/// Missing files and copy errors are logged and skipped; returns the number copied.
pub fn sync_parameters(params_source: &Path, parameters: &Path) -> usize {
    let mut copied = 0;
    for name in SYNCED_PARAMETERS {
        let from = params_source.join(name);
        if !from.is_file() {
            debug!("No shared {} in {}", name, params_source.display());
            continue;
        }
        match fs::copy(&from, parameters.join(name)) {
            Ok(_) => copied += 1,
            Err(e) => warn!("Could not sync {}: {}", from.display(), e),
        }
    }
    if copied > 0 {
        info!("Synced {} parameter file(s) from {}", copied, params_source.display());
    }
    copied
}

/// Find a channel's raw image in `dir`. With several candidates the first
/// by name wins.
pub fn locate_source(dir: &Path, channel: Channel, extension: &str) -> io::Result<Option<PathBuf>> {
    let mut matches: Vec<PathBuf> = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        if channel.matches_source(&name.to_string_lossy(), extension) && entry.path().is_file() {
            matches.push(entry.path());
        }
    }
    matches.sort();
    if matches.len() > 1 {
        warn!(
            "{} matches {} files in {}; using {}",
            channel.source_pattern(extension),
            matches.len(),
            dir.display(),
            matches[0].display()
        );
    }
    Ok(matches.into_iter().next())
}

/// Artifact base name of a file: its path without extension
pub fn base_name(file: &Path) -> String {
    file.with_extension("").to_string_lossy().into_owned()
}

/// Copy a channel's raw image from the source folder into `data_dir`,
/// overwriting a previous copy. Returns the artifact base name.
pub fn copy_source(
    channel: Channel,
    source_dir: &Path,
    data_dir: &Path,
    extension: &str,
) -> Result<String, ChannelFailure> {
    let pattern_path = source_dir.join(channel.source_pattern(extension));
    let from = match locate_source(source_dir, channel, extension) {
        Ok(Some(path)) if is_present(&path) => path,
        Ok(_) => {
            return Err(ChannelFailure::MissingInput { channel, path: pattern_path });
        }
        Err(e) => {
            warn!("Cannot list {}: {}", source_dir.display(), e);
            return Err(ChannelFailure::MissingInput { channel, path: pattern_path });
        }
    };

    let to = match from.file_name() {
        Some(name) => data_dir.join(name),
        None => return Err(ChannelFailure::MissingInput { channel, path: from }),
    };
    if is_same_file(&from, &to) {
        // Copying onto itself would truncate the raw image
        info!("{} is already in {}; not copying", from.display(), data_dir.display());
        return Ok(base_name(&to));
    }
    fs::copy(&from, &to).map_err(|source| ChannelFailure::Copy {
        channel,
        from: from.clone(),
        to: to.clone(),
        source,
    })?;
    if !is_present(&to) {
        return Err(ChannelFailure::MissingInput { channel, path: to });
    }

    Ok(base_name(&to))
}

/// True when both paths resolve to the same file. A destination that does
/// not exist yet is never the same file.
fn is_same_file(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Look up a channel's raw image already in `data_dir` (copy stage disabled)
pub fn find_local(channel: Channel, data_dir: &Path, extension: &str) -> Result<String, ChannelFailure> {
    match locate_source(data_dir, channel, extension) {
        Ok(Some(path)) if is_present(&path) => Ok(base_name(&path)),
        _ => Err(ChannelFailure::MissingInput {
            channel,
            path: data_dir.join(channel.source_pattern(extension)),
        }),
    }
}

/// Remove a temp folder and everything in it. An absent folder is fine.
pub fn remove_temp(path: &Path) -> Result<(), DatasetError> {
    if !path.exists() {
        debug!("{} already absent", path.display());
        return Ok(());
    }
    fs::remove_dir_all(path).map_err(|source| DatasetError::Cleanup {
        path: path.to_path_buf(),
        source,
    })?;
    info!("Removed {}", path.display());
    Ok(())
}
