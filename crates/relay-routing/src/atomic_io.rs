use std::path::Path;

use crate::RoutingError;

/// Writes text using a temp file + rename so readers never observe partial data.
pub fn write_text_atomic(path: &Path, content: &str) -> Result<(), RoutingError> {
    if path.as_os_str().is_empty() {
        return Err(RoutingError::InvalidPath(
            "destination path cannot be empty".to_string(),
        ));
    }
    if path.is_dir() {
        return Err(RoutingError::InvalidPath(format!(
            "destination path '{}' is a directory",
            path.display()
        )));
    }

    let parent_dir = path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(parent_dir).map_err(|source| RoutingError::Io {
        path: parent_dir.to_path_buf(),
        source,
    })?;

    let temp_name = format!(
        ".{}.tmp-{}-{}",
        path.file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("routing-record"),
        std::process::id(),
        chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default()
    );
    let temp_path = parent_dir.join(temp_name);
    std::fs::write(&temp_path, content).map_err(|source| RoutingError::Io {
        path: temp_path.clone(),
        source,
    })?;
    if let Err(source) = std::fs::rename(&temp_path, path) {
        let _ = std::fs::remove_file(&temp_path);
        return Err(RoutingError::Io {
            path: path.to_path_buf(),
            source,
        });
    }
    Ok(())
}
