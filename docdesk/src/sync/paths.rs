use std::path::{Component, Path};

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    #[error("relative path is empty")]
    Empty,
    #[error("relative path contains unsupported component: {0}")]
    UnsupportedComponent(String),
}

/// Splits a browser-style relative path ("A/B/file.pdf") into its segments.
pub fn relative_segments(relative_path: &str) -> Result<Vec<String>, PathError> {
    let normalized = relative_path.replace('\\', "/");
    let mut segments = Vec::new();
    for component in Path::new(&normalized).components() {
        match component {
            Component::Normal(part) => segments.push(part.to_string_lossy().into_owned()),
            Component::CurDir => continue,
            Component::RootDir | Component::ParentDir | Component::Prefix(_) => {
                return Err(PathError::UnsupportedComponent(relative_path.to_string()));
            }
        }
    }
    if segments.is_empty() {
        return Err(PathError::Empty);
    }
    Ok(segments)
}

/// Folder segments below the upload root for one file: the file name is dropped and so is
/// a leading segment equal to `root_name`.
pub fn folder_segments(relative_path: &str, root_name: &str) -> Result<Vec<String>, PathError> {
    let mut segments = relative_segments(relative_path)?;
    segments.pop();
    if segments.first().is_some_and(|first| first == root_name) {
        segments.remove(0);
    }
    Ok(segments)
}
