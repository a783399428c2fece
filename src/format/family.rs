//! Discovery of d3plot family segments.
//!
//! A family is the base file plus numbered continuations: `d3plot`,
//! `d3plot01`, `d3plot02`, ... The base holds the header, control block and
//! geometry; the continuations hold further state records only.

use std::fs;
use std::path::{Path, PathBuf};

use super::FormatError;

/// Ordered list of the segment files making up one logical stream.
#[derive(Debug)]
pub struct FileFamily {
    base: PathBuf,
    segments: Vec<PathBuf>,
}

impl FileFamily {
    /// Locate the base file and every numbered continuation next to it.
    ///
    /// Continuations are probed in order and collection stops at the first
    /// missing number, so a stray `d3plot07` without `d3plot03`..`06` is
    /// never picked up.
    pub fn discover(base: &Path) -> Result<FileFamily, FormatError> {
        if !base.is_file() {
            return Err(FormatError::FileNotFound(base.to_path_buf()));
        }

        let mut segments = vec![base.to_path_buf()];
        let base_name = base
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("d3plot")
            .to_string();

        for index in 1u32.. {
            let name = if index < 100 {
                format!("{}{:02}", base_name, index)
            }
            else {
                format!("{}{}", base_name, index)
            };
            let candidate = base.with_file_name(&name);
            if candidate.is_file() {
                segments.push(candidate);
            }
            else {
                break;
            }
        }

        log::debug!("family {:?}: {} segment(s)", base, segments.len());
        Ok(FileFamily {
            base: base.to_path_buf(),
            segments,
        })
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    pub fn segments(&self) -> &[PathBuf] {
        &self.segments
    }

    /// Read every segment into memory, in family order.
    pub fn read_segments(&self) -> Result<Vec<Vec<u8>>, FormatError> {
        let mut out = Vec::with_capacity(self.segments.len());
        for path in &self.segments {
            let bytes = fs::read(path).map_err(|source| {
                if source.kind() == std::io::ErrorKind::NotFound {
                    FormatError::FileNotFound(path.clone())
                }
                else {
                    FormatError::Io {
                        path: path.clone(),
                        source,
                    }
                }
            })?;
            out.push(bytes);
        }
        Ok(out)
    }
}
