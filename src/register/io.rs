//! Reading and writing register files.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;

use super::DuplicateRegister;

/// Errors reading or writing a register file.
#[derive(Debug, Error)]
pub enum RegisterError {
    /// The path does not exist.
    #[error("invalid file path \"{}\"", .0.display())]
    NotFound(PathBuf),

    /// The file exists but could not be read.
    #[error("failed to read register {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The content is not a register document.
    #[error("{} is not a valid register file: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The register could not be written.
    #[error("failed to write register {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The register could not be serialized.
    #[error("failed to serialize register: {0}")]
    Serialize(#[source] serde_json::Error),
}

impl DuplicateRegister {
    /// Serialize to pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns [`RegisterError::Serialize`] if serialization fails.
    pub fn to_json(&self) -> Result<String, RegisterError> {
        serde_json::to_string_pretty(self).map_err(RegisterError::Serialize)
    }

    /// Parse a register from JSON text.
    ///
    /// # Errors
    ///
    /// Returns the underlying `serde_json` error when the text is not an
    /// object of `"<digest>,<size>"` keys mapped to arrays of
    /// `[bucket, key]` pairs.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Write the register to `path`, replacing any existing file.
    ///
    /// The document is written to a sibling temporary file first and renamed
    /// into place, so a reader never sees a half-written register.
    ///
    /// # Errors
    ///
    /// Returns [`RegisterError::Write`] on I/O failure.
    pub fn save(&self, path: &Path) -> Result<(), RegisterError> {
        let json = self.to_json()?;
        let write_err = |source| RegisterError::Write {
            path: path.to_path_buf(),
            source,
        };

        let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
        tmp_name.push(".tmp");
        let tmp_path = path.with_file_name(tmp_name);

        let mut file = fs::File::create(&tmp_path).map_err(write_err)?;
        file.write_all(json.as_bytes()).map_err(write_err)?;
        file.write_all(b"\n").map_err(write_err)?;
        file.sync_all().map_err(write_err)?;
        drop(file);
        fs::rename(&tmp_path, path).map_err(write_err)?;

        log::debug!("Register written to {}", path.display());
        Ok(())
    }

    /// Load a register from `path`.
    ///
    /// Groups with fewer than two locations are accepted; they simply have
    /// nothing to delete.
    ///
    /// # Errors
    ///
    /// - [`RegisterError::NotFound`] if `path` does not exist
    /// - [`RegisterError::Read`] if it cannot be read
    /// - [`RegisterError::Parse`] if it is not a register document
    pub fn load(path: &Path) -> Result<Self, RegisterError> {
        if !path.exists() {
            return Err(RegisterError::NotFound(path.to_path_buf()));
        }
        let content = fs::read_to_string(path).map_err(|source| RegisterError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let register = Self::from_json(&content).map_err(|source| RegisterError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        let degenerate = register.groups().filter(|g| !g.has_removables()).count();
        if degenerate > 0 {
            log::warn!(
                "{} group(s) in {} have fewer than two locations and will be ignored",
                degenerate,
                path.display()
            );
        }
        log::debug!(
            "Loaded register {} with {} group(s)",
            path.display(),
            register.len()
        );
        Ok(register)
    }
}
