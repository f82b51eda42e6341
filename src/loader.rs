use std::path::Path;

use crate::errors::BencherError;

/// Read a whole file into memory.
pub fn read_all(path: &Path) -> Result<Vec<u8>, BencherError> {
    std::fs::read(path).map_err(|source| BencherError::ReadFile {
        path: path.to_path_buf(),
        source,
    })
}
