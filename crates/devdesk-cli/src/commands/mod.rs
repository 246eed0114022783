use std::path::{Path, PathBuf};

use crate::DEFAULT_FILENAMES;

pub mod check;
pub mod run;

/// The given config path, or the first default filename that exists.
fn resolve_file(file: Option<String>) -> PathBuf {
    file.map_or_else(
        || {
            DEFAULT_FILENAMES
                .iter()
                .find(|filename| Path::new(filename).exists())
                .map_or_else(|| PathBuf::from(DEFAULT_FILENAMES[0]), PathBuf::from)
        },
        PathBuf::from,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_file_wins() {
        assert_eq!(
            resolve_file(Some("elsewhere.toml".to_owned())),
            PathBuf::from("elsewhere.toml")
        );
    }
}
