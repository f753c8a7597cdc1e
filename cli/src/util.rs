use std::path::{Path, PathBuf};

use anyhow::Context as _;

pub fn current_dir() -> anyhow::Result<PathBuf> {
    std::env::current_dir().context("Failed to get current dir")
}

/// `~/...` for paths under the home directory, for log lines.
pub fn replace_homedir_to_tilde(path: impl Into<PathBuf>) -> PathBuf {
    let path = path.into();
    let Some(home_dir) = ::dirs::home_dir() else {
        return path
    };
    path.strip_prefix(&home_dir)
        .map(|rest| Path::new("~").join(rest))
        .unwrap_or(path)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn paths_outside_home_are_untouched() {
        assert_eq!(
            replace_homedir_to_tilde("/nonexistent-root/results.json"),
            Path::new("/nonexistent-root/results.json")
        );
    }
}
