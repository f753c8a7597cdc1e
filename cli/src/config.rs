use std::path::PathBuf;

use anyhow::Context as _;
use linkgrade_core::Config;

use crate::cmd::Args;

pub const APP_NAME: &str = "linkgrade";

pub fn default_data_dir() -> anyhow::Result<PathBuf> {
    let dir = dirs::cache_dir().context("Failed to get user's cache dir path")?;
    Ok(dir.join(APP_NAME))
}

/// `--data-dir`, else `[paths] data_dir`, else the user cache dir.
pub fn data_dir(args: &Args, cfg: &Config) -> anyhow::Result<PathBuf> {
    match args.data_dir.as_ref().or(cfg.paths.data_dir.as_ref()) {
        Some(dir) => Ok(dir.clone()),
        None => self::default_data_dir(),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use clap::Parser;

    #[test]
    fn command_line_wins_over_config() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = Config::load(None, dir.path()).unwrap();
        cfg.paths.data_dir = Some(dir.path().join("from-config"));

        let args = Args::parse_from(["linkgrade", "subs", "--data-dir", "/tmp/cli"]);
        assert_eq!(data_dir(&args, &cfg).unwrap(), PathBuf::from("/tmp/cli"));

        let args = Args::parse_from(["linkgrade", "subs"]);
        assert_eq!(data_dir(&args, &cfg).unwrap(), dir.path().join("from-config"));
    }
}
