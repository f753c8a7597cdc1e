use std::path::{Path, PathBuf};
use std::result::Result as StdResult;
use std::time::Duration;

use anyhow::Context as _;
use rust_embed::RustEmbed;
use serde::Deserialize;

use crate::impairment::{ImpairmentProfile, Knob};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Config {
    #[serde(skip)]
    pub source_config_file: Option<PathBuf>,
    pub paths: PathsConfig,
    pub programs: ProgramsConfig,
    pub harness: HarnessConfig,
    pub link: LinkConfig,
    pub archive: ArchiveConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PathsConfig {
    pub log_dir: PathBuf,
    pub results_dir: PathBuf,
    /// `None` lets the caller pick a cache directory.
    pub data_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProgramsConfig {
    pub linksim: PathBuf,
    pub ref_sender: PathBuf,
    pub ref_receiver: PathBuf,
    pub sender: String,
    pub receiver: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HarnessConfig {
    pub log_cap: u64,
    pub packet_size: u64,
    pub kill_stray: bool,
    pub make_tests: bool,
    pub make_timeout_secs: u64,
    pub make_tests_timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LinkConfig {
    pub port: u64,
    pub forward_port: u64,
    pub seed: u64,
    pub sender_host: String,
    pub receiver_host: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ArchiveConfig {
    pub required: Vec<String>,
}

#[derive(RustEmbed)]
#[folder = "assets/"]
struct Asset;

impl Config {
    pub const FILENAME: &str = "linkgrade.toml";

    pub fn default_toml() -> anyhow::Result<String> {
        let file = Asset::get(Self::FILENAME).context("Default config is not embedded")?;
        let s = std::str::from_utf8(file.data.as_ref()).context("Default config is not UTF-8")?;
        Ok(s.to_owned())
    }

    pub fn from_toml(s: &str) -> StdResult<Self, toml::de::Error> {
        toml::from_str(s)
    }

    pub fn from_toml_file(filepath: PathBuf) -> anyhow::Result<Self> {
        let toml = fsutil::read_to_string(&filepath).context("Cannot read a file")?;
        let mut cfg = Self::from_toml(&toml)
            .with_context(|| format!("Invalid config TOML: {:?}", filepath))?;
        if let Some(dir) = filepath.parent() {
            cfg.resolve_paths(dir);
        }
        cfg.source_config_file = Some(filepath);
        Ok(cfg)
    }

    /// Find config file ancestor dirs, including current dir.
    pub fn find_file_in_ancestors(cur_dir: impl AsRef<Path>) -> Option<PathBuf> {
        cur_dir
            .as_ref()
            .ancestors()
            .map(|dir| dir.join(Self::FILENAME))
            .find(|path| path.is_file())
    }

    /// `explicit`, else the nearest `linkgrade.toml` above `cur_dir`, else the
    /// built-in default with paths relative to `cur_dir`.
    pub fn load(explicit: Option<PathBuf>, cur_dir: impl AsRef<Path>) -> anyhow::Result<Self> {
        let cur_dir = cur_dir.as_ref();
        if let Some(path) = explicit.or_else(|| Self::find_file_in_ancestors(cur_dir)) {
            log::debug!("Using config {}", path.to_string_lossy());
            return Self::from_toml_file(path);
        }
        log::debug!("No {} found, using the built-in default", Self::FILENAME);
        let mut cfg = Self::from_toml(&Self::default_toml()?).context("Invalid built-in config")?;
        cfg.resolve_paths(cur_dir);
        Ok(cfg)
    }

    fn resolve_paths(&mut self, base: &Path) {
        let paths = &mut self.paths;
        paths.log_dir = base.join(&paths.log_dir);
        paths.results_dir = base.join(&paths.results_dir);
        paths.data_dir = paths.data_dir.as_ref().map(|d| base.join(d));

        let programs = &mut self.programs;
        for p in [
            &mut programs.linksim,
            &mut programs.ref_sender,
            &mut programs.ref_receiver,
        ] {
            // Bare names stay PATH lookups.
            if p.is_relative() && p.components().count() > 1 {
                *p = base.join(&*p);
            }
        }
    }

    /// Programs killed before every test, or none when disabled.
    pub fn stray_programs(&self) -> Vec<String> {
        if !self.harness.kill_stray {
            return Vec::new();
        }
        let linksim = self
            .programs
            .linksim
            .file_name()
            .map(|n| n.to_string_lossy().into_owned());
        linksim
            .into_iter()
            .chain([self.programs.sender.clone(), self.programs.receiver.clone()])
            .collect()
    }
}

impl HarnessConfig {
    pub fn make_timeout(&self) -> Duration {
        Duration::from_secs(self.make_timeout_secs)
    }

    pub fn make_tests_timeout(&self) -> Duration {
        Duration::from_secs(self.make_tests_timeout_secs)
    }
}

impl LinkConfig {
    /// Ports and seed; impairments are layered on top.
    pub fn base_profile(&self) -> ImpairmentProfile {
        ImpairmentProfile::new()
            .set(Knob::Port, self.port)
            .set(Knob::ForwardPort, self.forward_port)
            .set(Knob::Seed, self.seed)
    }
}
