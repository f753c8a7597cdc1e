use std::path::PathBuf;

use anyhow::Context as _;
use linkgrade_core::{
    action::{self, GradeContext},
    store::ResultStore,
    Config,
};

use crate::{config, logging, util};

#[derive(Debug, clap::Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Directory containing one sub-directory per submission
    #[arg()] // positional argument
    pub submissions_dir: Option<PathBuf>,

    /// Seed the results with a previous results_<timestamp>.json
    #[arg(long, value_name = "RESULTS_FILE")]
    pub reload: Option<PathBuf>,

    /// Use this linkgrade.toml instead of searching for one
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Where generated input files are kept
    #[arg(long)]
    pub data_dir: Option<PathBuf>,
}

pub type CmdResult = anyhow::Result<()>;

impl Args {
    pub async fn exec(&self, submissions_dir: PathBuf) -> CmdResult {
        let cfg = Config::load(self.config.clone(), util::current_dir()?)?;
        logging::init(&cfg.paths.log_dir)?;
        if let Some(path) = &cfg.source_config_file {
            log::info!("Config: {:?}", util::replace_homedir_to_tilde(path));
        }

        let mut store = ResultStore::new();
        if let Some(prior) = &self.reload {
            store
                .seed_from(prior)
                .with_context(|| format!("Cannot reload results from {:?}", prior))?;
            log::info!("Reloaded results from {:?}", prior);
        }

        let data_dir = config::data_dir(self, &cfg)?;
        let mut ctx = GradeContext::new(&cfg, data_dir);
        let snapshot = action::grade_all(&mut ctx, &mut store, submissions_dir).await?;
        linkgrade_core::print_success!(
            "Results saved to {:?}",
            util::replace_homedir_to_tilde(snapshot)
        );
        Ok(())
    }
}
