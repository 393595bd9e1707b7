pub mod compare;
pub mod login;
pub mod members;
pub mod progress;
pub mod prompts;
pub mod report;
pub mod scope;
pub mod tenant;

use colored::Colorize;
use dirctl::config::{Config, ConfigManager};
use dirctl::directory::{Directory, DirectoryProvider, SourceSpec};
use dirctl::error::Result;
use dirctl::input::{self, IdentityList};
use std::path::{Path, PathBuf};

/// Configuration shared by every subcommand
pub struct Context {
    pub config: ConfigManager,
    pub settings: Config,
}

impl Context {
    pub fn load() -> Result<Self> {
        let config = ConfigManager::new()?;
        let settings = config.load_config()?;
        Ok(Self { config, settings })
    }

    pub fn log_dir(&self) -> PathBuf {
        self.config.log_dir(&self.settings)
    }

    /// `--output` when given, otherwise a timestamped `<prefix>-*.csv`
    pub fn report_path(&self, output: Option<&Path>, prefix: &str) -> PathBuf {
        let file = output
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(dirctl::report::default_file_name(prefix)));
        self.config.output_path(&self.settings, &file)
    }

    pub fn read_identities(&self, path: &Path, column: Option<&str>) -> Result<IdentityList> {
        let accepted = input::accepted_columns(&self.settings.identity_columns);
        let list = input::read_identities_file(path, column, &accepted)?;
        println!(
            "{} Read {} identities from {} (column '{}')",
            "→".cyan(),
            list.identities.len(),
            path.display(),
            list.column
        );
        Ok(list)
    }

    /// Connect to a directory, showing a spinner while authenticating
    pub async fn open(&self, spec: &SourceSpec) -> Result<Directory> {
        let spinner = progress::create_spinner(&format!("Connecting to {}...", spec));
        match Directory::open(spec, &self.config).await {
            Ok(directory) => {
                progress::finish_spinner_success(
                    &spinner,
                    &format!("Connected to {}", directory.label()),
                );
                Ok(directory)
            }
            Err(e) => {
                progress::finish_spinner_error(&spinner, &format!("Cannot open {}", spec));
                Err(e)
            }
        }
    }
}
