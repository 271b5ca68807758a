//! Layered settings: defaults, then `config.toml`, then `STRATA_*`
//! environment variables.

use crate::error::{ErrorKind, Result};
use directories::ProjectDirs;
use exn::ResultExt;
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use strata_storage::DEFAULT_PAGE_SIZE;

/// Prefix of environment variables overriding settings, e.g.
/// `STRATA_PAGE_SIZE=100`.
pub const ENV_PREFIX: &str = "STRATA_";
const CONFIG_FILE: &str = "config.toml";
const DEFAULT_LINK_LIFETIME: Duration = Duration::from_secs(24 * 60 * 60);
const DEFAULT_KEYRING_SERVICE: &str = "strata";

/// Where the settings file lives on this platform, if there is a home
/// directory to put it in.
pub fn config_path() -> Option<PathBuf> {
    ProjectDirs::from("", "", "strata").map(|dirs| dirs.config_dir().join(CONFIG_FILE))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Entries per page when browsing.
    pub page_size: usize,
    /// Lifetime of generated links, in seconds.
    pub link_lifetime_secs: u64,
    /// Default destination for downloads; the working directory when unset.
    pub download_dir: Option<PathBuf>,
    /// Keyring service saved accounts are stored under.
    pub keyring_service: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            link_lifetime_secs: DEFAULT_LINK_LIFETIME.as_secs(),
            download_dir: None,
            keyring_service: DEFAULT_KEYRING_SERVICE.to_string(),
        }
    }
}

impl Settings {
    /// Load from the platform config file (when there is one) and the
    /// environment.
    pub fn load() -> Result<Self> {
        Self::load_from(config_path().as_deref())
    }

    /// Load from an explicit settings file and the environment. A file that
    /// does not exist contributes nothing.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new().merge(Serialized::defaults(Self::default()));
        if let Some(path) = path {
            tracing::debug!(path = %path.display(), "loading settings file");
            figment = figment.merge(Toml::file(path));
        }
        let settings: Self = figment.merge(Env::prefixed(ENV_PREFIX)).extract().or_raise(|| ErrorKind::Settings)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.page_size == 0 {
            exn::bail!(ErrorKind::InvalidSettings("page_size must be at least 1".to_string()));
        }
        if self.link_lifetime_secs == 0 {
            exn::bail!(ErrorKind::InvalidSettings("link_lifetime_secs must be at least 1".to_string()));
        }
        if self.keyring_service.trim().is_empty() {
            exn::bail!(ErrorKind::InvalidSettings("keyring_service must not be empty".to_string()));
        }
        Ok(())
    }

    pub fn link_lifetime(&self) -> Duration {
        Duration::from_secs(self.link_lifetime_secs)
    }
}
