//! Settings, secret storage and saved accounts for strata.

pub mod accounts;
pub mod error;
pub mod secret;
mod settings;

pub use crate::accounts::AccountStore;
pub use crate::secret::{KeyringStore, MemoryStore, SecretStore};
pub use crate::settings::{ENV_PREFIX, Settings, config_path};
