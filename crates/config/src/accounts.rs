//! Saved accounts.
//!
//! Every saved credential lives in one JSON document stored under a single
//! secret key:
//!
//! ```json
//! {"accounts":[{"credential":{"type":"s3","access_key":"…","secret":"…"}}]}
//! ```

use crate::error::{ErrorKind, Result};
use crate::secret::SecretStore;
use exn::ResultExt;
use serde::{Deserialize, Serialize};
use strata_storage::Credential;

/// Secret key the account document is stored under.
pub const ACCOUNTS_KEY: &str = "accounts";

#[derive(Serialize)]
struct Document<'a> {
    accounts: Vec<Record<&'a Credential>>,
}

#[derive(Deserialize)]
struct LooseDocument {
    #[serde(default)]
    accounts: Vec<serde_json::Value>,
}

#[derive(Serialize, Deserialize)]
struct Record<C> {
    credential: C,
}

/// Saved credentials, kept in a [`SecretStore`].
///
/// Accounts are identified by their [display name](Credential::display_name).
pub struct AccountStore {
    secrets: Box<dyn SecretStore>,
}

impl AccountStore {
    pub fn new(secrets: impl SecretStore + 'static) -> Self {
        Self { secrets: Box::new(secrets) }
    }

    /// Every saved credential, in the order they were added.
    ///
    /// Records that no longer parse (from a newer version, or edited by hand)
    /// are skipped with a warning so one bad record cannot lock the user out
    /// of the rest.
    pub fn load(&self) -> Result<Vec<Credential>> {
        let Some(json) = self.secrets.read(ACCOUNTS_KEY)? else {
            return Ok(Vec::new());
        };
        let document: LooseDocument = serde_json::from_str(&json).or_raise(|| ErrorKind::Serialization)?;
        let mut credentials = Vec::with_capacity(document.accounts.len());
        for (index, record) in document.accounts.into_iter().enumerate() {
            match serde_json::from_value::<Record<Credential>>(record) {
                Ok(record) => credentials.push(record.credential),
                Err(err) => tracing::warn!(index, error = %err, "skipping unreadable saved account"),
            }
        }
        Ok(credentials)
    }

    /// Replace every saved credential with `credentials`.
    pub fn save(&self, credentials: &[Credential]) -> Result<()> {
        let document = Document { accounts: credentials.iter().map(|credential| Record { credential }).collect() };
        let json = serde_json::to_string(&document).or_raise(|| ErrorKind::Serialization)?;
        self.secrets.write(ACCOUNTS_KEY, &json)?;
        tracing::debug!(count = credentials.len(), "saved accounts");
        Ok(())
    }

    /// Save `credential`, replacing any saved account with the same name.
    pub fn add(&self, credential: Credential) -> Result<Vec<Credential>> {
        let name = credential.display_name();
        let mut credentials = self.load()?;
        match credentials.iter_mut().find(|saved| saved.display_name() == name) {
            Some(saved) => *saved = credential,
            None => credentials.push(credential),
        }
        self.save(&credentials)?;
        Ok(credentials)
    }

    /// Forget the account called `name`. Returns `false` if there was none.
    pub fn remove(&self, name: &str) -> Result<bool> {
        let mut credentials = self.load()?;
        let before = credentials.len();
        credentials.retain(|saved| saved.display_name() != name);
        if credentials.len() == before {
            return Ok(false);
        }
        self.save(&credentials)?;
        Ok(true)
    }

    /// The saved account called `name`.
    pub fn find(&self, name: &str) -> Result<Option<Credential>> {
        Ok(self.load()?.into_iter().find(|saved| saved.display_name() == name))
    }
}
