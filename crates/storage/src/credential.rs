//! Account credentials.
//!
//! A [`Credential`] is the persisted description of one storage account. It
//! is a closed set of variants, one per supported provider, and
//! [`connect()`](Credential::connect) turns it into a live account handle.

use crate::AccountHandle;
use crate::backend::AccountKind;
use crate::error::{ErrorKind, Result};
use serde::{Deserialize, Serialize};
use std::fmt::{Debug, Formatter, Result as FmtResult};

const REDACTED: &str = "<redacted>";
const DEFAULT_S3_REGION: &str = "us-east-1";
const DEFAULT_AZURE_ENDPOINT_SUFFIX: &str = "core.windows.net";

/// Credentials of one storage account.
///
/// Serialized with an internal `type` tag:
///
/// ```
/// use strata_storage::Credential;
///
/// let json = r#"{"type":"s3","access_key":"AKIA","secret":"shh","region":"eu-west-1"}"#;
/// let credential: Credential = serde_json::from_str(json).unwrap();
/// assert_eq!(credential.display_name(), "AWS S3 (eu-west-1)");
/// ```
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Credential {
    /// AWS S3 or any S3-compatible service.
    S3 {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        access_key: String,
        secret: String,
        /// Custom endpoint URL for S3-compatible services.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        endpoint: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        region: Option<String>,
    },
    AzureBlob {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        connection_string: String,
        /// Containers to expose; the object-store client cannot enumerate them.
        #[serde(default)]
        containers: Vec<String>,
    },
    GoogleCloud {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        /// Service account key file contents (JSON).
        service_account: String,
        #[serde(default)]
        buckets: Vec<String>,
    },
}

impl Credential {
    pub fn kind(&self) -> AccountKind {
        match self {
            Self::S3 { .. } => AccountKind::AwsS3,
            Self::AzureBlob { .. } => AccountKind::AzureBlobStorage,
            Self::GoogleCloud { .. } => AccountKind::GoogleCloudStorage,
        }
    }

    /// Name the account is shown under.
    ///
    /// An explicit name wins. Otherwise S3 accounts are named after their
    /// endpoint (or region), Azure accounts after the storage account and
    /// Google accounts after the service account's project.
    pub fn display_name(&self) -> String {
        match self {
            Self::S3 { name: Some(name), .. }
            | Self::AzureBlob { name: Some(name), .. }
            | Self::GoogleCloud { name: Some(name), .. } => name.clone(),
            Self::S3 { endpoint: Some(endpoint), .. } => endpoint.clone(),
            Self::S3 { region, .. } => {
                format!("{} ({})", AccountKind::AwsS3, region.as_deref().unwrap_or(DEFAULT_S3_REGION))
            },
            Self::AzureBlob { connection_string, .. } => match AzureConnection::parse(connection_string) {
                Ok(connection) => connection.account_name,
                Err(_) => AccountKind::AzureBlobStorage.to_string(),
            },
            Self::GoogleCloud { service_account, .. } => match project_id(service_account) {
                Some(project) => project,
                None => AccountKind::GoogleCloudStorage.to_string(),
            },
        }
    }

    /// Check that every required field is present.
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::S3 { access_key, secret, .. } => {
                if access_key.trim().is_empty() || secret.trim().is_empty() {
                    exn::bail!(ErrorKind::InvalidCredential("access key and secret are required".to_string()));
                }
            },
            Self::AzureBlob { connection_string, containers, .. } => {
                AzureConnection::parse(connection_string)?;
                if containers.is_empty() {
                    exn::bail!(ErrorKind::InvalidCredential("at least one container is required".to_string()));
                }
            },
            Self::GoogleCloud { service_account, buckets, .. } => {
                if project_id(service_account).is_none() {
                    exn::bail!(ErrorKind::InvalidCredential(
                        "service account key is not valid JSON with a project_id".to_string()
                    ));
                }
                if buckets.is_empty() {
                    exn::bail!(ErrorKind::InvalidCredential("at least one bucket is required".to_string()));
                }
            },
        }
        Ok(())
    }

    /// Build a live account handle for this credential.
    ///
    /// No network traffic happens here; connection problems surface on the
    /// first [`list_buckets()`](crate::StorageAccount::list_buckets) call.
    /// Backends that were not compiled in fail with
    /// [`Unsupported`](ErrorKind::Unsupported).
    pub async fn connect(&self) -> Result<AccountHandle> {
        self.validate()?;
        let name = self.display_name();
        tracing::debug!(account = %name, kind = %self.kind(), "connecting account");
        match self {
            #[cfg(feature = "s3")]
            Self::S3 { access_key, secret, endpoint, region, .. } => {
                let region = region.clone().unwrap_or_else(|| DEFAULT_S3_REGION.to_string());
                let account =
                    crate::backend::S3Account::new(name, access_key.clone(), secret.clone(), region, endpoint.clone());
                Ok(std::sync::Arc::new(account))
            },
            #[cfg(feature = "azure")]
            Self::AzureBlob { connection_string, containers, .. } => {
                let connection = AzureConnection::parse(connection_string)?;
                let account = crate::backend::ObjectStoreAccount::azure(name, &connection, containers)?;
                Ok(std::sync::Arc::new(account))
            },
            #[cfg(feature = "gcs")]
            Self::GoogleCloud { service_account, buckets, .. } => {
                let account = crate::backend::ObjectStoreAccount::gcs(name, service_account, buckets)?;
                Ok(std::sync::Arc::new(account))
            },
            #[allow(unreachable_patterns)]
            _ => exn::bail!(ErrorKind::Unsupported(self.kind().to_string())),
        }
    }
}

impl Debug for Credential {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::S3 { name, access_key, endpoint, region, .. } => f
                .debug_struct("S3")
                .field("name", name)
                .field("access_key", access_key)
                .field("secret", &REDACTED)
                .field("endpoint", endpoint)
                .field("region", region)
                .finish(),
            Self::AzureBlob { name, containers, .. } => f
                .debug_struct("AzureBlob")
                .field("name", name)
                .field("connection_string", &REDACTED)
                .field("containers", containers)
                .finish(),
            Self::GoogleCloud { name, buckets, .. } => f
                .debug_struct("GoogleCloud")
                .field("name", name)
                .field("service_account", &REDACTED)
                .field("buckets", buckets)
                .finish(),
        }
    }
}

/// Parsed Azure storage connection string.
#[derive(Clone, PartialEq, Eq)]
pub struct AzureConnection {
    pub account_name: String,
    pub account_key: String,
    /// Explicit blob service endpoint (`BlobEndpoint=`), or one built from
    /// the protocol and endpoint suffix when the suffix isn't the public one.
    pub blob_endpoint: Option<String>,
    /// `UseDevelopmentStorage=true`: talk to a local emulator.
    pub use_emulator: bool,
    /// `DefaultEndpointsProtocol=http`.
    pub allow_http: bool,
}

impl AzureConnection {
    /// Well-known account of the local storage emulator.
    const EMULATOR_ACCOUNT: &'static str = "devstoreaccount1";

    /// Parse a `Key=Value;Key=Value` connection string. Keys are matched
    /// case-insensitively; values may themselves contain `=`.
    pub fn parse(connection_string: &str) -> Result<Self> {
        let mut account_name = None;
        let mut account_key = None;
        let mut blob_endpoint = None;
        let mut endpoint_suffix = None;
        let mut protocol = None;
        let mut use_emulator = false;
        for part in connection_string.split(';').map(str::trim).filter(|part| !part.is_empty()) {
            let Some((key, value)) = part.split_once('=') else {
                exn::bail!(ErrorKind::InvalidCredential(format!("malformed connection string segment '{part}'")));
            };
            match key.trim().to_ascii_lowercase().as_str() {
                "accountname" => account_name = Some(value.to_string()),
                "accountkey" => account_key = Some(value.to_string()),
                "blobendpoint" => blob_endpoint = Some(value.trim_end_matches('/').to_string()),
                "endpointsuffix" => endpoint_suffix = Some(value.to_string()),
                "defaultendpointsprotocol" => protocol = Some(value.to_ascii_lowercase()),
                "usedevelopmentstorage" => use_emulator = value.eq_ignore_ascii_case("true"),
                _ => {},
            }
        }
        if use_emulator {
            return Ok(Self {
                account_name: Self::EMULATOR_ACCOUNT.to_string(),
                account_key: String::new(),
                blob_endpoint,
                use_emulator,
                allow_http: true,
            });
        }
        let (Some(account_name), Some(account_key)) = (account_name, account_key) else {
            exn::bail!(ErrorKind::InvalidCredential(
                "connection string needs AccountName and AccountKey".to_string()
            ));
        };
        let protocol = protocol.unwrap_or_else(|| "https".to_string());
        let blob_endpoint = blob_endpoint.or_else(|| {
            endpoint_suffix
                .filter(|suffix| suffix != DEFAULT_AZURE_ENDPOINT_SUFFIX)
                .map(|suffix| format!("{protocol}://{account_name}.blob.{suffix}"))
        });
        Ok(Self {
            account_name,
            account_key,
            allow_http: protocol == "http",
            blob_endpoint,
            use_emulator,
        })
    }
}

impl Debug for AzureConnection {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("AzureConnection")
            .field("account_name", &self.account_name)
            .field("account_key", &REDACTED)
            .field("blob_endpoint", &self.blob_endpoint)
            .field("use_emulator", &self.use_emulator)
            .field("allow_http", &self.allow_http)
            .finish()
    }
}

/// `project_id` of a service account key file.
fn project_id(service_account: &str) -> Option<String> {
    #[derive(Deserialize)]
    struct ServiceAccountKey {
        project_id: String,
    }
    serde_json::from_str::<ServiceAccountKey>(service_account).ok().map(|key| key.project_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn s3(name: Option<&str>, endpoint: Option<&str>) -> Credential {
        Credential::S3 {
            name: name.map(str::to_string),
            access_key: "AKIA".to_string(),
            secret: "shh".to_string(),
            endpoint: endpoint.map(str::to_string),
            region: None,
        }
    }

    #[test]
    fn test_tagged_serialization() {
        let credential = Credential::AzureBlob {
            name: None,
            connection_string: "AccountName=acct;AccountKey=a2V5".to_string(),
            containers: vec!["photos".to_string()],
        };
        let json = serde_json::to_value(&credential).unwrap();
        assert_eq!(json["type"], "azure_blob");
        assert_eq!(json["containers"][0], "photos");
        let back: Credential = serde_json::from_value(json).unwrap();
        assert_eq!(back, credential);
    }

    #[rstest]
    #[case(s3(Some("Backups"), Some("https://minio.local")), "Backups")]
    #[case(s3(None, Some("https://minio.local")), "https://minio.local")]
    #[case(s3(None, None), "AWS S3 (us-east-1)")]
    fn test_s3_display_name(#[case] credential: Credential, #[case] expected: &str) {
        assert_eq!(credential.display_name(), expected);
    }

    #[test]
    fn test_google_display_name_uses_project() {
        let credential = Credential::GoogleCloud {
            name: None,
            service_account: r#"{"type":"service_account","project_id":"my-project"}"#.to_string(),
            buckets: vec!["backups".to_string()],
        };
        assert_eq!(credential.display_name(), "my-project");
        assert!(credential.validate().is_ok());
    }

    #[rstest]
    #[case(Credential::AzureBlob {
        name: None,
        connection_string: "AccountName=acct;AccountKey=a2V5".to_string(),
        containers: vec![],
    })]
    #[case(Credential::GoogleCloud {
        name: None,
        service_account: r#"{"type":"service_account","project_id":"my-project"}"#.to_string(),
        buckets: vec![],
    })]
    fn test_validate_requires_buckets(#[case] credential: Credential) {
        let err = credential.validate().unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidCredential(message) if message.starts_with("at least one")));
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let debug = format!("{:?}", s3(None, None));
        assert!(debug.contains("AKIA"));
        assert!(!debug.contains("shh"));
    }

    #[test]
    fn test_validate() {
        let mut credential = s3(None, None);
        assert!(credential.validate().is_ok());
        if let Credential::S3 { secret, .. } = &mut credential {
            secret.clear();
        }
        let err = credential.validate().unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidCredential(_)));

        let credential = Credential::GoogleCloud { name: None, service_account: "nope".to_string(), buckets: vec![] };
        assert!(credential.validate().is_err());
    }

    #[test]
    fn test_parse_connection_string() {
        let connection = AzureConnection::parse(
            "DefaultEndpointsProtocol=https;AccountName=acct;AccountKey=a2V5PT0=;EndpointSuffix=core.windows.net",
        )
        .unwrap();
        assert_eq!(connection.account_name, "acct");
        // Values keep their own '=' padding.
        assert_eq!(connection.account_key, "a2V5PT0=");
        assert_eq!(connection.blob_endpoint, None);
        assert!(!connection.allow_http);
        assert!(!connection.use_emulator);
    }

    #[test]
    fn test_parse_connection_string_sovereign_cloud() {
        let connection =
            AzureConnection::parse("AccountName=acct;AccountKey=k;EndpointSuffix=core.chinacloudapi.cn").unwrap();
        assert_eq!(connection.blob_endpoint.as_deref(), Some("https://acct.blob.core.chinacloudapi.cn"));
        let connection =
            AzureConnection::parse("AccountName=acct;AccountKey=k;BlobEndpoint=http://127.0.0.1:9000/acct/").unwrap();
        assert_eq!(connection.blob_endpoint.as_deref(), Some("http://127.0.0.1:9000/acct"));
    }

    #[test]
    fn test_parse_connection_string_emulator() {
        let connection = AzureConnection::parse("UseDevelopmentStorage=true").unwrap();
        assert!(connection.use_emulator);
        assert_eq!(connection.account_name, "devstoreaccount1");
    }

    #[rstest]
    #[case("")]
    #[case("AccountName=acct")]
    #[case("AccountName=acct;garbage")]
    fn test_parse_connection_string_rejects(#[case] connection_string: &str) {
        let err = AzureConnection::parse(connection_string).unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidCredential(_)));
    }
}
