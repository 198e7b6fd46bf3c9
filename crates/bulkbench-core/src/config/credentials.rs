//! Credentials for off-cluster archive locations.
//!
//! Azure blob storage is addressed as `azure://<container>?AZURE_ACCOUNT_NAME=..&AZURE_ACCOUNT_KEY=..`,
//! the form the database's BACKUP/RESTORE statements accept.

use std::fmt;

use url::Url;

use crate::error::{HarnessError, Result};

pub const AZURE_CONTAINER_VAR: &str = "AZURE_CONTAINER";
pub const AZURE_ACCOUNT_NAME_VAR: &str = "AZURE_ACCOUNT_NAME";
pub const AZURE_ACCOUNT_KEY_VAR: &str = "AZURE_ACCOUNT_KEY";

/// Query parameter names understood by the database's Azure storage backend.
pub const AZURE_ACCOUNT_NAME_PARAM: &str = "AZURE_ACCOUNT_NAME";
pub const AZURE_ACCOUNT_KEY_PARAM: &str = "AZURE_ACCOUNT_KEY";

#[derive(Clone, PartialEq, Eq)]
pub struct AzureCredentials {
    pub container: String,
    pub account_name: String,
    pub account_key: String,
}

impl fmt::Debug for AzureCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AzureCredentials")
            .field("container", &self.container)
            .field("account_name", &self.account_name)
            .field("account_key", &"[REDACTED]")
            .finish()
    }
}

impl AzureCredentials {
    /// Read credentials from `AZURE_CONTAINER`, `AZURE_ACCOUNT_NAME` and `AZURE_ACCOUNT_KEY`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build credentials from explicit values, failing on any missing or empty one.
    pub fn from_parts(
        container: Option<&str>,
        account_name: Option<&str>,
        account_key: Option<&str>,
    ) -> Result<Self> {
        Self::from_lookup(|var| match var {
            AZURE_CONTAINER_VAR => container.map(str::to_string),
            AZURE_ACCOUNT_NAME_VAR => account_name.map(str::to_string),
            AZURE_ACCOUNT_KEY_VAR => account_key.map(str::to_string),
            _ => None,
        })
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |var: &str| lookup(var).filter(|v| !v.is_empty());
        let container = get(AZURE_CONTAINER_VAR);
        let account_name = get(AZURE_ACCOUNT_NAME_VAR);
        let account_key = get(AZURE_ACCOUNT_KEY_VAR);

        match (container, account_name, account_key) {
            (Some(container), Some(account_name), Some(account_key)) => Ok(Self {
                container,
                account_name,
                account_key,
            }),
            _ => Err(HarnessError::MissingCredentials(vec![
                AZURE_CONTAINER_VAR.to_string(),
                AZURE_ACCOUNT_NAME_VAR.to_string(),
                AZURE_ACCOUNT_KEY_VAR.to_string(),
            ])),
        }
    }

    /// Base URI (no path) for backups stored in this container.
    pub fn base_uri(&self) -> Result<Url> {
        let mut url = Url::parse(&format!("azure://{}", self.container))
            .map_err(|e| HarnessError::Config(format!("invalid Azure container: {e}")))?;
        url.query_pairs_mut()
            .append_pair(AZURE_ACCOUNT_NAME_PARAM, &self.account_name)
            .append_pair(AZURE_ACCOUNT_KEY_PARAM, &self.account_key);
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_parts_present() {
        let creds =
            AzureCredentials::from_parts(Some("backups"), Some("acct"), Some("a+b/c=")).unwrap();
        let uri = creds.base_uri().unwrap();
        assert_eq!(uri.scheme(), "azure");
        assert_eq!(uri.host_str(), Some("backups"));
        let pairs: Vec<(String, String)> = uri.query_pairs().into_owned().collect();
        assert_eq!(
            pairs,
            vec![
                ("AZURE_ACCOUNT_NAME".to_string(), "acct".to_string()),
                ("AZURE_ACCOUNT_KEY".to_string(), "a+b/c=".to_string()),
            ]
        );
    }

    #[test]
    fn missing_part_lists_all_vars() {
        let err = AzureCredentials::from_parts(Some("backups"), None, Some("key")).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("AZURE_CONTAINER"));
        assert!(msg.contains("AZURE_ACCOUNT_NAME"));
        assert!(msg.contains("AZURE_ACCOUNT_KEY"));
    }

    #[test]
    fn empty_value_counts_as_missing() {
        assert!(AzureCredentials::from_parts(Some(""), Some("acct"), Some("key")).is_err());
    }

    #[test]
    fn debug_redacts_key() {
        let creds =
            AzureCredentials::from_parts(Some("backups"), Some("acct"), Some("s3cret")).unwrap();
        let debug = format!("{creds:?}");
        assert!(debug.contains("REDACTED"));
        assert!(!debug.contains("s3cret"));
    }
}
