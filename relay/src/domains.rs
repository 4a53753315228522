//! Allowed-domains store.
//!
//! Persists the ordered allow-list as a pretty-printed JSON array at
//! `<data-dir>/allowed_domains.json` with 0600 permissions. A missing
//! file is an empty list. Entries are kept lowercase; adds are
//! idempotent.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tokio::fs;
use tokio::sync::RwLock;

const DOMAINS_FILE: &str = "allowed_domains.json";

pub struct DomainStore {
    path: PathBuf,
    domains: RwLock<Vec<String>>,
}

impl DomainStore {
    /// Loads the store from the data directory.
    pub async fn open(data_dir: &Path) -> Result<Self> {
        let path = data_dir.join(DOMAINS_FILE);
        let domains = match fs::read(&path).await {
            Ok(data) => serde_json::from_slice(&data)
                .with_context(|| format!("parse {}", path.display()))?,
            Err(err) if err.kind() == ErrorKind::NotFound => Vec::new(),
            Err(err) => {
                return Err(err).with_context(|| format!("read {}", path.display()));
            }
        };
        Ok(Self {
            path,
            domains: RwLock::new(domains),
        })
    }

    pub async fn list(&self) -> Vec<String> {
        self.domains.read().await.clone()
    }

    /// Adds a domain and persists. Empty input and duplicates are
    /// no-ops.
    pub async fn add(&self, domain: &str) -> Result<()> {
        let domain = domain.trim().to_ascii_lowercase();
        if domain.is_empty() {
            return Ok(());
        }
        let mut domains = self.domains.write().await;
        if domains.iter().any(|existing| existing == &domain) {
            return Ok(());
        }
        domains.push(domain);
        self.save(&domains).await
    }

    /// Removes a domain and persists. Absent domains are a no-op.
    pub async fn remove(&self, domain: &str) -> Result<()> {
        let domain = domain.trim().to_ascii_lowercase();
        let mut domains = self.domains.write().await;
        let before = domains.len();
        domains.retain(|existing| existing != &domain);
        if domains.len() == before {
            return Ok(());
        }
        self.save(&domains).await
    }

    async fn save(&self, domains: &[String]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("create {}", parent.display()))?;
        }
        let data = serde_json::to_vec_pretty(&domains)?;
        fs::write(&self.path, data)
            .await
            .with_context(|| format!("write {}", self.path.display()))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&self.path, std::fs::Permissions::from_mode(0o600))
                .await
                .with_context(|| format!("chmod {}", self.path.display()))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_file_is_empty_list() {
        let dir = tempfile::tempdir().unwrap();
        let store = DomainStore::open(dir.path()).await.unwrap();
        assert!(store.list().await.is_empty());
    }

    #[tokio::test]
    async fn add_persists_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let store = DomainStore::open(dir.path()).await.unwrap();
        store.add("My.Domain").await.unwrap();
        store.add("other.domain").await.unwrap();

        let reloaded = DomainStore::open(dir.path()).await.unwrap();
        assert_eq!(reloaded.list().await, vec!["my.domain", "other.domain"]);
    }

    #[tokio::test]
    async fn add_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = DomainStore::open(dir.path()).await.unwrap();
        store.add("my.domain").await.unwrap();
        store.add("MY.DOMAIN").await.unwrap();
        store.add("  my.domain  ").await.unwrap();
        assert_eq!(store.list().await, vec!["my.domain"]);
    }

    #[tokio::test]
    async fn add_empty_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let store = DomainStore::open(dir.path()).await.unwrap();
        store.add("   ").await.unwrap();
        assert!(store.list().await.is_empty());
        assert!(!dir.path().join(DOMAINS_FILE).exists());
    }

    #[tokio::test]
    async fn remove_and_double_remove() {
        let dir = tempfile::tempdir().unwrap();
        let store = DomainStore::open(dir.path()).await.unwrap();
        store.add("my.domain").await.unwrap();
        store.remove("my.domain").await.unwrap();
        store.remove("my.domain").await.unwrap();
        assert!(store.list().await.is_empty());

        let reloaded = DomainStore::open(dir.path()).await.unwrap();
        assert!(reloaded.list().await.is_empty());
    }

    #[tokio::test]
    async fn file_is_pretty_printed_json() {
        let dir = tempfile::tempdir().unwrap();
        let store = DomainStore::open(dir.path()).await.unwrap();
        store.add("a.example").await.unwrap();
        store.add("b.example").await.unwrap();

        let raw = std::fs::read_to_string(dir.path().join(DOMAINS_FILE)).unwrap();
        assert_eq!(raw, "[\n  \"a.example\",\n  \"b.example\"\n]");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let store = DomainStore::open(dir.path()).await.unwrap();
        store.add("a.example").await.unwrap();
        let mode = std::fs::metadata(dir.path().join(DOMAINS_FILE))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
