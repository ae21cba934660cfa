// SPDX-FileCopyrightText: 2026 Rapidex Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! On-disk credential persistence, one directory per tenant.
//!
//! Layout under the sessions directory:
//!
//! ```text
//! <dir>/<eid>/creds.json     primary credential document
//! <dir>/<eid>/<key>.json     additional key material, one file per key
//! ```
//!
//! Every file is written to a temporary sibling, fsynced and renamed into
//! place, so a crash never leaves a half-written credential behind.

use std::collections::BTreeSet;
use std::io;
use std::path::{Path, PathBuf};

use rapidex_core::{AuthState, RapidexError, TenantId};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

const CREDS_FILE_STEM: &str = "creds";
const JSON_EXT: &str = ".json";

/// Per-tenant credential store rooted at the sessions directory.
#[derive(Debug, Clone)]
pub struct SessionStore {
    root: PathBuf,
}

impl SessionStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding one tenant's credential files.
    pub fn tenant_dir(&self, tenant: &TenantId) -> PathBuf {
        self.root.join(tenant.as_str())
    }

    /// Restore a tenant's credentials, creating its directory on first use.
    ///
    /// Returns an empty state for a new tenant. An unreadable or unparsable
    /// file is an error; it is never replaced by a fresh state.
    pub async fn load(&self, tenant: &TenantId) -> Result<AuthState, RapidexError> {
        let dir = self.tenant_dir(tenant);
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| RapidexError::session_io(tenant.as_str(), "create session directory", e))?;

        let mut auth = AuthState::default();
        let mut entries = fs::read_dir(&dir)
            .await
            .map_err(|e| RapidexError::session_io(tenant.as_str(), "list session directory", e))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| RapidexError::session_io(tenant.as_str(), "list session directory", e))?
        {
            let path = entry.path();
            let Some(stem) = json_stem(&path) else {
                continue;
            };
            let bytes = fs::read(&path).await.map_err(|e| {
                RapidexError::session_io(tenant.as_str(), &format!("read {stem}{JSON_EXT}"), e)
            })?;
            let value: serde_json::Value =
                serde_json::from_slice(&bytes).map_err(|e| RapidexError::Session {
                    tenant: tenant.to_string(),
                    message: format!("corrupt credential file {stem}{JSON_EXT}: {e}"),
                    source: Some(Box::new(e)),
                })?;
            if stem == CREDS_FILE_STEM {
                auth.creds = Some(value);
            } else {
                auth.keys.insert(stem, value);
            }
        }

        debug!(
            tenant = %tenant,
            has_creds = auth.creds.is_some(),
            keys = auth.keys.len(),
            "credentials loaded"
        );
        Ok(auth)
    }

    /// Durably replace a tenant's credentials with `auth`.
    ///
    /// Key files that are no longer part of the state are removed.
    pub async fn save(&self, tenant: &TenantId, auth: &AuthState) -> Result<(), RapidexError> {
        let dir = self.tenant_dir(tenant);
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| RapidexError::session_io(tenant.as_str(), "create session directory", e))?;

        let mut wanted = BTreeSet::new();
        if let Some(creds) = &auth.creds {
            self.write_json(tenant, &dir, CREDS_FILE_STEM, creds).await?;
            wanted.insert(CREDS_FILE_STEM.to_string());
        }
        for (name, value) in &auth.keys {
            if !is_safe_key_name(name) || name == CREDS_FILE_STEM {
                return Err(RapidexError::Session {
                    tenant: tenant.to_string(),
                    message: format!("invalid credential key name `{name}`"),
                    source: None,
                });
            }
            self.write_json(tenant, &dir, name, value).await?;
            wanted.insert(name.clone());
        }

        let mut entries = fs::read_dir(&dir)
            .await
            .map_err(|e| RapidexError::session_io(tenant.as_str(), "list session directory", e))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| RapidexError::session_io(tenant.as_str(), "list session directory", e))?
        {
            let path = entry.path();
            if let Some(stem) = json_stem(&path)
                && !wanted.contains(&stem)
            {
                fs::remove_file(&path).await.map_err(|e| {
                    RapidexError::session_io(tenant.as_str(), "remove stale credential", e)
                })?;
            }
        }

        debug!(tenant = %tenant, files = wanted.len(), "credentials saved");
        Ok(())
    }

    /// Forget a tenant's credentials entirely.
    pub async fn clear(&self, tenant: &TenantId) -> Result<(), RapidexError> {
        match fs::remove_dir_all(self.tenant_dir(tenant)).await {
            Ok(()) => {
                debug!(tenant = %tenant, "credentials cleared");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(RapidexError::session_io(
                tenant.as_str(),
                "remove session directory",
                e,
            )),
        }
    }

    /// Tenants with a persisted `creds.json`, sorted by id.
    pub async fn list_tenants(&self) -> Result<Vec<TenantId>, RapidexError> {
        let mut entries = match fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(RapidexError::Storage { source: Box::new(e) }),
        };

        let mut tenants = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| RapidexError::Storage { source: Box::new(e) })?
        {
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            let Ok(tenant) = TenantId::parse(&name) else {
                continue;
            };
            let creds = entry
                .path()
                .join(format!("{CREDS_FILE_STEM}{JSON_EXT}"));
            if fs::try_exists(&creds).await.unwrap_or(false) {
                tenants.push(tenant);
            }
        }
        tenants.sort();
        Ok(tenants)
    }

    async fn write_json(
        &self,
        tenant: &TenantId,
        dir: &Path,
        stem: &str,
        value: &serde_json::Value,
    ) -> Result<(), RapidexError> {
        let bytes = serde_json::to_vec(value).map_err(|e| RapidexError::Session {
            tenant: tenant.to_string(),
            message: format!("serialize {stem}{JSON_EXT}: {e}"),
            source: Some(Box::new(e)),
        })?;
        write_atomic(&dir.join(format!("{stem}{JSON_EXT}")), &bytes)
            .await
            .map_err(|e| {
                RapidexError::session_io(tenant.as_str(), &format!("write {stem}{JSON_EXT}"), e)
            })
    }
}

/// Write `bytes` to `path` via a fsynced temporary file and a rename.
pub(crate) async fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    let mut file = fs::File::create(&tmp).await?;
    file.write_all(bytes).await?;
    file.sync_all().await?;
    drop(file);
    fs::rename(&tmp, path).await
}

/// File stem of a `*.json` credential file; temporaries and other files yield `None`.
fn json_stem(path: &Path) -> Option<String> {
    let name = path.file_name()?.to_str()?;
    let stem = name.strip_suffix(JSON_EXT)?;
    (!stem.is_empty()).then(|| stem.to_string())
}

fn is_safe_key_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        && !name.starts_with('.')
}
