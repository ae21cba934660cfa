// SPDX-FileCopyrightText: 2026 Rapidex Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-tenant status and QR artifacts for polling consumers.
//!
//! Artifacts sit next to the tenant directories:
//! `<dir>/<eid>_status.txt` holds `connected` or `disconnected`, and
//! `<dir>/<eid>_qr.txt` holds the QR image as a data URL until the tenant connects.

use std::io;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use rapidex_core::{ConnectionStatus, RapidexError, TenantId};
use tokio::fs;
use tracing::{debug, warn};

use crate::store::write_atomic;

/// Interval between artifact checks while waiting for a QR.
const QR_POLL_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Debug, Clone)]
pub struct StatusPublisher {
    root: PathBuf,
}

impl StatusPublisher {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn qr_path(&self, tenant: &TenantId) -> PathBuf {
        self.root.join(format!("{tenant}_qr.txt"))
    }

    pub fn status_path(&self, tenant: &TenantId) -> PathBuf {
        self.root.join(format!("{tenant}_status.txt"))
    }

    /// Overwrite the tenant's QR artifact.
    pub async fn write_qr(&self, tenant: &TenantId, data_url: &str) -> Result<(), RapidexError> {
        self.ensure_root(tenant).await?;
        write_atomic(&self.qr_path(tenant), data_url.as_bytes())
            .await
            .map_err(|e| RapidexError::session_io(tenant.as_str(), "write QR artifact", e))?;
        debug!(tenant = %tenant, "QR artifact written");
        Ok(())
    }

    /// Delete the tenant's QR artifact, if any.
    pub async fn clear_qr(&self, tenant: &TenantId) -> Result<(), RapidexError> {
        match fs::remove_file(self.qr_path(tenant)).await {
            Ok(()) => {
                debug!(tenant = %tenant, "QR artifact removed");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(RapidexError::session_io(
                tenant.as_str(),
                "remove QR artifact",
                e,
            )),
        }
    }

    /// Overwrite the tenant's status artifact.
    pub async fn write_status(
        &self,
        tenant: &TenantId,
        status: ConnectionStatus,
    ) -> Result<(), RapidexError> {
        self.ensure_root(tenant).await?;
        write_atomic(&self.status_path(tenant), status.to_string().as_bytes())
            .await
            .map_err(|e| RapidexError::session_io(tenant.as_str(), "write status artifact", e))
    }

    /// Last published status; `Unknown` if none was ever written.
    pub async fn status(&self, tenant: &TenantId) -> Result<ConnectionStatus, RapidexError> {
        let Some(text) = self.read(tenant, self.status_path(tenant)).await? else {
            return Ok(ConnectionStatus::Unknown);
        };
        Ok(ConnectionStatus::from_str(text.trim()).unwrap_or_else(|_| {
            warn!(tenant = %tenant, content = %text.trim(), "unrecognized status artifact");
            ConnectionStatus::Unknown
        }))
    }

    /// Current QR data URL, absent once connected or if never issued.
    pub async fn qr(&self, tenant: &TenantId) -> Result<Option<String>, RapidexError> {
        self.read(tenant, self.qr_path(tenant)).await
    }

    /// Poll for a QR until one appears or `grace` elapses.
    pub async fn wait_for_qr(
        &self,
        tenant: &TenantId,
        grace: Duration,
    ) -> Result<Option<String>, RapidexError> {
        let deadline = tokio::time::Instant::now() + grace;
        loop {
            if let Some(qr) = self.qr(tenant).await? {
                return Ok(Some(qr));
            }
            let now = tokio::time::Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(QR_POLL_INTERVAL.min(deadline - now)).await;
        }
    }

    async fn read(&self, tenant: &TenantId, path: PathBuf) -> Result<Option<String>, RapidexError> {
        match fs::read_to_string(&path).await {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(RapidexError::session_io(tenant.as_str(), "read artifact", e)),
        }
    }

    async fn ensure_root(&self, tenant: &TenantId) -> Result<(), RapidexError> {
        fs::create_dir_all(&self.root)
            .await
            .map_err(|e| RapidexError::session_io(tenant.as_str(), "create sessions directory", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn tenant(id: &str) -> TenantId {
        TenantId::parse(id).unwrap()
    }

    #[tokio::test]
    async fn status_defaults_to_unknown() {
        let dir = tempdir().unwrap();
        let publisher = StatusPublisher::new(dir.path());
        assert_eq!(
            publisher.status(&tenant("1")).await.unwrap(),
            ConnectionStatus::Unknown
        );
    }

    #[tokio::test]
    async fn status_last_write_wins() {
        let dir = tempdir().unwrap();
        let publisher = StatusPublisher::new(dir.path());
        let t = tenant("1");

        publisher
            .write_status(&t, ConnectionStatus::Disconnected)
            .await
            .unwrap();
        publisher
            .write_status(&t, ConnectionStatus::Connected)
            .await
            .unwrap();
        assert_eq!(
            publisher.status(&t).await.unwrap(),
            ConnectionStatus::Connected
        );
        assert_eq!(
            std::fs::read_to_string(dir.path().join("1_status.txt")).unwrap(),
            "connected"
        );
    }

    #[tokio::test]
    async fn qr_write_read_clear() {
        let dir = tempdir().unwrap();
        let publisher = StatusPublisher::new(dir.path());
        let t = tenant("1");

        assert!(publisher.qr(&t).await.unwrap().is_none());
        publisher.write_qr(&t, "data:image/svg+xml;base64,AAA").await.unwrap();
        assert_eq!(
            publisher.qr(&t).await.unwrap().as_deref(),
            Some("data:image/svg+xml;base64,AAA")
        );
        publisher.clear_qr(&t).await.unwrap();
        assert!(publisher.qr(&t).await.unwrap().is_none());
        // Clearing twice is fine.
        publisher.clear_qr(&t).await.unwrap();
    }

    #[tokio::test]
    async fn garbage_status_reads_as_unknown() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("1_status.txt"), "desconhecido").unwrap();
        let publisher = StatusPublisher::new(dir.path());
        assert_eq!(
            publisher.status(&tenant("1")).await.unwrap(),
            ConnectionStatus::Unknown
        );
    }

    #[tokio::test]
    async fn wait_for_qr_times_out_with_none() {
        let dir = tempdir().unwrap();
        let publisher = StatusPublisher::new(dir.path());
        let started = std::time::Instant::now();
        let qr = publisher
            .wait_for_qr(&tenant("1"), Duration::from_millis(300))
            .await
            .unwrap();
        assert!(qr.is_none());
        assert!(started.elapsed() >= Duration::from_millis(300));
    }

    #[tokio::test]
    async fn wait_for_qr_sees_late_write() {
        let dir = tempdir().unwrap();
        let publisher = StatusPublisher::new(dir.path());
        let t = tenant("1");

        let writer = publisher.clone();
        let wt = t.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            writer.write_qr(&wt, "data:late").await.unwrap();
        });

        let qr = publisher
            .wait_for_qr(&t, Duration::from_secs(3))
            .await
            .unwrap();
        assert_eq!(qr.as_deref(), Some("data:late"));
    }
}
