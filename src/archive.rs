//! Finished interview reports, persisted in cnidarium.
//!
//! Only completed reports are stored; live sessions are never written here.

use std::path::Path;

use anyhow::{Context, Result};
use cnidarium::{StateDelta, StateRead, StateWrite, Storage};
use futures::StreamExt;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::interview::report::SessionReport;

// Key prefix (no trailing slash, cnidarium convention)
const REPORT_PREFIX: &str = "report";

fn user_prefix(user_id: u64) -> String {
    format!("{}/{}/", REPORT_PREFIX, user_id)
}

fn report_key(user_id: u64, session_id: &Uuid) -> String {
    format!("{}{}", user_prefix(user_id), session_id)
}

pub struct ReportArchive {
    storage: Storage,
}

impl ReportArchive {
    pub async fn new(data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir)?;
        let storage = Storage::load(data_dir.to_path_buf(), vec![REPORT_PREFIX.to_string()])
            .await
            .context("Failed to init cnidarium storage")?;
        Ok(Self { storage })
    }

    /// Store a finished report. Storing the same session again overwrites it.
    pub async fn store(&self, user_id: u64, report: &SessionReport) -> Result<()> {
        let snapshot = self.storage.latest_snapshot();
        let mut delta = StateDelta::new(snapshot);
        delta.put_raw(
            report_key(user_id, &report.session_id),
            serde_json::to_vec(report).context("serialize SessionReport")?,
        );
        self.storage.commit(delta).await?;
        debug!(user_id, session = %report.session_id, score = report.final_score, "report archived");
        Ok(())
    }

    pub async fn get(&self, user_id: u64, session_id: &Uuid) -> Result<Option<SessionReport>> {
        let snapshot = self.storage.latest_snapshot();
        let Some(bytes) = snapshot.get_raw(&report_key(user_id, session_id)).await? else {
            return Ok(None);
        };
        Ok(Some(serde_json::from_slice(&bytes).context("deserialize SessionReport")?))
    }

    /// A user's reports, newest first.
    pub async fn list(&self, user_id: u64, limit: usize) -> Result<Vec<SessionReport>> {
        let snapshot = self.storage.latest_snapshot();
        let prefix = user_prefix(user_id);
        let mut stream = snapshot.prefix_raw(&prefix);
        let mut results = Vec::new();

        while let Some(entry) = stream.next().await {
            match entry {
                Ok((key, value)) => match serde_json::from_slice::<SessionReport>(&value) {
                    Ok(report) => results.push(report),
                    Err(e) => warn!(key, "Skipping unreadable report: {}", e),
                },
                Err(e) => {
                    warn!("Error reading report stream: {}", e);
                }
            }
        }

        results.sort_by(|a, b| b.finished_at.cmp(&a.finished_at));
        results.truncate(limit);
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::aggregate::BandBreakpoints;
    use crate::interview::report::EndReason;
    use crate::interview::session::SessionState;

    fn report(topic: &str) -> SessionReport {
        SessionReport::build(
            &SessionState::new(),
            topic,
            5,
            EndReason::Abandoned,
            &BandBreakpoints::default(),
        )
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_store_get_and_list() {
        let dir = tempfile::tempdir().unwrap();
        let archive = ReportArchive::new(dir.path()).await.unwrap();

        let first = report("Excel");
        let second = report("Excel");
        archive.store(42, &first).await.unwrap();
        archive.store(42, &second).await.unwrap();
        archive.store(7, &report("Excel")).await.unwrap();

        let fetched = archive.get(42, &first.session_id).await.unwrap().unwrap();
        assert_eq!(fetched, first);
        assert!(archive.get(7, &first.session_id).await.unwrap().is_none());

        let listed = archive.list(42, 10).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert!(listed[0].finished_at >= listed[1].finished_at);
        assert_eq!(archive.list(42, 1).await.unwrap().len(), 1);
    }
}
