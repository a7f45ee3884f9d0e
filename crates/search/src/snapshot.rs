use crate::memory::EngineState;
use crate::{MemorySearchBackend, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

pub const SNAPSHOT_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PersistedSnapshot {
    schema_version: u32,
    saved_at_unix_ms: u64,
    state: EngineState,
}

impl MemorySearchBackend {
    /// Load an engine from a snapshot file, or start empty if there is none.
    pub async fn load_snapshot(path: &Path, max_result_window: usize) -> Result<Self> {
        if !tokio::fs::try_exists(path).await? {
            log::info!("No search snapshot at {}, starting empty", path.display());
            return Ok(Self::with_max_result_window(max_result_window));
        }
        let bytes = tokio::fs::read(path).await?;
        let persisted: PersistedSnapshot = serde_json::from_slice(&bytes)?;
        if persisted.schema_version != SNAPSHOT_SCHEMA_VERSION {
            log::warn!(
                "Search snapshot {} has schema {} (expected {SNAPSHOT_SCHEMA_VERSION}); loading anyway",
                path.display(),
                persisted.schema_version
            );
        }
        Ok(Self::from_state(persisted.state, max_result_window))
    }

    /// Persist every index and alias, replacing the file atomically.
    pub async fn save_snapshot(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let persisted = PersistedSnapshot {
            schema_version: SNAPSHOT_SCHEMA_VERSION,
            saved_at_unix_ms: unix_now_ms(),
            state: self.snapshot_state(),
        };
        let bytes = serde_json::to_vec_pretty(&persisted)?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }
}

fn unix_now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
