use async_trait::async_trait;
use meridian_core::{ExperienceEvent, ExperienceStore, MeridianError, MeridianResult};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

/// Keeps recorded events in memory, in arrival order.
#[derive(Default)]
pub struct InMemoryExperienceStore {
    events: RwLock<Vec<ExperienceEvent>>,
}

impl InMemoryExperienceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn events(&self) -> Vec<ExperienceEvent> {
        self.events.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.events.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.events.read().await.is_empty()
    }
}

#[async_trait]
impl ExperienceStore for InMemoryExperienceStore {
    async fn record(&self, event: ExperienceEvent) -> MeridianResult<()> {
        self.events.write().await.push(event);
        Ok(())
    }
}

/// Appends one JSON line per event to a file.
pub struct JsonlExperienceStore {
    path: PathBuf,
    // Serializes appends from concurrent runs.
    write_lock: Mutex<()>,
}

impl JsonlExperienceStore {
    /// Open a store at `path`, creating its parent directory if needed.
    pub async fn new(path: impl Into<PathBuf>) -> MeridianResult<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        Ok(Self {
            path,
            write_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read back every recorded event. A missing file holds no events.
    pub async fn load(&self) -> MeridianResult<Vec<ExperienceEvent>> {
        let data = match tokio::fs::read_to_string(&self.path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        data.lines()
            .filter(|line| !line.trim().is_empty())
            .enumerate()
            .map(|(i, line)| {
                serde_json::from_str(line).map_err(|e| {
                    MeridianError::Config(format!(
                        "invalid experience entry on line {} of {}: {e}",
                        i + 1,
                        self.path.display()
                    ))
                })
            })
            .collect()
    }
}

#[async_trait]
impl ExperienceStore for JsonlExperienceStore {
    async fn record(&self, event: ExperienceEvent) -> MeridianResult<()> {
        let mut line = serde_json::to_string(&event)?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        debug!(path = %self.path.display(), "Recorded experience event");
        Ok(())
    }
}
