//! Size-rotated JSON-lines decision log

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Context;
use async_trait::async_trait;
use flate2::write::GzEncoder;
use flate2::Compression;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::{Decision, DecisionLogger};
use crate::config::DecisionLogConfig;
use crate::error::{Error, Result};

/// Rotation threshold used when `max_file_size_mb` is 0
pub const DEFAULT_MAX_FILE_SIZE_MB: u64 = 100;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileLoggerConfig {
    pub log_file_path: PathBuf,
    /// 0 = `DEFAULT_MAX_FILE_SIZE_MB`
    pub max_file_size_mb: u64,
    /// Rotated files to keep, 0 = keep all
    pub max_file_count: u64,
    /// Gzip rotated files in the background
    pub compress_rotated: bool,
}

impl FileLoggerConfig {
    pub fn from_config(config: &DecisionLogConfig) -> Result<Self> {
        let log_file_path = config
            .string("log_file_path")
            .filter(|p| !p.is_empty())
            .ok_or_else(|| {
                Error::configuration("file decision logger requires 'log_file_path'")
            })?;

        Ok(Self {
            log_file_path: PathBuf::from(log_file_path),
            max_file_size_mb: config.integer("max_file_size_mb"),
            max_file_count: config.integer("max_file_count"),
            compress_rotated: config.boolean("compress_rotated"),
        })
    }

    /// Effective rotation threshold in bytes
    pub fn max_file_bytes(&self) -> u64 {
        let mb = if self.max_file_size_mb == 0 {
            DEFAULT_MAX_FILE_SIZE_MB
        } else {
            self.max_file_size_mb
        };
        mb.saturating_mul(1024 * 1024)
    }
}

/// Appends decisions to `log_file_path`, rotating it once it exceeds the size limit
pub struct FileLogger {
    config: FileLoggerConfig,
    writer: Mutex<RotatingWriter>,
}

impl FileLogger {
    /// Open (or create) the log file. An unwritable path is a configuration error.
    pub async fn open(config: FileLoggerConfig) -> Result<Self> {
        let writer = RotatingWriter::open(&config).await.map_err(|e| {
            Error::configuration(format!(
                "failed to open decision log {}: {:#}",
                config.log_file_path.display(),
                e
            ))
        })?;

        info!(
            "[DecisionLog] Writing decisions to {} (rotate at {} bytes)",
            config.log_file_path.display(),
            config.max_file_bytes()
        );

        Ok(Self {
            config,
            writer: Mutex::new(writer),
        })
    }

    pub fn config(&self) -> &FileLoggerConfig {
        &self.config
    }
}

#[async_trait]
impl DecisionLogger for FileLogger {
    fn kind(&self) -> &'static str {
        "file"
    }

    async fn log(&self, decision: &Decision) -> anyhow::Result<()> {
        let mut writer = self.writer.lock().await;
        writer.write(decision).await
    }

    async fn shutdown(&self) {
        let mut writer = self.writer.lock().await;
        if let Err(e) = writer.file.shutdown().await {
            warn!("[DecisionLog] Failed to close decision log: {}", e);
        }
    }
}

struct RotatingWriter {
    path: PathBuf,
    file: File,
    current_size: u64,
    max_file_size: u64,
    max_files: u64,
    compress: bool,
}

impl RotatingWriter {
    async fn open(config: &FileLoggerConfig) -> anyhow::Result<Self> {
        if let Some(parent) = config.log_file_path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .context("Failed to create log directory")?;
            }
        }

        let file = open_append(&config.log_file_path).await?;
        let current_size = file.metadata().await?.len();

        Ok(Self {
            path: config.log_file_path.clone(),
            file,
            current_size,
            max_file_size: config.max_file_bytes(),
            max_files: config.max_file_count,
            compress: config.compress_rotated,
        })
    }

    async fn write(&mut self, decision: &Decision) -> anyhow::Result<()> {
        let mut line = serde_json::to_string(decision).context("Failed to serialize decision")?;
        line.push('\n');

        let line_len = line.len() as u64;

        if self.current_size > 0 && self.current_size.saturating_add(line_len) > self.max_file_size {
            self.rotate().await?;
        }

        self.file.write_all(line.as_bytes()).await?;
        self.file.flush().await?;
        self.current_size += line_len;

        Ok(())
    }

    async fn rotate(&mut self) -> anyhow::Result<()> {
        debug!("[DecisionLog] Rotating {}", self.path.display());

        self.file.shutdown().await?;

        let rotated_path = self.backup_path();
        tokio::fs::rename(&self.path, &rotated_path).await?;

        if self.compress {
            let rotated = rotated_path.clone();
            tokio::spawn(async move {
                if let Err(e) = compress_log_file(&rotated).await {
                    warn!("[DecisionLog] Failed to compress {}: {}", rotated.display(), e);
                }
            });
        }

        self.cleanup_old_files().await?;

        self.file = open_append(&self.path).await?;
        self.current_size = 0;

        Ok(())
    }

    /// `decisions.log` -> `decisions-2026-01-22T10-15-00.123.log`
    fn backup_path(&self) -> PathBuf {
        let timestamp = chrono::Utc::now().format("%Y-%m-%dT%H-%M-%S%.3f");
        let (stem, ext) = self.stem_and_extension();
        let name = match ext {
            Some(ext) => format!("{}-{}.{}", stem, timestamp, ext),
            None => format!("{}-{}", stem, timestamp),
        };
        self.path.with_file_name(name)
    }

    fn stem_and_extension(&self) -> (String, Option<String>) {
        let stem = self
            .path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "decisions".to_string());
        let ext = self
            .path
            .extension()
            .map(|e| e.to_string_lossy().into_owned());
        (stem, ext)
    }

    async fn cleanup_old_files(&self) -> anyhow::Result<()> {
        if self.max_files == 0 {
            return Ok(());
        }

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let (stem, _) = self.stem_and_extension();
        let prefix = format!("{}-", stem);

        let mut entries = tokio::fs::read_dir(&dir).await?;
        let mut backups = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let is_backup = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|name| name.starts_with(&prefix));
            if is_backup {
                if let Ok(modified) = entry.metadata().await.and_then(|m| m.modified()) {
                    backups.push((path, modified));
                }
            }
        }

        // Oldest first
        backups.sort_by_key(|(_, modified)| *modified);

        let max_files = self.max_files as usize;
        if backups.len() > max_files {
            let to_remove = backups.len() - max_files;
            for (path, _) in backups.iter().take(to_remove) {
                if let Err(e) = tokio::fs::remove_file(path).await {
                    warn!("[DecisionLog] Failed to remove {}: {}", path.display(), e);
                } else {
                    debug!("[DecisionLog] Removed old decision log {}", path.display());
                }
            }
        }

        Ok(())
    }
}

async fn open_append(path: &Path) -> anyhow::Result<File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .with_context(|| format!("Failed to open {}", path.display()))
}

async fn compress_log_file(path: &Path) -> anyhow::Result<()> {
    let mut gz_name = path.as_os_str().to_owned();
    gz_name.push(".gz");
    let gz_path = PathBuf::from(gz_name);

    let content = tokio::fs::read(path).await?;

    let target = gz_path.clone();
    tokio::task::spawn_blocking(move || {
        let file = std::fs::File::create(&target)?;
        let mut encoder = GzEncoder::new(file, Compression::default());
        encoder.write_all(&content)?;
        encoder.finish()?;
        Ok::<_, anyhow::Error>(())
    })
    .await??;

    tokio::fs::remove_file(path).await?;

    debug!("[DecisionLog] Compressed {:?} -> {:?}", path, gz_path);
    Ok(())
}
