use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use log::info;
use thiserror::Error;
use tokio::sync::Mutex;

use super::backup::BackupNotifier;

pub(super) const TABLE_HEADERS: [&str; 4] = ["№", "Ссылка", "Статус", "Дата добавления"];

const WRITE_ATTEMPTS: usize = 3;
const RETRY_DELAY_MS: u64 = 200;

/// One row of a user's table. `number` is dense and 1-based; `link` is
/// unique within the table; empty `status` means unset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct Record {
    pub(super) number: u32,
    pub(super) link: String,
    pub(super) status: String,
    pub(super) added_at: String,
}

#[derive(Debug, Error)]
pub(super) enum LedgerError {
    #[error("link already present in the ledger")]
    DuplicateLink,
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

#[derive(Debug, PartialEq, Eq)]
pub(super) enum AddOutcome {
    Added(u32),
    Duplicate,
}

#[derive(Debug, PartialEq, Eq)]
pub(super) enum ModifyOutcome {
    Applied,
    NotFound,
}

/// One CSV table per user under `data_dir`. Every operation takes the
/// user's own lock for the whole read-mutate-write cycle, so tables of
/// different users never contend and one user's operations are ordered.
pub(super) struct LedgerStore {
    data_dir: PathBuf,
    backup_on_status_update: bool,
    backup: Option<BackupNotifier>,
    locks: Mutex<HashMap<u64, Arc<Mutex<()>>>>,
}

impl LedgerStore {
    pub(super) fn new(
        data_dir: PathBuf,
        backup_on_status_update: bool,
        backup: Option<BackupNotifier>,
    ) -> Self {
        LedgerStore {
            data_dir,
            backup_on_status_update,
            backup,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub(super) fn ledger_path(&self, user_id: u64) -> PathBuf {
        self.data_dir.join(format!("user_{}.csv", user_id))
    }

    async fn user_lock(&self, user_id: u64) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(user_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    pub(super) async fn ensure_exists(&self, user_id: u64) -> Result<(), LedgerError> {
        let lock = self.user_lock(user_id).await;
        let _guard = lock.lock().await;
        let path = self.ledger_path(user_id);
        let created = with_retries(|| ensure_ledger_sync(&path)).await?;
        if created {
            info!("created ledger for user {}", user_id);
        }
        Ok(())
    }

    pub(super) async fn exists(&self, user_id: u64, link: &str) -> Result<bool, LedgerError> {
        let lock = self.user_lock(user_id).await;
        let _guard = lock.lock().await;
        let path = self.ledger_path(user_id);
        let found = with_retries(|| {
            ensure_ledger_sync(&path)?;
            let records = read_records(&path)?;
            Ok(records.iter().any(|r| r.link == link))
        })
        .await?;
        Ok(found)
    }

    pub(super) async fn add(
        &self,
        user_id: u64,
        link: &str,
        status: &str,
    ) -> Result<u32, LedgerError> {
        let lock = self.user_lock(user_id).await;
        let _guard = lock.lock().await;
        let path = self.ledger_path(user_id);
        match with_retries(|| add_record_sync(&path, link, status)).await? {
            AddOutcome::Added(number) => {
                self.notify_backup(user_id, &path);
                Ok(number)
            }
            AddOutcome::Duplicate => Err(LedgerError::DuplicateLink),
        }
    }

    pub(super) async fn delete(&self, user_id: u64, link: &str) -> Result<bool, LedgerError> {
        let lock = self.user_lock(user_id).await;
        let _guard = lock.lock().await;
        let path = self.ledger_path(user_id);
        match with_retries(|| delete_record_sync(&path, link)).await? {
            ModifyOutcome::Applied => {
                self.notify_backup(user_id, &path);
                Ok(true)
            }
            ModifyOutcome::NotFound => Ok(false),
        }
    }

    // Part of the store surface; no conversation flow drives it yet.
    #[allow(dead_code)]
    pub(super) async fn update_status(
        &self,
        user_id: u64,
        link: &str,
        status: &str,
    ) -> Result<bool, LedgerError> {
        let lock = self.user_lock(user_id).await;
        let _guard = lock.lock().await;
        let path = self.ledger_path(user_id);
        match with_retries(|| update_status_sync(&path, link, status)).await? {
            ModifyOutcome::Applied => {
                if self.backup_on_status_update {
                    self.notify_backup(user_id, &path);
                }
                Ok(true)
            }
            ModifyOutcome::NotFound => Ok(false),
        }
    }

    /// Snapshot in ledger order. A missing table reads as empty and is
    /// not created.
    pub(super) async fn list(&self, user_id: u64) -> Result<Vec<Record>, LedgerError> {
        let lock = self.user_lock(user_id).await;
        let _guard = lock.lock().await;
        let path = self.ledger_path(user_id);
        Ok(with_retries(|| read_records(&path)).await?)
    }

    pub(super) async fn count(&self, user_id: u64) -> Result<usize, LedgerError> {
        Ok(self.list(user_id).await?.len())
    }

    /// Counts per non-empty status; unset records are omitted.
    pub(super) async fn status_histogram(
        &self,
        user_id: u64,
    ) -> Result<BTreeMap<String, usize>, LedgerError> {
        let records = self.list(user_id).await?;
        let mut histogram = BTreeMap::new();
        for record in records {
            if !record.status.is_empty() {
                *histogram.entry(record.status).or_insert(0) += 1;
            }
        }
        Ok(histogram)
    }

    fn notify_backup(&self, user_id: u64, path: &Path) {
        if let Some(backup) = &self.backup {
            backup.notify(user_id, path.to_path_buf());
        }
    }
}

pub(super) fn ensure_ledger_sync(path: &Path) -> Result<bool> {
    if path.exists() {
        return Ok(false);
    }
    write_records(path, &[])?;
    Ok(true)
}

pub(super) fn read_records(path: &Path) -> Result<Vec<Record>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let contents =
        fs::read_to_string(path).with_context(|| format!("read ledger {}", path.display()))?;
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(contents.as_bytes());
    let mut records = Vec::new();
    for row in reader.records() {
        let row = row.with_context(|| format!("parse ledger {}", path.display()))?;
        let number = row
            .get(0)
            .and_then(|v| v.parse().ok())
            .ok_or_else(|| anyhow!("malformed row number in {}", path.display()))?;
        records.push(Record {
            number,
            link: row.get(1).unwrap_or("").to_string(),
            status: row.get(2).unwrap_or("").to_string(),
            added_at: row.get(3).unwrap_or("").to_string(),
        });
    }
    Ok(records)
}

pub(super) fn write_records(path: &Path, records: &[Record]) -> Result<()> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record(&TABLE_HEADERS)
        .context("write ledger header")?;
    for record in records {
        writer
            .write_record(&[
                record.number.to_string(),
                record.link.clone(),
                record.status.clone(),
                record.added_at.clone(),
            ])
            .context("write ledger row")?;
    }
    let data = writer
        .into_inner()
        .map_err(|err| anyhow!("finish ledger table: {}", err))?;
    atomic_write(path, &data)
}

pub(super) fn add_record_sync(path: &Path, link: &str, status: &str) -> Result<AddOutcome> {
    ensure_ledger_sync(path)?;
    let mut records = read_records(path)?;
    if records.iter().any(|r| r.link == link) {
        return Ok(AddOutcome::Duplicate);
    }
    let number = records.len() as u32 + 1;
    records.push(Record {
        number,
        link: link.to_string(),
        status: status.to_string(),
        added_at: current_timestamp(),
    });
    write_records(path, &records)?;
    Ok(AddOutcome::Added(number))
}

pub(super) fn delete_record_sync(path: &Path, link: &str) -> Result<ModifyOutcome> {
    ensure_ledger_sync(path)?;
    let mut records = read_records(path)?;
    let Some(pos) = records.iter().position(|r| r.link == link) else {
        return Ok(ModifyOutcome::NotFound);
    };
    records.remove(pos);
    // Close the numbering gap left by the removed row.
    for (idx, record) in records.iter_mut().enumerate().skip(pos) {
        record.number = idx as u32 + 1;
    }
    write_records(path, &records)?;
    Ok(ModifyOutcome::Applied)
}

pub(super) fn update_status_sync(path: &Path, link: &str, status: &str) -> Result<ModifyOutcome> {
    ensure_ledger_sync(path)?;
    let mut records = read_records(path)?;
    let Some(record) = records.iter_mut().find(|r| r.link == link) else {
        return Ok(ModifyOutcome::NotFound);
    };
    record.status = status.to_string();
    write_records(path, &records)?;
    Ok(ModifyOutcome::Applied)
}

pub(super) fn current_timestamp() -> String {
    chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

fn atomic_write(path: &Path, data: &[u8]) -> Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| anyhow!("no parent dir for {}", path.display()))?;
    fs::create_dir_all(dir).with_context(|| format!("create dir {}", dir.display()))?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)
        .with_context(|| format!("create temp file in {}", dir.display()))?;
    tmp.write_all(data).context("write temp file")?;
    tmp.flush().context("flush temp file")?;
    tmp.as_file_mut().sync_all().context("sync temp file")?;
    tmp.persist(path)
        .map_err(|e| anyhow!("persist temp file: {}", e))?;
    Ok(())
}

async fn with_retries<F, T>(mut f: F) -> Result<T>
where
    F: FnMut() -> Result<T>,
{
    let mut last_err = None;
    for attempt in 0..WRITE_ATTEMPTS {
        match f() {
            Ok(value) => return Ok(value),
            Err(err) => last_err = Some(err),
        }
        if attempt < WRITE_ATTEMPTS - 1 {
            tokio::time::sleep(Duration::from_millis(RETRY_DELAY_MS)).await;
        }
    }
    Err(last_err.unwrap_or_else(|| anyhow!("retry failed")))
}
