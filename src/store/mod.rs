//! Durable store for analysis results: one SQLite row per task
//! fingerprint for the queryable metadata, plus a compressed sidecar
//! blob for the full trade list. Single-writer by construction; all
//! access goes through one connection behind an async mutex.

use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use rusqlite::{params, Connection, OptionalExtension};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::models::{AnalysisResult, AnalysisStatus, AnalysisTask, Trade, TradeMetrics};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS analysis_results (
    fingerprint  TEXT PRIMARY KEY,
    instrument   TEXT NOT NULL,
    timeframe    TEXT NOT NULL,
    strategy     TEXT NOT NULL,
    status       TEXT NOT NULL,
    sharpe_ratio REAL NOT NULL DEFAULT 0,
    win_rate     REAL NOT NULL DEFAULT 0,
    total_return REAL NOT NULL DEFAULT 0,
    max_drawdown REAL NOT NULL DEFAULT 0,
    trade_count  INTEGER NOT NULL DEFAULT 0,
    generated_at INTEGER NOT NULL,
    error        TEXT
);
CREATE INDEX IF NOT EXISTS idx_results_instrument ON analysis_results(instrument);
CREATE INDEX IF NOT EXISTS idx_results_timeframe  ON analysis_results(timeframe);
CREATE INDEX IF NOT EXISTS idx_results_strategy   ON analysis_results(strategy);
CREATE INDEX IF NOT EXISTS idx_results_sharpe     ON analysis_results(sharpe_ratio);
CREATE INDEX IF NOT EXISTS idx_results_status     ON analysis_results(status);
";

/// SQLite-backed analysis result store. Trade lists live next to the
/// database as gzip-compressed bincode blobs, keyed by fingerprint.
pub struct ResultStore {
    conn: Mutex<Connection>,
    blob_dir: PathBuf,
}

impl ResultStore {
    /// Open (creating if needed) the store at `path`. Blobs go into a
    /// `blobs/` directory beside the database file.
    pub fn open(path: &str) -> Result<ResultStore, StoreError> {
        let db_path = Path::new(path);
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(db_path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.execute_batch(SCHEMA)?;

        let blob_dir = db_path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join("blobs");
        fs::create_dir_all(&blob_dir)?;

        Ok(ResultStore {
            conn: Mutex::new(conn),
            blob_dir,
        })
    }

    /// Whether a completed result already exists for this fingerprint.
    /// Failed rows do not count; they stay claimable for a retry.
    pub async fn exists(&self, fingerprint: &str) -> Result<bool, StoreError> {
        let conn = self.conn.lock().await;
        let status: Option<String> = conn
            .query_row(
                "SELECT status FROM analysis_results WHERE fingerprint = ?1",
                params![fingerprint],
                |row| row.get(0),
            )
            .optional()?;
        Ok(status.as_deref() == Some("success"))
    }

    /// Atomically claim a task for execution. Returns `false` when the
    /// fingerprint is already running or already succeeded; a failed row
    /// is re-claimed for retry. Exactly one concurrent caller wins.
    pub async fn claim(&self, task: &AnalysisTask) -> Result<bool, StoreError> {
        let conn = self.conn.lock().await;
        let changed = conn.execute(
            "INSERT INTO analysis_results
                 (fingerprint, instrument, timeframe, strategy, status, generated_at)
             VALUES (?1, ?2, ?3, ?4, 'running', ?5)
             ON CONFLICT(fingerprint) DO UPDATE
                 SET status = 'running', generated_at = excluded.generated_at, error = NULL
                 WHERE analysis_results.status = 'failed'",
            params![
                task.fingerprint(),
                task.instrument,
                task.timeframe.as_str(),
                task.strategy,
                Utc::now().timestamp(),
            ],
        )?;
        Ok(changed == 1)
    }

    /// Release a claim without recording a result (cancellation). The
    /// row disappears so a later run can claim the task fresh.
    pub async fn release(&self, fingerprint: &str) -> Result<(), StoreError> {
        let conn = self.conn.lock().await;
        let changed = conn.execute(
            "DELETE FROM analysis_results WHERE fingerprint = ?1 AND status = 'running'",
            params![fingerprint],
        )?;
        if changed == 0 {
            debug!("release: no running row for {}", fingerprint);
        }
        Ok(())
    }

    /// Record a task failure. The row stays claimable for retry.
    pub async fn mark_failed(&self, fingerprint: &str, error: &str) -> Result<(), StoreError> {
        let conn = self.conn.lock().await;
        conn.execute(
            "UPDATE analysis_results
                 SET status = 'failed', error = ?2, generated_at = ?3
                 WHERE fingerprint = ?1",
            params![fingerprint, error, Utc::now().timestamp()],
        )?;
        Ok(())
    }

    /// Persist a completed result: metadata row plus the trade blob.
    /// The blob is written to a temp file and renamed so a crash never
    /// leaves a partial blob behind.
    pub async fn save(&self, result: &AnalysisResult) -> Result<(), StoreError> {
        self.write_blob(&result.fingerprint, &result.trades)?;

        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO analysis_results
                 (fingerprint, instrument, timeframe, strategy, status,
                  sharpe_ratio, win_rate, total_return, max_drawdown,
                  trade_count, generated_at, error)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
             ON CONFLICT(fingerprint) DO UPDATE SET
                 status = excluded.status,
                 sharpe_ratio = excluded.sharpe_ratio,
                 win_rate = excluded.win_rate,
                 total_return = excluded.total_return,
                 max_drawdown = excluded.max_drawdown,
                 trade_count = excluded.trade_count,
                 generated_at = excluded.generated_at,
                 error = excluded.error",
            params![
                result.fingerprint,
                result.instrument,
                result.timeframe,
                result.strategy,
                result.status.as_str(),
                result.metrics.sharpe_ratio,
                result.metrics.win_rate,
                result.metrics.total_return,
                result.metrics.max_drawdown,
                result.trades.len() as i64,
                result.generated_at.timestamp(),
                result.error,
            ],
        )?;
        Ok(())
    }

    /// Load one result, including its trades.
    pub async fn get(&self, fingerprint: &str) -> Result<AnalysisResult, StoreError> {
        let mut result = {
            let conn = self.conn.lock().await;
            conn.query_row(
                "SELECT fingerprint, instrument, timeframe, strategy, status,
                        sharpe_ratio, win_rate, total_return, max_drawdown,
                        generated_at, error
                 FROM analysis_results WHERE fingerprint = ?1",
                params![fingerprint],
                row_to_result,
            )
            .optional()?
            .ok_or_else(|| StoreError::NotFound(fingerprint.to_string()))?
        };
        result.trades = self.read_blob(fingerprint)?;
        Ok(result)
    }

    /// Completed results ordered best-Sharpe-first. Trade blobs are not
    /// loaded; use [`ResultStore::get`] for one result's trades.
    pub async fn list_by_sharpe(&self, limit: usize) -> Result<Vec<AnalysisResult>, StoreError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT fingerprint, instrument, timeframe, strategy, status,
                    sharpe_ratio, win_rate, total_return, max_drawdown,
                    generated_at, error
             FROM analysis_results
             WHERE status = 'success'
             ORDER BY sharpe_ratio DESC
             LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], row_to_result)?;
        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }

    /// Completed results for one instrument, newest first.
    pub async fn list_for_instrument(
        &self,
        instrument: &str,
    ) -> Result<Vec<AnalysisResult>, StoreError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT fingerprint, instrument, timeframe, strategy, status,
                    sharpe_ratio, win_rate, total_return, max_drawdown,
                    generated_at, error
             FROM analysis_results
             WHERE instrument = ?1 AND status = 'success'
             ORDER BY generated_at DESC",
        )?;
        let rows = stmt.query_map(params![instrument], row_to_result)?;
        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }

    /// Delete one result and its blob. Refuses while the task is
    /// running: a concurrent worker still expects to write that row.
    pub async fn delete(&self, fingerprint: &str) -> Result<(), StoreError> {
        let conn = self.conn.lock().await;
        let status: Option<String> = conn
            .query_row(
                "SELECT status FROM analysis_results WHERE fingerprint = ?1",
                params![fingerprint],
                |row| row.get(0),
            )
            .optional()?;

        match status.as_deref() {
            None => return Err(StoreError::NotFound(fingerprint.to_string())),
            Some("running") => return Err(StoreError::DeleteWhileRunning(fingerprint.to_string())),
            Some(_) => {}
        }

        conn.execute(
            "DELETE FROM analysis_results WHERE fingerprint = ?1",
            params![fingerprint],
        )?;
        drop(conn);

        let blob = self.blob_path(fingerprint);
        if blob.exists() {
            if let Err(e) = fs::remove_file(&blob) {
                warn!("failed to remove blob {}: {}", blob.display(), e);
            }
        }
        Ok(())
    }

    fn blob_path(&self, fingerprint: &str) -> PathBuf {
        self.blob_dir.join(format!("{}.bin.gz", fingerprint))
    }

    fn write_blob(&self, fingerprint: &str, trades: &[Trade]) -> Result<(), StoreError> {
        let encoded = bincode::serialize(trades)?;
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&encoded)?;
        let compressed = encoder.finish()?;

        let path = self.blob_path(fingerprint);
        let tmp = path.with_extension("gz.tmp");
        fs::write(&tmp, compressed)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn read_blob(&self, fingerprint: &str) -> Result<Vec<Trade>, StoreError> {
        let path = self.blob_path(fingerprint);
        if !path.exists() {
            // Failed tasks have a metadata row but never wrote trades.
            return Ok(Vec::new());
        }
        let compressed = fs::read(&path)?;
        let mut decoder = GzDecoder::new(compressed.as_slice());
        let mut encoded = Vec::new();
        decoder.read_to_end(&mut encoded)?;
        Ok(bincode::deserialize(&encoded)?)
    }
}

fn row_to_result(row: &rusqlite::Row<'_>) -> rusqlite::Result<AnalysisResult> {
    let status_str: String = row.get(4)?;
    let generated_ts: i64 = row.get(9)?;
    Ok(AnalysisResult {
        fingerprint: row.get(0)?,
        instrument: row.get(1)?,
        timeframe: row.get(2)?,
        strategy: row.get(3)?,
        status: AnalysisStatus::from_str_loose(&status_str).unwrap_or(AnalysisStatus::Failed),
        metrics: TradeMetrics {
            sharpe_ratio: row.get(5)?,
            win_rate: row.get(6)?,
            total_return: row.get(7)?,
            max_drawdown: row.get(8)?,
        },
        trades: Vec::new(),
        generated_at: DateTime::<Utc>::from_timestamp(generated_ts, 0).unwrap_or_else(Utc::now),
        error: row.get(10)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Timeframe;
    use crate::test_helpers::make_trade;

    fn tmp_store() -> (tempfile::TempDir, ResultStore) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("analysis.db");
        let store = ResultStore::open(path.to_str().unwrap()).unwrap();
        (dir, store)
    }

    fn sample_result(task: &AnalysisTask) -> AnalysisResult {
        let trades = vec![make_trade(100.0, 108.8, 10.0), make_trade(100.0, 99.0, 10.0)];
        AnalysisResult {
            fingerprint: task.fingerprint(),
            instrument: task.instrument.clone(),
            timeframe: task.timeframe.to_string(),
            strategy: task.strategy.clone(),
            metrics: TradeMetrics::from_trades(&trades),
            trades,
            status: AnalysisStatus::Success,
            generated_at: Utc::now(),
            error: None,
        }
    }

    #[tokio::test]
    async fn save_and_get_roundtrip() {
        let (_dir, store) = tmp_store();
        let task = AnalysisTask::new("BTC-USD", Timeframe::H1, "balanced");
        let result = sample_result(&task);

        store.save(&result).await.unwrap();
        let loaded = store.get(&task.fingerprint()).await.unwrap();

        assert_eq!(loaded.fingerprint, result.fingerprint);
        assert_eq!(loaded.trades.len(), 2);
        assert!((loaded.trades[0].exit_price - 108.8).abs() < 1e-9);
        assert_eq!(loaded.status, AnalysisStatus::Success);
        assert!(store.exists(&task.fingerprint()).await.unwrap());
    }

    #[tokio::test]
    async fn claim_is_exclusive_until_failure() {
        let (_dir, store) = tmp_store();
        let task = AnalysisTask::new("ETH-USD", Timeframe::M15, "aggressive");

        assert!(store.claim(&task).await.unwrap());
        // Second claim while running loses.
        assert!(!store.claim(&task).await.unwrap());

        // A failed task is claimable again.
        store
            .mark_failed(&task.fingerprint(), "transient fetch failure")
            .await
            .unwrap();
        assert!(store.claim(&task).await.unwrap());
    }

    #[tokio::test]
    async fn success_is_not_reclaimable() {
        let (_dir, store) = tmp_store();
        let task = AnalysisTask::new("BTC-USD", Timeframe::H1, "balanced");
        assert!(store.claim(&task).await.unwrap());
        store.save(&sample_result(&task)).await.unwrap();
        assert!(!store.claim(&task).await.unwrap());
    }

    #[tokio::test]
    async fn release_clears_a_running_claim() {
        let (_dir, store) = tmp_store();
        let task = AnalysisTask::new("BTC-USD", Timeframe::H4, "conservative");
        assert!(store.claim(&task).await.unwrap());
        store.release(&task.fingerprint()).await.unwrap();
        assert!(store.claim(&task).await.unwrap());
    }

    #[tokio::test]
    async fn failed_rows_do_not_count_as_cached() {
        let (_dir, store) = tmp_store();
        let task = AnalysisTask::new("BTC-USD", Timeframe::H1, "balanced");
        store.claim(&task).await.unwrap();
        store.mark_failed(&task.fingerprint(), "boom").await.unwrap();
        assert!(!store.exists(&task.fingerprint()).await.unwrap());

        let loaded = store.get(&task.fingerprint()).await.unwrap();
        assert_eq!(loaded.status, AnalysisStatus::Failed);
        assert_eq!(loaded.error.as_deref(), Some("boom"));
        assert!(loaded.trades.is_empty());
    }

    #[tokio::test]
    async fn delete_refuses_running_tasks() {
        let (_dir, store) = tmp_store();
        let task = AnalysisTask::new("BTC-USD", Timeframe::H1, "balanced");
        store.claim(&task).await.unwrap();

        let err = store.delete(&task.fingerprint()).await.unwrap_err();
        assert!(matches!(err, StoreError::DeleteWhileRunning(_)));

        store.save(&sample_result(&task)).await.unwrap();
        store.delete(&task.fingerprint()).await.unwrap();
        let err = store.get(&task.fingerprint()).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn list_for_instrument_filters_and_skips_failures() {
        let (_dir, store) = tmp_store();
        let btc_h1 = AnalysisTask::new("BTC-USD", Timeframe::H1, "balanced");
        let btc_m15 = AnalysisTask::new("BTC-USD", Timeframe::M15, "balanced");
        let eth = AnalysisTask::new("ETH-USD", Timeframe::H1, "balanced");
        store.save(&sample_result(&btc_h1)).await.unwrap();
        store.save(&sample_result(&btc_m15)).await.unwrap();
        store.save(&sample_result(&eth)).await.unwrap();

        let failed = AnalysisTask::new("BTC-USD", Timeframe::H4, "balanced");
        store.claim(&failed).await.unwrap();
        store.mark_failed(&failed.fingerprint(), "no data").await.unwrap();

        let results = store.list_for_instrument("BTC-USD").await.unwrap();
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.instrument == "BTC-USD"));
        assert!(results
            .iter()
            .all(|r| r.status == AnalysisStatus::Success));
    }

    #[tokio::test]
    async fn list_by_sharpe_orders_descending() {
        let (_dir, store) = tmp_store();
        for (i, exit) in [101.0, 115.0, 104.0].iter().enumerate() {
            let task = AnalysisTask::new(format!("COIN{i}-USD"), Timeframe::H1, "balanced");
            let mut result = sample_result(&task);
            result.instrument = task.instrument.clone();
            result.trades = vec![
                make_trade(100.0, *exit, 2.0),
                make_trade(100.0, exit * 0.99, 2.0),
            ];
            result.metrics = TradeMetrics::from_trades(&result.trades);
            store.save(&result).await.unwrap();
        }

        let ranked = store.list_by_sharpe(10).await.unwrap();
        assert_eq!(ranked.len(), 3);
        for pair in ranked.windows(2) {
            assert!(pair[0].metrics.sharpe_ratio >= pair[1].metrics.sharpe_ratio);
        }
    }
}
