//! Job driver: checkpoint → plan → extract → transform → load → checkpoint.
//!
//! A run either finishes and appends its dates to the checkpoint log, or
//! fails before the log is touched. Re-running on the same day after a
//! success finds nothing to do.
//!
//! Only one run per checkpoint log may be active at a time; nothing here
//! guards against two concurrent writers.

use crate::checkpoint::{self, CheckpointState};
use crate::config::AppConfig;
use crate::models::Table;
use crate::planner::{self, ExtractPlan};
use crate::storage::codec::FileFormat;
use crate::storage::{BlobStore, LocalBlobStore, MemoryBlobStore};
use crate::transform;
use crate::utils::Timer;
use anyhow::{Context, Result, anyhow};
use chrono::{Local, NaiveDate, NaiveDateTime};
use std::fmt::Write;
use tracing::{debug, info, warn};

pub struct Pipeline {
    config: AppConfig,
    source: Box<dyn BlobStore>,
    target: Box<dyn BlobStore>,
}

impl Pipeline {
    /// Pipeline over the local source and target buckets from the config.
    pub fn new(config: AppConfig) -> Self {
        let source = Box::new(LocalBlobStore::new(&config.storage.source_root));
        let target = Box::new(LocalBlobStore::new(&config.storage.target_root));
        Self::with_stores(config, source, target)
    }

    pub fn with_stores(
        config: AppConfig,
        source: Box<dyn BlobStore>,
        target: Box<dyn BlobStore>,
    ) -> Self {
        Self {
            config,
            source,
            target,
        }
    }

    /// Reads the real source bucket and checkpoint log, but sends every
    /// write to an in-memory bucket that is dropped with the pipeline.
    pub fn dry_run(config: AppConfig) -> Result<Self> {
        let source = Box::new(LocalBlobStore::new(&config.storage.source_root));
        let real_target = LocalBlobStore::new(&config.storage.target_root);

        let target = MemoryBlobStore::new();
        let key = &config.checkpoint.key;
        if let Some(bytes) = real_target.get(key).with_context(|| format!("get({})", key))? {
            target.put(key, &bytes)?;
        }
        info!("Dry run: writes go to memory, {} is left untouched", real_target.location(""));

        Ok(Self::with_stores(config, source, Box::new(target)))
    }

    #[cfg(test)]
    pub fn target(&self) -> &dyn BlobStore {
        self.target.as_ref()
    }

    pub fn read_checkpoint(&self) -> Result<CheckpointState> {
        checkpoint::read_checkpoint(self.target.as_ref(), &self.config.checkpoint)
            .context("Failed to read checkpoint log")
    }

    pub fn plan(&self, today: NaiveDate) -> Result<(CheckpointState, ExtractPlan)> {
        let state = self.read_checkpoint()?;
        let plan = planner::plan_until(&self.config.source.first_extract_date, &state, today)
            .context("Failed to plan extraction")?;
        Ok((state, plan))
    }

    /// Read every object under `{date}/` for each date and stack them.
    pub fn extract(&self, dates: &[NaiveDate]) -> Result<(Table, usize)> {
        let mut tables = Vec::new();

        for date in dates {
            let prefix = format!("{}/", date.format(checkpoint::SOURCE_DATE_FORMAT));
            let keys = self
                .source
                .list_keys(&prefix)
                .with_context(|| format!("list_keys({})", prefix))?;

            if keys.is_empty() {
                debug!("{}: no source files", date);
            }

            for key in keys {
                match self
                    .source
                    .read_table(&key)
                    .with_context(|| format!("read_table({})", key))?
                {
                    Some(t) => tables.push(t),
                    None => warn!("{} vanished between listing and reading", key),
                }
            }
        }

        let files = tables.len();
        let records = Table::concat(tables);
        info!("Extracted {} records from {} files", records.len(), files);
        Ok((records, files))
    }

    pub fn transform(&self, records: &Table, cutoff: NaiveDate) -> Result<Table> {
        transform::aggregate(records, &self.config.source, &self.config.target, cutoff)
            .context("Failed to aggregate report")
    }

    /// Write the report under the configured key prefix plus a timestamp.
    /// Returns the key written, or `None` when the report was empty.
    pub fn load(
        &self,
        report: &Table,
        format: FileFormat,
        now: NaiveDateTime,
    ) -> Result<Option<String>> {
        let key = self.report_key(format, now)?;
        let written = self
            .target
            .write_table(report, &key, format)
            .with_context(|| format!("write_table({})", key))?;
        Ok(written.then_some(key))
    }

    fn report_key(&self, format: FileFormat, now: NaiveDateTime) -> Result<String> {
        let target = &self.config.target;
        let mut key = target.key.clone();
        write!(key, "{}", now.format(&target.key_date_format))
            .map_err(|_| anyhow!("Invalid key_date_format {:?}", target.key_date_format))?;
        write!(key, ".{}", format.extension())?;
        Ok(key)
    }

    pub fn run(&self) -> Result<PipelineStats> {
        self.run_at(Local::now().naive_local())
    }

    pub fn run_at(&self, now: NaiveDateTime) -> Result<PipelineStats> {
        // Reject a bad output format before reading or writing anything.
        let format: FileFormat = self.config.target.format.parse()?;

        let (state, plan) = {
            let _t = Timer::start("Step 1: Planning");
            self.plan(now.date())?
        };

        let mut stats = PipelineStats::default();

        if plan.is_noop() {
            info!("Nothing to do: every date up to {} is already processed", now.date());
            stats.checkpoint_rows = match &state {
                CheckpointState::Found(log) => log.len(),
                CheckpointState::NotFound => 0,
            };
            return Ok(stats);
        }

        let (records, files) = {
            let _t = Timer::start(format!("Step 2: Extracting {} dates", plan.dates.len()));
            self.extract(&plan.dates)?
        };
        stats.dates_extracted = plan.dates.len();
        stats.files_read = files;
        stats.records_read = records.len();

        let report = {
            let _t = Timer::start("Step 3: Transforming");
            self.transform(&records, plan.min_date)?
        };
        stats.report_rows = report.len();

        {
            let _t = Timer::start("Step 4: Loading");
            stats.report_key = self.load(&report, format, now)?;

            let new_dates = plan.report_dates();
            let log = checkpoint::append(state, &new_dates, now);
            if !new_dates.is_empty() {
                checkpoint::write_checkpoint(self.target.as_ref(), &log, &self.config.checkpoint)
                    .context("Failed to write checkpoint log")?;
                info!("Checkpoint: +{} dates, {} entries total", new_dates.len(), log.len());
            }
            stats.checkpoint_rows = log.len();
        }

        Ok(stats)
    }
}

#[derive(Debug, Default, PartialEq)]
pub struct PipelineStats {
    pub dates_extracted: usize,
    pub files_read: usize,
    pub records_read: usize,
    pub report_rows: usize,
    pub report_key: Option<String>,
    pub checkpoint_rows: usize,
}
