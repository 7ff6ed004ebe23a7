//! Orchestrates one workbook at a time: watch, validate, upload, merge, log.

use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::audit::{AuditError, AuditLog, ProcessRecord};
use crate::config::AppConfig;
use crate::excel::{
    build_upload_workbook, load_reference_dates, move_into_folder, validate_order_workbook, DetectedFile,
    ExcelError, FolderWatcher, OrderWorkbook, RegionSpec,
};
use crate::merge::{latest_file, merge_latest_export, MergeError};
use crate::portal::{PortalClient, UploadOutcome};

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error(transparent)]
    Excel(#[from] ExcelError),

    #[error(transparent)]
    Merge(#[from] MergeError),

    #[error(transparent)]
    Audit(#[from] AuditError),

    #[error("failed to move {} into the batch folder: {source}", .path.display())]
    Move {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub struct Manager<C: PortalClient> {
    config: AppConfig,
    watcher: FolderWatcher,
    portal: C,
    audit: AuditLog,
}

impl<C: PortalClient> Manager<C> {
    pub fn new(config: AppConfig, portal: C, started: DateTime<Local>) -> Result<Self, WorkflowError> {
        let watcher = FolderWatcher::new(&config.watch.dir, config.watch.interval(), started)?;
        let audit = AuditLog::new(config.paths.audit_log.clone());

        Ok(Self {
            config,
            watcher,
            portal,
            audit,
        })
    }

    /// Process workbooks forever
    pub async fn run(&mut self) {
        info!(dir = %self.watcher.watch_dir().display(), "watching for order workbooks");
        loop {
            self.process_next().await;
            info!("workbook finished, watching again");
        }
    }

    /// Wait for the next workbook and process it end to end
    pub async fn process_next(&mut self) -> ProcessRecord {
        let detected = self.watcher.wait_for_new_file().await;
        self.process_file(&detected).await
    }

    /// Never fails: errors end up in the returned record and the audit log.
    /// The workbook is closed on every path.
    pub async fn process_file(&self, detected: &DetectedFile) -> ProcessRecord {
        let mut record = ProcessRecord::new(detected.file_path.clone(), detected.folder_path.clone());
        let mut workbook = None;

        if let Err(e) = self.attempt(detected, &mut record, &mut workbook).await {
            error!(file = %detected.file_path.display(), "processing aborted: {}", e);
            record.failure = Some(e.to_string());
        }

        if let Some(mut workbook) = workbook {
            workbook.close();
        }

        if let Err(e) = self.audit.append(&record, Local::now()) {
            error!(log = %self.audit.path().display(), "{}", e);
        }

        record
    }

    async fn attempt(
        &self,
        detected: &DetectedFile,
        record: &mut ProcessRecord,
        slot: &mut Option<OrderWorkbook>,
    ) -> Result<(), WorkflowError> {
        let layout = &self.config.layout;
        let policies = &self.config.policies;

        let workbook = slot.insert(OrderWorkbook::open(&detected.file_path)?.with_region_spec(RegionSpec {
            column: layout.region_column.clone(),
            keyword: layout.region_keyword.clone(),
        }));
        record.name = workbook.cell_texts(&layout.name_cells)?.join(" ");

        let reference = load_reference_dates(&self.config.paths.reference_workbook)?;
        let errors = validate_order_workbook(workbook, &reference, layout, policies, Local::now().date_naive())?;
        let passed = errors.is_empty();
        record.validation = Some(errors);

        if !passed {
            warn!(file = %detected.file_path.display(), "validation failed, not uploading");
            return Ok(());
        }

        let save_path = build_upload_workbook(workbook, &detected.folder_path, &self.config.upload)?;
        record.save_path = Some(save_path.clone());

        let outcome = self.portal.submit(&save_path).await;
        record.upload = Some(outcome.clone());

        let downloads = &self.config.paths.downloads_dir;
        match outcome {
            UploadOutcome::Submitted => {
                let report = merge_latest_export(workbook, downloads, &self.config.merge, policies)?;
                let target = self
                    .config
                    .output
                    .overwrite_source
                    .then(|| workbook.path().to_path_buf());
                let saved = workbook.save(target.as_deref())?;
                info!(saved = %saved.display(), matched = report.matched, "order numbers merged");

                record.new_csv_path = Some(move_to_batch(&report.csv_path, &detected.folder_path)?);
            }
            UploadOutcome::InputRejected => {
                let export = latest_file(downloads)?;
                record.new_csv_path = Some(move_to_batch(&export, &detected.folder_path)?);
            }
            UploadOutcome::Failed(message) => {
                warn!(file = %detected.file_path.display(), "upload failed: {}", message);
            }
        }

        Ok(())
    }
}

fn move_to_batch(file: &Path, folder: &Path) -> Result<PathBuf, WorkflowError> {
    move_into_folder(file, folder).map_err(|source| WorkflowError::Move {
        path: file.to_path_buf(),
        source,
    })
}
