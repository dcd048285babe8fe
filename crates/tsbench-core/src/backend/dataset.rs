//! Batched dataset scanner over the same Parquet file.
//!
//! Shares the write path of [`ParquetBackend`]. Scans read the whole file in
//! record batches of `batch_size` rows and apply the key window to each
//! decoded batch, with no row-group pruning.

use std::collections::BTreeSet;

use snafu::prelude::*;

use crate::backend::parquet::{ParquetBackend, ParquetConfig, decode};
use crate::backend::{
    ArrowSnafu, Backend, BackendResult, ParquetReadSnafu, ScanResult, reject_projection,
};
use crate::config::{ConfigResult, DATASET_BATCH_SIZE, Properties};
use crate::model::ScanWindow;
use crate::payload::BulkPayload;

/// Default rows per scanned batch.
pub const DEFAULT_BATCH_SIZE: usize = 2048;

/// Dataset-scanner backend.
#[derive(Debug)]
pub struct DatasetBackend {
    file: ParquetBackend,
    batch_size: usize,
}

impl DatasetBackend {
    /// Backend scanning in batches of `batch_size` rows.
    pub fn new(config: ParquetConfig, batch_size: usize) -> Self {
        Self {
            file: ParquetBackend::new(config),
            batch_size: batch_size.max(1),
        }
    }

    /// Backend configured from properties.
    pub fn from_properties(props: &Properties) -> ConfigResult<Self> {
        let config = ParquetConfig::from_properties(props)?;
        let batch_size = props.positive(DATASET_BATCH_SIZE, DEFAULT_BATCH_SIZE)?;
        Ok(Self::new(config, batch_size))
    }

    /// Rows per scanned batch.
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }
}

impl Backend for DatasetBackend {
    fn name(&self) -> &'static str {
        "dataset"
    }

    fn bulk_write(&mut self, payload: BulkPayload) -> BackendResult<()> {
        self.file.bulk_write(payload)
    }

    fn scan(
        &mut self,
        table: &str,
        window: ScanWindow,
        fields: Option<&BTreeSet<String>>,
    ) -> BackendResult<ScanResult> {
        reject_projection(self.name(), fields)?;
        if window.is_empty() {
            return Ok(ScanResult::NotFound);
        }

        let config = self.file.config();
        let path = &config.read_path;
        let builder = decode::open_builder(path)?;
        let layout = decode::layout_for(builder.schema(), &config.key_column, table)?;
        let reader = builder
            .with_batch_size(self.batch_size)
            .build()
            .context(ParquetReadSnafu {
                path: path.display().to_string(),
            })?;

        let mut rows = Vec::new();
        for batch in reader {
            let batch = batch.context(ArrowSnafu)?;
            let batch = decode::filter_window(&batch, layout.key_idx, window)?;
            if batch.num_rows() > 0 {
                decode::decode_batch(&batch, &layout, &mut rows)?;
            }
        }
        Ok(ScanResult::from_rows(rows))
    }

    fn teardown(&mut self) -> BackendResult<()> {
        self.file.teardown()
    }
}
