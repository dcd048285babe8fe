//! Synthetic records and operation mixes driven through a [`Gateway`].

use std::collections::BTreeMap;
use std::fmt;
use std::time::{Duration, Instant};

use rand::distributions::Alphanumeric;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use tracing::info;
use tsbench_core::backend::parquet::{DEFAULT_FIELD_COUNT, DEFAULT_FIELD_PREFIX, DEFAULT_TABLE};
use tsbench_core::config::{ConfigResult, FIELD_COUNT, FIELD_NAME_PREFIX, TABLE};
use tsbench_core::{FieldMap, Gateway, Properties, Status};

use crate::error::{CliError, CliResult};

/// Prefix of generated record keys. Its length matches the four characters
/// the gateway strips before parsing the numeric part.
pub const KEY_PREFIX: &str = "user";

pub fn record_key(n: i64) -> String {
    format!("{KEY_PREFIX}{n}")
}

/// Shape of an operation mix.
#[derive(Debug, Clone, Copy)]
pub struct Mix {
    pub start: i64,
    pub records: u64,
    pub operations: u64,
    /// Share of point reads; the rest are scans.
    pub read_proportion: f64,
    pub max_scan_length: u64,
}

/// Per-operation status counts of a finished run.
#[derive(Debug, Default)]
pub struct Summary {
    counts: BTreeMap<(&'static str, &'static str), u64>,
    pub elapsed: Duration,
}

impl Summary {
    fn record(&mut self, operation: &'static str, status: Status) {
        *self.counts.entry((operation, status.as_str())).or_default() += 1;
    }

    #[cfg(test)]
    pub fn count(&self, operation: &'static str, status: Status) -> u64 {
        self.counts
            .get(&(operation, status.as_str()))
            .copied()
            .unwrap_or(0)
    }

    pub fn total(&self) -> u64 {
        self.counts.values().sum()
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for ((operation, status), count) in &self.counts {
            writeln!(f, "{operation:<6} {status:<16} {count}")?;
        }
        write!(
            f,
            "operations: {} (elapsed_ms: {})",
            self.total(),
            self.elapsed.as_millis()
        )
    }
}

#[derive(Debug)]
pub struct Workload {
    table: String,
    field_names: Vec<String>,
    value_len: usize,
    rng: SmallRng,
}

impl Workload {
    pub fn from_properties(props: &Properties, value_len: usize, seed: u64) -> ConfigResult<Self> {
        let field_count = props.usize(FIELD_COUNT, DEFAULT_FIELD_COUNT)?;
        let prefix = props.string(FIELD_NAME_PREFIX, DEFAULT_FIELD_PREFIX);
        Ok(Self {
            table: props.string(TABLE, DEFAULT_TABLE),
            field_names: (0..field_count).map(|i| format!("{prefix}{i}")).collect(),
            value_len,
            rng: SmallRng::seed_from_u64(seed),
        })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    fn record(&mut self) -> FieldMap {
        let mut fields = FieldMap::new();
        for name in &self.field_names {
            let value: Vec<u8> = (&mut self.rng)
                .sample_iter(Alphanumeric)
                .take(self.value_len)
                .collect();
            fields.insert(name.clone(), value);
        }
        fields
    }

    /// Insert `records` consecutive keys starting at `start`. Stops at the
    /// first insert that does not succeed.
    pub fn load(&mut self, gw: &mut Gateway, start: i64, records: u64) -> CliResult<()> {
        let started = Instant::now();
        for offset in 0..records {
            let key = record_key(start.saturating_add_unsigned(offset));
            let values = self.record();
            let status = gw.insert(&self.table, &key, &values);
            if !status.is_ok() {
                return Err(CliError::Operation {
                    operation: "insert",
                    key,
                    status,
                });
            }
        }
        info!(
            records,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "load phase finished"
        );
        Ok(())
    }

    /// Run `mix.operations` random reads and scans over the loaded key range.
    /// Failed operations are counted, not fatal.
    pub fn run(&mut self, gw: &mut Gateway, mix: Mix) -> Summary {
        let started = Instant::now();
        let mut summary = Summary::default();
        let mut row = FieldMap::new();
        let mut rows = Vec::new();

        for _ in 0..mix.operations {
            let key = record_key(
                mix.start
                    .saturating_add_unsigned(self.rng.gen_range(0..mix.records)),
            );
            if self.rng.gen_bool(mix.read_proportion) {
                row.clear();
                summary.record("read", gw.read(&self.table, &key, None, &mut row));
            } else {
                rows.clear();
                let count = self.rng.gen_range(1..=mix.max_scan_length);
                let count = usize::try_from(count).unwrap_or(usize::MAX);
                summary.record("scan", gw.scan(&self.table, &key, count, None, &mut rows));
            }
        }

        summary.elapsed = started.elapsed();
        summary
    }
}
