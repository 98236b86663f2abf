//! Batched row insertion, the fallback when the bulk refresh path fails.
//!
//! Rows are matched against the table's live schema by case-insensitive
//! column name; dataset columns the schema lacks are dropped, schema fields
//! the dataset lacks stay unpopulated. A whole-batch transport error
//! degrades to one-row-at-a-time retries rather than giving up the batch.

use std::time::Duration;

use tracing::{info, warn};

use orgpulse_core::sanitize::truncate;
use orgpulse_core::{Dataset, Value};

use crate::config::PublishConfig;
use crate::portal::{AttributeMap, FieldDescriptor, TableSink};

/// Field names the sink manages itself; never written by us.
const SYSTEM_FIELDS: &[&str] = &["objectid", "fid", "globalid"];

/// Individual truncation warnings beyond this count collapse into a summary.
const MAX_TRUNCATION_WARNINGS: usize = 10;

/// Result of a batched insert pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct BatchReport {
    pub attempted: usize,
    pub inserted: usize,
}

impl BatchReport {
    /// Partial success counts as success: any inserted row keeps the
    /// dashboard table alive. Zero rows through means the pass failed.
    pub fn succeeded(&self) -> bool {
        self.inserted > 0
    }
}

struct FieldBinding {
    field: FieldDescriptor,
    column: usize,
}

fn bind_fields(fields: Vec<FieldDescriptor>, dataset: &Dataset) -> Vec<FieldBinding> {
    fields
        .into_iter()
        .filter(|field| {
            !SYSTEM_FIELDS.contains(&field.name.to_lowercase().as_str())
                && field.field_type != "esriFieldTypeOID"
                && field.field_type != "esriFieldTypeGlobalID"
        })
        .filter_map(|field| {
            let wanted = field.name.to_lowercase();
            dataset
                .columns()
                .iter()
                .position(|column| column.name.to_lowercase() == wanted)
                .map(|column| FieldBinding { field, column })
        })
        .collect()
}

fn build_attributes(
    bindings: &[FieldBinding],
    row: &[Value],
    truncations: &mut usize,
) -> AttributeMap {
    let mut attributes = AttributeMap::new();
    for binding in bindings {
        let value = &row[binding.column];
        let wire = match (value, binding.field.length) {
            (Value::Text(text), Some(max)) if text.chars().count() > max => {
                *truncations += 1;
                if *truncations <= MAX_TRUNCATION_WARNINGS {
                    warn!(
                        field = %binding.field.name,
                        length = text.chars().count(),
                        max,
                        "value exceeds field length, truncating"
                    );
                }
                serde_json::Value::String(truncate(Some(text), max, true))
            }
            _ => value.to_wire(),
        };
        attributes.insert(binding.field.name.clone(), wire);
    }
    attributes
}

/// Insert every dataset row into `table_id` in fixed-size batches.
pub async fn insert_all(
    sink: &dyn TableSink,
    table_id: &str,
    dataset: &Dataset,
    config: &PublishConfig,
) -> BatchReport {
    let mut report = BatchReport {
        attempted: dataset.len(),
        inserted: 0,
    };
    if dataset.is_empty() {
        return report;
    }

    let fields = match sink.table_fields(table_id).await {
        Ok(fields) => fields,
        Err(error) => {
            warn!(table = %table_id, %error, "could not read table schema, skipping batch insert");
            return report;
        }
    };
    let bindings = bind_fields(fields, dataset);
    if bindings.is_empty() {
        warn!(table = %table_id, "no dataset column matches the table schema");
        return report;
    }

    let mut truncations = 0usize;
    let rows: Vec<AttributeMap> = dataset
        .rows()
        .map(|row| build_attributes(&bindings, row, &mut truncations))
        .collect();
    if truncations > MAX_TRUNCATION_WARNINGS {
        warn!(truncations, "further truncation warnings suppressed");
    }

    let batch_delay = Duration::from_millis(config.pacing.batch_millis);
    let row_delay = Duration::from_millis(config.pacing.row_millis);
    for (batch_index, batch) in rows.chunks(config.batch_size).enumerate() {
        if batch_index > 0 {
            tokio::time::sleep(batch_delay).await;
        }
        match sink.insert_rows(table_id, batch).await {
            Ok(results) => {
                for (offset, result) in results.iter().enumerate() {
                    if result.success {
                        report.inserted += 1;
                    } else {
                        warn!(
                            table = %table_id,
                            row = batch_index * config.batch_size + offset,
                            message = result.message.as_deref().unwrap_or("no detail"),
                            "row rejected"
                        );
                    }
                }
            }
            Err(error) => {
                warn!(
                    table = %table_id,
                    batch = batch_index,
                    %error,
                    "batch insert failed, retrying rows individually"
                );
                for (offset, row) in batch.iter().enumerate() {
                    if offset > 0 {
                        tokio::time::sleep(row_delay).await;
                    }
                    match sink.insert_rows(table_id, std::slice::from_ref(row)).await {
                        Ok(results) if results.iter().all(|r| r.success) => report.inserted += 1,
                        Ok(_) => warn!(
                            table = %table_id,
                            row = batch_index * config.batch_size + offset,
                            "row rejected on retry"
                        ),
                        Err(error) => warn!(
                            table = %table_id,
                            row = batch_index * config.batch_size + offset,
                            %error,
                            "row insert failed on retry"
                        ),
                    }
                }
            }
        }
    }

    info!(
        table = %table_id,
        attempted = report.attempted,
        inserted = report.inserted,
        "batch insert pass complete"
    );
    report
}
