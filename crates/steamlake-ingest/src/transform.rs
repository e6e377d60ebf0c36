//! CSV to Parquet consolidation
//!
//! Every `*.csv` in the input directory is folded into one Parquet file.
//! Schemas are inferred per file and unified by column name, rows without a
//! primary key are dropped, and a few columns are derived or retyped:
//!
//! - `game_id`: source file stem (`730.csv` -> `"730"`)
//! - `year_created` / `month_created`: from the creation timestamp (Unix seconds)
//! - boolean columns cast to `Boolean`
//! - timestamp columns cast to second-resolution timestamps
//!
//! Nothing is read when the output file already exists.

use crate::error::{IngestError, Result};
use crate::idempotence::Idempotent;
use arrow_array::cast::AsArray;
use arrow_array::types::Int64Type;
use arrow_array::{new_null_array, ArrayRef, Int32Array, RecordBatch, StringArray};
use arrow_cast::cast;
use arrow_csv::reader::Format;
use arrow_csv::ReaderBuilder;
use arrow_schema::{DataType, Field, Schema, SchemaRef, TimeUnit};
use chrono::{DateTime, Datelike};
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, instrument};

pub const GAME_ID_COLUMN: &str = "game_id";
pub const YEAR_COLUMN: &str = "year_created";
pub const MONTH_COLUMN: &str = "month_created";

#[derive(Debug, Clone)]
pub struct TransformOptions {
    /// Rows where this column is null are dropped
    pub primary_key: String,
    /// Source of `year_created`/`month_created`
    pub created_column: String,
    pub timestamp_columns: Vec<String>,
    pub boolean_columns: Vec<String>,
    pub batch_size: usize,
    /// `None` scans whole files when inferring their schema
    pub infer_max_records: Option<usize>,
}

impl Default for TransformOptions {
    fn default() -> Self {
        Self {
            primary_key: "recommendationid".to_string(),
            created_column: "timestamp_created".to_string(),
            timestamp_columns: vec![
                "timestamp_created".to_string(),
                "timestamp_updated".to_string(),
                "author_last_played".to_string(),
            ],
            boolean_columns: vec!["voted_up".to_string(), "steam_purchase".to_string()],
            batch_size: 8192,
            infer_max_records: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConvertOutcome {
    Skipped {
        output: PathBuf,
    },
    Converted {
        output: PathBuf,
        files: usize,
        rows_written: usize,
        rows_dropped: usize,
    },
}

impl ConvertOutcome {
    pub fn output(&self) -> &Path {
        match self {
            ConvertOutcome::Skipped { output } | ConvertOutcome::Converted { output, .. } => output,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConvertPlan {
    pub output: PathBuf,
    pub output_exists: bool,
    /// Left empty when the output exists
    pub inputs: Vec<PathBuf>,
}

impl Idempotent for ConvertPlan {
    fn already_done(&self) -> bool {
        self.output_exists
    }
}

impl ConvertPlan {
    pub fn inspect(input_dir: &Path, output: &Path) -> Result<Self> {
        if output.exists() {
            return Ok(Self {
                output: output.to_path_buf(),
                output_exists: true,
                inputs: Vec::new(),
            });
        }

        let inputs = crate::upload::files_with_extension(input_dir, "csv")
            .map_err(|e| IngestError::transform(format!("cannot list inputs: {}", e)))?;

        Ok(Self {
            output: output.to_path_buf(),
            output_exists: false,
            inputs,
        })
    }
}

/// Common type for two inferred column types
pub fn widen(a: &DataType, b: &DataType) -> DataType {
    match (a, b) {
        (a, b) if a == b => a.clone(),
        (DataType::Null, other) | (other, DataType::Null) => other.clone(),
        (DataType::Int64, DataType::Float64) | (DataType::Float64, DataType::Int64) => DataType::Float64,
        _ => DataType::Utf8,
    }
}

/// Union of columns by name, in order of first appearance
pub fn unify_schemas(schemas: &[Schema]) -> Schema {
    let mut order: Vec<String> = Vec::new();
    let mut types: HashMap<String, DataType> = HashMap::new();

    for schema in schemas {
        for field in schema.fields() {
            match types.get_mut(field.name()) {
                Some(existing) => *existing = widen(existing, field.data_type()),
                None => {
                    order.push(field.name().clone());
                    types.insert(field.name().clone(), field.data_type().clone());
                },
            }
        }
    }

    let fields: Vec<Field> = order
        .into_iter()
        .map(|name| {
            let data_type = types.remove(&name).unwrap_or(DataType::Utf8);
            Field::new(name, data_type, true)
        })
        .collect();
    Schema::new(fields)
}

fn timestamp_type() -> DataType {
    DataType::Timestamp(TimeUnit::Second, None)
}

fn is_derived(name: &str) -> bool {
    matches!(name, GAME_ID_COLUMN | YEAR_COLUMN | MONTH_COLUMN)
}

/// Unified columns with retyped booleans/timestamps, then the derived columns
fn output_schema(unified: &Schema, options: &TransformOptions) -> SchemaRef {
    let mut fields: Vec<Field> = unified
        .fields()
        .iter()
        .filter(|f| !is_derived(f.name()))
        .map(|f| {
            let data_type = if options.boolean_columns.contains(f.name()) {
                DataType::Boolean
            } else if options.timestamp_columns.contains(f.name()) {
                timestamp_type()
            } else {
                f.data_type().clone()
            };
            Field::new(f.name(), data_type, true)
        })
        .collect();

    fields.push(Field::new(GAME_ID_COLUMN, DataType::Utf8, false));
    fields.push(Field::new(YEAR_COLUMN, DataType::Int32, true));
    fields.push(Field::new(MONTH_COLUMN, DataType::Int32, true));
    Arc::new(Schema::new(fields))
}

fn infer_file_schema(path: &Path, options: &TransformOptions) -> Result<Schema> {
    let mut reader = BufReader::new(File::open(path)?);
    let (schema, _) = Format::default()
        .with_header(true)
        .infer_schema(&mut reader, options.infer_max_records)
        .map_err(|e| IngestError::transform(format!("{}: {}", path.display(), e)))?;
    Ok(schema)
}

fn as_seconds(column: &ArrayRef) -> Result<ArrayRef> {
    Ok(cast(column, &DataType::Int64)?)
}

fn created_parts(created: &ArrayRef) -> Result<(Int32Array, Int32Array)> {
    let seconds = as_seconds(created)?;
    let seconds = seconds
        .as_primitive_opt::<Int64Type>()
        .ok_or_else(|| IngestError::transform("creation timestamp is not integral"))?;

    let dates: Vec<_> = seconds
        .iter()
        .map(|s| s.and_then(|s| DateTime::from_timestamp(s, 0)))
        .collect();

    let years = dates.iter().map(|d| d.map(|d| d.year())).collect();
    let months = dates.iter().map(|d| d.map(|d| d.month() as i32)).collect();
    Ok((years, months))
}

/// Bring one batch to the output schema and drop rows without a primary key
///
/// Returns the conformed batch and the number of dropped rows.
fn conform_batch(
    batch: &RecordBatch,
    game_id: &str,
    unified: &Schema,
    output: &SchemaRef,
    options: &TransformOptions,
) -> Result<(RecordBatch, usize)> {
    let rows = batch.num_rows();
    let column = |name: &str, data_type: &DataType| -> Result<ArrayRef> {
        match batch.column_by_name(name) {
            Some(col) if col.data_type() == data_type => Ok(col.clone()),
            Some(col) => Ok(cast(col, data_type)?),
            None => Ok(new_null_array(data_type, rows)),
        }
    };

    let mut columns: Vec<ArrayRef> = Vec::with_capacity(output.fields().len());
    let mut created: Option<ArrayRef> = None;

    for field in unified.fields().iter().filter(|f| !is_derived(f.name())) {
        let unified_col = column(field.name(), field.data_type())?;
        if *field.name() == options.created_column {
            created = Some(unified_col.clone());
        }

        let col = if options.boolean_columns.contains(field.name()) {
            cast(&unified_col, &DataType::Boolean)?
        } else if options.timestamp_columns.contains(field.name()) {
            cast(&as_seconds(&unified_col)?, &timestamp_type())?
        } else {
            unified_col
        };
        columns.push(col);
    }

    let (years, months) = match created {
        Some(created) => created_parts(&created)?,
        None => (Int32Array::new_null(rows), Int32Array::new_null(rows)),
    };

    columns.push(Arc::new(StringArray::from_iter_values(
        std::iter::repeat(game_id).take(rows),
    )));
    columns.push(Arc::new(years));
    columns.push(Arc::new(months));

    let conformed = RecordBatch::try_new(output.clone(), columns)?;

    let key = conformed
        .column_by_name(&options.primary_key)
        .ok_or_else(|| IngestError::transform(format!("missing column '{}'", options.primary_key)))?;
    let keep = arrow_arith::boolean::is_not_null(key.as_ref())?;
    let filtered = arrow_select::filter::filter_record_batch(&conformed, &keep)?;
    let dropped = rows - filtered.num_rows();

    Ok((filtered, dropped))
}

fn part_path(output: &Path) -> PathBuf {
    let mut os = output.as_os_str().to_owned();
    os.push(".part");
    PathBuf::from(os)
}

/// Convert every CSV in `input_dir` into `output` unless it already exists
#[instrument(skip(options), fields(input = %input_dir.display(), output = %output.display()))]
pub fn convert_to_parquet(
    input_dir: &Path,
    output: &Path,
    options: &TransformOptions,
) -> Result<ConvertOutcome> {
    let plan = ConvertPlan::inspect(input_dir, output)?;

    if plan.already_done() {
        info!("Parquet output already exists");
        return Ok(ConvertOutcome::Skipped {
            output: plan.output,
        });
    }

    if plan.inputs.is_empty() {
        return Err(IngestError::transform(format!(
            "no CSV files in {}",
            input_dir.display()
        )));
    }

    let schemas = plan
        .inputs
        .iter()
        .map(|path| infer_file_schema(path, options))
        .collect::<Result<Vec<_>>>()?;

    let unified = unify_schemas(&schemas);
    if unified.field_with_name(&options.primary_key).is_err() {
        return Err(IngestError::transform(format!(
            "primary key column '{}' not found in any input",
            options.primary_key
        )));
    }
    let schema = output_schema(&unified, options);
    debug!(columns = schema.fields().len(), "Unified schema");

    if let Some(parent) = output.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let partial = part_path(output);
    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build();
    let mut writer = ArrowWriter::try_new(File::create(&partial)?, schema.clone(), Some(props))?;

    let mut rows_written = 0;
    let mut rows_dropped = 0;

    for (path, file_schema) in plan.inputs.iter().zip(schemas) {
        let game_id = path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| IngestError::transform(format!("bad file name {}", path.display())))?;

        let file = File::open(path)?;
        let reader = ReaderBuilder::new(Arc::new(file_schema))
            .with_header(true)
            .with_batch_size(options.batch_size)
            .build(file)?;

        let mut file_rows = 0;
        for batch in reader {
            let batch = batch.map_err(|e| IngestError::transform(format!("{}: {}", path.display(), e)))?;
            let (batch, dropped) = conform_batch(&batch, game_id, &unified, &schema, options)?;
            rows_dropped += dropped;
            file_rows += batch.num_rows();
            if batch.num_rows() > 0 {
                writer.write(&batch)?;
            }
        }

        debug!(game_id, rows = file_rows, "Converted {}", path.display());
        rows_written += file_rows;
    }

    writer.close()?;
    std::fs::rename(&partial, output)?;

    info!(
        files = plan.inputs.len(),
        rows_written, rows_dropped, "Parquet file written"
    );

    Ok(ConvertOutcome::Converted {
        output: plan.output,
        files: plan.inputs.len(),
        rows_written,
        rows_dropped,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_widen() {
        assert_eq!(widen(&DataType::Int64, &DataType::Int64), DataType::Int64);
        assert_eq!(widen(&DataType::Null, &DataType::Boolean), DataType::Boolean);
        assert_eq!(widen(&DataType::Utf8, &DataType::Null), DataType::Utf8);
        assert_eq!(widen(&DataType::Int64, &DataType::Float64), DataType::Float64);
        assert_eq!(widen(&DataType::Boolean, &DataType::Int64), DataType::Utf8);
    }

    #[test]
    fn test_unify_schemas_keeps_first_appearance_order() {
        let a = Schema::new(vec![
            Field::new("recommendationid", DataType::Int64, true),
            Field::new("review", DataType::Utf8, true),
            Field::new("weighted_vote_score", DataType::Int64, true),
        ]);
        let b = Schema::new(vec![
            Field::new("recommendationid", DataType::Int64, true),
            Field::new("weighted_vote_score", DataType::Float64, true),
            Field::new("language", DataType::Utf8, true),
        ]);

        let unified = unify_schemas(&[a, b]);
        let columns: Vec<_> = unified
            .fields()
            .iter()
            .map(|f| (f.name().as_str(), f.data_type().clone()))
            .collect();

        assert_eq!(
            columns,
            vec![
                ("recommendationid", DataType::Int64),
                ("review", DataType::Utf8),
                ("weighted_vote_score", DataType::Float64),
                ("language", DataType::Utf8),
            ]
        );
    }

    #[test]
    fn test_output_schema_appends_derived_columns() {
        let unified = Schema::new(vec![
            Field::new("recommendationid", DataType::Int64, true),
            Field::new("timestamp_created", DataType::Int64, true),
            Field::new("voted_up", DataType::Int64, true),
        ]);
        let schema = output_schema(&unified, &TransformOptions::default());
        let names: Vec<_> = schema.fields().iter().map(|f| f.name().as_str()).collect();

        assert_eq!(
            names,
            vec!["recommendationid", "timestamp_created", "voted_up", "game_id", "year_created", "month_created"]
        );
        assert_eq!(schema.field(1).data_type(), &timestamp_type());
        assert_eq!(schema.field(2).data_type(), &DataType::Boolean);
    }
}
