//! The renderer-facing contract.
//!
//! Rendering itself is external: queries arrive as trait objects that know
//! how to turn themselves into SQL plus bind values under the settings the
//! bridge hands them. The bridge only decides the settings (named-parameter
//! prefix per dialect family) and consumes the rendered output.

use std::sync::Arc;

use crate::adapters::MetadataAccessor;
use crate::binding::{FieldDef, Param, derive_fields};
use crate::error::SqlBridgeError;
use crate::results::{Record, RecordSchema};
use crate::types::DatabaseFamily;

/// Outcome of rendering one query.
#[derive(Debug, Clone)]
pub struct Rendered {
    pub sql: String,
    pub bind_values: Vec<Param>,
    /// Whether update counts of this statement should be ignored by result
    /// processing layered on top of the bridge.
    pub skip_update_counts: bool,
}

impl Rendered {
    pub fn new(sql: impl Into<String>, bind_values: Vec<Param>) -> Self {
        Self {
            sql: sql.into(),
            bind_values,
            skip_update_counts: false,
        }
    }

    #[must_use]
    pub fn with_skip_update_counts(mut self, skip: bool) -> Self {
        self.skip_update_counts = skip;
        self
    }
}

/// Render-time settings handed to the external renderer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderSettings {
    /// Prefix for named parameter markers, `$` unless the family needs its
    /// native marker.
    pub named_param_prefix: String,
    pub family: DatabaseFamily,
}

impl RenderSettings {
    /// Settings for a dialect family.
    ///
    /// MySQL and MariaDB keep their native named markers; every other family
    /// renders `$`-prefixed named parameters.
    #[must_use]
    pub fn for_family(family: DatabaseFamily) -> Self {
        match family {
            DatabaseFamily::MySql | DatabaseFamily::MariaDb => Self {
                named_param_prefix: ":".into(),
                family,
            },
            _ => Self {
                named_param_prefix: "$".into(),
                family,
            },
        }
    }
}

/// A query the bridge can execute: anything that renders to SQL.
pub trait SqlQuery: Send + Sync {
    /// Render to SQL and bind values under the given settings.
    ///
    /// # Errors
    ///
    /// Render failures terminate the subscription before any driver call.
    fn render(&self, settings: &RenderSettings) -> Result<Rendered, SqlBridgeError>;

    /// Render with all bind values inlined. Multi-statement batches append
    /// the result verbatim, with no bind phase.
    fn render_inlined(&self) -> Result<String, SqlBridgeError>;
}

/// A query producing records.
pub trait RecordQuery: SqlQuery {
    /// Resolve the field list for one execution from the driver's metadata.
    ///
    /// The default derives one field per metadata column with the default
    /// binding, which is what a plain-SQL query wants. The list is resolved
    /// once per statement execution and cached by the caller.
    ///
    /// # Errors
    ///
    /// A failure here surfaces as a mapping error on the first row.
    fn fields(&self, metadata: &MetadataAccessor<'_>) -> Result<Vec<FieldDef>, SqlBridgeError> {
        Ok(derive_fields(metadata))
    }

    /// Cursor fetch-size hint, forwarded to the driver when non-zero.
    fn fetch_size(&self) -> Option<u32> {
        None
    }

    /// The record factory: an empty record the binding layer fills.
    fn new_record(&self, schema: Arc<RecordSchema>) -> Record {
        Record::empty(schema)
    }
}

/// A data-modifying query producing row counts.
pub trait DmlQuery: SqlQuery {
    /// Column names to return as generated values.
    fn returning(&self) -> &[String] {
        &[]
    }

    /// Whether the dialect natively supports returning clauses for this
    /// statement. When it does not, the returning columns are requested as
    /// generated values on the driver statement instead.
    fn native_support_returning(&self) -> bool {
        true
    }
}
