//! Seams to the external binding layer.
//!
//! The bridge never interprets column values itself. Each result field is
//! read through a per-column [`FieldBinding::get`] capability over the row
//! accessor, and each bind value is written through a per-parameter
//! [`ParamBinding::set`] capability over the statement binder. Default
//! implementations dispatch on the declared [`SqlType`]; a typed query layer
//! can install its own bindings per field or parameter.

use std::fmt;
use std::sync::Arc;

use crate::adapters::{MetadataAccessor, RowAccessor, StatementBinder};
use crate::driver::ValueType;
use crate::error::SqlBridgeError;
use crate::types::{RowValues, SqlType};

/// Context for reading one record field from the current row. The index is
/// 1-based, like everything on the library side.
pub struct BindingGetContext<'a, 'r> {
    row: &'a mut RowAccessor<'r>,
    index: usize,
}

impl<'a, 'r> BindingGetContext<'a, 'r> {
    pub(crate) fn new(row: &'a mut RowAccessor<'r>, index: usize) -> Self {
        Self { row, index }
    }

    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn row(&mut self) -> &mut RowAccessor<'r> {
        self.row
    }
}

/// Per-column read capability of the binding layer.
pub trait FieldBinding: Send + Sync {
    /// Read the field at the context's column from the current row.
    ///
    /// # Errors
    ///
    /// A failure suppresses the row and terminates the subscription with a
    /// mapping error.
    fn get(&self, ctx: &mut BindingGetContext<'_, '_>) -> Result<RowValues, SqlBridgeError>;
}

/// One resolved result field: a name, a declared type, and the binding that
/// reads it.
#[derive(Clone)]
pub struct FieldDef {
    pub name: String,
    pub ty: SqlType,
    pub binding: Arc<dyn FieldBinding>,
}

impl FieldDef {
    /// A field read by the default binding for its type.
    pub fn new(name: impl Into<String>, ty: SqlType) -> Self {
        Self {
            name: name.into(),
            ty,
            binding: Arc::new(DefaultFieldBinding { ty }),
        }
    }

    pub fn with_binding(
        name: impl Into<String>,
        ty: SqlType,
        binding: Arc<dyn FieldBinding>,
    ) -> Self {
        Self {
            name: name.into(),
            ty,
            binding,
        }
    }
}

impl fmt::Debug for FieldDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldDef")
            .field("name", &self.name)
            .field("ty", &self.ty)
            .finish()
    }
}

/// Default field binding: read the column as its declared SQL type.
pub struct DefaultFieldBinding {
    ty: SqlType,
}

impl DefaultFieldBinding {
    #[must_use]
    pub fn new(ty: SqlType) -> Self {
        Self { ty }
    }
}

impl FieldBinding for DefaultFieldBinding {
    fn get(&self, ctx: &mut BindingGetContext<'_, '_>) -> Result<RowValues, SqlBridgeError> {
        let index = ctx.index();
        let row = ctx.row();
        let value = match self.ty {
            SqlType::BigInt => {
                let v = row.get_i64(index)?;
                if row.was_null() {
                    RowValues::Null
                } else {
                    RowValues::Int(v)
                }
            }
            SqlType::Double => {
                let v = row.get_f64(index)?;
                if row.was_null() {
                    RowValues::Null
                } else {
                    RowValues::Float(v)
                }
            }
            SqlType::Boolean => {
                let v = row.get_bool(index)?;
                if row.was_null() {
                    RowValues::Null
                } else {
                    RowValues::Bool(v)
                }
            }
            SqlType::Varchar => row
                .get_text(index)?
                .map_or(RowValues::Null, RowValues::Text),
            SqlType::Date => row.get_date(index)?.map_or(RowValues::Null, RowValues::Date),
            SqlType::Time => row.get_time(index)?.map_or(RowValues::Null, RowValues::Time),
            SqlType::Timestamp => row
                .get_timestamp(index)?
                .map_or(RowValues::Null, RowValues::Timestamp),
            SqlType::Json => row.get_json(index)?.map_or(RowValues::Null, RowValues::JSON),
            SqlType::Blob => row
                .get_bytes(index)?
                .map_or(RowValues::Null, RowValues::Blob),
        };
        Ok(value)
    }
}

/// Derive a field list straight from driver metadata, one default-bound field
/// per column. This is what a plain-SQL record query gets.
#[must_use]
pub fn derive_fields(metadata: &MetadataAccessor<'_>) -> Vec<FieldDef> {
    (1..=metadata.column_count())
        .map(|i| {
            let name = metadata
                .column_name(i)
                .unwrap_or_else(|| format!("column{i}"));
            FieldDef::new(name, sql_type_of(metadata.value_type(i)))
        })
        .collect()
}

/// The library type a driver value type reads back as.
#[must_use]
pub fn sql_type_of(ty: ValueType) -> SqlType {
    match ty {
        ValueType::Integer => SqlType::BigInt,
        ValueType::Float => SqlType::Double,
        ValueType::Text => SqlType::Varchar,
        ValueType::Boolean => SqlType::Boolean,
        ValueType::LocalDate => SqlType::Date,
        ValueType::LocalTime => SqlType::Time,
        ValueType::LocalDateTime => SqlType::Timestamp,
        ValueType::Bytes => SqlType::Blob,
        ValueType::Json => SqlType::Json,
    }
}

/// Context for writing one bind value onto a statement. The index is 1-based;
/// the binder underneath owns the shift to the driver's 0-based slots.
pub struct BindingSetContext<'a, 'b> {
    binder: &'a mut StatementBinder<'b>,
    index: usize,
}

impl<'a, 'b> BindingSetContext<'a, 'b> {
    pub(crate) fn new(binder: &'a mut StatementBinder<'b>, index: usize) -> Self {
        Self { binder, index }
    }

    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn binder(&mut self) -> &mut StatementBinder<'b> {
        self.binder
    }
}

/// Per-parameter write capability of the binding layer.
pub trait ParamBinding: Send + Sync {
    /// Bind one value at the context's parameter slot.
    ///
    /// # Errors
    ///
    /// Driver bind failures terminate the subscription.
    fn set(
        &self,
        ctx: &mut BindingSetContext<'_, '_>,
        ty: SqlType,
        value: &RowValues,
    ) -> Result<(), SqlBridgeError>;
}

/// Default parameter binding: typed setter per value variant, typed null for
/// NULL.
pub struct DefaultParamBinding;

static DEFAULT_PARAM_BINDING: DefaultParamBinding = DefaultParamBinding;

impl ParamBinding for DefaultParamBinding {
    fn set(
        &self,
        ctx: &mut BindingSetContext<'_, '_>,
        ty: SqlType,
        value: &RowValues,
    ) -> Result<(), SqlBridgeError> {
        let index = ctx.index();
        let binder = ctx.binder();
        match value {
            RowValues::Null => binder.set_null(index, ty),
            RowValues::Int(v) => binder.set_i64(index, *v),
            RowValues::Float(v) => binder.set_f64(index, *v),
            RowValues::Text(v) => binder.set_text(index, v.clone()),
            RowValues::Bool(v) => binder.set_bool(index, *v),
            RowValues::Date(v) => binder.set_date(index, *v),
            RowValues::Time(v) => binder.set_time(index, *v),
            RowValues::Timestamp(v) => binder.set_timestamp(index, *v),
            RowValues::JSON(v) => binder.set_json(index, v.clone()),
            RowValues::Blob(v) => binder.set_bytes(index, v.clone()),
        }
    }
}

/// One rendered bind parameter: a declared type, a value, and optionally a
/// custom binding.
#[derive(Clone)]
pub struct Param {
    pub ty: SqlType,
    pub value: RowValues,
    binding: Option<Arc<dyn ParamBinding>>,
}

impl Param {
    #[must_use]
    pub fn new(ty: SqlType, value: RowValues) -> Self {
        Self {
            ty,
            value,
            binding: None,
        }
    }

    /// A parameter whose type is inferred from its value.
    #[must_use]
    pub fn of_value(value: RowValues) -> Self {
        Self::new(SqlType::of_value(&value), value)
    }

    #[must_use]
    pub fn with_binding(mut self, binding: Arc<dyn ParamBinding>) -> Self {
        self.binding = Some(binding);
        self
    }

    #[must_use]
    pub fn binding(&self) -> &dyn ParamBinding {
        match &self.binding {
            Some(binding) => binding.as_ref(),
            None => &DEFAULT_PARAM_BINDING,
        }
    }
}

impl fmt::Debug for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Param")
            .field("ty", &self.ty)
            .field("value", &self.value)
            .finish()
    }
}

/// Walk a rendered bind-value list onto a statement, one parameter at a time.
///
/// # Errors
///
/// Stops at the first binding failure.
pub fn bind_all(
    binder: &mut StatementBinder<'_>,
    params: &[Param],
) -> Result<(), SqlBridgeError> {
    for (i, param) in params.iter().enumerate() {
        let mut ctx = BindingSetContext::new(binder, i + 1);
        param.binding().set(&mut ctx, param.ty, &param.value)?;
    }
    Ok(())
}
