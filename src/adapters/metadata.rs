use crate::driver::{self, Nullability, RowMetadata, ValueType};
use crate::types::ColumnNullability;

/// Column metadata by 1-based index, as the binding layer sees it.
pub struct MetadataAccessor<'a> {
    metadata: &'a dyn RowMetadata,
}

impl<'a> MetadataAccessor<'a> {
    #[must_use]
    pub fn new(metadata: &'a dyn RowMetadata) -> Self {
        Self { metadata }
    }

    #[must_use]
    pub fn column_count(&self) -> usize {
        self.metadata.column_count()
    }

    #[must_use]
    pub fn column_name(&self, index: usize) -> Option<String> {
        self.metadata.column_name(index - 1).map(str::to_string)
    }

    #[must_use]
    pub fn precision(&self, index: usize) -> u32 {
        self.metadata.precision(index - 1).unwrap_or(0)
    }

    #[must_use]
    pub fn scale(&self, index: usize) -> u32 {
        self.metadata.scale(index - 1).unwrap_or(0)
    }

    #[must_use]
    pub fn nullability(&self, index: usize) -> ColumnNullability {
        match self.metadata.nullability(index - 1) {
            Nullability::NonNull => ColumnNullability::NotNull,
            Nullability::Nullable => ColumnNullability::Nullable,
            Nullability::Unknown => ColumnNullability::Unknown,
        }
    }

    #[must_use]
    pub fn value_type(&self, index: usize) -> ValueType {
        self.metadata.value_type(index - 1)
    }

    /// The column type name.
    ///
    /// Prefers the driver's native type descriptor. A driver predating
    /// descriptors returns none; the first miss downgrades a process-wide
    /// flag so later calls skip the probe and go straight to the name derived
    /// from the driver value type.
    #[must_use]
    pub fn type_name(&self, index: usize) -> String {
        if driver::native_type_info_enabled() {
            match self.metadata.type_info(index - 1) {
                Some(info) => return info.name,
                None => {
                    tracing::warn!(
                        "driver exposes no native type descriptors, using derived type names"
                    );
                    driver::disable_native_type_info();
                }
            }
        }

        self.metadata.value_type(index - 1).name().to_string()
    }
}
