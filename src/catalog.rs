//! Catalog surface consumed by insert destinations.
//!
//! Only the slice of the catalog that the insertion path needs lives
//! here: relation identity, schema conformance checks, the relation's
//! current block list, its default block layout, and the optional
//! partition scheme.

use crate::block::{BlockId, BlockLayout};
use crate::partition::PartitionScheme;
use crate::{Result, SinkError, Tuple};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Identifier of a relation in the catalog.
pub type RelationId = u32;

/// Position of an attribute within a relation's schema.
pub type AttributeId = usize;

/// Type of a single attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttributeType {
    Int,
    Double,
    Text,
}

/// A named, typed attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    pub name: String,
    pub attr_type: AttributeType,
}

impl Attribute {
    /// Creates a new attribute.
    pub fn new(name: impl Into<String>, attr_type: AttributeType) -> Self {
        Self {
            name: name.into(),
            attr_type,
        }
    }
}

/// An ordered list of attributes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationSchema {
    attributes: Vec<Attribute>,
}

impl RelationSchema {
    /// Creates a schema from its attributes.
    pub fn new(attributes: Vec<Attribute>) -> Self {
        Self { attributes }
    }

    /// Number of attributes.
    pub fn arity(&self) -> usize {
        self.attributes.len()
    }

    /// The attribute at the given position, if in range.
    pub fn attribute(&self, id: AttributeId) -> Option<&Attribute> {
        self.attributes.get(id)
    }

    /// Checks that a tuple conforms to this schema.
    ///
    /// A tuple conforms when its arity matches and every non-null value
    /// carries the type of its attribute. Returns a human-readable
    /// description of the first violation.
    pub fn conformance_error(&self, tuple: &Tuple) -> Option<String> {
        if tuple.arity() != self.arity() {
            return Some(format!(
                "expected {} values, got {}",
                self.arity(),
                tuple.arity()
            ));
        }
        for (id, attribute) in self.attributes.iter().enumerate() {
            let value = &tuple.values()[id];
            if let Some(kind) = value.kind()
                && kind != attribute.attr_type
            {
                return Some(format!(
                    "attribute '{}' is {:?} but value {} is {:?}",
                    attribute.name, attribute.attr_type, value, kind
                ));
            }
        }
        None
    }
}

/// A relation as seen by the insertion path.
///
/// The destination never owns the relation; it is shared between the
/// catalog, the operators, and every destination writing into it.
pub struct CatalogRelation {
    id: RelationId,
    name: String,
    schema: Arc<RelationSchema>,
    default_layout: BlockLayout,
    blocks: Mutex<Vec<BlockId>>,
    partition_scheme: Option<Arc<PartitionScheme>>,
}

impl CatalogRelation {
    /// Creates a relation without a partition scheme.
    pub fn new(
        id: RelationId,
        name: impl Into<String>,
        schema: RelationSchema,
        default_layout: BlockLayout,
    ) -> Result<Self> {
        let name = name.into();
        if default_layout.num_attributes() != schema.arity() {
            return Err(SinkError::InvalidConfiguration(format!(
                "default layout of relation '{}' describes {} attributes but the schema has {}",
                name,
                default_layout.num_attributes(),
                schema.arity()
            )));
        }
        Ok(Self {
            id,
            name,
            schema: Arc::new(schema),
            default_layout,
            blocks: Mutex::new(Vec::new()),
            partition_scheme: None,
        })
    }

    /// Attaches a partition scheme. The scheme's partitioning attribute
    /// must exist in the schema.
    pub fn with_partition_scheme(mut self, scheme: PartitionScheme) -> Result<Self> {
        if self.schema.attribute(scheme.attribute()).is_none() {
            return Err(SinkError::InvalidConfiguration(format!(
                "partitioning attribute {} does not exist in relation '{}'",
                scheme.attribute(),
                self.name
            )));
        }
        self.partition_scheme = Some(Arc::new(scheme));
        Ok(self)
    }

    /// The relation id.
    pub fn id(&self) -> RelationId {
        self.id
    }

    /// The relation name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The relation schema.
    pub fn schema(&self) -> &Arc<RelationSchema> {
        &self.schema
    }

    /// The layout used for new blocks when a destination carries none.
    pub fn default_layout(&self) -> &BlockLayout {
        &self.default_layout
    }

    /// The partition scheme, if the relation is partitioned.
    pub fn partition_scheme(&self) -> Option<&Arc<PartitionScheme>> {
        self.partition_scheme.as_ref()
    }

    /// Registers a freshly created block with the relation.
    pub fn add_block(&self, block_id: BlockId) {
        self.blocks.lock().push(block_id);
        debug!(relation = %self.name, block_id, "registered block with relation");
    }

    /// Snapshot of the relation's current block list.
    pub fn block_ids(&self) -> Vec<BlockId> {
        self.blocks.lock().clone()
    }

    /// Number of blocks currently registered.
    pub fn block_count(&self) -> usize {
        self.blocks.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TypedValue;

    fn two_column_schema() -> RelationSchema {
        RelationSchema::new(vec![
            Attribute::new("id", AttributeType::Int),
            Attribute::new("name", AttributeType::Text),
        ])
    }

    #[test]
    fn conformance_accepts_nulls_in_any_column() {
        let schema = two_column_schema();
        let tuple = Tuple::new(vec![TypedValue::Null, TypedValue::Null]);
        assert!(schema.conformance_error(&tuple).is_none());
    }

    #[test]
    fn conformance_rejects_arity_and_type_violations() {
        let schema = two_column_schema();

        let short = Tuple::new(vec![TypedValue::Int(1)]);
        assert!(schema.conformance_error(&short).is_some());

        let wrong_type = Tuple::new(vec![TypedValue::Text("x".into()), TypedValue::Null]);
        let details = schema.conformance_error(&wrong_type).unwrap();
        assert!(details.contains("'id'"), "unexpected details: {details}");
    }

    #[test]
    fn relation_rejects_layout_with_wrong_arity() {
        let layout = BlockLayout::new(3, 16).unwrap();
        let result = CatalogRelation::new(1, "orders", two_column_schema(), layout);
        assert!(matches!(result, Err(SinkError::InvalidConfiguration(_))));
    }
}
