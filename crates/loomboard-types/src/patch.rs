//! Partial shape updates and the `update_shapes` merge policy.
//!
//! A [`ShapePatch`] carries only the fields the caller wants to touch.
//! Absent fields never overwrite existing state. The two merge modes:
//!
//! - **Full merge** (no [`MergeKeys`]): every present patch field lands on
//!   a copy of the existing record; `props` merges one level deep
//!   (existing ∪ patch, patch wins on conflicts).
//! - **Keyed merge** ([`MergeKeys`] supplied): only the named top-level
//!   keys (`type`, `parentId`, `index` — never `props` wholesale) and the
//!   named `props` sub-keys are copied; everything else is preserved
//!   untouched.

use serde::{Deserialize, Serialize};

use crate::ids::RecordId;
use crate::record::{JsonMap, Record, ShapeRecord};

/// A partial update to one shape, keyed by id.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ShapePatch {
    pub id: RecordId,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub shape_type: Option<String>,
    #[serde(rename = "parentId", default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<RecordId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<String>,
    #[serde(default)]
    pub props: JsonMap,
}

/// Restricts a keyed merge to named top-level keys and `props` sub-keys.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MergeKeys {
    /// Top-level keys to copy: `type`, `parentId`, `index`.
    #[serde(default)]
    pub keys: Vec<String>,
    /// `props` sub-keys to copy.
    #[serde(default)]
    pub props: Vec<String>,
}

/// Options for a batched `update_shapes` call.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct UpdateShapesOptions {
    /// Create a shape for a patch with no existing record (requires the
    /// patch to carry a `type`; otherwise the patch is skipped silently).
    #[serde(rename = "createIfMissing", default)]
    pub create_if_missing: bool,
    /// Restrict merges to the named keys.
    #[serde(rename = "keysToMerge", default, skip_serializing_if = "Option::is_none")]
    pub keys_to_merge: Option<MergeKeys>,
    /// Records put unconditionally in the same atomic batch.
    #[serde(rename = "additionalRecords", default)]
    pub additional_records: Vec<Record>,
}

impl ShapePatch {
    /// A patch that only touches props.
    pub fn props_only(id: RecordId, props: JsonMap) -> Self {
        Self {
            id,
            shape_type: None,
            parent_id: None,
            index: None,
            props,
        }
    }

    /// Materialize this patch as a brand-new shape.
    ///
    /// Returns `None` when the patch does not specify a `type` — a patch
    /// without a type cannot become a record.
    pub fn into_record(self) -> Option<ShapeRecord> {
        let shape_type = self.shape_type?;
        Some(ShapeRecord {
            id: self.id,
            shape_type,
            parent_id: self.parent_id,
            index: self.index,
            props: self.props,
        })
    }

    /// Full shallow merge onto a copy of `existing`.
    pub fn merged_onto(&self, existing: &ShapeRecord) -> ShapeRecord {
        let mut out = existing.clone();
        if let Some(t) = &self.shape_type {
            out.shape_type = t.clone();
        }
        if let Some(p) = &self.parent_id {
            out.parent_id = Some(p.clone());
        }
        if let Some(i) = &self.index {
            out.index = Some(i.clone());
        }
        for (k, v) in &self.props {
            out.props.insert(k.clone(), v.clone());
        }
        out
    }

    /// Keyed merge onto a copy of `existing`: only the keys named in
    /// `merge_keys` are copied, and only when the patch actually carries
    /// them.
    pub fn merged_onto_keyed(&self, existing: &ShapeRecord, merge_keys: &MergeKeys) -> ShapeRecord {
        let mut out = existing.clone();
        for key in &merge_keys.keys {
            match key.as_str() {
                "type" => {
                    if let Some(t) = &self.shape_type {
                        out.shape_type = t.clone();
                    }
                }
                "parentId" => {
                    if let Some(p) = &self.parent_id {
                        out.parent_id = Some(p.clone());
                    }
                }
                "index" => {
                    if let Some(i) = &self.index {
                        out.index = Some(i.clone());
                    }
                }
                // Unknown top-level keys (and "props" itself) are never
                // merged wholesale.
                _ => {}
            }
        }
        for key in &merge_keys.props {
            if let Some(v) = self.props.get(key) {
                out.props.insert(key.clone(), v.clone());
            }
        }
        out
    }
}
