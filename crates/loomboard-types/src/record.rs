//! The `Record` discriminated union: one persisted entity in a session
//! document.
//!
//! Records serialize with a `kind` tag (`document`, `page`, `shape`,
//! `binding`) matching the wire format the canvas client exchanges. Shape
//! props are an opaque `serde_json` map; the core never interprets them
//! beyond the handful of keys the merge logic and the prediction
//! pair-delete read.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::RecordId;

/// Opaque shape/binding props payload.
pub type JsonMap = serde_json::Map<String, Value>;

/// The kind tag of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    Document,
    Page,
    Shape,
    Binding,
}

impl RecordKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::Document => "document",
            RecordKind::Page => "page",
            RecordKind::Shape => "shape",
            RecordKind::Binding => "binding",
        }
    }
}

/// One persisted entity in the session document.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Record {
    Document(DocumentRecord),
    Page(PageRecord),
    Shape(ShapeRecord),
    Binding(BindingRecord),
}

impl Record {
    /// The record's globally unique id.
    pub fn id(&self) -> &RecordId {
        match self {
            Record::Document(r) => &r.id,
            Record::Page(r) => &r.id,
            Record::Shape(r) => &r.id,
            Record::Binding(r) => &r.id,
        }
    }

    /// The record's kind tag.
    pub fn kind(&self) -> RecordKind {
        match self {
            Record::Document(_) => RecordKind::Document,
            Record::Page(_) => RecordKind::Page,
            Record::Shape(_) => RecordKind::Shape,
            Record::Binding(_) => RecordKind::Binding,
        }
    }

    /// View as a shape record, if it is one.
    pub fn as_shape(&self) -> Option<&ShapeRecord> {
        match self {
            Record::Shape(s) => Some(s),
            _ => None,
        }
    }
}

/// Document-level metadata. One per session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub id: RecordId,
    #[serde(default)]
    pub name: String,
}

/// A page: the container shapes parent into.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PageRecord {
    pub id: RecordId,
    #[serde(default)]
    pub name: String,
    /// Fractional ordering key among sibling pages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<String>,
}

/// A shape on the canvas. `props` depends on `type` and is opaque here.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ShapeRecord {
    pub id: RecordId,
    /// Shape type tag: "geo", "text", "link", "rich-text", "prediction", "arrow".
    #[serde(rename = "type")]
    pub shape_type: String,
    /// Owning page (or parent shape).
    #[serde(rename = "parentId", default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<RecordId>,
    /// Fractional ordering key among siblings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<String>,
    #[serde(default)]
    pub props: JsonMap,
}

impl ShapeRecord {
    /// Create a shape with a freshly minted id and empty props.
    pub fn new(shape_type: impl Into<String>) -> Self {
        Self {
            id: RecordId::shape(),
            shape_type: shape_type.into(),
            parent_id: None,
            index: None,
            props: JsonMap::new(),
        }
    }

    /// Read a string-valued prop.
    pub fn prop_str(&self, key: &str) -> Option<&str> {
        self.props.get(key).and_then(Value::as_str)
    }

    /// Builder-style prop insertion.
    pub fn with_prop(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.props.insert(key.into(), value.into());
        self
    }

    /// Builder-style parent assignment.
    pub fn with_parent(mut self, parent_id: RecordId) -> Self {
        self.parent_id = Some(parent_id);
        self
    }
}

/// A relation between two shapes (e.g. an arrow's endpoints).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BindingRecord {
    pub id: RecordId,
    #[serde(rename = "type")]
    pub binding_type: String,
    #[serde(rename = "fromId")]
    pub from_id: RecordId,
    #[serde(rename = "toId")]
    pub to_id: RecordId,
    #[serde(default)]
    pub props: JsonMap,
}
