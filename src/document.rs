use serde_json::{Map, Value};

/// Field name carrying a document's unique identifier.
pub const ID_FIELD: &str = "_id";
/// Field name marking a record as a tombstone.
pub const DELETED_FIELD: &str = "$$deleted";
/// Field name carrying an index-declaration's payload.
pub const INDEX_CREATED_FIELD: &str = "$$indexCreated";
/// Field name carrying the name of a removed index.
pub const INDEX_REMOVED_FIELD: &str = "$$indexRemoved";

/// An opaque, ordered mapping from field names to values, carrying a unique
/// identifier under `_id`.
///
/// A `Document` also doubles as the on-disk shape of the two sentinel record
/// kinds (tombstones and index declarations) -- they are ordinary documents
/// with a distinguished field, not a separate type.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct Document(Map<String, Value>);

impl Document {
    /// Wraps a raw JSON object as a document. Does not validate `_id`.
    pub fn new(fields: Map<String, Value>) -> Self {
        Document(fields)
    }

    /// The document's `_id`, if present and a non-empty string.
    pub fn id(&self) -> Option<&str> {
        match self.0.get(ID_FIELD) {
            Some(Value::String(s)) if !s.is_empty() => Some(s.as_str()),
            _ => None,
        }
    }

    /// True if this record is a tombstone (`$$deleted: true`).
    pub fn is_tombstone(&self) -> bool {
        matches!(self.0.get(DELETED_FIELD), Some(Value::Bool(true)))
    }

    /// The `{fieldName, unique, sparse}` payload if this is an index-creation record.
    pub fn index_created(&self) -> Option<IndexDeclaration> {
        let obj = self.0.get(INDEX_CREATED_FIELD)?.as_object()?;
        let field_name = obj.get("fieldName")?.as_str()?.to_owned();
        let unique = obj.get("unique").and_then(Value::as_bool).unwrap_or(false);
        let sparse = obj.get("sparse").and_then(Value::as_bool).unwrap_or(false);
        Some(IndexDeclaration {
            field_name,
            unique,
            sparse,
        })
    }

    /// The field name if this is an index-removal record.
    pub fn index_removed(&self) -> Option<&str> {
        match self.0.get(INDEX_REMOVED_FIELD) {
            Some(Value::String(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Builds a tombstone record for `id`.
    pub fn tombstone(id: impl Into<String>) -> Self {
        let mut fields = Map::new();
        fields.insert(ID_FIELD.to_owned(), Value::String(id.into()));
        fields.insert(DELETED_FIELD.to_owned(), Value::Bool(true));
        Document(fields)
    }

    /// Builds an index-creation record.
    pub fn index_created_record(decl: &IndexDeclaration) -> Self {
        let mut payload = Map::new();
        payload.insert(
            "fieldName".to_owned(),
            Value::String(decl.field_name.clone()),
        );
        payload.insert("unique".to_owned(), Value::Bool(decl.unique));
        payload.insert("sparse".to_owned(), Value::Bool(decl.sparse));
        let mut fields = Map::new();
        fields.insert(INDEX_CREATED_FIELD.to_owned(), Value::Object(payload));
        Document(fields)
    }

    /// Builds an index-removal record.
    pub fn index_removed_record(field_name: impl Into<String>) -> Self {
        let mut fields = Map::new();
        fields.insert(INDEX_REMOVED_FIELD.to_owned(), Value::String(field_name.into()));
        Document(fields)
    }

    /// Raw field access, for collaborators (e.g. index structures) that need more than `_id`.
    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }
}

/// The `{fieldName, unique, sparse}` payload of an index declaration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IndexDeclaration {
    /// The indexed field's name.
    pub field_name: String,
    /// Whether the index enforces uniqueness.
    pub unique: bool,
    /// Whether documents missing the field are excluded from the index.
    pub sparse: bool,
}
