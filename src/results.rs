//! Result records and envelopes. Records carry the encoded id plus the
//! descriptor metadata a caller needs without further lookups; envelopes
//! are byte buffers with stable field order, so identical queries encode
//! byte-identically.

use serde::{Deserialize, Serialize};

use crate::file::FieldAccess;
use crate::EncodedId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassMeta {
    pub id: EncodedId,
    pub descriptor: String,
    pub access_flags: u32,
    pub superclass: Option<String>,
    pub interfaces: Vec<String>,
    pub source_file: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodMeta {
    pub id: EncodedId,
    pub class_descriptor: String,
    pub name: String,
    pub shorty: String,
    pub return_type: String,
    pub param_types: Vec<String>,
    pub access_flags: u32,
}

impl MethodMeta {
    /// `Lcom/a/B;->name(I[J)V`
    pub fn descriptor(&self) -> String {
        format!(
            "{}->{}({}){}",
            self.class_descriptor,
            self.name,
            self.param_types.join(""),
            self.return_type
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMeta {
    pub id: EncodedId,
    pub class_descriptor: String,
    pub name: String,
    pub type_descriptor: String,
    pub access_flags: u32,
}

impl FieldMeta {
    /// `Lcom/a/B;->name:I`
    pub fn descriptor(&self) -> String {
        format!("{}->{}:{}", self.class_descriptor, self.name, self.type_descriptor)
    }
}

/// One field usage site inside a method body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsingFieldMeta {
    pub field: FieldMeta,
    pub access: FieldAccess,
}

/// A decoded annotation with indices resolved into descriptors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotationMeta {
    pub type_descriptor: String,
    pub visibility: u8,
    pub elements: Vec<AnnotationElementMeta>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotationElementMeta {
    pub name: String,
    pub value: AnnotationValue,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AnnotationValue {
    Byte(i8),
    Short(i16),
    Char(u16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(String),
    Type(String),
    Field(String),
    Method(String),
    Enum(String),
    Boolean(bool),
    MethodType(u32),
    MethodHandle(u32),
    Array(Vec<AnnotationValue>),
    Annotation(Box<AnnotationMeta>),
    Null,
}

/// What an envelope carries per record.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Projection {
    /// Encoded ids only.
    Ids,
    /// Full records with inline metadata.
    Full,
}

/// Sorts ascending by (dex ordinal, local index) and drops duplicate ids.
/// Every result list goes through this before it leaves the session.
pub(crate) fn finish<T, F: Fn(&T) -> EncodedId>(mut items: Vec<T>, id_of: F) -> Vec<T> {
    items.sort_by_key(|item| id_of(item).raw());
    items.dedup_by_key(|item| id_of(item).raw());
    items
}

fn encode<T: Serialize>(items: &[T], ids: Vec<EncodedId>, projection: Projection) -> Vec<u8> {
    match projection {
        // struct field order is fixed, so the envelope is byte-stable
        Projection::Full => serde_json::to_vec(items).unwrap_or_default(),
        Projection::Ids => serde_json::to_vec(&ids).unwrap_or_default(),
    }
}

pub fn encode_classes(items: &[ClassMeta], projection: Projection) -> Vec<u8> {
    encode(items, items.iter().map(|c| c.id).collect(), projection)
}

pub fn encode_methods(items: &[MethodMeta], projection: Projection) -> Vec<u8> {
    encode(items, items.iter().map(|m| m.id).collect(), projection)
}

pub fn encode_fields(items: &[FieldMeta], projection: Projection) -> Vec<u8> {
    encode(items, items.iter().map(|f| f.id).collect(), projection)
}
