//! POD views over the dex id tables. Every struct mirrors the on-disk
//! little-endian layout and is cast out of the image via `plain`.

// --------------------------------------------------------------------
// StringId
// --------------------------------------------------------------------
pub type StringIndex = u32;

#[repr(C)]
#[derive(Debug, Clone)]
pub struct StringId {
    pub string_data_off: u32,
}

unsafe impl plain::Plain for StringId {}

impl StringId {
    #[inline]
    pub const fn offset(&self) -> usize {
        self.string_data_off as usize
    }
}

// --------------------------------------------------------------------
// TypeId
// --------------------------------------------------------------------
pub type TypeIndex = u16;

#[repr(C)]
#[derive(Debug, Clone)]
pub struct TypeId {
    pub descriptor_idx: StringIndex,
}

unsafe impl plain::Plain for TypeId {}

// --------------------------------------------------------------------
// ProtoId
// --------------------------------------------------------------------
pub type ProtoIndex = u16;

#[repr(C)]
#[derive(Debug, Clone)]
pub struct ProtoId {
    pub shorty_idx: StringIndex,
    pub return_type_idx: TypeIndex,
    pad_: u16,
    pub parameters_off: u32,
}

unsafe impl plain::Plain for ProtoId {}

// --------------------------------------------------------------------
// FieldId
// --------------------------------------------------------------------
pub type FieldIndex = u32;

#[repr(C)]
#[derive(Debug, Clone)]
pub struct FieldId {
    pub class_idx: TypeIndex,
    pub type_idx: TypeIndex,
    pub name_idx: StringIndex,
}

unsafe impl plain::Plain for FieldId {}

// --------------------------------------------------------------------
// MethodId
// --------------------------------------------------------------------
pub type MethodIndex = u32;

#[repr(C)]
#[derive(Debug, Clone)]
pub struct MethodId {
    pub class_idx: TypeIndex,
    pub proto_idx: ProtoIndex,
    pub name_idx: StringIndex,
}

unsafe impl plain::Plain for MethodId {}

// --------------------------------------------------------------------
// ClassDef
// --------------------------------------------------------------------
pub type ClassDefIndex = u32;

#[repr(C)]
#[derive(Debug, Clone)]
pub struct ClassDef {
    pub class_idx: TypeIndex,
    pad1_: u16,
    pub access_flags: u32,
    /// `NO_INDEX16` when the class has no superclass.
    pub superclass_idx: TypeIndex,
    pad2_: u16,
    pub interfaces_off: u32,
    /// `NO_INDEX` when the source file is unknown.
    pub source_file_idx: StringIndex,
    pub annotations_off: u32,
    pub class_data_off: u32,
    pub static_values_off: u32,
}

unsafe impl plain::Plain for ClassDef {}

// --------------------------------------------------------------------
// TypeItem / TypeList
// --------------------------------------------------------------------
#[repr(C)]
#[derive(Debug, Clone)]
pub struct TypeItem {
    pub type_idx: TypeIndex,
}

unsafe impl plain::Plain for TypeItem {}

pub type TypeList<'a> = &'a [TypeItem];

// --------------------------------------------------------------------
// CodeItem
// --------------------------------------------------------------------
#[repr(C)]
#[derive(Debug, Clone)]
pub struct CodeItem {
    pub registers_size: u16,
    pub ins_size: u16,
    pub outs_size: u16,
    pub tries_size: u16,
    pub debug_info_off: u32,
    pub insns_size: u32,
}

unsafe impl plain::Plain for CodeItem {}

// --------------------------------------------------------------------
// TryItem
// --------------------------------------------------------------------
#[repr(C)]
#[derive(Debug, Clone)]
pub struct TryItem {
    pub start_addr: u32,
    pub insn_count: u16,
    pub handler_off: u16,
}

unsafe impl plain::Plain for TryItem {}

// --------------------------------------------------------------------
// Annotation directory items
// --------------------------------------------------------------------
#[repr(C)]
#[derive(Debug, Clone)]
pub struct AnnotationsDirectoryItem {
    pub class_annotations_off: u32,
    pub fields_size: u32,
    pub methods_size: u32,
    pub parameters_size: u32,
}

unsafe impl plain::Plain for AnnotationsDirectoryItem {}

#[repr(C)]
#[derive(Debug, Clone)]
pub struct FieldAnnotationsItem {
    pub field_idx: u32,
    pub annotations_off: u32,
}

unsafe impl plain::Plain for FieldAnnotationsItem {}

#[repr(C)]
#[derive(Debug, Clone)]
pub struct MethodAnnotationsItem {
    pub method_idx: u32,
    pub annotations_off: u32,
}

unsafe impl plain::Plain for MethodAnnotationsItem {}

#[repr(C)]
#[derive(Debug, Clone)]
pub struct ParameterAnnotationsItem {
    pub method_idx: u32,
    pub annotations_off: u32,
}

unsafe impl plain::Plain for ParameterAnnotationsItem {}

/// Offsets of the annotation items in a set.
pub type AnnotationSetItem<'a> = &'a [u32];

// --------------------------------------------------------------------
// Decoded annotation values (owned, parsed out of encoded_value items)
// --------------------------------------------------------------------
pub type EncodedArray = Vec<EncodedValue>;

#[derive(Debug, Clone, PartialEq)]
pub enum EncodedValue {
    Byte(i8),
    Short(i16),
    Char(u16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    MethodType(u32),
    MethodHandle(u32),
    String(u32),
    Type(u32),
    Field(u32),
    Method(u32),
    Enum(u32),
    Boolean(bool),
    Array(EncodedArray),
    Annotation(EncodedAnnotation),
    Null,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnnotationElement {
    pub name_idx: u32,
    pub value: EncodedValue,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EncodedAnnotation {
    pub type_idx: u32,
    pub elements: Vec<AnnotationElement>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnnotationItem {
    pub visibility: u8,
    pub annotation: EncodedAnnotation,
}

/// Annotation visibility values from the dex format.
pub mod visibility {
    pub const BUILD: u8 = 0x00;
    pub const RUNTIME: u8 = 0x01;
    pub const SYSTEM: u8 = 0x02;
}
