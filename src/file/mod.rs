use memmap2::Mmap;
use plain::Plain;

pub mod container;
pub use container::*;
pub mod header;
pub use header::*;
pub mod structs;
pub use structs::*;
pub mod modifiers;
pub use modifiers::*;
pub mod instruction;
pub use instruction::*;
pub mod code_item_accessors;
pub use code_item_accessors::*;
pub mod class_accessor;
pub use class_accessor::*;
pub mod annotations;
pub use annotations::*;
pub mod debug;
pub mod verifier;
pub use verifier::*;

use crate::{dex_err, leb128::decode_uleb128, utf, Result};

pub const DEX_MAGIC: &[u8] = b"dex\n";
pub const DEX_MAGIC_VERSIONS: &[&[u8]] = &[
    b"035\0",
    b"037\0", // Android "O" and beyond
    b"038\0", // Android "P" and beyond
    b"039\0", // Android "Q" and beyond
    b"040\0", // Android "V" and beyond
    b"041\0",
];

/// Compact dex images carry this magic and are refused at load time.
pub const CDEX_MAGIC: &[u8] = b"cdex";

pub const DEX_ENDIAN_CONSTANT: u32 = 0x12345678;

macro_rules! check_lt_result {
    ($idx:expr, $count:expr, $item_ty:literal) => {
        if ($idx as usize) >= ($count as usize) {
            return dex_err!(DexIndexError {
                index: $idx as u32,
                item_ty: $item_ty,
                max: $count as usize,
            });
        }
    };
    ($idx:expr, $count:expr, $item_ty:tt) => {
        if ($idx as usize) >= ($count as usize) {
            return dex_err!(DexIndexError {
                index: $idx as u32,
                item_ty: stringify!($item_ty),
                max: $count as usize,
            });
        }
    };
}

/// Zero-copy view over one dex image: the header plus the fixed id tables,
/// all borrowed straight out of the container.
pub struct DexFile<'a, C: DexContainer<'a> = Mmap> {
    data: &'a C,
    header: &'a Header,

    string_ids: &'a [StringId],
    type_ids: &'a [TypeId],
    proto_ids: &'a [ProtoId],
    field_ids: &'a [FieldId],
    method_ids: &'a [MethodId],
    class_defs: &'a [ClassDef],

    location: String,
}

impl<'a, C: DexContainer<'a>> DexFile<'a, C> {
    /// Lifts a validated image into typed tables. Fails on short or
    /// misaligned containers, bad magic/version, and tables that overrun
    /// the image.
    pub fn from_raw_parts(base: &'a C, location: &str) -> Result<DexFile<'a, C>> {
        let data: &'a [u8] = base.data();
        if data.len() < std::mem::size_of::<Header>() || !plain::is_aligned::<Header>(data) {
            return dex_err!(TruncatedFile);
        }
        let header = match Header::from_bytes(data) {
            Ok(header) => header,
            Err(_) => return dex_err!(TruncatedFile),
        };

        let dex = Self {
            data: base,
            header,
            string_ids: Self::section(data, header.string_ids_off, header.string_ids_size)?,
            type_ids: Self::section(data, header.type_ids_off, header.type_ids_size)?,
            proto_ids: Self::section(data, header.proto_ids_off, header.proto_ids_size)?,
            field_ids: Self::section(data, header.field_ids_off, header.field_ids_size)?,
            method_ids: Self::section(data, header.method_ids_off, header.method_ids_size)?,
            class_defs: Self::section(data, header.class_defs_off, header.class_defs_size)?,
            location: location.to_string(),
        };
        dex.check_header()?;
        Ok(dex)
    }

    fn section<T: Plain>(data: &'a [u8], offset: u32, len: u32) -> Result<&'a [T]> {
        if len == 0 {
            return Ok(&[]);
        }
        let start = offset as usize;
        let byte_len = match (len as usize).checked_mul(std::mem::size_of::<T>()) {
            Some(n) => n,
            None => {
                return dex_err!(ParseError {
                    section: "id table",
                    offset: start,
                    reason: format!("section length {} overflows", len),
                })
            }
        };
        if start >= data.len() || start + byte_len > data.len() {
            return dex_err!(ParseError {
                section: "id table",
                offset: start,
                reason: format!(
                    "section of {} bytes does not fit file of {} bytes",
                    byte_len,
                    data.len()
                ),
            });
        }
        match T::slice_from_bytes_len(&data[start..], len as usize) {
            Ok(slice) => Ok(slice),
            Err(_) => dex_err!(ParseError {
                section: "id table",
                offset: start,
                reason: "misaligned or truncated section".to_string(),
            }),
        }
    }

    fn check_header(&self) -> Result<()> {
        let magic = self.header.get_magic();
        if &magic[..4] != DEX_MAGIC {
            return dex_err!(BadFileMagic { magic: *magic });
        }
        if !DEX_MAGIC_VERSIONS.contains(&&magic[4..]) {
            let mut version = [0u8; 4];
            version.copy_from_slice(&magic[4..]);
            return dex_err!(UnknownDexVersion { version });
        }
        if (self.header.header_size as usize) < std::mem::size_of::<Header>() {
            return dex_err!(ParseError {
                section: "header",
                offset: 0,
                reason: format!("header size {} too small", self.header.header_size),
            });
        }
        if self.file_size() < self.header.file_size as usize {
            return dex_err!(ParseError {
                section: "header",
                offset: 0,
                reason: format!(
                    "file size is {} but the header expects {}",
                    self.file_size(),
                    self.header.file_size
                ),
            });
        }
        Ok(())
    }

    pub fn get_location(&self) -> &str {
        &self.location
    }

    #[inline(always)]
    pub fn file_size(&self) -> usize {
        self.raw_data().len()
    }

    #[inline(always)]
    pub fn raw_data(&self) -> &'a [u8] {
        self.data.data()
    }

    pub fn header(&self) -> &'a Header {
        self.header
    }

    //------------------------------------------------------------------------------
    // Strings
    //------------------------------------------------------------------------------
    #[inline(always)]
    pub fn num_string_ids(&self) -> u32 {
        self.header.string_ids_size
    }

    #[inline(always)]
    pub fn get_string_id(&self, idx: u32) -> Result<&'a StringId> {
        check_lt_result!(idx, self.string_ids.len(), StringId);
        Ok(&self.string_ids[idx as usize])
    }

    /// Raw MUTF-8 string data: utf16 length plus the bytes including the
    /// terminating null.
    pub fn get_string_data(&self, string_id: &StringId) -> Result<(u32, &'a [u8])> {
        let data = self.raw_data();
        check_lt_result!(string_id.offset(), data.len(), "string data offset");
        let (utf16_len, size) = decode_uleb128(&data[string_id.offset()..])?;
        let start = string_id.offset() + size;
        check_lt_result!(start, data.len(), "string data");
        match data[start..].iter().position(|x| *x == 0) {
            Some(pos) => Ok((utf16_len, &data[start..start + pos + 1])),
            None => dex_err!(BadStringData, start),
        }
    }

    #[inline(always)]
    pub fn get_utf16_str(&self, string_id: &StringId) -> Result<String> {
        let (_, data) = self.get_string_data(string_id)?;
        utf::mutf8_to_str(data)
    }

    #[inline(always)]
    pub fn get_utf16_str_at(&self, idx: u32) -> Result<String> {
        self.get_utf16_str(self.get_string_id(idx)?)
    }

    #[inline(always)]
    pub fn get_utf16_str_lossy(&self, string_id: &StringId) -> Result<String> {
        let (_, data) = self.get_string_data(string_id)?;
        Ok(utf::mutf8_to_str_lossy(data))
    }

    #[inline(always)]
    pub fn get_utf16_str_lossy_at(&self, idx: u32) -> Result<String> {
        self.get_utf16_str_lossy(self.get_string_id(idx)?)
    }

    //------------------------------------------------------------------------------
    // Types
    //------------------------------------------------------------------------------
    #[inline(always)]
    pub fn num_type_ids(&self) -> u32 {
        self.header.type_ids_size
    }

    #[inline(always)]
    pub fn get_type_id(&self, idx: TypeIndex) -> Result<&'a TypeId> {
        check_lt_result!(idx, self.type_ids.len(), TypeId);
        Ok(&self.type_ids[idx as usize])
    }

    #[inline(always)]
    pub fn get_type_desc_at(&self, idx: TypeIndex) -> Result<String> {
        let type_id = self.get_type_id(idx)?;
        self.get_utf16_str_lossy_at(type_id.descriptor_idx)
    }

    //------------------------------------------------------------------------------
    // Protos
    //------------------------------------------------------------------------------
    #[inline(always)]
    pub fn num_proto_ids(&self) -> u32 {
        self.header.proto_ids_size
    }

    #[inline(always)]
    pub fn get_proto_id(&self, idx: ProtoIndex) -> Result<&'a ProtoId> {
        check_lt_result!(idx, self.proto_ids.len(), ProtoId);
        Ok(&self.proto_ids[idx as usize])
    }

    pub fn get_shorty(&self, proto_id: &ProtoId) -> Result<String> {
        self.get_utf16_str_lossy_at(proto_id.shorty_idx)
    }

    /// Parameter type list of a proto, `None` when the method takes no
    /// parameters.
    pub fn get_parameter_types(&self, proto_id: &ProtoId) -> Result<Option<TypeList<'a>>> {
        self.get_type_list(proto_id.parameters_off)
    }

    //------------------------------------------------------------------------------
    // Fields
    //------------------------------------------------------------------------------
    #[inline(always)]
    pub fn num_field_ids(&self) -> u32 {
        self.header.field_ids_size
    }

    #[inline(always)]
    pub fn get_field_id(&self, idx: u32) -> Result<&'a FieldId> {
        check_lt_result!(idx, self.field_ids.len(), FieldId);
        Ok(&self.field_ids[idx as usize])
    }

    #[inline(always)]
    pub fn get_field_ids(&self) -> &'a [FieldId] {
        self.field_ids
    }

    pub fn get_field_name(&self, field_id: &FieldId) -> Result<String> {
        self.get_utf16_str_lossy_at(field_id.name_idx)
    }

    //------------------------------------------------------------------------------
    // Methods
    //------------------------------------------------------------------------------
    #[inline(always)]
    pub fn num_method_ids(&self) -> u32 {
        self.header.method_ids_size
    }

    #[inline(always)]
    pub fn get_method_id(&self, idx: u32) -> Result<&'a MethodId> {
        check_lt_result!(idx, self.method_ids.len(), MethodId);
        Ok(&self.method_ids[idx as usize])
    }

    #[inline(always)]
    pub fn get_method_ids(&self) -> &'a [MethodId] {
        self.method_ids
    }

    pub fn get_method_name(&self, method_id: &MethodId) -> Result<String> {
        self.get_utf16_str_lossy_at(method_id.name_idx)
    }

    //------------------------------------------------------------------------------
    // ClassDefs
    //------------------------------------------------------------------------------
    #[inline(always)]
    pub fn num_class_defs(&self) -> u32 {
        self.header.class_defs_size
    }

    #[inline(always)]
    pub fn get_class_def(&self, idx: u32) -> Result<&'a ClassDef> {
        check_lt_result!(idx, self.class_defs.len(), ClassDef);
        Ok(&self.class_defs[idx as usize])
    }

    #[inline(always)]
    pub fn get_class_defs(&self) -> &'a [ClassDef] {
        self.class_defs
    }

    pub fn get_class_desc(&self, class_def: &ClassDef) -> Result<String> {
        self.get_type_desc_at(class_def.class_idx)
    }

    pub fn get_interfaces_list(&self, class_def: &ClassDef) -> Result<Option<TypeList<'a>>> {
        self.get_type_list(class_def.interfaces_off)
    }

    //------------------------------------------------------------------------------
    // Type lists
    //------------------------------------------------------------------------------
    pub fn get_type_list(&self, offset: u32) -> Result<Option<TypeList<'a>>> {
        if offset == 0 {
            return Ok(None);
        }
        let data = self.raw_data();
        check_lt_result!(offset, data.len(), TypeList);
        let length: &u32 = self.non_null_data_ptr(offset)?;
        let data_off = offset + std::mem::size_of::<u32>() as u32;
        Ok(Some(self.non_null_array_data_ptr(data_off, *length as usize)?))
    }

    //------------------------------------------------------------------------------
    // Code items
    //------------------------------------------------------------------------------
    pub fn get_code_item_accessor(&self, code_off: u32) -> Result<CodeItemAccessor<'a>> {
        check_lt_result!(code_off, self.file_size(), "code item offset");
        let code_item: &'a CodeItem = self.non_null_data_ptr(code_off)?;
        CodeItemAccessor::from_code_item(
            self,
            code_item,
            code_off + std::mem::size_of::<CodeItem>() as u32,
        )
    }

    #[inline(always)]
    pub fn get_insns_raw(&self, insns_off: u32, size_in_code_units: u32) -> Result<&'a [u16]> {
        check_lt_result!(insns_off, self.file_size(), "code stream offset");
        self.non_null_array_data_ptr(insns_off, size_in_code_units as usize)
    }

    /// Try items trail the instruction stream, padded to 4 bytes.
    pub fn get_try_items(&self, ca: &CodeItemAccessor<'_>) -> Result<&'a [TryItem]> {
        if ca.tries_size() == 0 {
            return Ok(&[]);
        }
        let offset =
            ca.code_off() as usize + ca.insns_size_in_code_units() as usize * 2;
        let offset = (offset + 3) & !3;
        check_lt_result!(offset, self.file_size(), TryItem);
        self.non_null_array_data_ptr(offset as u32, ca.tries_size() as usize)
    }

    //------------------------------------------------------------------------------
    // Raw data helpers
    //------------------------------------------------------------------------------
    #[inline]
    pub(crate) fn data_ptr<T: Plain>(&self, offset: u32) -> Result<Option<&'a T>> {
        match offset {
            0 => Ok(None),
            _ => Ok(Some(self.non_null_data_ptr(offset)?)),
        }
    }

    #[inline]
    pub(crate) fn non_null_data_ptr<T: Plain>(&self, offset: u32) -> Result<&'a T> {
        let data = self.raw_data();
        check_lt_result!(offset, data.len(), "data offset");
        match T::from_bytes(&data[offset as usize..]) {
            Ok(v) => Ok(v),
            Err(_) => dex_err!(ParseError {
                section: std::any::type_name::<T>(),
                offset: offset as usize,
                reason: "misaligned or truncated item".to_string(),
            }),
        }
    }

    #[inline]
    pub(crate) fn non_null_array_data_ptr<T: Plain>(
        &self,
        offset: u32,
        len: usize,
    ) -> Result<&'a [T]> {
        if len == 0 {
            return Ok(&[]);
        }
        let data = self.raw_data();
        check_lt_result!(offset, data.len(), "data offset");
        match T::slice_from_bytes_len(&data[offset as usize..], len) {
            Ok(v) => Ok(v),
            Err(_) => dex_err!(ParseError {
                section: std::any::type_name::<T>(),
                offset: offset as usize,
                reason: format!("array of {} items overruns the image", len),
            }),
        }
    }
}
