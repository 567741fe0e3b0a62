use crate::{leb128::decode_uleb128_off, Result};

use super::{DexContainer, DexFile};

/// A field row out of class_data, with the index delta already resolved.
#[derive(Debug, Copy, Clone)]
pub struct EncodedFieldItem {
    pub field_idx: u32,
    pub access_flags: u32,
    pub is_static: bool,
}

/// A method row out of class_data, with the index delta already resolved.
#[derive(Debug, Copy, Clone)]
pub struct EncodedMethodItem {
    pub method_idx: u32,
    pub access_flags: u32,
    pub code_off: u32,
    pub is_direct: bool,
}

/// Fully decoded class_data_item: every declared field and method of one
/// class.
#[derive(Debug, Default)]
pub struct ClassMembers {
    pub fields: Vec<EncodedFieldItem>,
    pub methods: Vec<EncodedMethodItem>,
}

impl<'a, C: DexContainer<'a>> DexFile<'a, C> {
    /// Reads the class_data_item of a class def. `None` for marker
    /// interfaces and other classes without declared members.
    pub fn get_class_members(&self, class_data_off: u32) -> Result<Option<ClassMembers>> {
        if class_data_off == 0 {
            return Ok(None);
        }
        let data = self.raw_data();
        if class_data_off as usize >= data.len() {
            return crate::dex_err!(DexIndexError {
                index: class_data_off,
                item_ty: "class_data_off",
                max: data.len(),
            });
        }
        let mut pos = class_data_off as usize;

        let num_static_fields = decode_uleb128_off(data, &mut pos)?;
        let num_instance_fields = decode_uleb128_off(data, &mut pos)?;
        let num_direct_methods = decode_uleb128_off(data, &mut pos)?;
        let num_virtual_methods = decode_uleb128_off(data, &mut pos)?;

        let mut members = ClassMembers {
            fields: Vec::with_capacity((num_static_fields + num_instance_fields) as usize),
            methods: Vec::with_capacity((num_direct_methods + num_virtual_methods) as usize),
        };

        read_fields(data, &mut pos, num_static_fields, true, &mut members.fields)?;
        read_fields(data, &mut pos, num_instance_fields, false, &mut members.fields)?;
        read_methods(data, &mut pos, num_direct_methods, true, &mut members.methods)?;
        read_methods(data, &mut pos, num_virtual_methods, false, &mut members.methods)?;
        Ok(Some(members))
    }
}

fn read_fields(
    data: &[u8],
    pos: &mut usize,
    count: u32,
    is_static: bool,
    out: &mut Vec<EncodedFieldItem>,
) -> Result<()> {
    let mut field_idx = 0u32;
    for _ in 0..count {
        field_idx = field_idx.wrapping_add(decode_uleb128_off(data, pos)?);
        let access_flags = decode_uleb128_off(data, pos)?;
        out.push(EncodedFieldItem {
            field_idx,
            access_flags,
            is_static,
        });
    }
    Ok(())
}

fn read_methods(
    data: &[u8],
    pos: &mut usize,
    count: u32,
    is_direct: bool,
    out: &mut Vec<EncodedMethodItem>,
) -> Result<()> {
    let mut method_idx = 0u32;
    for _ in 0..count {
        method_idx = method_idx.wrapping_add(decode_uleb128_off(data, pos)?);
        let access_flags = decode_uleb128_off(data, pos)?;
        let code_off = decode_uleb128_off(data, pos)?;
        out.push(EncodedMethodItem {
            method_idx,
            access_flags,
            code_off,
            is_direct,
        });
    }
    Ok(())
}
