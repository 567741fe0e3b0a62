//! Per-method reference extraction. One pass over a code item yields the
//! string, field, and method references plus the opcode stream; everything
//! downstream (indexes, queries) is built out of these.

use crate::file::{CodeItemAccessor, FieldAccess, IndexType, InvokeKind};
use crate::{dex_err, Result};

/// References collected from one method body, in source order. String ids
/// are de-duplicated; field and invoke entries keep one entry per site.
#[derive(Debug, Default, Clone)]
pub struct CodeRefs {
    pub strings: Vec<u32>,
    pub invokes: Vec<(InvokeKind, u32)>,
    pub field_reads: Vec<u32>,
    pub field_writes: Vec<u32>,
}

/// Walks the instruction stream and collects every reference the derived
/// indexes care about.
pub fn collect_refs(ca: &CodeItemAccessor<'_>) -> Result<CodeRefs> {
    let mut refs = CodeRefs::default();
    for item in ca.iter() {
        let (_pc, inst) = item?;
        match inst.index_type() {
            IndexType::StringRef => {
                let string_idx = inst.index()?;
                if !refs.strings.contains(&string_idx) {
                    refs.strings.push(string_idx);
                }
            }
            IndexType::FieldRef => {
                let field_idx = inst.index()?;
                match inst.field_access() {
                    Some(FieldAccess::Read) => refs.field_reads.push(field_idx),
                    Some(FieldAccess::Write) => refs.field_writes.push(field_idx),
                    None => {}
                }
            }
            IndexType::MethodRef | IndexType::MethodAndProtoRef => {
                let method_idx = inst.index()?;
                if let Some(kind) = inst.invoke_kind() {
                    refs.invokes.push((kind, method_idx));
                }
            }
            IndexType::Unknown => {
                return dex_err!(ParseError {
                    section: "code stream",
                    offset: _pc as usize,
                    reason: format!("unknown opcode {:#04x}", inst.opcode_value()),
                });
            }
            _ => {}
        }
    }
    Ok(refs)
}

/// The opcode byte of every instruction, payload pseudo-instructions
/// included, in stream order.
pub fn op_codes(ca: &CodeItemAccessor<'_>) -> Result<Vec<u8>> {
    let mut codes = Vec::new();
    for item in ca.iter() {
        let (_pc, inst) = item?;
        codes.push(inst.opcode_value());
    }
    Ok(codes)
}

/// `(opcode, pc)` pairs in stream order.
pub fn op_code_offsets(ca: &CodeItemAccessor<'_>) -> Result<Vec<(u8, u32)>> {
    let mut codes = Vec::new();
    for item in ca.iter() {
        let (pc, inst) = item?;
        codes.push((inst.opcode_value(), pc));
    }
    Ok(codes)
}
