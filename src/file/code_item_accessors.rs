use crate::Result;

use super::{CodeItem, DexContainer, DexFile, Instruction};

/// Borrowed view over a method's code item plus its instruction stream.
pub struct CodeItemAccessor<'a> {
    insns_off: u32,
    code_item: &'a CodeItem,
    insns: &'a [u16],
}

impl<'a> CodeItemAccessor<'a> {
    pub fn from_code_item<C>(
        dex: &DexFile<'a, C>,
        code_item: &'a CodeItem,
        insns_off: u32,
    ) -> Result<CodeItemAccessor<'a>>
    where
        C: DexContainer<'a>,
    {
        let insns = match code_item.insns_size {
            0 => &[],
            size => dex.get_insns_raw(insns_off, size)?,
        };
        Ok(CodeItemAccessor {
            insns_off,
            code_item,
            insns,
        })
    }

    /// Offset of the instruction stream, right after the code item header.
    pub fn code_off(&self) -> u32 {
        self.insns_off
    }

    pub fn code_item(&self) -> &'a CodeItem {
        self.code_item
    }

    #[inline]
    pub fn insns_size_in_code_units(&self) -> u32 {
        self.insns.len() as u32
    }

    #[inline(always)]
    pub fn insns(&self) -> &'a [u16] {
        self.insns
    }

    #[inline]
    pub fn has_code(&self) -> bool {
        !self.insns.is_empty()
    }

    pub fn registers_size(&self) -> u16 {
        self.code_item.registers_size
    }

    pub fn ins_size(&self) -> u16 {
        self.code_item.ins_size
    }

    pub fn outs_size(&self) -> u16 {
        self.code_item.outs_size
    }

    pub fn tries_size(&self) -> u16 {
        self.code_item.tries_size
    }

    pub fn debug_info_off(&self) -> u32 {
        self.code_item.debug_info_off
    }

    /// Walks the stream front to back, yielding `(pc, instruction)`. The
    /// walk stops with an error on a width that runs past the stream.
    pub fn iter(&self) -> DexInstructionIterator<'a> {
        DexInstructionIterator::new(self.insns)
    }
}

pub struct DexInstructionIterator<'a> {
    instructions: &'a [u16],
    pc: usize,
}

impl<'a> DexInstructionIterator<'a> {
    pub fn new(instructions: &'a [u16]) -> Self {
        Self {
            instructions,
            pc: 0,
        }
    }

    pub fn dex_pc(&self) -> usize {
        self.pc
    }
}

impl<'a> Iterator for DexInstructionIterator<'a> {
    type Item = Result<(u32, Instruction<'a>)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pc >= self.instructions.len() {
            return None;
        }
        let pc = self.pc;
        let inst = Instruction::at(&self.instructions[pc..]);
        let size = match inst.size_in_code_units() {
            Ok(size) => size,
            Err(err) => {
                self.pc = self.instructions.len();
                return Some(Err(err));
            }
        };
        self.pc += size;
        if self.pc > self.instructions.len() {
            self.pc = self.instructions.len();
        }
        Some(Ok((pc as u32, inst)))
    }
}
