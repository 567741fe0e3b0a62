use crate::{
    dex_err,
    leb128::{decode_uleb128_off, decode_uleb128p1_off},
    Result,
};

use super::{DexContainer, DexFile};

impl<'a, C: DexContainer<'a>> DexFile<'a, C> {
    /// Parameter names out of a debug_info_item header. Entries without a
    /// recorded name come back as `None`; an offset of 0 means the method
    /// has no debug info at all and yields an empty list.
    pub fn get_parameter_names(&self, debug_info_off: u32) -> Result<Vec<Option<String>>> {
        if debug_info_off == 0 {
            return Ok(Vec::new());
        }
        let data = self.raw_data();
        if debug_info_off as usize >= data.len() {
            return dex_err!(DexIndexError {
                index: debug_info_off,
                item_ty: "debug_info_off",
                max: data.len(),
            });
        }
        let mut pos = debug_info_off as usize;
        let _line_start = decode_uleb128_off(data, &mut pos)?;
        let parameters_size = decode_uleb128_off(data, &mut pos)?;

        let mut names = Vec::with_capacity(parameters_size as usize);
        for _ in 0..parameters_size {
            let name_idx = decode_uleb128p1_off(data, &mut pos)?;
            if name_idx < 0 {
                names.push(None);
            } else {
                names.push(Some(self.get_utf16_str_lossy_at(name_idx as u32)?));
            }
        }
        Ok(names)
    }
}
