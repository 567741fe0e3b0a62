use std::ops::Deref;

use memmap2::Mmap;

/// Read-only byte region backing a dex image. Owned mappings are
/// page-aligned, so POD section casts never trip alignment checks.
pub trait DexContainer<'a>: AsRef<[u8]> + Deref<Target = [u8]> + 'a {
    fn data(&'a self) -> &'a [u8] {
        self.as_ref()
    }

    fn file_size(&'a self) -> usize {
        self.data().len()
    }
}

impl DexContainer<'_> for Mmap {}
impl<'a> DexContainer<'a> for &'a [u8] {}
impl DexContainer<'_> for Vec<u8> {}
