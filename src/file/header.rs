/// On-disk dex header, all fields little-endian.
#[repr(C)]
#[derive(Debug, Clone)]
pub struct Header {
    magic: [u8; 8],

    /// Adler32 over everything past `magic` and this field.
    pub checksum: u32,

    /// SHA-1 over everything past `magic`, `checksum`, and this field.
    pub signature: [u8; 20],

    /// Size of the entire file including this header. Loading requires it
    /// to equal the mapping length.
    pub file_size: u32,

    /// Always 0x70 for supported versions.
    pub header_size: u32,

    pub endian_tag: u32,

    pub link_size: u32,
    pub link_off: u32,
    pub map_off: u32,

    pub string_ids_size: u32,
    pub string_ids_off: u32,
    pub type_ids_size: u32,
    pub type_ids_off: u32,
    pub proto_ids_size: u32,
    pub proto_ids_off: u32,
    pub field_ids_size: u32,
    pub field_ids_off: u32,
    pub method_ids_size: u32,
    pub method_ids_off: u32,
    pub class_defs_size: u32,
    pub class_defs_off: u32,
    pub data_size: u32,
    pub data_off: u32,
}

unsafe impl plain::Plain for Header {}

impl Header {
    pub fn get_magic(&self) -> &[u8; 8] {
        &self.magic
    }

    /// Numeric dex version out of the magic, 0 when unparsable.
    pub fn get_version(&self) -> u32 {
        let version_raw = &self.magic[4..7];
        String::from_utf8_lossy(version_raw)
            .parse()
            .unwrap_or_default()
    }
}
