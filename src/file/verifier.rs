use crate::{dex_err, Result};

use super::{DexContainer, DexFile, CDEX_MAGIC, DEX_MAGIC};

impl<'a, C: DexContainer<'a>> DexFile<'a, C> {
    pub fn is_magic_valid(&self) -> bool {
        &self.header().get_magic()[..4] == DEX_MAGIC
    }

    pub fn is_compact_dex(&self) -> bool {
        &self.header().get_magic()[..4] == CDEX_MAGIC
    }

    /// Adler32 over everything past magic and checksum, per the header
    /// definition.
    pub fn calculate_checksum(&self) -> Result<u32> {
        let data = self.raw_data();
        Ok(adler32::adler32(&data[12..])?)
    }

    pub fn verify_checksum(&self) -> Result<()> {
        let actual = self.calculate_checksum()?;
        let expected = self.header().checksum;
        if actual != expected {
            return dex_err!(BadChecksum { actual, expected });
        }
        Ok(())
    }
}
