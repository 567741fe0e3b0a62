//! Image acquisition. Every input shape (zip archive, raw buffer, plain
//! dex file) ends up as a page-aligned read-only mapping owned by the
//! session; images that fail validation are skipped with a warning so one
//! bad dex does not sink the rest of an apk.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use log::{debug, warn};
use memmap2::{Mmap, MmapMut};
use zip::ZipArchive;

use crate::error::DexKitError;
use crate::file::{DexFile, CDEX_MAGIC, DEX_MAGIC};
use crate::{dex_err, Result};

/// One owned dex image: a read-only byte region plus where it came from.
#[derive(Debug)]
pub struct DexImage {
    data: Mmap,
    location: String,
}

impl DexImage {
    /// Copies `bytes` into a fresh anonymous mapping after validating the
    /// header.
    pub fn from_bytes(bytes: &[u8], location: &str) -> Result<DexImage> {
        validate_image(bytes, location)?;
        let mut map = MmapMut::map_anon(bytes.len())?;
        map.copy_from_slice(bytes);
        Ok(DexImage {
            data: map.make_read_only()?,
            location: location.to_string(),
        })
    }

    /// Maps a standalone `.dex` file read-only.
    pub fn map_path(path: &Path) -> Result<DexImage> {
        let location = path.display().to_string();
        let file = File::open(path).map_err(|source| DexKitError::FileNotFound {
            path: location.clone(),
            source,
        })?;
        let map = unsafe { Mmap::map(&file)? };
        validate_image(&map, &location)?;
        Ok(DexImage {
            data: map,
            location,
        })
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Lifts the image into typed tables. O(1) apart from validation; views
    /// are re-opened per operation so the session never borrows itself.
    pub fn open(&self) -> Result<DexFile<'_, Mmap>> {
        DexFile::from_raw_parts(&self.data, &self.location)
    }
}

/// Header-level validation per the load contract: standard dex magic,
/// compact dex refused, `file_size` must equal the mapping length.
fn validate_image(data: &[u8], location: &str) -> Result<()> {
    if data.len() < 0x70 {
        return dex_err!(
            InvalidImage,
            "{}: image of {} bytes is too small for a dex header",
            location,
            data.len()
        );
    }
    if &data[..4] == CDEX_MAGIC {
        return dex_err!(InvalidImage, "{}: compact dex is not supported", location);
    }
    if &data[..4] != DEX_MAGIC {
        return dex_err!(InvalidImage, "{}: bad dex magic", location);
    }
    let file_size = u32::from_le_bytes([data[32], data[33], data[34], data[35]]);
    if file_size as usize != data.len() {
        return dex_err!(
            InvalidImage,
            "{}: header file_size {} does not match image length {}",
            location,
            file_size,
            data.len()
        );
    }
    Ok(())
}

/// Extracts every `classes*.dex` entry of a zip archive, in multidex
/// order.
pub fn load_zip_path(path: &Path) -> Result<Vec<DexImage>> {
    let location = path.display().to_string();
    let file = File::open(path).map_err(|source| DexKitError::FileNotFound {
        path: location.clone(),
        source,
    })?;
    let mut archive = ZipArchive::new(file)?;

    let mut entries: Vec<(u32, String)> = archive
        .file_names()
        .filter_map(|name| classes_dex_ordinal(name).map(|ord| (ord, name.to_string())))
        .collect();
    entries.sort();
    if entries.is_empty() {
        return dex_err!(EmptyArchive { path: location });
    }

    let mut images = Vec::with_capacity(entries.len());
    for (_, name) in &entries {
        let mut entry = archive.by_name(name)?;
        let mut buf = Vec::with_capacity(entry.size() as usize);
        entry.read_to_end(&mut buf)?;
        let entry_location = format!("{}!{}", location, name);
        match DexImage::from_bytes(&buf, &entry_location) {
            Ok(image) => {
                debug!("loaded {} ({} bytes)", entry_location, buf.len());
                images.push(image);
            }
            Err(err) => warn!("skipping {}: {}", entry_location, err),
        }
    }
    if images.is_empty() {
        return dex_err!(InvalidImage, "{}: no usable dex entries", location);
    }
    Ok(images)
}

/// Copies raw in-memory buffers into owned mappings, skipping invalid
/// ones.
pub fn load_bytes<B: AsRef<[u8]>>(buffers: &[B]) -> Result<Vec<DexImage>> {
    let mut images = Vec::with_capacity(buffers.len());
    for (i, buffer) in buffers.iter().enumerate() {
        let location = format!("[buffer {}]", i);
        match DexImage::from_bytes(buffer.as_ref(), &location) {
            Ok(image) => images.push(image),
            Err(err) => warn!("skipping {}: {}", location, err),
        }
    }
    if images.is_empty() {
        return dex_err!(InvalidImage, "no usable dex image in the input");
    }
    Ok(images)
}

/// Multidex ordinal of an archive entry: `classes.dex` is 1,
/// `classesN.dex` is N. `None` for everything else.
fn classes_dex_ordinal(name: &str) -> Option<u32> {
    let digits = name.strip_prefix("classes")?.strip_suffix(".dex")?;
    if digits.is_empty() {
        return Some(1);
    }
    digits.parse().ok().filter(|n| *n >= 2)
}
