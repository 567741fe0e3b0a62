use std::fmt::Debug;
use std::io;

use thiserror::Error;

#[derive(Error)]
pub enum DexKitError {
    #[error("File not found: {path}: {source}")]
    FileNotFound { path: String, source: io::Error },

    #[error("No usable dex image: {0}")]
    InvalidImage(String),

    #[error("Archive {path} contains no classes*.dex entries")]
    EmptyArchive { path: String },

    #[error("Empty or truncated dex file")]
    TruncatedFile,

    #[error("Bad file magic: {magic:?}")]
    BadFileMagic { magic: [u8; 8] },

    #[error("Unknown dex version: {version:?}")]
    UnknownDexVersion { version: [u8; 4] },

    #[error("Index({index}) to {item_ty} should be less than {max}")]
    DexIndexError {
        index: u32,
        max: usize,
        item_ty: &'static str,
    },

    #[error("Bad checksum: {actual:#010x}, expected {expected:#010x}")]
    BadChecksum { actual: u32, expected: u32 },

    #[error("Bad string data at offset {0}: missing terminating null byte")]
    BadStringData(usize),

    #[error("{0}")]
    Mutf8DecodeError(#[from] std::string::FromUtf16Error),

    #[error("Bad uleb128 at offset {offset}: {reason}")]
    BadVarInt {
        offset: usize,
        reason: &'static str,
    },

    #[error("Malformed {section} at offset {offset}: {reason}")]
    ParseError {
        section: &'static str,
        offset: usize,
        reason: String,
    },

    #[error("Malformed query: {0}")]
    QueryMalformed(String),

    #[error("Dex {dex} is unavailable: {reason}")]
    IndexUnavailable { dex: u16, reason: String },

    #[error("{0}")]
    IO(#[from] io::Error),

    #[error("{0}")]
    Zip(#[from] zip::result::ZipError),
}

/// Shorthand for `Err(DexKitError::Variant { .. })` in the common shapes.
#[macro_export]
macro_rules! dex_err {
    ($name:ident) => {
        Err($crate::error::DexKitError::$name)
    };
    ($name:ident { $($arg:tt)* }) => {
        Err($crate::error::DexKitError::$name { $($arg)* })
    };
    ($name:ident, $arg1:literal) => {
        Err($crate::error::DexKitError::$name(format!($arg1)))
    };
    ($name:ident, $arg1:literal, $($arg:tt)*) => {
        Err($crate::error::DexKitError::$name(format!($arg1, $($arg)*)))
    };
    ($name:ident, $($arg:tt)*) => {
        Err($crate::error::DexKitError::$name($($arg)*))
    };
}

impl DexKitError {
    /// True for errors caused by malformed image content. Parse-level
    /// errors mark the owning image unusable; everything else (bad ids,
    /// malformed queries, I/O) surfaces to the caller untouched.
    pub fn is_parse_error(&self) -> bool {
        matches!(
            self,
            DexKitError::TruncatedFile
                | DexKitError::BadFileMagic { .. }
                | DexKitError::UnknownDexVersion { .. }
                | DexKitError::BadChecksum { .. }
                | DexKitError::BadStringData(_)
                | DexKitError::Mutf8DecodeError(_)
                | DexKitError::BadVarInt { .. }
                | DexKitError::ParseError { .. }
        )
    }
}

impl Debug for DexKitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self)
    }
}
