//! Session-local 64-bit handles. An encoded id packs the dex ordinal, an
//! entity kind tag, and the DEX-local index; raw-value ordering is
//! (dex ordinal, kind, local index), which is the stable result order.

use serde::{Deserialize, Serialize};

const DEX_SHIFT: u32 = 48;
const KIND_SHIFT: u32 = 40;
const KIND_MASK: u64 = 0xFF;
const INDEX_MASK: u64 = 0xFFFF_FFFF;

#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum EntityKind {
    Class = 0,
    Method = 1,
    Field = 2,
}

#[derive(
    Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct EncodedId(u64);

impl EncodedId {
    pub fn new(kind: EntityKind, dex: u16, index: u32) -> Self {
        EncodedId(
            ((dex as u64) << DEX_SHIFT) | ((kind as u64) << KIND_SHIFT) | (index as u64),
        )
    }

    pub fn class(dex: u16, index: u32) -> Self {
        EncodedId::new(EntityKind::Class, dex, index)
    }

    pub fn method(dex: u16, index: u32) -> Self {
        EncodedId::new(EntityKind::Method, dex, index)
    }

    pub fn field(dex: u16, index: u32) -> Self {
        EncodedId::new(EntityKind::Field, dex, index)
    }

    #[inline]
    pub fn dex(&self) -> u16 {
        (self.0 >> DEX_SHIFT) as u16
    }

    /// `None` when the kind bits do not name a known entity kind, which can
    /// only happen for ids not produced by this session.
    #[inline]
    pub fn kind(&self) -> Option<EntityKind> {
        match (self.0 >> KIND_SHIFT) & KIND_MASK {
            0 => Some(EntityKind::Class),
            1 => Some(EntityKind::Method),
            2 => Some(EntityKind::Field),
            _ => None,
        }
    }

    #[inline]
    pub fn index(&self) -> u32 {
        (self.0 & INDEX_MASK) as u32
    }

    pub fn raw(&self) -> u64 {
        self.0
    }

    pub fn from_raw(raw: u64) -> Self {
        EncodedId(raw)
    }
}
