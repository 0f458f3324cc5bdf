use std::fmt;

use serde::{Deserialize, Serialize};

/// The 16-bit tag that precedes every value on the wire.
///
/// Basic tags are distinct powers of two so that a field's set of accepted
/// types can be stored as a single bitmask (see [`TypeSet`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WireType {
    IndexBlock = 0x0000,
    Null = 0x0001,
    Structure = 0x0002,
    Array = 0x0004,
    String = 0x0008,
    WString = 0x0010,
    Bool = 0x0020,
    Char = 0x0040,
    WChar = 0x0080,
    Short = 0x0100,
    Integer = 0x0200,
    Float = 0x0400,
    Long = 0x0800,
    Double = 0x1000,
}

impl WireType {
    pub const BASIC: [WireType; 11] = [
        WireType::Null,
        WireType::String,
        WireType::WString,
        WireType::Bool,
        WireType::Char,
        WireType::WChar,
        WireType::Short,
        WireType::Integer,
        WireType::Float,
        WireType::Long,
        WireType::Double,
    ];

    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            0x0000 => Some(WireType::IndexBlock),
            0x0001 => Some(WireType::Null),
            0x0002 => Some(WireType::Structure),
            0x0004 => Some(WireType::Array),
            0x0008 => Some(WireType::String),
            0x0010 => Some(WireType::WString),
            0x0020 => Some(WireType::Bool),
            0x0040 => Some(WireType::Char),
            0x0080 => Some(WireType::WChar),
            0x0100 => Some(WireType::Short),
            0x0200 => Some(WireType::Integer),
            0x0400 => Some(WireType::Float),
            0x0800 => Some(WireType::Long),
            0x1000 => Some(WireType::Double),
            _ => None,
        }
    }

    pub fn as_u16(&self) -> u16 {
        *self as u16
    }

    pub fn is_basic(&self) -> bool {
        TypeSet::ALL_BASIC.contains(*self)
    }

    pub fn is_container(&self) -> bool {
        matches!(self, WireType::Structure | WireType::Array)
    }

    pub fn name(&self) -> &'static str {
        match self {
            WireType::IndexBlock => "INDEXBLOCK",
            WireType::Null => "NULL",
            WireType::Structure => "STRUCTURE",
            WireType::Array => "ARRAY",
            WireType::String => "STRING",
            WireType::WString => "WSTRING",
            WireType::Bool => "BOOL",
            WireType::Char => "CHAR",
            WireType::WChar => "WCHAR",
            WireType::Short => "SHORT",
            WireType::Integer => "INTEGER",
            WireType::Float => "FLOAT",
            WireType::Long => "LONG",
            WireType::Double => "DOUBLE",
        }
    }
}

impl fmt::Display for WireType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Bitmask of basic wire types accepted by a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct TypeSet(u16);

impl TypeSet {
    pub const EMPTY: TypeSet = TypeSet(0);
    pub const ALL_BASIC: TypeSet = TypeSet(0x1FF9);

    pub fn of(types: &[WireType]) -> Self {
        types.iter().fold(TypeSet::EMPTY, |set, ty| set.with(*ty))
    }

    /// Interprets a raw tag as a type set. Only non-empty combinations of
    /// basic tags qualify.
    pub fn from_bits(bits: u16) -> Option<Self> {
        if bits != 0 && bits & !Self::ALL_BASIC.0 == 0 {
            Some(TypeSet(bits))
        } else {
            None
        }
    }

    pub fn bits(&self) -> u16 {
        self.0
    }

    pub fn with(self, ty: WireType) -> Self {
        TypeSet(self.0 | ty.as_u16())
    }

    pub fn contains(&self, ty: WireType) -> bool {
        ty != WireType::IndexBlock && self.0 & ty.as_u16() == ty.as_u16()
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = WireType> + '_ {
        WireType::BASIC.into_iter().filter(|ty| self.contains(*ty))
    }
}

impl From<WireType> for TypeSet {
    fn from(ty: WireType) -> Self {
        TypeSet::EMPTY.with(ty)
    }
}

impl std::ops::BitOr<WireType> for WireType {
    type Output = TypeSet;

    fn bitor(self, rhs: WireType) -> TypeSet {
        TypeSet::from(self).with(rhs)
    }
}

impl std::ops::BitOr<WireType> for TypeSet {
    type Output = TypeSet;

    fn bitor(self, rhs: WireType) -> TypeSet {
        self.with(rhs)
    }
}

impl fmt::Display for TypeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.iter().map(|ty| ty.name()).collect();
        if names.is_empty() {
            f.write_str("(none)")
        } else {
            f.write_str(&names.join(" | "))
        }
    }
}
