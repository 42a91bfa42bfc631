use std::collections::BTreeSet;
use std::fmt;
use std::ops::{BitOr, BitOrAssign};

/// Ordinal of an extent (a FROM-clause object source) within a query
pub type ExtentNumber = usize;

/// Set of extents, ordered so that renderings are stable
pub type ExtentSet = BTreeSet<ExtentNumber>;

/// Enumerator node id, leaves first, the top node carries the largest id
pub type NodeId = u8;

/// Object identity as assigned by the store
pub type ObjectId = u64;

/// Id shared by every clone of one compiled query
pub type UniqueQueryId = u64;

/// Runtime type tag of a value expression
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DbTypeCode {
    Binary,
    Boolean,
    DateTime,
    Decimal,
    Double,
    Integer,
    UInteger,
    String,
    Object,
}

impl DbTypeCode {
    pub fn is_numeric(self) -> bool {
        matches!(
            self,
            DbTypeCode::Decimal | DbTypeCode::Double | DbTypeCode::Integer | DbTypeCode::UInteger
        )
    }

    /// Suffix used in compiled filter mnemonics
    pub fn code_suffix(self) -> &'static str {
        match self {
            DbTypeCode::Binary => "BIN",
            DbTypeCode::Boolean => "BOOL",
            DbTypeCode::DateTime => "DT",
            DbTypeCode::Decimal => "DEC",
            DbTypeCode::Double => "DBL",
            DbTypeCode::Integer => "INT",
            DbTypeCode::UInteger => "UINT",
            DbTypeCode::String => "STR",
            DbTypeCode::Object => "OBJ",
        }
    }
}

impl fmt::Display for DbTypeCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DbTypeCode::Binary => "Binary",
            DbTypeCode::Boolean => "Boolean",
            DbTypeCode::DateTime => "DateTime",
            DbTypeCode::Decimal => "Decimal",
            DbTypeCode::Double => "Double",
            DbTypeCode::Integer => "Integer",
            DbTypeCode::UInteger => "UInteger",
            DbTypeCode::String => "String",
            DbTypeCode::Object => "Object",
        };
        write!(f, "{}", name)
    }
}

/// Sort direction of a comparer or index scan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrdering {
    #[default]
    Ascending,
    Descending,
}

/// Bit word describing which features a compiled query uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct QueryFlags(u32);

impl QueryFlags {
    pub const INCLUDES_LITERAL: QueryFlags = QueryFlags(0x0001);
    pub const INCLUDES_AGGREGATION: QueryFlags = QueryFlags(0x0002);
    pub const INCLUDES_LIKE_VARIABLE: QueryFlags = QueryFlags(0x0004);
    pub const INCLUDES_SORTING: QueryFlags = QueryFlags(0x0008);
    pub const INCLUDES_FETCH_LITERAL: QueryFlags = QueryFlags(0x0010);
    pub const INCLUDES_FETCH_VARIABLE: QueryFlags = QueryFlags(0x0020);
    pub const INCLUDES_OFFSET_KEY_LITERAL: QueryFlags = QueryFlags(0x0040);
    pub const INCLUDES_OFFSET_KEY_VARIABLE: QueryFlags = QueryFlags(0x0080);
    pub const SINGLETON_PROJECTION: QueryFlags = QueryFlags(0x0100);

    pub const fn empty() -> Self {
        QueryFlags(0)
    }

    pub const fn from_bits(bits: u32) -> Self {
        QueryFlags(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub fn contains(self, other: QueryFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: QueryFlags) {
        self.0 |= other.0;
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for QueryFlags {
    type Output = QueryFlags;

    fn bitor(self, rhs: QueryFlags) -> QueryFlags {
        QueryFlags(self.0 | rhs.0)
    }
}

impl BitOrAssign for QueryFlags {
    fn bitor_assign(&mut self, rhs: QueryFlags) {
        self.0 |= rhs.0;
    }
}
