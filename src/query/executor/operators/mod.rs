// Query Operators Module
//
// Enumerator kinds of the execution core. Every kind implements
// `ExecutionEnumerator`; composite kinds own their inputs as boxed
// enumerators and drive them through the same trait.

pub mod aggregation;
pub mod identity_lookup;
pub mod index_scan;
pub mod join;
pub mod scan;
pub mod sort;

use std::fmt;

pub use self::aggregation::Aggregation;
pub use self::identity_lookup::ObjectIdentityLookup;
pub use self::index_scan::IndexScan;
pub use self::join::Join;
pub use self::scan::FullTableScan;
pub use self::sort::Sort;

/// Node kind tag, also written into offset key sections
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum EnumeratorNodeType {
    FullTableScan = 1,
    IndexScan = 2,
    ObjectIdentityLookup = 3,
    Join = 4,
    Sort = 5,
    Aggregation = 6,
}

impl EnumeratorNodeType {
    pub fn from_u8(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(EnumeratorNodeType::FullTableScan),
            2 => Some(EnumeratorNodeType::IndexScan),
            3 => Some(EnumeratorNodeType::ObjectIdentityLookup),
            4 => Some(EnumeratorNodeType::Join),
            5 => Some(EnumeratorNodeType::Sort),
            6 => Some(EnumeratorNodeType::Aggregation),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            EnumeratorNodeType::FullTableScan => "FullTableScan",
            EnumeratorNodeType::IndexScan => "IndexScan",
            EnumeratorNodeType::ObjectIdentityLookup => "ObjectIdentityLookup",
            EnumeratorNodeType::Join => "Join",
            EnumeratorNodeType::Sort => "Sort",
            EnumeratorNodeType::Aggregation => "Aggregation",
        }
    }
}

impl fmt::Display for EnumeratorNodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Join semantics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinType {
    Inner,
    LeftOuter,
}

/// Position state byte of scan sections
pub(crate) const SCAN_STATE_NONE: u8 = 0;
pub(crate) const SCAN_STATE_POSITIONED: u8 = 1;
pub(crate) const SCAN_STATE_PLACEHOLDER: u8 = 2;
