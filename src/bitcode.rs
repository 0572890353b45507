use std::collections::HashMap;

use crate::bitstream::AbbrevTable;

/// A single decoded record value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Scalar(u64),
    /// The trailing array payload of an abbreviated record. Elements are
    /// always scalars.
    Array(Vec<Value>),
    /// The trailing blob payload of an abbreviated record.
    Blob(Vec<u8>),
}

impl Value {
    #[must_use]
    pub fn as_scalar(&self) -> Option<u64> {
        match self {
            Value::Scalar(value) => Some(*value),
            Value::Array(_) | Value::Blob(_) => None,
        }
    }

    #[must_use]
    pub fn is_scalar(&self) -> bool {
        matches!(self, Value::Scalar(_))
    }
}

/// A coded tuple of values, either decoded from the self-describing
/// UNABBREV_RECORD form or through an abbreviation.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    /// The abbreviation id this record was encoded with (3 for
    /// unabbreviated records, 4 and up for abbreviated ones).
    pub abbrev_id: u32,
    pub code: u32,
    pub values: Vec<Value>,
}

impl Record {
    /// The scalar at `index`, if present and scalar.
    #[must_use]
    pub fn scalar(&self, index: usize) -> Option<u64> {
        self.values.get(index).and_then(Value::as_scalar)
    }
}

/// A length-delimited region of the stream containing records and nested
/// blocks, decoded with its own abbreviation-id width.
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub id: u32,
    /// Width of the abbreviation ids of every token in this block's body.
    pub abbrev_id_width: u8,
    /// Body length; the cursor is exactly this many bytes past `position`
    /// once the block's END_BLOCK has been consumed.
    pub length_bytes: u32,
    /// Byte offset of the block body, right after the 32-bit length word.
    pub position: u64,
    pub records: Vec<Record>,
    pub sub_blocks: Vec<Block>,
}

/// Metadata the BLOCKINFO block provides for one block id: optional names
/// and the seed abbreviation table copied into every future scope of that
/// block id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BlockInfo {
    pub name: Option<String>,
    pub record_names: HashMap<u32, String>,
    pub abbrev_defs: AbbrevTable,
}

/// A fully decoded bitstream: the verbatim magic word, the top-level block
/// tree, and the BLOCKINFO metadata gathered along the way.
#[derive(Debug, Clone, PartialEq)]
pub struct Bitcode {
    pub magic: u32,
    pub top_blocks: Vec<Block>,
    pub block_info: HashMap<u32, BlockInfo>,
}

impl Bitcode {
    /// BLOCKINFO metadata for a block id, if any was declared.
    #[must_use]
    pub fn block_info(&self, block_id: u32) -> Option<&BlockInfo> {
        self.block_info.get(&block_id)
    }

    /// The declared name of a block id.
    #[must_use]
    pub fn block_name(&self, block_id: u32) -> Option<&str> {
        self.block_info(block_id)?.name.as_deref()
    }

    /// The declared name of a record code within a block id.
    #[must_use]
    pub fn record_name(&self, block_id: u32, record_code: u32) -> Option<&str> {
        self.block_info(block_id)?
            .record_names
            .get(&record_code)
            .map(String::as_str)
    }
}
