use num_enum::TryFromPrimitive;

/// The reserved id of the BLOCKINFO block.
pub const BLOCK_INFO_BLOCK_ID: u32 = 0;

/// An `Abbreviation` represents the encoding definition for a user-defined
/// record. Abbreviations are the primary form of compression available in
/// a bitstream: once defined, a record can be emitted as a dense sequence
/// of operand-shaped fields instead of the self-describing VBR6 form.
///
/// The first operand encodes the record code; the remaining operands encode
/// the record values.
#[derive(Debug, Clone, PartialEq)]
pub struct Abbreviation {
    /// Abbreviation operands, never empty.
    pub operands: Vec<Operand>,
}

/// One operand of an abbreviation definition.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// A literal value (emitted in the definition as a VBR8 field); decoding
    /// it consumes no bits from the record.
    Literal(u64),
    /// A fixed-width field, 0..=64 bits wide.
    Fixed(u8),
    /// A VBR-encoded value with the provided chunk width.
    Vbr(u8),
    /// An array of values. The definition carries the element operand
    /// inline; the record carries a VBR6 length followed by that many
    /// elements.
    Array(Box<Operand>),
    /// A char6-encoded ASCII character from the `[a-zA-Z._]` alphabet.
    Char6,
    /// A VBR6 byte count, padding to a 32-bit boundary, the raw bytes, and
    /// padding to a 32-bit boundary again.
    Blob,
}

impl Operand {
    /// Whether this operand carries a trailing payload (array or blob),
    /// which may only appear in last position and never as an array
    /// element.
    #[must_use]
    pub fn is_payload(&self) -> bool {
        matches!(self, Operand::Array(_) | Operand::Blob)
    }

    /// Whether this is the `Literal` case.
    #[must_use]
    pub fn is_literal(&self) -> bool {
        matches!(self, Self::Literal(_))
    }
}

/// An ordered abbreviation scope.
///
/// Ids 0..=3 are reserved for the builtin abbreviations; the first
/// user-defined abbreviation in a scope takes id 4 and each subsequent
/// definition takes the next id. Tables are value types: entering a block
/// copies the BLOCKINFO seed table into the new scope, so in-block
/// definitions never leak outward.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AbbrevTable {
    entries: Vec<(u32, Abbreviation)>,
}

impl AbbrevTable {
    /// The id assigned to the first user-defined abbreviation in a scope.
    pub const FIRST_USER_ID: u32 = 4;

    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a definition, allocating the next abbreviation id.
    pub fn add(&mut self, abbrev: Abbreviation) -> u32 {
        let id = self
            .entries
            .last()
            .map_or(Self::FIRST_USER_ID, |(id, _)| id + 1);
        self.entries.push((id, abbrev));
        id
    }

    /// Look up a definition by abbreviation id. Tables are small, so the
    /// scan is linear.
    #[must_use]
    pub fn get(&self, id: u32) -> Option<&Abbreviation> {
        self.entries
            .iter()
            .find(|(entry_id, _)| *entry_id == id)
            .map(|(_, abbrev)| abbrev)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &Abbreviation)> {
        self.entries.iter().map(|(id, abbrev)| (*id, abbrev))
    }
}

/// An abbreviation id is a fixed-width field that occurs at the start of
/// every token inside a block.
///
/// The bitstream reserves four abbreviation ids for its own bookkeeping;
/// user-defined abbreviations begin at [`AbbrevTable::FIRST_USER_ID`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[repr(u64)]
pub enum BuiltinAbbreviationId {
    /// Marks the end of the current block.
    EndBlock = 0,
    /// Marks the beginning of a new block.
    EnterSubBlock = 1,
    /// Marks the definition of a new abbreviation.
    DefineAbbreviation = 2,
    /// Marks an unabbreviated, self-describing record.
    UnabbreviatedRecord = 3,
}

/// Record codes reserved inside the BLOCKINFO block. Of these, only
/// `SetBid` is required; the naming records exist so that tools can
/// introspect the structure of blocks and records in a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[repr(u32)]
pub enum BlockInfoCode {
    /// Selects which block id subsequent BLOCKINFO records describe.
    SetBid = 1,
    /// Names the selected block.
    BlockName = 2,
    /// Names one record code of the selected block.
    SetRecordName = 3,
}

/// Decode one char6 value: 0..=25 map to `a..z`, 26..=51 to `A..Z`, 52 to
/// `.`, 53 to `_`. The remaining six-bit values are invalid.
pub(crate) fn char6_byte(index: u64) -> Option<u8> {
    match index {
        0..=25 => Some(b'a' + index as u8),
        26..=51 => Some(b'A' + (index - 26) as u8),
        52 => Some(b'.'),
        53 => Some(b'_'),
        _ => None,
    }
}
