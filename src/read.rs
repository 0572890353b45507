use std::collections::HashMap;

use crate::bitcode::{Bitcode, Block, BlockInfo, Record, Value};
use crate::bits::{Bits, Cursor, Position};
use crate::bitstream::{
    char6_byte, AbbrevTable, Abbreviation, BlockInfoCode, BuiltinAbbreviationId, Operand,
    BLOCK_INFO_BLOCK_ID,
};
use crate::error::{Error, Result};
use crate::warn::{Warning, WarningSink};

/// Width of abbreviation ids at the top level of the stream.
const TOP_LEVEL_ABBREV_ID_WIDTH: usize = 2;

/// One entry of the parser's block-scope stack. The stack is never empty;
/// element 0 is the synthetic top-level frame.
#[derive(Debug, Clone)]
struct Frame {
    /// `None` only for the synthetic top-level frame.
    block_id: Option<u32>,
    abbrev_id_width: usize,
    /// This scope's abbreviation table: a copy of the BLOCKINFO seed for
    /// the block id, extended by in-block DEFINE_ABBREVs.
    abbrevs: AbbrevTable,
    /// Byte offset of the block body, for the exit length check.
    enter_position: u64,
}

impl Frame {
    fn top_level() -> Self {
        Self {
            block_id: None,
            abbrev_id_width: TOP_LEVEL_ABBREV_ID_WIDTH,
            abbrevs: AbbrevTable::new(),
            enter_position: 0,
        }
    }
}

/// One decoded stream-level token.
#[derive(Debug)]
enum Token {
    EndBlock,
    /// A sub-block header; the body has not been read yet.
    EnterSubBlock(Block),
    DefineAbbrev(Abbreviation),
    /// Either form of record; `Record::abbrev_id` tells them apart.
    Record(Record),
}

/// Streaming reader over a bitstream buffer.
///
/// [`BitStreamReader::from_bytes`] followed by [`BitStreamReader::read`]
/// decodes a whole stream into a [`Bitcode`] tree.
/// [`BitStreamReader::from_block`] followed by
/// [`BitStreamReader::scan_abbrevs`] re-reads a single decoded block for
/// its effective abbreviation table.
pub struct BitStreamReader<'a> {
    cursor: Cursor<'a>,
    frames: Vec<Frame>,
    block_info: HashMap<u32, BlockInfo>,
    sink: Option<&'a mut dyn WarningSink>,
}

impl<'a> BitStreamReader<'a> {
    /// A reader positioned at the start of a stream.
    #[must_use]
    pub fn from_bytes(data: &'a [u8]) -> Self {
        Self {
            cursor: Cursor::new(Bits::new(data)),
            frames: vec![Frame::top_level()],
            block_info: HashMap::new(),
            sink: None,
        }
    }

    /// A reader positioned at the body of a previously decoded block, its
    /// scope seeded from `block_info` exactly as during the original parse.
    pub fn from_block(
        data: &'a [u8],
        block: &Block,
        block_info: HashMap<u32, BlockInfo>,
    ) -> Result<Self> {
        let mut reader = Self {
            cursor: Cursor::new(Bits::new(data)),
            frames: vec![Frame::top_level()],
            block_info,
            sink: None,
        };
        reader.cursor.seek_to_byte(block.position)?;
        reader.enter(block);
        Ok(reader)
    }

    /// Route non-fatal anomalies to `sink` instead of `tracing::warn!`.
    #[must_use]
    pub fn with_warning_sink(mut self, sink: &'a mut dyn WarningSink) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Decode the whole stream: the 32-bit magic word, then top-level
    /// tokens until the end of the buffer. Only ENTER_SUBBLOCK is
    /// meaningful at the top level; other tokens are reported to the
    /// warning sink and skipped.
    pub fn read(mut self) -> Result<Bitcode> {
        let magic = self.cursor.read(32)? as u32;
        let mut top_blocks = Vec::new();
        while !self.cursor.is_at_end() {
            match self.read_token()? {
                Token::EnterSubBlock(block) => top_blocks.push(self.read_block_tree(block)?),
                Token::EndBlock => self.warn("END_BLOCK at stream top level"),
                Token::DefineAbbrev(_) => self.warn("DEFINE_ABBREV at stream top level"),
                Token::Record(record) => {
                    self.warn(format!(
                        "stray record (code {}) at stream top level",
                        record.code
                    ));
                }
            }
        }
        Ok(Bitcode {
            magic,
            top_blocks,
            block_info: self.block_info,
        })
    }

    /// Scan the entered block for its effective abbreviation table:
    /// DEFINE_ABBREVs extend the scope, records are decoded and discarded,
    /// sub-blocks are skipped over by their length words.
    pub fn scan_abbrevs(mut self) -> Result<AbbrevTable> {
        let block_id = self.current_block_id();
        loop {
            let token = self
                .read_token()
                .map_err(|err| contextualize(err, block_id))?;
            match token {
                Token::EndBlock => break,
                Token::EnterSubBlock(sub) => {
                    self.cursor
                        .skip_bytes(sub.length_bytes as usize)
                        .map_err(|err| contextualize(err, block_id))?;
                }
                Token::DefineAbbrev(abbrev) => {
                    self.top_frame_mut().abbrevs.add(abbrev);
                }
                Token::Record(_) => {}
            }
        }
        let frame = self.frames.pop().expect("frame stack is never empty");
        Ok(frame.abbrevs)
    }

    /// Read a block body that was just entered, then verify its length and
    /// append nothing: the caller owns the assembled [`Block`].
    fn read_block_tree(&mut self, mut block: Block) -> Result<Block> {
        self.enter(&block);
        let body = if block.id == BLOCK_INFO_BLOCK_ID {
            self.read_block_info()
        } else {
            self.read_block(&mut block)
        };
        body.map_err(|err| err.in_block(block.id))?;
        self.exit(&block)?;
        Ok(block)
    }

    fn enter(&mut self, block: &Block) {
        assert_eq!(self.cursor.position().bit, 0);
        let abbrevs = self
            .block_info
            .get(&block.id)
            .map(|info| info.abbrev_defs.clone())
            .unwrap_or_default();
        tracing::trace!(block_id = block.id, position = %self.cursor.position(), "entering block");
        self.frames.push(Frame {
            block_id: Some(block.id),
            abbrev_id_width: usize::from(block.abbrev_id_width),
            abbrevs,
            enter_position: self.cursor.byte_offset(),
        });
    }

    fn exit(&mut self, block: &Block) -> Result<()> {
        assert_eq!(self.cursor.position().bit, 0);
        let frame = self.frames.pop().expect("frame stack is never empty");
        let expected = frame.enter_position + u64::from(block.length_bytes);
        let actual = self.cursor.byte_offset();
        if actual != expected {
            return Err(Error::malformed(
                format!("block length mismatch: body ended at byte {actual}, length word points at byte {expected}"),
                self.cursor.position(),
            )
            .in_block(block.id));
        }
        tracing::trace!(block_id = block.id, "exiting block");
        Ok(())
    }

    /// The general block driver: dispatch tokens until END_BLOCK.
    fn read_block(&mut self, block: &mut Block) -> Result<()> {
        loop {
            match self.read_token()? {
                Token::EndBlock => return Ok(()),
                Token::EnterSubBlock(sub) => {
                    let sub = self.read_block_tree(sub)?;
                    block.sub_blocks.push(sub);
                }
                Token::DefineAbbrev(abbrev) => {
                    self.top_frame_mut().abbrevs.add(abbrev);
                }
                Token::Record(record) => block.records.push(record),
            }
        }
    }

    /// The BLOCKINFO driver. Records here are metadata about *other*
    /// blocks: SETBID selects a target block id, and the remaining records
    /// attach names and seed abbreviations to it.
    fn read_block_info(&mut self) -> Result<()> {
        let mut target_block_id: Option<u32> = None;
        loop {
            match self.read_token()? {
                Token::EndBlock => return Ok(()),
                Token::EnterSubBlock(sub) => {
                    self.warn(format!("sub-block (id {}) inside BLOCKINFO, skipping", sub.id));
                    self.cursor.skip_bytes(sub.length_bytes as usize)?;
                }
                Token::DefineAbbrev(abbrev) => {
                    let target = target_block_id.ok_or_else(|| {
                        Error::malformed(
                            "DEFINE_ABBREV in BLOCKINFO before SETBID",
                            self.cursor.position(),
                        )
                    })?;
                    self.block_info.entry(target).or_default().abbrev_defs.add(abbrev);
                }
                Token::Record(record) => {
                    if record.abbrev_id != BuiltinAbbreviationId::UnabbreviatedRecord as u32 {
                        self.warn(format!(
                            "abbreviated record (code {}) inside BLOCKINFO",
                            record.code
                        ));
                        continue;
                    }
                    self.apply_block_info_record(&mut target_block_id, &record)?;
                }
            }
        }
    }

    fn apply_block_info_record(
        &mut self,
        target_block_id: &mut Option<u32>,
        record: &Record,
    ) -> Result<()> {
        let position = self.cursor.position();
        let code = match BlockInfoCode::try_from(record.code) {
            Ok(code) => code,
            Err(_) => {
                self.warn(format!("unknown BLOCKINFO record code {}", record.code));
                return Ok(());
            }
        };
        match code {
            BlockInfoCode::SetBid => {
                let id = record
                    .scalar(0)
                    .ok_or_else(|| Error::malformed("SETBID without a block id", position))?;
                let id = u32::try_from(id).map_err(|_| {
                    Error::malformed("SETBID block id does not fit in 32 bits", position)
                })?;
                *target_block_id = Some(id);
            }
            BlockInfoCode::BlockName => {
                let target = target_block_id
                    .ok_or_else(|| Error::malformed("BLOCKNAME before SETBID", position))?;
                if let Some(name) = self.warn_on_err(record_name_string(record, 0, position)) {
                    self.block_info.entry(target).or_default().name = Some(name);
                }
            }
            BlockInfoCode::SetRecordName => {
                let target = target_block_id
                    .ok_or_else(|| Error::malformed("SETRECORDNAME before SETBID", position))?;
                let record_code = record.scalar(0).ok_or_else(|| {
                    Error::malformed("SETRECORDNAME without a record code", position)
                })?;
                let record_code = u32::try_from(record_code).map_err(|_| {
                    Error::malformed("SETRECORDNAME record code does not fit in 32 bits", position)
                })?;
                if let Some(name) = self.warn_on_err(record_name_string(record, 1, position)) {
                    self.block_info
                        .entry(target)
                        .or_default()
                        .record_names
                        .insert(record_code, name);
                }
            }
        }
        Ok(())
    }

    /// Decode one token at the current position. The abbreviation id is
    /// read at the current scope's width (2 at the top level).
    fn read_token(&mut self) -> Result<Token> {
        let width = self.top_frame().abbrev_id_width;
        let abbrev_id = self.cursor.read(width)?;
        match BuiltinAbbreviationId::try_from(abbrev_id) {
            Ok(BuiltinAbbreviationId::EndBlock) => {
                self.cursor.advance(32)?;
                Ok(Token::EndBlock)
            }
            Ok(BuiltinAbbreviationId::EnterSubBlock) => {
                self.read_block_header().map(Token::EnterSubBlock)
            }
            Ok(BuiltinAbbreviationId::DefineAbbreviation) => {
                self.read_define_abbrev().map(Token::DefineAbbrev)
            }
            Ok(BuiltinAbbreviationId::UnabbreviatedRecord) => {
                self.read_unabbreviated_record().map(Token::Record)
            }
            Err(_) => self.read_abbreviated_record(abbrev_id).map(Token::Record),
        }
    }

    /// ENTER_SUBBLOCK: `[blockid(vbr8), newabbrevlen(vbr4), <align32>,
    /// blocklen_32]`.
    fn read_block_header(&mut self) -> Result<Block> {
        let position = self.cursor.position();
        let block_id = self.cursor.read_vbr(8)?;
        let block_id = u32::try_from(block_id)
            .map_err(|_| Error::malformed("block id does not fit in 32 bits", position))?;
        let width = self.cursor.read_vbr(4)?;
        if width == 0 {
            return Err(Error::malformed(
                "ENTER_SUBBLOCK with abbreviation id width 0",
                position,
            ));
        }
        if width > 32 {
            return Err(Error::malformed(
                format!("ENTER_SUBBLOCK abbreviation id width {width} too large"),
                position,
            ));
        }
        self.cursor.advance(32)?;
        let length_words = self.cursor.read(32)? as u32;
        let length_bytes = length_words.checked_mul(4).ok_or_else(|| {
            Error::malformed("block length in words overflows a byte count", position)
        })?;
        Ok(Block {
            id: block_id,
            abbrev_id_width: width as u8,
            length_bytes,
            position: self.cursor.byte_offset(),
            records: Vec::new(),
            sub_blocks: Vec::new(),
        })
    }

    /// DEFINE_ABBREV: `[numabbrevops(vbr5), abbrevop0, abbrevop1, ...]`.
    fn read_define_abbrev(&mut self) -> Result<Abbreviation> {
        let position = self.cursor.position();
        let num_ops = self.cursor.read_vbr(5)? as usize;
        if num_ops == 0 {
            return Err(Error::malformed("abbreviation with no operands", position));
        }
        let mut num_ops_left = num_ops;
        let mut operands = Vec::with_capacity(num_ops.min(32));
        while num_ops_left > 0 {
            operands.push(self.read_abbrev_op(&mut num_ops_left)?);
        }
        Ok(Abbreviation { operands })
    }

    /// One operand of an abbreviation definition. `num_ops_left` counts the
    /// encoded operand slots; an array consumes one slot for itself and one
    /// for its element, which must be the final slot.
    fn read_abbrev_op(&mut self, num_ops_left: &mut usize) -> Result<Operand> {
        let position = self.cursor.position();
        if *num_ops_left == 0 {
            return Err(Error::malformed(
                "abbreviation operand count overflow",
                position,
            ));
        }
        *num_ops_left -= 1;

        let is_literal = self.cursor.read(1)?;
        if is_literal == 1 {
            return Ok(Operand::Literal(self.cursor.read_vbr(8)?));
        }
        let encoding = self.cursor.read(3)?;
        Ok(match encoding {
            1 => Operand::Fixed(self.read_operand_width(64, position)?),
            2 => {
                let width = self.read_operand_width(32, position)?;
                if width == 0 {
                    return Err(Error::malformed("vbr operand with chunk width 0", position));
                }
                Operand::Vbr(width)
            }
            3 => {
                if *num_ops_left != 1 {
                    return Err(Error::malformed(
                        "array operand must be the last operand",
                        position,
                    ));
                }
                let element = self.read_abbrev_op(num_ops_left)?;
                if element.is_payload() {
                    return Err(Error::malformed(
                        "array element must not be an array or blob",
                        position,
                    ));
                }
                Operand::Array(Box::new(element))
            }
            4 => Operand::Char6,
            5 => {
                if *num_ops_left != 0 {
                    return Err(Error::malformed(
                        "blob operand must be the last operand",
                        position,
                    ));
                }
                Operand::Blob
            }
            _ => {
                return Err(Error::malformed(
                    format!("unknown abbreviation operand encoding {encoding}"),
                    position,
                ))
            }
        })
    }

    fn read_operand_width(&mut self, max: u8, position: Position) -> Result<u8> {
        let width = self.cursor.read_vbr(5)?;
        if width > u64::from(max) {
            return Err(Error::malformed(
                format!("operand width {width} too large"),
                position,
            ));
        }
        Ok(width as u8)
    }

    /// UNABBREV_RECORD: `[code(vbr6), numops(vbr6), op0(vbr6), ...]`.
    fn read_unabbreviated_record(&mut self) -> Result<Record> {
        let position = self.cursor.position();
        let code = self.cursor.read_vbr(6)?;
        let code = u32::try_from(code)
            .map_err(|_| Error::malformed("record code does not fit in 32 bits", position))?;
        let num_values = self.cursor.read_vbr(6)?;
        let mut values = Vec::with_capacity(num_values.min(64) as usize);
        for _ in 0..num_values {
            values.push(Value::Scalar(self.cursor.read_vbr(6)?));
        }
        Ok(Record {
            abbrev_id: BuiltinAbbreviationId::UnabbreviatedRecord as u32,
            code,
            values,
        })
    }

    /// A record encoded through a user-defined abbreviation: the first
    /// operand yields the record code, the rest yield the values.
    fn read_abbreviated_record(&mut self, abbrev_id: u64) -> Result<Record> {
        let position = self.cursor.position();
        let abbrev_id = u32::try_from(abbrev_id)
            .map_err(|_| Error::malformed("abbreviation id does not fit in 32 bits", position))?;
        let abbrev = self
            .top_frame()
            .abbrevs
            .get(abbrev_id)
            .cloned()
            .ok_or_else(|| {
                Error::malformed(format!("unknown abbreviation id {abbrev_id}"), position)
            })?;

        let mut operands = abbrev.operands.iter();
        let code_operand = operands
            .next()
            .ok_or_else(|| Error::malformed("abbreviation with no operands", position))?;
        let code = match self.read_operand(code_operand)? {
            Value::Scalar(value) => u32::try_from(value)
                .map_err(|_| Error::malformed("record code does not fit in 32 bits", position))?,
            Value::Array(_) | Value::Blob(_) => {
                return Err(Error::malformed("record code is not a scalar", position));
            }
        };
        let mut values = Vec::with_capacity(abbrev.operands.len() - 1);
        for operand in operands {
            values.push(self.read_operand(operand)?);
        }
        Ok(Record {
            abbrev_id,
            code,
            values,
        })
    }

    fn read_operand(&mut self, operand: &Operand) -> Result<Value> {
        match operand {
            Operand::Literal(value) => Ok(Value::Scalar(*value)),
            Operand::Fixed(0) => Ok(Value::Scalar(0)),
            Operand::Fixed(width) => Ok(Value::Scalar(self.cursor.read(usize::from(*width))?)),
            Operand::Vbr(width) => Ok(Value::Scalar(self.cursor.read_vbr(usize::from(*width))?)),
            Operand::Char6 => {
                let position = self.cursor.position();
                let index = self.cursor.read(6)?;
                let byte = char6_byte(index).ok_or_else(|| {
                    Error::malformed(format!("invalid char6 value {index}"), position)
                })?;
                Ok(Value::Scalar(u64::from(byte)))
            }
            Operand::Array(element) => {
                let count = self.cursor.read_vbr(6)?;
                let mut elements = Vec::with_capacity(count.min(64) as usize);
                for _ in 0..count {
                    elements.push(self.read_operand(element)?);
                }
                Ok(Value::Array(elements))
            }
            Operand::Blob => {
                let position = self.cursor.position();
                let count = self.cursor.read_vbr(6)?;
                let count = usize::try_from(count).map_err(|_| {
                    Error::malformed("blob length does not fit in memory", position)
                })?;
                self.cursor.advance(32)?;
                let bytes = self.cursor.read_bytes(count)?;
                self.cursor.advance(32)?;
                Ok(Value::Blob(bytes))
            }
        }
    }

    fn top_frame(&self) -> &Frame {
        self.frames.last().expect("frame stack is never empty")
    }

    fn top_frame_mut(&mut self) -> &mut Frame {
        self.frames.last_mut().expect("frame stack is never empty")
    }

    fn current_block_id(&self) -> Option<u32> {
        self.top_frame().block_id
    }

    fn warn(&mut self, message: impl Into<String>) {
        let warning = Warning {
            message: message.into(),
            position: self.cursor.position(),
            block_id: self.current_block_id(),
        };
        match &mut self.sink {
            Some(sink) => sink.report(warning),
            None => {
                tracing::warn!(block_id = ?warning.block_id, position = %warning.position, "{}", warning.message);
            }
        }
    }

    /// Route a recoverable failure to the warning sink and continue.
    fn warn_on_err<T>(&mut self, result: Result<T>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(err) => {
                self.warn(err.to_string());
                None
            }
        }
    }
}

fn contextualize(err: Error, block_id: Option<u32>) -> Error {
    match block_id {
        Some(id) => err.in_block(id),
        None => err,
    }
}

/// Decode the values of a BLOCKINFO naming record as a UTF-8 string. Every
/// value from `from` on must be an octet-sized scalar.
fn record_name_string(record: &Record, from: usize, position: Position) -> Result<String> {
    let values = record.values.get(from..).unwrap_or_default();
    let mut bytes = Vec::with_capacity(values.len());
    for value in values {
        let byte = value
            .as_scalar()
            .and_then(|v| u8::try_from(v).ok())
            .ok_or_else(|| Error::malformed("name byte is not an octet-sized scalar", position))?;
        bytes.push(byte);
    }
    String::from_utf8(bytes).map_err(|_| Error::malformed("name is not valid UTF-8", position))
}
