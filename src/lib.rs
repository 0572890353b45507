//! Reader for the [LLVM bitstream container format][fmt]: a bit-packed,
//! self-describing container of nested blocks holding records whose
//! physical layout is dictated by abbreviation definitions carried in the
//! stream itself.
//!
//! [`BitStreamReader::from_bytes`] decodes a byte buffer into a
//! [`Bitcode`] tree of blocks and records, collecting the BLOCKINFO
//! metadata (block names, record names, shared abbreviations) along the
//! way. No semantic interpretation of record codes is performed beyond the
//! three reserved BLOCKINFO codes.
//!
//! [fmt]: https://llvm.org/docs/BitCodeFormat.html#bitstream-container-format

pub mod bitcode;
pub mod bits;
pub mod bitstream;
pub mod error;
pub mod read;
pub mod warn;

pub use self::bitcode::Bitcode;
pub use self::error::{Error, Result};
pub use self::read::BitStreamReader;
pub use self::warn::{CollectingSink, Warning, WarningSink};
