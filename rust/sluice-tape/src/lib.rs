//! Positional checkpoint storage for data pipelines.
//!
//! A [`Tape`] is an ordered list of encoded values. Pipeline stages append their
//! state to the tape while recording a checkpoint and read it back, in the same
//! order, while reloading. The tape does not interpret the values it holds: each
//! record is an independent `bincode` image of one value, so a reader has to know
//! which type to expect at each position.
//!
//! ```text
//! record(buffer) record(offset) record(inner index)
//!      │              │                │
//!      ▼              ▼                ▼
//! ┌──────────┬──────────────┬──────────────────┐
//! │ record 0 │   record 1   │     record 2     │
//! └──────────┴──────────────┴──────────────────┘
//!      ▲
//!   read cursor
//! ```
//!
//! The whole tape can be turned into a byte image with [`Tape::to_bytes`] (or
//! streamed through [`Tape::write_to`]) and restored with [`Tape::from_bytes`] /
//! [`Tape::read_from`].

use std::io::{Read, Write};

use bincode::{Decode, Encode};
use sluice_common::{Error, Result};

/// Upper bound on the bytes a single decode may claim: one record, or a whole tape
/// image.
pub const MAX_DECODE_BYTES: usize = 1 << 30;

/// An append-only sequence of typed records with a sequential read cursor.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Tape {
    records: Vec<Vec<u8>>,
    position: usize,
}

impl Tape {
    pub fn new() -> Tape {
        Tape::default()
    }

    /// Appends `value` to the end of the tape.
    ///
    /// Recording never moves the read cursor.
    pub fn record<T>(&mut self, value: &T) -> Result<()>
    where
        T: Encode + ?Sized,
    {
        let bytes = bincode::encode_to_vec(value, Self::binc_config())?;
        self.records.push(bytes);
        Ok(())
    }

    /// Reads the record at the cursor as a `T` and advances the cursor.
    ///
    /// Fails with `TapeExhausted` if the cursor is at the end of the tape, and with
    /// `CorruptTape` if the record is not a complete encoding of a `T`. The cursor is
    /// not advanced on failure.
    pub fn read<T>(&mut self) -> Result<T>
    where
        T: Decode<()>,
    {
        let bytes = self
            .records
            .get(self.position)
            .ok_or_else(Error::tape_exhausted)?;
        let (value, consumed) = bincode::decode_from_slice::<T, _>(bytes, Self::binc_config())?;
        if consumed != bytes.len() {
            return Err(Error::corrupt_tape(format!(
                "record {} has {} trailing bytes",
                self.position,
                bytes.len() - consumed
            )));
        }
        self.position += 1;
        Ok(value)
    }

    /// Moves the read cursor back to the first record.
    pub fn rewind(&mut self) {
        self.position = 0;
    }

    /// Number of records on the tape.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Index of the next record to be read.
    pub fn position(&self) -> usize {
        self.position
    }

    /// Returns `true` if every record has been read.
    pub fn is_at_end(&self) -> bool {
        self.position >= self.records.len()
    }

    /// Serializes the records of the tape into a byte image.
    ///
    /// The read cursor is not part of the image; a tape restored with
    /// [`from_bytes`](Self::from_bytes) starts at its first record.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(bincode::encode_to_vec(&self.records, Self::binc_config())?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Tape> {
        let (records, consumed) =
            bincode::decode_from_slice::<Vec<Vec<u8>>, _>(bytes, Self::binc_config())?;
        if consumed != bytes.len() {
            return Err(Error::corrupt_tape("trailing bytes after tape image"));
        }
        Ok(Tape {
            records,
            position: 0,
        })
    }

    /// Writes the byte image of the tape to `writer`.
    pub fn write_to<W: Write>(&self, mut writer: W) -> Result<()> {
        bincode::encode_into_std_write(&self.records, &mut writer, Self::binc_config())?;
        writer
            .flush()
            .map_err(|e| Error::io("flush tape image", e))?;
        Ok(())
    }

    /// Reads a tape image previously written with [`write_to`](Self::write_to).
    pub fn read_from<R: Read>(mut reader: R) -> Result<Tape> {
        let records: Vec<Vec<u8>> =
            bincode::decode_from_std_read(&mut reader, Self::binc_config())?;
        Ok(Tape {
            records,
            position: 0,
        })
    }

    fn binc_config() -> impl bincode::config::Config {
        // Bounds what a corrupt length prefix can make the decoder allocate.
        bincode::config::standard()
            .with_fixed_int_encoding()
            .with_limit::<MAX_DECODE_BYTES>()
    }
}
