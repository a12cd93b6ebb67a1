//! Tape persistence helpers.

use std::io::{Seek, SeekFrom};

use sluice_tape::Tape;

/// Writes `tape` to a temporary file and reads it back, rewound.
pub fn persist_and_reload(tape: &Tape) -> anyhow::Result<Tape> {
    let mut file = tempfile::tempfile()?;
    tape.write_to(&mut file)?;
    file.seek(SeekFrom::Start(0))?;
    let tape = Tape::read_from(&mut file)?;
    Ok(tape)
}
