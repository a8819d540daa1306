//! CSV interchange format
//!
//! One row per device frame, eight integer columns separated by `", "`:
//! master `I0, Q0, I1, Q1` followed by slave `I0, Q0, I1, Q1`. Files are
//! opened in append mode so repeated captures accumulate in one file.

use super::demux::ChannelSet;
use crate::phase::PhaseError;
use crate::NUM_CHANNELS;
use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use thiserror::Error;

const COLUMNS: usize = 8;

#[derive(Error, Debug)]
pub enum CsvError {
    #[error("CSV I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("malformed CSV at line {line}: {reason}")]
    Malformed { line: usize, reason: String },

    #[error("CSV does not form a valid channel set: {0}")]
    Layout(#[from] PhaseError),
}

fn open_append(path: &Path) -> Result<BufWriter<File>, CsvError> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    Ok(BufWriter::with_capacity(64 * 1024, file))
}

/// Write rows from two raw device buffers in lockstep
///
/// Rows are emitted while both buffers still hold a whole frame.
///
/// # Returns
/// Number of rows written
pub fn write_rows<W: Write>(writer: &mut W, master: &[i16], slave: &[i16]) -> io::Result<usize> {
    let mut rows = 0;
    for (m, s) in master.chunks_exact(4).zip(slave.chunks_exact(4)) {
        writeln!(
            writer,
            "{}, {}, {}, {}, {}, {}, {}, {}",
            m[0], m[1], m[2], m[3], s[0], s[1], s[2], s[3]
        )?;
        rows += 1;
    }
    Ok(rows)
}

/// Append raw master and slave buffers to `path`
pub fn write_csv(path: &Path, master: &[i16], slave: &[i16]) -> Result<usize, CsvError> {
    let mut writer = open_append(path)?;
    let rows = write_rows(&mut writer, master, slave)?;
    writer.flush()?;
    tracing::debug!(path = %path.display(), rows, "Appended capture to CSV");
    Ok(rows)
}

/// Append a demultiplexed channel set to `path` in the same row layout
pub fn write_channel_set(path: &Path, channels: &ChannelSet) -> Result<usize, CsvError> {
    let mut writer = open_append(path)?;
    let ch = channels.channels();
    for i in (0..channels.len()).step_by(2) {
        writeln!(
            writer,
            "{}, {}, {}, {}, {}, {}, {}, {}",
            ch[0][i], ch[0][i + 1], ch[1][i], ch[1][i + 1],
            ch[2][i], ch[2][i + 1], ch[3][i], ch[3][i + 1]
        )?;
    }
    writer.flush()?;
    Ok(channels.pairs())
}

/// Parse one row into its eight values
fn parse_row(line: &str, number: usize) -> Result<[i16; COLUMNS], CsvError> {
    let mut row = [0i16; COLUMNS];
    let mut fields = line.split(',');
    for (column, slot) in row.iter_mut().enumerate() {
        let field = fields.next().ok_or_else(|| CsvError::Malformed {
            line: number,
            reason: format!("expected {} columns, found {}", COLUMNS, column),
        })?;
        *slot = field.trim().parse().map_err(|e| CsvError::Malformed {
            line: number,
            reason: format!("column {}: {:?}: {}", column + 1, field.trim(), e),
        })?;
    }
    if fields.next().is_some() {
        return Err(CsvError::Malformed {
            line: number,
            reason: format!("more than {} columns", COLUMNS),
        });
    }
    Ok(row)
}

/// Read a capture file back into a [`ChannelSet`]
///
/// Blank lines are skipped. Every other line must hold exactly eight i16
/// values.
pub fn read_csv(path: &Path) -> Result<ChannelSet, CsvError> {
    let reader = BufReader::new(File::open(path)?);
    let mut channels: [Vec<i16>; NUM_CHANNELS] = Default::default();

    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let row = parse_row(&line, index + 1)?;
        for (k, channel) in channels.iter_mut().enumerate() {
            channel.extend_from_slice(&row[k * 2..k * 2 + 2]);
        }
    }

    tracing::debug!(path = %path.display(), pairs = channels[0].len() / 2, "Read capture CSV");
    Ok(ChannelSet::from_array(channels)?)
}
