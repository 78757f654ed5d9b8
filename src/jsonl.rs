//! JSONL encoding of recorded snapshots, one JSON object per line.
//!
//! The engine itself never touches the filesystem; callers hand in whatever
//! writer or reader they want the run to go through.

use std::io::{self, BufRead, Write};

use serde::Serialize;

use crate::snapshot::SimulationSnapshot;

/// Write an iterator of serializable items as JSONL (one JSON object per line).
pub fn write_jsonl<T: Serialize>(
    writer: &mut impl Write,
    items: impl Iterator<Item = T>,
) -> io::Result<()> {
    for item in items {
        serde_json::to_writer(&mut *writer, &item)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()
}

/// Write snapshots in the order given.
pub fn write_snapshots(writer: &mut impl Write, snapshots: &[SimulationSnapshot]) -> io::Result<()> {
    write_jsonl(writer, snapshots.iter())
}

/// Read back snapshots written by [`write_snapshots`]. Blank lines are skipped.
pub fn read_snapshots(reader: impl BufRead) -> io::Result<Vec<SimulationSnapshot>> {
    let mut snapshots = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        snapshots.push(serde_json::from_str(&line)?);
    }
    Ok(snapshots)
}
