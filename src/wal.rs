use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::model::Event;

/// Upper bound on one encoded event. Notes cap at 1000 characters, so a real
/// entry is a few KiB; anything larger is a corrupt length prefix.
pub const MAX_ENTRY_LEN: usize = 64 * 1024;

const HEADER_LEN: usize = 4;
const CRC_LEN: usize = 4;

/// Encode a single event to [len][bincode][crc32] format.
fn encode_event(writer: &mut impl Write, event: &Event) -> io::Result<()> {
    let payload =
        bincode::serialize(event).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    if payload.len() > MAX_ENTRY_LEN {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("event of {} bytes exceeds the {MAX_ENTRY_LEN} byte entry limit", payload.len()),
        ));
    }
    writer.write_all(&(payload.len() as u32).to_le_bytes())?;
    writer.write_all(&payload)?;
    writer.write_all(&crc32fast::hash(&payload).to_le_bytes())?;
    Ok(())
}

/// One entry read from the front of a byte slice.
#[derive(Debug)]
enum Frame {
    /// A checked event and the number of bytes it occupied.
    Event(Event, usize),
    /// The slice ends mid-entry: a crash during the last write.
    Torn,
    /// Bad length, checksum or payload.
    Corrupt,
}

fn decode_frame(buf: &[u8]) -> Frame {
    let Some((header, rest)) = buf.split_first_chunk::<HEADER_LEN>() else {
        return Frame::Torn;
    };
    let len = u32::from_le_bytes(*header) as usize;
    if len == 0 || len > MAX_ENTRY_LEN {
        return Frame::Corrupt;
    }
    if rest.len() < len + CRC_LEN {
        return Frame::Torn;
    }
    let (payload, rest) = rest.split_at(len);
    let crc = u32::from_le_bytes([rest[0], rest[1], rest[2], rest[3]]);
    if crc != crc32fast::hash(payload) {
        return Frame::Corrupt;
    }
    match bincode::deserialize::<Event>(payload) {
        Ok(event) => Frame::Event(event, HEADER_LEN + len + CRC_LEN),
        Err(_) => Frame::Corrupt,
    }
}

/// Result of reading a log back from disk.
#[derive(Debug, Default)]
pub struct Replay {
    pub events: Vec<Event>,
    /// Length of the prefix holding `events`. Everything past it is garbage.
    pub valid_len: u64,
    /// Bytes after `valid_len`.
    pub discarded: u64,
}

/// Append-only log of appointment events.
///
/// Format per entry: `[u32: len][bincode: Event][u32: crc32]`, where `len`
/// counts the payload only. Replay keeps the longest prefix of intact entries;
/// [`Wal::recover`] cuts the file back to that prefix before appending, so an
/// entry written after a crash is never stranded behind a torn one.
pub struct Wal {
    writer: BufWriter<File>,
    path: PathBuf,
    appends_since_compact: u64,
}

impl Wal {
    /// Open (or create) the log at `path` for appends, as is.
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            writer: BufWriter::new(file),
            path: path.to_path_buf(),
            appends_since_compact: 0,
        })
    }

    /// Replay `path`, drop any torn or corrupt tail from the file, then open
    /// it for appends.
    pub fn recover(path: &Path) -> io::Result<(Self, Vec<Event>)> {
        let replay = Self::replay(path)?;
        if replay.discarded > 0 {
            warn!(
                "discarding {} trailing bytes of {} after {} intact events",
                replay.discarded,
                path.display(),
                replay.events.len()
            );
            let file = OpenOptions::new().write(true).open(path)?;
            file.set_len(replay.valid_len)?;
            file.sync_all()?;
        }
        Ok((Self::open(path)?, replay.events))
    }

    /// Read every intact event from `path` without touching the file.
    /// A missing file is an empty log.
    pub fn replay(path: &Path) -> io::Result<Replay> {
        let bytes = match fs::read(path) {
            Ok(b) => b,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Replay::default()),
            Err(e) => return Err(e),
        };

        let mut events = Vec::new();
        let mut offset = 0;
        while offset < bytes.len() {
            match decode_frame(&bytes[offset..]) {
                Frame::Event(event, used) => {
                    events.push(event);
                    offset += used;
                }
                Frame::Torn | Frame::Corrupt => break,
            }
        }

        Ok(Replay {
            events,
            valid_len: offset as u64,
            discarded: (bytes.len() - offset) as u64,
        })
    }

    /// Append one event and fsync. Production code batches with
    /// `append_buffered` + `flush_sync` instead.
    #[cfg(test)]
    pub fn append(&mut self, event: &Event) -> io::Result<()> {
        self.append_buffered(event)?;
        self.flush_sync()
    }

    /// Append to the buffer without flushing. Call `flush_sync()` after the batch.
    pub fn append_buffered(&mut self, event: &Event) -> io::Result<()> {
        encode_event(&mut self.writer, event)?;
        self.appends_since_compact += 1;
        Ok(())
    }

    /// Flush the buffer and fsync the file.
    pub fn flush_sync(&mut self) -> io::Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn appends_since_compact(&self) -> u64 {
        self.appends_since_compact
    }

    /// Write the live snapshot to `<wal>.tmp` and fsync it.
    pub fn write_compact_file(path: &Path, events: &[Event]) -> io::Result<()> {
        let mut writer = BufWriter::new(File::create(path.with_extension("wal.tmp"))?);
        for event in events {
            encode_event(&mut writer, event)?;
        }
        writer.flush()?;
        writer.get_ref().sync_all()
    }

    /// Move the snapshot over the log and continue appending to it.
    pub fn swap_compact_file(&mut self) -> io::Result<()> {
        fs::rename(self.path.with_extension("wal.tmp"), &self.path)?;
        *self = Self::open(&self.path)?;
        Ok(())
    }

    #[cfg(test)]
    pub fn compact(&mut self, events: &[Event]) -> io::Result<()> {
        Self::write_compact_file(&self.path, events)?;
        self.swap_compact_file()
    }
}
