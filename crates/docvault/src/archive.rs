//! Streaming tar + gzip archives of encoded documents
//!
//! An archive holds one `<collection>.jsonl` entry per collection, followed by
//! a `manifest.json` entry. Entries are written and read strictly forward:
//! the writer spools each entry to an anonymous temporary file (tar headers
//! carry the entry size up front) and the reader hands out lines as the
//! decompressed stream produces them.

use docvault_core::error::{Result, VaultError};
use docvault_core::document::codec::LINE_EXTENSION;
use docvault_core::types::{ArchiveManifest, MANIFEST_ENTRY};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::io::{self, BufRead, BufReader, BufWriter, Read, Seek, SeekFrom, Write};

/// Longest entry name that fits a plain ustar header
const USTAR_NAME_LIMIT: usize = 100;

/// Non-fatal diagnostics raised while writing an archive
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ArchiveWarning {
    /// The collection had no documents
    EmptyEntry { entry: String },

    /// The entry name needed the GNU long-name extension
    LongEntryName { entry: String },
}

impl fmt::Display for ArchiveWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyEntry { entry } => write!(f, "entry {} is empty", entry),
            Self::LongEntryName { entry } => {
                write!(f, "entry name {} uses the GNU long-name extension", entry)
            }
        }
    }
}

/// What a finished writer hands back
pub struct ArchiveOutcome<W> {
    /// The sink, with all compressed bytes written to it
    pub sink: W,

    /// Documents written per collection
    pub entries: BTreeMap<String, u64>,

    pub warnings: Vec<ArchiveWarning>,
}

/// Entry name of a collection
pub fn entry_name(collection: &str) -> String {
    format!("{}.{}", collection, LINE_EXTENSION)
}

/// Collection name of a data entry: the entry name without its `.jsonl` suffix
///
/// Slashes are part of the name, so `tenant/users.jsonl` restores into
/// `tenant/users`. Returns `None` for non-data entries.
pub fn collection_name(entry: &str) -> Option<&str> {
    let entry = entry.strip_prefix("./").unwrap_or(entry);
    entry
        .strip_suffix(LINE_EXTENSION)?
        .strip_suffix('.')
        .filter(|name| !name.is_empty() && !name.ends_with('/'))
}

fn archive_err(context: &str, e: impl fmt::Display) -> VaultError {
    VaultError::Archive(format!("{}: {}", context, e))
}

/// Writes collections into a compressed archive
pub struct ArchiveWriter<W: Write> {
    builder: tar::Builder<GzEncoder<W>>,
    entries: BTreeMap<String, u64>,
    warnings: Vec<ArchiveWarning>,
}

impl<W: Write> ArchiveWriter<W> {
    /// Start an archive on `sink` with the given gzip level (0-9)
    pub fn new(sink: W, level: u32) -> Self {
        let encoder = GzEncoder::new(sink, Compression::new(level.min(9)));
        Self {
            builder: tar::Builder::new(encoder),
            entries: BTreeMap::new(),
            warnings: Vec::new(),
        }
    }

    /// Append one collection as `<collection>.jsonl`
    ///
    /// Lines are spooled to a temporary file as the iterator yields them. An
    /// error from the iterator aborts the entry and is returned unchanged.
    pub fn append_entry<I>(&mut self, collection: &str, lines: I) -> Result<u64>
    where
        I: IntoIterator<Item = Result<String>>,
    {
        let name = entry_name(collection);
        let spool = tempfile::tempfile().map_err(|e| archive_err("creating spool file", e))?;

        let mut out = BufWriter::new(spool);
        let mut count = 0u64;
        for line in lines {
            let line = line?;
            out.write_all(line.as_bytes())
                .and_then(|_| out.write_all(b"\n"))
                .map_err(|e| archive_err(&format!("spooling {}", name), e))?;
            count += 1;
        }

        let mut spool = out
            .into_inner()
            .map_err(|e| archive_err(&format!("spooling {}", name), e.error()))?;
        let size = spool
            .stream_position()
            .and_then(|size| spool.seek(SeekFrom::Start(0)).map(|_| size))
            .map_err(|e| archive_err(&format!("rewinding {}", name), e))?;

        if name.len() > USTAR_NAME_LIMIT {
            self.warn(ArchiveWarning::LongEntryName {
                entry: name.clone(),
            });
        }
        if count == 0 {
            self.warn(ArchiveWarning::EmptyEntry {
                entry: name.clone(),
            });
        }

        let mut header = tar::Header::new_gnu();
        header.set_size(size);
        header.set_mode(0o644);
        header.set_entry_type(tar::EntryType::Regular);
        self.builder
            .append_data(&mut header, &name, spool)
            .map_err(|e| archive_err(&format!("writing {}", name), e))?;

        *self.entries.entry(collection.to_string()).or_insert(0) += count;
        tracing::debug!(entry = %name, documents = count, bytes = size, "archived entry");
        Ok(count)
    }

    /// Write the trailing manifest and flush all compressed output into the sink
    pub fn finish(mut self) -> Result<ArchiveOutcome<W>> {
        let warnings: Vec<String> = self.warnings.iter().map(ToString::to_string).collect();
        let manifest = ArchiveManifest::new(self.entries.clone(), warnings);
        let body = serde_json::to_vec_pretty(&manifest)?;

        let mut header = tar::Header::new_gnu();
        header.set_size(body.len() as u64);
        header.set_mode(0o644);
        header.set_entry_type(tar::EntryType::Regular);
        self.builder
            .append_data(&mut header, MANIFEST_ENTRY, body.as_slice())
            .map_err(|e| archive_err("writing manifest", e))?;

        let encoder = self
            .builder
            .into_inner()
            .map_err(|e| archive_err("finishing tar stream", e))?;
        let sink = encoder
            .finish()
            .map_err(|e| archive_err("finishing gzip stream", e))?;

        Ok(ArchiveOutcome {
            sink,
            entries: self.entries,
            warnings: self.warnings,
        })
    }

    fn warn(&mut self, warning: ArchiveWarning) {
        tracing::warn!(%warning, "archive warning");
        self.warnings.push(warning);
    }
}

/// Reads the data entries of a compressed archive
pub struct ArchiveReader<R: Read> {
    archive: tar::Archive<GzDecoder<R>>,
}

impl<R: Read> ArchiveReader<R> {
    pub fn new(source: R) -> Self {
        Self {
            archive: tar::Archive::new(GzDecoder::new(source)),
        }
    }

    /// Forward-only sequence of `*.jsonl` entries
    ///
    /// Can be walked once. Other entries are skipped without being buffered.
    pub fn entries(&mut self) -> Result<DataEntries<'_, R>> {
        let inner = self
            .archive
            .entries()
            .map_err(|e| archive_err("reading archive", e))?;
        Ok(DataEntries { inner })
    }
}

pub struct DataEntries<'a, R: 'a + Read> {
    inner: tar::Entries<'a, GzDecoder<R>>,
}

impl<'a, R: 'a + Read> Iterator for DataEntries<'a, R> {
    type Item = Result<DataEntry<'a, R>>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let entry = match self.inner.next()? {
                Ok(entry) => entry,
                Err(e) => return Some(Err(archive_err("reading entry header", e))),
            };

            let name = match entry.path() {
                Ok(path) => path.to_string_lossy().into_owned(),
                Err(e) => return Some(Err(archive_err("reading entry name", e))),
            };

            if !entry.header().entry_type().is_file() {
                continue;
            }
            let Some(collection) = collection_name(&name).map(str::to_string) else {
                tracing::debug!(entry = %name, "skipping non-data entry");
                continue;
            };

            return Some(Ok(DataEntry {
                name,
                collection,
                entry,
            }));
        }
    }
}

/// One `<collection>.jsonl` entry
pub struct DataEntry<'a, R: 'a + Read> {
    name: String,
    collection: String,
    entry: tar::Entry<'a, GzDecoder<R>>,
}

impl<'a, R: 'a + Read> DataEntry<'a, R> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Non-empty lines with their 1-based line number
    pub fn lines(self) -> EntryLines<'a, R> {
        EntryLines {
            name: self.name,
            reader: BufReader::new(self.entry),
            line_no: 0,
            buf: String::new(),
        }
    }
}

pub struct EntryLines<'a, R: 'a + Read> {
    name: String,
    reader: BufReader<tar::Entry<'a, GzDecoder<R>>>,
    line_no: u64,
    buf: String,
}

impl<'a, R: 'a + Read> Iterator for EntryLines<'a, R> {
    type Item = Result<(u64, String)>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            self.buf.clear();
            match self.reader.read_line(&mut self.buf) {
                Ok(0) => return None,
                Ok(_) => {
                    self.line_no += 1;
                    let line = self.buf.trim_end_matches(['\n', '\r']);
                    if line.is_empty() {
                        continue;
                    }
                    return Some(Ok((self.line_no, line.to_string())));
                }
                Err(e) if e.kind() == io::ErrorKind::InvalidData => {
                    return Some(Err(archive_err(
                        &format!("{} line {}", self.name, self.line_no + 1),
                        "line is not valid UTF-8",
                    )))
                }
                Err(e) => {
                    return Some(Err(archive_err(&format!("reading {}", self.name), e)));
                }
            }
        }
    }
}
