//! The `.mind` container: a zip file holding one `map.json` entry at its root.

use std::io::{Cursor, Read, Seek, Write};

use domains::MAX_DEPTH;
use serde::{Deserialize, Serialize};
use serde_json::ser::PrettyFormatter;
use zip::result::ZipError;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use super::document::ArchiveDocument;
use super::ArchiveError;

/// Name of the single entry inside a `.mind` archive.
pub const DESCRIPTOR_NAME: &str = "map.json";

/// Deepest JSON nesting accepted in `map.json`.
///
/// A node at tree level `d` opens its object at nesting `2 * d`; the rest is
/// headroom for opaque values such as `style` or `task`.
pub const MAX_NESTING: usize = 2 * MAX_DEPTH + 32;

/// Packs `document` into an in-memory `.mind` archive.
pub fn pack_archive(document: &ArchiveDocument) -> Result<Vec<u8>, ArchiveError> {
    let cursor = write_archive(document, Cursor::new(Vec::new()))?;
    Ok(cursor.into_inner())
}

/// Packs `document` into `writer` and hands the writer back.
pub fn write_archive<W: Write + Seek>(document: &ArchiveDocument, writer: W) -> Result<W, ArchiveError> {
    let json = to_descriptor_json(document).map_err(ArchiveError::Encode)?;
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    let mut zip = ZipWriter::new(writer);
    zip.start_file(DESCRIPTOR_NAME, options)
        .map_err(ArchiveError::Pack)?;
    zip.write_all(&json)
        .map_err(|e| ArchiveError::Pack(ZipError::Io(e)))?;
    zip.finish().map_err(ArchiveError::Pack)
}

/// Reads the document out of an in-memory `.mind` archive.
pub fn unpack_archive(bytes: &[u8]) -> Result<ArchiveDocument, ArchiveError> {
    read_archive(Cursor::new(bytes))
}

/// Reads the document out of any seekable `.mind` source.
pub fn read_archive<R: Read + Seek>(reader: R) -> Result<ArchiveDocument, ArchiveError> {
    let mut archive = ZipArchive::new(reader).map_err(ArchiveError::InvalidArchive)?;
    let mut entry = match archive.by_name(DESCRIPTOR_NAME) {
        Ok(entry) => entry,
        Err(ZipError::FileNotFound) => return Err(ArchiveError::MissingDescriptor(DESCRIPTOR_NAME)),
        Err(e) => return Err(ArchiveError::InvalidArchive(e)),
    };

    let mut buffer = Vec::new();
    entry
        .read_to_end(&mut buffer)
        .map_err(|e| ArchiveError::InvalidArchive(ZipError::Io(e)))?;
    parse_descriptor(&buffer)
}

/// Parses `map.json` once its nesting is known to fit [`MAX_NESTING`].
///
/// serde_json's own recursion guard stops at 128 levels, well short of a
/// [`MAX_DEPTH`] tree, so it is replaced by the up-front scan.
fn parse_descriptor(json: &[u8]) -> Result<ArchiveDocument, ArchiveError> {
    if nesting_depth(json) > MAX_NESTING {
        return Err(ArchiveError::TooDeep { limit: MAX_NESTING });
    }
    let mut deserializer = serde_json::Deserializer::from_slice(json);
    deserializer.disable_recursion_limit();
    let document = ArchiveDocument::deserialize(&mut deserializer).map_err(ArchiveError::MalformedDocument)?;
    deserializer.end().map_err(ArchiveError::MalformedDocument)?;
    Ok(document)
}

/// Deepest bracket nesting in `json`, ignoring brackets inside strings.
fn nesting_depth(json: &[u8]) -> usize {
    let (mut depth, mut deepest) = (0usize, 0usize);
    let (mut in_string, mut escaped) = (false, false);
    for &byte in json {
        if in_string {
            match byte {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match byte {
            b'"' => in_string = true,
            b'{' | b'[' => {
                depth += 1;
                deepest = deepest.max(depth);
            }
            b'}' | b']' => depth = depth.saturating_sub(1),
            _ => {}
        }
    }
    deepest
}

// Four-space indentation; serde_json never escapes non-ASCII or '/'.
fn to_descriptor_json(document: &ArchiveDocument) -> serde_json::Result<Vec<u8>> {
    let mut out = Vec::new();
    let mut serializer = serde_json::Serializer::with_formatter(&mut out, PrettyFormatter::with_indent(b"    "));
    document.serialize(&mut serializer)?;
    Ok(out)
}
