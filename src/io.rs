// ============================================================================
// PROJECT FILES - chunked binary container (.pfc)
// ============================================================================
//
// Layout:
//   header   16 bytes  magic "PFEC", version, width, height (u32 LE)
//   table    u32 count, then 16 bytes per chunk: tag, offset, compressed
//            size, uncompressed size
//   payloads zlib streams, at the offsets the table gives
//
// Chunks: one LAYR per layer (bottom → top), optional SELN (committed
// selection elements), optional ACTV (active layer index).

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use bincode::Options;
use flate2::Compression;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use image::RgbaImage;
use serde::{Deserialize, Serialize};

use crate::canvas::{BlendMode, Document, Layer};
use crate::selection::{PathElement, PathElementKind, SelectionPath, SelectionState};

pub const MAGIC: [u8; 4] = *b"PFEC";
pub const VERSION: u32 = 1;
pub const MAX_DIMENSION: u32 = 32_768;
pub const MAX_LAYERS: usize = 256;

const HEADER_SIZE: usize = 16;
const TABLE_ENTRY_SIZE: usize = 16;

const TAG_LAYER: [u8; 4] = *b"LAYR";
const TAG_SELECTION: [u8; 4] = *b"SELN";
const TAG_ACTIVE: [u8; 4] = *b"ACTV";

#[derive(Debug)]
pub enum ProjectError {
    Io(std::io::Error),
    Serialize(String),
    InvalidFormat(String),
}

impl std::fmt::Display for ProjectError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProjectError::Io(e) => write!(f, "I/O error: {}", e),
            ProjectError::Serialize(e) => write!(f, "Serialization error: {}", e),
            ProjectError::InvalidFormat(e) => write!(f, "Invalid format: {}", e),
        }
    }
}

impl std::error::Error for ProjectError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ProjectError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ProjectError {
    fn from(e: std::io::Error) -> Self {
        ProjectError::Io(e)
    }
}

impl From<Box<bincode::ErrorKind>> for ProjectError {
    fn from(e: Box<bincode::ErrorKind>) -> Self {
        ProjectError::Serialize(e.to_string())
    }
}

fn invalid(msg: impl Into<String>) -> ProjectError {
    ProjectError::InvalidFormat(msg.into())
}

/// Fixed-width little-endian encoding, bounded by `limit` bytes.
fn codec(limit: u64) -> impl Options + Copy {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .with_little_endian()
        .with_limit(limit)
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
struct Header {
    magic: [u8; 4],
    version: u32,
    width: u32,
    height: u32,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
struct ChunkEntry {
    tag: [u8; 4],
    offset: u32,
    compressed_size: u32,
    uncompressed_size: u32,
}

/// Everything in a LAYR chunk except the trailing raw RGBA bytes.
#[derive(Serialize, Deserialize, Debug, Clone)]
struct LayerMeta {
    name: String,
    visible: u8,
    opacity: f32,
    blend_mode: u8,
    width: u32,
    height: u32,
}

// ============================================================================
// WRITE
// ============================================================================

fn compress(data: &[u8]) -> Result<Vec<u8>, ProjectError> {
    let mut enc = ZlibEncoder::new(Vec::new(), Compression::default());
    enc.write_all(data)?;
    Ok(enc.finish()?)
}

fn encode_layer(layer: &Layer) -> Result<Vec<u8>, ProjectError> {
    let meta = LayerMeta {
        name: layer.name.clone(),
        visible: layer.visible as u8,
        opacity: layer.opacity,
        blend_mode: layer.blend_mode.to_u8(),
        width: layer.width(),
        height: layer.height(),
    };
    let mut out = codec(u64::MAX).serialize(&meta)?;
    out.extend_from_slice(layer.pixels.as_raw());
    Ok(out)
}

fn encode_selection(path: &SelectionPath) -> Result<Vec<u8>, ProjectError> {
    let elements: Vec<(u8, f32, f32)> = path
        .elements()
        .iter()
        .map(|e| (e.kind.to_u8(), e.x, e.y))
        .collect();
    Ok(codec(u64::MAX).serialize(&elements)?)
}

/// Serialize the document: every layer, the committed selection and the
/// active layer.
pub fn write_project<W: Write>(doc: &Document, mut out: W) -> Result<(), ProjectError> {
    let mut chunks: Vec<([u8; 4], Vec<u8>)> = Vec::with_capacity(doc.layer_count() + 2);
    for layer in doc.layers() {
        chunks.push((TAG_LAYER, encode_layer(layer)?));
    }
    if doc.has_selection() {
        chunks.push((TAG_SELECTION, encode_selection(doc.selection().path())?));
    }
    if let Some(index) = doc.active_layer_id().and_then(|id| doc.index_of(id)) {
        chunks.push((TAG_ACTIVE, codec(u64::MAX).serialize(&(index as u32))?));
    }

    let opts = codec(u64::MAX);
    let header = Header {
        magic: MAGIC,
        version: VERSION,
        width: doc.width(),
        height: doc.height(),
    };
    let mut offset = HEADER_SIZE + 4 + chunks.len() * TABLE_ENTRY_SIZE;
    let mut table = Vec::with_capacity(chunks.len());
    let mut payloads = Vec::with_capacity(chunks.len());
    for (tag, raw) in &chunks {
        let packed = compress(raw)?;
        let entry = ChunkEntry {
            tag: *tag,
            offset: u32::try_from(offset).map_err(|_| invalid("project exceeds 4 GiB"))?,
            compressed_size: u32::try_from(packed.len()).map_err(|_| invalid("chunk exceeds 4 GiB"))?,
            uncompressed_size: u32::try_from(raw.len()).map_err(|_| invalid("chunk exceeds 4 GiB"))?,
        };
        offset += packed.len();
        table.push(entry);
        payloads.push(packed);
    }

    out.write_all(&opts.serialize(&header)?)?;
    out.write_all(&opts.serialize(&(table.len() as u32))?)?;
    for entry in &table {
        out.write_all(&opts.serialize(entry)?)?;
    }
    for packed in &payloads {
        out.write_all(packed)?;
    }
    out.flush()?;
    Ok(())
}

pub fn save_project(doc: &Document, path: &Path) -> Result<(), ProjectError> {
    let file = File::create(path)?;
    let result = write_project(doc, BufWriter::new(file));
    match &result {
        Ok(()) => log_info!("Saved project {} ({}×{}, {} layers)", path.display(), doc.width(), doc.height(), doc.layer_count()),
        Err(e) => log_err!("Failed to save project {}: {}", path.display(), e),
    }
    result
}

// ============================================================================
// READ
// ============================================================================

fn decompress(raw: &[u8], entry: &ChunkEntry) -> Result<Vec<u8>, ProjectError> {
    let start = entry.offset as usize;
    let end = start
        .checked_add(entry.compressed_size as usize)
        .filter(|end| *end <= raw.len())
        .ok_or_else(|| invalid("chunk extends past end of file"))?;
    let expected = entry.uncompressed_size as usize;
    let mut out = Vec::with_capacity(expected.min(64 * 1024 * 1024));
    ZlibDecoder::new(&raw[start..end])
        .take(expected as u64 + 1)
        .read_to_end(&mut out)?;
    if out.len() != expected {
        return Err(invalid(format!(
            "chunk {} inflated to {} bytes, expected {}",
            String::from_utf8_lossy(&entry.tag),
            out.len(),
            expected
        )));
    }
    Ok(out)
}

fn decode_layer(doc: &mut Document, payload: &[u8]) -> Result<Layer, ProjectError> {
    let mut rest = payload;
    let meta: LayerMeta = codec(payload.len() as u64).deserialize_from(&mut rest)?;
    if meta.width != doc.width() || meta.height != doc.height() {
        return Err(invalid(format!(
            "layer '{}' is {}×{} on a {}×{} canvas",
            meta.name,
            meta.width,
            meta.height,
            doc.width(),
            doc.height()
        )));
    }
    let expected = meta.width as usize * meta.height as usize * 4;
    if rest.len() != expected {
        return Err(invalid(format!(
            "layer '{}' holds {} pixel bytes, expected {}",
            meta.name,
            rest.len(),
            expected
        )));
    }
    let pixels = RgbaImage::from_raw(meta.width, meta.height, rest.to_vec())
        .ok_or_else(|| invalid(format!("layer '{}' buffer mismatch", meta.name)))?;
    let id = doc.alloc_layer_id();
    let mut layer = Layer::from_image(id, meta.name, pixels);
    layer.visible = meta.visible != 0;
    layer.opacity = meta.opacity.clamp(0.0, 1.0);
    layer.blend_mode = BlendMode::from_u8(meta.blend_mode);
    Ok(layer)
}

fn decode_selection(payload: &[u8]) -> Result<SelectionPath, ProjectError> {
    let raw: Vec<(u8, f32, f32)> = codec(payload.len() as u64).deserialize(payload)?;
    let elements = raw
        .into_iter()
        .map(|(kind, x, y)| {
            PathElementKind::from_u8(kind)
                .map(|kind| PathElement::new(kind, x, y))
                .ok_or_else(|| invalid(format!("unknown path element kind {}", kind)))
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(SelectionPath::from_elements(elements))
}

/// Parse a project. Unknown chunk tags are skipped.
pub fn read_project<R: Read>(mut input: R) -> Result<Document, ProjectError> {
    let mut raw = Vec::new();
    input.read_to_end(&mut raw)?;
    if raw.len() < HEADER_SIZE + 4 {
        return Err(invalid("file too small"));
    }

    let opts = codec(raw.len() as u64);
    let header: Header = opts.deserialize(&raw[..HEADER_SIZE])?;
    if header.magic != MAGIC {
        return Err(invalid("not a project file (bad magic)"));
    }
    if header.version != VERSION {
        return Err(invalid(format!("unsupported version {}", header.version)));
    }
    if header.width == 0 || header.height == 0 || header.width > MAX_DIMENSION || header.height > MAX_DIMENSION {
        return Err(invalid(format!("invalid canvas size {}×{}", header.width, header.height)));
    }

    let count: u32 = opts.deserialize(&raw[HEADER_SIZE..HEADER_SIZE + 4])?;
    let table_start = HEADER_SIZE + 4;
    let table_end = table_start + count as usize * TABLE_ENTRY_SIZE;
    if count as usize > MAX_LAYERS + 2 || table_end > raw.len() {
        return Err(invalid(format!("chunk table of {} entries does not fit", count)));
    }
    let entries = raw[table_start..table_end]
        .chunks_exact(TABLE_ENTRY_SIZE)
        .map(|bytes| opts.deserialize::<ChunkEntry>(bytes))
        .collect::<Result<Vec<_>, _>>()?;

    let mut doc = Document::empty(header.width, header.height);
    let mut layers = Vec::new();
    let mut selection = None;
    let mut active = None;
    for entry in &entries {
        match entry.tag {
            TAG_LAYER => {
                if layers.len() >= MAX_LAYERS {
                    return Err(invalid(format!("more than {} layers", MAX_LAYERS)));
                }
                let payload = decompress(&raw, entry)?;
                layers.push(decode_layer(&mut doc, &payload)?);
            }
            TAG_SELECTION => {
                let payload = decompress(&raw, entry)?;
                selection = Some(decode_selection(&payload)?);
            }
            TAG_ACTIVE => {
                let payload = decompress(&raw, entry)?;
                let index: u32 = codec(payload.len() as u64).deserialize(&payload)?;
                active = Some(index as usize);
            }
            other => log_warn!("read_project: skipping unknown chunk {}", String::from_utf8_lossy(&other)),
        }
    }
    if layers.is_empty() {
        return Err(invalid("project has no layers"));
    }

    let active_id = active
        .and_then(|i| layers.get(i))
        .or_else(|| layers.last())
        .map(|l| l.id);
    doc.replace_layers(layers, active_id);
    if let Some(path) = selection {
        doc.restore_selection(&SelectionState::from_path(path));
    }
    Ok(doc)
}

pub fn load_project(path: &Path) -> Result<Document, ProjectError> {
    let file = File::open(path)?;
    let result = read_project(BufReader::new(file));
    match &result {
        Ok(doc) => log_info!(
            "Loaded project {} ({}×{}, {} layers)",
            path.display(),
            doc.width(),
            doc.height(),
            doc.layer_count()
        ),
        Err(e) => log_err!("Failed to load project {}: {}", path.display(), e),
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selection::SelectionMode;
    use egui::pos2;
    use image::Rgba;

    fn sample_doc() -> Document {
        let mut doc = Document::new(12, 9);
        let bg = doc.active_layer_id().unwrap();
        doc.layer_mut(bg).unwrap().pixels.put_pixel(3, 4, Rgba([1, 2, 3, 4]));
        let top = doc.add_layer("Ink");
        {
            let layer = doc.layer_mut(top).unwrap();
            layer.opacity = 0.25;
            layer.visible = false;
            layer.blend_mode = BlendMode::Multiply;
            layer.pixels.put_pixel(11, 8, Rgba([200, 100, 50, 255]));
        }
        doc.set_active_layer(bg);
        doc.apply_selection(&SelectionPath::rect(pos2(1.0, 1.0), pos2(6.0, 5.0)), SelectionMode::Replace);
        doc.apply_selection(&SelectionPath::ellipse(pos2(2.0, 2.0), pos2(4.0, 4.0)), SelectionMode::Subtract);
        doc
    }

    fn encode(doc: &Document) -> Vec<u8> {
        let mut bytes = Vec::new();
        write_project(doc, &mut bytes).unwrap();
        bytes
    }

    #[test]
    fn header_layout_is_fixed() {
        let bytes = encode(&Document::new(7, 5));
        assert_eq!(&bytes[0..4], b"PFEC");
        assert_eq!(&bytes[4..8], &1u32.to_le_bytes());
        assert_eq!(&bytes[8..12], &7u32.to_le_bytes());
        assert_eq!(&bytes[12..16], &5u32.to_le_bytes());
        // One layer + active index.
        assert_eq!(&bytes[16..20], &2u32.to_le_bytes());
        assert_eq!(&bytes[20..24], b"LAYR");
    }

    #[test]
    fn document_survives_round_trip() {
        let doc = sample_doc();
        let loaded = read_project(encode(&doc).as_slice()).unwrap();
        assert_eq!((loaded.width(), loaded.height()), (12, 9));
        assert_eq!(loaded.layer_count(), 2);
        let names: Vec<_> = loaded.layers().map(|l| l.name.clone()).collect();
        assert_eq!(names, vec!["Background", "Ink"]);
        let ink = loaded.layer_at(1).unwrap();
        assert_eq!(ink.opacity, 0.25);
        assert!(!ink.visible);
        assert_eq!(ink.blend_mode, BlendMode::Multiply);
        assert_eq!(ink.pixel(11, 8), Some(Rgba([200, 100, 50, 255])));
        assert_eq!(loaded.layer_at(0).unwrap().pixel(3, 4), Some(Rgba([1, 2, 3, 4])));
        assert_eq!(loaded.active_layer().unwrap().name, "Background");
        assert_eq!(loaded.selection().path(), doc.selection().path());
        assert_eq!(loaded.selection().shape(), doc.selection().shape());
    }

    #[test]
    fn rejects_bad_magic_and_version() {
        let mut bytes = encode(&Document::new(2, 2));
        bytes[0] = b'X';
        assert!(matches!(read_project(bytes.as_slice()), Err(ProjectError::InvalidFormat(_))));

        let mut bytes = encode(&Document::new(2, 2));
        bytes[4] = 9;
        assert!(matches!(read_project(bytes.as_slice()), Err(ProjectError::InvalidFormat(_))));
    }

    #[test]
    fn rejects_truncated_files() {
        let bytes = encode(&sample_doc());
        assert!(read_project(&bytes[..10]).is_err());
        assert!(read_project(&bytes[..bytes.len() - 5]).is_err());
    }

    #[test]
    fn rejects_oversized_canvas() {
        let mut bytes = encode(&Document::new(2, 2));
        bytes[8..12].copy_from_slice(&(MAX_DIMENSION + 1).to_le_bytes());
        assert!(matches!(read_project(bytes.as_slice()), Err(ProjectError::InvalidFormat(_))));
    }

    #[test]
    fn rejects_layer_sized_unlike_canvas() {
        // A 4×3 layer under a header that claims 3×4: same byte count, wrong shape.
        let mut bytes = encode(&Document::new(4, 3));
        bytes[8..12].copy_from_slice(&3u32.to_le_bytes());
        bytes[12..16].copy_from_slice(&4u32.to_le_bytes());
        match read_project(bytes.as_slice()) {
            Err(ProjectError::InvalidFormat(msg)) => assert!(msg.contains("4×3 on a 3×4")),
            other => panic!("expected InvalidFormat, got {:?}", other.map(|d| d.width())),
        }
    }
}
