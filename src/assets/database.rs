//! Persistent record of source assets and their processed outputs
//!
//! File layout, all integers little-endian:
//!
//! ```text
//! magic   b"ZDLA"
//! version u32
//! count   u32
//! count x record:
//!     path             u32 length + UTF-8 bytes
//!     type             u8
//!     state            u8
//!     hash             u64
//!     source_modified  u64
//!     processed_at     u64
//!     outputs          u32 count, each u32 length + UTF-8 bytes
//! ```
//!
//! Records are written sorted by path.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use xxhash_rust::xxh3::xxh3_64;

pub const MAGIC: [u8; 4] = *b"ZDLA";
pub const VERSION: u32 = 1;

/// Longest string the reader accepts, so a corrupt length cannot trigger
/// a huge allocation
const MAX_STRING_LEN: usize = 1 << 20;

#[derive(Error, Debug)]
pub enum AssetDbError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Not an asset database")]
    BadMagic,
    #[error("Unsupported asset database version {0}")]
    UnsupportedVersion(u32),
    #[error("Invalid asset type code {0}")]
    InvalidType(u8),
    #[error("Invalid asset state code {0}")]
    InvalidState(u8),
    #[error("Stored string is not valid UTF-8")]
    InvalidUtf8,
    #[error("String of {0} bytes exceeds the format limit")]
    StringTooLong(usize),
    #[error("Unknown asset '{0}'")]
    UnknownAsset(String),
}

pub type AssetDbResult<T> = Result<T, AssetDbError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum AssetType {
    Unknown = 0,
    Texture = 1,
    Mesh = 2,
    Shader = 3,
    Audio = 4,
    Material = 5,
    Scene = 6,
}

impl AssetType {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Self::Unknown),
            1 => Some(Self::Texture),
            2 => Some(Self::Mesh),
            3 => Some(Self::Shader),
            4 => Some(Self::Audio),
            5 => Some(Self::Material),
            6 => Some(Self::Scene),
            _ => None,
        }
    }

    /// Classify a source file by extension, case-insensitively
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        let ext = path
            .as_ref()
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match ext.as_deref() {
            Some("png" | "jpg" | "jpeg" | "tga" | "bmp" | "hdr") => Self::Texture,
            Some("obj" | "gltf" | "glb") => Self::Mesh,
            Some("wgsl" | "glsl" | "vert" | "frag" | "comp" | "spv") => Self::Shader,
            Some("wav" | "ogg" | "mp3" | "flac") => Self::Audio,
            Some("mat") => Self::Material,
            Some("scene") => Self::Scene,
            _ => Self::Unknown,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AssetState {
    Pending = 0,
    Processing = 1,
    Processed = 2,
    Failed = 3,
}

impl AssetState {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Self::Pending),
            1 => Some(Self::Processing),
            2 => Some(Self::Processed),
            3 => Some(Self::Failed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetRecord {
    /// Source path, also the database key
    pub path: String,
    pub asset_type: AssetType,
    pub state: AssetState,
    /// xxh3 of the source bytes at the last processing attempt
    pub hash: u64,
    /// Source modification time, seconds since the Unix epoch
    pub source_modified: u64,
    /// Seconds since the Unix epoch, 0 if never processed
    pub processed_at: u64,
    pub outputs: Vec<String>,
}

impl AssetRecord {
    pub fn new(path: &str, asset_type: AssetType) -> Self {
        Self {
            path: path.to_string(),
            asset_type,
            state: AssetState::Pending,
            hash: 0,
            source_modified: 0,
            processed_at: 0,
            outputs: Vec::new(),
        }
    }
}

/// Hash used to detect changed sources
pub fn content_hash(bytes: &[u8]) -> u64 {
    xxh3_64(bytes)
}

pub(crate) fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssetDatabase {
    records: HashMap<String, AssetRecord>,
}

impl AssetDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, path: &str) -> Option<&AssetRecord> {
        self.records.get(path)
    }

    /// Records sorted by path
    pub fn records(&self) -> Vec<&AssetRecord> {
        let mut records: Vec<_> = self.records.values().collect();
        records.sort_by(|a, b| a.path.cmp(&b.path));
        records
    }

    /// Track `path`. A known path keeps its record; only a type change
    /// resets it to pending.
    pub fn register(&mut self, path: &str, asset_type: AssetType) -> &AssetRecord {
        let record = self
            .records
            .entry(path.to_string())
            .or_insert_with(|| AssetRecord::new(path, asset_type));
        if record.asset_type != asset_type {
            log::debug!("Asset '{}' changed type to {:?}", path, asset_type);
            *record = AssetRecord::new(path, asset_type);
        }
        record
    }

    pub fn remove(&mut self, path: &str) -> Option<AssetRecord> {
        self.records.remove(path)
    }

    /// True when `path` is unknown, was never processed successfully, or
    /// its content changed since the last successful run. An unchanged
    /// modification time counts as unchanged content without hashing.
    pub fn needs_processing(&self, path: &str, bytes: &[u8], modified: u64) -> bool {
        let Some(record) = self.records.get(path) else {
            return true;
        };
        if record.state != AssetState::Processed {
            return true;
        }
        if modified == record.source_modified {
            return false;
        }
        content_hash(bytes) != record.hash
    }

    pub fn mark_processing(&mut self, path: &str) -> AssetDbResult<()> {
        let record = self.record_mut(path)?;
        record.state = AssetState::Processing;
        Ok(())
    }

    pub fn mark_processed(
        &mut self,
        path: &str,
        bytes: &[u8],
        source_modified: u64,
        outputs: Vec<String>,
    ) -> AssetDbResult<()> {
        let record = self.record_mut(path)?;
        record.state = AssetState::Processed;
        record.hash = content_hash(bytes);
        record.source_modified = source_modified;
        record.processed_at = unix_now();
        record.outputs = outputs;
        Ok(())
    }

    /// Keep the previous outputs but force reprocessing next time
    pub fn mark_failed(&mut self, path: &str) -> AssetDbResult<()> {
        let record = self.record_mut(path)?;
        record.state = AssetState::Failed;
        Ok(())
    }

    fn record_mut(&mut self, path: &str) -> AssetDbResult<&mut AssetRecord> {
        self.records
            .get_mut(path)
            .ok_or_else(|| AssetDbError::UnknownAsset(path.to_string()))
    }

    pub fn save(&self, path: impl AsRef<Path>) -> AssetDbResult<()> {
        let mut writer = BufWriter::new(File::create(path.as_ref())?);
        self.write_to(&mut writer)?;
        writer.flush()?;
        log::debug!("Saved {} asset records to {:?}", self.len(), path.as_ref());
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> AssetDbResult<Self> {
        let db = Self::read_from(BufReader::new(File::open(path.as_ref())?))?;
        log::debug!("Loaded {} asset records from {:?}", db.len(), path.as_ref());
        Ok(db)
    }

    pub fn write_to<W: Write>(&self, mut w: W) -> AssetDbResult<()> {
        w.write_all(&MAGIC)?;
        w.write_all(&VERSION.to_le_bytes())?;
        w.write_all(&(self.records.len() as u32).to_le_bytes())?;
        for record in self.records() {
            write_string(&mut w, &record.path)?;
            w.write_all(&[record.asset_type as u8, record.state as u8])?;
            w.write_all(&record.hash.to_le_bytes())?;
            w.write_all(&record.source_modified.to_le_bytes())?;
            w.write_all(&record.processed_at.to_le_bytes())?;
            w.write_all(&(record.outputs.len() as u32).to_le_bytes())?;
            for output in &record.outputs {
                write_string(&mut w, output)?;
            }
        }
        Ok(())
    }

    pub fn read_from<R: Read>(mut r: R) -> AssetDbResult<Self> {
        let mut magic = [0u8; 4];
        r.read_exact(&mut magic)?;
        if magic != MAGIC {
            return Err(AssetDbError::BadMagic);
        }
        let version = read_u32(&mut r)?;
        if version != VERSION {
            return Err(AssetDbError::UnsupportedVersion(version));
        }

        let count = read_u32(&mut r)? as usize;
        let mut records = HashMap::with_capacity(count.min(1024));
        for _ in 0..count {
            let path = read_string(&mut r)?;
            let mut codes = [0u8; 2];
            r.read_exact(&mut codes)?;
            let asset_type = AssetType::from_u8(codes[0]).ok_or(AssetDbError::InvalidType(codes[0]))?;
            let state = AssetState::from_u8(codes[1]).ok_or(AssetDbError::InvalidState(codes[1]))?;
            let hash = read_u64(&mut r)?;
            let source_modified = read_u64(&mut r)?;
            let processed_at = read_u64(&mut r)?;
            let output_count = read_u32(&mut r)? as usize;
            let mut outputs = Vec::with_capacity(output_count.min(64));
            for _ in 0..output_count {
                outputs.push(read_string(&mut r)?);
            }
            records.insert(
                path.clone(),
                AssetRecord {
                    path,
                    asset_type,
                    state,
                    hash,
                    source_modified,
                    processed_at,
                    outputs,
                },
            );
        }
        Ok(Self { records })
    }
}

fn write_string<W: Write>(w: &mut W, s: &str) -> AssetDbResult<()> {
    if s.len() > MAX_STRING_LEN {
        return Err(AssetDbError::StringTooLong(s.len()));
    }
    w.write_all(&(s.len() as u32).to_le_bytes())?;
    w.write_all(s.as_bytes())?;
    Ok(())
}

fn read_u32<R: Read>(r: &mut R) -> AssetDbResult<u32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_u64<R: Read>(r: &mut R) -> AssetDbResult<u64> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

fn read_string<R: Read>(r: &mut R) -> AssetDbResult<String> {
    let len = read_u32(r)? as usize;
    if len > MAX_STRING_LEN {
        return Err(AssetDbError::StringTooLong(len));
    }
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf)?;
    String::from_utf8(buf).map_err(|_| AssetDbError::InvalidUtf8)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> AssetDatabase {
        let mut db = AssetDatabase::new();
        db.register("textures/brick.png", AssetType::Texture);
        db.mark_processed(
            "textures/brick.png",
            b"brick",
            1_700_000_000,
            vec!["out/brick.png".into()],
        )
        .unwrap();
        db.register("shaders/lit.wgsl", AssetType::Shader);
        db.mark_failed("shaders/lit.wgsl").unwrap();
        db.register("meshes/crate.obj", AssetType::Mesh);
        db
    }

    #[test]
    fn header_layout() {
        let mut bytes = Vec::new();
        AssetDatabase::new().write_to(&mut bytes).unwrap();
        assert_eq!(bytes, [b'Z', b'D', b'L', b'A', 1, 0, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn write_read_preserves_records() {
        let db = sample();
        let mut bytes = Vec::new();
        db.write_to(&mut bytes).unwrap();
        let loaded = AssetDatabase::read_from(bytes.as_slice()).unwrap();
        assert_eq!(loaded, db);

        // Deterministic output regardless of map order
        let mut again = Vec::new();
        loaded.write_to(&mut again).unwrap();
        assert_eq!(again, bytes);
    }

    #[test]
    fn rejects_bad_headers() {
        assert!(matches!(
            AssetDatabase::read_from(&b"NOPE\x01\0\0\0\0\0\0\0"[..]),
            Err(AssetDbError::BadMagic)
        ));
        assert!(matches!(
            AssetDatabase::read_from(&b"ZDLA\x02\0\0\0\0\0\0\0"[..]),
            Err(AssetDbError::UnsupportedVersion(2))
        ));

        let mut bytes = Vec::new();
        sample().write_to(&mut bytes).unwrap();
        bytes.truncate(bytes.len() - 3);
        assert!(matches!(AssetDatabase::read_from(bytes.as_slice()), Err(AssetDbError::Io(_))));
    }

    #[test]
    fn invalid_codes_are_errors() {
        let mut db = AssetDatabase::new();
        db.register("a.png", AssetType::Texture);
        let mut bytes = Vec::new();
        db.write_to(&mut bytes).unwrap();
        // magic + version + count + path length + "a.png"
        let type_offset = 4 + 4 + 4 + 4 + 5;
        bytes[type_offset] = 42;
        assert!(matches!(
            AssetDatabase::read_from(bytes.as_slice()),
            Err(AssetDbError::InvalidType(42))
        ));
    }

    #[test]
    fn processing_follows_content() {
        let db = sample();
        assert!(!db.needs_processing("textures/brick.png", b"brick", 1_700_000_000));
        assert!(!db.needs_processing("textures/brick.png", b"brick", 1_800_000_000));
        assert!(db.needs_processing("textures/brick.png", b"bricks", 1_800_000_000));
        assert!(db.needs_processing("shaders/lit.wgsl", b"", 0));
        assert!(db.needs_processing("meshes/crate.obj", b"", 0));
        assert!(db.needs_processing("unknown.png", b"", 0));
    }

    #[test]
    fn unknown_assets_cannot_be_marked() {
        let mut db = AssetDatabase::new();
        assert!(matches!(db.mark_failed("missing"), Err(AssetDbError::UnknownAsset(_))));
    }

    #[test]
    fn types_from_extension() {
        assert_eq!(AssetType::from_path("a/B.PNG"), AssetType::Texture);
        assert_eq!(AssetType::from_path("mesh.glb"), AssetType::Mesh);
        assert_eq!(AssetType::from_path("lit.wgsl"), AssetType::Shader);
        assert_eq!(AssetType::from_path("hit.ogg"), AssetType::Audio);
        assert_eq!(AssetType::from_path("README"), AssetType::Unknown);
    }
}
