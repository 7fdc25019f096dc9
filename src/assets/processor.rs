//! Asset processors
//!
//! A processor validates a source file and writes its outputs into the
//! output directory. The builtin processors copy validated bytes as-is.

use crate::assets::database::{AssetDatabase, AssetDbError, AssetType};
use crate::resources::TextureData;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{processor} rejected {path:?}: {reason}")]
    Invalid {
        processor: String,
        path: PathBuf,
        reason: String,
    },
    #[error("No processor for {0:?} assets")]
    NoProcessor(AssetType),
    #[error(transparent)]
    Database(#[from] AssetDbError),
}

pub type ProcessResult<T> = Result<T, ProcessError>;

pub trait AssetProcessor: Send + Sync {
    /// Validate `bytes` read from `source` and write the outputs under
    /// `output_dir`. Returns the written paths.
    fn process(&self, source: &Path, bytes: &[u8], output_dir: &Path) -> ProcessResult<Vec<PathBuf>>;

    fn supported_types(&self) -> &[AssetType];

    fn name(&self) -> &str;
}

fn invalid(processor: &dyn AssetProcessor, path: &Path, reason: impl Into<String>) -> ProcessError {
    ProcessError::Invalid {
        processor: processor.name().to_string(),
        path: path.to_path_buf(),
        reason: reason.into(),
    }
}

fn copy_to_output(source: &Path, bytes: &[u8], output_dir: &Path) -> ProcessResult<Vec<PathBuf>> {
    let file_name = source
        .file_name()
        .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::InvalidInput, "source has no file name"))?;
    fs::create_dir_all(output_dir)?;
    let output = output_dir.join(file_name);
    fs::write(&output, bytes)?;
    Ok(vec![output])
}

fn extension(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default()
}

/// Decodes the image to make sure it loads
pub struct TextureProcessor;

impl AssetProcessor for TextureProcessor {
    fn process(&self, source: &Path, bytes: &[u8], output_dir: &Path) -> ProcessResult<Vec<PathBuf>> {
        let name = source.to_string_lossy();
        let texture = TextureData::from_bytes(bytes, &name).map_err(|e| invalid(self, source, e.to_string()))?;
        log::debug!("{}: {}x{}", name, texture.width, texture.height);
        copy_to_output(source, bytes, output_dir)
    }

    fn supported_types(&self) -> &[AssetType] {
        &[AssetType::Texture]
    }

    fn name(&self) -> &str {
        "TextureProcessor"
    }
}

/// Checks the container signature of OBJ and glTF sources
pub struct MeshProcessor;

impl AssetProcessor for MeshProcessor {
    fn process(&self, source: &Path, bytes: &[u8], output_dir: &Path) -> ProcessResult<Vec<PathBuf>> {
        match extension(source).as_str() {
            "glb" => {
                if !bytes.starts_with(b"glTF") {
                    return Err(invalid(self, source, "missing glTF binary header"));
                }
            }
            "gltf" => {
                let text = std::str::from_utf8(bytes).map_err(|_| invalid(self, source, "not UTF-8"))?;
                if !text.trim_start().starts_with('{') {
                    return Err(invalid(self, source, "not a JSON document"));
                }
            }
            _ => {
                let text = std::str::from_utf8(bytes).map_err(|_| invalid(self, source, "not UTF-8"))?;
                if !text.lines().any(|l| l.trim_start().starts_with("v ")) {
                    return Err(invalid(self, source, "no vertex positions"));
                }
            }
        }
        copy_to_output(source, bytes, output_dir)
    }

    fn supported_types(&self) -> &[AssetType] {
        &[AssetType::Mesh]
    }

    fn name(&self) -> &str {
        "MeshProcessor"
    }
}

const SPIRV_MAGIC: u32 = 0x0723_0203;

/// Accepts SPIR-V by magic number and text shaders that declare a function
pub struct ShaderProcessor;

impl AssetProcessor for ShaderProcessor {
    fn process(&self, source: &Path, bytes: &[u8], output_dir: &Path) -> ProcessResult<Vec<PathBuf>> {
        if extension(source) == "spv" {
            let magic = bytes
                .get(..4)
                .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]));
            if magic != Some(SPIRV_MAGIC) || bytes.len() % 4 != 0 {
                return Err(invalid(self, source, "not a SPIR-V module"));
            }
        } else {
            let text = std::str::from_utf8(bytes).map_err(|_| invalid(self, source, "not UTF-8"))?;
            if !text.contains("fn ") && !text.contains("void ") {
                return Err(invalid(self, source, "no entry point"));
            }
        }
        copy_to_output(source, bytes, output_dir)
    }

    fn supported_types(&self) -> &[AssetType] {
        &[AssetType::Shader]
    }

    fn name(&self) -> &str {
        "ShaderProcessor"
    }
}

/// Checks the container signature of WAV, Ogg, FLAC and MP3 sources
pub struct AudioProcessor;

impl AssetProcessor for AudioProcessor {
    fn process(&self, source: &Path, bytes: &[u8], output_dir: &Path) -> ProcessResult<Vec<PathBuf>> {
        let valid = match extension(source).as_str() {
            "wav" => bytes.len() >= 12 && &bytes[..4] == b"RIFF" && &bytes[8..12] == b"WAVE",
            "ogg" => bytes.starts_with(b"OggS"),
            "flac" => bytes.starts_with(b"fLaC"),
            "mp3" => bytes.starts_with(b"ID3") || (bytes.len() >= 2 && bytes[0] == 0xFF && bytes[1] & 0xE0 == 0xE0),
            _ => false,
        };
        if !valid {
            return Err(invalid(self, source, "unrecognized audio container"));
        }
        copy_to_output(source, bytes, output_dir)
    }

    fn supported_types(&self) -> &[AssetType] {
        &[AssetType::Audio]
    }

    fn name(&self) -> &str {
        "AudioProcessor"
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    UpToDate,
    Processed(Vec<String>),
}

/// Dispatches sources to processors by asset type
#[derive(Default)]
pub struct ProcessorRegistry {
    processors: Vec<Box<dyn AssetProcessor>>,
    by_type: HashMap<AssetType, usize>,
}

impl ProcessorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the texture, mesh, shader and audio processors
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(TextureProcessor));
        registry.register(Box::new(MeshProcessor));
        registry.register(Box::new(ShaderProcessor));
        registry.register(Box::new(AudioProcessor));
        registry
    }

    /// Later registrations take over the types they support
    pub fn register(&mut self, processor: Box<dyn AssetProcessor>) {
        let index = self.processors.len();
        for ty in processor.supported_types() {
            if self.by_type.insert(*ty, index).is_some() {
                log::debug!("{} replaces the processor for {:?}", processor.name(), ty);
            }
        }
        self.processors.push(processor);
    }

    pub fn processor_for(&self, asset_type: AssetType) -> Option<&dyn AssetProcessor> {
        self.by_type
            .get(&asset_type)
            .map(|&i| self.processors[i].as_ref())
    }

    /// Process `source` if the database says it changed. The record is
    /// marked processed or failed accordingly.
    pub fn process_file(
        &self,
        db: &mut AssetDatabase,
        source: &Path,
        output_dir: &Path,
    ) -> ProcessResult<ProcessOutcome> {
        let key = source.to_string_lossy().replace('\\', "/");
        let asset_type = AssetType::from_path(source);
        let processor = self
            .processor_for(asset_type)
            .ok_or(ProcessError::NoProcessor(asset_type))?;

        let bytes = fs::read(source)?;
        let modified = fs::metadata(source)?
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs())
            .unwrap_or(0);

        if !db.needs_processing(&key, &bytes, modified) {
            return Ok(ProcessOutcome::UpToDate);
        }
        db.register(&key, asset_type);
        db.mark_processing(&key)?;

        match processor.process(source, &bytes, output_dir) {
            Ok(outputs) => {
                let outputs: Vec<String> = outputs
                    .iter()
                    .map(|p| p.to_string_lossy().replace('\\', "/"))
                    .collect();
                db.mark_processed(&key, &bytes, modified, outputs.clone())?;
                log::info!("{} processed {}", processor.name(), key);
                Ok(ProcessOutcome::Processed(outputs))
            }
            Err(e) => {
                db.mark_failed(&key)?;
                log::warn!("{}", e);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::database::AssetState;

    fn scratch(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("zdl-assets-{}-{}", name, std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn builtin_covers_core_types() {
        let registry = ProcessorRegistry::with_builtin();
        for (ty, name) in [
            (AssetType::Texture, "TextureProcessor"),
            (AssetType::Mesh, "MeshProcessor"),
            (AssetType::Shader, "ShaderProcessor"),
            (AssetType::Audio, "AudioProcessor"),
        ] {
            assert_eq!(registry.processor_for(ty).map(|p| p.name()), Some(name));
        }
        assert!(registry.processor_for(AssetType::Scene).is_none());
    }

    #[test]
    fn shader_is_processed_once() {
        let dir = scratch("shader");
        let source = dir.join("lit.wgsl");
        fs::write(&source, "@fragment fn fs_main() {}").unwrap();
        let out = dir.join("out");

        let registry = ProcessorRegistry::with_builtin();
        let mut db = AssetDatabase::new();
        let outcome = registry.process_file(&mut db, &source, &out).unwrap();
        assert!(matches!(outcome, ProcessOutcome::Processed(ref o) if o.len() == 1));
        assert!(out.join("lit.wgsl").exists());

        let outcome = registry.process_file(&mut db, &source, &out).unwrap();
        assert_eq!(outcome, ProcessOutcome::UpToDate);
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn invalid_source_marks_failed() {
        let dir = scratch("invalid");
        let source = dir.join("broken.wav");
        fs::write(&source, b"not audio").unwrap();

        let registry = ProcessorRegistry::with_builtin();
        let mut db = AssetDatabase::new();
        let err = registry.process_file(&mut db, &source, &dir.join("out"));
        assert!(matches!(err, Err(ProcessError::Invalid { .. })));
        let key = source.to_string_lossy().replace('\\', "/");
        assert_eq!(db.get(&key).map(|r| r.state), Some(AssetState::Failed));
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn mesh_signatures() {
        let dir = scratch("mesh");
        let p = MeshProcessor;
        assert!(p.process(Path::new("a.glb"), b"glTF\x02\0\0\0", &dir).is_ok());
        assert!(p.process(Path::new("b.glb"), b"nope", &dir).is_err());
        assert!(p.process(Path::new("c.obj"), b"# cube\nv 0 0 0\n", &dir).is_ok());
        assert!(p.process(Path::new("d.obj"), b"# empty\n", &dir).is_err());
        let _ = fs::remove_dir_all(&dir);
    }
}
