//! Asset database and source processors

mod database;
mod processor;

pub use database::{
    content_hash, AssetDatabase, AssetDbError, AssetDbResult, AssetRecord, AssetState, AssetType, MAGIC,
    VERSION,
};
pub use processor::{
    AssetProcessor, AudioProcessor, MeshProcessor, ProcessError, ProcessOutcome, ProcessResult,
    ProcessorRegistry, ShaderProcessor, TextureProcessor,
};
