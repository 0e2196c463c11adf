pub mod chunker;
pub mod loader;

pub use chunker::{ChunkResult, TextChunker};
pub use loader::{load_directory, load_file, DocumentFormat, LoadedCorpus, SourceDocument};
