//! Output types returned by a successful pipeline run.

use crate::pipeline::chunk::TextChunk;
use crate::pipeline::wav::AssembledAudio;
use serde::{Deserialize, Serialize};

/// Everything a successful run produces.
#[derive(Debug, Clone)]
pub struct AudiobookOutput {
    /// The playable WAV.
    pub audio: AssembledAudio,
    /// Text that was spoken, one entry per synthesized segment, in the target
    /// language.
    pub chunks: Vec<TextChunk>,
    pub stats: PipelineStats,
}

/// Aggregate statistics for one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineStats {
    /// Pages named by the request's range.
    pub pages_requested: usize,
    /// Pages that existed in the document and were rendered.
    pub pages_processed: usize,
    pub chunk_count: usize,
    /// Characters of cleaned text before translation.
    pub source_characters: usize,
    /// Whether the translation stage ran.
    pub translated: bool,
    pub sample_rate: u32,
    pub sample_count: usize,
    pub audio_duration_ms: u64,

    pub extract_duration_ms: u64,
    pub recognize_duration_ms: u64,
    pub translate_duration_ms: u64,
    pub synthesize_duration_ms: u64,
    pub assemble_duration_ms: u64,
    pub total_duration_ms: u64,
}
