//! Building blocks for PDF-to-audiobook conversion.
//!
//! The pure stages ([`chunk`], [`cleanup`], [`geometry`], [`wav`]) are
//! deterministic and need no I/O. The rest are the bundled implementations
//! of the [`crate::collaborators`] traits.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ render ──▶ encode ──▶ llm (OCR) ──▶ cleanup ──▶ chunk ──▶ llm (translate) ──▶ synth ──▶ wav ──▶ storage
//! (bytes)  (pdfium)   (base64)    (VLM)         (rules)    (split)      (optional)        (HTTP)   (PCM)   (atomic)
//! ```
//!
//! 1. [`input`]    : read a local file or download a URL, check `%PDF`
//! 2. [`geometry`] : scale crop margins into rendered pixels
//! 3. [`render`]   : rasterise and crop pages in `spawn_blocking`
//! 4. [`encode`]   : PNG-encode cropped pages for the vision request
//! 5. [`llm`]      : OCR and translation with retry/backoff
//! 6. [`cleanup`]  : collapse whitespace, rejoin hyphenated breaks
//! 7. [`chunk`]    : split text at sentence or word boundaries
//! 8. [`synth`]    : HTTP text-to-speech
//! 9. [`wav`]      : concatenate segments into a 16-bit PCM WAV
//! 10. [`storage`] : persist the WAV with an atomic rename

pub mod chunk;
pub mod cleanup;
pub mod encode;
pub mod geometry;
pub mod input;
pub mod llm;
pub mod render;
pub mod storage;
pub mod synth;
pub mod wav;
