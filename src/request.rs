//! The immutable input of one pipeline run.

use crate::error::AudiobookError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Languages supported for recognition, translation and synthesis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Language {
    English,
    Spanish,
    French,
    German,
    Italian,
    Portuguese,
    Dutch,
    Russian,
    Chinese,
    Japanese,
    Korean,
    Hindi,
    Arabic,
}

impl Language {
    pub const ALL: [Language; 13] = [
        Language::English,
        Language::Spanish,
        Language::French,
        Language::German,
        Language::Italian,
        Language::Portuguese,
        Language::Dutch,
        Language::Russian,
        Language::Chinese,
        Language::Japanese,
        Language::Korean,
        Language::Hindi,
        Language::Arabic,
    ];

    /// ISO-639-1 code.
    pub fn code(self) -> &'static str {
        match self {
            Language::English => "en",
            Language::Spanish => "es",
            Language::French => "fr",
            Language::German => "de",
            Language::Italian => "it",
            Language::Portuguese => "pt",
            Language::Dutch => "nl",
            Language::Russian => "ru",
            Language::Chinese => "zh",
            Language::Japanese => "ja",
            Language::Korean => "ko",
            Language::Hindi => "hi",
            Language::Arabic => "ar",
        }
    }

    /// English name, as used in prompts.
    pub fn name(self) -> &'static str {
        match self {
            Language::English => "English",
            Language::Spanish => "Spanish",
            Language::French => "French",
            Language::German => "German",
            Language::Italian => "Italian",
            Language::Portuguese => "Portuguese",
            Language::Dutch => "Dutch",
            Language::Russian => "Russian",
            Language::Chinese => "Chinese",
            Language::Japanese => "Japanese",
            Language::Korean => "Korean",
            Language::Hindi => "Hindi",
            Language::Arabic => "Arabic",
        }
    }

    /// Voice id used when the config does not name one.
    pub fn default_voice(self) -> String {
        format!("{}-default", self.code())
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Language {
    type Err = AudiobookError;

    /// Accepts the English name or the ISO code, case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim();
        Language::ALL
            .iter()
            .copied()
            .find(|l| l.code().eq_ignore_ascii_case(needle) || l.name().eq_ignore_ascii_case(needle))
            .ok_or_else(|| AudiobookError::InvalidRequest(format!("unsupported language '{s}'")))
    }
}

/// Contiguous, 1-indexed, inclusive page range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRange {
    pub start: usize,
    pub end: usize,
}

impl PageRange {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn single(page: usize) -> Self {
        Self::new(page, page)
    }

    pub fn validate(&self) -> Result<(), AudiobookError> {
        if self.start < 1 {
            return Err(AudiobookError::InvalidRequest(format!(
                "pages are 1-indexed, got start page {}",
                self.start
            )));
        }
        if self.start > self.end {
            return Err(AudiobookError::InvalidRequest(format!(
                "invalid page range {}-{}: start must be <= end",
                self.start, self.end
            )));
        }
        Ok(())
    }

    /// 1-indexed page numbers of this range that exist in a document of
    /// `page_count` pages. Pages past the end are dropped.
    pub fn pages_within(&self, page_count: usize) -> Vec<usize> {
        let first = self.start.max(1);
        let last = self.end.min(page_count);
        (first..=last).collect()
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start) + 1
    }

    pub fn is_empty(&self) -> bool {
        self.start > self.end
    }
}

impl fmt::Display for PageRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start == self.end {
            write!(f, "page {}", self.start)
        } else {
            write!(f, "pages {}-{}", self.start, self.end)
        }
    }
}

/// Header/footer margins removed before recognition, in source-page pixels
/// (PDF points at 72 DPI).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CropMargins {
    pub top: u32,
    pub bottom: u32,
}

impl CropMargins {
    pub fn new(top: u32, bottom: u32) -> Self {
        Self { top, bottom }
    }

    pub fn none() -> Self {
        Self::default()
    }

    pub fn is_none(&self) -> bool {
        self.top == 0 && self.bottom == 0
    }
}

/// Everything a single conversion needs.
#[derive(Clone)]
pub struct AudiobookRequest {
    /// Raw PDF bytes; shared so collaborators can move them to blocking threads.
    pub document: Arc<[u8]>,
    pub page_range: PageRange,
    pub crop: CropMargins,
    pub source_language: Language,
    pub target_language: Language,
}

impl AudiobookRequest {
    pub fn new(
        document: impl Into<Arc<[u8]>>,
        page_range: PageRange,
        crop: CropMargins,
        source_language: Language,
        target_language: Language,
    ) -> Self {
        Self {
            document: document.into(),
            page_range,
            crop,
            source_language,
            target_language,
        }
    }

    /// `true` when the translation stage has work to do.
    pub fn needs_translation(&self) -> bool {
        self.source_language != self.target_language
    }

    pub fn validate(&self) -> Result<(), AudiobookError> {
        if self.document.is_empty() {
            return Err(AudiobookError::InvalidRequest("document is empty".into()));
        }
        self.page_range.validate()
    }
}

impl fmt::Debug for AudiobookRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudiobookRequest")
            .field("document", &format_args!("<{} bytes>", self.document.len()))
            .field("page_range", &self.page_range)
            .field("crop", &self.crop)
            .field("source_language", &self.source_language)
            .field("target_language", &self.target_language)
            .finish()
    }
}
