//! System prompts for the LLM-backed collaborators.
//!
//! Every prompt lives here so wording changes never touch retry or error
//! handling in [`crate::pipeline::llm`], and so tests can inspect the prompts
//! without a live model.
//!
//! Output of both prompts goes straight to a speech synthesizer, so they ask
//! for plain prose: no Markdown, no commentary, no page furniture.

use crate::request::Language;

/// Transcription prompt for one cropped page image.
///
/// `{language}` is replaced with the expected language of the page.
pub const OCR_SYSTEM_PROMPT: &str = r#"You are a careful transcriber preparing text to be read aloud.

Transcribe ALL running text visible in the page image, following these rules:

1. CONTENT
   - The page is written in {language}; keep it in that language
   - Preserve every sentence, in the reading order a human would use
   - Correct obvious recognition errors only if you are completely certain

2. WHAT TO IGNORE
   - Page numbers, running headers and footers
   - Figure and table contents that cannot be read as sentences
   - Decorative lines, borders and ornaments

3. OUTPUT FORMAT
   - Plain text only, one paragraph per line
   - No Markdown, no bullets, no headings markers
   - No commentary, explanations or "Page X" markers
   - If the page has no readable text, output nothing"#;

/// Translation prompt for one chunk.
///
/// `{source}` and `{target}` are replaced with language names.
pub const TRANSLATION_SYSTEM_PROMPT: &str = r#"You are a literary translator. Translate the user's text from {source} to {target}.

Rules:
- Translate everything; do not summarise or skip sentences
- Keep the register and tone of the original
- Output ONLY the translation, with no quotes, notes or explanations"#;

/// Build the transcription prompt for a page in `language`.
pub fn ocr_prompt(language: Language) -> String {
    OCR_SYSTEM_PROMPT.replace("{language}", language.name())
}

/// Build the translation prompt for `source` → `target`.
pub fn translation_prompt(source: Language, target: Language) -> String {
    TRANSLATION_SYSTEM_PROMPT
        .replace("{source}", source.name())
        .replace("{target}", target.name())
}
