//! Prompt construction for the extraction request.

use tarajim_parsing::AuthorChunk;

/// The record schema shown to the model. Field semantics follow the output
/// schema in [`crate::record::AuthorRecord`].
const SCHEMA_BLOCK: &str = r#"{
  "name": "string",
  "birth_date": "string or null",
  "death_date": "string or null",
  "profession": "string or null",
  "known_works": ["string"]
}"#;

/// Build the primary extraction prompt for one entry.
pub fn build_prompt(chunk: &AuthorChunk) -> String {
    format!(
        "The following text is one biographical entry from an Arabic biographical \
dictionary. The entry heading is: {heading}\n\
The entry text is:\n{content}\n\n\
Extract the author's details and return structured JSON data exactly as follows:\n\n\
```json\n{schema}\n```\n\n\
- \"name\" is the author's full name as given in the entry.\n\
- Dates may be Hijri or partial; copy them as written. Use null when a field \
is not stated in the text.\n\
- \"known_works\" lists titles attributed to the author, in order of mention; \
use [] when none are named.\n\
- Important: respond with valid JSON only, parseable as-is, no commentary.",
        heading = chunk.heading,
        content = chunk.content(),
        schema = SCHEMA_BLOCK,
    )
}

/// A stricter, shorter prompt for the single re-ask after an unparseable
/// reply. The entry text is truncated: the first lines carry the name and
/// dates, which is what the re-ask is for.
pub fn build_retry_prompt(chunk: &AuthorChunk) -> String {
    let content = chunk.content();
    let truncated: String = content.chars().take(500).collect();
    format!(
        "Analyze this biographical entry about {heading} and return ONLY a valid \
JSON object with this exact structure. Return nothing but the JSON object itself, \
no explanations, no markdown:\n\n{schema}\n\nEntry text: {truncated}",
        heading = chunk.heading,
        schema = SCHEMA_BLOCK,
        truncated = truncated,
    )
}
