use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PatternError {
    #[error("invalid segmentation pattern: {0}")]
    Invalid(#[from] regex::Error),
    #[error("segmentation pattern needs 2 capture groups (ordinal, heading), found {0}")]
    WrongGroupCount(usize),
}

/// A compiled segmentation pattern.
///
/// Two capture groups are required: group 1 is the ordinal marker (the entry
/// number as printed), group 2 is the start of the entry's free text (the
/// author heading). Each match opens an entry that runs to the next match or
/// end of text.
#[derive(Debug, Clone)]
pub struct EntryPattern {
    re: Regex,
}

/// The `N - heading` convention used by most printed editions. `\d` is
/// Unicode-aware, so Arabic-Indic ordinals (١٢٣) match as well.
///
/// The source convention also excludes headings that start with a digit or
/// bracket (page ranges, cross references). The regex crate has no
/// look-around, so that exclusion is applied to the captured heading in
/// [`segment_text`] instead of inside the pattern.
static NUMBERED_DASH: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+)\s*-\s*([^\n]+)").unwrap());

impl EntryPattern {
    /// Compile a caller-supplied pattern, validating the capture group count.
    pub fn new(pattern: &str) -> Result<Self, PatternError> {
        let re = Regex::new(pattern)?;
        // captures_len counts the implicit whole-match group
        let groups = re.captures_len() - 1;
        if groups != 2 {
            return Err(PatternError::WrongGroupCount(groups));
        }
        Ok(Self { re })
    }

    /// The default `N - heading` pattern.
    pub fn default_numbered() -> Self {
        Self {
            re: NUMBERED_DASH.clone(),
        }
    }

    pub fn as_str(&self) -> &str {
        self.re.as_str()
    }
}

/// One author entry carved out of the document text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorChunk {
    /// 1-based position in order of appearance.
    pub index: usize,
    /// The ordinal marker as printed (capture group 1).
    pub ordinal: String,
    /// The rest of the matched line (capture group 2), trimmed.
    pub heading: String,
    /// Text between the end of the matched line and the next entry, trimmed.
    pub body: String,
    /// The raw span from match start to the next match start, unmodified.
    /// Concatenating all spans in index order reconstructs the segmented
    /// region of the source text exactly.
    pub span: String,
}

impl AuthorChunk {
    /// Heading and body joined for display or prompting. The heading carries
    /// the author name; the body carries the biographical notice.
    pub fn content(&self) -> String {
        if self.body.is_empty() {
            self.heading.clone()
        } else {
            format!("{}\n{}", self.heading, self.body)
        }
    }
}

/// True for headings that are really page ranges or numeric cross references
/// ("12 - 15", "3 - .4]"), which the ordinal pattern also matches. A real
/// heading opens with the author name; artifacts open with a digit or
/// trailing punctuation.
fn is_numeric_artifact(heading: &str) -> bool {
    static ARTIFACT_LEAD: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[0-9.\])]").unwrap());
    ARTIFACT_LEAD.is_match(heading)
}

/// Split document text into ordered author entries.
///
/// Zero matches yields an empty vector, not an error; the caller decides
/// whether that means a wrong pattern. Chunks keep the original script; no
/// normalization happens here.
pub fn segment_text(text: &str, pattern: &EntryPattern) -> Vec<AuthorChunk> {
    struct EntryMatch<'t> {
        start: usize,
        line_end: usize,
        ordinal: &'t str,
        heading: &'t str,
    }

    let matches: Vec<EntryMatch> = pattern
        .re
        .captures_iter(text)
        .filter_map(|cap| {
            let whole = cap.get(0)?;
            let ordinal = cap.get(1)?;
            let heading = cap.get(2)?;
            if is_numeric_artifact(heading.as_str().trim()) {
                return None;
            }
            Some(EntryMatch {
                start: whole.start(),
                line_end: whole.end(),
                ordinal: ordinal.as_str(),
                heading: heading.as_str(),
            })
        })
        .collect();

    matches
        .iter()
        .enumerate()
        .map(|(i, m)| {
            let next_start = matches
                .get(i + 1)
                .map(|n| n.start)
                .unwrap_or_else(|| text.len());
            AuthorChunk {
                index: i + 1,
                ordinal: m.ordinal.to_string(),
                heading: m.heading.trim().to_string(),
                body: text[m.line_end..next_start].trim().to_string(),
                span: text[m.start..next_start].to_string(),
            }
        })
        .collect()
}
