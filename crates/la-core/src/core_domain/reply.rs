// ---------------------------------------------------------------------------
// ReplyParser — pulls the listener reply out of a raw generation
// ---------------------------------------------------------------------------

pub const DEFAULT_REPLY_DELIMITER: &str = "【倾听者回复】：";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReplyParser {
    delimiter: String,
}

impl Default for ReplyParser {
    fn default() -> Self {
        Self::new(DEFAULT_REPLY_DELIMITER)
    }
}

impl ReplyParser {
    pub fn new(delimiter: impl Into<String>) -> Self {
        Self {
            delimiter: delimiter.into(),
        }
    }

    pub fn delimiter(&self) -> &str {
        &self.delimiter
    }

    /// Reply text after the last delimiter, newlines removed.
    ///
    /// Returns `None` when the delimiter is missing or nothing follows it.
    pub fn extract(&self, raw: &str) -> Option<String> {
        let (_, tail) = raw.rsplit_once(self.delimiter.as_str())?;
        non_empty_single_line(tail)
    }
}

/// Plain (undelimited) output, newlines removed; `None` if blank.
pub fn extract_plain(raw: &str) -> Option<String> {
    non_empty_single_line(raw)
}

fn non_empty_single_line(text: &str) -> Option<String> {
    let flattened = text.replace('\n', "");
    if flattened.trim().is_empty() {
        None
    } else {
        Some(flattened)
    }
}
