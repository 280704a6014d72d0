use std::ops::Range;

/// An expression to evaluate for a hover tooltip
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataTip {
    /// Byte range of the expression in the text
    pub span: Range<usize>,
    pub expression: String,
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// The identifier under byte `offset` of `text`
///
/// A cursor sitting just past the end of a word still selects it. Offsets that are out of
/// range, not on a character boundary, or not touching an identifier give `None`, as do
/// purely numeric words.
pub fn data_tip_at(text: &str, offset: usize) -> Option<DataTip> {
    if !text.is_char_boundary(offset) {
        return None;
    }

    let (before, after) = text.split_at(offset);
    let start = before
        .char_indices()
        .rev()
        .take_while(|(_, c)| is_word_char(*c))
        .last()
        .map_or(offset, |(i, _)| i);
    let end = after
        .char_indices()
        .find(|(_, c)| !is_word_char(*c))
        .map_or(text.len(), |(i, _)| offset + i);

    let word = &text[start..end];
    if word.is_empty() || word.starts_with(|c: char| c.is_ascii_digit()) {
        return None;
    }

    Some(DataTip {
        span: start..end,
        expression: word.to_string(),
    })
}
