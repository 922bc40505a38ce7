//! HTML entity decoding for translated text.
//! The translation service treats input as HTML by default, so quotes,
//! ampersands and the like come back escaped. Decoding follows the HTML5
//! rules for text content: every named reference, numeric references, and the
//! legacy names that may omit the trailing semicolon.

use std::borrow::Cow;

/// Decode character references. Text without `&` is returned borrowed.
pub fn unescape_html(text: &str) -> Cow<'_, str> {
    if !text.contains('&') {
        return Cow::Borrowed(text);
    }
    htmlize::unescape(text)
}
