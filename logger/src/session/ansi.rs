//! ANSI colour stripping

use std::borrow::Cow;
use std::sync::LazyLock;

use regex::Regex;

static ANSI_COLOUR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\x1b\[[0-9;]*m").unwrap());

/// Remove colour sequences (`ESC [ <digits/semicolons> m`).
///
/// Repeats until nothing matches, so sequences exposed by a removal (as in
/// `ESC [ ESC [31m m`) are removed too and the result is a fixed point.
pub fn strip_ansi_codes(text: &str) -> Cow<'_, str> {
    let mut stripped = match ANSI_COLOUR.replace_all(text, "") {
        Cow::Borrowed(_) => return Cow::Borrowed(text),
        Cow::Owned(s) => s,
    };
    loop {
        let next = match ANSI_COLOUR.replace_all(&stripped, "") {
            Cow::Borrowed(_) => break,
            Cow::Owned(next) => next,
        };
        stripped = next;
    }
    Cow::Owned(stripped)
}

/// Decode device bytes as UTF-8, dropping invalid sequences, then strip colours
pub fn decode_and_strip(bytes: &[u8]) -> String {
    let text: String = bytes.utf8_chunks().map(|chunk| chunk.valid()).collect();
    strip_ansi_codes(&text).into_owned()
}
