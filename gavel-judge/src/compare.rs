/// Byte equality of judge output against the expected output, insensitive
/// to trailing CR/LF on either side.
pub fn outputs_match(actual: &str, expected: &str) -> bool {
    trim_trailing_newlines(actual) == trim_trailing_newlines(expected)
}

fn trim_trailing_newlines(s: &str) -> &str {
    s.trim_end_matches(['\r', '\n'])
}
