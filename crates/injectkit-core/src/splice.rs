pub const SCRIPT_DELIMITER: &str = "//---";

/// Splits at the first delimiter. Text after it is machine-generated.
pub fn split_injection(source: &str) -> (&str, Option<&str>) {
    match source.split_once(SCRIPT_DELIMITER) {
        Some((original, injected)) => (original, Some(injected)),
        None => (source, None),
    }
}

pub fn splice_injection(source: &str, injected: &str) -> String {
    let (original, _) = split_injection(source);
    let mut spliced =
        String::with_capacity(original.len() + SCRIPT_DELIMITER.len() + injected.len());
    spliced.push_str(original);
    spliced.push_str(SCRIPT_DELIMITER);
    spliced.push_str(injected);
    spliced
}

pub fn count_delimiters(source: &str) -> usize {
    source.matches(SCRIPT_DELIMITER).count()
}
