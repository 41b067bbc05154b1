/// Strips one layer of wrapping double quotes from a reply and trims it.
///
/// Only fires when the quotes are the only two in the text, so answers that
/// quote something internally are left alone. Disabled with `--keep-quotes`.
///
/// Surrounding whitespace is trimmed before looking for the quotes.
pub fn strip_wrapping_quotes(text: &str) -> String {
    let text = text.trim();
    let wrapped = text.len() >= 2
        && text.starts_with('"')
        && text.ends_with('"')
        && text.matches('"').count() == 2;

    if wrapped {
        text[1..text.len() - 1].trim().to_string()
    } else {
        text.to_string()
    }
}
