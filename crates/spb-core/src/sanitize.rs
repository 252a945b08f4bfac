//! Input sanitization for caller-supplied page fields.
//!
//! Titles arrive from untrusted clients and end up in responses, webhook
//! payloads, and page URLs, so markup is stripped and whitespace
//! normalized before anything else sees them.

/// Maximum slug length after derivation.
const MAX_SLUG_LEN: usize = 200;

/// Strips markup and normalizes whitespace in a text field.
///
/// Removes `<...>` tag spans (unterminated tags are dropped to the end of
/// the string), strips control characters, collapses whitespace runs to a
/// single space, and trims. The result may be empty, which per-item
/// validation treats as a missing value.
pub fn strip_markup(input: &str) -> String {
    let mut cleaned = String::with_capacity(input.len());
    let mut in_tag = false;

    for c in input.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if in_tag => {}
            _ if c.is_control() => cleaned.push(' '),
            _ => cleaned.push(c),
        }
    }

    let mut normalized = String::with_capacity(cleaned.len());
    let mut last_was_space = true;
    for c in cleaned.chars() {
        if c.is_whitespace() {
            if !last_was_space {
                normalized.push(' ');
                last_was_space = true;
            }
        } else {
            normalized.push(c);
            last_was_space = false;
        }
    }

    normalized.trim_end().to_string()
}

/// Derives a URL slug from free text.
///
/// Lowercases, maps non-alphanumeric runs to single hyphens, trims edge
/// hyphens, and caps the length. Falls back to `"page"` when nothing
/// survives, so a slug is never empty.
pub fn slugify(input: &str) -> String {
    let mut slug = String::with_capacity(input.len().min(MAX_SLUG_LEN));
    let mut last_was_hyphen = true;

    for c in input.chars() {
        if slug.len() >= MAX_SLUG_LEN {
            break;
        }
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
            last_was_hyphen = false;
        } else if !last_was_hyphen {
            slug.push('-');
            last_was_hyphen = true;
        }
    }

    let slug = slug.trim_matches('-').to_string();
    if slug.is_empty() {
        "page".to_string()
    } else {
        slug
    }
}
