#![no_main]

//! Fuzz target for markup stripping and slug derivation.
//!
//! Titles pass through the sanitizer before they reach responses,
//! webhook payloads, and URLs. This target checks the sanitizer's
//! output contract on arbitrary text, including broken markup and
//! unusual Unicode.

use libfuzzer_sys::fuzz_target;
use spb_core::sanitize;

fuzz_target!(|data: &[u8]| {
    fuzz_markup_stripping(data);
});

/// Sanitize arbitrary text and check the output invariants.
///
/// Stripped text never contains tag openers, control characters, or
/// runs of whitespace, and never grows. Slugs stay within the length
/// cap, use only the URL-safe alphabet, and are never empty.
fn fuzz_markup_stripping(data: &[u8]) {
    let Ok(input) = std::str::from_utf8(data) else {
        return;
    };

    let stripped = sanitize::strip_markup(input);
    assert!(!stripped.contains('<'));
    assert!(!stripped.chars().any(char::is_control));
    assert!(!stripped.contains("  "));
    assert!(stripped.len() <= input.len());
    assert_eq!(sanitize::strip_markup(&stripped), stripped);

    let slug = sanitize::slugify(input);
    assert!(!slug.is_empty());
    assert!(slug.len() <= 200);
    assert!(slug.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-'));
    assert!(!slug.starts_with('-') && !slug.ends_with('-'));
}
