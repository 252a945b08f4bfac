#![no_main]

//! Fuzz target for batch request parsing.
//!
//! Runs arbitrary bytes through the same deserialization and field
//! sanitization the create-pages endpoint performs, ensuring hostile
//! payloads can never panic the request path or produce out-of-contract
//! slugs.

use libfuzzer_sys::fuzz_target;
use spb_api::handlers::create_pages::CreatePagesRequest;
use spb_core::sanitize;

fuzz_target!(|data: &[u8]| {
    fuzz_payload_parsing(data);
});

/// Parse a candidate request body and sanitize every field in it.
///
/// Most inputs fail deserialization, which is fine; the interesting
/// cases are bodies that parse but carry pathological titles, content,
/// or slugs. Each sanitized output is checked against the properties
/// the rest of the pipeline relies on.
fn fuzz_payload_parsing(data: &[u8]) {
    let Ok(request) = serde_json::from_slice::<CreatePagesRequest>(data) else {
        return;
    };

    for item in &request.pages {
        let title = sanitize::strip_markup(&item.title);
        assert!(!title.contains('<'));
        assert!(!title.chars().any(char::is_control));

        let slug = match item.slug.as_deref() {
            Some(provided) => sanitize::slugify(provided),
            None => sanitize::slugify(&title),
        };
        assert!(!slug.is_empty());
        assert!(slug.len() <= 200);
        assert!(slug.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-'));

        let _ = sanitize::strip_markup(&item.content);
    }
}
