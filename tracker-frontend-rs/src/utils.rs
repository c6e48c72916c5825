pub const UNTITLED: &str = "Untitled";

pub fn set_panic_hook() {
    // With the `console_error_panic_hook` feature enabled, panics in the browser show up in the console
    // with a readable message instead of "unreachable executed".
    #[cfg(feature = "console_error_panic_hook")]
    console_error_panic_hook::set_once();
}

/// Trimmed title, or the placeholder when nothing is left.
pub(crate) fn normalize_title(title: &str) -> String {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        UNTITLED.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Trimmed text, with blank text treated as missing.
pub(crate) fn normalize_optional(text: Option<String>) -> Option<String> {
    text.and_then(|text| {
        let trimmed = text.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}

pub(crate) fn normalize_tags(tags: Vec<String>) -> Vec<String> {
    tags.into_iter()
        .filter_map(|tag| normalize_optional(Some(tag)))
        .collect()
}

pub(crate) fn clamp_rating(rating: f64) -> f64 {
    rating.clamp(0.0, 10.0)
}
