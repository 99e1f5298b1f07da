//! Slug normalization shared by topic keys, change directory names, and ADR
//! ledger filenames. Mirrors the whitelist-style validation the rest of the
//! toolchain uses for on-disk identifiers derived from free text.

/// Lowercases, replaces runs of non-alphanumeric characters with a single
/// `-`, and trims leading/trailing `-`. Never produces `/`, `\`, or `..`, so
/// the result is always safe to use as a single path component.
pub fn slugify(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut last_was_dash = false;
    for c in input.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
            last_was_dash = false;
        } else if !last_was_dash && !out.is_empty() {
            out.push('-');
            last_was_dash = true;
        }
    }
    while out.ends_with('-') {
        out.pop();
    }
    if out.is_empty() {
        "untitled".to_string()
    } else {
        out
    }
}

/// Rejects path separators and traversal components, as a second line of
/// defense for any slug read back from disk rather than freshly generated.
pub fn validate_slug(slug: &str) -> Result<(), String> {
    if slug.is_empty() {
        return Err("slug must not be empty".into());
    }
    if slug.contains('/') || slug.contains('\\') || slug.contains("..") {
        return Err(format!("invalid slug (path traversal detected): '{slug}'"));
    }
    if !slug
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-')
    {
        return Err(format!("invalid slug format: '{slug}'"));
    }
    Ok(())
}
