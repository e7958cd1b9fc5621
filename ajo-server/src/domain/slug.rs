//! URL slugs derived from pool names

/// Lowercase, strip everything but word characters, whitespace and
/// hyphens, then collapse whitespace and hyphen runs into single hyphens.
pub fn generate_slug(text: &str) -> String {
    let lowered = text.to_lowercase();
    let mut slug = String::with_capacity(lowered.len());
    let mut pending_hyphen = false;

    for c in lowered.trim().chars() {
        if c.is_whitespace() || c == '-' {
            pending_hyphen = true;
        } else if c.is_alphanumeric() || c == '_' {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            pending_hyphen = false;
            slug.push(c);
        }
    }
    slug
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugs() {
        assert_eq!(generate_slug("Lagos Market Women"), "lagos-market-women");
        assert_eq!(generate_slug("  Ajo #1: Family & Friends!  "), "ajo-1-family-friends");
        assert_eq!(generate_slug("a -- b"), "a-b");
        assert_eq!(generate_slug("snake_case name"), "snake_case-name");
        assert_eq!(generate_slug("!!!"), "");
    }
}
