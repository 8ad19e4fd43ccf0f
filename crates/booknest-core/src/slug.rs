use unicode_normalization::{char::is_combining_mark, UnicodeNormalization};

/// URL slug with Vietnamese diacritics folded to ASCII.
pub fn slugify(text: &str) -> String {
    let folded: String = text
        .to_lowercase()
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .map(|c| if c == 'đ' || c == 'Đ' { 'd' } else { c })
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == ' ' || *c == '-' || c.is_whitespace())
        .collect();

    let mut slug = String::with_capacity(folded.len());
    for c in folded.chars() {
        let c = if c.is_whitespace() { '-' } else { c };
        if c == '-' && slug.ends_with('-') {
            continue;
        }
        slug.push(c);
    }
    slug.trim_matches('-').to_string()
}

/// Returns `base`, or `base-2`, `base-3`, ... for the first candidate `taken` rejects.
pub fn unique_slug<F>(base: &str, mut taken: F) -> String
where
    F: FnMut(&str) -> bool,
{
    if !taken(base) {
        return base.to_string();
    }
    let mut n = 2u32;
    loop {
        let candidate = format!("{}-{}", base, n);
        if !taken(&candidate) {
            return candidate;
        }
        n += 1;
    }
}
