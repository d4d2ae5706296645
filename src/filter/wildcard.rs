use super::Filter;

/// Shell-style wildcard filter: `*` matches any run, `?` matches one character.
///
/// Matching is case-sensitive and works on Unicode code points.
pub struct WildcardFilter {
    pattern: Vec<char>,
    source: String,
}

impl WildcardFilter {
    pub fn new(pattern: &str) -> Self {
        Self {
            pattern: pattern.chars().collect(),
            source: pattern.to_string(),
        }
    }

    pub fn pattern(&self) -> &str {
        &self.source
    }
}

impl Filter for WildcardFilter {
    fn matches(&self, line: &str) -> bool {
        let text: Vec<char> = line.chars().collect();
        match_chars(&text, &self.pattern)
    }

    fn description(&self) -> String {
        format!("Wildcard: {}", self.source)
    }
}

/// Match `text` against a `*`/`?` wildcard `pattern`.
pub fn wildcard_match(text: &str, pattern: &str) -> bool {
    let text: Vec<char> = text.chars().collect();
    let pattern: Vec<char> = pattern.chars().collect();
    match_chars(&text, &pattern)
}

/// Greedy two-pointer matcher with a single backtrack checkpoint.
///
/// The checkpoint remembers the position right after the last `*` and the
/// text position where that star started consuming. On mismatch the star
/// swallows one more character and scanning resumes from the checkpoint.
fn match_chars(text: &[char], pattern: &[char]) -> bool {
    if pattern.is_empty() {
        return text.is_empty();
    }
    if pattern.iter().all(|&c| c == '*') {
        return true;
    }

    let mut t = 0usize;
    let mut p = 0usize;
    // (pattern index after the star, text index the star currently ends at)
    let mut checkpoint: Option<(usize, usize)> = None;

    while t < text.len() {
        if p < pattern.len() && (pattern[p] == '?' || pattern[p] == text[t]) {
            t += 1;
            p += 1;
        } else if p < pattern.len() && pattern[p] == '*' {
            checkpoint = Some((p + 1, t));
            p += 1;
        } else if let Some((star_next, star_text)) = checkpoint {
            let resume = star_text + 1;
            checkpoint = Some((star_next, resume));
            p = star_next;
            t = resume;
        } else {
            return false;
        }
    }

    while p < pattern.len() && pattern[p] == '*' {
        p += 1;
    }

    p == pattern.len()
}
