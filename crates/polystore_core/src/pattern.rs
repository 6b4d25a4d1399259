use globset::{GlobBuilder, GlobMatcher};
use polystore_error::{Result, ResultExt};

/// Whether a path string contains a wildcard.
pub fn is_pattern(path: &str) -> bool {
    path.contains('*')
}

/// Matcher for column paths.
///
/// `*` matches any sequence of characters, including the `.` separator. Every
/// other character matches itself.
#[derive(Debug, Clone)]
pub struct PathPattern {
    raw: String,
    matcher: Matcher,
}

#[derive(Debug, Clone)]
enum Matcher {
    Any,
    Literal,
    Glob(GlobMatcher),
}

impl PathPattern {
    pub fn new(pattern: &str) -> Result<Self> {
        let matcher = if pattern == "*" {
            Matcher::Any
        } else if !is_pattern(pattern) {
            Matcher::Literal
        } else {
            let glob = pattern
                .split('*')
                .map(escape_segment)
                .collect::<Vec<_>>()
                .join("*");

            let matcher = GlobBuilder::new(&glob)
                .literal_separator(false)
                .backslash_escape(true)
                .build()
                .context_fn(|| format!("Failed to build path pattern for '{pattern}'"))?
                .compile_matcher();

            Matcher::Glob(matcher)
        };

        Ok(PathPattern {
            raw: pattern.to_string(),
            matcher,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn is_glob(&self) -> bool {
        !matches!(self.matcher, Matcher::Literal)
    }

    pub fn matches(&self, path: &str) -> bool {
        match &self.matcher {
            Matcher::Any => true,
            Matcher::Literal => self.raw == path,
            Matcher::Glob(m) => m.is_match(path),
        }
    }
}

/// Compile a list of patterns.
pub fn compile_patterns<S: AsRef<str>>(patterns: &[S]) -> Result<Vec<PathPattern>> {
    patterns.iter().map(|p| PathPattern::new(p.as_ref())).collect()
}

fn escape_segment(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    for c in segment.chars() {
        if matches!(c, '?' | '[' | ']' | '{' | '}' | '\\' | '!') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
