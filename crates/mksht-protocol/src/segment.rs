//! Classification of a single URL path segment.

/// A single non-empty token between slashes, classified by its role in
/// document resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathSegment<'a> {
    /// Plain literal name.
    Normal(&'a str),
    /// `..`
    Parent,
    /// `.`
    Current,
    /// Leading `.` or `_`. Never served.
    Hidden(&'a str),
    /// Leading `!`. Carries the name with the marker stripped.
    Exec(&'a str),
}

impl<'a> PathSegment<'a> {
    /// Classify a raw (already decoded) segment.
    ///
    /// Only one exec marker is stripped; the rest is pushed as a literal
    /// (`!!x` names the document `!x`). The rest must not be empty, a dot
    /// segment or hidden: `!`, `!..` and `!.env` classify as hidden.
    pub fn classify(segment: &'a str) -> Self {
        match segment {
            "" => Self::Hidden(segment),
            ".." => Self::Parent,
            "." => Self::Current,
            s if is_hidden_name(s) => Self::Hidden(s),
            s => match s.strip_prefix('!') {
                Some(name) if name.is_empty() || is_hidden_name(name) => Self::Hidden(s),
                Some(name) => Self::Exec(name),
                None => Self::Normal(s),
            },
        }
    }
}

/// Leading `.` (which covers `.` and `..`) or `_`.
fn is_hidden_name(name: &str) -> bool {
    name.starts_with('.') || name.starts_with('_')
}
