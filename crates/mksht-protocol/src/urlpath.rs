//! Slash-separated URL path helpers.
//!
//! These work on the raw request path and never touch the filesystem.
//! Empty segments produced by repeated slashes are skipped rather than
//! treated as `.`.

/// Pop the first non-empty segment off `path`.
///
/// Returns the segment and the remainder. The remainder keeps its leading
/// slash (or is empty), so it can be fed straight back into `pop_left`.
/// A path made only of slashes, or an empty path, yields `("", "")`.
///
/// ```
/// use mksht_protocol::pop_left;
///
/// assert_eq!(pop_left("//a/b/c"), ("a", "/b/c"));
/// assert_eq!(pop_left("///"), ("", ""));
/// ```
pub fn pop_left(path: &str) -> (&str, &str) {
    let trimmed = path.trim_start_matches('/');
    match trimmed.find('/') {
        Some(idx) => (&trimmed[..idx], &trimmed[idx..]),
        None => (trimmed, ""),
    }
}

/// Iterate over the non-empty segments of `path`, left to right.
pub fn segments(path: &str) -> impl Iterator<Item = &str> {
    let mut rest = path;
    std::iter::from_fn(move || {
        let (segment, remainder) = pop_left(rest);
        rest = remainder;
        (!segment.is_empty()).then_some(segment)
    })
}

/// Split `path` into its directory part and its last segment.
///
/// The directory keeps whatever slashes precede the last segment, minus the
/// separating one: `"/temp/data.json"` splits into `("/temp", "data.json")`.
pub fn split(path: &str) -> (&str, &str) {
    let path = path.trim_end_matches('/');
    match path.rfind('/') {
        Some(idx) => (&path[..idx], &path[idx + 1..]),
        None => ("", path),
    }
}

/// Join path parts into one absolute, slash-separated path.
///
/// Every part is re-segmented, so stray or repeated slashes collapse:
/// `join(["/", "ws1", "/temp/", "a.txt"])` is `"/ws1/temp/a.txt"`.
pub fn join<'a>(parts: impl IntoIterator<Item = &'a str>) -> String {
    let mut joined = String::new();
    for part in parts {
        for segment in segments(part) {
            joined.push('/');
            joined.push_str(segment);
        }
    }
    if joined.is_empty() {
        joined.push('/');
    }
    joined
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pop_left_table() {
        let table = [
            ("/a/b/c", "a", "/b/c"),
            ("//a/b/c", "a", "/b/c"),
            ("/a//b/c", "a", "//b/c"),
            ("/c", "c", ""),
            ("/", "", ""),
            ("a/b/c", "a", "/b/c"),
            ("a//b/c", "a", "//b/c"),
            ("c", "c", ""),
            ("", "", ""),
            ("///", "", ""),
            ("/a/", "a", "/"),
        ];
        for (path, segment, rest) in table {
            assert_eq!(pop_left(path), (segment, rest), "path: {path:?}");
        }
    }

    #[test]
    fn pop_left_until_empty_terminates() {
        for path in ["", "/", "///", "/a", "//a//b///c//", "a/b"] {
            let mut rest = path;
            let mut steps = 0;
            loop {
                let (segment, remainder) = pop_left(rest);
                if segment.is_empty() {
                    assert_eq!(remainder, "");
                    break;
                }
                assert!(remainder.len() < rest.len());
                rest = remainder;
                steps += 1;
                assert!(steps <= path.len());
            }
            // Exhausted paths stay exhausted.
            assert_eq!(pop_left(rest), ("", ""));
        }
    }

    #[test]
    fn segments_skip_empty() {
        let collected: Vec<_> = segments("//a///b/c/").collect();
        assert_eq!(collected, ["a", "b", "c"]);
        assert_eq!(segments("////").count(), 0);
    }

    #[test]
    fn split_dir_and_name() {
        assert_eq!(split("/temp/data.json"), ("/temp", "data.json"));
        assert_eq!(split("/data.json"), ("", "data.json"));
        assert_eq!(split("data.json"), ("", "data.json"));
        assert_eq!(split("/a/b/"), ("/a", "b"));
        assert_eq!(split(""), ("", ""));
    }

    #[test]
    fn join_collapses_slashes() {
        assert_eq!(join(["/", "ws1", "/temp/", "a.txt"]), "/ws1/temp/a.txt");
        assert_eq!(join(["ws1", "", "a.txt"]), "/ws1/a.txt");
        assert_eq!(join(["", "/"]), "/");
    }
}
