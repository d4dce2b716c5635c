/*!
 * Double-star glob matching for watch-root-relative paths.
 *
 * Two pure predicates: `is_excluded` (the exclude list) and `should_watch` (the dynamically
 * re-evaluated include list). Both normalize slashes before matching so config authors don't
 * have to get leading/trailing `/` exactly right.
 */

/// `folder` must end with `/`. True iff `path` is `folder` itself or anything under it.
pub fn is_parent(folder: &str, path: &str) -> bool {
    debug_assert!(folder.ends_with('/'));
    glob_match(&format!("{folder}**"), path)
}

/// True iff any pattern in `excludes` matches `path`.
///
/// Normalization: a leading `/` is added to both pattern and path if missing. If the pattern
/// has no trailing `/` but `path` does, the trailing `/` is stripped from `path` before
/// matching (so a file-shaped exclude pattern can still match a directory's own path).
pub fn is_excluded(path: &str, excludes: &[String]) -> bool {
    for exclude in excludes {
        let pattern = with_leading_slash(exclude);
        let mut candidate = with_leading_slash(path);
        if !pattern.ends_with('/') && candidate.ends_with('/') {
            candidate.pop();
        }
        if glob_match(&pattern, &candidate) {
            return true;
        }
    }
    false
}

/// True iff `includes` is `None`/empty, or some include prefix `I` satisfies
/// `match(I + "**", path) OR match(path + "**", I)`.
///
/// The second disjunct lets the watcher walk through an ancestor directory of an included
/// subtree — we must watch `/a/` to ever reach an included `/a/b/c/`.
pub fn should_watch(path: &str, includes: Option<&[String]>) -> bool {
    let Some(includes) = includes else {
        return true;
    };
    if includes.is_empty() {
        return true;
    }
    includes.iter().any(|include| {
        glob_match(&format!("{include}**"), path) || glob_match(&format!("{path}**"), include)
    })
}

fn with_leading_slash(s: &str) -> String {
    if s.starts_with('/') {
        s.to_string()
    } else {
        format!("/{s}")
    }
}

/// Double-star glob match. Falls back to `false` on an unparsable pattern rather than
/// propagating an error — a malformed exclude/include pattern should not take the watcher
/// down, it should just fail to match (and get logged by the caller when it matters).
///
/// `require_literal_separator: true` keeps a lone `*` from crossing a `/` (§4.1: "`*` matches
/// within a single segment"); the `glob` crate still treats a standalone `**` path component
/// as the cross-separator wildcard even with this set, which is the only case we need it to.
fn glob_match(pattern: &str, path: &str) -> bool {
    match glob::Pattern::new(pattern) {
        Ok(p) => p.matches_with(
            path,
            glob::MatchOptions {
                case_sensitive: true,
                require_literal_separator: true,
                require_literal_leading_dot: false,
            },
        ),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn excludes(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn exclude_matches_subtree() {
        let ex = excludes(&["/target/**"]);
        assert!(is_excluded("target/debug/build", &ex));
        assert!(!is_excluded("src/main.rs", &ex));
    }

    #[test]
    fn exclude_normalizes_missing_leading_slash() {
        let ex = excludes(&["target/**"]);
        assert!(is_excluded("/target/debug", &ex));
    }

    #[test]
    fn exclude_strips_trailing_slash_when_pattern_has_none() {
        let ex = excludes(&["/a/b"]);
        assert!(is_excluded("a/b/", &ex));
    }

    #[test]
    fn should_watch_true_when_includes_absent() {
        assert!(should_watch("anything/", None));
        assert!(should_watch("anything/", Some(&[])));
    }

    #[test]
    fn should_watch_matches_descendant_of_include() {
        let inc = excludes(&["/a/b/"]);
        assert!(should_watch("/a/b/c/", Some(&inc)));
    }

    #[test]
    fn should_watch_matches_ancestor_of_include() {
        let inc = excludes(&["/a/b/c/"]);
        // We must be able to watch /a/ to eventually reach /a/b/c/.
        assert!(should_watch("/a/", Some(&inc)));
    }

    #[test]
    fn should_watch_false_for_unrelated_subtree() {
        let inc = excludes(&["/a/b/"]);
        assert!(!should_watch("/z/", Some(&inc)));
    }

    #[test]
    fn single_star_does_not_cross_path_separators() {
        let ex = excludes(&["*.log"]);
        assert!(is_excluded("a.log", &ex));
        assert!(!is_excluded("a/b.log", &ex));
    }

    #[test]
    fn single_star_exclude_matches_only_its_own_segment() {
        let ex = excludes(&["/a/*"]);
        assert!(is_excluded("/a/b", &ex));
        assert!(!is_excluded("/a/b/c", &ex));
    }

    #[test]
    fn is_parent_requires_trailing_slash_on_folder() {
        assert!(is_parent("a/", "a/b"));
        assert!(is_parent("a/", "a/b/c"));
        assert!(!is_parent("a/", "ab"));
    }
}
