//! String and path matching primitives used by the gate.

use std::path::{Component, Path, PathBuf};

/// Characters that end the distribution name in a pip requirement.
const PIP_SPEC_DELIMITERS: &[char] = &['[', '<', '>', '=', '!', '~', ';', '@'];

/// Shell-style wildcard match (`*`, `?`, `[...]`, `[!...]`).
///
/// `*` crosses `/`. A pattern that does not compile (e.g. an unclosed `[`)
/// only matches itself literally.
pub fn glob_match(value: &str, pattern: &str) -> bool {
    let pattern = collapse_stars(pattern);
    match glob::Pattern::new(&pattern) {
        Ok(compiled) => compiled.matches(value),
        Err(_) => value == pattern,
    }
}

// glob rejects `**` unless it is a whole path component; fnmatch treats it as `*`.
fn collapse_stars(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len());
    let mut prev_star = false;
    for c in pattern.chars() {
        if c == '*' && prev_star {
            continue;
        }
        prev_star = c == '*';
        out.push(c);
    }
    out
}

/// Lexically normalizes a path: drops `.`, resolves `..`, collapses separators.
/// Never touches the filesystem, so symlinks are not followed.
pub fn normalize_path(path: &str) -> PathBuf {
    let mut out = PathBuf::new();
    for component in Path::new(path).components() {
        match component {
            Component::Prefix(_) => {}
            Component::RootDir => out.push("/"),
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                // `/..` is `/`
                Some(Component::RootDir) => {}
                _ => out.push(".."),
            },
            Component::Normal(part) => out.push(part),
        }
    }
    out
}

/// True when `path` equals `prefix` or lies beneath it, compared by whole
/// components after normalization (`/opt/app2` is not under `/opt/app`).
pub fn is_within(path: &str, prefix: &str) -> bool {
    let prefix = normalize_path(prefix);
    if prefix.as_os_str().is_empty() {
        return false;
    }
    let path = normalize_path(path);
    if path.as_os_str().is_empty() {
        return false;
    }
    path.starts_with(&prefix)
}

/// Strips version specifiers and extras from a pip requirement:
/// `"requests[socks]>=2.0"` becomes `"requests"`.
pub fn pip_distribution_name(spec: &str) -> &str {
    let end = spec.find(PIP_SPEC_DELIMITERS).unwrap_or(spec.len());
    spec[..end].trim()
}

/// First `http://` or `https://` token in a line, without a trailing slash.
pub fn first_http_url(line: &str) -> Option<&str> {
    line.split_whitespace()
        .find(|token| token.starts_with("http://") || token.starts_with("https://"))
        .map(|token| token.trim_end_matches('/'))
}

/// Collapses every whitespace run to a single space and trims the ends.
pub fn normalize_whitespace(line: &str) -> String {
    line.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// First word of a shell command line, honouring shell quoting.
pub fn first_shell_word(line: &str) -> Option<String> {
    shlex::split(line)?.into_iter().next()
}

#[cfg(test)]
mod tests {
    use super::*;

    // ================================================================
    // glob_match
    // ================================================================

    #[test]
    fn glob_star_and_question() {
        assert!(glob_match("jellyfin-server", "jellyfin*"));
        assert!(glob_match("jellyfin", "jellyfin*"));
        assert!(glob_match("lib1", "lib?"));
        assert!(!glob_match("lib12", "lib?"));
    }

    #[test]
    fn glob_star_crosses_slashes() {
        assert!(glob_match(
            "https://downloads.plex.tv/repo/deb/Release",
            "https://downloads.plex.tv/*"
        ));
        assert!(glob_match("/opt/venv/bin/crawl4ai-setup", "/opt/venv/bin/*"));
    }

    #[test]
    fn glob_character_classes() {
        assert!(glob_match("php8", "php[78]"));
        assert!(!glob_match("php9", "php[78]"));
        assert!(glob_match("php9", "php[!78]"));
    }

    #[test]
    fn glob_double_star_behaves_like_single() {
        assert!(glob_match("a/b/c", "a**c"));
    }

    #[test]
    fn glob_invalid_pattern_is_literal() {
        assert!(glob_match("weird[", "weird["));
        assert!(!glob_match("weird", "weird["));
    }

    #[test]
    fn glob_literal_requires_equality() {
        assert!(glob_match("nginx", "nginx"));
        assert!(!glob_match("nginxx", "nginx"));
        assert!(!glob_match("ngin", "nginx"));
    }

    // ================================================================
    // Paths
    // ================================================================

    #[test]
    fn normalize_resolves_dots_and_separators() {
        assert_eq!(normalize_path("/opt//app/./sub/../file"), PathBuf::from("/opt/app/file"));
        assert_eq!(normalize_path("/../../etc"), PathBuf::from("/etc"));
        assert_eq!(normalize_path("/opt/app/"), PathBuf::from("/opt/app"));
        assert_eq!(normalize_path("../x"), PathBuf::from("../x"));
    }

    #[test]
    fn within_requires_component_boundary() {
        assert!(is_within("/opt/app/sub/file", "/opt/app"));
        assert!(is_within("/opt/app", "/opt/app/"));
        assert!(!is_within("/opt/app2/file", "/opt/app"));
        assert!(!is_within("/opt/myapp/../../etc/passwd", "/opt/myapp"));
    }

    #[test]
    fn root_prefix_allows_absolute_paths_only() {
        assert!(is_within("/etc/shadow", "/"));
        assert!(!is_within("relative/file", "/"));
    }

    #[test]
    fn empty_values_never_match() {
        assert!(!is_within("", "/opt"));
        assert!(!is_within("/opt", ""));
    }

    // ================================================================
    // pip, URLs, whitespace, shell words
    // ================================================================

    #[test]
    fn pip_name_strips_specifiers_and_extras() {
        assert_eq!(pip_distribution_name("foo<2"), "foo");
        assert_eq!(pip_distribution_name("requests[socks]>=2.0"), "requests");
        assert_eq!(pip_distribution_name("uvicorn ==0.30"), "uvicorn");
        assert_eq!(pip_distribution_name("pkg; python_version<'3.12'"), "pkg");
        assert_eq!(pip_distribution_name("pkg @ https://x/y.whl"), "pkg");
        assert_eq!(pip_distribution_name("foo~=1.4"), "foo");
        assert_eq!(pip_distribution_name("foo!=1.4"), "foo");
        assert_eq!(pip_distribution_name("foo-bar"), "foo-bar");
    }

    #[test]
    fn first_url_found_and_trimmed() {
        assert_eq!(
            first_http_url("deb [signed-by=/usr/share/keyrings/plex.gpg] https://downloads.plex.tv/repo/deb/ public main"),
            Some("https://downloads.plex.tv/repo/deb")
        );
        assert_eq!(first_http_url("deb http://a.b/c stable"), Some("http://a.b/c"));
        assert_eq!(first_http_url("deb ftp://a.b/c stable"), None);
    }

    #[test]
    fn whitespace_normalization() {
        assert_eq!(normalize_whitespace("  deb   https://x   stable\tmain "), "deb https://x stable main");
    }

    #[test]
    fn shell_word_honours_quotes() {
        assert_eq!(first_shell_word("git clone https://x"), Some("git".to_string()));
        assert_eq!(
            first_shell_word("'/opt/my app/bin/tool' --flag"),
            Some("/opt/my app/bin/tool".to_string())
        );
        assert_eq!(first_shell_word("   "), None);
        assert_eq!(first_shell_word("echo 'unterminated"), None);
    }
}
