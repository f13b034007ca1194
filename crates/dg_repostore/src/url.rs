//! Canonical repository URL handling (§6 "URL canonicalization").

/// Strips `git@host:` SCP-style syntax, any `scheme://` prefix, and a
/// trailing `.git`, leaving a bare `host/path` string.
pub fn clean_repo_url(url: &str) -> String {
    let mut s = url.trim();

    if let Some(rest) = s.strip_prefix("git@") {
        if let Some((host, path)) = rest.split_once(':') {
            return format!("{}/{}", host, strip_dot_git(path));
        }
    }

    if let Some(idx) = s.find("://") {
        s = &s[idx + 3..];
    }

    strip_dot_git(s).to_string()
}

fn strip_dot_git(s: &str) -> &str {
    s.strip_suffix(".git").unwrap_or(s)
}

/// `"https://" + clean_repo_url(url)`.
pub fn fix_repo_url(url: &str) -> String {
    format!("https://{}", clean_repo_url(url))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_scp_syntax() {
        assert_eq!(
            clean_repo_url("git@github.com:golang/go.git"),
            "github.com/golang/go"
        );
    }

    #[test]
    fn strips_scheme_and_suffix() {
        assert_eq!(
            clean_repo_url("https://github.com/golang/go.git"),
            "github.com/golang/go"
        );
    }

    #[test]
    fn leaves_bare_host_path_untouched() {
        assert_eq!(clean_repo_url("github.com/golang/go"), "github.com/golang/go");
    }

    #[test]
    fn fix_repo_url_reprefixes_https() {
        assert_eq!(
            fix_repo_url("git@github.com:golang/go.git"),
            "https://github.com/golang/go"
        );
    }

    #[test]
    fn clean_of_fix_round_trips_for_any_input_shape() {
        for input in [
            "git@github.com:golang/go.git",
            "https://github.com/golang/go.git",
            "http://github.com/golang/go",
            "github.com/golang/go",
        ] {
            assert_eq!(clean_repo_url(&fix_repo_url(input)), clean_repo_url(input));
        }
    }
}
