//! Vanity import path resolution (§4.6 `Resolve`): turns an import path like
//! `gopkg.in/yaml.v2` or `example.org/pkg` into the repository URL that
//! actually hosts it.

use dg_vcs::VcsClient;

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("malformed import path: {0}")]
    Malformed(String),
    #[error("repository does not exist: {0}")]
    NotFound(String),
    #[error("http request failed: {0}")]
    Http(String),
    #[error("no go-import meta tag found for {0}")]
    NoMetaTag(String),
    #[error("vcs error: {0}")]
    Vcs(#[from] dg_vcs::VcsError),
}

pub type Result<T> = std::result::Result<T, ResolveError>;

/// `{repository, prefix, importPath}` (§4.6).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    pub repository: String,
    pub prefix: String,
    pub import_path: String,
}

/// Resolves `package` to its hosting repository.
///
/// Host-specific short-circuits (`github.com`, `bitbucket.org`, `gopkg.in`)
/// avoid a network round-trip or use a cheap existence probe instead of a
/// full HTML fetch; anything else falls back to the `?go-get=1` HTML
/// meta-tag convention.
pub async fn resolve(package: &str, vcs: &dyn VcsClient) -> Result<Resolved> {
    let mut segments = package.split('/');
    let host = segments
        .next()
        .filter(|h| !h.is_empty())
        .ok_or_else(|| ResolveError::Malformed(package.to_string()))?;

    match host {
        "github.com" | "bitbucket.org" => resolve_well_known_host(package, vcs).await,
        "gopkg.in" => resolve_gopkg_in(package),
        _ => resolve_via_meta_tag(package).await,
    }
}

async fn resolve_well_known_host(package: &str, vcs: &dyn VcsClient) -> Result<Resolved> {
    let parts: Vec<&str> = package.split('/').collect();
    if parts.len() < 3 {
        return Err(ResolveError::Malformed(package.to_string()));
    }
    let prefix = parts[..3].join("/");
    let repository = format!("https://{}", prefix);
    if !vcs.exists(&repository).await? {
        return Err(ResolveError::NotFound(repository));
    }
    Ok(Resolved {
        repository,
        prefix,
        import_path: package.to_string(),
    })
}

/// `gopkg.in/pkg.vN` -> `github.com/go-pkg/pkg`;
/// `gopkg.in/user/pkg.vN` -> `github.com/user/pkg`.
fn resolve_gopkg_in(package: &str) -> Result<Resolved> {
    let rest = package
        .strip_prefix("gopkg.in/")
        .ok_or_else(|| ResolveError::Malformed(package.to_string()))?;
    let parts: Vec<&str> = rest.split('/').collect();

    let (owner, pkg_with_version) = match parts.as_slice() {
        [pkg_with_version] => (None, *pkg_with_version),
        [user, pkg_with_version, ..] => (Some(*user), *pkg_with_version),
        [] => return Err(ResolveError::Malformed(package.to_string())),
    };

    let pkg = strip_major_version(pkg_with_version)
        .ok_or_else(|| ResolveError::Malformed(package.to_string()))?;

    let prefix_suffix = match owner {
        Some(user) => format!("{}/{}", user, pkg),
        None => format!("go-{}/{}", pkg, pkg),
    };

    let prefix = format!("gopkg.in/{}", rest);
    let repository = format!("https://github.com/{}", prefix_suffix);
    Ok(Resolved {
        repository,
        prefix,
        import_path: package.to_string(),
    })
}

fn strip_major_version(pkg_with_version: &str) -> Option<&str> {
    let dot = pkg_with_version.rfind(".v")?;
    let (name, version) = pkg_with_version.split_at(dot);
    let version = &version[2..];
    if !version.is_empty() && version.chars().all(|c| c.is_ascii_digit()) {
        Some(name)
    } else {
        None
    }
}

async fn resolve_via_meta_tag(package: &str) -> Result<Resolved> {
    let url = format!("https://{}?go-get=1", package);
    let client = reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .map_err(|e| ResolveError::Http(e.to_string()))?;
    let response = client
        .get(&url)
        .send()
        .await
        .map_err(|e| ResolveError::Http(e.to_string()))?;

    let status = response.status();
    if status.as_u16() != 200 && status.as_u16() != 404 {
        return Err(ResolveError::Http(format!("unexpected status {}", status)));
    }

    let body = response
        .text()
        .await
        .map_err(|e| ResolveError::Http(e.to_string()))?;

    let (prefix, repository) =
        parse_go_import_meta(&body).ok_or_else(|| ResolveError::NoMetaTag(package.to_string()))?;

    Ok(Resolved {
        repository,
        prefix,
        import_path: package.to_string(),
    })
}

/// Tolerant scan for `<meta name="go-import" content="<prefix> git <url>">`,
/// stopping at `</head>` or `<body>` so meta tags in the document body
/// (which the go-import convention does not recognize) are never matched.
fn parse_go_import_meta(html: &str) -> Option<(String, String)> {
    let lower = html.to_ascii_lowercase();
    let head_end = lower
        .find("</head>")
        .or_else(|| lower.find("<body"))
        .unwrap_or(html.len());
    let head = &html[..head_end];

    let mut search_from = 0;
    while let Some(rel_start) = head[search_from..].find("<meta") {
        let tag_start = search_from + rel_start;
        let tag_end = head[tag_start..].find('>').map(|i| tag_start + i + 1)?;
        let tag = &head[tag_start..tag_end];

        if attr_value(tag, "name").as_deref() == Some("go-import") {
            if let Some(content) = attr_value(tag, "content") {
                let mut fields = content.split_whitespace();
                let prefix = fields.next();
                let vcs_kind = fields.next();
                let url = fields.next();
                if let (Some(prefix), Some("git"), Some(url)) = (prefix, vcs_kind, url) {
                    return Some((prefix.to_string(), url.to_string()));
                }
            }
        }
        search_from = tag_end;
    }
    None
}

/// Extracts `name="value"` or `name='value'` from a single HTML tag,
/// case-insensitively on the attribute name.
fn attr_value(tag: &str, attr: &str) -> Option<String> {
    let lower = tag.to_ascii_lowercase();
    let needle = format!("{}=", attr);
    let attr_pos = lower.find(&needle)?;
    let rest = &tag[attr_pos + needle.len()..];
    let quote = rest.chars().next()?;
    if quote != '"' && quote != '\'' {
        return None;
    }
    let rest = &rest[1..];
    let end = rest.find(quote)?;
    Some(rest[..end].to_string())
}
