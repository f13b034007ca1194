//! A minimal, intentionally naive reference [`Loader`]: walks a cloned tree
//! grouping source files by directory, and treats each directory holding at
//! least one recognized source file as one package. Good enough to drive
//! the engine end-to-end against a real clone; a production deployment is
//! expected to swap in a real language toolchain's package index instead.

use crate::{Loader, LoaderError, Package, PackageType, Remote, Repo, Result, SourceFile};
use async_trait::async_trait;
use dg_api::request::LoaderOptions;
use regex::Regex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Recognizes Go-flavored source trees: files ending in `.go`, a
/// `package <name>` clause, and `import (...)` / `import "..."` stanzas.
/// The format is chosen because it is simple enough to scan with a couple
/// of regexes while still exercising every `Package` field the contract
/// defines.
pub struct ReferenceLoader;

fn package_clause_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^\s*package\s+([A-Za-z_][A-Za-z0-9_]*)").unwrap())
}

fn import_block_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)import\s*\(\s*(.*?)\)").unwrap())
}

fn import_single_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"(?m)^\s*import\s+"([^"]+)""#).unwrap())
}

fn quoted_path_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#""([^"]+)""#).unwrap())
}

const SKIP_DIRS: &[&str] = &[".git", "vendor", "node_modules", "testdata"];

fn walk(root: &Path, dir: &Path, out: &mut BTreeMap<PathBuf, Vec<PathBuf>>) -> std::io::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.starts_with('.') || SKIP_DIRS.contains(&name.as_ref()) {
                continue;
            }
            walk(root, &path, out)?;
        } else if path.extension().and_then(|e| e.to_str()) == Some("go") {
            let parent = path.parent().unwrap_or(root).to_path_buf();
            out.entry(parent).or_default().push(path);
        }
    }
    Ok(())
}

fn extract_imports(source: &str) -> Vec<String> {
    let mut imports = Vec::new();
    if let Some(caps) = import_block_re().captures(source) {
        for m in quoted_path_re().captures_iter(&caps[1]) {
            imports.push(m[1].to_string());
        }
    }
    for caps in import_single_re().captures_iter(source) {
        imports.push(caps[1].to_string());
    }
    imports.sort();
    imports.dedup();
    imports
}

fn import_path_for(
    root: &Path,
    dir: &Path,
    opts: &LoaderOptions,
) -> String {
    let rel = dir.strip_prefix(root).unwrap_or(dir);
    let rel_str = rel.to_string_lossy().replace(std::path::MAIN_SEPARATOR, "/");
    let prefix = opts.package_prefix.as_deref().unwrap_or("");
    match (opts.trim_repo_prefix, rel_str.is_empty()) {
        (_, true) => prefix.trim_end_matches('/').to_string(),
        (true, false) => format!("{}/{}", prefix.trim_end_matches('/'), rel_str),
        (false, false) => format!("{}/{}", prefix.trim_end_matches('/'), rel_str),
    }
}

#[async_trait]
impl Loader for ReferenceLoader {
    async fn load(&self, dir: &Path, opts: &LoaderOptions) -> Result<Vec<Repo>> {
        let dir = dir.to_path_buf();
        let opts = opts.clone();
        let packages = tokio::task::spawn_blocking(move || -> std::io::Result<Vec<Package>> {
            let mut by_dir: BTreeMap<PathBuf, Vec<PathBuf>> = BTreeMap::new();
            walk(&dir, &dir, &mut by_dir)?;

            let mut packages = Vec::new();
            for (pkg_dir, files) in by_dir {
                let mut name = None;
                let mut imports = Vec::new();
                let mut sources = Vec::new();
                for file in &files {
                    let content = std::fs::read_to_string(file).unwrap_or_default();
                    if name.is_none() {
                        name = package_clause_re()
                            .captures(&content)
                            .map(|c| c[1].to_string());
                    }
                    imports.extend(extract_imports(&content));
                    let repo_path = file
                        .strip_prefix(&dir)
                        .unwrap_or(file)
                        .to_string_lossy()
                        .replace(std::path::MAIN_SEPARATOR, "/");
                    let digest = if opts.hash_source_files {
                        use sha1::{Digest, Sha1};
                        let mut hasher = Sha1::new();
                        hasher.update(content.as_bytes());
                        Some(hex::encode(hasher.finalize()))
                    } else {
                        None
                    };
                    sources.push(SourceFile { repo_path, digest });
                }
                let Some(name) = name else { continue };
                imports.sort();
                imports.dedup();

                let package_type = if opts.standard_library {
                    PackageType::Stdlib
                } else if name == "main" {
                    PackageType::Program
                } else {
                    PackageType::Library
                };

                let import_path = import_path_for(&dir, &pkg_dir, &opts);
                if import_path.is_empty() {
                    continue;
                }

                packages.push(Package {
                    name,
                    import_path,
                    imports,
                    package_type,
                    sources,
                });
            }
            Ok(packages)
        })
        .await
        .map_err(|e| LoaderError::Io(e.to_string()))?
        .map_err(|e| LoaderError::Io(e.to_string()))?;

        if packages.is_empty() {
            return Ok(Vec::new());
        }

        Ok(vec![Repo {
            from: "reference-loader".to_string(),
            remotes: vec![Remote {
                name: "origin".to_string(),
                url: String::new(),
            }],
            packages,
        }])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_imports_from_block_and_single_form() {
        let src = r#"
package foo

import (
    "fmt"
    "github.com/u/bar"
)

import "os"
"#;
        let imports = extract_imports(src);
        assert_eq!(imports, vec!["fmt", "github.com/u/bar", "os"]);
    }

    #[test]
    fn detects_program_vs_library() {
        assert!(package_clause_re().is_match("package main\n"));
    }

    #[tokio::test]
    async fn loads_a_synthetic_tree() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("pkg/sub")).unwrap();
        std::fs::write(
            dir.path().join("pkg/sub/a.go"),
            "package sub\n\nimport \"fmt\"\n\nfunc F() { fmt.Println() }\n",
        )
        .unwrap();

        let loader = ReferenceLoader;
        let opts = LoaderOptions {
            trim_repo_prefix: true,
            package_prefix: Some("github.com/u/repo".to_string()),
            ..Default::default()
        };
        let repos = loader.load(dir.path(), &opts).await.unwrap();
        assert_eq!(repos.len(), 1);
        let pkg = &repos[0].packages[0];
        assert_eq!(pkg.name, "sub");
        assert_eq!(pkg.import_path, "github.com/u/repo/pkg/sub");
        assert_eq!(pkg.imports, vec!["fmt".to_string()]);
    }
}
