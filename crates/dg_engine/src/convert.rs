//! Conversions between the engine-internal `dg_graph`/`dg_repostore` types
//! (bincode-encoded, stored) and the `dg_api::response` wire DTOs
//! (JSON-encoded, sent over RPC). Kept in one place so the mapping between
//! the two type families never drifts between call sites.

pub fn package_row_to_wire(row: &dg_graph::PackageRow) -> dg_api::response::PackageRow {
    dg_api::response::PackageRow {
        name: row.name.clone(),
        import_path: row.import_path.clone(),
        repository: row.repository.clone(),
        directs: row.directs.clone(),
        source_files: row.source_files.iter().map(source_file_to_wire).collect(),
        package_type: package_type_to_wire(row.package_type),
        ranking: row.ranking,
    }
}

fn source_file_to_wire(f: &dg_graph::SourceFile) -> dg_api::response::SourceFile {
    dg_api::response::SourceFile {
        repo_relative_path: f.repo_relative_path.clone(),
        content_digest: f.content_digest.clone(),
    }
}

fn package_type_to_wire(t: dg_graph::PackageType) -> dg_api::response::PackageType {
    match t {
        dg_graph::PackageType::Unknown => dg_api::response::PackageType::Unknown,
        dg_graph::PackageType::Stdlib => dg_api::response::PackageType::Stdlib,
        dg_graph::PackageType::Library => dg_api::response::PackageType::Library,
        dg_graph::PackageType::Program => dg_api::response::PackageType::Program,
    }
}

fn loader_package_type(t: dg_loader::PackageType) -> dg_graph::PackageType {
    match t {
        dg_loader::PackageType::Unknown => dg_graph::PackageType::Unknown,
        dg_loader::PackageType::Stdlib => dg_graph::PackageType::Stdlib,
        dg_loader::PackageType::Library => dg_graph::PackageType::Library,
        dg_loader::PackageType::Program => dg_graph::PackageType::Program,
    }
}

/// Converts one `Loader`-reported package into the `Graph::add_all` input
/// shape. Source digests are passed through as the loader reported them;
/// hashing them in the first place (when `hash_source_files` was requested)
/// is `dg_loader::reference`'s job, not this conversion's.
pub fn loader_package_to_input(pkg: dg_loader::Package) -> dg_graph::PackageInput {
    dg_graph::PackageInput {
        name: pkg.name,
        import_path: pkg.import_path,
        directs: pkg.imports,
        source_files: Some(
            pkg.sources
                .into_iter()
                .map(|s| dg_graph::SourceFile {
                    repo_relative_path: s.repo_path,
                    content_digest: s.digest,
                })
                .collect(),
        ),
        package_type: loader_package_type(pkg.package_type),
    }
}

pub fn repo_status_to_wire(status: &dg_repostore::RepoStatus) -> dg_api::response::RepoStatus {
    dg_api::response::RepoStatus {
        repository: status.repository.clone(),
        ref_name: status.ref_name.clone(),
        digest: status.digest.clone(),
        error_count: status.error_count,
        prefix: status.prefix.clone(),
        tag: status.tag.clone(),
        last_check: status.last_check,
        updates: status
            .updates
            .iter()
            .map(|u| dg_api::response::UpdateEntry { when: u.when, digest: u.digest.clone() })
            .collect(),
    }
}
