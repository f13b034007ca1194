//! A loader that always fails, for scaffolding environments where no
//! language-specific discovery has been wired up yet.

use crate::{Loader, LoaderError, Repo, Result};
use async_trait::async_trait;
use dg_api::request::LoaderOptions;
use std::path::Path;

pub struct StubLoader;

#[async_trait]
impl Loader for StubLoader {
    async fn load(&self, _dir: &Path, _opts: &LoaderOptions) -> Result<Vec<Repo>> {
        Err(LoaderError::NotImplemented)
    }
}
