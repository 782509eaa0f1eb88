//! Production `ArtifactFetcher`: HTTP artifacts through [`ArchiveFetcher`],
//! git artifacts through [`GitFetcher`].

use std::path::Path;

use anyhow::Result;

use matrix_common::{GitSpec, HttpSpec};

use crate::application::ports::{ArtifactFetcher, CommandRunner, Downloader};
use crate::infra::archive::ArchiveFetcher;
use crate::infra::git::GitFetcher;

pub struct SecureFetcher<'a, D: Downloader, R: CommandRunner> {
    archive: ArchiveFetcher<'a, D>,
    git: GitFetcher<'a, R>,
}

impl<'a, D: Downloader, R: CommandRunner> SecureFetcher<'a, D, R> {
    #[must_use]
    pub fn new(archive: ArchiveFetcher<'a, D>, git: GitFetcher<'a, R>) -> Self {
        Self { archive, git }
    }
}

impl<D: Downloader, R: CommandRunner> ArtifactFetcher for SecureFetcher<'_, D, R> {
    async fn fetch_http(&self, spec: &HttpSpec, target: &Path) -> Result<()> {
        self.archive.fetch(spec, target).await
    }

    async fn fetch_git(&self, spec: &GitSpec, target: &Path) -> Result<()> {
        self.git.fetch(spec, target).await
    }
}
