// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The migration verification framework: interfaces for reading test
//! fixtures, reaching the source and destination clouds, and comparing the
//! resources observed on both sides of a migration.

use anyhow::{Context, Result};
use camino::Utf8PathBuf;
use thiserror::Error;
use tracing::info;

pub mod cloud;
pub mod compare;
pub mod config;
pub mod filter;
pub mod health;
pub mod remote;
mod scope;

pub use cloud::Cloud;
pub use filter::FilterEngine;
pub use remote::RemoteExec;
pub use scope::AdminRoleGrant;

#[derive(Debug, Error)]
pub enum TestSkippedError {
    #[error("Test skipped: {0:?}")]
    TestSkipped(Option<String>),
}

/// Parameters used to construct the test framework.
pub struct FrameworkParameters {
    /// The path to the YAML test configuration describing both clouds, the
    /// migration filter file, and the expected-resource fixture.
    pub config_path: Utf8PathBuf,
}

/// The test context, constructed once per run and shared by every test case.
///
/// Holds the immutable configuration and fixture values and the two cloud
/// accessor facades. Tests own the context exclusively and sequentially; there
/// is no shared mutable state between test cases.
pub struct Framework {
    config: config::TestConfig,
    expected: config::ExpectedConfig,
    filter: FilterEngine,
    remote: RemoteExec,
    src: Cloud,
    dst: Cloud,
}

impl Framework {
    /// Loads the test configuration and fixtures and authenticates against
    /// both clouds. A missing or malformed configuration file fails here,
    /// before any test body runs.
    pub fn new(params: FrameworkParameters) -> Result<Self> {
        let config = config::TestConfig::from_file(&params.config_path)?;
        let expected = config::ExpectedConfig::from_file(&config.expected_path)
            .with_context(|| {
                format!(
                    "failed to load expected-resource fixture {}",
                    config.expected_path
                )
            })?;

        info!(cloud = "src", url = %config.src.auth_url, "authenticating");
        let src = Cloud::connect(&config.src)?;
        info!(cloud = "dst", url = %config.dst.auth_url, "authenticating");
        let dst = Cloud::connect(&config.dst)?;

        let filter = FilterEngine::new(config.migrate.filter_path.clone());
        let remote = RemoteExec::new(config.ssh.clone());
        Ok(Self { config, expected, filter, remote, src, dst })
    }

    /// The cloud resources are migrated from.
    pub fn source(&self) -> &Cloud {
        &self.src
    }

    /// The cloud resources are migrated to.
    pub fn destination(&self) -> &Cloud {
        &self.dst
    }

    pub fn config(&self) -> &config::TestConfig {
        &self.config
    }

    pub fn expected(&self) -> &config::ExpectedConfig {
        &self.expected
    }

    pub fn filtering(&self) -> &FilterEngine {
        &self.filter
    }

    pub fn remote(&self) -> &RemoteExec {
        &self.remote
    }
}
