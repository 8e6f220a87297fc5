// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Partitioning of live source-cloud resources against the migration filter
//! file.
//!
//! The filter file is the allow-list the migration itself was driven by.
//! Resources it names are expected on the destination; resources it omits
//! must stay behind. Filtering is opt-in per resource kind: a kind with no
//! section in the file passes through untouched.

use anyhow::{Context, Result};
use camino::Utf8PathBuf;
use serde::Deserialize;

use crate::cloud::resources::{Image, Server, Tenant, Volume};

/// The image the devlab deploys by default; it exists on both clouds
/// regardless of what the migration was asked to move, so it is never
/// treated as filtered out.
pub const DEFAULT_IMAGE_NAME: &str = "Cirros 0.3.0 x86_64";

#[derive(Debug, Default, Deserialize)]
pub struct FilterFixture {
    #[serde(default)]
    pub instances: Option<InstancesSection>,
    #[serde(default)]
    pub images: Option<ImagesSection>,
    #[serde(default)]
    pub volumes: Option<VolumesSection>,
    #[serde(default)]
    pub tenants: Option<TenantsSection>,
}

#[derive(Debug, Deserialize)]
pub struct InstancesSection {
    pub id: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct ImagesSection {
    pub images_list: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct VolumesSection {
    pub volumes_list: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct TenantsSection {
    pub tenant_id: Vec<String>,
}

/// Splits live source-cloud listings into the records the migration should
/// have moved (`kept`) and the records that must be absent from the
/// destination (`excluded`).
#[derive(Debug)]
pub struct FilterEngine {
    fixture_path: Utf8PathBuf,
}

impl FilterEngine {
    pub fn new(fixture_path: Utf8PathBuf) -> Self {
        Self { fixture_path }
    }

    /// Re-reads the filter file. Loaded lazily on every filter call so a
    /// fixture rewritten between tests is picked up.
    fn load(&self) -> Result<FilterFixture> {
        let contents = std::fs::read_to_string(&self.fixture_path)
            .with_context(|| {
                format!("failed to read filter file {}", self.fixture_path)
            })?;
        let fixture: Option<FilterFixture> =
            serde_yaml_ng::from_str(&contents).with_context(|| {
                format!("filter file {} has the wrong format", self.fixture_path)
            })?;
        Ok(fixture.unwrap_or_default())
    }

    pub fn filter_vms(
        &self,
        servers: Vec<Server>,
    ) -> Result<(Vec<Server>, Vec<Server>)> {
        match self.load()?.instances {
            None => Ok((servers, Vec::new())),
            Some(section) => {
                Ok(partition(servers, |vm| section.id.contains(&vm.id)))
            }
        }
    }

    pub fn filter_images(
        &self,
        images: Vec<Image>,
    ) -> Result<(Vec<Image>, Vec<Image>)> {
        match self.load()?.images {
            None => Ok((images, Vec::new())),
            Some(section) => Ok(partition(images, |img| {
                section.images_list.contains(&img.id)
                    || img.name == DEFAULT_IMAGE_NAME
            })),
        }
    }

    pub fn filter_volumes(
        &self,
        volumes: Vec<Volume>,
    ) -> Result<(Vec<Volume>, Vec<Volume>)> {
        match self.load()?.volumes {
            None => Ok((volumes, Vec::new())),
            Some(section) => Ok(partition(volumes, |vol| {
                section.volumes_list.contains(&vol.id)
            })),
        }
    }

    pub fn filter_tenants(
        &self,
        tenants: Vec<Tenant>,
    ) -> Result<(Vec<Tenant>, Vec<Tenant>)> {
        match self.load()?.tenants {
            None => Ok((tenants, Vec::new())),
            Some(section) => Ok(partition(tenants, |tenant| {
                section.tenant_id.contains(&tenant.id)
            })),
        }
    }
}

/// Partition over a snapshot: consumes the input and produces two fresh
/// lists, so records are never removed from a list while it is iterated.
fn partition<T>(
    records: Vec<T>,
    keep: impl Fn(&T) -> bool,
) -> (Vec<T>, Vec<T>) {
    records.into_iter().partition(keep)
}
