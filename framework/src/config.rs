// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Test configuration and fixture loading.
//!
//! Two YAML documents drive a run: the [`TestConfig`], which points at the
//! two clouds and the migration filter file, and the [`ExpectedConfig`]
//! fixture, which declares the tenants and resources the load-generation
//! step created on the source cloud. Both are loaded once at framework
//! construction and are read-only for the duration of the run.

use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use serde::Deserialize;

/// Credentials and endpoint for one cloud.
#[derive(Clone, Debug, Deserialize)]
pub struct CloudCredentials {
    /// Keystone endpoint, e.g. `http://192.168.1.2:5000/v2.0`.
    pub auth_url: String,
    pub username: String,
    pub password: String,
    /// The admin tenant the suite authenticates into.
    pub tenant: String,

    /// Address of the node hosting this cloud's control services. When set,
    /// the pre-run health check polls nova services and neutron agents on
    /// this node and restarts the ones that are down.
    #[serde(default)]
    pub control_node_ip: Option<String>,
}

/// Options describing the migration run under test.
#[derive(Clone, Debug, Deserialize)]
pub struct MigrateOptions {
    /// Path to the YAML filter file naming the resources the migration was
    /// asked to move.
    pub filter_path: Utf8PathBuf,

    /// Whether the migration was configured to re-allocate external router
    /// gateway addresses on the destination.
    #[serde(default)]
    pub change_router_ips: bool,
}

/// Default SSH credentials for commands executed on migrated VMs.
#[derive(Clone, Debug, Deserialize)]
pub struct SshOptions {
    pub username: String,
    pub password: String,

    /// Private key used by the keypair connectivity test.
    #[serde(default)]
    pub private_key_path: Option<Utf8PathBuf>,
}

/// The external test-runner configuration.
#[derive(Debug, Deserialize)]
pub struct TestConfig {
    pub src: CloudCredentials,
    pub dst: CloudCredentials,
    pub migrate: MigrateOptions,
    pub ssh: SshOptions,

    /// Path to the [`ExpectedConfig`] fixture file.
    pub expected_path: Utf8PathBuf,
}

impl TestConfig {
    pub fn from_file(path: &Utf8Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).with_context(|| {
            format!("configuration file {path} is missing or unreadable")
        })?;
        serde_yaml_ng::from_str(&contents).with_context(|| {
            format!("configuration file {path} has the wrong format")
        })
    }
}

fn default_true() -> bool {
    true
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct TenantFixture {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Tenants created and then deleted before the migration; their nested
    /// resources are not expected anywhere.
    #[serde(default)]
    pub deleted: bool,
    #[serde(default)]
    pub networks: Vec<NetworkFixture>,
    #[serde(default)]
    pub routers: Vec<RouterFixture>,
    #[serde(default)]
    pub security_groups: Vec<SecurityGroupFixture>,
    #[serde(default)]
    pub flavors: Vec<FlavorFixture>,
    #[serde(default)]
    pub vms: Vec<VmFixture>,
    #[serde(default)]
    pub images: Vec<ImageFixture>,
    #[serde(default)]
    pub cinder_volumes: Vec<VolumeFixture>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct UserFixture {
    pub name: String,
    #[serde(default)]
    pub password: Option<String>,
    /// The user's primary tenant.
    #[serde(default)]
    pub tenant: Option<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub deleted: bool,
}

#[derive(Clone, Debug, Deserialize)]
pub struct RoleFixture {
    pub name: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct FlavorFixture {
    pub name: String,
    /// Absent `is_public` means the flavor is public.
    #[serde(default)]
    pub is_public: Option<bool>,
}

impl FlavorFixture {
    pub fn is_public(&self) -> bool {
        self.is_public.unwrap_or(true)
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct NetworkFixture {
    pub name: String,
    #[serde(default)]
    pub subnets: Vec<SubnetFixture>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct SubnetFixture {
    pub cidr: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct RouterFixture {
    pub name: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct SecurityGroupFixture {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct VmFixture {
    pub name: String,
    /// Whether a floating IP was associated with the VM.
    #[serde(default)]
    pub fip: bool,
    /// VMs deliberately created in a broken state; these must not migrate.
    #[serde(default)]
    pub broken: bool,
    #[serde(default)]
    pub key_name: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ImageFixture {
    pub name: String,
    /// Images with corrupt payloads; these must not migrate.
    #[serde(default)]
    pub broken: bool,
}

#[derive(Clone, Debug, Deserialize)]
pub struct VolumeFixture {
    pub display_name: String,
    /// Name of the VM the volume was attached to, if any.
    #[serde(default)]
    pub server_to_attach: Option<String>,
    #[serde(default)]
    pub device: Option<String>,
    #[serde(default)]
    pub mount_point: Option<String>,
    /// Files written to the volume before migration, each accompanied by a
    /// recorded `<filename>_md5` checksum file.
    #[serde(default)]
    pub write_to_file: Vec<FileFixture>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct FileFixture {
    pub filename: String,
}

/// Declarative description of the resources the load-generation step created
/// on the source cloud, and therefore of what a successful migration must
/// reproduce on the destination.
#[derive(Debug, Default, Deserialize)]
pub struct ExpectedConfig {
    #[serde(default)]
    pub tenants: Vec<TenantFixture>,
    #[serde(default)]
    pub users: Vec<UserFixture>,
    #[serde(default)]
    pub roles: Vec<RoleFixture>,
    #[serde(default)]
    pub flavors: Vec<FlavorFixture>,
    #[serde(default)]
    pub networks: Vec<NetworkFixture>,
    #[serde(default)]
    pub routers: Vec<RouterFixture>,
    #[serde(default)]
    pub vms: Vec<VmFixture>,
    #[serde(default)]
    pub images: Vec<ImageFixture>,
    #[serde(default)]
    pub cinder_volumes: Vec<VolumeFixture>,
    #[serde(default)]
    pub cinder_volumes_from_images: Vec<VolumeFixture>,
    #[serde(default)]
    pub vms_from_volumes: Vec<VmFixture>,
}

impl ExpectedConfig {
    pub fn from_file(path: &Utf8Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read fixture file {path}"))?;
        serde_yaml_ng::from_str(&contents)
            .with_context(|| format!("fixture file {path} has the wrong format"))
    }

    /// All VMs the fixtures declare: top-level ones, per-tenant ones for
    /// tenants that still exist, and VMs booted from volumes.
    pub fn all_vms(&self) -> Vec<&VmFixture> {
        let mut vms: Vec<&VmFixture> = self.vms.iter().collect();
        for tenant in self.tenants.iter().filter(|t| !t.deleted) {
            vms.extend(tenant.vms.iter());
        }
        vms.extend(self.vms_from_volumes.iter());
        vms
    }

    /// All images the fixtures declare, tenant-nested ones included.
    pub fn all_images(&self) -> Vec<&ImageFixture> {
        let mut images: Vec<&ImageFixture> = self.images.iter().collect();
        for tenant in &self.tenants {
            images.extend(tenant.images.iter());
        }
        images
    }

    /// All volumes the fixtures declare, including ones created from images.
    pub fn all_volumes(&self) -> Vec<&VolumeFixture> {
        let mut volumes: Vec<&VolumeFixture> =
            self.cinder_volumes.iter().collect();
        for tenant in self.tenants.iter().filter(|t| !t.deleted) {
            volumes.extend(tenant.cinder_volumes.iter());
        }
        volumes.extend(self.cinder_volumes_from_images.iter());
        volumes
    }

    pub fn network_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> =
            self.networks.iter().map(|n| n.name.as_str()).collect();
        for tenant in self.tenants.iter().filter(|t| !t.deleted) {
            names.extend(tenant.networks.iter().map(|n| n.name.as_str()));
        }
        names
    }

    pub fn router_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> =
            self.routers.iter().map(|r| r.name.as_str()).collect();
        for tenant in &self.tenants {
            names.extend(tenant.routers.iter().map(|r| r.name.as_str()));
        }
        names
    }

    pub fn security_group_names(&self) -> Vec<&str> {
        self.tenants
            .iter()
            .flat_map(|t| t.security_groups.iter())
            .map(|sg| sg.name.as_str())
            .collect()
    }

    /// Names of VMs the fixtures associate a floating IP with.
    pub fn vms_with_floating_ip(&self) -> Vec<&str> {
        self.vms
            .iter()
            .chain(self.tenants.iter().flat_map(|t| t.vms.iter()))
            .filter(|vm| vm.fip)
            .map(|vm| vm.name.as_str())
            .collect()
    }
}
