// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Narrowing live source-cloud listings to the resources the fixtures
//! declare.
//!
//! The load-generation step creates resources from the expected-config
//! fixture; a devlab cloud also carries plenty of other state. These helpers
//! intersect a live listing with the fixture so tests compare only the
//! resources that are part of the exercise. The fixture itself is never
//! mutated.

use std::collections::HashSet;

use anyhow::{Context, Result};
use serde_json::Value;
use tracing::warn;

use crate::cloud::resources::{
    Flavor, Image, KeyPair, Role, Server, Tenant, User, Volume,
};
use crate::cloud::{Cloud, CloudError};
use crate::compare::Mapping;
use crate::Framework;

impl Framework {
    pub fn source_tenants(&self) -> Result<Vec<Tenant>> {
        let names: HashSet<&str> = self
            .expected()
            .tenants
            .iter()
            .map(|t| t.name.as_str())
            .collect();
        Ok(self
            .source()
            .list_tenants()?
            .into_iter()
            .filter(|t| names.contains(t.name.as_str()))
            .collect())
    }

    /// Users the fixtures declare and still expect to exist: deleted ones
    /// are skipped, as are users whose primary tenant is gone from the
    /// source cloud.
    pub fn source_users(&self) -> Result<Vec<User>> {
        let mut names = HashSet::new();
        for user in &self.expected().users {
            if user.deleted {
                continue;
            }
            let tenant_present = match &user.tenant {
                Some(tenant) => match self.source().find_tenant(tenant) {
                    Ok(_) => true,
                    Err(CloudError::NotFound { .. }) => false,
                    Err(e) => return Err(e.into()),
                },
                None => true,
            };
            if tenant_present {
                names.insert(user.name.as_str());
            }
        }
        Ok(self
            .source()
            .list_users()?
            .into_iter()
            .filter(|u| names.contains(u.name.as_str()))
            .collect())
    }

    pub fn source_roles(&self) -> Result<Vec<Role>> {
        let names: HashSet<&str> = self
            .expected()
            .roles
            .iter()
            .map(|r| r.name.as_str())
            .collect();
        Ok(self
            .source()
            .list_roles()?
            .into_iter()
            .filter(|r| names.contains(r.name.as_str()))
            .collect())
    }

    /// Flavors from the fixtures, tenant-scoped ones included. With
    /// `only_private` set, only flavors the fixtures mark non-public are
    /// selected.
    pub fn source_flavors(&self, only_private: bool) -> Result<Vec<Flavor>> {
        let expected = self.expected();
        let fixtures = expected
            .flavors
            .iter()
            .chain(expected.tenants.iter().flat_map(|t| t.flavors.iter()));
        let mut names = HashSet::new();
        for flavor in fixtures {
            if only_private {
                if flavor.is_public == Some(false) {
                    names.insert(flavor.name.as_str());
                }
            } else if flavor.is_public() {
                names.insert(flavor.name.as_str());
            }
        }
        Ok(self
            .source()
            .list_flavors()?
            .into_iter()
            .filter(|f| names.contains(f.name.as_str()))
            .collect())
    }

    /// Live servers for the fixture VMs that are expected to migrate
    /// (broken ones excluded).
    pub fn source_vms(&self) -> Result<Vec<Server>> {
        let names: HashSet<&str> = self
            .expected()
            .all_vms()
            .into_iter()
            .filter(|vm| !vm.broken)
            .map(|vm| vm.name.as_str())
            .collect();
        Ok(self
            .source()
            .list_servers()?
            .into_iter()
            .filter(|s| names.contains(s.name.as_str()))
            .collect())
    }

    pub fn source_images(&self) -> Result<Vec<Image>> {
        let names: HashSet<&str> = self
            .expected()
            .all_images()
            .into_iter()
            .filter(|img| !img.broken)
            .map(|img| img.name.as_str())
            .collect();
        Ok(self
            .source()
            .list_images()?
            .into_iter()
            .filter(|i| names.contains(i.name.as_str()))
            .collect())
    }

    pub fn source_volumes(&self) -> Result<Vec<Volume>> {
        let names: HashSet<&str> = self
            .expected()
            .all_volumes()
            .into_iter()
            .map(|v| v.display_name.as_str())
            .collect();
        Ok(self
            .source()
            .list_volumes()?
            .into_iter()
            .filter(|v| {
                v.display_name
                    .as_deref()
                    .map(|name| names.contains(name))
                    .unwrap_or(false)
            })
            .collect())
    }

    pub fn source_networks(&self) -> Result<Vec<Mapping>> {
        let names: HashSet<&str> =
            self.expected().network_names().into_iter().collect();
        Ok(self
            .source()
            .list_networks()?
            .into_iter()
            .filter(|net| mapping_name_in(net, &names))
            .collect())
    }

    /// Live subnets matched against fixture subnets by (cidr, tenant):
    /// subnets of top-level networks belong to the admin tenant, subnets of
    /// tenant networks to their tenant.
    pub fn source_subnets(&self) -> Result<Vec<Mapping>> {
        let expected = self.expected();
        let admin_tenant_id =
            self.source().get_tenant_id(&self.config().src.tenant)?;

        let mut wanted: HashSet<(String, String)> = HashSet::new();
        for net in &expected.networks {
            for subnet in &net.subnets {
                wanted.insert((subnet.cidr.clone(), admin_tenant_id.clone()));
            }
        }
        for tenant in expected.tenants.iter().filter(|t| !t.deleted) {
            if tenant.networks.is_empty() {
                continue;
            }
            let tenant_id = match self.source().get_tenant_id(&tenant.name) {
                Ok(id) => id,
                Err(CloudError::NotFound { .. }) => continue,
                Err(e) => return Err(e.into()),
            };
            for net in &tenant.networks {
                for subnet in &net.subnets {
                    wanted.insert((subnet.cidr.clone(), tenant_id.clone()));
                }
            }
        }

        Ok(self
            .source()
            .list_subnets()?
            .into_iter()
            .filter(|subnet| {
                let cidr = subnet.get("cidr").and_then(Value::as_str);
                let tenant = subnet.get("tenant_id").and_then(Value::as_str);
                match (cidr, tenant) {
                    (Some(cidr), Some(tenant)) => wanted
                        .contains(&(cidr.to_string(), tenant.to_string())),
                    _ => false,
                }
            })
            .collect())
    }

    pub fn source_routers(&self) -> Result<Vec<Mapping>> {
        let names: HashSet<&str> =
            self.expected().router_names().into_iter().collect();
        Ok(self
            .source()
            .list_routers()?
            .into_iter()
            .filter(|router| mapping_name_in(router, &names))
            .collect())
    }

    pub fn source_security_groups(&self) -> Result<Vec<Mapping>> {
        let names: HashSet<&str> =
            self.expected().security_group_names().into_iter().collect();
        Ok(self
            .source()
            .list_security_groups()?
            .into_iter()
            .filter(|sg| mapping_name_in(sg, &names))
            .collect())
    }

    /// Floating addresses visible inside each fixture tenant on the source
    /// cloud. Floating IPs are tenant-scoped, so the suite authenticates
    /// into each tenant in turn — as the admin user, with a temporary admin
    /// role grant where one is missing.
    pub fn source_floating_ips(&self) -> Result<HashSet<String>> {
        let mut addresses = HashSet::new();
        let admin = &self.config().src;
        for tenant in self.expected().tenants.iter().filter(|t| !t.deleted) {
            let _grant = AdminRoleGrant::new(
                self.source(),
                &admin.username,
                &tenant.name,
            )?;
            let scoped = self.source().reauthenticated(
                &admin.username,
                &admin.password,
                &tenant.name,
            )?;
            addresses.extend(scoped.floating_ip_addresses()?);
        }
        Ok(addresses)
    }

    /// Keypairs of every enabled fixture user on the given cloud, collected
    /// by authenticating as each user in turn (keypairs are user-scoped).
    pub fn users_keypairs(&self, cloud: &Cloud) -> Result<Vec<KeyPair>> {
        let mut keypairs = Vec::new();
        for user in &self.expected().users {
            if user.deleted || !user.enabled {
                continue;
            }
            let (Some(password), Some(tenant)) =
                (&user.password, &user.tenant)
            else {
                continue;
            };
            let scoped =
                cloud.reauthenticated(&user.name, password, tenant)?;
            keypairs.extend(scoped.list_keypairs()?);
        }
        Ok(keypairs)
    }
}

fn mapping_name_in(mapping: &Mapping, names: &HashSet<&str>) -> bool {
    mapping
        .get("name")
        .and_then(Value::as_str)
        .map(|name| names.contains(name))
        .unwrap_or(false)
}

/// Scoped admin role assignment: grants the admin user the admin role on a
/// tenant if it does not already hold it, and revokes it again when the
/// scope ends — on failure paths included. A role that was already present
/// is left untouched.
pub struct AdminRoleGrant<'a> {
    cloud: &'a Cloud,
    user_id: String,
    tenant_id: String,
    role_id: String,
    granted: bool,
}

impl<'a> AdminRoleGrant<'a> {
    pub fn new(
        cloud: &'a Cloud,
        admin_user: &str,
        tenant: &str,
    ) -> Result<Self> {
        let user = cloud.find_user(admin_user)?;
        let tenant = cloud.find_tenant(tenant)?;
        let role = cloud.find_role("admin").context(
            "the admin role is required for tenant-scoped operations",
        )?;

        let has_role = cloud
            .user_tenant_roles(&user.id, &tenant.id)?
            .iter()
            .any(|r| r.id == role.id);
        if !has_role {
            cloud.grant_user_role(&user.id, &tenant.id, &role.id)?;
        }
        Ok(Self {
            cloud,
            user_id: user.id,
            tenant_id: tenant.id,
            role_id: role.id,
            granted: !has_role,
        })
    }
}

impl Drop for AdminRoleGrant<'_> {
    fn drop(&mut self) {
        if !self.granted {
            return;
        }
        if let Err(e) = self.cloud.revoke_user_role(
            &self.user_id,
            &self.tenant_id,
            &self.role_id,
        ) {
            warn!(error = %e, "failed to revoke temporarily granted admin role");
        }
    }
}
