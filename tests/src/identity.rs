// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Keystone resource migration checks: users, roles, tenants, role
//! assignments, and per-tenant quotas.

use std::collections::{BTreeMap, HashSet};

use mvt_framework::cloud::resources::Tenant;
use mvt_framework::cloud::Cloud;
use mvt_framework::compare::{validate_resource_parameter, Mapping};
use mvt_testcase::*;

#[mvt_testcase]
fn keystone_users_migrated(ctx: &Framework) {
    let src_users = ctx.source_users()?;
    let dst_users = ctx.destination().list_users()?;

    validate_resource_parameter(&src_users, &dst_users, "user", "name")?;
    validate_resource_parameter(&src_users, &dst_users, "user", "email")?;
}

#[mvt_testcase]
fn keystone_user_tenant_roles_migrated(ctx: &Framework) {
    let src_users = ctx.source_users()?;
    let src_user_names: HashSet<&str> =
        src_users.iter().map(|u| u.name.as_str()).collect();
    let dst_users = ctx.destination().list_users()?;

    let mut least_user_match = false;
    for dst_user in &dst_users {
        if !src_user_names.contains(dst_user.name.as_str()) {
            continue;
        }
        least_user_match = true;
        let src_roles = ctx.source().user_roles_by_name(&dst_user.name)?;
        let dst_roles =
            ctx.destination().user_roles_by_name(&dst_user.name)?;
        validate_resource_parameter(
            &src_roles,
            &dst_roles,
            "user_tenant_role",
            "name",
        )?;
    }
    anyhow::ensure!(
        least_user_match,
        "either migration was not initiated or it was not successful for \
         user resources"
    );
}

#[mvt_testcase]
fn keystone_roles_migrated(ctx: &Framework) {
    let src_roles = ctx.source_roles()?;
    let dst_roles = ctx.destination().list_roles()?;

    validate_resource_parameter(&src_roles, &dst_roles, "role", "name")?;
}

#[mvt_testcase]
fn keystone_tenants_migrated(ctx: &Framework) {
    let src_tenants = ctx.source_tenants()?;
    let dst_tenants = ctx.destination().list_tenants()?;

    let (src_tenants, _) = ctx.filtering().filter_tenants(src_tenants)?;

    validate_resource_parameter(&src_tenants, &dst_tenants, "tenant", "name")?;
    validate_resource_parameter(
        &src_tenants,
        &dst_tenants,
        "tenant",
        "description",
    )?;
}

#[mvt_testcase]
fn tenant_quotas_migrated(ctx: &Framework) {
    // Quota keys known on the source bound the comparison; the destination
    // may carry additional quotas that did not exist on the source release.
    let src_admin_id =
        ctx.source().get_tenant_id(&ctx.config().src.tenant)?;
    let nova_keys: HashSet<String> = ctx
        .source()
        .nova_quotas(&src_admin_id)?
        .keys()
        .cloned()
        .collect();
    let neutron_keys: HashSet<String> = ctx
        .source()
        .neutron_quotas(&src_admin_id)?
        .keys()
        .cloned()
        .collect();

    let src_quotas = tenant_quotas(
        ctx.source(),
        &ctx.source_tenants()?,
        &nova_keys,
        &neutron_keys,
    )?;
    let dst_quotas = tenant_quotas(
        ctx.destination(),
        &ctx.destination().list_tenants()?,
        &nova_keys,
        &neutron_keys,
    )?;

    for (tenant, (src_nova, src_neutron)) in &src_quotas {
        let (dst_nova, dst_neutron) = dst_quotas
            .get(tenant)
            .with_context(|| format!("tenant {tenant} is missing on dst"))?;
        anyhow::ensure!(
            src_nova == dst_nova,
            "nova quotas for tenant {tenant} did not migrate correctly: \
             src {src_nova:?}, dst {dst_nova:?}"
        );
        anyhow::ensure!(
            src_neutron == dst_neutron,
            "neutron quotas for tenant {tenant} did not migrate correctly: \
             src {src_neutron:?}, dst {dst_neutron:?}"
        );
    }
}

/// Nova and neutron quota mappings per tenant name, restricted to the given
/// keys. The quota-set id is not a quota and is always dropped.
fn tenant_quotas(
    cloud: &Cloud,
    tenants: &[Tenant],
    nova_keys: &HashSet<String>,
    neutron_keys: &HashSet<String>,
) -> Result<BTreeMap<String, (Mapping, Mapping)>> {
    let mut quotas = BTreeMap::new();
    for tenant in tenants {
        let nova: Mapping = cloud
            .nova_quotas(&tenant.id)?
            .into_iter()
            .filter(|(k, _)| nova_keys.contains(k) && k != "id")
            .collect();
        let neutron: Mapping = cloud
            .neutron_quotas(&tenant.id)?
            .into_iter()
            .filter(|(k, _)| neutron_keys.contains(k))
            .collect();
        quotas.insert(tenant.name.clone(), (nova, neutron));
    }
    Ok(quotas)
}
