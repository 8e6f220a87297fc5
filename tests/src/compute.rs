// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Nova resource migration checks: flavors, keypairs, and the VMs
//! themselves.

use mvt_framework::cloud::CloudError;
use mvt_framework::compare::validate_resource_parameter;
use mvt_testcase::*;

#[mvt_testcase]
fn nova_flavors_migrated(ctx: &Framework) {
    let src_flavors = ctx.source_flavors(false)?;
    let dst_flavors = ctx.destination().list_flavors()?;

    validate_resource_parameter(&src_flavors, &dst_flavors, "flavor", "name")?;
    validate_resource_parameter(&src_flavors, &dst_flavors, "flavor", "ram")?;
    validate_resource_parameter(&src_flavors, &dst_flavors, "flavor", "vcpus")?;
    validate_resource_parameter(&src_flavors, &dst_flavors, "flavor", "disk")?;
    // Ids are regenerated for most resources, but flavors are moved together
    // with their ids.
    validate_resource_parameter(&src_flavors, &dst_flavors, "flavor", "id")?;
}

#[mvt_testcase]
fn private_flavors_migrated(ctx: &Framework) {
    let src_flavors = ctx.source_flavors(true)?;
    let dst_flavors = ctx.destination().list_flavors()?;

    validate_resource_parameter(&src_flavors, &dst_flavors, "flavor", "name")?;
    validate_resource_parameter(
        &src_flavors,
        &dst_flavors,
        "flavor",
        "is_public",
    )?;
}

#[mvt_testcase]
fn nova_keypairs_migrated(ctx: &Framework) {
    let src_keypairs = ctx.users_keypairs(ctx.source())?;
    let dst_keypairs = ctx.users_keypairs(ctx.destination())?;

    validate_resource_parameter(
        &src_keypairs,
        &dst_keypairs,
        "keypair",
        "name",
    )?;
    validate_resource_parameter(
        &src_keypairs,
        &dst_keypairs,
        "keypair",
        "fingerprint",
    )?;
}

#[mvt_testcase]
fn vm_parameters_migrated(ctx: &Framework) {
    let src_vms = ctx.source_vms()?;
    let (src_vms, _) = ctx.filtering().filter_vms(src_vms)?;
    // VMs that never came up on the source are not expected to migrate.
    let src_vms: Vec<_> =
        src_vms.into_iter().filter(|vm| vm.status != "ERROR").collect();
    let dst_vms = ctx.destination().list_servers()?;

    validate_resource_parameter(&src_vms, &dst_vms, "VM", "name")?;
    validate_resource_parameter(&src_vms, &dst_vms, "VM", "config_drive")?;
    validate_resource_parameter(&src_vms, &dst_vms, "VM", "key_name")?;
}

#[mvt_testcase]
fn vms_with_floating_ip_keep_one(ctx: &Framework) {
    let with_fip = ctx.expected().vms_with_floating_ip();
    for vm in ctx.destination().list_servers()? {
        if !with_fip.contains(&vm.name.as_str()) {
            continue;
        }
        anyhow::ensure!(
            vm.floating_ip().is_some(),
            "vm {} does not have a floating ip on dst",
            vm.name
        );
    }
}

#[mvt_testcase]
fn broken_vms_not_migrated(ctx: &Framework) {
    let broken: Vec<&str> = ctx
        .expected()
        .all_vms()
        .into_iter()
        .filter(|vm| vm.broken)
        .map(|vm| vm.name.as_str())
        .collect();

    let mut migrated = Vec::new();
    for name in broken {
        match ctx.destination().get_vm_id(name) {
            Ok(_) => migrated.push(name),
            Err(CloudError::NotFound { .. }) => {}
            Err(e) => return Err(e.into()),
        }
    }
    anyhow::ensure!(
        migrated.is_empty(),
        "broken vms were migrated: {migrated:?}"
    );
}
