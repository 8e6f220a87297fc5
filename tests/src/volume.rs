// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Cinder volume migration checks, including the data written to attached
//! volumes before the migration.

use mvt_framework::compare::validate_resource_parameter;
use mvt_framework::remote::ExecOptions;
use mvt_testcase::*;
use tracing::info;

#[mvt_testcase]
fn cinder_volumes_migrated(ctx: &Framework) {
    let src_volumes = ctx.source_volumes()?;
    let (src_volumes, _) = ctx.filtering().filter_volumes(src_volumes)?;
    let dst_volumes = ctx.destination().list_volumes()?;

    validate_resource_parameter(
        &src_volumes,
        &dst_volumes,
        "volume",
        "display_name",
    )?;
    validate_resource_parameter(&src_volumes, &dst_volumes, "volume", "size")?;
    validate_resource_parameter(
        &src_volumes,
        &dst_volumes,
        "volume",
        "bootable",
    )?;
}

#[mvt_testcase]
fn cinder_volume_data_intact(ctx: &Framework) {
    for volume in ctx.expected().all_volumes() {
        let Some(server_name) = &volume.server_to_attach else {
            continue;
        };
        if volume.write_to_file.is_empty() {
            continue;
        }
        let device = volume
            .device
            .as_deref()
            .with_context(|| {
                format!("volume {} fixture has no device", volume.display_name)
            })?;
        let mount_point = volume.mount_point.as_deref().with_context(|| {
            format!(
                "volume {} fixture has no mount point",
                volume.display_name
            )
        })?;

        let vm_id = ctx.destination().get_vm_id(server_name)?;
        let vm = ctx.destination().get_server(&vm_id)?;
        let vm_ip = vm
            .floating_ip()
            .with_context(|| {
                format!("vm {} ({}) does not have a fip", vm.name, vm.id)
            })?
            .to_string();
        info!(vm = %vm.name, ip = %vm_ip, volume = %volume.display_name,
              "checking volume data");

        ctx.destination().open_ssh_ingress(&vm.tenant_id)?;
        ctx.remote().wait_until_vm_accessible_via_ssh(&vm_ip)?;

        // The device may already be mounted from before the reboot.
        ctx.remote().execute_command_on_vm(
            &vm_ip,
            &format!("mount {device} {mount_point}"),
            &ExecOptions { warn_only: true, ..Default::default() },
        )?;

        for file in &volume.write_to_file {
            let path = format!("{mount_point}{}", file.filename);
            let md5sum = first_word(&ctx.remote().execute_command_on_vm(
                &vm_ip,
                &format!("md5sum {path}"),
                &ExecOptions::default(),
            )?)?;
            let recorded = first_word(&ctx.remote().execute_command_on_vm(
                &vm_ip,
                &format!("cat {path}_md5"),
                &ExecOptions::default(),
            )?)?;
            anyhow::ensure!(
                md5sum == recorded,
                "md5 of file {path} before and after migration differs"
            );
        }
    }
}

fn first_word(output: &str) -> Result<String> {
    output
        .split_whitespace()
        .next()
        .map(str::to_string)
        .context("command produced no output")
}
