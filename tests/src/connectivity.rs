// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Post-migration connectivity: SSH into a migrated VM using the migrated
//! keypair.

use mvt_framework::remote::ExecOptions;
use mvt_testcase::*;

#[mvt_testcase]
fn ssh_connectivity_by_keypair(ctx: &Framework) {
    let dst_vms = ctx.destination().list_servers()?;
    let vm = dst_vms
        .iter()
        .find(|vm| vm.name.contains("keypair_test"))
        .context(
            "vm for the keypair test was not spawned on dst; make sure a vm \
             with keypair_test in its name was created on src",
        )?;
    let ip_addr = vm
        .floating_ip()
        .with_context(|| format!("vm {} does not have a fip", vm.name))?
        .to_string();

    let key_path = ctx
        .config()
        .ssh
        .private_key_path
        .clone()
        .context("ssh.private_key_path is not configured")?;

    // Make sure port 22 in the tenant's security groups is open.
    ctx.destination().open_ssh_ingress(&vm.tenant_id)?;

    ctx.remote()
        .execute_command_on_vm(
            &ip_addr,
            "pwd",
            &ExecOptions::with_key("root", key_path),
        )
        .with_context(|| {
            format!(
                "vm with name {} and ip {ip_addr} is not accessible via \
                 the migrated key pair",
                vm.name
            )
        })?;
}
