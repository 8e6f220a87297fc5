// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Neutron resource migration checks: networks, subnets, routers, security
//! groups, and floating IPs.

use mvt_framework::compare::{validate_mapping_parameter, Mapping};
use mvt_testcase::*;
use serde_json::Value;

#[mvt_testcase]
fn neutron_networks_migrated(ctx: &Framework) {
    let src_nets = ctx.source_networks()?;
    let dst_nets = ctx.destination().list_networks()?;

    validate_mapping_parameter(&src_nets, &dst_nets, "networks", "name")?;
    validate_mapping_parameter(
        &src_nets,
        &dst_nets,
        "networks",
        "provider:network_type",
    )?;
    validate_mapping_parameter(
        &src_nets,
        &dst_nets,
        "networks",
        "provider:segmentation_id",
    )?;
}

#[mvt_testcase]
fn neutron_subnets_migrated(ctx: &Framework) {
    let src_subnets = ctx.source_subnets()?;
    let dst_subnets = ctx.destination().list_subnets()?;

    validate_mapping_parameter(&src_subnets, &dst_subnets, "subnets", "name")?;
    validate_mapping_parameter(
        &src_subnets,
        &dst_subnets,
        "subnets",
        "gateway_ip",
    )?;
    validate_mapping_parameter(&src_subnets, &dst_subnets, "subnets", "cidr")?;
}

#[mvt_testcase]
fn neutron_routers_migrated(ctx: &Framework) {
    let src_routers = ctx.source_routers()?;
    let dst_routers = ctx.destination().list_routers()?;

    validate_mapping_parameter(&src_routers, &dst_routers, "routers", "name")?;
}

#[mvt_testcase]
fn security_groups_migrated(ctx: &Framework) {
    let src_sec_gr = ctx.source_security_groups()?;
    let dst_sec_gr = ctx.destination().list_security_groups()?;

    validate_mapping_parameter(
        &src_sec_gr,
        &dst_sec_gr,
        "security_groups",
        "name",
    )?;
    validate_mapping_parameter(
        &src_sec_gr,
        &dst_sec_gr,
        "security_groups",
        "description",
    )?;
}

#[mvt_testcase]
fn floating_ips_migrated(ctx: &Framework) {
    let src_fips = ctx.source_floating_ips()?;
    let dst_fips = ctx.destination().floating_ip_addresses()?;

    let missing: Vec<&String> = src_fips.difference(&dst_fips).collect();
    anyhow::ensure!(
        missing.is_empty(),
        "{} floating IPs did not migrate to destination: {missing:?}",
        missing.len()
    );
}

#[mvt_testcase]
fn external_router_gateway_ip_changed(ctx: &Framework) {
    if !ctx.config().migrate.change_router_ips {
        mvt_skip!("changing router ips is disabled in the migration config");
    }

    let src_routers = ctx.source().external_routers()?;
    let dst_routers = ctx.destination().external_routers()?;
    for dst_router in &dst_routers {
        for src_router in &src_routers {
            if mapping_str(dst_router, "name")?
                != mapping_str(src_router, "name")?
            {
                continue;
            }
            let src_gateway = ctx
                .source()
                .router_gateway_port(mapping_str(src_router, "id")?)?;
            let dst_gateway = ctx
                .destination()
                .router_gateway_port(mapping_str(dst_router, "id")?)?;
            let src_ip = gateway_ip(&src_gateway)?;
            let dst_ip = gateway_ip(&dst_gateway)?;
            anyhow::ensure!(
                src_ip != dst_ip,
                "gateway ip addresses of router {:?} are the same on src \
                 and dst: {dst_ip}",
                mapping_str(dst_router, "name")?,
            );
        }
    }
}

fn mapping_str<'m>(mapping: &'m Mapping, key: &str) -> Result<&'m str> {
    mapping
        .get(key)
        .and_then(Value::as_str)
        .with_context(|| format!("router record has no {key} attribute"))
}

fn gateway_ip(port: &Mapping) -> Result<&str> {
    port.get("fixed_ips")
        .and_then(Value::as_array)
        .and_then(|ips| ips.first())
        .and_then(|ip| ip.get("ip_address"))
        .and_then(Value::as_str)
        .context("gateway port has no fixed ip address")
}
