// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Glance image migration checks.

use std::collections::HashSet;

use mvt_framework::cloud::resources::Image;
use mvt_framework::cloud::{Cloud, CloudError};
use mvt_framework::compare::validate_resource_parameter;
use mvt_testcase::*;

#[mvt_testcase]
fn glance_images_migrated(ctx: &Framework) {
    let src_images = ctx.source_images()?;
    let dst_images = ctx.destination().list_images()?;

    let (src_images, _) = ctx.filtering().filter_images(src_images)?;

    validate_resource_parameter(&src_images, &dst_images, "image", "name")?;
    validate_resource_parameter(
        &src_images,
        &dst_images,
        "image",
        "disk_format",
    )?;
    validate_resource_parameter(
        &src_images,
        &dst_images,
        "image",
        "container_format",
    )?;
    validate_resource_parameter(&src_images, &dst_images, "image", "size")?;
    validate_resource_parameter(
        &src_images,
        &dst_images,
        "image",
        "checksum",
    )?;
}

#[mvt_testcase]
fn image_members_migrated(ctx: &Framework) {
    let src_images = ctx.source_images()?;
    let (src_images, _) = ctx.filtering().filter_images(src_images)?;
    let dst_images = ctx.destination().list_images()?;

    let src_members = member_names(ctx.source(), &src_images)?;
    let dst_members = member_names(ctx.destination(), &dst_images)?;
    assert_eq!(src_members, dst_members);
}

/// Member tenant names per shared image, sorted for a stable comparison
/// (member tenant ids differ between clouds, names do not).
fn member_names(
    cloud: &Cloud,
    images: &[Image],
) -> Result<Vec<(String, Vec<String>)>> {
    let mut shared = Vec::new();
    for image in images {
        let members = cloud.image_members(&image.id)?;
        if members.is_empty() {
            continue;
        }
        let mut names = Vec::new();
        for member in members {
            names.push(cloud.get_tenant_name(&member.member_id)?);
        }
        names.sort();
        shared.push((image.name.clone(), names));
    }
    shared.sort();
    Ok(shared)
}

#[mvt_testcase]
fn deleted_tenant_images_owned_by_dst_admin(ctx: &Framework) {
    // Images whose owner tenant no longer exists on the source are adopted
    // by the destination admin tenant during migration.
    let mut src_tenant_ids: HashSet<String> =
        ctx.source_tenants()?.into_iter().map(|t| t.id).collect();
    src_tenant_ids
        .insert(ctx.source().get_tenant_id(&ctx.config().src.tenant)?);

    let orphaned: HashSet<String> = ctx
        .source_images()?
        .into_iter()
        .filter(|img| {
            img.owner
                .as_deref()
                .map(|owner| !src_tenant_ids.contains(owner))
                .unwrap_or(false)
        })
        .map(|img| img.name)
        .collect();
    if orphaned.is_empty() {
        mvt_skip!("no images owned by deleted tenants in the fixtures");
    }

    let dst_admin_id =
        ctx.destination().get_tenant_id(&ctx.config().dst.tenant)?;
    let mut least_image_check = false;
    for image in ctx.destination().list_images()? {
        if !orphaned.contains(&image.name) {
            continue;
        }
        least_image_check = true;
        anyhow::ensure!(
            image.owner.as_deref() == Some(dst_admin_id.as_str()),
            "image owner on dst is {:?} instead of {}",
            image.owner,
            dst_admin_id
        );
    }
    anyhow::ensure!(
        least_image_check,
        "either migration was not initiated or it was not successful for \
         image resources"
    );
}

#[mvt_testcase]
fn filtered_out_images_not_migrated(ctx: &Framework) {
    let src_images = ctx.source_images()?;
    let (_, excluded) = ctx.filtering().filter_images(src_images)?;

    let dst_names: HashSet<String> = ctx
        .destination()
        .list_images()?
        .into_iter()
        .map(|img| img.name)
        .collect();

    for image in &excluded {
        anyhow::ensure!(
            !dst_names.contains(&image.name),
            "image {} migrated despite not being included in the filter: \
             {image:?}",
            image.name
        );
    }
}

#[mvt_testcase]
fn broken_images_not_migrated(ctx: &Framework) {
    let broken: Vec<&str> = ctx
        .expected()
        .all_images()
        .into_iter()
        .filter(|img| img.broken)
        .map(|img| img.name.as_str())
        .collect();

    let mut migrated = Vec::new();
    for name in broken {
        match ctx.destination().get_image_id(name) {
            Ok(_) => migrated.push(name),
            Err(CloudError::NotFound { .. }) => {}
            Err(e) => return Err(e.into()),
        }
    }
    anyhow::ensure!(
        migrated.is_empty(),
        "broken images were migrated: {migrated:?}"
    );
}
