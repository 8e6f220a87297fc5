// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Structural comparison of source and destination resource collections.
//!
//! Records are matched across clouds by name (ids are regenerated by the
//! migration and never compared), then a single named parameter is checked
//! per call. Full coverage of a resource kind is built up by repeated calls
//! with different parameters.

use serde_json::{Map, Value};
use thiserror::Error;

use crate::TestSkippedError;

/// A network-plugin resource returned by the API as a raw mapping rather
/// than a typed record.
pub type Mapping = Map<String, Value>;

#[derive(Debug, Error)]
pub enum ComparisonError {
    #[error("resource {resource} with name {name} was not found on dst")]
    NotFoundOnDestination { resource: String, name: String },

    #[error(
        "parameter {parameter} for resource {resource} with name {name} \
         differs: src {src}, dst {dst}"
    )]
    ParameterMismatch {
        resource: String,
        name: String,
        parameter: String,
        src: Value,
        dst: Value,
    },

    #[error("resource kind {resource} has no parameter named {parameter}")]
    UnknownParameter { resource: String, parameter: String },
}

/// A resource record that can take part in a cross-cloud comparison.
///
/// `parameter` is a typed per-kind lookup: each implementation matches on the
/// parameter names that make sense for its kind and returns `None` for
/// anything else, which the comparator treats as a hard error rather than a
/// mismatch.
pub trait Resource {
    /// The identity attribute records are matched by (`name`, or
    /// `display_name` for volumes).
    fn ident(&self) -> &str;

    fn parameter(&self, name: &str) -> Option<Value>;
}

/// Checks that every record in `src_list` has a counterpart of the same name
/// in `dst_list` whose `parameter` value matches.
///
/// An empty `src_list` signals "nothing to migrate" and skips the test
/// rather than failing it. When several destination records share a name the
/// first match wins; duplicate names across tenants therefore compare
/// against an arbitrary match.
pub fn validate_resource_parameter<R: Resource>(
    src_list: &[R],
    dst_list: &[R],
    resource: &str,
    parameter: &str,
) -> anyhow::Result<()> {
    if src_list.is_empty() {
        return Err(nothing_to_migrate());
    }
    for src in src_list {
        let Some(dst) = dst_list.iter().find(|d| d.ident() == src.ident())
        else {
            return Err(ComparisonError::NotFoundOnDestination {
                resource: resource.to_string(),
                name: src.ident().to_string(),
            }
            .into());
        };
        let src_value = lookup(src, resource, parameter)?;
        let dst_value = lookup(dst, resource, parameter)?;
        if src_value != dst_value {
            return Err(ComparisonError::ParameterMismatch {
                resource: resource.to_string(),
                name: src.ident().to_string(),
                parameter: parameter.to_string(),
                src: src_value,
                dst: dst_value,
            }
            .into());
        }
    }
    Ok(())
}

/// [`validate_resource_parameter`] over mapping-shaped records, matched by
/// their `"name"` entry.
pub fn validate_mapping_parameter(
    src_list: &[Mapping],
    dst_list: &[Mapping],
    resource: &str,
    parameter: &str,
) -> anyhow::Result<()> {
    if src_list.is_empty() {
        return Err(nothing_to_migrate());
    }
    for src in src_list {
        let src_name = mapping_name(src, resource)?;
        let Some(dst) = dst_list
            .iter()
            .find(|d| mapping_name(d, resource).ok() == Some(src_name))
        else {
            return Err(ComparisonError::NotFoundOnDestination {
                resource: resource.to_string(),
                name: src_name.to_string(),
            }
            .into());
        };
        let src_value = mapping_lookup(src, resource, parameter)?;
        let dst_value = mapping_lookup(dst, resource, parameter)?;
        if src_value != dst_value {
            return Err(ComparisonError::ParameterMismatch {
                resource: resource.to_string(),
                name: src_name.to_string(),
                parameter: parameter.to_string(),
                src: src_value.clone(),
                dst: dst_value.clone(),
            }
            .into());
        }
    }
    Ok(())
}

fn nothing_to_migrate() -> anyhow::Error {
    TestSkippedError::TestSkipped(Some(
        "Nothing to migrate - source resources list is empty".to_string(),
    ))
    .into()
}

fn lookup<R: Resource>(
    record: &R,
    resource: &str,
    parameter: &str,
) -> Result<Value, ComparisonError> {
    record.parameter(parameter).ok_or_else(|| {
        ComparisonError::UnknownParameter {
            resource: resource.to_string(),
            parameter: parameter.to_string(),
        }
    })
}

fn mapping_name<'m>(
    mapping: &'m Mapping,
    resource: &str,
) -> Result<&'m str, ComparisonError> {
    mapping.get("name").and_then(Value::as_str).ok_or_else(|| {
        ComparisonError::UnknownParameter {
            resource: resource.to_string(),
            parameter: "name".to_string(),
        }
    })
}

fn mapping_lookup<'m>(
    mapping: &'m Mapping,
    resource: &str,
    parameter: &str,
) -> Result<&'m Value, ComparisonError> {
    mapping.get(parameter).ok_or_else(|| {
        ComparisonError::UnknownParameter {
            resource: resource.to_string(),
            parameter: parameter.to_string(),
        }
    })
}
