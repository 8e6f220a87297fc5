// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Typed records for the API responses the suite compares across clouds.
//!
//! Only the attributes the tests look at are deserialized; everything else in
//! a response is ignored. Network-plugin resources are handled as raw
//! mappings instead (see [`crate::compare::Mapping`]) because their attribute
//! set varies with the plugins loaded on each cloud.

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::{json, Value};

use crate::compare::Resource;

#[derive(Clone, Debug, Deserialize)]
pub struct Tenant {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub enabled: bool,
}

impl Resource for Tenant {
    fn ident(&self) -> &str {
        &self.name
    }

    fn parameter(&self, name: &str) -> Option<Value> {
        match name {
            "name" => Some(json!(self.name)),
            "description" => Some(json!(self.description)),
            "enabled" => Some(json!(self.enabled)),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct User {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub enabled: bool,
}

impl Resource for User {
    fn ident(&self) -> &str {
        &self.name
    }

    fn parameter(&self, name: &str) -> Option<Value> {
        match name {
            "name" => Some(json!(self.name)),
            "email" => Some(json!(self.email)),
            "enabled" => Some(json!(self.enabled)),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct Role {
    pub id: String,
    pub name: String,
}

impl Resource for Role {
    fn ident(&self) -> &str {
        &self.name
    }

    fn parameter(&self, name: &str) -> Option<Value> {
        match name {
            "name" => Some(json!(self.name)),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct Flavor {
    pub id: String,
    pub name: String,
    pub ram: u64,
    pub vcpus: u64,
    pub disk: u64,
    #[serde(rename = "os-flavor-access:is_public", default = "public_default")]
    pub is_public: bool,
}

fn public_default() -> bool {
    true
}

impl Resource for Flavor {
    fn ident(&self) -> &str {
        &self.name
    }

    fn parameter(&self, name: &str) -> Option<Value> {
        match name {
            "name" => Some(json!(self.name)),
            "ram" => Some(json!(self.ram)),
            "vcpus" => Some(json!(self.vcpus)),
            "disk" => Some(json!(self.disk)),
            // Flavors are migrated together with their ids, so the id is the
            // one identifier that is expected to survive unchanged.
            "id" => Some(json!(self.id)),
            "is_public" => Some(json!(self.is_public)),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct ServerAddress {
    pub addr: String,
    #[serde(rename = "OS-EXT-IPS:type", default)]
    pub kind: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Server {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub tenant_id: String,
    #[serde(default)]
    pub key_name: Option<String>,
    #[serde(default)]
    pub config_drive: Option<String>,
    #[serde(default)]
    pub addresses: HashMap<String, Vec<ServerAddress>>,
}

impl Server {
    /// The server's floating address, if one is associated.
    pub fn floating_ip(&self) -> Option<&str> {
        self.addresses
            .values()
            .flatten()
            .find(|addr| addr.kind.as_deref() == Some("floating"))
            .map(|addr| addr.addr.as_str())
    }
}

impl Resource for Server {
    fn ident(&self) -> &str {
        &self.name
    }

    fn parameter(&self, name: &str) -> Option<Value> {
        match name {
            "name" => Some(json!(self.name)),
            "status" => Some(json!(self.status)),
            "config_drive" => Some(json!(self.config_drive)),
            "key_name" => Some(json!(self.key_name)),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct Image {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub disk_format: Option<String>,
    #[serde(default)]
    pub container_format: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub checksum: Option<String>,
    #[serde(default)]
    pub owner: Option<String>,
}

impl Resource for Image {
    fn ident(&self) -> &str {
        &self.name
    }

    fn parameter(&self, name: &str) -> Option<Value> {
        match name {
            "name" => Some(json!(self.name)),
            "disk_format" => Some(json!(self.disk_format)),
            "container_format" => Some(json!(self.container_format)),
            "size" => Some(json!(self.size)),
            "checksum" => Some(json!(self.checksum)),
            "owner" => Some(json!(self.owner)),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct ImageMember {
    pub member_id: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Volume {
    pub id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    pub size: u64,
    /// The volume API reports bootability as the strings "true"/"false".
    #[serde(default)]
    pub bootable: Option<String>,
}

impl Resource for Volume {
    fn ident(&self) -> &str {
        self.display_name.as_deref().unwrap_or_default()
    }

    fn parameter(&self, name: &str) -> Option<Value> {
        match name {
            "display_name" => Some(json!(self.display_name)),
            "size" => Some(json!(self.size)),
            "bootable" => Some(json!(self.bootable)),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct KeyPair {
    pub name: String,
    pub fingerprint: String,
}

impl Resource for KeyPair {
    fn ident(&self) -> &str {
        &self.name
    }

    fn parameter(&self, name: &str) -> Option<Value> {
        match name {
            "name" => Some(json!(self.name)),
            "fingerprint" => Some(json!(self.fingerprint)),
            _ => None,
        }
    }
}

/// One nova service on a compute host, as reported by the service status API.
#[derive(Clone, Debug, Deserialize)]
pub struct NovaService {
    pub binary: String,
    pub state: String,
}

/// One neutron agent on a host.
#[derive(Clone, Debug, Deserialize)]
pub struct NeutronAgent {
    pub binary: String,
    pub alive: bool,
}
