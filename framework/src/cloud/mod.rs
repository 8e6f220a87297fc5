// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! A thin blocking facade over one cloud's REST APIs.
//!
//! [`Cloud::connect`] performs a Keystone password authentication, records
//! the issued token and the per-service endpoints from the catalog, and then
//! exposes the handful of list/lookup operations the verification tests
//! need. Every call is a synchronous round-trip; nothing is cached between
//! calls, so each test observes the live state of its cloud.

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::debug;

use crate::compare::Mapping;
use crate::config::CloudCredentials;

pub mod resources;

use resources::{
    Flavor, Image, ImageMember, KeyPair, NeutronAgent, NovaService, Role,
    Server, Tenant, User, Volume,
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum CloudError {
    #[error("authentication against {url} failed: {reason}")]
    AuthFailed { url: String, reason: String },

    #[error("no {service} endpoint in the service catalog of {url}")]
    MissingEndpoint { service: String, url: String },

    #[error("{kind} with name {name} was not found")]
    NotFound { kind: String, name: String },

    #[error("request to {url} failed")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("unexpected status {status} from {url}: {body}")]
    Api { url: String, status: u16, body: String },
}

type Result<T> = std::result::Result<T, CloudError>;

#[derive(Debug)]
struct ServiceEndpoints {
    identity: String,
    compute: String,
    network: String,
    image: String,
    volume: String,
}

/// A facade over one cloud endpoint, authenticated as one user in one
/// tenant.
#[derive(Debug)]
pub struct Cloud {
    http: reqwest::blocking::Client,
    credentials: CloudCredentials,
    token: String,
    endpoints: ServiceEndpoints,
}

#[derive(Deserialize)]
struct AccessResponse {
    access: Access,
}

#[derive(Deserialize)]
struct Access {
    token: IssuedToken,
    #[serde(rename = "serviceCatalog", default)]
    service_catalog: Vec<CatalogEntry>,
}

#[derive(Deserialize)]
struct IssuedToken {
    id: String,
}

#[derive(Deserialize)]
struct CatalogEntry {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    endpoints: Vec<CatalogEndpoint>,
}

#[derive(Deserialize)]
struct CatalogEndpoint {
    #[serde(rename = "publicURL")]
    public_url: String,
    #[serde(rename = "adminURL", default)]
    admin_url: Option<String>,
}

impl Cloud {
    /// Authenticates against the cloud and resolves its service endpoints.
    pub fn connect(credentials: &CloudCredentials) -> Result<Self> {
        let http = reqwest::blocking::ClientBuilder::new()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|source| CloudError::Request {
                url: credentials.auth_url.clone(),
                source,
            })?;

        let url = format!("{}/tokens", credentials.auth_url.trim_end_matches('/'));
        let body = json!({
            "auth": {
                "tenantName": credentials.tenant,
                "passwordCredentials": {
                    "username": credentials.username,
                    "password": credentials.password,
                }
            }
        });
        let response = http
            .post(&url)
            .json(&body)
            .send()
            .map_err(|source| CloudError::Request { url: url.clone(), source })?;
        if !response.status().is_success() {
            return Err(CloudError::AuthFailed {
                url: credentials.auth_url.clone(),
                reason: format!("status {}", response.status()),
            });
        }
        let access: AccessResponse =
            response.json().map_err(|source| CloudError::Request {
                url: url.clone(),
                source,
            })?;

        let endpoints =
            resolve_endpoints(&access.access, &credentials.auth_url)?;
        debug!(?endpoints, "resolved service catalog");

        Ok(Self {
            http,
            credentials: credentials.clone(),
            token: access.access.token.id,
            endpoints,
        })
    }

    /// A second facade over the same cloud, authenticated as a different
    /// user/tenant pair. Used for user-scoped listings such as keypairs.
    pub fn reauthenticated(
        &self,
        username: &str,
        password: &str,
        tenant: &str,
    ) -> Result<Self> {
        Self::connect(&CloudCredentials {
            auth_url: self.credentials.auth_url.clone(),
            username: username.to_string(),
            password: password.to_string(),
            tenant: tenant.to_string(),
            control_node_ip: None,
        })
    }

    // Identity

    pub fn list_tenants(&self) -> Result<Vec<Tenant>> {
        #[derive(Deserialize)]
        struct Envelope {
            tenants: Vec<Tenant>,
        }
        let url = format!("{}/tenants", self.endpoints.identity);
        Ok(self.get_as::<Envelope>(&url)?.tenants)
    }

    pub fn list_users(&self) -> Result<Vec<User>> {
        #[derive(Deserialize)]
        struct Envelope {
            users: Vec<User>,
        }
        let url = format!("{}/users", self.endpoints.identity);
        Ok(self.get_as::<Envelope>(&url)?.users)
    }

    pub fn list_roles(&self) -> Result<Vec<Role>> {
        #[derive(Deserialize)]
        struct Envelope {
            roles: Vec<Role>,
        }
        let url = format!("{}/OS-KSADM/roles", self.endpoints.identity);
        Ok(self.get_as::<Envelope>(&url)?.roles)
    }

    /// The roles `user_id` holds on `tenant_id`.
    pub fn user_tenant_roles(
        &self,
        user_id: &str,
        tenant_id: &str,
    ) -> Result<Vec<Role>> {
        #[derive(Deserialize)]
        struct Envelope {
            roles: Vec<Role>,
        }
        let url = format!(
            "{}/tenants/{tenant_id}/users/{user_id}/roles",
            self.endpoints.identity
        );
        Ok(self.get_as::<Envelope>(&url)?.roles)
    }

    /// The roles a user holds across every tenant of the cloud, collected
    /// tenant by tenant. Used to compare role assignments between clouds,
    /// where neither user nor tenant ids survive the migration.
    pub fn user_roles_by_name(&self, user_name: &str) -> Result<Vec<Role>> {
        let user = self.find_user(user_name)?;
        let mut roles = Vec::new();
        for tenant in self.list_tenants()? {
            roles.extend(self.user_tenant_roles(&user.id, &tenant.id)?);
        }
        Ok(roles)
    }

    pub fn find_tenant(&self, name: &str) -> Result<Tenant> {
        self.list_tenants()?
            .into_iter()
            .find(|t| t.name == name)
            .ok_or_else(|| CloudError::NotFound {
                kind: "tenant".to_string(),
                name: name.to_string(),
            })
    }

    pub fn get_tenant_id(&self, name: &str) -> Result<String> {
        Ok(self.find_tenant(name)?.id)
    }

    /// The name of the tenant with the given id.
    pub fn get_tenant_name(&self, tenant_id: &str) -> Result<String> {
        #[derive(Deserialize)]
        struct Envelope {
            tenant: Tenant,
        }
        let url = format!("{}/tenants/{tenant_id}", self.endpoints.identity);
        Ok(self.get_as::<Envelope>(&url)?.tenant.name)
    }

    pub fn find_user(&self, name: &str) -> Result<User> {
        self.list_users()?
            .into_iter()
            .find(|u| u.name == name)
            .ok_or_else(|| CloudError::NotFound {
                kind: "user".to_string(),
                name: name.to_string(),
            })
    }

    pub fn find_role(&self, name: &str) -> Result<Role> {
        self.list_roles()?
            .into_iter()
            .find(|r| r.name == name)
            .ok_or_else(|| CloudError::NotFound {
                kind: "role".to_string(),
                name: name.to_string(),
            })
    }

    pub fn grant_user_role(
        &self,
        user_id: &str,
        tenant_id: &str,
        role_id: &str,
    ) -> Result<()> {
        let url = format!(
            "{}/tenants/{tenant_id}/users/{user_id}/roles/OS-KSADM/{role_id}",
            self.endpoints.identity
        );
        let response = self
            .http
            .put(&url)
            .header("X-Auth-Token", &self.token)
            .header("Content-Length", "0")
            .send()
            .map_err(|source| CloudError::Request { url: url.clone(), source })?;
        check_status(&url, response).map(|_| ())
    }

    pub fn revoke_user_role(
        &self,
        user_id: &str,
        tenant_id: &str,
        role_id: &str,
    ) -> Result<()> {
        let url = format!(
            "{}/tenants/{tenant_id}/users/{user_id}/roles/OS-KSADM/{role_id}",
            self.endpoints.identity
        );
        let response = self
            .http
            .delete(&url)
            .header("X-Auth-Token", &self.token)
            .send()
            .map_err(|source| CloudError::Request { url: url.clone(), source })?;
        check_status(&url, response).map(|_| ())
    }

    // Compute

    /// All servers across all tenants.
    pub fn list_servers(&self) -> Result<Vec<Server>> {
        #[derive(Deserialize)]
        struct Envelope {
            servers: Vec<Server>,
        }
        let url = format!(
            "{}/servers/detail?all_tenants=1",
            self.endpoints.compute
        );
        Ok(self.get_as::<Envelope>(&url)?.servers)
    }

    pub fn get_server(&self, server_id: &str) -> Result<Server> {
        #[derive(Deserialize)]
        struct Envelope {
            server: Server,
        }
        let url = format!("{}/servers/{server_id}", self.endpoints.compute);
        Ok(self.get_as::<Envelope>(&url)?.server)
    }

    pub fn get_vm_id(&self, name: &str) -> Result<String> {
        self.list_servers()?
            .into_iter()
            .find(|s| s.name == name)
            .map(|s| s.id)
            .ok_or_else(|| CloudError::NotFound {
                kind: "server".to_string(),
                name: name.to_string(),
            })
    }

    /// All flavors, private ones included.
    pub fn list_flavors(&self) -> Result<Vec<Flavor>> {
        #[derive(Deserialize)]
        struct Envelope {
            flavors: Vec<Flavor>,
        }
        let url = format!(
            "{}/flavors/detail?is_public=None",
            self.endpoints.compute
        );
        Ok(self.get_as::<Envelope>(&url)?.flavors)
    }

    /// Keypairs of the user this facade is authenticated as.
    pub fn list_keypairs(&self) -> Result<Vec<KeyPair>> {
        #[derive(Deserialize)]
        struct Entry {
            keypair: KeyPair,
        }
        #[derive(Deserialize)]
        struct Envelope {
            keypairs: Vec<Entry>,
        }
        let url = format!("{}/os-keypairs", self.endpoints.compute);
        Ok(self
            .get_as::<Envelope>(&url)?
            .keypairs
            .into_iter()
            .map(|e| e.keypair)
            .collect())
    }

    pub fn nova_services(&self, host: &str) -> Result<Vec<NovaService>> {
        #[derive(Deserialize)]
        struct Envelope {
            services: Vec<NovaService>,
        }
        let url = format!(
            "{}/os-services?host={host}",
            self.endpoints.compute
        );
        Ok(self.get_as::<Envelope>(&url)?.services)
    }

    pub fn nova_quotas(&self, tenant_id: &str) -> Result<Mapping> {
        #[derive(Deserialize)]
        struct Envelope {
            quota_set: Mapping,
        }
        let url = format!(
            "{}/os-quota-sets/{tenant_id}",
            self.endpoints.compute
        );
        Ok(self.get_as::<Envelope>(&url)?.quota_set)
    }

    // Network

    pub fn list_networks(&self) -> Result<Vec<Mapping>> {
        self.list_mappings("networks", None)
    }

    pub fn list_subnets(&self) -> Result<Vec<Mapping>> {
        self.list_mappings("subnets", None)
    }

    pub fn list_routers(&self) -> Result<Vec<Mapping>> {
        self.list_mappings("routers", None)
    }

    /// Routers with an external gateway configured.
    pub fn external_routers(&self) -> Result<Vec<Mapping>> {
        Ok(self
            .list_routers()?
            .into_iter()
            .filter(|r| {
                r.get("external_gateway_info")
                    .map(|gw| !gw.is_null())
                    .unwrap_or(false)
            })
            .collect())
    }

    pub fn list_security_groups(&self) -> Result<Vec<Mapping>> {
        self.list_mappings("security_groups", None)
    }

    pub fn list_floating_ips(&self) -> Result<Vec<Mapping>> {
        self.list_mappings("floatingips", None)
    }

    /// The set of floating addresses visible to this facade's user.
    pub fn floating_ip_addresses(
        &self,
    ) -> Result<std::collections::HashSet<String>> {
        Ok(self
            .list_floating_ips()?
            .iter()
            .filter_map(|fip| {
                fip.get("floating_ip_address")
                    .and_then(Value::as_str)
                    .map(str::to_string)
            })
            .collect())
    }

    pub fn neutron_agents(&self, host: &str) -> Result<Vec<NeutronAgent>> {
        #[derive(Deserialize)]
        struct Envelope {
            agents: Vec<NeutronAgent>,
        }
        let url = format!(
            "{}/v2.0/agents?host={host}",
            self.endpoints.network
        );
        Ok(self.get_as::<Envelope>(&url)?.agents)
    }

    pub fn neutron_quotas(&self, tenant_id: &str) -> Result<Mapping> {
        #[derive(Deserialize)]
        struct Envelope {
            quota: Mapping,
        }
        let url =
            format!("{}/v2.0/quotas/{tenant_id}", self.endpoints.network);
        Ok(self.get_as::<Envelope>(&url)?.quota)
    }

    /// The port carrying a router's external gateway address.
    pub fn router_gateway_port(&self, router_id: &str) -> Result<Mapping> {
        let query = format!(
            "device_id={router_id}&device_owner=network:router_gateway"
        );
        self.list_mappings("ports", Some(&query))?
            .into_iter()
            .next()
            .ok_or_else(|| CloudError::NotFound {
                kind: "router gateway port".to_string(),
                name: router_id.to_string(),
            })
    }

    /// Opens TCP/22 ingress in every security group of the tenant. A rule
    /// that already exists (409) is not an error.
    pub fn open_ssh_ingress(&self, tenant_id: &str) -> Result<()> {
        let query = format!("tenant_id={tenant_id}");
        let groups = self.list_mappings("security_groups", Some(&query))?;
        for group in &groups {
            let Some(group_id) = group.get("id").and_then(Value::as_str)
            else {
                continue;
            };
            let url = format!(
                "{}/v2.0/security-group-rules",
                self.endpoints.network
            );
            let body = json!({
                "security_group_rule": {
                    "security_group_id": group_id,
                    "tenant_id": tenant_id,
                    "direction": "ingress",
                    "protocol": "tcp",
                    "port_range_min": 22,
                    "port_range_max": 22,
                }
            });
            let response = self
                .http
                .post(&url)
                .header("X-Auth-Token", &self.token)
                .json(&body)
                .send()
                .map_err(|source| CloudError::Request {
                    url: url.clone(),
                    source,
                })?;
            if response.status().as_u16() == 409 {
                continue;
            }
            check_status(&url, response)?;
        }
        Ok(())
    }

    fn list_mappings(
        &self,
        collection: &str,
        query: Option<&str>,
    ) -> Result<Vec<Mapping>> {
        let mut url =
            format!("{}/v2.0/{collection}", self.endpoints.network);
        if let Some(query) = query {
            url = format!("{url}?{query}");
        }
        // Response shape is {"<collection>": [{...}, ...]}.
        let body: Mapping = self.get_as(&url)?;
        let items = body
            .get(collection)
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        Ok(items
            .into_iter()
            .filter_map(|item| match item {
                Value::Object(map) => Some(map),
                _ => None,
            })
            .collect())
    }

    // Image

    pub fn list_images(&self) -> Result<Vec<Image>> {
        #[derive(Deserialize)]
        struct Envelope {
            images: Vec<Image>,
        }
        let url = format!("{}/v2/images", self.endpoints.image);
        Ok(self.get_as::<Envelope>(&url)?.images)
    }

    pub fn get_image_id(&self, name: &str) -> Result<String> {
        self.list_images()?
            .into_iter()
            .find(|i| i.name == name)
            .map(|i| i.id)
            .ok_or_else(|| CloudError::NotFound {
                kind: "image".to_string(),
                name: name.to_string(),
            })
    }

    pub fn image_members(&self, image_id: &str) -> Result<Vec<ImageMember>> {
        #[derive(Deserialize)]
        struct Envelope {
            members: Vec<ImageMember>,
        }
        let url = format!(
            "{}/v2/images/{image_id}/members",
            self.endpoints.image
        );
        Ok(self.get_as::<Envelope>(&url)?.members)
    }

    // Block storage

    /// All volumes across all tenants.
    pub fn list_volumes(&self) -> Result<Vec<Volume>> {
        #[derive(Deserialize)]
        struct Envelope {
            volumes: Vec<Volume>,
        }
        let url = format!(
            "{}/volumes/detail?all_tenants=1",
            self.endpoints.volume
        );
        Ok(self.get_as::<Envelope>(&url)?.volumes)
    }

    fn get_as<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let response = self
            .http
            .get(url)
            .header("X-Auth-Token", &self.token)
            .send()
            .map_err(|source| CloudError::Request {
                url: url.to_string(),
                source,
            })?;
        let response = check_status(url, response)?;
        response.json().map_err(|source| CloudError::Request {
            url: url.to_string(),
            source,
        })
    }
}

fn check_status(
    url: &str,
    response: reqwest::blocking::Response,
) -> Result<reqwest::blocking::Response> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(CloudError::Api {
            url: url.to_string(),
            status: status.as_u16(),
            body: response.text().unwrap_or_default(),
        })
    }
}

fn resolve_endpoints(
    access: &Access,
    auth_url: &str,
) -> Result<ServiceEndpoints> {
    let find = |service: &str, admin: bool| -> Result<String> {
        let entry = access
            .service_catalog
            .iter()
            .find(|e| e.kind == service)
            .and_then(|e| e.endpoints.first())
            .ok_or_else(|| CloudError::MissingEndpoint {
                service: service.to_string(),
                url: auth_url.to_string(),
            })?;
        // Identity management (users, roles) lives on the admin endpoint;
        // everything else is served from the public one.
        let url = if admin {
            entry.admin_url.as_ref().unwrap_or(&entry.public_url)
        } else {
            &entry.public_url
        };
        Ok(url.trim_end_matches('/').to_string())
    };

    Ok(ServiceEndpoints {
        identity: find("identity", true)?,
        compute: find("compute", false)?,
        network: find("network", false)?,
        image: find("image", false)?,
        volume: find("volume", false)?,
    })
}
