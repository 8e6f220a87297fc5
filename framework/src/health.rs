// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Pre-run liveness checking for the control services of a cloud.
//!
//! Nova services and neutron agents on the control node are polled until
//! both report nothing down. On timeout the remaining down components are
//! restarted once and the poll is repeated; anything still down after that
//! aborts the whole run rather than failing a single test.

use std::time::Duration;

use anyhow::Result;
use thiserror::Error;
use tracing::{info, warn};

use crate::cloud::Cloud;
use crate::remote::{ExecOptions, RemoteExec};

/// Seconds to wait for services to come up, polling once per second.
pub const SERVICES_UP_TIMEOUT: usize = 180;

// The openvswitch agent's service name does not match its binary name.
const OPENVSWITCH_AGENT_BINARY: &str = "neutron-openvswitch-agent";
const OPENVSWITCH_AGENT_SERVICE: &str = "neutron-plugin-openvswitch-agent";

#[derive(Debug, Error)]
pub enum HealthCheckError {
    #[error(
        "services still in down state after restarting them: {services:?}; \
         make sure all services are up before generating load again"
    )]
    ServicesStillDown { services: Vec<String> },
}

/// Live service/agent status of one host, plus the restart control for it.
///
/// Split out as a trait so the polling logic can be driven against a fake in
/// unit tests.
pub trait ServiceStatus {
    /// Binaries of nova services currently reported down on the host.
    fn down_nova_services(&self) -> Result<Vec<String>>;

    /// Binaries of neutron agents currently reported not alive on the host.
    fn down_neutron_agents(&self) -> Result<Vec<String>>;

    fn restart_service(&self, service: &str) -> Result<()>;
}

/// Production [`ServiceStatus`]: queries through the cloud accessor and
/// restarts over SSH as root on the control node.
pub struct HostServiceStatus<'a> {
    cloud: &'a Cloud,
    remote: &'a RemoteExec,
    node_ip: String,
    hostname: String,
}

impl<'a> HostServiceStatus<'a> {
    pub fn new(
        cloud: &'a Cloud,
        remote: &'a RemoteExec,
        node_ip: &str,
    ) -> Result<Self> {
        let hostname = remote.execute_command_on_vm(
            node_ip,
            "hostname",
            &ExecOptions::as_root(),
        )?;
        Ok(Self {
            cloud,
            remote,
            node_ip: node_ip.to_string(),
            hostname,
        })
    }
}

impl ServiceStatus for HostServiceStatus<'_> {
    fn down_nova_services(&self) -> Result<Vec<String>> {
        Ok(self
            .cloud
            .nova_services(&self.hostname)?
            .into_iter()
            .filter(|s| s.state == "down")
            .map(|s| s.binary)
            .collect())
    }

    fn down_neutron_agents(&self) -> Result<Vec<String>> {
        Ok(self
            .cloud
            .neutron_agents(&self.hostname)?
            .into_iter()
            .filter(|a| !a.alive)
            .map(|a| a.binary)
            .collect())
    }

    fn restart_service(&self, service: &str) -> Result<()> {
        self.remote.execute_command_on_vm(
            &self.node_ip,
            &format!("service {service} restart"),
            &ExecOptions::as_root(),
        )?;
        Ok(())
    }
}

/// Services and agents that stayed down through a full polling loop.
#[derive(Debug, Default)]
pub struct DownServices {
    pub nova_services: Vec<String>,
    pub neutron_agents: Vec<String>,
}

impl DownServices {
    fn merged(&self) -> Vec<String> {
        self.nova_services
            .iter()
            .chain(self.neutron_agents.iter())
            .cloned()
            .collect()
    }
}

pub struct ServiceChecker<S> {
    status: S,
    attempts: usize,
    interval: Duration,
}

impl<S: ServiceStatus> ServiceChecker<S> {
    pub fn new(status: S) -> Self {
        Self {
            status,
            attempts: SERVICES_UP_TIMEOUT,
            interval: Duration::from_secs(1),
        }
    }

    /// Overrides the polling budget. Production callers keep the defaults;
    /// unit tests shrink them.
    pub fn with_poll_policy(
        status: S,
        attempts: usize,
        interval: Duration,
    ) -> Self {
        Self { status, attempts, interval }
    }

    /// Polls until both subsystems report nothing down, or the attempt
    /// budget runs out. Each subsystem is latched: once it reports clean it
    /// is not polled again. Returns `None` on success, or the remaining down
    /// components on timeout.
    pub fn wait_until_services_up(&self) -> Result<Option<DownServices>> {
        let mut check_nova = true;
        let mut check_neutron = true;
        let mut down_services = Vec::new();
        let mut down_agents = Vec::new();
        for _ in 0..self.attempts {
            if check_nova {
                down_services = self.status.down_nova_services()?;
                check_nova = !down_services.is_empty();
            }
            if check_neutron {
                down_agents = self.status.down_neutron_agents()?;
                check_neutron = !down_agents.is_empty();
            }
            if !check_nova && !check_neutron {
                return Ok(None);
            }
            std::thread::sleep(self.interval);
        }
        Ok(Some(DownServices {
            nova_services: down_services,
            neutron_agents: down_agents,
        }))
    }

    /// Waits for the services to come up; on timeout restarts the down ones
    /// and waits once more. Anything still down after the single
    /// restart-and-recheck cycle is fatal to the whole run.
    pub fn ensure_services_up(&self) -> Result<()> {
        let Some(down) = self.wait_until_services_up()? else {
            info!("all services and agents are up");
            return Ok(());
        };

        for service in &down.nova_services {
            warn!(%service, "nova service is down, restarting");
            self.status.restart_service(service)?;
        }
        for agent in &down.neutron_agents {
            warn!(agent = %agent, "neutron agent is down, restarting");
            let service = if agent == OPENVSWITCH_AGENT_BINARY {
                OPENVSWITCH_AGENT_SERVICE
            } else {
                agent
            };
            self.status.restart_service(service)?;
        }

        if let Some(still_down) = self.wait_until_services_up()? {
            return Err(HealthCheckError::ServicesStillDown {
                services: still_down.merged(),
            }
            .into());
        }
        Ok(())
    }
}
