// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use anyhow::Result;
use mvt_framework::health::{HostServiceStatus, ServiceChecker};
use mvt_framework::Framework;
use tracing::{info, instrument};

pub struct TestFixtures<'a> {
    ctx: &'a Framework,
}

impl<'a> TestFixtures<'a> {
    pub fn new(ctx: &'a Framework) -> Self {
        Self { ctx }
    }

    /// Pre-flight for the whole run: every cloud that declares a control
    /// node must have all of its nova services and neutron agents up before
    /// any comparison is attempted. A cloud that stays unhealthy through
    /// the restart-and-recheck cycle aborts the run.
    #[instrument(skip_all)]
    pub fn execution_setup(&mut self) -> Result<()> {
        let config = self.ctx.config();
        let clouds = [
            ("src", self.ctx.source(), &config.src),
            ("dst", self.ctx.destination(), &config.dst),
        ];
        for (label, cloud, credentials) in clouds {
            let Some(node_ip) = &credentials.control_node_ip else {
                continue;
            };
            info!(cloud = label, host = %node_ip,
                  "checking service health before the run");
            let status =
                HostServiceStatus::new(cloud, self.ctx.remote(), node_ip)?;
            ServiceChecker::new(status).ensure_services_up()?;
        }
        Ok(())
    }

    #[instrument(skip_all)]
    pub fn execution_cleanup(&mut self) -> Result<()> {
        Ok(())
    }

    #[instrument(skip_all)]
    pub fn test_setup(&mut self) -> Result<()> {
        Ok(())
    }

    #[instrument(skip_all)]
    pub fn test_cleanup(&mut self) -> Result<()> {
        Ok(())
    }
}
