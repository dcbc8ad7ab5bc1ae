// emubench: Timed evaluation harness for emulated multi-PoP NFV platforms
// Copyright (C) 2024-2025 The emubench developers
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.
//! Builds, exercises and tears down one emulated multi-PoP environment.

use rand::Rng;

use crate::{
    backend::{Backend, BackendError},
    instrument::{
        Timers, TIME_ENV_BOOT, TIME_LINK_CREATE, TIME_POP_CREATE, TIME_SERVICE_START,
        TIME_TOPO_START, TIME_TOTAL,
    },
    topology::TopologyModel,
};

/// Port of the shared control-plane endpoint.
pub const CONTROL_PLANE_PORT: u16 = 5001;

/// Compute API port of the first site; site `i` listens on `BASE + i`.
pub const COMPUTE_API_BASE_PORT: u16 = 6001;

/// Drives an emulation backend through the build, workload start and teardown
/// of one experiment environment, recording a wall-clock timer per phase.
#[derive(Debug)]
pub struct Testbed<B> {
    backend: B,
    model: TopologyModel,
    control_plane_up: bool,
    network_up: bool,
    /// Compute API ports that were started, in start order.
    api_ports: Vec<u16>,
}

impl<B: Backend> Testbed<B> {
    pub fn new(backend: B, model: TopologyModel) -> Self {
        Self {
            backend,
            model,
            control_plane_up: false,
            network_up: false,
            api_ports: Vec::new(),
        }
    }

    pub fn model(&self) -> &TopologyModel {
        &self.model
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Compute API ports of all sites, in site order. The orchestrator uses
    /// these as keystone endpoints when attaching the sites as VIMs.
    pub fn keystone_endpoints(&self) -> Vec<u16> {
        self.model
            .sites
            .iter()
            .map(|site| COMPUTE_API_BASE_PORT + site.index as u16)
            .collect()
    }

    /// Build the environment: boot the base network, create every site with
    /// its compute API, wire up the links, and start the emulated network.
    /// Every phase is timed individually, with [`TIME_TOTAL`] spanning all of
    /// them.
    ///
    /// Link creation is best-effort: a refused link is logged and skipped so
    /// it cannot void an otherwise long-running build. All other failures
    /// abort the build.
    pub fn build(&mut self, timers: &mut Timers) -> Result<(), BackendError> {
        let backend = &mut self.backend;
        let model = &self.model;

        timers.start(TIME_TOTAL);

        log::info!("booting environment for topology `{}`", model.name);
        timers.start(TIME_ENV_BOOT);
        backend.start_control_plane(CONTROL_PLANE_PORT)?;
        self.control_plane_up = true;
        backend.create_network()?;
        timers.stop(TIME_ENV_BOOT);

        timers.start(TIME_POP_CREATE);
        for site in &model.sites {
            backend.add_site(&site.name)?;
            let port = COMPUTE_API_BASE_PORT + site.index as u16;
            backend.start_compute_api(&site.name, port)?;
            self.api_ports.push(port);
        }
        timers.stop(TIME_POP_CREATE);

        timers.start(TIME_LINK_CREATE);
        for link in &model.links {
            let src = model.sites[link.src].name.as_str();
            let dst = model.sites[link.dst].name.as_str();
            if let Err(e) = backend.add_link(src, dst, link.delay_ms, link.bandwidth_mbps) {
                log::warn!("could not create link {src}-{dst}: {e}");
            }
        }
        timers.stop(TIME_LINK_CREATE);

        timers.start(TIME_TOPO_START);
        backend.start_network()?;
        self.network_up = true;
        timers.stop(TIME_TOPO_START);

        timers.stop(TIME_TOTAL);
        Ok(())
    }

    /// Start a service of `size` compute units with randomized placement
    /// across the sites.
    pub fn start_service(&mut self, size: usize, timers: &mut Timers) -> Result<(), BackendError> {
        let backend = &mut self.backend;
        let model = &self.model;
        if model.sites.is_empty() {
            log::warn!("no sites to place the service on");
            return Ok(());
        }
        log::info!("starting randomized service with size={size}");
        let mut rng = rand::thread_rng();
        timers.start(TIME_SERVICE_START);
        for i in 0..size {
            let site = &model.sites[rng.gen_range(0..model.sites.len())];
            log::info!("starting vnf{i} on {}", site.name);
            backend.start_compute(&site.name, &format!("vnf{i}"))?;
        }
        timers.stop(TIME_SERVICE_START);
        Ok(())
    }

    /// Tear down whatever was built: the control-plane endpoint first, then
    /// every compute API in start order, then the emulated network.
    pub fn stop(&mut self) -> Result<(), BackendError> {
        if self.control_plane_up {
            self.backend.stop_control_plane(CONTROL_PLANE_PORT)?;
            self.control_plane_up = false;
        }
        let backend = &mut self.backend;
        for port in &self.api_ports {
            backend.stop_compute_api(*port)?;
        }
        self.api_ports.clear();
        if self.network_up {
            self.backend.stop_network()?;
            self.network_up = false;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        testing::RecordingBackend,
        topology::{Pattern, TopologyModel},
    };

    fn line_testbed(n_pops: usize) -> Testbed<RecordingBackend> {
        Testbed::new(
            RecordingBackend::new(),
            TopologyModel::pattern(Pattern::Line, n_pops),
        )
    }

    fn op_kinds(backend: &RecordingBackend) -> Vec<&str> {
        backend
            .ops
            .iter()
            .map(|op| op.split_whitespace().next().unwrap())
            .collect()
    }

    #[test]
    fn build_runs_phases_in_order() {
        let mut testbed = line_testbed(3);
        let mut timers = Timers::new();
        testbed.build(&mut timers).unwrap();

        assert_eq!(
            op_kinds(testbed.backend()),
            vec![
                "rest-start",
                "net-create",
                "dc-create",
                "os-api-start",
                "dc-create",
                "os-api-start",
                "dc-create",
                "os-api-start",
                "link-add",
                "link-add",
                "net-start",
            ]
        );
        for key in [
            TIME_ENV_BOOT,
            TIME_POP_CREATE,
            TIME_LINK_CREATE,
            TIME_TOPO_START,
            TIME_TOTAL,
        ] {
            assert!(timers.secs(key).unwrap() >= 0.0, "{key} not resolved");
        }
    }

    #[test]
    fn keystone_endpoints_follow_site_order() {
        let testbed = line_testbed(3);
        assert_eq!(testbed.keystone_endpoints(), vec![6001, 6002, 6003]);
    }

    #[test]
    fn failing_link_is_skipped() {
        let backend = RecordingBackend::new().failing_link("dc0", "dc1");
        let mut testbed = Testbed::new(backend, TopologyModel::pattern(Pattern::Line, 3));
        let mut timers = Timers::new();
        testbed.build(&mut timers).unwrap();

        let links = testbed.backend().ops_with_prefix("link-add");
        assert_eq!(links.len(), 1);
        assert!(links[0].starts_with("link-add dc1 dc2"));
        // the network still starts after the failed link
        assert_eq!(testbed.backend().ops_with_prefix("net-start").len(), 1);
    }

    #[test]
    fn teardown_order_is_control_plane_apis_network() {
        let mut testbed = line_testbed(2);
        let mut timers = Timers::new();
        testbed.build(&mut timers).unwrap();
        testbed.stop().unwrap();

        let ops = &testbed.backend().ops;
        let tail: Vec<&str> = ops.iter().map(String::as_str).rev().take(4).collect();
        assert_eq!(
            tail,
            vec!["net-stop", "os-api-stop 6002", "os-api-stop 6001", "rest-stop 5001"]
        );
    }

    #[test]
    fn stop_without_build_is_a_no_op() {
        let mut testbed = line_testbed(3);
        testbed.stop().unwrap();
        assert!(testbed.backend().ops.is_empty());
    }

    #[test]
    fn service_placement_stays_within_sites() {
        let mut testbed = line_testbed(3);
        let mut timers = Timers::new();
        testbed.build(&mut timers).unwrap();
        testbed.start_service(4, &mut timers).unwrap();

        let starts = testbed.backend().ops_with_prefix("compute-start");
        assert_eq!(starts.len(), 4);
        for (i, op) in starts.iter().enumerate() {
            let mut parts = op.split_whitespace();
            assert_eq!(parts.next(), Some("compute-start"));
            let site = parts.next().unwrap();
            assert!(["dc0", "dc1", "dc2"].contains(&site));
            assert_eq!(parts.next(), Some(format!("vnf{i}").as_str()));
        }
        assert!(timers.secs(TIME_SERVICE_START).is_some());
    }
}
