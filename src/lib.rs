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
//! Library for measuring how an emulated multi-PoP NFV platform scales.
//!
//! The crate synthesizes point-of-presence topologies (parametric patterns or
//! Topology-Zoo GraphML imports), boots them on an emulation backend while
//! timing every build phase, optionally drives an OSM-like orchestrator
//! through VIM attachment, package onboarding and service instantiation, and
//! collects one timing/memory record per experiment run into CSV tables.

pub mod backend;
pub mod experiments;
pub mod graphml;
pub mod instrument;
pub mod isolation;
pub mod orchestrator;
pub mod records;
pub mod testbed;
pub mod topology;
pub mod util;

#[cfg(test)]
pub(crate) mod testing;

pub mod prelude {
    pub use super::{
        backend::{Backend, EmuCtl},
        experiments::{RunSettings, RunSpec, SweepConfig, SweepKind, SweepPoint},
        instrument::{MemSnapshot, Timers},
        orchestrator::{OsmClient, OsmSettings},
        records::{ActionRecord, RunRecord},
        testbed::Testbed,
        topology::TopologyModel,
    };
}
