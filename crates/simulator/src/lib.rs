//! Mesh root simulator.
//!
//! Runs the orchestrator against the seeded simulated mesh for a configured
//! stretch of simulated time and reports onboarding and messaging outcomes.
//!
//! # Example
//!
//! ```ignore
//! use meshroot_simulator::{Simulator, SimulatorConfig};
//!
//! let config = SimulatorConfig::from_toml(&std::fs::read_to_string("sim.toml")?)?;
//! let report = Simulator::new(config)?.run();
//! println!("{report}");
//! ```

pub mod config;
pub mod report;

pub use config::{NetworkSection, SimulatorConfig, WorkloadSection};
pub use report::SimulationReport;

use meshroot_simulation::{SimulationError, SimulationRunner};
use tracing::info;

/// A configured simulation, ready to run.
#[derive(Debug)]
pub struct Simulator {
    config: SimulatorConfig,
    runner: SimulationRunner,
}

impl Simulator {
    pub fn new(config: SimulatorConfig) -> Result<Self, SimulationError> {
        let runner = SimulationRunner::new(
            config.provisioner.clone(),
            config.to_network_config(),
            config.to_workload_config(),
            config.seed,
        )?;
        Ok(Self { config, runner })
    }

    /// Run to the configured duration.
    pub fn run(mut self) -> SimulationReport {
        info!(
            seed = self.config.seed,
            devices = self.config.network.devices,
            quota = self.config.provisioner.max_node_num,
            "Starting simulation"
        );
        let duration = self.config.duration();
        self.runner.run_until(duration);
        self.runner.orchestrator().log_network_info();
        SimulationReport::new(self.config.seed, duration, self.runner.stats())
    }
}
