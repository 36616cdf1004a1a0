//! Human-readable summary of a run.

use meshroot_simulation::SimulationStats;
use std::fmt;
use std::time::Duration;

/// Final report printed by the simulator.
#[derive(Debug, Clone)]
pub struct SimulationReport {
    pub seed: u64,
    pub duration: Duration,
    pub stats: SimulationStats,
}

impl SimulationReport {
    pub fn new(seed: u64, duration: Duration, stats: SimulationStats) -> Self {
        Self {
            seed,
            duration,
            stats,
        }
    }

    /// Fraction of directed messages that were answered.
    pub fn response_rate(&self) -> f64 {
        if self.stats.messages_sent == 0 {
            return 0.0;
        }
        self.stats.app.responses_received as f64 / self.stats.messages_sent as f64
    }
}

impl fmt::Display for SimulationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = &self.stats;
        writeln!(f, "=== Simulation report (seed {}, {:?}) ===", self.seed, self.duration)?;
        writeln!(f, "Onboarding")?;
        writeln!(f, "  queued for provisioning : {}", s.mesh.devices_queued)?;
        writeln!(f, "  registered              : {}", s.nodes_registered)?;
        writeln!(f, "  ready                   : {}", s.nodes_ready)?;
        writeln!(f, "  stuck                   : {}", s.nodes_stuck)?;
        writeln!(f, "  quota remaining         : {}", s.quota_remaining)?;
        writeln!(f, "  AppKey-Add sent         : {}", s.mesh.app_key_adds)?;
        writeln!(f, "Messaging")?;
        writeln!(f, "  messages sent           : {}", s.messages_sent)?;
        writeln!(f, "  messages refused        : {}", s.messages_refused)?;
        writeln!(
            f,
            "  responses received      : {} ({:.1}%)",
            s.app.responses_received,
            self.response_rate() * 100.0
        )?;
        writeln!(f, "  timeouts                : {}", s.app.timeouts)?;
        writeln!(f, "  broadcasts sent         : {}", s.broadcasts_sent)?;
        writeln!(f, "  inbound messages        : {}", s.app.messages_received)?;
        writeln!(f, "  responses sent          : {}", s.responses_sent)?;
        write!(f, "  transport send errors   : {}", s.send_errors)
    }
}
