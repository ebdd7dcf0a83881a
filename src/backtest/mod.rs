pub mod orchestrator;
pub mod report;
pub mod simulation;

pub use orchestrator::Orchestrator;
pub use report::{BatchReport, TaskStatus};
pub use simulation::{SignalSuite, Simulation, SimulationLimits, SimulationOutcome};
