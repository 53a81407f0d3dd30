// Analyzer module: the shared contract plus one submodule per analysis.

pub mod contract;
pub mod correlator;
pub mod faults;
pub mod fuel;
pub mod performance;
pub mod statistics;

// Re-export the analyzers and their contract for ease of use.
pub use contract::Analyzer;
pub use correlator::{Baseline, Correlator};
pub use faults::FaultDetector;
pub use fuel::FuelEconomyAnalyzer;
pub use performance::PerformanceAnalyzer;
