//! Single-pass analyses over decoded states: per-part tensor reductions,
//! exterior-surface stress projections, and finite-difference motion.

pub mod tensor;
pub mod surface;
pub mod parts;
pub mod motion;
pub mod engine;
pub mod report;

pub use engine::{
    AnalysisConfig, CancelToken, EngineError, ParallelMode, Phase, SinglePassEngine,
    StressComponent, SurfaceSpec,
};
pub use report::{AnalysisResult, AnalysisWarnings, PartTimeSeriesStats, TimePoint};
pub use tensor::{StressTensor, Vec3};
