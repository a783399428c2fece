//! The single-pass reduction engine.
//!
//! Each state record is decoded exactly once; every enabled analysis is fed
//! during that one visit. Three execution shapes share the same per-state
//! code: plain sequential, a bounded batch of decoded states fanned out on
//! the thread pool, and element-level parallelism inside each state.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rayon::prelude::*;
use thiserror::Error;

use crate::format::state::{StateData, StateIterator};
use crate::format::FormatError;
use crate::D3plotFile;

use super::motion::{MotionIntegrator, MotionSample};
use super::parts::PartIndex;
use super::report::{
    AnalysisResult, AnalysisWarnings, PartTimeSeriesStats, ReportMetadata, SurfaceStrainStats,
    SurfaceStrainTimePoint, SurfaceTimePoint, SurfaceTimeSeriesStats, TimePoint,
};
use super::surface::{self, Face, FaceKind};
use super::tensor::{StressTensor, Vec3};

/// Shear strain placeholder factor, ~1/sqrt(3), applied to effective plastic
/// strain on surface strain output.
const SHEAR_STRAIN_FACTOR: f64 = 0.577;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Format(#[from] FormatError),

    #[error("analysis cancelled")]
    Cancelled,

    #[error("configuration error: {0}")]
    Config(String),
}

impl EngineError {
    pub fn kind_name(&self) -> &'static str {
        match self {
            EngineError::Format(e) => e.kind_name(),
            EngineError::Cancelled => "Cancelled",
            EngineError::Config(_) => "Config",
        }
    }
}

/// Cooperative cancellation. Checked at state boundaries; the state being
/// processed when the flag flips is finished and then discarded together
/// with all partial results.
#[derive(Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> CancelToken {
        CancelToken::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum Phase {
    Opening,
    Geometry,
    Surfaces,
    States,
    Finalize,
}

impl Phase {
    pub fn tag(self) -> &'static str {
        match self {
            Phase::Opening => "opening",
            Phase::Geometry => "geometry",
            Phase::Surfaces => "surfaces",
            Phase::States => "states",
            Phase::Finalize => "finalize",
        }
    }
}

/// `(phase, current, total, message)`, invoked from the driving thread only.
pub type ProgressFn<'a> = dyn Fn(Phase, usize, usize, &str) + Sync + 'a;

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum ParallelMode {
    Sequential,
    /// Decode in order, process a bounded batch of decoded states on the
    /// thread pool, merge in state order.
    StateLevel,
    /// Process states strictly in order, parallelize the element loops.
    ElementLevel,
}

impl Default for ParallelMode {
    fn default() -> ParallelMode {
        ParallelMode::StateLevel
    }
}

/// Scalar quantity extracted per solid element and state.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum StressComponent {
    StressXX,
    StressYY,
    StressZZ,
    StressXY,
    StressYZ,
    StressZX,
    VonMises,
    Pressure,
    EffPlasticStrain,
    StrainXX,
    StrainYY,
    StrainZZ,
    StrainXY,
    StrainYZ,
    StrainZX,
}

impl StressComponent {
    pub fn name(self) -> &'static str {
        match self {
            StressComponent::StressXX => "stress_xx",
            StressComponent::StressYY => "stress_yy",
            StressComponent::StressZZ => "stress_zz",
            StressComponent::StressXY => "stress_xy",
            StressComponent::StressYZ => "stress_yz",
            StressComponent::StressZX => "stress_zx",
            StressComponent::VonMises => "von_mises",
            StressComponent::Pressure => "pressure",
            StressComponent::EffPlasticStrain => "eff_plastic_strain",
            StressComponent::StrainXX => "strain_xx",
            StressComponent::StrainYY => "strain_yy",
            StressComponent::StrainZZ => "strain_zz",
            StressComponent::StrainXY => "strain_xy",
            StressComponent::StrainYZ => "strain_yz",
            StressComponent::StrainZX => "strain_zx",
        }
    }

    pub fn unit(self) -> &'static str {
        match self {
            StressComponent::EffPlasticStrain
            | StressComponent::StrainXX
            | StressComponent::StrainYY
            | StressComponent::StrainZZ
            | StressComponent::StrainXY
            | StressComponent::StrainYZ
            | StressComponent::StrainZX => "",
            _ => "MPa",
        }
    }

    /// Inverse of `name`, for driver-facing option parsing.
    pub fn from_name(name: &str) -> Option<StressComponent> {
        const ALL: [StressComponent; 15] = [
            StressComponent::StressXX,
            StressComponent::StressYY,
            StressComponent::StressZZ,
            StressComponent::StressXY,
            StressComponent::StressYZ,
            StressComponent::StressZX,
            StressComponent::VonMises,
            StressComponent::Pressure,
            StressComponent::EffPlasticStrain,
            StressComponent::StrainXX,
            StressComponent::StrainYY,
            StressComponent::StrainZZ,
            StressComponent::StrainXY,
            StressComponent::StrainYZ,
            StressComponent::StrainZX,
        ];
        ALL.into_iter().find(|c| c.name() == name)
    }

    pub fn needs_strain_tensor(self) -> bool {
        matches!(
            self,
            StressComponent::StrainXX
                | StressComponent::StrainYY
                | StressComponent::StrainZZ
                | StressComponent::StrainXY
                | StressComponent::StrainYZ
                | StressComponent::StrainZX
        )
    }

    /// Pull the value out of one solid element's per-state words.
    fn extract(self, block: &[f64], strain_offset: Option<usize>) -> Option<f64> {
        match self {
            StressComponent::StressXX => block.get(0).copied(),
            StressComponent::StressYY => block.get(1).copied(),
            StressComponent::StressZZ => block.get(2).copied(),
            StressComponent::StressXY => block.get(3).copied(),
            StressComponent::StressYZ => block.get(4).copied(),
            StressComponent::StressZX => block.get(5).copied(),
            StressComponent::VonMises => {
                if block.len() < 6 {
                    return None;
                }
                Some(StressTensor::from_words(block).von_mises())
            }
            StressComponent::Pressure => {
                if block.len() < 6 {
                    return None;
                }
                Some(StressTensor::from_words(block).pressure())
            }
            StressComponent::EffPlasticStrain => block.get(6).copied(),
            StressComponent::StrainXX => block.get(strain_offset?).copied(),
            StressComponent::StrainYY => block.get(strain_offset? + 1).copied(),
            StressComponent::StrainZZ => block.get(strain_offset? + 2).copied(),
            StressComponent::StrainXY => block.get(strain_offset? + 3).copied(),
            StressComponent::StrainYZ => block.get(strain_offset? + 4).copied(),
            StressComponent::StrainZX => block.get(strain_offset? + 5).copied(),
        }
    }
}

/// A direction-filtered exterior surface to reduce over.
#[derive(Clone, Debug)]
pub struct SurfaceSpec {
    pub name: String,
    pub direction: Vec3,
    pub angle_degrees: f64,
    pub part_filter: Option<Vec<i32>>,
}

/// Flat switchboard of everything one run can do.
#[derive(Clone, Debug)]
pub struct AnalysisConfig {
    pub d3plot_path: PathBuf,

    pub analyze_von_mises: bool,
    pub analyze_effective_plastic_strain: bool,
    pub analyze_motion: bool,
    pub analyze_surface_strain: bool,
    /// Further per-part scalar reductions beyond the two common ones.
    pub extra_components: Vec<StressComponent>,

    /// Parts to analyze; `None` means every part in the model.
    pub part_filter: Option<Vec<i32>>,
    pub surface_specs: Vec<SurfaceSpec>,

    pub parallel_mode: ParallelMode,
    /// 0 lets the pool pick the hardware default.
    pub num_threads: usize,
    /// Re-evaluate face normals from deformed positions each state.
    pub deformed_normals: bool,
}

impl Default for AnalysisConfig {
    fn default() -> AnalysisConfig {
        AnalysisConfig {
            d3plot_path: PathBuf::new(),
            analyze_von_mises: true,
            analyze_effective_plastic_strain: false,
            analyze_motion: false,
            analyze_surface_strain: false,
            extra_components: Vec::new(),
            part_filter: None,
            surface_specs: Vec::new(),
            parallel_mode: ParallelMode::default(),
            num_threads: 0,
            deformed_normals: false,
        }
    }
}

/// Step-local running statistics for one scalar over one entity set.
/// Ties on the maximum resolve to the lower entity id so every execution
/// shape reports the same element.
#[derive(Copy, Clone, Debug)]
struct ScalarAcc {
    max: f64,
    min: f64,
    sum: f64,
    count: usize,
    max_entity: i64,
    min_entity: i64,
}

impl ScalarAcc {
    fn new() -> ScalarAcc {
        ScalarAcc {
            max: f64::NEG_INFINITY,
            min: f64::INFINITY,
            sum: 0.0,
            count: 0,
            max_entity: 0,
            min_entity: 0,
        }
    }

    fn add(&mut self, value: f64, entity: i64) {
        if value > self.max || (value == self.max && entity < self.max_entity) {
            self.max = value;
            self.max_entity = entity;
        }
        if value < self.min || (value == self.min && entity < self.min_entity) {
            self.min = value;
            self.min_entity = entity;
        }
        self.sum += value;
        self.count += 1;
    }

    fn merge(&mut self, other: &ScalarAcc) {
        if other.count == 0 {
            return;
        }
        if other.max > self.max || (other.max == self.max && other.max_entity < self.max_entity) {
            self.max = other.max;
            self.max_entity = other.max_entity;
        }
        if other.min < self.min || (other.min == self.min && other.min_entity < self.min_entity) {
            self.min = other.min;
            self.min_entity = other.min_entity;
        }
        self.sum += other.sum;
        self.count += other.count;
    }

    fn mean(&self) -> f64 {
        if self.count > 0 {
            self.sum / self.count as f64
        }
        else {
            0.0
        }
    }

    fn to_point(&self, time: f64) -> TimePoint {
        if self.count == 0 {
            return TimePoint {
                time,
                ..Default::default()
            };
        }
        TimePoint {
            time,
            max: self.max,
            min: self.min,
            mean: self.mean(),
            max_element_id: self.max_entity,
            min_element_id: self.min_entity,
        }
    }
}

#[derive(Copy, Clone, Debug)]
struct SurfaceAcc {
    von_mises: ScalarAcc,
    normal: ScalarAcc,
    shear: ScalarAcc,
}

impl SurfaceAcc {
    fn new() -> SurfaceAcc {
        SurfaceAcc {
            von_mises: ScalarAcc::new(),
            normal: ScalarAcc::new(),
            shear: ScalarAcc::new(),
        }
    }
}

#[derive(Copy, Clone, Debug)]
struct StrainAcc {
    normal: ScalarAcc,
    shear: ScalarAcc,
}

/// Everything one state contributes, computed independently of every other
/// state so batches can run concurrently, then merged in state order.
struct StepOutput {
    time: f64,
    per_component: Vec<Vec<ScalarAcc>>,
    per_surface: Vec<SurfaceAcc>,
    per_surface_strain: Vec<StrainAcc>,
    motion: Option<Vec<MotionSample>>,
    warnings: AnalysisWarnings,
}

/// Immutable inputs shared by every per-state evaluation.
struct StepContext<'a> {
    file: &'a D3plotFile,
    nv3d: usize,
    strain_offset: Option<usize>,
    effective_ndim: usize,
    components: Vec<StressComponent>,
    /// Per analyzed part: id and its solid element indices.
    stress_parts: Vec<(i32, &'a [usize])>,
    surfaces: Vec<Vec<Face>>,
    strain_surfaces: Vec<Vec<Face>>,
    motion: Option<MotionIntegrator>,
    element_parallel: bool,
    deformed_normals: bool,
}

impl<'a> StepContext<'a> {
    fn reduce_part(&self, state: &StateData, elements: &[usize], component: StressComponent) -> (ScalarAcc, usize) {
        let eval = |acc: &mut ScalarAcc, nonfinite: &mut usize, &e: &usize| {
            let Some(block) = state.solid_block(e, self.nv3d) else {
                return;
            };
            let Some(value) = component.extract(block, self.strain_offset) else {
                return;
            };
            if !value.is_finite() {
                *nonfinite += 1;
                return;
            }
            acc.add(value, self.file.mesh.solid_user_id(e));
        };

        if self.element_parallel {
            elements
                .par_iter()
                .fold(
                    || (ScalarAcc::new(), 0usize),
                    |mut st, e| {
                        eval(&mut st.0, &mut st.1, e);
                        st
                    },
                )
                .reduce(
                    || (ScalarAcc::new(), 0usize),
                    |mut a, b| {
                        a.0.merge(&b.0);
                        a.1 += b.1;
                        a
                    },
                )
        }
        else {
            let mut acc = ScalarAcc::new();
            let mut nonfinite = 0usize;
            for e in elements {
                eval(&mut acc, &mut nonfinite, e);
            }
            (acc, nonfinite)
        }
    }

    fn reduce_surface(&self, state: &StateData, faces: &[Face], warnings: &mut AnalysisWarnings) -> SurfaceAcc {
        let mut acc = SurfaceAcc::new();
        let deformed = self.deformed_normals.then(|| {
            let mut own = faces.to_vec();
            surface::update_for_state(&mut own, &self.file.mesh, state, self.effective_ndim);
            own
        });
        let faces: &[Face] = deformed.as_deref().unwrap_or(faces);

        for face in faces {
            if face.kind != FaceKind::Solid {
                continue;
            }
            if face.area <= 0.0 {
                warnings.degenerate_faces += 1;
                continue;
            }
            let Some(block) = state.solid_block(face.element_index, self.nv3d) else {
                continue;
            };
            let tensor = StressTensor::from_words(block);
            let vm = tensor.von_mises();
            let sn = tensor.normal_stress(face.normal);
            let tau = tensor.shear_stress(face.normal);
            if !vm.is_finite() || !sn.is_finite() || !tau.is_finite() {
                warnings.nonfinite_values += 1;
                continue;
            }
            acc.von_mises.add(vm, face.element_user_id);
            acc.normal.add(sn, face.element_user_id);
            acc.shear.add(tau, face.element_user_id);
        }
        acc
    }

    fn reduce_surface_strain(&self, state: &StateData, faces: &[Face], warnings: &mut AnalysisWarnings) -> StrainAcc {
        let mut acc = StrainAcc {
            normal: ScalarAcc::new(),
            shear: ScalarAcc::new(),
        };
        for face in faces {
            if face.kind != FaceKind::Solid {
                continue;
            }
            let Some(block) = state.solid_block(face.element_index, self.nv3d) else {
                continue;
            };
            let Some(&eff) = block.get(6) else {
                continue;
            };
            if !eff.is_finite() {
                warnings.nonfinite_values += 1;
                continue;
            }
            acc.normal.add(eff, face.element_user_id);
            acc.shear.add(eff * SHEAR_STRAIN_FACTOR, face.element_user_id);
        }
        acc
    }

    fn process_state(&self, state: &StateData) -> StepOutput {
        let mut warnings = AnalysisWarnings::default();

        let mut per_component = Vec::with_capacity(self.components.len());
        for &component in &self.components {
            let mut per_part = Vec::with_capacity(self.stress_parts.len());
            for (_, elements) in &self.stress_parts {
                let (acc, nonfinite) = self.reduce_part(state, elements, component);
                warnings.nonfinite_values += nonfinite;
                per_part.push(acc);
            }
            per_component.push(per_part);
        }

        let per_surface = self
            .surfaces
            .iter()
            .map(|faces| self.reduce_surface(state, faces, &mut warnings))
            .collect();

        let per_surface_strain = self
            .strain_surfaces
            .iter()
            .map(|faces| self.reduce_surface_strain(state, faces, &mut warnings))
            .collect();

        let motion = match &self.motion {
            Some(integrator) if !state.node_displacements.is_empty() => {
                Some(integrator.sample(state, self.effective_ndim))
            }
            _ => None,
        };

        StepOutput {
            time: state.time,
            per_component,
            per_surface,
            per_surface_strain,
            motion,
            warnings,
        }
    }
}

pub struct SinglePassEngine<'a> {
    file: &'a D3plotFile,
}

impl<'a> SinglePassEngine<'a> {
    pub fn new(file: &'a D3plotFile) -> SinglePassEngine<'a> {
        SinglePassEngine { file }
    }

    pub fn run(
        &self,
        config: &AnalysisConfig,
        progress: Option<&ProgressFn>,
        cancel: Option<&CancelToken>,
    ) -> Result<AnalysisResult, EngineError> {
        if config.num_threads > 0 {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(config.num_threads)
                .build()
                .map_err(|e| EngineError::Config(e.to_string()))?;
            pool.install(|| self.run_inner(config, progress, cancel))
        }
        else {
            self.run_inner(config, progress, cancel)
        }
    }

    fn run_inner(
        &self,
        config: &AnalysisConfig,
        progress: Option<&ProgressFn>,
        cancel: Option<&CancelToken>,
    ) -> Result<AnalysisResult, EngineError> {
        let report = |phase: Phase, current: usize, total: usize, msg: &str| {
            if let Some(cb) = progress {
                cb(phase, current, total, msg);
            }
        };
        let cancelled = || cancel.map_or(false, CancelToken::is_cancelled);

        let control = &self.file.control;
        let mesh = &self.file.mesh;

        report(Phase::Geometry, 0, 1, "building part index");
        let index = PartIndex::build(mesh);

        let mut components = Vec::new();
        if config.analyze_von_mises {
            components.push(StressComponent::VonMises);
        }
        if config.analyze_effective_plastic_strain {
            components.push(StressComponent::EffPlasticStrain);
        }
        for &c in &config.extra_components {
            if !components.contains(&c) {
                components.push(c);
            }
        }
        let strain_offset = control.solid_strain_offset();
        for &c in &components {
            if c.needs_strain_tensor() && strain_offset.is_none() {
                return Err(EngineError::Config(format!(
                    "{} requested but the database carries no strain tensor",
                    c.name()
                )));
            }
        }

        // Parts in ascending id order; only parts that own solid elements
        // feed the stress reductions.
        let stress_parts: Vec<(i32, &[usize])> = index
            .part_ids
            .iter()
            .filter(|&&p| config.part_filter.as_ref().map_or(true, |f| f.contains(&p)))
            .map(|&p| (p, index.solid_elements(p)))
            .filter(|(_, elems)| !elems.is_empty())
            .collect();

        report(
            Phase::Surfaces,
            0,
            config.surface_specs.len().max(1),
            "extracting exterior surfaces",
        );
        let mut surfaces = Vec::with_capacity(config.surface_specs.len());
        for (i, spec) in config.surface_specs.iter().enumerate() {
            let all = surface::extract_solid_exterior(mesh, spec.part_filter.as_deref());
            let filtered = surface::filter_by_direction(all, spec.direction, spec.angle_degrees);
            report(
                Phase::Surfaces,
                i + 1,
                config.surface_specs.len(),
                &format!("surface '{}': {} face(s)", spec.name, filtered.len()),
            );
            surfaces.push(filtered);
        }
        let strain_surfaces = if config.analyze_surface_strain {
            surfaces.clone()
        }
        else {
            Vec::new()
        };

        let motion_parts: Vec<i32> = if config.analyze_motion {
            index
                .part_ids
                .iter()
                .filter(|&&p| config.part_filter.as_ref().map_or(true, |f| f.contains(&p)))
                .copied()
                .collect()
        }
        else {
            Vec::new()
        };

        let ctx = StepContext {
            file: self.file,
            nv3d: control.nv3d.max(0) as usize,
            strain_offset,
            effective_ndim: control.effective_ndim(),
            components,
            stress_parts,
            surfaces,
            strain_surfaces,
            motion: config
                .analyze_motion
                .then(|| MotionIntegrator::new(mesh, &index, &motion_parts)),
            element_parallel: config.parallel_mode == ParallelMode::ElementLevel,
            deformed_normals: config.deformed_normals,
        };

        // Output series, allocated up front in the observable order.
        let total_states = StateIterator::count_states(&self.file.cursor, control) as usize;
        let mut component_series: Vec<Vec<PartTimeSeriesStats>> = ctx
            .components
            .iter()
            .map(|c| {
                ctx.stress_parts
                    .iter()
                    .map(|(p, _)| PartTimeSeriesStats {
                        part_id: *p,
                        quantity: c.name().to_string(),
                        unit: c.unit().to_string(),
                        series: Vec::with_capacity(total_states),
                        ..Default::default()
                    })
                    .collect()
            })
            .collect();
        let mut surface_series: Vec<SurfaceTimeSeriesStats> = config
            .surface_specs
            .iter()
            .zip(&ctx.surfaces)
            .map(|(spec, faces)| SurfaceTimeSeriesStats {
                name: spec.name.clone(),
                reference_direction: spec.direction,
                angle_threshold_degrees: spec.angle_degrees,
                part_filter: spec.part_filter.clone(),
                num_faces: faces.len(),
                series: Vec::with_capacity(total_states),
                ..Default::default()
            })
            .collect();
        let mut strain_series: Vec<SurfaceStrainStats> = if config.analyze_surface_strain {
            config
                .surface_specs
                .iter()
                .zip(&ctx.strain_surfaces)
                .map(|(spec, faces)| SurfaceStrainStats {
                    name: spec.name.clone(),
                    reference_direction: spec.direction,
                    angle_threshold_degrees: spec.angle_degrees,
                    part_filter: spec.part_filter.clone(),
                    num_faces: faces.len(),
                    series: Vec::with_capacity(total_states),
                })
                .collect()
        }
        else {
            Vec::new()
        };

        let mut motion_integrator = ctx
            .motion
            .as_ref()
            .map(|_| MotionIntegrator::new(mesh, &index, &motion_parts));
        let mut warnings = AnalysisWarnings::default();
        let mut times: Vec<f64> = Vec::with_capacity(total_states);

        let mut merge_step = |out: StepOutput| {
            times.push(out.time);
            for (ci, per_part) in out.per_component.iter().enumerate() {
                for (pi, acc) in per_part.iter().enumerate() {
                    component_series[ci][pi].series.push(acc.to_point(out.time));
                }
            }
            for (si, acc) in out.per_surface.iter().enumerate() {
                surface_series[si].series.push(SurfaceTimePoint {
                    time: out.time,
                    von_mises_max: acc.von_mises.to_point(out.time).max,
                    von_mises_min: acc.von_mises.to_point(out.time).min,
                    von_mises_mean: acc.von_mises.mean(),
                    von_mises_max_element_id: acc.von_mises.max_entity,
                    normal_max: acc.normal.to_point(out.time).max,
                    normal_min: acc.normal.to_point(out.time).min,
                    normal_mean: acc.normal.mean(),
                    normal_max_element_id: acc.normal.max_entity,
                    shear_max: acc.shear.to_point(out.time).max,
                    shear_min: acc.shear.to_point(out.time).min,
                    shear_mean: acc.shear.mean(),
                    shear_max_element_id: acc.shear.max_entity,
                });
            }
            for (si, acc) in out.per_surface_strain.iter().enumerate() {
                strain_series[si].series.push(SurfaceStrainTimePoint {
                    time: out.time,
                    normal_strain_max: acc.normal.to_point(out.time).max,
                    normal_strain_min: acc.normal.to_point(out.time).min,
                    normal_strain_mean: acc.normal.mean(),
                    normal_strain_max_element_id: acc.normal.max_entity,
                    shear_strain_approx_max: acc.shear.to_point(out.time).max,
                    shear_strain_approx_mean: acc.shear.mean(),
                    shear_strain_approx_max_element_id: acc.shear.max_entity,
                });
            }
            if let (Some(integrator), Some(samples)) = (motion_integrator.as_mut(), out.motion) {
                integrator.advance(out.time, &samples);
            }
            warnings.merge(out.warnings);
        };

        // The single pass.
        let mut iter = StateIterator::new(&self.file.cursor, control, mesh);
        let batch_size = match config.parallel_mode {
            ParallelMode::StateLevel => (rayon::current_num_threads() * 2).max(2),
            _ => 1,
        };
        let mut processed = 0usize;
        'outer: loop {
            if cancelled() {
                return Err(EngineError::Cancelled);
            }

            let mut batch: Vec<StateData> = Vec::with_capacity(batch_size);
            while batch.len() < batch_size {
                if cancelled() {
                    return Err(EngineError::Cancelled);
                }
                match iter.next() {
                    Some(Ok(state)) => {
                        report(
                            Phase::States,
                            processed + batch.len() + 1,
                            total_states,
                            "decoding state",
                        );
                        batch.push(state);
                    }
                    Some(Err(e)) => return Err(e.into()),
                    None => {
                        if batch.is_empty() {
                            break 'outer;
                        }
                        break;
                    }
                }
            }
            if batch.is_empty() {
                break;
            }

            let outputs: Vec<StepOutput> = if batch.len() > 1 {
                batch.par_iter().map(|s| ctx.process_state(s)).collect()
            }
            else {
                batch.iter().map(|s| ctx.process_state(s)).collect()
            };

            for out in outputs {
                merge_step(out);
                processed += 1;
            }
        }
        drop(merge_step);

        if cancelled() {
            return Err(EngineError::Cancelled);
        }

        report(Phase::Finalize, 0, 1, "finalizing series");
        let mut result = AnalysisResult::default();

        for (ci, component) in ctx.components.iter().enumerate() {
            let mut series = std::mem::take(&mut component_series[ci]);
            for s in &mut series {
                s.finalize_overall();
            }
            match component {
                StressComponent::VonMises => result.stress_history = series,
                StressComponent::EffPlasticStrain => result.strain_history = series,
                _ => result.component_history.extend(series),
            }
        }
        for mut s in surface_series {
            s.finalize_overall();
            result.surface_stress.push(s);
        }
        result.surface_strain = strain_series;
        if let Some(integrator) = motion_integrator {
            result.motion = integrator.finalize();
        }

        let mut analyzed: Vec<i32> = ctx.stress_parts.iter().map(|(p, _)| *p).collect();
        analyzed.extend(result.motion.iter().map(|m| m.part_id));
        analyzed.sort_unstable();
        analyzed.dedup();

        result.metadata = ReportMetadata {
            d3plot_path: self.file.path.display().to_string(),
            created: chrono::Utc::now().to_rfc3339(),
            tool_version: env!("CARGO_PKG_VERSION").to_string(),
            num_states: processed,
            start_time: times.first().copied().unwrap_or(0.0),
            end_time: times.last().copied().unwrap_or(0.0),
            analyzed_parts: analyzed,
            warnings,
        };

        log::info!(
            "analysis complete: {} state(s), {} part(s), {} surface(s)",
            processed,
            result.metadata.analyzed_parts.len(),
            result.surface_stress.len()
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accumulator_tracks_extremes_and_mean() {
        let mut acc = ScalarAcc::new();
        acc.add(5.0, 11);
        acc.add(-2.0, 12);
        acc.add(9.0, 13);
        let p = acc.to_point(0.5);
        assert_eq!(p.max, 9.0);
        assert_eq!(p.max_element_id, 13);
        assert_eq!(p.min, -2.0);
        assert_eq!(p.min_element_id, 12);
        assert_eq!(p.mean, 4.0);
        assert_eq!(p.time, 0.5);
    }

    #[test]
    fn empty_accumulator_yields_zero_point() {
        let p = ScalarAcc::new().to_point(1.0);
        assert_eq!(p.max, 0.0);
        assert_eq!(p.min, 0.0);
        assert_eq!(p.mean, 0.0);
        assert_eq!(p.max_element_id, 0);
    }

    #[test]
    fn ties_resolve_to_the_lower_entity_in_any_merge_order() {
        let mut a = ScalarAcc::new();
        a.add(7.0, 20);
        let mut b = ScalarAcc::new();
        b.add(7.0, 10);

        let mut ab = a;
        ab.merge(&b);
        let mut ba = b;
        ba.merge(&a);
        assert_eq!(ab.max_entity, 10);
        assert_eq!(ba.max_entity, 10);

        let mut seq = ScalarAcc::new();
        seq.add(7.0, 20);
        seq.add(7.0, 10);
        assert_eq!(seq.max_entity, 10);
    }

    #[test]
    fn component_names_round_trip() {
        for c in [
            StressComponent::StressZZ,
            StressComponent::VonMises,
            StressComponent::EffPlasticStrain,
            StressComponent::StrainYZ,
        ] {
            assert_eq!(StressComponent::from_name(c.name()), Some(c));
        }
        assert_eq!(StressComponent::from_name("bogus"), None);
    }

    #[test]
    fn component_extraction_respects_strain_offset() {
        let block: Vec<f64> = (0..13).map(|i| i as f64).collect();
        assert_eq!(StressComponent::StressXX.extract(&block, Some(7)), Some(0.0));
        assert_eq!(StressComponent::EffPlasticStrain.extract(&block, Some(7)), Some(6.0));
        assert_eq!(StressComponent::StrainXX.extract(&block, Some(7)), Some(7.0));
        assert_eq!(StressComponent::StrainZX.extract(&block, Some(7)), Some(12.0));
        assert_eq!(StressComponent::StrainXX.extract(&block, None), None);
        let vm = StressComponent::VonMises.extract(&block, None).unwrap();
        assert!(vm > 0.0);
    }
}
