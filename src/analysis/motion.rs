//! Rigid-body-like motion metrics per part.
//!
//! Displacement is averaged over the part's node set; velocity and
//! acceleration come from two-point finite differences of those averages
//! between consecutive states.

use crate::format::geometry::Mesh;
use crate::format::state::StateData;

use super::parts::PartIndex;
use super::tensor::Vec3;

#[derive(Copy, Clone, Debug, Default)]
pub struct MotionTimePoint {
    pub time: f64,
    pub avg_displacement: Vec3,
    pub avg_displacement_magnitude: f64,
    pub avg_velocity: Vec3,
    pub avg_velocity_magnitude: f64,
    pub avg_acceleration: Vec3,
    pub avg_acceleration_magnitude: f64,
    pub max_displacement_magnitude: f64,
    pub max_displacement_node_id: i64,
}

/// Motion time series of one part, with its over-time peaks.
#[derive(Clone, Debug, Default)]
pub struct PartMotionStats {
    pub part_id: i32,
    pub num_nodes: usize,
    pub series: Vec<MotionTimePoint>,

    pub peak_displacement: f64,
    pub peak_displacement_time: f64,
    pub peak_velocity: f64,
    pub peak_velocity_time: f64,
    pub peak_acceleration: f64,
    pub peak_acceleration_time: f64,
    pub peak_node_displacement: f64,
    pub peak_node_displacement_time: f64,
}

/// Raw per-state measurement for one part, before differencing.
#[derive(Copy, Clone, Debug, Default)]
pub struct MotionSample {
    pub avg_displacement: Vec3,
    pub max_displacement_magnitude: f64,
    pub max_displacement_node_id: i64,
}

pub struct MotionIntegrator {
    node_sets: Vec<(i32, Vec<u32>)>,
    node_user_ids: Vec<i64>,
    results: Vec<PartMotionStats>,
    prev_disp: Vec<Vec3>,
    prev_vel: Vec<Vec3>,
    prev_time: f64,
    steps: usize,
}

impl MotionIntegrator {
    pub fn new(mesh: &Mesh, index: &PartIndex, parts: &[i32]) -> MotionIntegrator {
        let node_sets: Vec<(i32, Vec<u32>)> = parts
            .iter()
            .map(|&p| (p, index.part_nodes(mesh, p)))
            .collect();
        let results = node_sets
            .iter()
            .map(|(p, nodes)| PartMotionStats {
                part_id: *p,
                num_nodes: nodes.len(),
                ..Default::default()
            })
            .collect();
        let n = node_sets.len();
        MotionIntegrator {
            node_sets,
            node_user_ids: mesh.node_user_ids.clone(),
            results,
            prev_disp: vec![Vec3::zero(); n],
            prev_vel: vec![Vec3::zero(); n],
            prev_time: 0.0,
            steps: 0,
        }
    }

    /// Per-state raw measurement. Pure with respect to integrator state, so
    /// the engine may evaluate it for several decoded states concurrently.
    pub fn sample(&self, state: &StateData, ndim: usize) -> Vec<MotionSample> {
        self.node_sets
            .iter()
            .map(|(_, nodes)| {
                let mut sum = Vec3::zero();
                let mut count = 0usize;
                let mut max_mag = 0.0f64;
                let mut max_node = 0i64;
                for &n in nodes {
                    let base = n as usize * ndim;
                    let Some(u) = state.node_displacements.get(base..base + ndim) else {
                        continue;
                    };
                    let d = Vec3::new(
                        u[0],
                        if ndim > 1 { u[1] } else { 0.0 },
                        if ndim > 2 { u[2] } else { 0.0 },
                    );
                    sum += d;
                    count += 1;
                    let mag = d.magnitude();
                    if mag > max_mag {
                        max_mag = mag;
                        max_node = self
                            .node_user_ids
                            .get(n as usize)
                            .copied()
                            .unwrap_or(n as i64 + 1);
                    }
                }
                MotionSample {
                    avg_displacement: if count > 0 { sum / count as f64 } else { Vec3::zero() },
                    max_displacement_magnitude: max_mag,
                    max_displacement_node_id: max_node,
                }
            })
            .collect()
    }

    /// Fold one state's samples into the series. Must be called in ascending
    /// time order; this is where the finite differences happen.
    pub fn advance(&mut self, time: f64, samples: &[MotionSample]) {
        let dt = time - self.prev_time;
        for (i, sample) in samples.iter().enumerate() {
            let mut point = MotionTimePoint {
                time,
                avg_displacement: sample.avg_displacement,
                avg_displacement_magnitude: sample.avg_displacement.magnitude(),
                max_displacement_magnitude: sample.max_displacement_magnitude,
                max_displacement_node_id: sample.max_displacement_node_id,
                ..Default::default()
            };

            if self.steps >= 1 && dt > 0.0 {
                point.avg_velocity = (sample.avg_displacement - self.prev_disp[i]) / dt;
                point.avg_velocity_magnitude = point.avg_velocity.magnitude();
            }
            if self.steps >= 2 && dt > 0.0 {
                point.avg_acceleration = (point.avg_velocity - self.prev_vel[i]) / dt;
                point.avg_acceleration_magnitude = point.avg_acceleration.magnitude();
            }

            self.prev_disp[i] = sample.avg_displacement;
            self.prev_vel[i] = point.avg_velocity;
            self.results[i].series.push(point);
        }
        self.prev_time = time;
        self.steps += 1;
    }

    /// Convenience for the sequential path. A state without displacement
    /// data contributes nothing.
    pub fn process_state(&mut self, state: &StateData, ndim: usize) {
        if state.node_displacements.is_empty() {
            return;
        }
        let samples = self.sample(state, ndim);
        self.advance(state.time, &samples);
    }

    /// Compute the over-time peaks and hand the series out.
    pub fn finalize(mut self) -> Vec<PartMotionStats> {
        for stats in &mut self.results {
            for point in &stats.series {
                if point.avg_displacement_magnitude > stats.peak_displacement {
                    stats.peak_displacement = point.avg_displacement_magnitude;
                    stats.peak_displacement_time = point.time;
                }
                if point.avg_velocity_magnitude > stats.peak_velocity {
                    stats.peak_velocity = point.avg_velocity_magnitude;
                    stats.peak_velocity_time = point.time;
                }
                if point.avg_acceleration_magnitude > stats.peak_acceleration {
                    stats.peak_acceleration = point.avg_acceleration_magnitude;
                    stats.peak_acceleration_time = point.time;
                }
                if point.max_displacement_magnitude > stats.peak_node_displacement {
                    stats.peak_node_displacement = point.max_displacement_magnitude;
                    stats.peak_node_displacement_time = point.time;
                }
            }
        }
        self.results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::geometry::{Node, Solid};

    fn mesh() -> Mesh {
        let mut m = Mesh::default();
        for i in 0..8 {
            m.nodes.push(Node {
                id: i + 1,
                x: 0.0,
                y: 0.0,
                z: 0.0,
            });
        }
        m.node_user_ids = (1..=8).collect();
        m.solids = vec![Solid {
            nodes: [0, 1, 2, 3, 4, 5, 6, 7],
            part: 3,
            material_type: 3,
        }];
        m.solid_user_ids = vec![1];
        m
    }

    fn state(time: f64, ux: f64) -> StateData {
        let mut s = StateData {
            time,
            ..Default::default()
        };
        s.node_displacements = (0..8).flat_map(|_| [ux, 0.0, 0.0]).collect();
        s
    }

    fn integrator(m: &Mesh) -> MotionIntegrator {
        let index = PartIndex::build(m);
        MotionIntegrator::new(m, &index, &[3])
    }

    #[test]
    fn rigid_translation_gives_constant_velocity() {
        let m = mesh();
        let mut mi = integrator(&m);
        mi.process_state(&state(0.0, 0.0), 3);
        mi.process_state(&state(0.001, 0.01), 3);
        let stats = mi.finalize();
        let series = &stats[0].series;
        assert_eq!(series.len(), 2);
        assert_eq!(series[0].avg_velocity, Vec3::zero());
        assert!((series[1].avg_velocity.x - 10.0).abs() < 1e-9);
        assert_eq!(series[1].avg_velocity.y, 0.0);
        // Acceleration needs a third state.
        assert_eq!(series[1].avg_acceleration, Vec3::zero());
    }

    #[test]
    fn acceleration_is_difference_of_velocities() {
        let m = mesh();
        let mut mi = integrator(&m);
        mi.process_state(&state(0.0, 0.0), 3);
        mi.process_state(&state(0.001, 0.01), 3); // v = 10
        mi.process_state(&state(0.002, 0.03), 3); // v = 20
        let stats = mi.finalize();
        let series = &stats[0].series;
        assert!((series[2].avg_velocity.x - 20.0).abs() < 1e-9);
        assert!((series[2].avg_acceleration.x - 10000.0).abs() < 1e-6);
    }

    #[test]
    fn zero_dt_yields_zero_rates() {
        let m = mesh();
        let mut mi = integrator(&m);
        mi.process_state(&state(0.001, 0.0), 3);
        mi.process_state(&state(0.001, 0.5), 3);
        let stats = mi.finalize();
        assert_eq!(stats[0].series[1].avg_velocity, Vec3::zero());
    }

    #[test]
    fn max_node_is_tracked_by_user_id() {
        let m = mesh();
        let mut mi = integrator(&m);
        let mut s = state(0.0, 0.1);
        s.node_displacements[5 * 3] = 0.9; // node index 5, user id 6
        mi.process_state(&s, 3);
        let stats = mi.finalize();
        let p = &stats[0].series[0];
        assert_eq!(p.max_displacement_node_id, 6);
        assert!((p.max_displacement_magnitude - 0.9).abs() < 1e-12);
    }

    #[test]
    fn beam_only_part_gets_a_real_series() {
        use crate::format::geometry::Beam;
        let mut m = Mesh::default();
        for i in 0..2 {
            m.nodes.push(Node {
                id: i + 1,
                x: 0.0,
                y: 0.0,
                z: 0.0,
            });
        }
        m.node_user_ids = vec![1, 2];
        m.beams = vec![Beam {
            nodes: [0, 1],
            part: 9,
            material_type: 9,
        }];
        m.beam_user_ids = vec![1];

        let index = PartIndex::build(&m);
        assert_eq!(index.part_ids, vec![9]);
        let mut mi = MotionIntegrator::new(&m, &index, &[9]);
        assert_eq!(mi.results[0].num_nodes, 2);

        let mut s0 = StateData {
            time: 0.0,
            ..Default::default()
        };
        s0.node_displacements = vec![0.0; 6];
        mi.process_state(&s0, 3);
        let mut s1 = StateData {
            time: 0.001,
            ..Default::default()
        };
        s1.node_displacements = vec![0.01, 0.0, 0.0, 0.01, 0.0, 0.0];
        mi.process_state(&s1, 3);

        let stats = mi.finalize();
        assert!((stats[0].series[1].avg_displacement.x - 0.01).abs() < 1e-12);
        assert!((stats[0].series[1].avg_velocity.x - 10.0).abs() < 1e-9);
    }

    #[test]
    fn peaks_summarize_the_series() {
        let m = mesh();
        let mut mi = integrator(&m);
        mi.process_state(&state(0.0, 0.0), 3);
        mi.process_state(&state(0.001, 0.02), 3);
        mi.process_state(&state(0.002, 0.03), 3);
        let stats = mi.finalize();
        assert!((stats[0].peak_displacement - 0.03).abs() < 1e-12);
        assert_eq!(stats[0].peak_displacement_time, 0.002);
        assert!((stats[0].peak_velocity - 20.0).abs() < 1e-9);
        assert_eq!(stats[0].peak_velocity_time, 0.001);
    }
}
