//! Analysis result structures and the JSON / CSV writers external tooling
//! consumes.

use std::fmt::Write as FmtWrite;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use super::motion::PartMotionStats;
use super::tensor::Vec3;
use crate::util::{escape_json_str, json_number};

/// One reduced step of a per-part scalar quantity.
#[derive(Copy, Clone, Debug, Default)]
pub struct TimePoint {
    pub time: f64,
    pub max: f64,
    pub min: f64,
    pub mean: f64,
    pub max_element_id: i64,
    pub min_element_id: i64,
}

#[derive(Clone, Debug, Default)]
pub struct PartTimeSeriesStats {
    pub part_id: i32,
    pub quantity: String,
    pub unit: String,
    pub series: Vec<TimePoint>,

    // Over-time extremes, filled at finalization from the series itself.
    pub overall_max: f64,
    pub overall_max_time: f64,
    pub overall_max_element_id: i64,
    pub overall_min: f64,
    pub overall_min_time: f64,
}

impl PartTimeSeriesStats {
    /// Derive the global extremes from the series. By construction they
    /// equal the series-wise maxima.
    pub fn finalize_overall(&mut self) {
        let mut first = true;
        for p in &self.series {
            if first || p.max > self.overall_max {
                self.overall_max = p.max;
                self.overall_max_time = p.time;
                self.overall_max_element_id = p.max_element_id;
            }
            if first || p.min < self.overall_min {
                self.overall_min = p.min;
                self.overall_min_time = p.time;
            }
            first = false;
        }
    }
}

/// One reduced step over a filtered face set: three scalar quantities with
/// their own extremes and the element carrying each maximum.
#[derive(Copy, Clone, Debug, Default)]
pub struct SurfaceTimePoint {
    pub time: f64,

    pub von_mises_max: f64,
    pub von_mises_min: f64,
    pub von_mises_mean: f64,
    pub von_mises_max_element_id: i64,

    pub normal_max: f64,
    pub normal_min: f64,
    pub normal_mean: f64,
    pub normal_max_element_id: i64,

    pub shear_max: f64,
    pub shear_min: f64,
    pub shear_mean: f64,
    pub shear_max_element_id: i64,
}

#[derive(Clone, Debug, Default)]
pub struct SurfaceTimeSeriesStats {
    pub name: String,
    pub reference_direction: Vec3,
    pub angle_threshold_degrees: f64,
    pub part_filter: Option<Vec<i32>>,
    pub num_faces: usize,
    pub series: Vec<SurfaceTimePoint>,

    pub overall_von_mises_max: f64,
    pub overall_von_mises_max_time: f64,
    pub overall_normal_max: f64,
    pub overall_normal_max_time: f64,
    pub overall_shear_max: f64,
    pub overall_shear_max_time: f64,
}

impl SurfaceTimeSeriesStats {
    pub fn finalize_overall(&mut self) {
        let mut first = true;
        for p in &self.series {
            if first || p.von_mises_max > self.overall_von_mises_max {
                self.overall_von_mises_max = p.von_mises_max;
                self.overall_von_mises_max_time = p.time;
            }
            if first || p.normal_max > self.overall_normal_max {
                self.overall_normal_max = p.normal_max;
                self.overall_normal_max_time = p.time;
            }
            if first || p.shear_max > self.overall_shear_max {
                self.overall_shear_max = p.shear_max;
                self.overall_shear_max_time = p.time;
            }
            first = false;
        }
    }
}

/// One reduced step of the surface strain placeholder quantity.
#[derive(Copy, Clone, Debug, Default)]
pub struct SurfaceStrainTimePoint {
    pub time: f64,
    pub normal_strain_max: f64,
    pub normal_strain_min: f64,
    pub normal_strain_mean: f64,
    pub normal_strain_max_element_id: i64,
    /// Effective plastic strain scaled by ~1/sqrt(3). A placeholder carried
    /// over from the reference implementation, not a physical shear strain.
    pub shear_strain_approx_max: f64,
    pub shear_strain_approx_mean: f64,
    pub shear_strain_approx_max_element_id: i64,
}

#[derive(Clone, Debug, Default)]
pub struct SurfaceStrainStats {
    pub name: String,
    pub reference_direction: Vec3,
    pub angle_threshold_degrees: f64,
    pub part_filter: Option<Vec<i32>>,
    pub num_faces: usize,
    pub series: Vec<SurfaceStrainTimePoint>,
}

/// Non-fatal anomalies counted during the reductions.
#[derive(Copy, Clone, Debug, Default)]
pub struct AnalysisWarnings {
    pub nonfinite_values: usize,
    pub degenerate_faces: usize,
}

impl AnalysisWarnings {
    pub fn merge(&mut self, other: AnalysisWarnings) {
        self.nonfinite_values += other.nonfinite_values;
        self.degenerate_faces += other.degenerate_faces;
    }
}

#[derive(Clone, Debug, Default)]
pub struct ReportMetadata {
    pub d3plot_path: String,
    pub created: String,
    pub tool_version: String,
    pub num_states: usize,
    pub start_time: f64,
    pub end_time: f64,
    pub analyzed_parts: Vec<i32>,
    pub warnings: AnalysisWarnings,
}

/// The final report of one engine run.
#[derive(Clone, Debug, Default)]
pub struct AnalysisResult {
    pub metadata: ReportMetadata,
    pub stress_history: Vec<PartTimeSeriesStats>,
    pub strain_history: Vec<PartTimeSeriesStats>,
    pub component_history: Vec<PartTimeSeriesStats>,
    pub surface_stress: Vec<SurfaceTimeSeriesStats>,
    pub surface_strain: Vec<SurfaceStrainStats>,
    pub motion: Vec<PartMotionStats>,
}

fn json_vec3(v: Vec3) -> String {
    format!(
        "[{}, {}, {}]",
        json_number(v.x),
        json_number(v.y),
        json_number(v.z)
    )
}

fn json_part_series(out: &mut String, stats: &PartTimeSeriesStats) {
    write!(
        out,
        "{{\"part_id\": {}, \"quantity\": {}, \"unit\": {}, ",
        stats.part_id,
        escape_json_str(&stats.quantity),
        escape_json_str(&stats.unit)
    )
    .unwrap();
    write!(
        out,
        "\"overall_max\": {}, \"overall_max_time\": {}, \"overall_max_element_id\": {}, ",
        json_number(stats.overall_max),
        json_number(stats.overall_max_time),
        stats.overall_max_element_id
    )
    .unwrap();
    write!(
        out,
        "\"overall_min\": {}, \"overall_min_time\": {}, \"series\": [",
        json_number(stats.overall_min),
        json_number(stats.overall_min_time)
    )
    .unwrap();
    for (i, p) in stats.series.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        write!(
            out,
            "{{\"time\": {}, \"max\": {}, \"min\": {}, \"mean\": {}, \"max_element_id\": {}, \"min_element_id\": {}}}",
            json_number(p.time),
            json_number(p.max),
            json_number(p.min),
            json_number(p.mean),
            p.max_element_id,
            p.min_element_id
        )
        .unwrap();
    }
    out.push_str("]}");
}

impl AnalysisResult {
    /// Serialize the whole report. The format is plain JSON, written by hand
    /// so the field order stays stable for diffing.
    pub fn to_json(&self) -> String {
        let mut out = String::new();
        out.push_str("{\n  \"metadata\": {");
        let m = &self.metadata;
        write!(
            out,
            "\"d3plot_path\": {}, \"created\": {}, \"tool_version\": {}, \"num_states\": {}, \"start_time\": {}, \"end_time\": {}, \"analyzed_parts\": [{}], \"warnings\": {{\"nonfinite_values\": {}, \"degenerate_faces\": {}}}}},\n",
            escape_json_str(&m.d3plot_path),
            escape_json_str(&m.created),
            escape_json_str(&m.tool_version),
            m.num_states,
            json_number(m.start_time),
            json_number(m.end_time),
            m.analyzed_parts
                .iter()
                .map(|p| p.to_string())
                .collect::<Vec<_>>()
                .join(", "),
            m.warnings.nonfinite_values,
            m.warnings.degenerate_faces
        )
        .unwrap();

        out.push_str("  \"stress_history\": [");
        for (i, s) in self.stress_history.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            json_part_series(&mut out, s);
        }
        out.push_str("],\n  \"strain_history\": [");
        for (i, s) in self.strain_history.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            json_part_series(&mut out, s);
        }
        out.push_str("],\n  \"component_history\": [");
        for (i, s) in self.component_history.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            json_part_series(&mut out, s);
        }

        out.push_str("],\n  \"surface_stress\": [");
        for (i, s) in self.surface_stress.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            write!(
                out,
                "{{\"name\": {}, \"reference_direction\": {}, \"angle_threshold_degrees\": {}, \"num_faces\": {}, ",
                escape_json_str(&s.name),
                json_vec3(s.reference_direction),
                json_number(s.angle_threshold_degrees),
                s.num_faces
            )
            .unwrap();
            write!(
                out,
                "\"overall_von_mises_max\": {}, \"overall_von_mises_max_time\": {}, \"overall_normal_max\": {}, \"overall_normal_max_time\": {}, \"overall_shear_max\": {}, \"overall_shear_max_time\": {}, \"series\": [",
                json_number(s.overall_von_mises_max),
                json_number(s.overall_von_mises_max_time),
                json_number(s.overall_normal_max),
                json_number(s.overall_normal_max_time),
                json_number(s.overall_shear_max),
                json_number(s.overall_shear_max_time)
            )
            .unwrap();
            for (j, p) in s.series.iter().enumerate() {
                if j > 0 {
                    out.push_str(", ");
                }
                write!(
                    out,
                    "{{\"time\": {}, \"von_mises\": {{\"max\": {}, \"min\": {}, \"mean\": {}, \"max_element_id\": {}}}, \"normal_stress\": {{\"max\": {}, \"min\": {}, \"mean\": {}, \"max_element_id\": {}}}, \"shear_stress\": {{\"max\": {}, \"min\": {}, \"mean\": {}, \"max_element_id\": {}}}}}",
                    json_number(p.time),
                    json_number(p.von_mises_max),
                    json_number(p.von_mises_min),
                    json_number(p.von_mises_mean),
                    p.von_mises_max_element_id,
                    json_number(p.normal_max),
                    json_number(p.normal_min),
                    json_number(p.normal_mean),
                    p.normal_max_element_id,
                    json_number(p.shear_max),
                    json_number(p.shear_min),
                    json_number(p.shear_mean),
                    p.shear_max_element_id
                )
                .unwrap();
            }
            out.push_str("]}");
        }

        out.push_str("],\n  \"surface_strain\": [");
        for (i, s) in self.surface_strain.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            write!(
                out,
                "{{\"name\": {}, \"reference_direction\": {}, \"angle_threshold_degrees\": {}, \"num_faces\": {}, \"series\": [",
                escape_json_str(&s.name),
                json_vec3(s.reference_direction),
                json_number(s.angle_threshold_degrees),
                s.num_faces
            )
            .unwrap();
            for (j, p) in s.series.iter().enumerate() {
                if j > 0 {
                    out.push_str(", ");
                }
                write!(
                    out,
                    "{{\"time\": {}, \"normal_strain\": {{\"max\": {}, \"min\": {}, \"mean\": {}, \"max_element_id\": {}}}, \"shear_strain_approx\": {{\"max\": {}, \"mean\": {}, \"max_element_id\": {}}}}}",
                    json_number(p.time),
                    json_number(p.normal_strain_max),
                    json_number(p.normal_strain_min),
                    json_number(p.normal_strain_mean),
                    p.normal_strain_max_element_id,
                    json_number(p.shear_strain_approx_max),
                    json_number(p.shear_strain_approx_mean),
                    p.shear_strain_approx_max_element_id
                )
                .unwrap();
            }
            out.push_str("]}");
        }

        out.push_str("],\n  \"motion\": [");
        for (i, s) in self.motion.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            write!(
                out,
                "{{\"part_id\": {}, \"num_nodes\": {}, \"peak_displacement\": {}, \"peak_displacement_time\": {}, \"peak_velocity\": {}, \"peak_velocity_time\": {}, \"peak_acceleration\": {}, \"peak_acceleration_time\": {}, \"series\": [",
                s.part_id,
                s.num_nodes,
                json_number(s.peak_displacement),
                json_number(s.peak_displacement_time),
                json_number(s.peak_velocity),
                json_number(s.peak_velocity_time),
                json_number(s.peak_acceleration),
                json_number(s.peak_acceleration_time)
            )
            .unwrap();
            for (j, p) in s.series.iter().enumerate() {
                if j > 0 {
                    out.push_str(", ");
                }
                write!(
                    out,
                    "{{\"time\": {}, \"avg_displacement\": {}, \"avg_displacement_magnitude\": {}, \"avg_velocity\": {}, \"avg_velocity_magnitude\": {}, \"avg_acceleration\": {}, \"avg_acceleration_magnitude\": {}, \"max_node_displacement\": {}, \"max_node_id\": {}}}",
                    json_number(p.time),
                    json_vec3(p.avg_displacement),
                    json_number(p.avg_displacement_magnitude),
                    json_vec3(p.avg_velocity),
                    json_number(p.avg_velocity_magnitude),
                    json_vec3(p.avg_acceleration),
                    json_number(p.avg_acceleration_magnitude),
                    json_number(p.max_displacement_magnitude),
                    p.max_displacement_node_id
                )
                .unwrap();
            }
            out.push_str("]}");
        }
        out.push_str("]\n}\n");
        out
    }

    pub fn write_json(&self, path: &Path) -> std::io::Result<()> {
        let mut f = BufWriter::new(File::create(path)?);
        f.write_all(self.to_json().as_bytes())
    }
}

/// One CSV file per quantity, parts side by side:
/// `Time,Part<id>_Max,Part<id>_Min,Part<id>_Avg,...`
pub fn write_part_series_csv(histories: &[PartTimeSeriesStats], path: &Path) -> std::io::Result<()> {
    let mut f = BufWriter::new(File::create(path)?);
    write!(f, "Time")?;
    for h in histories {
        write!(
            f,
            ",Part{}_Max,Part{}_Min,Part{}_Avg,Part{}_MaxElementID",
            h.part_id, h.part_id, h.part_id, h.part_id
        )?;
    }
    writeln!(f)?;

    let steps = histories.iter().map(|h| h.series.len()).max().unwrap_or(0);
    for i in 0..steps {
        let time = histories
            .iter()
            .find_map(|h| h.series.get(i))
            .map_or(0.0, |p| p.time);
        write!(f, "{:e}", time)?;
        for h in histories {
            match h.series.get(i) {
                Some(p) => write!(
                    f,
                    ",{:e},{:e},{:e},{}",
                    p.max, p.min, p.mean, p.max_element_id
                )?,
                None => write!(f, ",,,,")?,
            }
        }
        writeln!(f)?;
    }
    Ok(())
}

/// Per-part summary: overall extremes and when they occurred.
pub fn write_part_summary_csv(histories: &[PartTimeSeriesStats], path: &Path) -> std::io::Result<()> {
    let mut f = BufWriter::new(File::create(path)?);
    writeln!(
        f,
        "PartID,Quantity,OverallMax,TimeOfMax,MaxElementID,OverallMin,TimeOfMin"
    )?;
    for h in histories {
        writeln!(
            f,
            "{},{},{:e},{:e},{},{:e},{:e}",
            h.part_id,
            h.quantity,
            h.overall_max,
            h.overall_max_time,
            h.overall_max_element_id,
            h.overall_min,
            h.overall_min_time
        )?;
    }
    Ok(())
}

pub fn write_surface_series_csv(stats: &SurfaceTimeSeriesStats, path: &Path) -> std::io::Result<()> {
    let mut f = BufWriter::new(File::create(path)?);
    writeln!(
        f,
        "Time,VonMisesMax,VonMisesMin,VonMisesAvg,VonMisesMaxElementID,NormalMax,NormalMin,NormalAvg,NormalMaxElementID,ShearMax,ShearMin,ShearAvg,ShearMaxElementID"
    )?;
    for p in &stats.series {
        writeln!(
            f,
            "{:e},{:e},{:e},{:e},{},{:e},{:e},{:e},{},{:e},{:e},{:e},{}",
            p.time,
            p.von_mises_max,
            p.von_mises_min,
            p.von_mises_mean,
            p.von_mises_max_element_id,
            p.normal_max,
            p.normal_min,
            p.normal_mean,
            p.normal_max_element_id,
            p.shear_max,
            p.shear_min,
            p.shear_mean,
            p.shear_max_element_id
        )?;
    }
    Ok(())
}

pub fn write_motion_csv(stats: &PartMotionStats, path: &Path) -> std::io::Result<()> {
    let mut f = BufWriter::new(File::create(path)?);
    writeln!(
        f,
        "Time,AvgDispX,AvgDispY,AvgDispZ,AvgDispMag,AvgVelMag,AvgAccMag,MaxNodeDisp,MaxNodeID"
    )?;
    for p in &stats.series {
        writeln!(
            f,
            "{:e},{:e},{:e},{:e},{:e},{:e},{:e},{:e},{}",
            p.time,
            p.avg_displacement.x,
            p.avg_displacement.y,
            p.avg_displacement.z,
            p.avg_displacement_magnitude,
            p.avg_velocity_magnitude,
            p.avg_acceleration_magnitude,
            p.max_displacement_magnitude,
            p.max_displacement_node_id
        )?;
    }
    Ok(())
}
