use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::arg_enum;
use structopt::StructOpt;

use dynatools::analysis::{AnalysisConfig, ParallelMode, Phase, StressComponent, SurfaceSpec, Vec3};
use dynatools::analysis::report::{
    write_motion_csv, write_part_series_csv, write_part_summary_csv, write_surface_series_csv,
};
use dynatools::analysis::surface;
use dynatools::analysis::parts::PartIndex;
use dynatools::D3plotFile;

arg_enum! {
    #[derive(Debug, Clone, Copy, Eq, PartialEq)]
    enum Mode {
        Seq,
        State,
        Element
    }
}

impl From<Mode> for ParallelMode {
    fn from(mode: Mode) -> ParallelMode {
        match mode {
            Mode::Seq => ParallelMode::Sequential,
            Mode::State => ParallelMode::StateLevel,
            Mode::Element => ParallelMode::ElementLevel,
        }
    }
}

#[derive(Debug, StructOpt)]
#[structopt(name = "dynatools", about = "Reads and analyzes LS-DYNA d3plot result databases")]
struct Opt {
    #[structopt(subcommand)]
    command: Command,
}

#[derive(Debug, StructOpt)]
enum Command {
    /// Show format, control summary and state count of a family
    Info {
        /// Path to the base d3plot file
        d3plot: PathBuf,
    },

    /// List part IDs with their element counts
    Parts {
        d3plot: PathBuf,
    },

    /// Print the time value of every state
    Times {
        d3plot: PathBuf,
    },

    /// Count and list direction-filtered exterior faces
    Surfaces {
        d3plot: PathBuf,

        /// Reference direction as DX,DY,DZ
        #[structopt(short, long)]
        direction: String,

        /// Angle threshold in degrees
        #[structopt(short, long, default_value = "45")]
        angle: f64,

        /// Restrict to these part IDs
        #[structopt(short, long)]
        parts: Vec<i32>,
    },

    /// Run the single-pass analysis engine and write reports
    Analyze {
        d3plot: PathBuf,

        /// Analyze Von Mises stress per part (default when nothing else is chosen)
        #[structopt(long)]
        von_mises: bool,

        /// Analyze effective plastic strain per part
        #[structopt(long)]
        plastic_strain: bool,

        /// Analyze part motion (displacement / velocity / acceleration)
        #[structopt(long)]
        motion: bool,

        /// Analyze the surface strain placeholder quantity on each surface
        #[structopt(long)]
        surface_strain: bool,

        /// Further per-part quantities (e.g. stress_xx, pressure, strain_zx);
        /// repeatable
        #[structopt(long)]
        component: Vec<String>,

        /// Restrict analysis to these part IDs
        #[structopt(short, long)]
        parts: Vec<i32>,

        /// Surface spec NAME:DX,DY,DZ:ANGLE; repeatable
        #[structopt(short, long)]
        surface: Vec<String>,

        /// Execution shape
        #[structopt(long, default_value = "state", possible_values = &Mode::variants(), case_insensitive = true)]
        mode: Mode,

        /// Worker threads (0 = hardware default)
        #[structopt(long, default_value = "0")]
        threads: usize,

        /// Re-evaluate face normals from deformed positions each state
        #[structopt(long)]
        deformed_normals: bool,

        /// Write the JSON report here
        #[structopt(long)]
        json: Option<PathBuf>,

        /// Write per-series CSV files into this directory
        #[structopt(long)]
        csv_dir: Option<PathBuf>,
    },
}

fn main() {
    env_logger::init();
    let opt = Opt::from_args();

    let outcome = match opt.command {
        Command::Info { d3plot } => do_info(&d3plot),
        Command::Parts { d3plot } => do_parts(&d3plot),
        Command::Times { d3plot } => do_times(&d3plot),
        Command::Surfaces {
            d3plot,
            direction,
            angle,
            parts,
        } => do_surfaces(&d3plot, &direction, angle, &parts),
        Command::Analyze {
            d3plot,
            von_mises,
            plastic_strain,
            motion,
            surface_strain,
            component,
            parts,
            surface,
            mode,
            threads,
            deformed_normals,
            json,
            csv_dir,
        } => do_analyze(AnalyzeArgs {
            d3plot,
            von_mises,
            plastic_strain,
            motion,
            surface_strain,
            component,
            parts,
            surface,
            mode,
            threads,
            deformed_normals,
            json,
            csv_dir,
        }),
    };

    if let Err(e) = outcome {
        eprintln!("error: {:#}", e);
        std::process::exit(1);
    }
}

fn parse_direction(text: &str) -> Result<Vec3> {
    let comps: Vec<&str> = text.split(',').collect();
    if comps.len() != 3 {
        bail!("direction must be DX,DY,DZ, got {:?}", text);
    }
    let parse = |s: &str| -> Result<f64> {
        s.trim()
            .parse::<f64>()
            .with_context(|| format!("bad direction component {:?}", s))
    };
    Ok(Vec3::new(parse(comps[0])?, parse(comps[1])?, parse(comps[2])?))
}

/// NAME:DX,DY,DZ:ANGLE, e.g. `top:0,0,1:45`
fn parse_surface_spec(text: &str, part_filter: Option<Vec<i32>>) -> Result<SurfaceSpec> {
    let fields: Vec<&str> = text.split(':').collect();
    if fields.len() != 3 {
        bail!("surface spec must be NAME:DX,DY,DZ:ANGLE, got {:?}", text);
    }
    Ok(SurfaceSpec {
        name: fields[0].to_string(),
        direction: parse_direction(fields[1])?,
        angle_degrees: fields[2]
            .trim()
            .parse()
            .with_context(|| format!("bad angle {:?}", fields[2]))?,
        part_filter,
    })
}

fn do_info(d3plot: &PathBuf) -> Result<()> {
    let file = D3plotFile::open(d3plot)?;
    let c = &file.control;
    println!("file:      {}", d3plot.display());
    println!("title:     {:?}", file.format.title);
    println!("format:    {:?} {:?}, version {:.2}", file.format.word_size, file.format.endianness, file.format.version);
    println!("nodes:     {}", c.num_nodes());
    println!("solids:    {} ({} words each per state)", c.num_solids(), c.nv3d);
    println!("shells:    {} ({} words each per state)", c.num_shells(), c.nv2d);
    println!("beams:     {}", c.num_beams());
    println!("t-shells:  {}", c.num_thick_shells());
    println!("globals:   {}", c.nglbv);
    println!("fields:    temp={} disp={} vel={} acc={}", c.it, c.iu, c.iv, c.ia);
    println!("strain:    {}", if c.solid_strain_offset().is_some() { "yes" } else { "no" });
    if c.mattyp != 0 {
        println!("materials: {}-entry type table", c.nmmat);
    }
    println!("numbering: {}", if c.narbs > 0 { "arbitrary" } else { "sequential" });
    println!("state:     {} words per record", c.state_words());
    let times = file.time_values()?;
    println!("states:    {}", times.len());
    if let (Some(first), Some(last)) = (times.first(), times.last()) {
        println!("time:      {:e} .. {:e}", first, last);
    }
    Ok(())
}

fn do_parts(d3plot: &PathBuf) -> Result<()> {
    let file = D3plotFile::open(d3plot)?;
    let index = PartIndex::build(&file.mesh);
    println!(
        "{:>8}  {:>8}  {:>8}  {:>8}  {:>8}",
        "part", "solids", "shells", "beams", "t-shells"
    );
    for part in &index.part_ids {
        println!(
            "{:>8}  {:>8}  {:>8}  {:>8}  {:>8}",
            part,
            index.solid_elements(*part).len(),
            index.shell_elements(*part).len(),
            index.beam_elements(*part).len(),
            index.thick_shell_elements(*part).len()
        );
    }
    Ok(())
}

fn do_times(d3plot: &PathBuf) -> Result<()> {
    let file = D3plotFile::open(d3plot)?;
    let times = file.time_values()?;
    println!("{:>6}  {:>14}", "state", "time");
    for (i, t) in times.iter().enumerate() {
        println!("{:>6}  {:>14e}", i, t);
    }
    Ok(())
}

fn do_surfaces(d3plot: &PathBuf, direction: &str, angle: f64, parts: &[i32]) -> Result<()> {
    let file = D3plotFile::open(d3plot)?;
    let direction = parse_direction(direction)?;
    let filter = if parts.is_empty() { None } else { Some(parts) };
    let all = surface::extract_solid_exterior(&file.mesh, filter);
    let total = all.len();
    let faces = surface::filter_by_direction(all, direction, angle);
    println!("{} exterior face(s), {} within {}° of ({}, {}, {})", total, faces.len(), angle, direction.x, direction.y, direction.z);
    for f in &faces {
        println!(
            "element {:>8}  part {:>4}  face {}  normal ({:+.3}, {:+.3}, {:+.3})  area {:.4}",
            f.element_user_id, f.part_id, f.local_face, f.normal.x, f.normal.y, f.normal.z, f.area
        );
    }
    Ok(())
}

struct AnalyzeArgs {
    d3plot: PathBuf,
    von_mises: bool,
    plastic_strain: bool,
    motion: bool,
    surface_strain: bool,
    component: Vec<String>,
    parts: Vec<i32>,
    surface: Vec<String>,
    mode: Mode,
    threads: usize,
    deformed_normals: bool,
    json: Option<PathBuf>,
    csv_dir: Option<PathBuf>,
}

fn do_analyze(args: AnalyzeArgs) -> Result<()> {
    let extra_components = args
        .component
        .iter()
        .map(|name| {
            StressComponent::from_name(name)
                .ok_or_else(|| anyhow::anyhow!("unknown quantity {:?}", name))
        })
        .collect::<Result<Vec<_>>>()?;

    let part_filter = if args.parts.is_empty() {
        None
    } else {
        Some(args.parts.clone())
    };
    let surface_specs = args
        .surface
        .iter()
        .map(|s| parse_surface_spec(s, part_filter.clone()))
        .collect::<Result<Vec<_>>>()?;

    // Von Mises is the default analysis when nothing was selected.
    let nothing_chosen = !args.von_mises
        && !args.plastic_strain
        && !args.motion
        && !args.surface_strain
        && extra_components.is_empty()
        && surface_specs.is_empty();

    let config = AnalysisConfig {
        d3plot_path: args.d3plot.clone(),
        analyze_von_mises: args.von_mises || nothing_chosen,
        analyze_effective_plastic_strain: args.plastic_strain,
        analyze_motion: args.motion,
        analyze_surface_strain: args.surface_strain,
        extra_components,
        part_filter,
        surface_specs,
        parallel_mode: args.mode.into(),
        num_threads: args.threads,
        deformed_normals: args.deformed_normals,
    };

    let progress = |phase: Phase, current: usize, total: usize, message: &str| {
        if phase != Phase::States || current % 50 == 0 || current == total {
            eprintln!("[{:>9}] {:>5}/{:<5} {}", phase.tag(), current, total, message);
        }
    };

    let result = dynatools::analyze(&config, Some(&progress), None)
        .map_err(|e| anyhow::anyhow!("{} ({})", e, e.kind_name()))?;

    println!(
        "{} state(s) over t = {:e} .. {:e}",
        result.metadata.num_states, result.metadata.start_time, result.metadata.end_time
    );
    for s in &result.stress_history {
        println!(
            "part {:>4} {}: overall max {:e} at t={:e} (element {})",
            s.part_id, s.quantity, s.overall_max, s.overall_max_time, s.overall_max_element_id
        );
    }
    for s in &result.strain_history {
        println!(
            "part {:>4} {}: overall max {:e} at t={:e} (element {})",
            s.part_id, s.quantity, s.overall_max, s.overall_max_time, s.overall_max_element_id
        );
    }
    for s in &result.surface_stress {
        println!(
            "surface {:?}: {} face(s), von mises max {:e} at t={:e}",
            s.name, s.num_faces, s.overall_von_mises_max, s.overall_von_mises_max_time
        );
    }
    for m in &result.motion {
        println!(
            "part {:>4} motion: peak |u| {:e} at t={:e}, peak |v| {:e}, peak |a| {:e}",
            m.part_id, m.peak_displacement, m.peak_displacement_time, m.peak_velocity, m.peak_acceleration
        );
    }
    let w = result.metadata.warnings;
    if w.nonfinite_values > 0 || w.degenerate_faces > 0 {
        eprintln!(
            "warnings: {} non-finite value(s) skipped, {} degenerate face(s)",
            w.nonfinite_values, w.degenerate_faces
        );
    }

    if let Some(path) = &args.json {
        result.write_json(path).with_context(|| format!("writing {}", path.display()))?;
        println!("wrote {}", path.display());
    }
    if let Some(dir) = &args.csv_dir {
        std::fs::create_dir_all(dir)?;
        if !result.stress_history.is_empty() {
            write_part_series_csv(&result.stress_history, &dir.join("von_mises.csv"))?;
            write_part_summary_csv(&result.stress_history, &dir.join("von_mises_summary.csv"))?;
        }
        if !result.strain_history.is_empty() {
            write_part_series_csv(&result.strain_history, &dir.join("eff_plastic_strain.csv"))?;
            write_part_summary_csv(&result.strain_history, &dir.join("eff_plastic_strain_summary.csv"))?;
        }
        for s in &result.surface_stress {
            write_surface_series_csv(s, &dir.join(format!("surface_{}.csv", s.name)))?;
        }
        for m in &result.motion {
            write_motion_csv(m, &dir.join(format!("motion_part{}.csv", m.part_id)))?;
        }
        println!("wrote CSV files into {}", dir.display());
    }

    Ok(())
}
