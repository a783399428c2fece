//! dynatools: reader and single-pass time-history analyzer for LS-DYNA
//! d3plot result databases.
//!
//! A d3plot family is the base result file plus its numbered continuation
//! segments. `D3plotFile::open` resolves the family, detects word size and
//! endianness, decodes the control block and materializes the geometry;
//! `SinglePassEngine` then walks the states once, feeding every configured
//! reduction on the way.
//!
//! ```no_run
//! use dynatools::{analysis::AnalysisConfig, D3plotFile};
//!
//! let file = D3plotFile::open(std::path::Path::new("results/d3plot"))?;
//! println!("{} states", file.num_states());
//! let config = AnalysisConfig {
//!     d3plot_path: "results/d3plot".into(),
//!     ..Default::default()
//! };
//! let report = dynatools::analyze(&config, None, None)?;
//! println!("{}", report.to_json());
//! # Ok::<(), dynatools::analysis::EngineError>(())
//! ```

pub mod util;
pub mod format;
pub mod analysis;

use std::path::{Path, PathBuf};

use analysis::engine::{AnalysisConfig, CancelToken, EngineError, ProgressFn, SinglePassEngine};
use analysis::report::AnalysisResult;
use format::control::ControlBlock;
use format::cursor::BinaryCursor;
use format::family::FileFamily;
use format::geometry::{read_mesh, Mesh};
use format::probe;
use format::state::{StateData, StateIterator};
use format::{FileFormat, FormatError};

/// An opened d3plot family: immutable format, control block and mesh, plus
/// the word stream the state iterator walks.
#[derive(Debug)]
pub struct D3plotFile {
    pub path: PathBuf,
    pub format: FileFormat,
    pub control: ControlBlock,
    pub mesh: Mesh,
    pub(crate) cursor: BinaryCursor,
}

impl D3plotFile {
    /// Open a family by its base path and materialize the geometry.
    pub fn open(path: &Path) -> Result<D3plotFile, FormatError> {
        let family = FileFamily::discover(path)?;
        let segments = family.read_segments()?;

        let (word_size, endianness) = probe::probe(&segments[0])?;
        let cursor = BinaryCursor::new(segments, word_size, endianness);

        let control = ControlBlock::decode(&cursor)?;
        control.reject_unsupported()?;
        let format = probe::file_format(&cursor)?;

        let mesh = read_mesh(&cursor, &control)?;

        // The state region should be a whole number of records plus at most
        // a sentinel word; anything else hints at a layout mismatch.
        let state_region = cursor.words_len().saturating_sub(control.state_start());
        let leftover = state_region % control.state_words();
        if leftover > 1 {
            log::warn!(
                "state region of {} words is not a whole number of {}-word records",
                state_region,
                control.state_words()
            );
        }

        log::info!(
            "opened {:?}: {:?} {:?}, version {:.1}, title {:?}",
            path,
            format.word_size,
            format.endianness,
            format.version,
            format.title
        );

        Ok(D3plotFile {
            path: path.to_path_buf(),
            format,
            control,
            mesh,
            cursor,
        })
    }

    /// Iterate the states in on-disk (ascending time) order.
    pub fn states(&self) -> StateIterator<'_> {
        StateIterator::new(&self.cursor, &self.control, &self.mesh)
    }

    /// Number of whole state records present across the family.
    pub fn num_states(&self) -> u64 {
        StateIterator::count_states(&self.cursor, &self.control)
    }

    /// Decode every state up front.
    pub fn read_all_states(&self) -> Result<Vec<StateData>, FormatError> {
        self.states().collect()
    }

    /// Random access to one state by index. `None` past the last state or
    /// at the end-of-family sentinel.
    pub fn read_state(&self, index: u64) -> Result<Option<StateData>, FormatError> {
        let stride = self.control.state_words();
        let word = self.control.state_start() + index * stride;
        if !self.cursor.has(word, stride) {
            return Ok(None);
        }
        let time = self.cursor.float_at(word)?;
        if time.is_nan() {
            return Err(FormatError::CorruptedData {
                what: format!("NaN time word at word {}", word),
            });
        }
        if time < 0.0 {
            return Ok(None);
        }
        format::state::decode_state(&self.cursor, &self.control, &self.mesh, word).map(Some)
    }

    /// The time words alone, without decoding full records.
    pub fn time_values(&self) -> Result<Vec<f64>, FormatError> {
        let stride = self.control.state_words();
        let mut word = self.control.state_start();
        let mut times = Vec::new();
        while self.cursor.has(word, stride) {
            let t = self.cursor.float_at(word)?;
            if t < 0.0 || t.is_nan() {
                break;
            }
            times.push(t);
            word += stride;
        }
        Ok(times)
    }
}

/// Open the family named by the configuration and run every configured
/// analysis in one pass over the states.
pub fn analyze(
    config: &AnalysisConfig,
    progress: Option<&ProgressFn>,
    cancel: Option<&CancelToken>,
) -> Result<AnalysisResult, EngineError> {
    let file = D3plotFile::open(&config.d3plot_path)?;
    SinglePassEngine::new(&file).run(config, progress, cancel)
}
