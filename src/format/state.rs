//! State records: decoding and iteration.
//!
//! Every state record has the same fixed word count, derived entirely from
//! the control block, so iteration is plain stride arithmetic. A negative
//! time word is the writer's end-of-family sentinel; running off the end of
//! the last segment ends iteration as well.

use super::control::{ControlBlock, DeletionTable};
use super::cursor::BinaryCursor;
use super::geometry::Mesh;
use super::FormatError;

/// Everything one time step carries. Vector fields are node-major with
/// `effective_ndim` components per node; element fields are element-major
/// blocks of NV3D/NV3DT/NV1D/NV2D words.
#[derive(Clone, Debug, Default)]
pub struct StateData {
    pub time: f64,
    pub globals: Vec<f64>,

    pub node_temperatures: Vec<f64>,
    pub node_displacements: Vec<f64>,
    pub node_velocities: Vec<f64>,
    pub node_accelerations: Vec<f64>,

    pub solid_data: Vec<f64>,
    pub thick_shell_data: Vec<f64>,
    pub beam_data: Vec<f64>,
    pub shell_data: Vec<f64>,

    /// User IDs of entities deleted as of this state.
    pub deleted_nodes: Vec<i64>,
    pub deleted_solids: Vec<i64>,
    pub deleted_thick_shells: Vec<i64>,
    pub deleted_beams: Vec<i64>,
    pub deleted_shells: Vec<i64>,
}

impl StateData {
    /// The per-state word block of one solid element.
    pub fn solid_block(&self, index: usize, nv3d: usize) -> Option<&[f64]> {
        let start = index.checked_mul(nv3d)?;
        self.solid_data.get(start..start + nv3d)
    }
}

/// Decode the state record starting at `word`. The caller has already
/// checked the time word is a real, non-negative time.
pub fn decode_state(
    cursor: &BinaryCursor,
    control: &ControlBlock,
    mesh: &Mesh,
    word: u64,
) -> Result<StateData, FormatError> {
    if !cursor.has(word, control.state_words()) {
        return Err(FormatError::Truncated { what: "state record" });
    }

    let mut state = StateData::default();
    let mut pos = word;

    state.time = cursor.float_at(pos)?;
    pos += 1;

    state.globals = cursor.floats(pos, control.nglbv.max(0) as usize)?;
    pos += control.nglbv.max(0) as u64;

    let numnp = control.num_nodes();
    let vec_len = numnp * control.effective_ndim();
    if control.it == 1 {
        state.node_temperatures = cursor.floats(pos, numnp)?;
        pos += numnp as u64;
    }
    if control.iu == 1 {
        state.node_displacements = cursor.floats(pos, vec_len)?;
        pos += vec_len as u64;
    }
    if control.iv == 1 {
        state.node_velocities = cursor.floats(pos, vec_len)?;
        pos += vec_len as u64;
    }
    if control.ia == 1 {
        state.node_accelerations = cursor.floats(pos, vec_len)?;
        pos += vec_len as u64;
    }

    let solid_words = control.num_solids() * control.nv3d.max(0) as usize;
    state.solid_data = cursor.floats(pos, solid_words)?;
    pos += solid_words as u64;

    let tshell_words = control.num_thick_shells() * control.nv3dt.max(0) as usize;
    state.thick_shell_data = cursor.floats(pos, tshell_words)?;
    pos += tshell_words as u64;

    let beam_words = control.num_beams() * control.nv1d.max(0) as usize;
    state.beam_data = cursor.floats(pos, beam_words)?;
    pos += beam_words as u64;

    let shell_words = control.num_shells() * control.nv2d.max(0) as usize;
    state.shell_data = cursor.floats(pos, shell_words)?;
    pos += shell_words as u64;

    match control.deletion_table() {
        DeletionTable::None => {}
        DeletionTable::Nodes => {
            let flags = cursor.floats(pos, numnp)?;
            pos += numnp as u64;
            for (i, flag) in flags.iter().enumerate() {
                if *flag == 0.0 {
                    state.deleted_nodes.push(mesh.node_user_id(i));
                }
            }
        }
        DeletionTable::Elements => {
            let collect = |count: usize,
                               pos: &mut u64,
                               ids: &[i64],
                               out: &mut Vec<i64>|
             -> Result<(), FormatError> {
                let flags = cursor.floats(*pos, count)?;
                *pos += count as u64;
                for (i, flag) in flags.iter().enumerate() {
                    if *flag == 0.0 {
                        out.push(ids.get(i).copied().unwrap_or(i as i64 + 1));
                    }
                }
                Ok(())
            };
            collect(
                control.num_solids(),
                &mut pos,
                &mesh.solid_user_ids,
                &mut state.deleted_solids,
            )?;
            collect(
                control.num_thick_shells(),
                &mut pos,
                &mesh.thick_shell_user_ids,
                &mut state.deleted_thick_shells,
            )?;
            collect(
                control.num_beams(),
                &mut pos,
                &mesh.beam_user_ids,
                &mut state.deleted_beams,
            )?;
            collect(
                control.num_shells(),
                &mut pos,
                &mesh.shell_user_ids,
                &mut state.deleted_shells,
            )?;
        }
    }

    debug_assert_eq!(pos - word, control.state_words());
    Ok(state)
}

/// Iterator over the states of a family, in on-disk order.
pub struct StateIterator<'a> {
    cursor: &'a BinaryCursor,
    control: &'a ControlBlock,
    mesh: &'a Mesh,
    word: u64,
    finished: bool,
}

impl<'a> StateIterator<'a> {
    pub fn new(cursor: &'a BinaryCursor, control: &'a ControlBlock, mesh: &'a Mesh) -> StateIterator<'a> {
        StateIterator {
            cursor,
            control,
            mesh,
            word: control.state_start(),
            finished: false,
        }
    }

    /// Number of whole state records physically present, sentinel excluded.
    /// Counting only needs the time words, not full decodes.
    pub fn count_states(cursor: &BinaryCursor, control: &ControlBlock) -> u64 {
        let stride = control.state_words();
        let mut word = control.state_start();
        let mut n = 0;
        while cursor.has(word, stride) {
            match cursor.float_at(word) {
                Ok(t) if t >= 0.0 => n += 1,
                _ => break,
            }
            word += stride;
        }
        n
    }
}

impl<'a> Iterator for StateIterator<'a> {
    type Item = Result<StateData, FormatError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        let remaining = self.cursor.words_len().saturating_sub(self.word);
        if remaining == 0 {
            self.finished = true;
            return None;
        }

        let time = match self.cursor.float_at(self.word) {
            Ok(t) => t,
            Err(e) => {
                self.finished = true;
                return Some(Err(e));
            }
        };
        if time.is_nan() {
            self.finished = true;
            return Some(Err(FormatError::CorruptedData {
                what: format!("NaN time word at word {}", self.word),
            }));
        }
        if time < 0.0 {
            // End-of-family sentinel.
            self.finished = true;
            return None;
        }
        if remaining < self.control.state_words() {
            self.finished = true;
            return Some(Err(FormatError::Truncated { what: "state record" }));
        }

        let state = decode_state(self.cursor, self.control, self.mesh, self.word);
        if state.is_err() {
            self.finished = true;
        }
        self.word += self.control.state_words();
        Some(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::geometry::read_mesh;
    use crate::format::{Endianness, WordSize};

    struct Builder {
        bytes: Vec<u8>,
    }
    impl Builder {
        fn new() -> Builder {
            Builder { bytes: Vec::new() }
        }
        fn int(&mut self, v: i64) -> &mut Self {
            self.bytes.extend((v as i32).to_le_bytes());
            self
        }
        fn float(&mut self, v: f64) -> &mut Self {
            self.bytes.extend((v as f32).to_le_bytes());
            self
        }
        fn float_bits(&mut self, v: f32) -> &mut Self {
            self.bytes.extend(v.to_le_bytes());
            self
        }
    }

    /// One unit hex, IU=1, NGLBV=2, NV3D=7, one part.
    fn single_hex_control() -> [i64; 64] {
        let mut w = [0i64; 64];
        w[14] = 3;
        w[15] = 8;
        w[17] = 2;
        w[19] = 1;
        w[22] = 1;
        w[27] = 7;
        w
    }

    fn geometry(b: &mut Builder) {
        let corners = [
            (0.0, 0.0, 0.0),
            (1.0, 0.0, 0.0),
            (1.0, 1.0, 0.0),
            (0.0, 1.0, 0.0),
            (0.0, 0.0, 1.0),
            (1.0, 0.0, 1.0),
            (1.0, 1.0, 1.0),
            (0.0, 1.0, 1.0),
        ];
        for (x, y, z) in corners {
            b.float(x).float(y).float(z);
        }
        for n in 1..=8 {
            b.int(n);
        }
        b.int(1);
    }

    fn state(b: &mut Builder, time: f64, ux: f64) {
        b.float(time);
        b.float(0.5).float(1.5); // globals
        for _ in 0..8 {
            b.float(ux).float(0.0).float(0.0);
        }
        for k in 0..7 {
            b.float(k as f64 * 10.0);
        }
    }

    fn build(states: &[(f64, f64)], sentinel: bool) -> (BinaryCursor, ControlBlock, Mesh) {
        let mut b = Builder::new();
        for w in single_hex_control() {
            b.int(w);
        }
        geometry(&mut b);
        for (t, ux) in states {
            state(&mut b, *t, *ux);
        }
        if sentinel {
            b.float(-999999.0);
        }
        let cursor = BinaryCursor::new(vec![b.bytes], WordSize::Four, Endianness::Little);
        let control = ControlBlock::decode(&cursor).unwrap();
        let mesh = read_mesh(&cursor, &control).unwrap();
        (cursor, control, mesh)
    }

    #[test]
    fn decodes_fields_in_order() {
        let (cursor, control, mesh) = build(&[(0.001, 0.25)], false);
        assert_eq!(control.state_words(), 1 + 2 + 24 + 7);
        let states: Vec<_> = StateIterator::new(&cursor, &control, &mesh)
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(states.len(), 1);
        let s = &states[0];
        assert!((s.time - 0.001).abs() < 1e-9);
        assert_eq!(s.globals, vec![0.5, 1.5]);
        assert_eq!(s.node_displacements.len(), 24);
        assert_eq!(s.node_displacements[0], 0.25);
        assert_eq!(s.solid_block(0, 7).unwrap()[6], 60.0);
        assert!(s.node_velocities.is_empty());
        assert!(s.node_temperatures.is_empty());
    }

    #[test]
    fn sentinel_stops_iteration() {
        let (cursor, control, mesh) = build(&[(0.0, 0.0), (0.001, 0.1)], true);
        let states: Vec<_> = StateIterator::new(&cursor, &control, &mesh)
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(states.len(), 2);
        assert_eq!(StateIterator::count_states(&cursor, &control), 2);
    }

    #[test]
    fn clean_end_of_stream_stops_iteration() {
        let (cursor, control, mesh) = build(&[(0.0, 0.0), (0.001, 0.1)], false);
        let states: Vec<_> = StateIterator::new(&cursor, &control, &mesh)
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(states.len(), 2);
    }

    #[test]
    fn short_final_record_is_truncated() {
        let (cursor_full, control, mesh) = build(&[(0.0, 0.0)], false);
        // Rebuild with the last record cut short.
        let mut b = Builder::new();
        for w in single_hex_control() {
            b.int(w);
        }
        geometry(&mut b);
        state(&mut b, 0.0, 0.0);
        b.float(0.002); // next time word, then nothing
        b.float(1.0);
        let cursor = BinaryCursor::new(vec![b.bytes], WordSize::Four, Endianness::Little);
        drop(cursor_full);

        let mut it = StateIterator::new(&cursor, &control, &mesh);
        assert!(it.next().unwrap().is_ok());
        let err = it.next().unwrap().unwrap_err();
        assert!(matches!(err, FormatError::Truncated { .. }));
        assert!(it.next().is_none());
    }

    #[test]
    fn nan_time_is_corrupted_not_sentinel() {
        let mut b = Builder::new();
        for w in single_hex_control() {
            b.int(w);
        }
        geometry(&mut b);
        state(&mut b, 0.0, 0.0);
        b.float_bits(f32::NAN);
        for _ in 0..33 {
            b.float(0.0);
        }
        let cursor = BinaryCursor::new(vec![b.bytes], WordSize::Four, Endianness::Little);
        let control = ControlBlock::decode(&cursor).unwrap();
        let mesh = read_mesh(&cursor, &control).unwrap();
        let mut it = StateIterator::new(&cursor, &control, &mesh);
        assert!(it.next().unwrap().is_ok());
        let err = it.next().unwrap().unwrap_err();
        assert!(matches!(err, FormatError::CorruptedData { .. }));
    }

    #[test]
    fn element_deletion_table_reports_user_ids() {
        let mut w = single_hex_control();
        w[36] = -1; // element deletion table
        let mut b = Builder::new();
        for word in w {
            b.int(word);
        }
        geometry(&mut b);
        state(&mut b, 0.0, 0.0);
        b.float(0.0); // the single solid is deleted
        let cursor = BinaryCursor::new(vec![b.bytes], WordSize::Four, Endianness::Little);
        let control = ControlBlock::decode(&cursor).unwrap();
        assert_eq!(control.deletion_table(), DeletionTable::Elements);
        let mesh = read_mesh(&cursor, &control).unwrap();
        let states: Vec<_> = StateIterator::new(&cursor, &control, &mesh)
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(states[0].deleted_solids, vec![1]);
    }
}
