//! The 64-word control block.
//!
//! Every record that follows the control block — geometry, arbitrary
//! numbering, each state — has its size derived from these words. Nothing
//! downstream reads at a hardcoded position past word 63.

use super::cursor::BinaryCursor;
use super::FormatError;

pub const CONTROL_WORDS: u64 = 64;

/// Upper bound on node/element counts a real model could plausibly carry.
/// Anything larger means the words are being read with the wrong format.
pub const PLAUSIBLE_COUNT_CEILING: i64 = 2_000_000_000;

/// Node/element deletion table variant encoded in the MAXINT word.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum DeletionTable {
    None,
    /// One word per node.
    Nodes,
    /// One word per element, solids then thick shells then beams then shells.
    Elements,
}

/// Decoded control block. Field names follow the d3plot word names so the
/// layout arithmetic below can be checked against the database description.
#[derive(Clone, Debug)]
pub struct ControlBlock {
    pub raw: [i64; CONTROL_WORDS as usize],

    pub ndim: i64,
    pub numnp: i64,
    pub icode: i64,
    pub nglbv: i64,
    pub it: i64,
    pub iu: i64,
    pub iv: i64,
    pub ia: i64,
    /// Signed on disk; negative flags ten-node solids. Use `num_solids()`.
    pub nel8: i64,
    pub nummat8: i64,
    pub nv3d: i64,
    pub nel2: i64,
    pub nummat2: i64,
    pub nv1d: i64,
    pub nel4: i64,
    pub nummat4: i64,
    pub nv2d: i64,
    pub neiph: i64,
    pub neips: i64,
    pub maxint_raw: i64,
    pub narbs: i64,
    pub nelt: i64,
    pub nummatt: i64,
    pub nv3dt: i64,
    pub nmmat: i64,
    /// Material-type section flag. Non-zero means a table sits between the
    /// control block and the node coordinates, and the connectivity part
    /// words resolve through it.
    pub mattyp: i64,
    pub extra: i64,
    pub istrn: i64,
}

impl ControlBlock {
    /// Decode the 64 words at the start of the stream.
    pub fn decode(cursor: &BinaryCursor) -> Result<ControlBlock, FormatError> {
        if !cursor.has(0, CONTROL_WORDS) {
            return Err(FormatError::Truncated { what: "control block" });
        }
        let mut raw = [0i64; CONTROL_WORDS as usize];
        for (i, slot) in raw.iter_mut().enumerate() {
            *slot = cursor.int_at(i as u64)?;
        }

        let extra = raw[56];
        let istrn = if extra > 0 { raw[57] } else { 0 };

        Ok(ControlBlock {
            ndim: raw[14],
            numnp: raw[15],
            icode: raw[16],
            nglbv: raw[17],
            it: raw[18],
            iu: raw[19],
            iv: raw[20],
            ia: raw[21],
            nel8: raw[22],
            nummat8: raw[23],
            nv3d: raw[27],
            nel2: raw[28],
            nummat2: raw[29],
            nv1d: raw[30],
            nel4: raw[31],
            nummat4: raw[32],
            nv2d: raw[33],
            neiph: raw[34],
            neips: raw[35],
            maxint_raw: raw[36],
            narbs: raw[39],
            nelt: raw[40],
            nummatt: raw[41],
            nv3dt: raw[42],
            nmmat: raw[48],
            mattyp: raw[50],
            extra,
            istrn,
            raw,
        })
    }

    /// Spatial dimension of the vector fields. Values of NDIM above 3 carry
    /// extra mesh flags; the coordinates themselves stay three-dimensional.
    pub fn effective_ndim(&self) -> usize {
        if self.ndim >= 4 {
            3
        }
        else {
            self.ndim.max(0) as usize
        }
    }

    pub fn num_nodes(&self) -> usize {
        self.numnp.max(0) as usize
    }

    pub fn num_solids(&self) -> usize {
        self.nel8.unsigned_abs() as usize
    }

    pub fn num_beams(&self) -> usize {
        self.nel2.max(0) as usize
    }

    pub fn num_shells(&self) -> usize {
        self.nel4.max(0) as usize
    }

    pub fn num_thick_shells(&self) -> usize {
        self.nelt.max(0) as usize
    }

    pub fn deletion_table(&self) -> DeletionTable {
        if self.maxint_raw < 0 {
            DeletionTable::Elements
        }
        else if self.maxint_raw >= 10000 {
            DeletionTable::Nodes
        }
        else {
            DeletionTable::None
        }
    }

    fn deletion_words(&self) -> u64 {
        match self.deletion_table() {
            DeletionTable::None => 0,
            DeletionTable::Nodes => self.num_nodes() as u64,
            DeletionTable::Elements => {
                (self.num_solids() + self.num_thick_shells() + self.num_beams() + self.num_shells())
                    as u64
            }
        }
    }

    /// Per-state nodal word count: temperatures plus the enabled vector
    /// fields, all over NUMNP nodes.
    pub fn nnd(&self) -> u64 {
        let n = self.num_nodes() as u64;
        let vec_fields = (self.iu + self.iv + self.ia).max(0) as u64;
        self.it.max(0) as u64 * n + vec_fields * self.effective_ndim() as u64 * n
    }

    /// Per-state element word count over all four element classes.
    pub fn enn(&self) -> u64 {
        self.nv3d.max(0) as u64 * self.num_solids() as u64
            + self.nv3dt.max(0) as u64 * self.num_thick_shells() as u64
            + self.nv1d.max(0) as u64 * self.num_beams() as u64
            + self.nv2d.max(0) as u64 * self.num_shells() as u64
    }

    /// Fixed size of one state record: time word, globals, nodal block,
    /// element block, optional deletion table.
    pub fn state_words(&self) -> u64 {
        1 + self.nglbv.max(0) as u64 + self.nnd() + self.enn() + self.deletion_words()
    }

    /// Word count of the material-type section between the control block and
    /// the node coordinates: two header words plus one entry per material,
    /// present only when the MATTYP flag is set.
    pub fn material_section_words(&self) -> u64 {
        if self.mattyp != 0 {
            2 + self.nmmat.max(0) as u64
        }
        else {
            0
        }
    }

    /// First word of the node coordinate record.
    pub fn geometry_start(&self) -> u64 {
        CONTROL_WORDS + self.material_section_words()
    }

    /// Word count of the node coordinate record. NDIM components per node are
    /// stored even when only three are coordinates.
    pub fn coord_words(&self) -> u64 {
        self.num_nodes() as u64 * self.ndim.max(0) as u64
    }

    /// Word count of the whole geometry section, control block excluded.
    pub fn geometry_words(&self) -> u64 {
        self.coord_words()
            + 9 * self.num_solids() as u64
            + 9 * self.num_thick_shells() as u64
            + 5 * self.num_beams() as u64
            + 5 * self.num_shells() as u64
    }

    /// First word of the state records.
    pub fn state_start(&self) -> u64 {
        self.geometry_start() + self.geometry_words() + self.narbs.max(0) as u64
    }

    /// Offset of the strain tensor inside one solid element record, if the
    /// file carries one.
    pub fn solid_strain_offset(&self) -> Option<usize> {
        if self.istrn != 0 && self.nv3d >= 13 {
            Some(7)
        }
        else {
            None
        }
    }

    /// Layout combinations this implementation refuses outright.
    pub fn reject_unsupported(&self) -> Result<(), FormatError> {
        if !(2..=7).contains(&self.ndim) {
            return Err(FormatError::UnsupportedVersion {
                what: format!("NDIM = {}", self.ndim),
            });
        }
        if self.num_solids() > 0 && self.nv3d < 7 {
            return Err(FormatError::UnsupportedVersion {
                what: format!("NV3D = {} (need stress tensor and plastic strain)", self.nv3d),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::{Endianness, WordSize};

    fn block_with(setup: impl Fn(&mut [i64; 64])) -> ControlBlock {
        let mut words = [0i64; 64];
        words[14] = 3; // NDIM
        words[15] = 12; // NUMNP
        words[17] = 6; // NGLBV
        words[19] = 1; // IU
        words[22] = 2; // NEL8
        words[27] = 7; // NV3D
        setup(&mut words);
        let bytes: Vec<u8> = words.iter().flat_map(|w| (*w as i32).to_le_bytes()).collect();
        let cursor = BinaryCursor::new(vec![bytes], WordSize::Four, Endianness::Little);
        ControlBlock::decode(&cursor).unwrap()
    }

    #[test]
    fn derived_sizes_follow_flags() {
        let cb = block_with(|_| {});
        assert_eq!(cb.effective_ndim(), 3);
        assert_eq!(cb.nnd(), 12 * 3);
        assert_eq!(cb.enn(), 2 * 7);
        assert_eq!(cb.state_words(), 1 + 6 + 36 + 14);
        assert_eq!(cb.geometry_words(), 12 * 3 + 2 * 9);
        assert_eq!(cb.state_start(), 64 + 36 + 18);
    }

    #[test]
    fn ndim_above_three_keeps_vectors_three_wide() {
        let cb = block_with(|w| w[14] = 4);
        assert_eq!(cb.effective_ndim(), 3);
        assert_eq!(cb.coord_words(), 12 * 4);
        assert_eq!(cb.nnd(), 36);
    }

    #[test]
    fn negative_nel8_means_count_is_absolute() {
        let cb = block_with(|w| w[22] = -5);
        assert_eq!(cb.num_solids(), 5);
    }

    #[test]
    fn maxint_encodes_deletion_tables() {
        assert_eq!(block_with(|_| {}).deletion_table(), DeletionTable::None);
        let nodes = block_with(|w| w[36] = 10003);
        assert_eq!(nodes.deletion_table(), DeletionTable::Nodes);
        assert_eq!(nodes.state_words(), 1 + 6 + 36 + 14 + 12);
        let elems = block_with(|w| w[36] = -3);
        assert_eq!(elems.deletion_table(), DeletionTable::Elements);
        assert_eq!(elems.state_words(), 1 + 6 + 36 + 14 + 2);
    }

    #[test]
    fn material_section_shifts_every_downstream_offset() {
        let cb = block_with(|w| {
            w[48] = 4; // NMMAT
            w[50] = 1; // MATTYP
        });
        assert_eq!(cb.material_section_words(), 2 + 4);
        assert_eq!(cb.geometry_start(), 64 + 6);
        assert_eq!(cb.state_start(), 64 + 6 + 36 + 18);

        let plain = block_with(|w| w[48] = 4);
        assert_eq!(plain.material_section_words(), 0);
        assert_eq!(plain.geometry_start(), 64);
    }

    #[test]
    fn istrn_only_valid_inside_extra_region() {
        let without_extra = block_with(|w| w[57] = 1);
        assert_eq!(without_extra.istrn, 0);
        assert_eq!(without_extra.solid_strain_offset(), None);

        let with_extra = block_with(|w| {
            w[56] = 1;
            w[57] = 1;
            w[27] = 13;
        });
        assert_eq!(with_extra.istrn, 1);
        assert_eq!(with_extra.solid_strain_offset(), Some(7));
    }

    #[test]
    fn rejects_layouts_it_cannot_serve() {
        let bad_ndim = block_with(|w| w[14] = 9);
        assert!(matches!(
            bad_ndim.reject_unsupported(),
            Err(FormatError::UnsupportedVersion { .. })
        ));
        let thin_solids = block_with(|w| w[27] = 6);
        assert!(thin_solids.reject_unsupported().is_err());
        assert!(block_with(|_| {}).reject_unsupported().is_ok());
    }
}
