//! Synthetic d3plot family writer used by the integration tests.
//!
//! Only the slices of the format the reader consumes are produced: a 64-word
//! control block, node coordinates, solid connectivity, optional arbitrary
//! numbering, and fixed-stride state records.

use std::fs;
use std::path::{Path, PathBuf};

/// Word emitter for one segment's bytes.
pub struct WordWriter {
    pub word_size: usize,
    pub big_endian: bool,
    pub bytes: Vec<u8>,
}

impl WordWriter {
    pub fn new(word_size: usize, big_endian: bool) -> WordWriter {
        WordWriter {
            word_size,
            big_endian,
            bytes: Vec::new(),
        }
    }

    pub fn int(&mut self, v: i64) -> &mut Self {
        match (self.word_size, self.big_endian) {
            (4, false) => self.bytes.extend((v as i32).to_le_bytes()),
            (4, true) => self.bytes.extend((v as i32).to_be_bytes()),
            (8, false) => self.bytes.extend(v.to_le_bytes()),
            (8, true) => self.bytes.extend(v.to_be_bytes()),
            _ => panic!("word size must be 4 or 8"),
        }
        self
    }

    pub fn float(&mut self, v: f64) -> &mut Self {
        match (self.word_size, self.big_endian) {
            (4, false) => self.bytes.extend((v as f32).to_le_bytes()),
            (4, true) => self.bytes.extend((v as f32).to_be_bytes()),
            (8, false) => self.bytes.extend(v.to_le_bytes()),
            (8, true) => self.bytes.extend(v.to_be_bytes()),
            _ => panic!("word size must be 4 or 8"),
        }
        self
    }
}

/// A small test model: hexahedra plus optional beams.
pub struct Model {
    pub coords: Vec<[f64; 3]>,
    /// 0-based corner indices in LS-DYNA order, plus a part word.
    pub solids: Vec<([usize; 8], i32)>,
    /// 0-based end nodes plus a part word. Beams carry no per-state data
    /// here (NV1D stays zero).
    pub beams: Vec<([usize; 2], i32)>,
    pub nglbv: usize,
    pub has_displacement: bool,
    pub nv3d: usize,
    pub with_strain: bool,
    /// User IDs for nodes and solids; identity numbering when `None`.
    pub user_ids: Option<(Vec<i64>, Vec<i64>)>,
    /// Material-type table; when present the connectivity part words become
    /// ordinals into it.
    pub material_table: Option<Vec<i64>>,
}

impl Model {
    pub fn single_hex() -> Model {
        Model {
            coords: unit_cube_coords(0.0),
            solids: vec![([0, 1, 2, 3, 4, 5, 6, 7], 1)],
            beams: Vec::new(),
            nglbv: 0,
            has_displacement: true,
            nv3d: 7,
            with_strain: false,
            user_ids: None,
            material_table: None,
        }
    }

    /// Two unit hexes sharing their x=1 face; 12 nodes, parts 1 and 2.
    pub fn dumbbell() -> Model {
        let mut coords = unit_cube_coords(0.0);
        for p in unit_cube_coords(1.0) {
            if !coords.contains(&p) {
                coords.push(p);
            }
        }
        let find = |p: [f64; 3]| coords.iter().position(|q| *q == p).unwrap();
        let hex = |x0: f64| {
            let c = unit_cube_coords(x0);
            [
                find(c[0]),
                find(c[1]),
                find(c[2]),
                find(c[3]),
                find(c[4]),
                find(c[5]),
                find(c[6]),
                find(c[7]),
            ]
        };
        Model {
            solids: vec![(hex(0.0), 1), (hex(1.0), 2)],
            coords,
            beams: Vec::new(),
            nglbv: 0,
            has_displacement: true,
            nv3d: 7,
            with_strain: false,
            user_ids: None,
            material_table: None,
        }
    }

    fn narbs(&self) -> usize {
        match &self.user_ids {
            Some((nodes, solids)) => 10 + nodes.len() + solids.len(),
            None => 0,
        }
    }

    pub fn write_control(&self, w: &mut WordWriter) {
        let mut words = [0i64; 64];
        words[14] = 3; // NDIM
        words[15] = self.coords.len() as i64; // NUMNP
        words[17] = self.nglbv as i64;
        words[19] = if self.has_displacement { 1 } else { 0 }; // IU
        words[22] = self.solids.len() as i64; // NEL8
        words[27] = self.nv3d as i64; // NV3D
        words[28] = self.beams.len() as i64; // NEL2
        words[39] = self.narbs() as i64;
        if let Some(table) = &self.material_table {
            words[48] = table.len() as i64; // NMMAT
            words[50] = 1; // MATTYP
        }
        if self.with_strain {
            words[56] = 1; // EXTRA
            words[57] = 1; // ISTRN
        }
        for word in words {
            w.int(word);
        }
    }

    pub fn write_geometry(&self, w: &mut WordWriter) {
        if let Some(table) = &self.material_table {
            w.int(0).int(table.len() as i64);
            for entry in table {
                w.int(*entry);
            }
        }
        for c in &self.coords {
            w.float(c[0]).float(c[1]).float(c[2]);
        }
        for (nodes, part) in &self.solids {
            for n in nodes {
                w.int(*n as i64 + 1);
            }
            w.int(*part as i64);
        }
        for (nodes, part) in &self.beams {
            w.int(nodes[0] as i64 + 1).int(nodes[1] as i64 + 1);
            w.int(0).int(0);
            w.int(*part as i64);
        }
        if let Some((node_ids, solid_ids)) = &self.user_ids {
            w.int(10).int(10 + node_ids.len() as i64).int(0).int(0).int(0);
            w.int(node_ids.len() as i64)
                .int(solid_ids.len() as i64)
                .int(0)
                .int(0)
                .int(0);
            for id in node_ids {
                w.int(*id);
            }
            for id in solid_ids {
                w.int(*id);
            }
        }
    }

    /// One state record. `disp` is per-node; `solid_words` per element, each
    /// exactly NV3D long.
    pub fn write_state(
        &self,
        w: &mut WordWriter,
        time: f64,
        disp: &[[f64; 3]],
        solid_words: &[Vec<f64>],
    ) {
        w.float(time);
        for _ in 0..self.nglbv {
            w.float(0.0);
        }
        if self.has_displacement {
            assert_eq!(disp.len(), self.coords.len());
            for d in disp {
                w.float(d[0]).float(d[1]).float(d[2]);
            }
        }
        assert_eq!(solid_words.len(), self.solids.len());
        for words in solid_words {
            assert_eq!(words.len(), self.nv3d);
            for v in words {
                w.float(*v);
            }
        }
    }
}

pub fn unit_cube_coords(x0: f64) -> Vec<[f64; 3]> {
    vec![
        [x0, 0.0, 0.0],
        [x0 + 1.0, 0.0, 0.0],
        [x0 + 1.0, 1.0, 0.0],
        [x0, 1.0, 0.0],
        [x0, 0.0, 1.0],
        [x0 + 1.0, 0.0, 1.0],
        [x0 + 1.0, 1.0, 1.0],
        [x0, 1.0, 1.0],
    ]
}

/// A solid element record holding a stress tensor, effective plastic strain
/// and zero-padded history words.
pub fn solid_record(nv3d: usize, stress: [f64; 6], epsp: f64) -> Vec<f64> {
    let mut words = Vec::with_capacity(nv3d);
    words.extend_from_slice(&stress);
    words.push(epsp);
    while words.len() < nv3d {
        words.push(0.0);
    }
    words
}

pub fn zero_disp(n: usize) -> Vec<[f64; 3]> {
    vec![[0.0; 3]; n]
}

pub fn uniform_disp(n: usize, d: [f64; 3]) -> Vec<[f64; 3]> {
    vec![d; n]
}

/// Write segment byte blobs as a family under `dir` and return the base path.
pub fn write_family(dir: &Path, segments: &[Vec<u8>]) -> PathBuf {
    let base = dir.join("d3plot");
    for (i, bytes) in segments.iter().enumerate() {
        let path = if i == 0 {
            base.clone()
        } else {
            dir.join(format!("d3plot{:02}", i))
        };
        fs::write(path, bytes).unwrap();
    }
    base
}

pub const SENTINEL: f64 = -999999.0;
