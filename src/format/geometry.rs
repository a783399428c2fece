//! Geometry records: the optional material-type table, node coordinates,
//! element connectivity, and the arbitrary-numbering block that maps
//! internal indices to user IDs.

use super::control::{ControlBlock, CONTROL_WORDS};
use super::cursor::BinaryCursor;
use super::FormatError;

#[derive(Copy, Clone, Debug)]
pub struct Node {
    /// User-visible node ID (from arbitrary numbering, or 1-based index).
    pub id: i64,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// Eight-node hexahedral solid.
#[derive(Clone, Debug)]
pub struct Solid {
    pub nodes: [u32; 8],
    pub part: i32,
    pub material_type: i32,
}

#[derive(Clone, Debug)]
pub struct ThickShell {
    pub nodes: [u32; 8],
    pub part: i32,
    pub material_type: i32,
}

#[derive(Clone, Debug)]
pub struct Beam {
    pub nodes: [u32; 2],
    pub part: i32,
    pub material_type: i32,
}

#[derive(Clone, Debug)]
pub struct Shell {
    pub nodes: [u32; 4],
    pub part: i32,
    pub material_type: i32,
}

/// The whole model geometry. Owned by the reader handle; analyzers borrow it
/// read-only. Elements refer to nodes by index, never by pointer.
#[derive(Clone, Debug, Default)]
pub struct Mesh {
    pub nodes: Vec<Node>,
    pub solids: Vec<Solid>,
    pub thick_shells: Vec<ThickShell>,
    pub beams: Vec<Beam>,
    pub shells: Vec<Shell>,

    /// Internal index to user ID, one entry per entity of the class.
    pub node_user_ids: Vec<i64>,
    pub solid_user_ids: Vec<i64>,
    pub beam_user_ids: Vec<i64>,
    pub shell_user_ids: Vec<i64>,
    pub thick_shell_user_ids: Vec<i64>,

    /// The material-type table, empty when the stream carries none.
    pub material_types: Vec<i64>,
}

impl Mesh {
    pub fn solid_user_id(&self, index: usize) -> i64 {
        self.solid_user_ids.get(index).copied().unwrap_or(index as i64 + 1)
    }

    pub fn node_user_id(&self, index: usize) -> i64 {
        self.node_user_ids.get(index).copied().unwrap_or(index as i64 + 1)
    }
}

fn node_index(raw: i64, numnp: usize, class: &'static str) -> Result<u32, FormatError> {
    if raw < 1 || raw as usize > numnp {
        return Err(FormatError::CorruptedData {
            what: format!("{} element references node {} outside 1..={}", class, raw, numnp),
        });
    }
    Ok((raw - 1) as u32)
}

/// Resolve the trailing connectivity word of one element into a part id and
/// a material type.
///
/// Without a material-type table the word is the part id directly and doubles
/// as the material type. With one, the word indexes the table: the entry is
/// the part id and the word itself is kept as the material type.
fn resolve_part(
    raw: i64,
    material_types: &[i64],
    class: &'static str,
) -> Result<(i32, i32), FormatError> {
    if material_types.is_empty() {
        return Ok((raw as i32, raw as i32));
    }
    let idx = raw - 1;
    if idx < 0 || idx as usize >= material_types.len() {
        return Err(FormatError::CorruptedData {
            what: format!(
                "{} element references material {} outside the {}-entry material table",
                class,
                raw,
                material_types.len()
            ),
        });
    }
    Ok((material_types[idx as usize] as i32, raw as i32))
}

/// Read the material-type section, if the control block flags one: two
/// header words (rigid-body count, table length) followed by the table.
fn read_material_types(cursor: &BinaryCursor, control: &ControlBlock) -> Result<Vec<i64>, FormatError> {
    if control.mattyp == 0 {
        return Ok(Vec::new());
    }
    if control.nmmat < 0 {
        return Err(FormatError::CorruptedData {
            what: format!("material-type section flagged but NMMAT is {}", control.nmmat),
        });
    }
    if !cursor.has(CONTROL_WORDS, control.material_section_words()) {
        return Err(FormatError::Truncated { what: "material-type section" });
    }
    let count = cursor.int_at(CONTROL_WORDS + 1)?;
    if count != control.nmmat {
        return Err(FormatError::CorruptedData {
            what: format!(
                "material table holds {} entries, control block says {}",
                count, control.nmmat
            ),
        });
    }
    cursor.ints(CONTROL_WORDS + 2, control.nmmat as usize)
}

/// Read the geometry section that follows the control block and the optional
/// material-type table.
pub fn read_mesh(cursor: &BinaryCursor, control: &ControlBlock) -> Result<Mesh, FormatError> {
    let numnp = control.num_nodes();
    let ndim = control.ndim.max(0) as usize;
    let mut word = control.geometry_start();

    if !cursor.has(word, control.geometry_words()) {
        return Err(FormatError::Truncated { what: "geometry section" });
    }

    let material_types = read_material_types(cursor, control)?;

    let mut mesh = Mesh::default();

    // Node coordinates, node-major. Only the first three components are
    // coordinates; anything past that belongs to node attributes.
    mesh.nodes.reserve(numnp);
    for i in 0..numnp {
        let base = word + (i * ndim) as u64;
        let x = cursor.float_at(base)?;
        let y = if ndim > 1 { cursor.float_at(base + 1)? } else { 0.0 };
        let z = if ndim > 2 { cursor.float_at(base + 2)? } else { 0.0 };
        mesh.nodes.push(Node {
            id: i as i64 + 1,
            x,
            y,
            z,
        });
    }
    word += control.coord_words();

    // Solids: eight 1-based node numbers and a part/material number.
    mesh.solids.reserve(control.num_solids());
    for _ in 0..control.num_solids() {
        let ints = cursor.ints(word, 9)?;
        let mut nodes = [0u32; 8];
        for (slot, raw) in nodes.iter_mut().zip(&ints[..8]) {
            *slot = node_index(*raw, numnp, "solid")?;
        }
        let (part, material_type) = resolve_part(ints[8], &material_types, "solid")?;
        mesh.solids.push(Solid {
            nodes,
            part,
            material_type,
        });
        word += 9;
    }

    mesh.thick_shells.reserve(control.num_thick_shells());
    for _ in 0..control.num_thick_shells() {
        let ints = cursor.ints(word, 9)?;
        let mut nodes = [0u32; 8];
        for (slot, raw) in nodes.iter_mut().zip(&ints[..8]) {
            *slot = node_index(*raw, numnp, "thick shell")?;
        }
        let (part, material_type) = resolve_part(ints[8], &material_types, "thick shell")?;
        mesh.thick_shells.push(ThickShell {
            nodes,
            part,
            material_type,
        });
        word += 9;
    }

    // Beams: two end nodes, orientation words we do not use, part number last.
    mesh.beams.reserve(control.num_beams());
    for _ in 0..control.num_beams() {
        let ints = cursor.ints(word, 5)?;
        let (part, material_type) = resolve_part(ints[4], &material_types, "beam")?;
        mesh.beams.push(Beam {
            nodes: [
                node_index(ints[0], numnp, "beam")?,
                node_index(ints[1], numnp, "beam")?,
            ],
            part,
            material_type,
        });
        word += 5;
    }

    mesh.shells.reserve(control.num_shells());
    for _ in 0..control.num_shells() {
        let ints = cursor.ints(word, 5)?;
        let mut nodes = [0u32; 4];
        for (slot, raw) in nodes.iter_mut().zip(&ints[..4]) {
            *slot = node_index(*raw, numnp, "shell")?;
        }
        let (part, material_type) = resolve_part(ints[4], &material_types, "shell")?;
        mesh.shells.push(Shell {
            nodes,
            part,
            material_type,
        });
        word += 5;
    }

    mesh.material_types = material_types;

    read_arbitrary_numbering(cursor, control, word, &mut mesh)?;

    // With no numbering block the user IDs are the 1-based internal indices.
    if mesh.node_user_ids.is_empty() {
        mesh.node_user_ids = (1..=numnp as i64).collect();
    }
    if mesh.solid_user_ids.is_empty() {
        mesh.solid_user_ids = (1..=mesh.solids.len() as i64).collect();
    }
    if mesh.beam_user_ids.is_empty() {
        mesh.beam_user_ids = (1..=mesh.beams.len() as i64).collect();
    }
    if mesh.shell_user_ids.is_empty() {
        mesh.shell_user_ids = (1..=mesh.shells.len() as i64).collect();
    }
    if mesh.thick_shell_user_ids.is_empty() {
        mesh.thick_shell_user_ids = (1..=mesh.thick_shells.len() as i64).collect();
    }

    for (node, id) in mesh.nodes.iter_mut().zip(&mesh.node_user_ids) {
        node.id = *id;
    }

    log::info!(
        "mesh: {} nodes, {} solids, {} shells, {} beams, {} thick shells",
        mesh.nodes.len(),
        mesh.solids.len(),
        mesh.shells.len(),
        mesh.beams.len(),
        mesh.thick_shells.len()
    );
    Ok(mesh)
}

/// One sub-array slot of the numbering region descriptor.
struct ArbsSlot {
    offset: i64,
    length: i64,
    expected_len: usize,
    name: &'static str,
}

/// Decode the arbitrary-numbering region.
///
/// The region describes itself: its leading words give the offset and length
/// of each user-ID array. Producers disagree on whether the offsets are
/// relative to the region or to the file start, so both interpretations are
/// tried; a descriptor that fits neither is refused rather than guessed.
fn read_arbitrary_numbering(
    cursor: &BinaryCursor,
    control: &ControlBlock,
    region_start: u64,
    mesh: &mut Mesh,
) -> Result<(), FormatError> {
    let narbs = control.narbs;
    if narbs <= 0 {
        return Ok(());
    }
    let narbs = narbs as u64;
    if !cursor.has(region_start, narbs) {
        return Err(FormatError::Truncated { what: "arbitrary numbering region" });
    }

    let nsort = cursor.int_at(region_start)?;
    let header_words: u64 = if nsort < 0 { 16 } else { 10 };
    if narbs < header_words {
        return Err(FormatError::CorruptedData {
            what: format!("numbering region of {} words cannot hold its descriptor", narbs),
        });
    }

    let header = cursor.ints(region_start, header_words as usize)?;
    let slots = [
        ArbsSlot {
            offset: header[0],
            length: header[5],
            expected_len: control.num_nodes(),
            name: "node",
        },
        ArbsSlot {
            offset: header[1],
            length: header[6],
            expected_len: control.num_solids(),
            name: "solid",
        },
        ArbsSlot {
            offset: header[2],
            length: header[7],
            expected_len: control.num_beams(),
            name: "beam",
        },
        ArbsSlot {
            offset: header[3],
            length: header[8],
            expected_len: control.num_shells(),
            name: "shell",
        },
        ArbsSlot {
            offset: header[4],
            length: header[9],
            expected_len: control.num_thick_shells(),
            name: "thick shell",
        },
    ];

    // The node offset is negative in the 16-word form; its magnitude still
    // addresses the array.
    let offsets: Vec<i64> = slots.iter().map(|s| s.offset.abs()).collect();

    for slot in &slots {
        if slot.length < 0 {
            return Err(FormatError::CorruptedData {
                what: format!("negative {} numbering array length", slot.name),
            });
        }
    }

    // Candidate bases for the offsets: region-relative, then file-relative.
    let bases = [0i64, region_start as i64];
    let mut resolved: Option<Vec<u64>> = None;
    'base: for base in bases {
        let mut abs = Vec::with_capacity(slots.len());
        for (slot, &off) in slots.iter().zip(&offsets) {
            let region_off = off - base;
            if region_off < 0 || (region_off as u64 + slot.length as u64) > narbs {
                continue 'base;
            }
            abs.push(region_start + region_off as u64);
        }
        resolved = Some(abs);
        break;
    }

    let positions = resolved.ok_or_else(|| FormatError::CorruptedData {
        what: "numbering sub-arrays fall outside the numbering region".to_string(),
    })?;

    for slot in &slots {
        if slot.length as usize != slot.expected_len {
            return Err(FormatError::CorruptedData {
                what: format!(
                    "{} numbering array holds {} entries, model has {}",
                    slot.name, slot.length, slot.expected_len
                ),
            });
        }
    }

    mesh.node_user_ids = cursor.ints(positions[0], slots[0].length as usize)?;
    mesh.solid_user_ids = cursor.ints(positions[1], slots[1].length as usize)?;
    mesh.beam_user_ids = cursor.ints(positions[2], slots[2].length as usize)?;
    mesh.shell_user_ids = cursor.ints(positions[3], slots[3].length as usize)?;
    mesh.thick_shell_user_ids = cursor.ints(positions[4], slots[4].length as usize)?;
    Ok(())
}
