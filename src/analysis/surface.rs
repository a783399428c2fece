//! Exterior surface extraction and direction filtering.
//!
//! A face of a solid element is exterior when no other element shares it.
//! Faces are keyed by their sorted node indices, so orientation and starting
//! corner do not matter for the pairing.

use fnv::FnvHashMap;

use crate::format::geometry::Mesh;
use crate::format::state::StateData;

use super::tensor::{angle_between_degrees, normalized_or_zero, Vec3};

/// Local corner ordering of the six hexahedron faces. Right-hand rule over
/// each quadruple gives the outward normal.
///
///       7-------6
///      /|      /|
///     4-------5 |
///     | 3-----|-2
///     |/      |/
///     0-------1
pub const HEX_FACES: [[usize; 4]; 6] = [
    [0, 3, 2, 1], // -Z
    [4, 5, 6, 7], // +Z
    [0, 1, 5, 4], // -Y
    [2, 3, 7, 6], // +Y
    [0, 4, 7, 3], // -X
    [1, 2, 6, 5], // +X
];

/// Which kind of element contributed a face. Only solid faces can be looked
/// up in per-state solid element data.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum FaceKind {
    Solid,
    ShellTop,
    ShellBottom,
}

#[derive(Clone, Debug)]
pub struct Face {
    /// Index of the owning element within its class array.
    pub element_index: usize,
    pub element_user_id: i64,
    pub part_id: i32,
    pub kind: FaceKind,
    /// Internal node indices, in outward-winding order.
    pub nodes: [u32; 4],
    pub local_face: u8,

    pub normal: Vec3,
    pub centroid: Vec3,
    pub area: f64,
}

fn rest_position(mesh: &Mesh, node: u32) -> Vec3 {
    let n = &mesh.nodes[node as usize];
    Vec3::new(n.x, n.y, n.z)
}

fn deformed_position(mesh: &Mesh, state: &StateData, ndim: usize, node: u32) -> Vec3 {
    let mut p = rest_position(mesh, node);
    let base = node as usize * ndim;
    if let Some(u) = state.node_displacements.get(base..base + ndim) {
        p.x += u[0];
        if ndim > 1 {
            p.y += u[1];
        }
        if ndim > 2 {
            p.z += u[2];
        }
    }
    p
}

fn quad_geometry(p: [Vec3; 4]) -> (Vec3, Vec3, f64) {
    let centroid = (p[0] + p[1] + p[2] + p[3]) / 4.0;
    let normal = normalized_or_zero((p[2] - p[0]).cross(p[3] - p[1]));
    let area = 0.5
        * ((p[1] - p[0]).cross(p[2] - p[0]).magnitude()
            + (p[2] - p[0]).cross(p[3] - p[0]).magnitude());
    (centroid, normal, area)
}

fn part_selected(filter: Option<&[i32]>, part: i32) -> bool {
    filter.map_or(true, |ids| ids.contains(&part))
}

/// Exterior faces of the solid elements, in element-major order.
///
/// When a part filter is given, pairing runs over the selected elements only,
/// so a face between a selected and an unselected part counts as exterior.
pub fn extract_solid_exterior(mesh: &Mesh, part_filter: Option<&[i32]>) -> Vec<Face> {
    // Key: sorted node quadruple. Value: owner, or None once shared.
    let mut table: FnvHashMap<[u32; 4], Option<(usize, u8)>> =
        FnvHashMap::with_capacity_and_hasher(mesh.solids.len() * 6, Default::default());

    for (ei, solid) in mesh.solids.iter().enumerate() {
        if !part_selected(part_filter, solid.part) {
            continue;
        }
        for (fi, corners) in HEX_FACES.iter().enumerate() {
            let mut key = [
                solid.nodes[corners[0]],
                solid.nodes[corners[1]],
                solid.nodes[corners[2]],
                solid.nodes[corners[3]],
            ];
            key.sort_unstable();
            table
                .entry(key)
                .and_modify(|slot| *slot = None)
                .or_insert(Some((ei, fi as u8)));
        }
    }

    let mut faces = Vec::new();
    for (ei, solid) in mesh.solids.iter().enumerate() {
        if !part_selected(part_filter, solid.part) {
            continue;
        }
        let center = solid
            .nodes
            .iter()
            .fold(Vec3::zero(), |acc, &n| acc + rest_position(mesh, n))
            / 8.0;
        for (fi, corners) in HEX_FACES.iter().enumerate() {
            let nodes = [
                solid.nodes[corners[0]],
                solid.nodes[corners[1]],
                solid.nodes[corners[2]],
                solid.nodes[corners[3]],
            ];
            let mut key = nodes;
            key.sort_unstable();
            if table.get(&key) != Some(&Some((ei, fi as u8))) {
                continue;
            }
            let p = nodes.map(|n| rest_position(mesh, n));
            let (centroid, mut normal, area) = quad_geometry(p);
            // The winding already points outward; re-orient against the
            // element center to cover distorted elements.
            if normal.dot(centroid - center) < 0.0 {
                normal = -normal;
            }
            faces.push(Face {
                element_index: ei,
                element_user_id: mesh.solid_user_id(ei),
                part_id: solid.part,
                kind: FaceKind::Solid,
                nodes,
                local_face: fi as u8,
                normal,
                centroid,
                area,
            });
        }
    }
    log::debug!(
        "surface extraction: {} exterior face(s) from {} solid(s)",
        faces.len(),
        mesh.solids.len()
    );
    faces
}

/// Shell faces. Each shell is its own boundary, so there is no pairing; the
/// top face follows the element winding and the bottom face, when requested,
/// is its reverse.
pub fn extract_shell_faces(mesh: &Mesh, part_filter: Option<&[i32]>, include_bottom: bool) -> Vec<Face> {
    let mut faces = Vec::new();
    for (ei, shell) in mesh.shells.iter().enumerate() {
        if !part_selected(part_filter, shell.part) {
            continue;
        }
        let p = shell.nodes.map(|n| rest_position(mesh, n));
        let (centroid, normal, area) = quad_geometry(p);
        let user_id = mesh
            .shell_user_ids
            .get(ei)
            .copied()
            .unwrap_or(ei as i64 + 1);
        faces.push(Face {
            element_index: ei,
            element_user_id: user_id,
            part_id: shell.part,
            kind: FaceKind::ShellTop,
            nodes: shell.nodes,
            local_face: 0,
            normal,
            centroid,
            area,
        });
        if include_bottom {
            faces.push(Face {
                element_index: ei,
                element_user_id: user_id,
                part_id: shell.part,
                kind: FaceKind::ShellBottom,
                nodes: [shell.nodes[3], shell.nodes[2], shell.nodes[1], shell.nodes[0]],
                local_face: 1,
                normal: -normal,
                centroid,
                area,
            });
        }
    }
    faces
}

/// Keep the faces whose outward normal lies within `angle_degrees` of the
/// reference direction. The bound is inclusive; a face tangent to the
/// reference sits at exactly 90 degrees.
pub fn filter_by_direction(faces: Vec<Face>, direction: Vec3, angle_degrees: f64) -> Vec<Face> {
    let reference = normalized_or_zero(direction);
    faces
        .into_iter()
        .filter(|f| angle_between_degrees(f.normal, reference) <= angle_degrees)
        .collect()
}

/// Re-evaluate centroid, normal and area from the deformed node positions of
/// one state. Connectivity and ownership never change.
pub fn update_for_state(faces: &mut [Face], mesh: &Mesh, state: &StateData, effective_ndim: usize) {
    if state.node_displacements.is_empty() {
        return;
    }
    for face in faces {
        let p = face
            .nodes
            .map(|n| deformed_position(mesh, state, effective_ndim, n));
        let (centroid, mut normal, area) = quad_geometry(p);
        // Keep the outward sense it had at rest.
        if normal.dot(face.normal) < 0.0 {
            normal = -normal;
        }
        face.centroid = centroid;
        face.normal = normal;
        face.area = area;
    }
}
