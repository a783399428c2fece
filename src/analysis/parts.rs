//! Element-to-part bookkeeping, built once after geometry.

use fnv::FnvHashMap;
use itertools::Itertools;

use crate::format::geometry::Mesh;

/// Two-way mapping between parts and their elements, covering all four
/// element classes. Part ids come from the resolved connectivity words.
#[derive(Debug, Default)]
pub struct PartIndex {
    /// Element index to part id, one table per class.
    pub solid_part: Vec<i32>,
    pub shell_part: Vec<i32>,
    pub beam_part: Vec<i32>,
    pub thick_shell_part: Vec<i32>,

    /// Part id to ascending element indices, one table per class.
    pub solids_by_part: FnvHashMap<i32, Vec<usize>>,
    pub shells_by_part: FnvHashMap<i32, Vec<usize>>,
    pub beams_by_part: FnvHashMap<i32, Vec<usize>>,
    pub thick_shells_by_part: FnvHashMap<i32, Vec<usize>>,

    /// Every part id with at least one element of any class, ascending.
    pub part_ids: Vec<i32>,
}

impl PartIndex {
    pub fn build(mesh: &Mesh) -> PartIndex {
        let mut index = PartIndex {
            solid_part: Vec::with_capacity(mesh.solids.len()),
            shell_part: Vec::with_capacity(mesh.shells.len()),
            beam_part: Vec::with_capacity(mesh.beams.len()),
            thick_shell_part: Vec::with_capacity(mesh.thick_shells.len()),
            ..Default::default()
        };

        for (i, solid) in mesh.solids.iter().enumerate() {
            index.solid_part.push(solid.part);
            index.solids_by_part.entry(solid.part).or_default().push(i);
        }
        for (i, shell) in mesh.shells.iter().enumerate() {
            index.shell_part.push(shell.part);
            index.shells_by_part.entry(shell.part).or_default().push(i);
        }
        for (i, beam) in mesh.beams.iter().enumerate() {
            index.beam_part.push(beam.part);
            index.beams_by_part.entry(beam.part).or_default().push(i);
        }
        for (i, tshell) in mesh.thick_shells.iter().enumerate() {
            index.thick_shell_part.push(tshell.part);
            index
                .thick_shells_by_part
                .entry(tshell.part)
                .or_default()
                .push(i);
        }

        index.part_ids = index
            .solids_by_part
            .keys()
            .chain(index.shells_by_part.keys())
            .chain(index.beams_by_part.keys())
            .chain(index.thick_shells_by_part.keys())
            .copied()
            .unique()
            .sorted()
            .collect();

        let indexed: usize = [
            &index.solids_by_part,
            &index.shells_by_part,
            &index.beams_by_part,
            &index.thick_shells_by_part,
        ]
        .iter()
        .map(|t| t.values().map(Vec::len).sum::<usize>())
        .sum();
        debug_assert_eq!(
            indexed,
            mesh.solids.len() + mesh.shells.len() + mesh.beams.len() + mesh.thick_shells.len()
        );

        index
    }

    pub fn solid_elements(&self, part: i32) -> &[usize] {
        self.solids_by_part.get(&part).map_or(&[], Vec::as_slice)
    }

    pub fn shell_elements(&self, part: i32) -> &[usize] {
        self.shells_by_part.get(&part).map_or(&[], Vec::as_slice)
    }

    pub fn beam_elements(&self, part: i32) -> &[usize] {
        self.beams_by_part.get(&part).map_or(&[], Vec::as_slice)
    }

    pub fn thick_shell_elements(&self, part: i32) -> &[usize] {
        self.thick_shells_by_part.get(&part).map_or(&[], Vec::as_slice)
    }

    /// The deduplicated node set of a part: the union over its elements of
    /// every class, ascending.
    pub fn part_nodes(&self, mesh: &Mesh, part: i32) -> Vec<u32> {
        let solid_nodes = self
            .solid_elements(part)
            .iter()
            .flat_map(|&e| mesh.solids[e].nodes);
        let shell_nodes = self
            .shell_elements(part)
            .iter()
            .flat_map(|&e| mesh.shells[e].nodes);
        let beam_nodes = self
            .beam_elements(part)
            .iter()
            .flat_map(|&e| mesh.beams[e].nodes);
        let tshell_nodes = self
            .thick_shell_elements(part)
            .iter()
            .flat_map(|&e| mesh.thick_shells[e].nodes);
        solid_nodes
            .chain(shell_nodes)
            .chain(beam_nodes)
            .chain(tshell_nodes)
            .sorted()
            .dedup()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::geometry::{Beam, Node, Shell, Solid, ThickShell};

    fn mesh() -> Mesh {
        let mut m = Mesh::default();
        for i in 0..12 {
            m.nodes.push(Node {
                id: i + 1,
                x: 0.0,
                y: 0.0,
                z: 0.0,
            });
        }
        m.solids = vec![
            Solid {
                nodes: [0, 1, 2, 3, 4, 5, 6, 7],
                part: 2,
                material_type: 2,
            },
            Solid {
                nodes: [0, 1, 2, 3, 4, 5, 6, 8],
                part: 1,
                material_type: 1,
            },
            Solid {
                nodes: [0, 1, 2, 3, 4, 5, 6, 9],
                part: 2,
                material_type: 2,
            },
        ];
        m.shells = vec![Shell {
            nodes: [0, 1, 2, 3],
            part: 7,
            material_type: 7,
        }];
        m.beams = vec![Beam {
            nodes: [10, 11],
            part: 9,
            material_type: 9,
        }];
        m.thick_shells = vec![ThickShell {
            nodes: [0, 1, 2, 3, 4, 5, 6, 10],
            part: 2,
            material_type: 2,
        }];
        m
    }

    #[test]
    fn tables_are_consistent_across_all_classes() {
        let m = mesh();
        let idx = PartIndex::build(&m);
        assert_eq!(idx.part_ids, vec![1, 2, 7, 9]);
        assert_eq!(idx.solid_elements(2), &[0, 2]);
        assert_eq!(idx.solid_elements(1), &[1]);
        assert_eq!(idx.beam_elements(9), &[0]);
        assert_eq!(idx.thick_shell_elements(2), &[0]);
        assert_eq!(idx.solid_elements(99), &[] as &[usize]);

        let total: usize = idx
            .part_ids
            .iter()
            .map(|&p| {
                idx.solid_elements(p).len()
                    + idx.shell_elements(p).len()
                    + idx.beam_elements(p).len()
                    + idx.thick_shell_elements(p).len()
            })
            .sum();
        assert_eq!(
            total,
            m.solids.len() + m.shells.len() + m.beams.len() + m.thick_shells.len()
        );
    }

    #[test]
    fn part_nodes_are_deduplicated_union() {
        let m = mesh();
        let idx = PartIndex::build(&m);
        // Part 2 owns solids and a thick shell; node 10 arrives through the
        // thick shell only.
        assert_eq!(idx.part_nodes(&m, 2), vec![0, 1, 2, 3, 4, 5, 6, 7, 9, 10]);
        assert_eq!(idx.part_nodes(&m, 7), vec![0, 1, 2, 3]);
        // A beam-only part still has a node set.
        assert_eq!(idx.part_nodes(&m, 9), vec![10, 11]);
    }
}
