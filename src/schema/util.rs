//! Geometry helpers shared by the typed schema views: topology
//! validation, fan triangulation, normal derivation, and the coordinate
//! conversions driven by import/export configuration.

use glam::{Mat4, Quat, Vec2, Vec3};

use crate::engine::Decoded;
use crate::util::{Aabb, Error, Result};
use crate::value::Value;

use super::mesh::SubmeshData;

/// Collapse a decoded property to one value: the bracketing pair is
/// interpolated when linear interpolation applies, otherwise the held
/// sample wins. Non-numeric payloads always hold (see [`Value::lerp`]).
pub(crate) fn resolve_decoded(d: Decoded, interpolate: bool) -> Value {
    match (interpolate, d.bracket) {
        (true, Some((next, alpha))) => Value::lerp(&d.held, &next, alpha),
        _ => d.held,
    }
}

/// Check face-vertex counts and indices against a point count.
pub fn validate_topology(num_points: usize, counts: &[i32], indices: &[i32]) -> Result<()> {
    let expected: usize = counts.iter().map(|&c| c.max(0) as usize).sum();
    if counts.iter().any(|&c| c < 3) {
        return Err(Error::arg("face-vertex counts must be >= 3"));
    }
    if expected != indices.len() {
        return Err(Error::arg(format!(
            "face-vertex counts sum to {expected} but {} indices were supplied",
            indices.len()
        )));
    }
    if indices.iter().any(|&i| i < 0 || i as usize >= num_points) {
        return Err(Error::arg("face-vertex index out of range"));
    }
    Ok(())
}

/// Mirror points across the YZ plane (handedness conversion).
pub fn swap_handedness_points(points: &mut [Vec3]) {
    for p in points {
        p.x = -p.x;
    }
}

/// Handedness conversion for a rotation: conjugation by the X mirror.
pub fn swap_handedness_quat(q: Quat) -> Quat {
    Quat::from_xyzw(q.x, -q.y, -q.z, q.w)
}

/// Handedness conversion for a full transform matrix.
pub fn swap_handedness_matrix(m: Mat4) -> Mat4 {
    let flip = Mat4::from_scale(Vec3::new(-1.0, 1.0, 1.0));
    flip * m * flip
}

/// Reverse the vertex order of every face (winding conversion).
pub fn reverse_winding(counts: &[i32], indices: &mut [i32]) {
    let mut offset = 0usize;
    for &c in counts {
        let c = c.max(0) as usize;
        if offset + c > indices.len() {
            break;
        }
        indices[offset..offset + c].reverse();
        offset += c;
    }
}

/// Fan-triangulate polygon faces into a flat triangle index list.
pub fn triangulate_fan(counts: &[i32], indices: &[i32]) -> Vec<i32> {
    let num_triangles: usize = counts.iter().map(|&c| (c.max(2) as usize) - 2).sum();
    let mut out = Vec::with_capacity(num_triangles * 3);
    let mut offset = 0usize;
    for &c in counts {
        let c = c.max(0) as usize;
        if offset + c > indices.len() {
            break;
        }
        for i in 1..c.saturating_sub(1) {
            out.push(indices[offset]);
            out.push(indices[offset + i]);
            out.push(indices[offset + i + 1]);
        }
        offset += c;
    }
    out
}

/// Derive per-point normals by accumulating area-weighted face normals.
pub fn compute_vertex_normals(points: &[Vec3], counts: &[i32], indices: &[i32]) -> Vec<Vec3> {
    let mut normals = vec![Vec3::ZERO; points.len()];
    let mut offset = 0usize;
    for &c in counts {
        let c = c.max(0) as usize;
        if c >= 3 && offset + c <= indices.len() {
            let i0 = indices[offset] as usize;
            let i1 = indices[offset + 1] as usize;
            let i2 = indices[offset + 2] as usize;
            if i0 < points.len() && i1 < points.len() && i2 < points.len() {
                let face = (points[i1] - points[i0]).cross(points[i2] - points[i0]);
                for &idx in &indices[offset..offset + c] {
                    if let Some(n) = normals.get_mut(idx as usize) {
                        *n += face;
                    }
                }
            }
        }
        offset += c;
    }
    for n in &mut normals {
        *n = n.normalize_or_zero();
    }
    normals
}

/// Vertex budget per submesh, chosen for callers that index with u16.
pub const SUBMESH_MAX_POINTS: usize = 65_535;

/// Partition a triangulated mesh into submeshes of bounded vertex count.
///
/// Each submesh gathers its own point/normal/uv subset with local
/// indices and carries its own bounds.
pub fn split_submeshes(
    points: &[Vec3],
    normals: Option<&[Vec3]>,
    uvs: Option<&[Vec2]>,
    triangles: &[i32],
    max_points: usize,
) -> Vec<SubmeshData> {
    let mut out = Vec::new();
    let mut remap: Vec<i32> = vec![-1; points.len()];
    let mut current = SubmeshData::default();

    let mut flush = |sub: &mut SubmeshData, remap: &mut Vec<i32>| {
        if !sub.indices.is_empty() {
            sub.bounds = Aabb::from_points(&sub.points);
            out.push(std::mem::take(sub));
            remap.fill(-1);
        }
    };

    for tri in triangles.chunks_exact(3) {
        // Close the submesh when this triangle cannot fit.
        let fresh = tri
            .iter()
            .filter(|&&i| remap.get(i as usize).copied() == Some(-1))
            .count();
        if current.points.len() + fresh > max_points {
            flush(&mut current, &mut remap);
        }
        for &i in tri {
            let src = i as usize;
            if src >= points.len() {
                continue;
            }
            let local = if remap[src] >= 0 {
                remap[src]
            } else {
                let local = current.points.len() as i32;
                remap[src] = local;
                current.points.push(points[src]);
                if let Some(n) = normals {
                    current.normals.push(n[src]);
                }
                if let Some(u) = uvs {
                    current.uvs.push(u[src]);
                }
                local
            };
            current.indices.push(local);
        }
    }
    flush(&mut current, &mut remap);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quad() -> (Vec<Vec3>, Vec<i32>, Vec<i32>) {
        let points = vec![
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(1.0, 1.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
        ];
        (points, vec![4], vec![0, 1, 2, 3])
    }

    #[test]
    fn test_validate_topology() {
        let (points, counts, indices) = quad();
        assert!(validate_topology(points.len(), &counts, &indices).is_ok());
        assert!(validate_topology(points.len(), &[3], &indices).is_err());
        assert!(validate_topology(2, &counts, &indices).is_err());
        assert!(validate_topology(points.len(), &[2, 2], &indices).is_err());
    }

    #[test]
    fn test_reverse_winding_roundtrip() {
        let (_, counts, indices) = quad();
        let mut swapped = indices.clone();
        reverse_winding(&counts, &mut swapped);
        assert_eq!(swapped, vec![3, 2, 1, 0]);
        reverse_winding(&counts, &mut swapped);
        assert_eq!(swapped, indices);
    }

    #[test]
    fn test_triangulate_fan() {
        let (_, counts, indices) = quad();
        let tris = triangulate_fan(&counts, &indices);
        assert_eq!(tris, vec![0, 1, 2, 0, 2, 3]);

        // A triangle is already minimal.
        assert_eq!(triangulate_fan(&[3], &[0, 1, 2]), vec![0, 1, 2]);
    }

    #[test]
    fn test_swap_handedness_involutive() {
        let q = Quat::from_rotation_y(1.0);
        assert!(swap_handedness_quat(swap_handedness_quat(q)).abs_diff_eq(q, 1e-6));

        let m = Mat4::from_translation(Vec3::new(1.0, 2.0, 3.0));
        let twice = swap_handedness_matrix(swap_handedness_matrix(m));
        assert!(twice.abs_diff_eq(m, 1e-6));
    }

    #[test]
    fn test_vertex_normals_planar() {
        let (points, counts, indices) = quad();
        let normals = compute_vertex_normals(&points, &counts, &indices);
        assert_eq!(normals.len(), 4);
        for n in normals {
            assert!(n.abs_diff_eq(Vec3::Z, 1e-5));
        }
    }

    #[test]
    fn test_split_submeshes_budget() {
        let (points, counts, indices) = quad();
        let tris = triangulate_fan(&counts, &indices);
        // Budget of 3 points per submesh forces one submesh per triangle.
        let subs = split_submeshes(&points, None, None, &tris, 3);
        assert_eq!(subs.len(), 2);
        for sub in &subs {
            assert_eq!(sub.points.len(), 3);
            assert_eq!(sub.indices, vec![0, 1, 2]);
        }
    }

    #[test]
    fn test_split_submeshes_single() {
        let (points, counts, indices) = quad();
        let tris = triangulate_fan(&counts, &indices);
        let subs = split_submeshes(&points, None, None, &tris, SUBMESH_MAX_POINTS);
        assert_eq!(subs.len(), 1);
        assert_eq!(subs[0].points.len(), 4);
        assert_eq!(subs[0].indices.len(), 6);
    }
}
