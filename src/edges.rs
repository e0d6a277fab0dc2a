use imageproc::point::Point;

use crate::mask::MaskMatrix;

const NEIGHBOURS: [(i64, i64); 4] = [(1, 0), (-1, 0), (0, 1), (0, -1)];

/// Collects the boundary cells of `mask` as cell-centre points in grid coordinates.
///
/// A set cell is on the boundary when one of its four axis neighbours is unset
/// or lies outside the grid. Points come out in row-major order; callers must
/// not rely on any geometric ordering.
pub fn extract_edges(mask: &MaskMatrix) -> Vec<Point<f32>> {
    let (width, height) = (mask.width() as i64, mask.height() as i64);
    let mut edges = Vec::new();

    for y in 0..height {
        for x in 0..width {
            if !mask.is_set(x, y) {
                continue;
            }
            let touches_outside = NEIGHBOURS
                .iter()
                .any(|&(dx, dy)| !mask.is_set(x + dx, y + dy));
            if touches_outside {
                edges.push(Point::new(x as f32 + 0.5, y as f32 + 0.5));
            }
        }
    }

    edges
}
