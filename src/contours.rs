use image::{GrayImage, imageops};
use imageproc::{
    contours::{BorderType, Contour, find_contours},
    point::Point,
};
use num_traits::AsPrimitive;

use crate::mask::MaskMatrix;

/// Ordered outline of (part of) a lesion, in mask-grid coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct ContourPath {
    pub points: Vec<Point<f32>>,
    /// The last point connects back to the first.
    pub closed: bool,
}

impl ContourPath {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn perimeter(&self) -> f64 {
        perimeter(&self.points, self.closed)
    }
}

/// Contour builder output for one boundary point set.
#[derive(Debug, Clone, PartialEq)]
pub enum Outline {
    /// Too few points for a path; draw each one as a dot.
    Dots(Vec<Point<f32>>),
    /// A chained path, plus the boundary points the chain never reached.
    Path {
        path: ContourPath,
        stragglers: Vec<Point<f32>>,
    },
}

/// Parameters of the nearest-neighbour chain.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChainOptions {
    /// Maximum (exclusive) distance between consecutive path points, in grid cells.
    pub threshold: f32,
    /// Target point count after stride simplification.
    pub sample_cap: usize,
    /// Paths with more points than this are simplified and may be closed.
    pub min_simplify_len: usize,
}

impl Default for ChainOptions {
    fn default() -> Self {
        Self {
            threshold: 1.5,
            sample_cap: 150,
            min_simplify_len: 10,
        }
    }
}

fn distance_squared(a: Point<f32>, b: Point<f32>) -> f32 {
    let dx = a.x - b.x;
    let dy = a.y - b.y;
    dx * dx + dy * dy
}

/// Orders an unordered boundary point set into a path by greedy nearest-neighbour chaining.
///
/// Starting at the point with the smallest `x + y`, the path repeatedly moves to the
/// closest unvisited point, as long as it is closer than `options.threshold`. Ties are
/// broken by input position, so the result is fully determined by the input.
///
/// This is O(N²) and an approximation: on masks with holes or several blobs the chain
/// stops at the first gap wider than the threshold (the rest are returned as
/// stragglers) or hops between components that are closer than it.
///
/// # Arguments
///
/// * `points`: The unordered boundary point set, usually from
///   [`extract_edges`](crate::edges::extract_edges).
/// * `options`: Jump threshold and simplification parameters.
///
/// # Returns
///
/// [`Outline::Dots`] for sets of two points or fewer. Otherwise [`Outline::Path`] with
/// the chained (and possibly strided) path and every point the chain never reached.
pub fn order_points(points: &[Point<f32>], options: &ChainOptions) -> Outline {
    let n = points.len();
    if n <= 2 {
        return Outline::Dots(points.to_vec());
    }

    let mut start = 0;
    for (i, p) in points.iter().enumerate().skip(1) {
        if p.x + p.y < points[start].x + points[start].y {
            start = i;
        }
    }

    let max_distance_squared = options.threshold * options.threshold;
    let mut visited = vec![false; n];
    let mut chain = Vec::with_capacity(n);
    visited[start] = true;
    chain.push(start);
    let mut current = start;

    while chain.len() < n {
        let mut best: Option<(usize, f32)> = None;
        for (i, p) in points.iter().enumerate() {
            if visited[i] {
                continue;
            }
            let d = distance_squared(points[current], *p);
            if d >= max_distance_squared {
                continue;
            }
            if best.is_none_or(|(_, best_d)| d < best_d) {
                best = Some((i, d));
            }
        }
        let Some((next, _)) = best else {
            break;
        };
        visited[next] = true;
        chain.push(next);
        current = next;
    }

    let long = chain.len() > options.min_simplify_len;
    let closed = long
        && distance_squared(points[chain[0]], points[current]) < max_distance_squared;
    let stride = if long {
        (chain.len() / options.sample_cap.max(1)).max(1)
    } else {
        1
    };

    let path = ContourPath {
        points: chain.iter().step_by(stride).map(|&i| points[i]).collect(),
        closed,
    };
    let stragglers = points
        .iter()
        .zip(&visited)
        .filter(|&(_, &seen)| !seen)
        .map(|(p, _)| *p)
        .collect();

    Outline::Path { path, stragglers }
}

/// Traces the outer border of every connected component of `mask`.
///
/// The grid is framed with one row and column of outside cells before tracing,
/// so components touching the grid edge get an outer border like any other.
/// Each border is converted to cell centres, stride-simplified the same way as
/// a chained path, and closed.
///
/// # Arguments
///
/// * `mask`: The lesion mask to trace.
/// * `sample_cap`: Target point count of each simplified border.
/// * `min_simplify_len`: Borders with more points than this are simplified.
///
/// # Returns
///
/// One [`ContourPath`] per connected component, longest perimeter first. A blank
/// mask yields an empty vector.
pub fn trace_borders(
    mask: &MaskMatrix,
    sample_cap: usize,
    min_simplify_len: usize,
) -> Vec<ContourPath> {
    let grid = mask.as_gray();
    let mut framed = GrayImage::new(grid.width() + 2, grid.height() + 2);
    imageops::replace(&mut framed, grid, 1, 1);

    let outer: Vec<Contour<i32>> = find_contours::<i32>(&framed)
        .into_iter()
        .filter(|c| c.border_type == BorderType::Outer && !c.points.is_empty())
        .collect();

    sort_by_perimeters_owned(outer)
        .into_iter()
        .map(|(contour, _)| {
            let len = contour.points.len();
            let stride = if len > min_simplify_len {
                (len / sample_cap.max(1)).max(1)
            } else {
                1
            };
            // Framed pixel `p` is grid cell `p - 1`, whose centre is at `p - 0.5`.
            let points: Vec<Point<f32>> = contour
                .points
                .iter()
                .step_by(stride)
                .map(|p| Point::new(p.x as f32 - 0.5, p.y as f32 - 0.5))
                .collect();
            ContourPath {
                closed: points.len() > 2,
                points,
            }
        })
        .collect()
}

/// Length of the polyline through `points`, including the closing segment when `closed`.
///
/// # Arguments
///
/// * `points`: Polyline vertices in drawing order.
/// * `closed`: Whether the last point connects back to the first. The closing segment
///   is only counted for three points or more.
///
/// # Returns
///
/// The sum of Euclidean segment lengths as `f64`; `0.0` for fewer than two points.
pub fn perimeter<T>(points: &[Point<T>], closed: bool) -> f64
where
    T: Copy + AsPrimitive<f64>,
{
    let open: f64 = points
        .windows(2)
        .map(|w| segment_length(w[0], w[1]))
        .sum();
    match (closed, points.first(), points.last()) {
        (true, Some(&first), Some(&last)) if points.len() > 2 => open + segment_length(last, first),
        _ => open,
    }
}

fn segment_length<T: Copy + AsPrimitive<f64>>(p1: Point<T>, p2: Point<T>) -> f64 {
    let dx: f64 = p2.x.as_() - p1.x.as_();
    let dy: f64 = p2.y.as_() - p1.y.as_();
    dx.hypot(dy)
}

/// Calculates the closed perimeter of each contour and sorts them in descending order.
///
/// Takes ownership of the input so contours are moved, not cloned, into the result.
/// The sort is stable, so contours of equal perimeter keep their tracing order.
///
/// # Type Parameters
///
/// * `T`: The numeric type of the contour coordinates, convertible to `f64`.
///
/// # Arguments
///
/// * `contours`: A `Vec<Contour<T>>` which will be consumed by the function.
///
/// # Returns
///
/// A `Vec<(Contour<T>, f64)>` sorted by perimeter in descending order.
/// Contours with 0 or 1 point have a perimeter of `0.0`.
pub fn sort_by_perimeters_owned<T>(contours: Vec<Contour<T>>) -> Vec<(Contour<T>, f64)>
where
    T: Copy + AsPrimitive<f64>,
{
    let mut contours_with_perimeters: Vec<(Contour<T>, f64)> = contours
        .into_iter()
        .map(|contour| {
            let length = perimeter(&contour.points, true);
            (contour, length)
        })
        .collect();

    contours_with_perimeters.sort_by(|a, b| b.1.total_cmp(&a.1));

    contours_with_perimeters
}
