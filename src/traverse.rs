//! Ray casts against map lines. Every line whose segment the ray crosses is
//! reported once, nearest first, as a fraction of the ray's length.

use glam::IVec2;

use crate::fixed::{FRACUNIT, Fixed};
use crate::map::{BBox, Divline};
use crate::types::*;
use crate::world::World;

/// A line crossed by a ray.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Intercept {
    /// Distance along the ray, 0 at its start and `FRACUNIT` at its end.
    pub frac: Fixed,
    pub line: LineId,
}

/// The three box corners that lead a move of `(momx, momy)` from a box of
/// `radius` centred at `(x, y)`: the leading corner, then the two corners
/// that share one of its coordinates.
pub fn leading_corners(x: Fixed, y: Fixed, radius: Fixed, momx: Fixed, momy: Fixed) -> [(Fixed, Fixed); 3] {
    let (lead_x, trail_x) = if momx > 0 { (x + radius, x - radius) } else { (x - radius, x + radius) };
    let (lead_y, trail_y) = if momy > 0 { (y + radius, y - radius) } else { (y - radius, y + radius) };
    [(lead_x, lead_y), (trail_x, lead_y), (lead_x, trail_y)]
}

/// Lines crossed by the segment `(x1, y1) -> (x2, y2)`, sorted by distance
/// along it (ties by line index). A zero-length segment crosses nothing.
pub fn path_intercepts(world: &mut World, x1: Fixed, y1: Fixed, x2: Fixed, y2: Fixed) -> Vec<Intercept> {
    let start = IVec2::new(x1, y1);
    let end = IVec2::new(x2, y2);
    let trace = Divline::new(start, IVec2::new(x2.wrapping_sub(x1), y2.wrapping_sub(y1)));
    if trace.delta == IVec2::ZERO {
        return Vec::new();
    }

    world.blockmap.new_episode();
    let range = world.blockmap.cells(&BBox::of_points(start, end));
    let mut out = Vec::new();
    for lid in world.blockmap.collect_lines(range) {
        let line = world.map.line(lid);
        if trace.point_side(line.v1.x, line.v1.y) == trace.point_side(line.v2.x, line.v2.y) {
            continue;
        }
        let Some(frac) = trace.intercept(&line.divline()) else { continue };
        if !(0..=FRACUNIT).contains(&frac) {
            continue;
        }
        out.push(Intercept { frac, line: lid });
    }
    out.sort_by_key(|i| (i.frac, i.line));
    out
}

/// Walks the crossings of a segment nearest first. `visit` returns `false`
/// to stop; the walk then returns `false` as well.
pub fn path_traverse<F>(world: &mut World, x1: Fixed, y1: Fixed, x2: Fixed, y2: Fixed, mut visit: F) -> bool
where
    F: FnMut(&mut World, Intercept) -> bool,
{
    for hit in path_intercepts(world, x1, y1, x2, y2) {
        if !visit(world, hit) {
            return false;
        }
    }
    true
}
