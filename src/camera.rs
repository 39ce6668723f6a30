//! Chase-camera clipping.
//!
//! Cameras are not entities: they never touch things, ignore line flags and
//! never step up while sliding. Sectors may lend the camera other heights
//! (`camera_heights`) or let it pass freely (`CAMERA_NOCLIP`).

use glam::IVec2;
use tracing::debug;

use crate::deflect::clip_to_wall;
use crate::fixed::{FRACUNIT, Fixed, fixed_mul};
use crate::map::{BBox, Map};
use crate::narrowphase::{ceiling_under, floor_under, midpoint_deltas};
use crate::traverse::{leading_corners, path_traverse};
use crate::types::*;
use crate::world::World;

const SLIDE_FUDGE: Fixed = 0x800;
const MAX_HITS: u32 = 3;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Camera {
    pub x: Fixed,
    pub y: Fixed,
    pub z: Fixed,
    pub radius: Fixed,
    pub height: Fixed,
    pub floor_z: Fixed,
    pub ceiling_z: Fixed,
    pub momx: Fixed,
    pub momy: Fixed,
    pub momz: Fixed,
    pub sector: SectorId,
    /// Follows a no-clipping player: moves are never refused.
    pub noclip: bool,
}

impl Camera {
    /// A camera at rest with its floor and ceiling read from the map.
    pub fn new(world: &World, x: Fixed, y: Fixed, z: Fixed, radius: Fixed, height: Fixed) -> Self {
        let sector = world.sector_at(x, y);
        let (floor_z, ceiling_z) = camera_heights(&world.map, sector, x, y, radius);
        Self { x, y, z, radius, height, floor_z, ceiling_z, momx: 0, momy: 0, momz: 0, sector, noclip: false }
    }
}

/// Result of [`check_camera_position`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CameraCheck {
    pub blocked: bool,
    pub floor_z: Fixed,
    pub ceiling_z: Fixed,
    pub dropoff_z: Fixed,
    pub dropoff_ceiling_z: Fixed,
    pub blocking_line: Option<LineId>,
    pub ceiling_line: Option<LineId>,
}

impl CameraCheck {
    #[inline]
    pub fn headroom(&self) -> Fixed {
        self.ceiling_z.saturating_sub(self.floor_z)
    }
}

/// Floor and ceiling the camera sees in `sector`.
fn camera_heights(map: &Map, sector: SectorId, x: Fixed, y: Fixed, radius: Fixed) -> (Fixed, Fixed) {
    match map.sector(sector).camera_heights {
        Some(alt) => {
            let s = map.sector(alt);
            (s.floor_height, s.ceiling_height)
        }
        None => (floor_under(map, sector, x, y, radius), ceiling_under(map, sector, x, y, radius)),
    }
}

fn is_camera_noclip(map: &Map, sector: SectorId) -> bool {
    map.sector(sector).flags.contains(SectorFlags::CAMERA_NOCLIP)
}

/// Slabs of `sector` the camera collides with, as (top, bottom) at `(x, y)`.
fn camera_slabs(map: &Map, sector: SectorId, x: Fixed, y: Fixed) -> Vec<(Fixed, Fixed)> {
    map.sector(sector)
        .sub_surfaces
        .iter()
        .filter(|sub| {
            sub.flags.contains(SubSurfaceFlags::EXISTS | SubSurfaceFlags::BLOCK_OTHERS)
                && !is_camera_noclip(map, sub.control)
        })
        .map(|sub| map.sub_surface_span(sub, x, y))
        .collect()
}

struct CameraOpening {
    top: Fixed,
    bottom: Fixed,
    range: Fixed,
    high_ceiling: Fixed,
    low_floor: Fixed,
}

/// Vertical gap of a two-sided line as the camera sees it.
fn camera_line_opening(map: &Map, cam: &Camera, lid: LineId) -> Option<CameraOpening> {
    let line = map.line(lid);
    let back = line.back?;
    let p = line.closest_point(cam.x, cam.y);
    let (ff, fc) = camera_heights(map, line.front, p.x, p.y, 0);
    let (bf, bc) = camera_heights(map, back, p.x, p.y, 0);

    let mut o = CameraOpening {
        top: fc.min(bc),
        bottom: ff.max(bf),
        range: 0,
        high_ceiling: fc.max(bc),
        low_floor: ff.min(bf),
    };
    let cam_top = cam.z.saturating_add(cam.height);
    for sector in [line.front, back] {
        for (top, bottom) in camera_slabs(map, sector, p.x, p.y) {
            let (d1, d2) = midpoint_deltas(cam.z, cam_top, top, bottom);
            if d1 >= d2 {
                o.top = o.top.min(bottom);
            } else {
                o.bottom = o.bottom.max(top);
            }
        }
    }
    o.range = o.top.saturating_sub(o.bottom);
    Some(o)
}

/// Evaluates the camera at `(x, y)`: floor and ceiling from the containing
/// sector, its slabs and solid polyobjects, narrowed by every line the
/// camera box crosses.
pub fn check_camera_position(world: &mut World, cam: &Camera, x: Fixed, y: Fixed) -> CameraCheck {
    let sector = world.sector_at(x, y);
    let map = &world.map;

    if is_camera_noclip(map, sector) {
        let top = cam.z.saturating_add(cam.height);
        return CameraCheck { floor_z: cam.z, dropoff_z: cam.z, ceiling_z: top, dropoff_ceiling_z: top, ..Default::default() };
    }

    let (floor_z, ceiling_z) = camera_heights(map, sector, x, y, cam.radius);
    let mut check = CameraCheck {
        floor_z,
        dropoff_z: floor_z,
        ceiling_z,
        dropoff_ceiling_z: ceiling_z,
        ..Default::default()
    };

    let cam_top = cam.z.saturating_add(cam.height);
    for (top, bottom) in camera_slabs(map, sector, x, y) {
        let (d1, d2) = midpoint_deltas(cam.z, cam_top, top, bottom);
        if top > check.floor_z && d1 < d2 {
            check.floor_z = top;
            check.dropoff_z = top;
        }
        if bottom < check.ceiling_z && d1 >= d2 {
            check.ceiling_z = bottom;
            check.dropoff_ceiling_z = bottom;
        }
    }

    let bbox = BBox::around(x, y, cam.radius);
    let range = world.blockmap.cells(&bbox);

    world.blockmap.new_episode();
    for cell in range.iter() {
        let polys = world.blockmap.polys_in(cell).to_vec();
        for pid in polys {
            if !world.blockmap.visit_poly(pid) {
                continue;
            }
            let map = &world.map;
            let poly = map.poly(pid);
            if !poly.flags.contains(PolyFlags::SOLID) || !map.poly_contains_point(pid, x, y) || is_camera_noclip(map, poly.control) {
                continue;
            }
            let control = map.sector(poly.control);
            let (top, bottom) = if poly.flags.contains(PolyFlags::CLIP_PLANES) {
                (control.ceiling_height, control.floor_height)
            } else {
                (i32::MAX, i32::MIN)
            };
            let (d1, d2) = midpoint_deltas(cam.z, cam_top, top, bottom);
            if top > check.floor_z && d1 < d2 {
                check.floor_z = top;
                check.dropoff_z = top;
            }
            if bottom < check.ceiling_z && d1 >= d2 {
                check.ceiling_z = bottom;
                check.dropoff_ceiling_z = bottom;
            }
        }
    }

    world.blockmap.new_episode();
    for lid in world.blockmap.collect_lines(range) {
        let map = &world.map;
        let line = map.line(lid);
        if line.polyobject.is_some_and(|p| !map.poly(p).flags.contains(PolyFlags::SOLID)) {
            continue;
        }
        if !bbox.touches(&line.bbox) || line.box_side(&bbox) != -1 {
            continue;
        }
        check.blocking_line = Some(lid);
        if line.back.is_none() {
            if line.point_side(cam.x, cam.y) == 1 {
                continue;
            }
            check.blocked = true;
            return check;
        }
        let Some(o) = camera_line_opening(map, cam, lid) else { continue };
        if o.top < check.ceiling_z {
            check.ceiling_z = o.top;
            check.ceiling_line = Some(lid);
        }
        if o.bottom > check.floor_z {
            check.floor_z = o.bottom;
        }
        if o.high_ceiling > check.dropoff_ceiling_z {
            check.dropoff_ceiling_z = o.high_ceiling;
        }
        if o.low_floor < check.dropoff_z {
            check.dropoff_z = o.low_floor;
        }
    }
    check
}

/// Moves the camera to `(x, y)` in `max_radius` sub-steps. Returns `false`
/// and leaves the camera in place when a sub-step is refused.
pub fn try_camera_move(world: &mut World, cam: &mut Camera, x: Fixed, y: Fixed) -> bool {
    let sector = world.sector_at(x, y);
    if cam.noclip {
        cam.floor_z = cam.z;
        cam.ceiling_z = cam.z.saturating_add(cam.height);
        cam.x = x;
        cam.y = y;
        cam.sector = sector;
        return true;
    }

    let step = world.cfg.max_radius.max(FRACUNIT);
    let (mut try_x, mut try_y) = (cam.x, cam.y);
    let check = loop {
        try_x = approach(try_x, x, step);
        try_y = approach(try_y, y, step);

        let check = check_camera_position(world, cam, try_x, try_y);
        if check.blocked || check.headroom() < cam.height {
            return false;
        }
        if check.ceiling_z.saturating_sub(cam.z) < cam.height {
            if sector == cam.sector && check.ceiling_z >= cam.z {
                cam.floor_z = check.floor_z;
                cam.ceiling_z = check.floor_z.saturating_add(cam.height);
                cam.x = x;
                cam.y = y;
                cam.sector = sector;
                return true;
            }
            return false;
        }
        if check.floor_z.saturating_sub(cam.z) > world.cfg.max_step_move {
            return false;
        }
        if try_x == x && try_y == y {
            break check;
        }
    };

    cam.floor_z = check.floor_z;
    cam.ceiling_z = check.ceiling_z;
    cam.x = x;
    cam.y = y;
    cam.sector = sector;
    true
}

#[inline]
fn approach(from: Fixed, to: Fixed, step: Fixed) -> Fixed {
    let delta = to as i64 - from as i64;
    if delta > step as i64 {
        from + step
    } else if delta < -(step as i64) {
        from - step
    } else {
        to
    }
}

/// Whether `lid` stops a sliding camera. Cameras never step up.
fn line_blocks_camera(map: &Map, cam: &Camera, lid: LineId) -> bool {
    let line = map.line(lid);
    if line.back.is_none() {
        return line.point_side(cam.x, cam.y) == 0;
    }
    let Some(o) = camera_line_opening(map, cam, lid) else { return true };
    o.range < cam.height || o.top.saturating_sub(cam.z) < cam.height || o.bottom.saturating_sub(cam.z) > 0
}

fn find_camera_wall(world: &mut World, cam: &Camera) -> Option<(Fixed, LineId)> {
    let mut best: Option<(Fixed, LineId)> = None;
    for (sx, sy) in leading_corners(cam.x, cam.y, cam.radius, cam.momx, cam.momy) {
        path_traverse(world, sx, sy, sx + cam.momx, sy + cam.momy, |world, hit| {
            if !line_blocks_camera(&world.map, cam, hit.line) {
                return true;
            }
            if best.is_none_or(|(frac, _)| hit.frac < frac) {
                best = Some((hit.frac, hit.line));
            }
            false
        });
    }
    best
}

/// Slides the camera along the nearest wall in its path.
pub fn slide_camera_move(world: &mut World, cam: &mut Camera) {
    let mut hits = 0;
    loop {
        hits += 1;
        if hits == MAX_HITS {
            // the last attempt failed, so only the x axis is left to try
            debug!("camera slide fell back to stair-stepping");
            try_camera_move(world, cam, cam.x + cam.momx, cam.y);
            return;
        }

        let Some((frac, lid)) = find_camera_wall(world, cam) else {
            if !try_camera_move(world, cam, cam.x, cam.y + cam.momy) {
                try_camera_move(world, cam, cam.x + cam.momx, cam.y);
            }
            return;
        };

        let best = frac - SLIDE_FUDGE;
        if best > 0 {
            let (nx, ny) = (cam.x + fixed_mul(cam.momx, best), cam.y + fixed_mul(cam.momy, best));
            if !try_camera_move(world, cam, nx, ny) {
                try_camera_move(world, cam, cam.x + cam.momx, cam.y);
                return;
            }
        }

        let remainder = (FRACUNIT - (best + SLIDE_FUDGE)).min(FRACUNIT);
        if remainder <= 0 {
            return;
        }
        let wall = world.map.line(lid).divline();
        let (tmx, tmy) = clip_to_wall(&wall, fixed_mul(cam.momx, remainder), fixed_mul(cam.momy, remainder));
        cam.momx = tmx;
        cam.momy = tmy;
        if try_camera_move(world, cam, cam.x + tmx, cam.y + tmy) {
            return;
        }
    }
}

/// Sector the camera would be in at `v`.
#[inline]
pub fn camera_sector_at(world: &World, v: IVec2) -> SectorId {
    world.sector_at(v.x, v.y)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixed::units;
    use crate::map::Sector;
    use crate::test_level::{RoomRow, world_of};

    fn cam_at(w: &World, x: Fixed, y: Fixed) -> Camera {
        Camera::new(w, x, y, units(8), units(20), units(16))
    }

    #[test]
    fn test_outer_wall_blocks_camera() {
        let mut w = world_of(RoomRow::new(units(256)).room(units(256), 0, units(128)).build());
        let mut cam = cam_at(&w, units(200), units(128));
        assert!(!try_camera_move(&mut w, &mut cam, units(300), units(128)));
        assert_eq!(cam.x, units(200));
        assert!(try_camera_move(&mut w, &mut cam, units(220), units(140)));
        assert_eq!((cam.x, cam.y, cam.floor_z, cam.ceiling_z), (units(220), units(140), 0, units(128)));
    }

    #[test]
    fn test_high_step_blocks_camera() {
        let mut w = world_of(
            RoomRow::new(units(128))
                .room(units(256), 0, units(128))
                .room(units(256), units(64), units(128))
                .build(),
        );
        let mut cam = cam_at(&w, units(200), units(64));
        assert!(!try_camera_move(&mut w, &mut cam, units(300), units(64)));
        let check = check_camera_position(&mut w, &cam, units(250), units(64));
        assert!(!check.blocked);
        assert_eq!(check.floor_z, units(64));
        assert_eq!(check.dropoff_z, 0);
    }

    #[test]
    fn test_one_sided_wall_passes_from_behind() {
        let mut parts = RoomRow::new(units(256)).room(units(256), 0, units(128)).parts();
        // front side faces +x
        parts.add_wall(IVec2::new(units(128), units(64)), IVec2::new(units(128), units(192)), SectorId(0));
        let mut w = world_of(parts.build());

        let mut behind = cam_at(&w, units(100), units(128));
        assert!(try_camera_move(&mut w, &mut behind, units(160), units(128)));

        let mut front = cam_at(&w, units(160), units(128));
        assert!(!try_camera_move(&mut w, &mut front, units(100), units(128)));
    }

    #[test]
    fn test_camera_noclip_sector() {
        let mut parts = RoomRow::new(units(256)).room(units(256), 0, units(128)).parts();
        parts.sectors[0] = Sector::new(0, units(128)).with_flags(SectorFlags::CAMERA_NOCLIP);
        let mut w = world_of(parts.build());
        let cam = cam_at(&w, units(200), units(128));
        let check = check_camera_position(&mut w, &cam, units(250), units(128));
        assert!(!check.blocked);
        assert_eq!((check.floor_z, check.ceiling_z), (units(8), units(24)));
    }

    #[test]
    fn test_camera_height_sector_overrides() {
        let mut parts = RoomRow::new(units(256)).room(units(256), 0, units(128)).parts();
        let alt = parts.add_sector(Sector::new(-units(32), units(256)));
        parts.sectors[0].camera_heights = Some(alt);
        let mut w = world_of(parts.build());
        let cam = cam_at(&w, units(100), units(100));
        assert_eq!((cam.floor_z, cam.ceiling_z), (-units(32), units(256)));
        let check = check_camera_position(&mut w, &cam, units(120), units(100));
        assert_eq!(check.floor_z, -units(32));
    }

    #[test]
    fn test_noclip_camera_always_moves() {
        let mut w = world_of(RoomRow::new(units(256)).room(units(256), 0, units(128)).build());
        let mut cam = cam_at(&w, units(200), units(128));
        cam.noclip = true;
        assert!(try_camera_move(&mut w, &mut cam, units(300), units(128)));
        assert_eq!((cam.floor_z, cam.ceiling_z), (units(8), units(24)));
    }

    #[test]
    fn test_low_ceiling_clamps_in_same_sector() {
        let mut w = world_of(RoomRow::new(units(256)).room(units(256), 0, units(30)).build());
        let mut cam = cam_at(&w, units(100), units(100));
        cam.z = units(20);
        assert!(try_camera_move(&mut w, &mut cam, units(120), units(100)));
        assert_eq!((cam.floor_z, cam.ceiling_z), (0, units(16)));
    }

    #[test]
    #[ntest::timeout(1000)]
    fn test_camera_slides_along_wall() {
        let mut w = world_of(RoomRow::new(units(256)).room(units(256), 0, units(128)).build());
        let mut cam = cam_at(&w, units(230), units(128));
        cam.momx = units(40);
        cam.momy = units(10);
        slide_camera_move(&mut w, &mut cam);
        assert_eq!(cam.momx, 0);
        assert!(cam.y > units(128));
        assert!(cam.x + cam.radius <= units(256));
        assert_eq!(camera_sector_at(&w, IVec2::new(cam.x, cam.y)), SectorId(0));
    }
}
