//! Position validity: floor and ceiling bounds at a candidate point against
//! sectors, sub-surfaces, polyobjects, entities and lines.

use glam::IVec2;
use tracing::debug;

use crate::api::GameHooks;
use crate::entity::Entity;
use crate::fixed::{Fixed, fine_cos, fine_sin, fixed_mul};
use crate::interaction::{self, Verdict};
use crate::map::{BBox, Divline, Line, Map, SubSurface};
use crate::types::*;
use crate::world::World;

/// Result of evaluating one candidate position.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PositionCheck {
    pub x: Fixed,
    pub y: Fixed,
    pub bbox: BBox,
    /// Sector containing the candidate point.
    pub sector: SectorId,
    /// Some entity or line refused the position.
    pub blocked: bool,

    pub floor_z: Fixed,
    pub ceiling_z: Fixed,
    /// Lowest floor seen across contacted lines.
    pub dropoff_z: Fixed,
    /// Highest ceiling seen across contacted lines.
    pub dropoff_ceiling_z: Fixed,
    pub floor_surface: Surface,
    pub ceiling_surface: Surface,
    pub floor_slope: Option<SlopeId>,
    pub ceiling_slope: Option<SlopeId>,
    pub floor_pic: u32,
    pub ceiling_pic: u32,
    /// How far the floor rises above the entity's feet.
    pub floor_step: Fixed,
    /// How far the ceiling dips below the entity's head.
    pub ceiling_step: Fixed,

    /// Entity whose top became the floor (or whose bottom became the ceiling).
    pub floor_thing: Option<EntityId>,
    pub hit_thing: Option<EntityId>,
    /// Last line contacted.
    pub blocking_line: Option<LineId>,
    /// Line that lowered the ceiling.
    pub ceiling_line: Option<LineId>,
    /// Trigger-class lines the box overlaps, in contact order.
    pub special_lines: Vec<LineId>,
}

impl PositionCheck {
    pub(crate) fn seed(world: &World, x: Fixed, y: Fixed, radius: Fixed) -> Self {
        let sector = world.sector_at(x, y);
        let s = world.map.sector(sector);
        let floor_z = floor_under(&world.map, sector, x, y, radius);
        let ceiling_z = ceiling_under(&world.map, sector, x, y, radius);
        Self {
            x,
            y,
            bbox: BBox::around(x, y, radius),
            sector,
            blocked: false,
            floor_z,
            ceiling_z,
            dropoff_z: floor_z,
            dropoff_ceiling_z: ceiling_z,
            floor_surface: Surface::Sector(sector),
            ceiling_surface: Surface::Sector(sector),
            floor_slope: s.floor_slope,
            ceiling_slope: s.ceiling_slope,
            floor_pic: s.floor_pic,
            ceiling_pic: s.ceiling_pic,
            floor_step: 0,
            ceiling_step: 0,
            floor_thing: None,
            hit_thing: None,
            blocking_line: None,
            ceiling_line: None,
            special_lines: Vec::with_capacity(16),
        }
    }

    /// Room between floor and ceiling.
    #[inline]
    pub fn headroom(&self) -> Fixed {
        self.ceiling_z.saturating_sub(self.floor_z)
    }
}

/// Vertical gap through a two-sided line, as seen by one entity.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Opening {
    pub top: Fixed,
    pub bottom: Fixed,
    pub range: Fixed,
    /// Higher of the two ceilings.
    pub high_ceiling: Fixed,
    /// Lower of the two floors.
    pub low_floor: Fixed,
    pub top_surface: Option<Surface>,
    pub bottom_surface: Option<Surface>,
    pub top_slope: Option<SlopeId>,
    pub bottom_slope: Option<SlopeId>,
    pub top_pic: u32,
    pub bottom_pic: u32,
    pub floor_step: Fixed,
    pub ceiling_step: Fixed,
    pub floor_drop: Fixed,
    pub ceiling_drop: Fixed,
}

// --- Height helpers ------------------------------------------------------------

fn corners(x: Fixed, y: Fixed, radius: Fixed) -> [(Fixed, Fixed); 4] {
    let b = BBox::around(x, y, radius);
    [(b.min.x, b.min.y), (b.max.x, b.min.y), (b.min.x, b.max.y), (b.max.x, b.max.y)]
}

/// Highest point of a sector floor under a box; flat floors ignore the box.
pub fn floor_under(map: &Map, sector: SectorId, x: Fixed, y: Fixed, radius: Fixed) -> Fixed {
    let s = map.sector(sector);
    match s.floor_slope {
        Some(slope) => {
            let slope = &map.slopes[slope.idx()];
            corners(x, y, radius).iter().map(|&(cx, cy)| slope.z_at(cx, cy)).max().unwrap_or(s.floor_height)
        }
        None => s.floor_height,
    }
}

/// Lowest point of a sector ceiling over a box.
pub fn ceiling_under(map: &Map, sector: SectorId, x: Fixed, y: Fixed, radius: Fixed) -> Fixed {
    let s = map.sector(sector);
    match s.ceiling_slope {
        Some(slope) => {
            let slope = &map.slopes[slope.idx()];
            corners(x, y, radius).iter().map(|&(cx, cy)| slope.z_at(cx, cy)).min().unwrap_or(s.ceiling_height)
        }
        None => s.ceiling_height,
    }
}

/// Distances from an entity's bottom and top to the middle of a slab.
/// Computed wide so unbounded slabs (`i32::MIN..i32::MAX`) work.
#[inline]
pub(crate) fn midpoint_deltas(z: Fixed, top: Fixed, slab_top: Fixed, slab_bottom: Fixed) -> (i64, i64) {
    let mid = slab_bottom as i64 + (slab_top as i64 - slab_bottom as i64) / 2;
    ((z as i64 - mid).abs(), (top as i64 - mid).abs())
}

/// Players may stand on damaging liquid, and on any liquid while skipping
/// or running across it.
fn liquid_is_solid_for(e: &Entity, flags: SubSurfaceFlags) -> bool {
    let Some(p) = &e.player else { return false };
    flags.contains(SubSurfaceFlags::SWIMMABLE)
        && (flags.contains(SubSurfaceFlags::DAMAGING) || p.water_skip > 0 || p.water_run)
}

/// Whether a slab takes part in line openings for this entity.
fn sub_surface_blocks(e: &Entity, flags: SubSurfaceFlags) -> bool {
    liquid_is_solid_for(e, flags)
        || (flags.contains(SubSurfaceFlags::BLOCK_PLAYER) && e.is_player())
        || (flags.contains(SubSurfaceFlags::BLOCK_OTHERS) && !e.is_player())
}

fn is_skim_liquid(e: &Entity, flags: SubSurfaceFlags) -> bool {
    e.kind == EntityKind::Skim && flags.contains(SubSurfaceFlags::SWIMMABLE)
}

/// Floor an entity of `height` would rest on at `(x, y, z)`, counting solid
/// and quicksand slabs.
pub fn floor_z_at_pos(world: &World, x: Fixed, y: Fixed, z: Fixed, height: Fixed) -> Fixed {
    let map = &world.map;
    let sector = world.sector_at(x, y);
    let top = z.saturating_add(height);
    let mut floor = map.floor_at(sector, x, y);
    for sub in &map.sector(sector).sub_surfaces {
        if !resting_slab(sub) {
            continue;
        }
        let (st, sb) = map.sub_surface_span(sub, x, y);
        if sub.flags.contains(SubSurfaceFlags::QUICKSAND) {
            if z < st && sb < top && floor < z {
                floor = z;
            }
            continue;
        }
        let (d1, d2) = midpoint_deltas(z, top, st, sb);
        if st > floor && d1 < d2 {
            floor = st;
        }
    }
    floor
}

pub fn ceiling_z_at_pos(world: &World, x: Fixed, y: Fixed, z: Fixed, height: Fixed) -> Fixed {
    let map = &world.map;
    let sector = world.sector_at(x, y);
    let top = z.saturating_add(height);
    let mut ceiling = map.ceiling_at(sector, x, y);
    for sub in &map.sector(sector).sub_surfaces {
        if !resting_slab(sub) || sub.flags.contains(SubSurfaceFlags::QUICKSAND) {
            continue;
        }
        let (st, sb) = map.sub_surface_span(sub, x, y);
        let (d1, d2) = midpoint_deltas(z, top, st, sb);
        if sb < ceiling && d1 >= d2 {
            ceiling = sb;
        }
    }
    ceiling
}

fn resting_slab(sub: &SubSurface) -> bool {
    sub.flags.contains(SubSurfaceFlags::EXISTS)
        && sub.flags.intersects(SubSurfaceFlags::SOLID | SubSurfaceFlags::QUICKSAND)
        && !sub.flags.contains(SubSurfaceFlags::SWIMMABLE)
}

// --- Lines ---------------------------------------------------------------------

/// Lines that stop this entity regardless of heights.
pub fn is_line_blocking(line: &Line, e: &Entity) -> bool {
    if e.flags.contains(MobjFlags::MISSILE) {
        return false;
    }
    line.flags.contains(LineFlags::IMPASSABLE)
        || (e.is_player() && !e.is_spectator() && line.flags.contains(LineFlags::BLOCK_PLAYERS))
        || (e.flags.intersects(MobjFlags::ENEMY | MobjFlags::BOSS) && line.flags.contains(LineFlags::BLOCK_MONSTERS))
}

/// Trigger lines that should be recorded for crossing checks.
pub fn is_trigger_line(map: &Map, line: &Line) -> bool {
    let no_specials = line.polyobject.is_some_and(|p| map.poly(p).flags.contains(PolyFlags::NO_SPECIALS));
    !no_specials && line.is_trigger()
}

/// The vertical opening of `line` for entity `id`, measured at the point of
/// the line closest to `(x, y)`.
pub fn line_opening(world: &World, line: LineId, id: EntityId, x: Fixed, y: Fixed) -> Option<Opening> {
    let e = world.entities.get(id)?;
    let map = &world.map;
    let ld = map.line(line);
    let top_of_thing = e.top();

    let mut o = Opening {
        top: i32::MAX,
        bottom: i32::MIN,
        range: 0,
        high_ceiling: i32::MIN,
        low_floor: i32::MAX,
        top_surface: None,
        bottom_surface: None,
        top_slope: None,
        bottom_slope: None,
        top_pic: 0,
        bottom_pic: 0,
        floor_step: 0,
        ceiling_step: 0,
        floor_drop: 0,
        ceiling_drop: 0,
    };

    if let Some(pid) = ld.polyobject {
        let poly = map.poly(pid);
        if poly.flags.contains(PolyFlags::SOLID) {
            let control = map.sector(poly.control);
            let (ptop, pbottom) = if poly.flags.contains(PolyFlags::CLIP_PLANES) {
                (control.ceiling_height, control.floor_height)
            } else {
                (i32::MAX, i32::MIN)
            };
            let (d1, d2) = midpoint_deltas(e.z, top_of_thing, ptop, pbottom);
            if d1 >= d2 {
                if pbottom < o.top {
                    o.top = pbottom;
                    o.top_surface = Some(Surface::Polyobject(pid));
                    o.top_pic = control.floor_pic;
                } else if pbottom < o.high_ceiling {
                    o.high_ceiling = pbottom;
                }
            } else if ptop > o.bottom {
                o.bottom = ptop;
                o.bottom_surface = Some(Surface::Polyobject(pid));
                o.bottom_pic = control.ceiling_pic;
            } else if ptop > o.low_floor {
                o.low_floor = ptop;
            }
        }
        o.range = (o.top as i64 - o.bottom as i64).clamp(i32::MIN as i64, i32::MAX as i64) as Fixed;
        return Some(o);
    }

    let Some(back) = ld.back else {
        o.top = 0;
        o.bottom = 0;
        return Some(o);
    };
    let front = ld.front;
    let cp: IVec2 = ld.closest_point(x, y);
    let (fs, bs) = (map.sector(front), map.sector(back));

    let (fc, bc) = (map.ceiling_at(front, cp.x, cp.y), map.ceiling_at(back, cp.x, cp.y));
    let (low_c, high_c, low_c_sector) = if fc < bc { (fc, bc, front) } else { (bc, fc, back) };
    o.top = low_c;
    o.high_ceiling = high_c;
    o.top_surface = Some(Surface::Sector(low_c_sector));
    o.top_slope = map.sector(low_c_sector).ceiling_slope;
    o.top_pic = map.sector(low_c_sector).ceiling_pic;

    let (ff, bf) = (map.floor_at(front, cp.x, cp.y), map.floor_at(back, cp.x, cp.y));
    let (high_f, low_f, high_f_sector) = if ff > bf { (ff, bf, front) } else { (bf, ff, back) };
    o.bottom = high_f;
    o.low_floor = low_f;
    o.bottom_surface = Some(Surface::Sector(high_f_sector));
    o.bottom_slope = map.sector(high_f_sector).floor_slope;
    o.bottom_pic = map.sector(high_f_sector).floor_pic;

    for (sector, s) in [(front, fs), (back, bs)] {
        for (index, sub) in s.sub_surfaces.iter().enumerate() {
            if !sub.flags.contains(SubSurfaceFlags::EXISTS) || !sub_surface_blocks(e, sub.flags) {
                continue;
            }
            let (st, sb) = map.sub_surface_span(sub, cp.x, cp.y);
            let (d1, d2) = midpoint_deltas(e.z, top_of_thing, st, sb);
            let here = Surface::SubSurface(SubSurfaceRef { sector, index: index as u32 });
            let control = map.sector(sub.control);

            if d1 >= d2 && !sub.flags.contains(SubSurfaceFlags::PLATFORM) {
                if sb < o.top {
                    o.top = sb;
                    o.top_surface = Some(here);
                    o.top_slope = control.floor_slope;
                    o.top_pic = control.floor_pic;
                } else if sb < o.high_ceiling {
                    o.high_ceiling = sb;
                }
            }
            if d1 < d2 && !sub.flags.contains(SubSurfaceFlags::REVERSE_PLATFORM) {
                if st > o.bottom {
                    o.bottom = st;
                    o.bottom_surface = Some(here);
                    o.bottom_slope = control.ceiling_slope;
                    o.bottom_pic = control.ceiling_pic;
                } else if st > o.low_floor {
                    o.low_floor = st;
                }
            }
        }
    }

    o.range = o.top.saturating_sub(o.bottom);
    o.ceiling_step = top_of_thing.saturating_sub(o.top);
    o.ceiling_drop = o.high_ceiling.saturating_sub(o.top);
    o.floor_step = o.bottom.saturating_sub(e.z);
    o.floor_drop = o.bottom.saturating_sub(o.low_floor);
    Some(o)
}

/// Endpoints of an entity's paper collision segment when centred at `(x, y)`.
pub fn paper_segment(e: &Entity, x: Fixed, y: Fixed) -> Divline {
    let c = fixed_mul(e.radius, fine_cos(e.angle));
    let s = fixed_mul(e.radius, fine_sin(e.angle));
    Divline::new(IVec2::new(x - c, y - s), IVec2::new(2 * c, 2 * s))
}

/// True when a paper entity and the other entity cannot touch at the
/// mover's candidate position `(x, y)`.
pub fn paper_pair_misses(mover: &Entity, x: Fixed, y: Fixed, thing: &Entity) -> bool {
    let dx = (thing.x - x).abs();
    let dy = (thing.y - y).abs();
    let mover_paper = mover.flags.contains(MobjFlags::PAPER_COLLISION);

    if thing.flags.contains(MobjFlags::PAPER_COLLISION) {
        let junk = paper_segment(thing, thing.x, thing.y);
        let (c, s) = (junk.delta.x / 2, junk.delta.y / 2);
        if mover_paper {
            let mine = paper_segment(mover, x, y);
            let (mc, ms) = (mine.delta.x / 2, mine.delta.y / 2);
            if dx >= mc.abs() + c.abs() || dy >= ms.abs() + s.abs() {
                return true;
            }
            let checks = [
                junk.point_side(x - mc, y - ms),
                junk.point_side(x + mc, y + ms),
                junk.point_side(x + mover.momx - mc, y + mover.momy - ms),
                junk.point_side(x + mover.momx + mc, y + mover.momy + ms),
            ];
            checks.iter().all(|&side| side == checks[0])
        } else {
            if dx >= mover.radius + c.abs() || dy >= mover.radius + s.abs() {
                return true;
            }
            corners_on_one_side(&junk, x, y, mover.radius)
        }
    } else if mover_paper {
        let junk = paper_segment(mover, x, y);
        let (c, s) = (junk.delta.x / 2, junk.delta.y / 2);
        if dx >= thing.radius + c.abs() || dy >= thing.radius + s.abs() {
            return true;
        }
        corners_on_one_side(&junk, thing.x, thing.y, thing.radius)
    } else {
        false
    }
}

/// Both diagonals of the box keep their corners on the same side.
fn corners_on_one_side(line: &Divline, x: Fixed, y: Fixed, r: Fixed) -> bool {
    line.point_side(x - r, y - r) == line.point_side(x + r, y + r)
        && line.point_side(x + r, y - r) == line.point_side(x - r, y + r)
}

// --- Position check ------------------------------------------------------------

/// Evaluates the entity at `(x, y)` without moving it. Pair and line hooks
/// fire along the way. Returns `None` when the entity does not exist or was
/// removed by a hook during the check.
pub fn check_position(
    world: &mut World,
    hooks: &mut dyn GameHooks,
    id: EntityId,
    x: Fixed,
    y: Fixed,
) -> Option<PositionCheck> {
    let e = world.entities.get(id)?;
    let mut check = PositionCheck::seed(world, x, y, e.radius);

    let e = world.entities.get_mut(id)?;
    if e.top() < e.ceiling_z {
        e.ceiling_drop = 0;
    }
    if e.z > e.floor_z {
        e.floor_drop = 0;
    }

    apply_sub_surfaces(world, id, &mut check)?;

    let e = world.entities.get(id)?;
    if e.flags.contains(MobjFlags::NOCLIP) {
        finish(world, id, &mut check);
        return Some(check);
    }

    let range = world.blockmap.cells(&check.bbox.grow(world.cfg.max_radius));
    apply_polyobjects(world, id, &mut check, range)?;

    let skip_things = world.entities.get(id)?.flags.contains(MobjFlags::NOCLIPTHING);
    if !skip_things {
        for cell in range.iter() {
            let mut cell_passed = true;
            for other in world.blockmap.things_in(cell) {
                match interaction::check_thing(world, hooks, &mut check, id, other) {
                    Verdict::Block => {
                        cell_passed = false;
                        break;
                    }
                    Verdict::Pass | Verdict::Continue => {}
                }
                if !world.entities.contains(id) {
                    break;
                }
            }
            if cell_passed {
                check.hit_thing = check.floor_thing;
            } else {
                check.blocked = true;
            }
            if !world.entities.contains(id) {
                debug!(?id, "entity removed during position check");
                return None;
            }
        }
    }

    world.blockmap.new_episode();
    for cell in range.iter() {
        let lines = world.blockmap.lines_in(cell).to_vec();
        for lid in lines {
            if !world.blockmap.visit_line(lid) {
                continue;
            }
            if !check_line(world, hooks, &mut check, id, lid) {
                check.blocked = true;
                break;
            }
        }
    }

    if !world.entities.contains(id) {
        debug!(?id, "entity removed during line checks");
        return None;
    }
    finish(world, id, &mut check);
    Some(check)
}

fn finish(world: &World, id: EntityId, check: &mut PositionCheck) {
    if let Some(e) = world.entities.get(id) {
        check.floor_step = check.floor_z.saturating_sub(e.z);
        check.ceiling_step = e.top().saturating_sub(check.ceiling_z);
    }
}

fn apply_sub_surfaces(world: &mut World, id: EntityId, check: &mut PositionCheck) -> Option<()> {
    let sector = check.sector;
    let count = world.map.sector(sector).sub_surfaces.len();
    for index in 0..count {
        let sub = world.map.sector(sector).sub_surfaces[index];
        if !sub.flags.contains(SubSurfaceFlags::EXISTS) {
            continue;
        }
        let (st, sb) = world.map.sub_surface_span(&sub, check.x, check.y);
        let here = Surface::SubSurface(SubSurfaceRef { sector, index: index as u32 });
        let control = world.map.sector(sub.control);
        let (top_pic, bottom_pic) = (control.ceiling_pic, control.floor_pic);
        let (top_slope, bottom_slope) = (control.ceiling_slope, control.floor_slope);

        let e = world.entities.get_mut(id)?;
        let thing_top = e.top();

        if sub.flags.contains(SubSurfaceFlags::SWIMMABLE | SubSurfaceFlags::GOO_WATER)
            && !e.flags.contains(MobjFlags::NOGRAVITY)
        {
            let sink = fixed_mul(e.info.spawn_height / 6, e.scale);
            let min_speed = fixed_mul(e.info.spawn_height / 9, e.scale);
            if e.z < st && sb < thing_top && e.momz.abs() < min_speed {
                let flipped = e.is_flipped();
                if !flipped && e.z > st - sink && e.momz >= 0 && e.momz < (min_speed >> 2) {
                    e.momz += min_speed >> 2;
                } else if flipped && thing_top < sb + sink && e.momz <= 0 && e.momz > -(min_speed >> 2) {
                    e.momz -= min_speed >> 2;
                }

                if !flipped && e.z >= st - sink && e.momz <= 0 {
                    if check.floor_z < st - sink {
                        check.floor_z = st - sink;
                        check.floor_surface = here;
                        check.floor_slope = top_slope;
                        check.floor_pic = top_pic;
                    }
                } else if flipped && thing_top <= sb + sink && e.momz >= 0 && check.ceiling_z > sb + sink {
                    check.ceiling_z = sb + sink;
                    check.ceiling_surface = here;
                    check.ceiling_slope = bottom_slope;
                    check.ceiling_pic = bottom_pic;
                }
            }
            continue;
        }

        let e = &*e;
        let participates = liquid_is_solid_for(e, sub.flags)
            || is_skim_liquid(e, sub.flags)
            || (sub.flags.contains(SubSurfaceFlags::BLOCK_PLAYER) && e.is_player())
            || (sub.flags.contains(SubSurfaceFlags::BLOCK_OTHERS) && !e.is_player())
            || sub.flags.contains(SubSurfaceFlags::QUICKSAND);
        if !participates {
            continue;
        }

        if sub.flags.contains(SubSurfaceFlags::QUICKSAND) {
            if e.z < st && sb < thing_top && check.floor_z < e.z {
                check.floor_z = e.z;
                check.floor_surface = here;
                check.floor_slope = None;
                check.floor_pic = top_pic;
            }
            continue;
        }

        let (d1, d2) = midpoint_deltas(e.z, thing_top, st, sb);
        if st > check.floor_z && d1 < d2 && !sub.flags.contains(SubSurfaceFlags::REVERSE_PLATFORM) {
            check.floor_z = st;
            check.dropoff_z = st;
            check.floor_surface = here;
            check.floor_slope = top_slope;
            check.floor_pic = top_pic;
        }
        if sb < check.ceiling_z
            && d1 >= d2
            && !sub.flags.contains(SubSurfaceFlags::PLATFORM)
            && !is_skim_liquid(e, sub.flags)
        {
            check.ceiling_z = sb;
            check.dropoff_ceiling_z = sb;
            check.ceiling_surface = here;
            check.ceiling_slope = bottom_slope;
            check.ceiling_pic = bottom_pic;
        }
    }
    Some(())
}

fn apply_polyobjects(
    world: &mut World,
    id: EntityId,
    check: &mut PositionCheck,
    range: crate::blockmap::CellRange,
) -> Option<()> {
    world.blockmap.new_episode();
    for cell in range.iter() {
        let polys = world.blockmap.polys_in(cell).to_vec();
        for pid in polys {
            if !world.blockmap.visit_poly(pid) {
                continue;
            }
            let map = &world.map;
            let poly = map.poly(pid);
            if !poly.flags.contains(PolyFlags::SOLID) || !map.poly_contains_box(pid, &check.bbox) {
                continue;
            }
            let control = map.sector(poly.control);
            let (ptop, pbottom) = if poly.flags.contains(PolyFlags::CLIP_PLANES) {
                (control.ceiling_height, control.floor_height)
            } else {
                (i32::MAX, i32::MIN)
            };
            let e = world.entities.get(id)?;
            let (d1, d2) = midpoint_deltas(e.z, e.top(), ptop, pbottom);
            if ptop > check.floor_z && d1 < d2 {
                check.floor_z = ptop;
                check.dropoff_z = ptop;
                check.floor_surface = Surface::Polyobject(pid);
                check.floor_slope = None;
                check.floor_pic = control.ceiling_pic;
            }
            if pbottom < check.ceiling_z && d1 >= d2 {
                check.ceiling_z = pbottom;
                check.dropoff_ceiling_z = pbottom;
                check.ceiling_surface = Surface::Polyobject(pid);
                check.ceiling_slope = None;
                check.ceiling_pic = control.floor_pic;
            }
        }
    }
    Some(())
}

/// One line against the candidate box. Returns `false` when the line blocks.
fn check_line(world: &mut World, hooks: &mut dyn GameHooks, check: &mut PositionCheck, id: EntityId, lid: LineId) -> bool {
    let Some(e) = world.entities.get(id) else { return true };
    let line = world.map.line(lid);
    if line.polyobject.is_some_and(|p| !world.map.poly(p).flags.contains(PolyFlags::SOLID)) {
        return true;
    }
    if !check.bbox.touches(&line.bbox) || line.box_side(&check.bbox) != -1 {
        return true;
    }
    if e.flags.contains(MobjFlags::PAPER_COLLISION) {
        let seg = paper_segment(e, check.x, check.y);
        let end = seg.origin + seg.delta;
        if line.point_side(seg.origin.x, seg.origin.y) == line.point_side(end.x, end.y) {
            return true;
        }
    }

    check.blocking_line = Some(lid);
    let verdict = hooks.should_collide_line(world, id, lid);
    let Some(e) = world.entities.get(id) else { return true };
    match verdict {
        CollideOverride::Force => return false,
        CollideOverride::Skip => return true,
        CollideOverride::Default => {}
    }

    let line = world.map.line(lid);
    if line.back.is_none() {
        return line.point_side(e.x, e.y) == 1;
    }
    if is_line_blocking(line, e) {
        return false;
    }

    let Some(open) = line_opening(world, lid, id, check.x, check.y) else { return true };
    let trigger = is_trigger_line(&world.map, line);
    let Some(e) = world.entities.get_mut(id) else { return true };

    if open.top < check.ceiling_z {
        check.ceiling_z = open.top;
        check.ceiling_line = Some(lid);
        check.ceiling_surface = open.top_surface.unwrap_or(check.ceiling_surface);
        check.ceiling_slope = open.top_slope;
        check.ceiling_pic = open.top_pic;
        if e.top() == e.ceiling_z {
            e.ceiling_drop = open.ceiling_drop;
        }
    }
    if open.bottom > check.floor_z {
        check.floor_z = open.bottom;
        check.floor_surface = open.bottom_surface.unwrap_or(check.floor_surface);
        check.floor_slope = open.bottom_slope;
        check.floor_pic = open.bottom_pic;
        if e.z == e.floor_z {
            e.floor_drop = open.floor_drop;
        }
    }
    if open.high_ceiling > check.dropoff_ceiling_z {
        check.dropoff_ceiling_z = open.high_ceiling;
    }
    if open.low_floor < check.dropoff_z {
        check.dropoff_z = open.low_floor;
    }
    if trigger {
        check.special_lines.push(lid);
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{MovementApi, NoHooks};
    use crate::Sector;
    use crate::fixed::{ANGLE_90, units};
    use crate::test_level::{RecordingHooks, RoomRow, player_at, thing_at};

    fn steps(second_floor: Fixed) -> World {
        let map = RoomRow::new(units(128))
            .room(units(256), 0, units(128))
            .room(units(256), second_floor, units(128))
            .build();
        World::new(map, WorldConfig::default()).unwrap()
    }

    #[test]
    fn test_plain_room_bounds() {
        let mut w = steps(0);
        let a = w.spawn(thing_at(units(64), units(64), 0));
        let c = check_position(&mut w, &mut NoHooks, a, units(80), units(64)).unwrap();
        assert!(!c.blocked);
        assert_eq!((c.floor_z, c.ceiling_z), (0, units(128)));
        assert_eq!(c.floor_surface, Surface::Sector(SectorId(0)));
        assert_eq!(c.floor_step, 0);
    }

    #[test]
    fn test_line_raises_floor_near_step() {
        let mut w = steps(units(20));
        let a = w.spawn(thing_at(units(200), units(64), 0));
        let c = check_position(&mut w, &mut NoHooks, a, units(250), units(64)).unwrap();
        assert_eq!(c.floor_z, units(20));
        assert_eq!(c.dropoff_z, 0);
        assert_eq!(c.floor_step, units(20));
        assert_eq!(c.floor_surface, Surface::Sector(SectorId(1)));
    }

    #[test]
    fn test_one_sided_wall_blocks_from_front() {
        let mut w = steps(0);
        let a = w.spawn(thing_at(units(64), units(64), 0));
        let c = check_position(&mut w, &mut NoHooks, a, units(8), units(64)).unwrap();
        assert!(c.blocked);
        assert!(c.blocking_line.is_some());
    }

    #[test]
    fn test_noclip_skips_walls() {
        let mut w = steps(0);
        let a = w.spawn(thing_at(units(64), units(64), 0).with_flags(MobjFlags::NOCLIP));
        let c = check_position(&mut w, &mut NoHooks, a, units(8), units(64)).unwrap();
        assert!(!c.blocked);
    }

    #[test]
    fn test_impassable_line_blocks() {
        let mut parts = RoomRow::new(units(128))
            .room(units(256), 0, units(128))
            .room(units(256), 0, units(128))
            .parts();
        let divider = parts.dividers[0];
        parts.lines[divider.idx()].flags = LineFlags::IMPASSABLE;
        let mut w = World::new(parts.build(), WorldConfig::default()).unwrap();
        let a = w.spawn(thing_at(units(200), units(64), 0));
        assert!(check_position(&mut w, &mut NoHooks, a, units(250), units(64)).unwrap().blocked);
        assert!(!check_position(&mut w, &mut NoHooks, a, units(220), units(64)).unwrap().blocked);
    }

    #[test]
    fn test_sub_surface_midpoint_rule() {
        let mut parts = RoomRow::new(units(256)).room(units(256), 0, units(256)).parts();
        let control = parts.add_sector(Sector::new(units(64), units(96)));
        parts.sectors[0] = parts.sectors[0].clone().with_sub_surface(control, SubSurfaceFlags::EXISTS | SubSurfaceFlags::SOLID);
        let mut w = World::new(parts.build(), WorldConfig::default()).unwrap();

        // standing above the slab: its top is the floor
        let above = w.spawn(thing_at(units(64), units(64), units(100)));
        let c = check_position(&mut w, &mut NoHooks, above, units(64), units(64)).unwrap();
        assert_eq!(c.floor_z, units(96));
        assert_eq!(c.ceiling_z, units(256));
        assert!(matches!(c.floor_surface, Surface::SubSurface(_)));

        // below it: its bottom is the ceiling
        let below = w.spawn(thing_at(units(160), units(64), 0));
        let c = check_position(&mut w, &mut NoHooks, below, units(160), units(64)).unwrap();
        assert_eq!(c.floor_z, 0);
        assert_eq!(c.ceiling_z, units(64));
    }

    #[test]
    fn test_platform_and_quicksand() {
        let mut parts = RoomRow::new(units(256)).room(units(256), 0, units(256)).parts();
        let plat = parts.add_sector(Sector::new(units(64), units(96)));
        let sand = parts.add_sector(Sector::new(0, units(40)));
        parts.sectors[0] = parts.sectors[0]
            .clone()
            .with_sub_surface(plat, SubSurfaceFlags::EXISTS | SubSurfaceFlags::SOLID | SubSurfaceFlags::PLATFORM)
            .with_sub_surface(sand, SubSurfaceFlags::EXISTS | SubSurfaceFlags::QUICKSAND);
        let mut w = World::new(parts.build(), WorldConfig::default()).unwrap();

        // a platform never lowers the ceiling
        let a = w.spawn(thing_at(units(64), units(64), 0));
        let c = check_position(&mut w, &mut NoHooks, a, units(64), units(64)).unwrap();
        assert_eq!(c.ceiling_z, units(256));

        // sunk halfway into quicksand: the floor is wherever it stands
        let b = w.spawn(thing_at(units(160), units(64), units(20)));
        let c = check_position(&mut w, &mut NoHooks, b, units(160), units(64)).unwrap();
        assert_eq!(c.floor_z, units(20));
        assert_eq!(c.dropoff_z, 0);
    }

    #[test]
    fn test_solid_polyobject_without_clip_planes_walls_off() {
        let mut parts = RoomRow::new(units(256)).room(units(512), 0, units(256)).parts();
        parts.add_box_poly(0, units(192), units(64), units(320), units(192), None, PolyFlags::SOLID);
        let mut w = World::new(parts.build(), WorldConfig::default()).unwrap();
        let a = w.spawn(thing_at(units(100), units(128), 0));
        let c = check_position(&mut w, &mut NoHooks, a, units(180), units(128)).unwrap();
        // overlapping the polyobject puts an unreachable floor under us
        assert_eq!(c.floor_z, i32::MAX);
        assert!(check_position(&mut w, &mut NoHooks, a, units(150), units(128)).unwrap().floor_z == 0);
    }

    #[test]
    fn test_polyobject_clip_planes_act_like_slab() {
        let mut parts = RoomRow::new(units(256)).room(units(512), 0, units(256)).parts();
        parts.add_box_poly(
            0,
            units(192),
            units(64),
            units(320),
            units(192),
            Some((0, units(16))),
            PolyFlags::SOLID | PolyFlags::CLIP_PLANES,
        );
        let mut w = World::new(parts.build(), WorldConfig::default()).unwrap();
        let a = w.spawn(thing_at(units(100), units(128), 0));
        let c = check_position(&mut w, &mut NoHooks, a, units(200), units(128)).unwrap();
        assert_eq!(c.floor_z, units(16));
        assert!(matches!(c.floor_surface, Surface::Polyobject(_)));
    }

    #[test]
    fn test_trigger_lines_recorded() {
        let mut parts = RoomRow::new(units(128))
            .room(units(256), 0, units(128))
            .room(units(256), 0, units(128))
            .parts();
        let divider = parts.dividers[0];
        parts.lines[divider.idx()].special = crate::map::SPECIAL_FINISH_LINE;
        let mut w = World::new(parts.build(), WorldConfig::default()).unwrap();
        let a = w.spawn(thing_at(units(200), units(64), 0));
        let c = check_position(&mut w, &mut NoHooks, a, units(250), units(64)).unwrap();
        assert_eq!(c.special_lines, vec![divider]);
    }

    #[test]
    fn test_line_hook_override() {
        let mut w = steps(0);
        let a = w.spawn(thing_at(units(64), units(64), 0));
        let mut hooks = RecordingHooks { line_override: CollideOverride::Skip, ..Default::default() };
        let c = check_position(&mut w, &mut hooks, a, units(8), units(64)).unwrap();
        assert!(!c.blocked);
    }

    #[test]
    fn test_floor_z_at_pos_ignores_liquid() {
        let mut parts = RoomRow::new(units(256)).room(units(256), 0, units(256)).parts();
        let water = parts.add_sector(Sector::new(0, units(50)));
        let shelf = parts.add_sector(Sector::new(units(60), units(70)));
        parts.sectors[0] = parts.sectors[0]
            .clone()
            .with_sub_surface(water, SubSurfaceFlags::EXISTS | SubSurfaceFlags::SWIMMABLE | SubSurfaceFlags::BLOCK_OTHERS)
            .with_sub_surface(shelf, SubSurfaceFlags::EXISTS | SubSurfaceFlags::SOLID);
        let w = World::new(parts.build(), WorldConfig::default()).unwrap();
        assert_eq!(floor_z_at_pos(&w, units(64), units(64), units(20), units(32)), 0);
        assert_eq!(floor_z_at_pos(&w, units(64), units(64), units(80), units(32)), units(70));
        assert_eq!(ceiling_z_at_pos(&w, units(64), units(64), 0, units(32)), units(60));
    }

    #[test]
    fn test_paper_pair_misses_edge_on() {
        // a paper wall facing along x, thin in y
        let mut wall = thing_at(0, 0, 0).with_flags(MobjFlags::SOLID | MobjFlags::PAPER_COLLISION);
        wall.radius = units(32);
        let mover = player_at(0, 0, 0);
        // box straddles the segment
        assert!(!paper_pair_misses(&mover, 0, units(10), &wall));
        // box fully on one side
        assert!(paper_pair_misses(&mover, 0, units(20), &wall));
        wall.angle = ANGLE_90;
        assert!(paper_pair_misses(&mover, units(20), 0, &wall));
    }
}
