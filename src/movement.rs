//! Committed horizontal movement.
//!
//! [`try_move`] walks towards the destination in radius-sized sub-steps,
//! validating each with a position check and applying the step rules. The
//! move is all-or-nothing: nothing is committed until every sub-step passed.
//! Trigger lines seen on the way are replayed once the entity is linked at
//! its destination.

use tracing::trace;

use crate::api::GameHooks;
use crate::deflect;
use crate::entity::Entity;
use crate::fixed::{Angle, FRACUNIT, Fixed, fixed_mul, fixed_sqrt, point_to_angle};
use crate::map::{BBox, Map};
use crate::narrowphase;
use crate::traverse;
use crate::types::*;
use crate::world::World;

/// Outcome of [`try_move_report`]: whether the move happened, plus what the
/// last position check bumped into for the deflection resolvers.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MoveReport {
    pub moved: bool,
    pub hit_thing: Option<EntityId>,
    pub blocking_line: Option<LineId>,
}

// --- Step tolerance ------------------------------------------------------------

/// Step height every entity gets before type and surface adjustments.
#[inline]
pub fn base_step_up(cfg: &WorldConfig) -> Fixed {
    fixed_mul(cfg.max_step_move, cfg.map_object_scale)
}

fn water_running(world: &World, e: &Entity) -> bool {
    let Surface::SubSurface(r) = e.floor_surface else { return false };
    world.map.sub_surface(r).is_some_and(|sub| sub.flags.contains(SubSurfaceFlags::SWIMMABLE)) && e.on_ground()
}

/// How far `id` may step up (or down) in one move.
pub fn get_thing_step_up(world: &World, id: EntityId) -> Fixed {
    let Some(e) = world.entities.get(id) else { return 0 };
    if e.kind == EntityKind::Skim {
        return 0;
    }
    let base = base_step_up(&world.cfg);
    let mut step = base;
    if e.player.as_ref().is_some_and(|p| p.water_skip > 0) || water_running(world, e) {
        step += base;
    }
    let touching = world.touching_sector_flags(id);
    if touching.contains(SectorFlags::STEP_UP_DOUBLE) {
        step <<= 1;
    } else if touching.contains(SectorFlags::NO_STEP_UP) {
        step = 0;
    }
    step
}

// --- Helpers -------------------------------------------------------------------

/// Next sub-step coordinate from `from` towards `to`, at most `step` away.
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

/// Pitch and roll that lay an entity flat on `slope`; level ground gives zero.
pub fn slope_tilt(map: &Map, slope: Option<SlopeId>) -> (Angle, Angle) {
    let Some(slope) = slope.and_then(|s| map.slopes.get(s.idx())) else { return (0, 0) };
    let n = slope.normal;
    let across = fixed_sqrt(fixed_mul(n.y, n.y).saturating_add(fixed_mul(n.z, n.z)));
    (point_to_angle(across, n.x), point_to_angle(n.z, n.y))
}

fn dedup_keep_first(lines: &mut Vec<LineId>) {
    let mut seen = Vec::with_capacity(lines.len());
    lines.retain(|l| {
        if seen.contains(l) {
            false
        } else {
            seen.push(*l);
            true
        }
    });
}

/// Fires every line in `lines` (latest first) whose side changed between
/// `from` and `to`, recording each crossing for the tick.
fn replay_crossings(
    world: &mut World,
    hooks: &mut dyn GameHooks,
    id: EntityId,
    mut lines: Vec<LineId>,
    from: (Fixed, Fixed),
    to: (Fixed, Fixed),
) {
    dedup_keep_first(&mut lines);
    for &lid in lines.iter().rev() {
        if !world.entities.contains(id) {
            return;
        }
        let line = world.map.line(lid);
        let old_side = line.point_side(from.0, from.1);
        if line.point_side(to.0, to.1) == old_side {
            continue;
        }
        trace!(?id, line = lid.0, old_side, "special line crossed");
        world.push_crossing(LineCrossing { line: lid, entity: id, from_side: old_side });
        hooks.cross_special_line(world, lid, old_side, id);
    }
}

// --- Moves ---------------------------------------------------------------------

/// Sub-step length for an entity of `radius`: never below the object scale
/// or one unit, so a degenerate config cannot stall the walk.
#[inline]
pub(crate) fn sub_step(radius: Fixed, cfg: &WorldConfig) -> Fixed {
    radius.max(cfg.map_object_scale).max(FRACUNIT)
}

/// Heights a move has stepped to so far. Only written back to the entity
/// once every sub-step passed.
struct Staged {
    z: Fixed,
    floor_z: Fixed,
    ceiling_z: Fixed,
    stepped: bool,
    floor_drop: Option<Fixed>,
    ceiling_drop: Option<Fixed>,
}

/// Puts back the height a refused move borrowed for its sub-step checks,
/// unless a hook has moved the entity since.
fn abandon(world: &mut World, id: EntityId, start_z: Fixed, st: &Staged, report: MoveReport) -> MoveReport {
    if let Some(e) = world.entities.get_mut(id) {
        if e.z == st.z {
            e.z = start_z;
        }
    }
    report
}

/// Moves `id` to `(x, y)` if every sub-step on the way is valid.
pub fn try_move(
    world: &mut World,
    hooks: &mut dyn GameHooks,
    id: EntityId,
    x: Fixed,
    y: Fixed,
    allow_dropoff: bool,
) -> bool {
    try_move_report(world, hooks, id, x, y, allow_dropoff).moved
}

/// [`try_move`] that also reports what blocked it.
pub fn try_move_report(
    world: &mut World,
    hooks: &mut dyn GameHooks,
    id: EntityId,
    x: Fixed,
    y: Fixed,
    allow_dropoff: bool,
) -> MoveReport {
    let mut report = MoveReport::default();
    let Some(e) = world.entities.get(id) else { return report };
    let (old_x, old_y) = (e.x, e.y);
    let step = sub_step(e.radius, &world.cfg);
    let starting_on_ground = e.on_ground();
    let old_slope = e.standing_slope;
    let noclip = e.flags.contains(MobjFlags::NOCLIP);
    let height = e.height;
    let flipped = e.is_flipped();
    let start_z = e.z;
    let mut st = Staged { z: e.z, floor_z: e.floor_z, ceiling_z: e.ceiling_z, stepped: false, floor_drop: None, ceiling_drop: None };

    let (mut try_x, mut try_y) = (old_x, old_y);
    let mut stair_jank: Fixed = 0;
    let mut specials: Vec<LineId> = Vec::with_capacity(16);

    let check = loop {
        if noclip {
            try_x = x;
            try_y = y;
        } else {
            try_x = approach(try_x, x, step);
            try_y = approach(try_y, y, step);
        }

        // later sub-steps are checked at the height the earlier ones stepped to
        if st.z != start_z {
            if let Some(e) = world.entities.get_mut(id) {
                e.z = st.z;
            }
        }
        let Some(check) = narrowphase::check_position(world, hooks, id, try_x, try_y) else { return report };
        report.hit_thing = check.hit_thing;
        report.blocking_line = check.blocking_line;
        if check.blocked {
            return abandon(world, id, start_z, &st, report);
        }
        specials.extend_from_slice(&check.special_lines);

        if !noclip {
            let max_step = get_thing_step_up(world, id);
            let no_step_down = world.touching_sector_flags(id).contains(SectorFlags::NO_STEP_DOWN);

            if check.headroom() < height {
                if check.floor_thing.is_some() {
                    report.hit_thing = check.floor_thing;
                }
                return abandon(world, id, start_z, &st, report);
            }

            if max_step > 0 {
                let top = st.z + height;
                if st.z < check.floor_z {
                    if check.floor_step > max_step {
                        return abandon(world, id, start_z, &st, report);
                    }
                    if !flipped {
                        stair_jank = check.floor_step;
                    }
                    st.z = check.floor_z;
                    st.floor_z = check.floor_z;
                    st.stepped = true;
                } else if check.ceiling_z < top {
                    if check.ceiling_step > max_step {
                        return abandon(world, id, start_z, &st, report);
                    }
                    if flipped {
                        stair_jank = check.ceiling_step;
                    }
                    st.ceiling_z = check.ceiling_z;
                    st.z = check.ceiling_z - height;
                    st.stepped = true;
                } else if !no_step_down {
                    if top == st.ceiling_z && check.ceiling_z > top && check.ceiling_z - top <= max_step {
                        if flipped {
                            stair_jank = check.ceiling_z - top;
                        }
                        st.ceiling_z = check.ceiling_z;
                        st.z = check.ceiling_z - height;
                        st.stepped = true;
                        st.ceiling_drop = Some(0);
                    } else if st.z == st.floor_z && check.floor_z < st.z && st.z - check.floor_z <= max_step {
                        if !flipped {
                            stair_jank = st.z - check.floor_z;
                        }
                        st.z = check.floor_z;
                        st.floor_z = check.floor_z;
                        st.stepped = true;
                        st.floor_drop = Some(0);
                    }
                }
            }

            let Some(e) = world.entities.get(id) else { return report };
            let floats = e.flags.contains(MobjFlags::FLOAT) || e.kind == EntityKind::Skim;
            if !allow_dropoff && !floats && check.floor_thing.is_none() {
                let drop = if flipped {
                    check.dropoff_ceiling_z.saturating_sub(check.ceiling_z)
                } else {
                    check.floor_z.saturating_sub(check.dropoff_z)
                };
                if drop > max_step {
                    return abandon(world, id, start_z, &st, report);
                }
            }
        }

        if try_x == x && try_y == y {
            break check;
        }
    };

    if let Some(e) = world.entities.get_mut(id) {
        if st.z != start_z {
            e.z = st.z;
        }
        if st.stepped {
            e.eflags.insert(ExtraFlags::JUST_STEPPED_DOWN);
        }
        if let Some(d) = st.floor_drop {
            e.floor_drop = d;
        }
        if let Some(d) = st.ceiling_drop {
            e.ceiling_drop = d;
        }
    }

    if world.entities.get(id).is_some_and(|e| e.flags.contains(MobjFlags::PUSHABLE)) {
        move_riders(world, hooks, id);
    }

    world.unset_position(id);
    let floor_tilt = slope_tilt(&world.map, check.floor_slope);
    let ceiling_tilt = slope_tilt(&world.map, check.ceiling_slope);
    let Some(e) = world.entities.get_mut(id) else { return report };
    e.floor_z = check.floor_z;
    e.ceiling_z = check.ceiling_z;
    e.floor_surface = check.floor_surface;
    e.ceiling_surface = check.ceiling_surface;

    let mut landed = false;
    if !e.flags.contains(MobjFlags::NOCLIPHEIGHT) {
        let flipped = e.is_flipped();
        if !flipped && e.z <= check.floor_z {
            e.terrain_pic = check.floor_pic;
            if e.momz <= 0 {
                e.standing_slope = check.floor_slope;
                (e.pitch, e.roll) = floor_tilt;
                landed = e.momz == 0 && e.is_player() && !starting_on_ground;
            }
        } else if flipped && e.top() >= check.ceiling_z {
            e.terrain_pic = check.ceiling_pic;
            if e.momz >= 0 {
                e.standing_slope = check.ceiling_slope;
                (e.pitch, e.roll) = ceiling_tilt;
                landed = e.momz == 0 && e.is_player() && !starting_on_ground;
            }
        }
    } else {
        e.standing_slope = None;
        e.terrain_pic = 0;
    }

    let mut jank = false;
    if stair_jank != 0 && old_slope.is_none() && e.standing_slope.is_none() {
        if let Some(p) = e.player.as_mut().filter(|p| !p.spectator) {
            p.stair_jank = 17;
            jank = true;
        }
    }

    e.x = x;
    e.y = y;
    if check.floor_thing.is_some() {
        e.eflags.remove(ExtraFlags::ONGROUND);
    } else {
        e.eflags.insert(ExtraFlags::ONGROUND);
    }
    world.set_position(id);
    report.moved = true;

    if landed {
        hooks.hit_floor(world, id);
    }
    if jank && world.entities.contains(id) {
        hooks.stair_jank(world, id);
    }
    if !noclip {
        replay_crossings(world, hooks, id, specials, (old_x, old_y), (x, y));
    }
    report
}

/// Carries whatever stands on a moving pushable along with it: players
/// are moved, everything else inherits the pushable's momentum.
fn move_riders(world: &mut World, hooks: &mut dyn GameHooks, stand: EntityId) {
    let Some(s) = world.entities.get(stand) else { return };
    let range = world.blockmap.cells(&BBox::around(s.x, s.y, world.cfg.max_radius));
    let mut candidates = Vec::new();
    for cell in range.iter() {
        candidates.extend(world.blockmap.things_in(cell));
    }

    for id in candidates {
        if id == stand {
            continue;
        }
        let Some(s) = world.entities.get(stand) else { return };
        let Some(t) = world.entities.get(id) else { continue };
        if !t.flags.contains(MobjFlags::SOLID) || t.flags.contains(MobjFlags::NOGRAVITY) {
            continue;
        }
        if !t.flags.contains(MobjFlags::PUSHABLE) && !t.is_player() {
            continue;
        }
        let block = s.radius + t.radius;
        if (t.x - s.x).abs() >= block || (t.y - s.y).abs() >= block {
            continue;
        }
        let lift = fixed_mul(FRACUNIT, s.scale);
        let riding = if s.is_flipped() { t.top() == s.z - lift } else { t.z == s.top() + lift };
        if !riding || (s.momx == 0 && s.momy == 0) {
            continue;
        }

        let (momx, momy, momz) = (s.momx, s.momy, s.momz);
        if t.is_player() {
            let (tx, ty) = (t.x + momx, t.y + momy);
            try_move(world, hooks, id, tx, ty, true);
            if let Some(t) = world.entities.get_mut(id) {
                t.momz = momz;
            }
        } else if let Some(t) = world.entities.get_mut(id) {
            t.momx = momx;
            t.momy = momy;
            t.momz = momz;
        }
    }
}

/// Cheap move for scenery: `max_radius` sub-steps, base step height, no
/// slopes, riders or trigger lines.
pub fn scenery_try_move(world: &mut World, hooks: &mut dyn GameHooks, id: EntityId, x: Fixed, y: Fixed) -> bool {
    let Some(e) = world.entities.get(id) else { return false };
    let (mut try_x, mut try_y) = (e.x, e.y);
    let step = world.cfg.max_radius.max(FRACUNIT);
    let max_step = base_step_up(&world.cfg);

    let check = loop {
        try_x = approach(try_x, x, step);
        try_y = approach(try_y, y, step);
        let Some(check) = narrowphase::check_position(world, hooks, id, try_x, try_y) else { return false };
        if check.blocked {
            return false;
        }
        let Some(e) = world.entities.get(id) else { return false };
        if !e.flags.contains(MobjFlags::NOCLIP) {
            if check.headroom() < e.height
                || check.ceiling_z.saturating_sub(e.z) < e.height
                || check.floor_z.saturating_sub(e.z) > max_step
            {
                return false;
            }
        }
        if try_x == x && try_y == y {
            break check;
        }
    };

    world.unset_position(id);
    let Some(e) = world.entities.get_mut(id) else { return false };
    e.floor_z = check.floor_z;
    e.ceiling_z = check.ceiling_z;
    e.floor_surface = check.floor_surface;
    e.ceiling_surface = check.ceiling_surface;
    e.x = x;
    e.y = y;
    if check.floor_thing.is_some() {
        e.eflags.remove(ExtraFlags::ONGROUND);
    } else {
        e.eflags.insert(ExtraFlags::ONGROUND);
    }
    world.set_position(id);
    true
}

/// Teleports `id` to `(x, y, z)` and refreshes its floor and ceiling. The
/// destination is not validated. Returns `false` only for a missing entity.
pub fn set_origin(world: &mut World, hooks: &mut dyn GameHooks, id: EntityId, x: Fixed, y: Fixed, z: Fixed) -> bool {
    if !world.entities.contains(id) {
        return false;
    }
    world.unset_position(id);
    if let Some(e) = world.entities.get_mut(id) {
        let mut head = e.touching.take();
        e.x = x;
        e.y = y;
        e.z = z;
        world.nodes.delete_list(&mut head);
    }
    world.set_position(id);

    let Some(check) = narrowphase::check_position(world, hooks, id, x, y) else { return true };
    if let Some(e) = world.entities.get_mut(id) {
        e.floor_z = check.floor_z;
        e.ceiling_z = check.ceiling_z;
        e.floor_surface = check.floor_surface;
        e.ceiling_surface = check.ceiling_surface;
    }
    true
}

/// Same as [`set_origin`]; for callers that keep their own interpolation
/// state and want it left alone.
#[inline]
pub fn move_origin(world: &mut World, hooks: &mut dyn GameHooks, id: EntityId, x: Fixed, y: Fixed, z: Fixed) -> bool {
    set_origin(world, hooks, id, x, y, z)
}

/// Fires the trigger lines on the path `(x, y) + (momx, momy)` for movers
/// that skip collision (no-clip travel, respawn paths).
pub fn hit_special_lines(
    world: &mut World,
    hooks: &mut dyn GameHooks,
    id: EntityId,
    x: Fixed,
    y: Fixed,
    momx: Fixed,
    momy: Fixed,
) {
    let Some(e) = world.entities.get(id) else { return };
    let mut lines = Vec::with_capacity(16);
    for (sx, sy) in traverse::leading_corners(x, y, e.radius, momx, momy) {
        traverse::path_traverse(world, sx, sy, sx + momx, sy + momy, |world, hit| {
            let line = world.map.line(hit.line);
            if line.back.is_some() && narrowphase::is_trigger_line(&world.map, line) {
                lines.push(hit.line);
            }
            true
        });
    }
    replay_crossings(world, hooks, id, lines, (x, y), (x + momx, y + momy));
}

/// Applies one tick of horizontal momentum. A blocked move is handed to
/// the bounce resolver for `BOUNCE` entities and the slide resolver for
/// everything else; the return value says whether the plain move worked.
pub fn move_by_momentum(world: &mut World, hooks: &mut dyn GameHooks, id: EntityId) -> bool {
    let Some(e) = world.entities.get(id) else { return false };
    let (x, y) = (e.x + e.momx, e.y + e.momy);
    let report = try_move_report(world, hooks, id, x, y, true);
    if report.moved {
        return true;
    }
    let Some(e) = world.entities.get(id) else { return false };
    if e.flags.contains(MobjFlags::BOUNCE) {
        deflect::bounce_move(world, hooks, id, report.hit_thing);
    } else {
        deflect::slide_move(world, hooks, id, report.hit_thing);
    }
    false
}
