//! Deflection after a blocked move: sliding along walls and bouncing off them.
//!
//! Both resolvers trace the three leading corners of the entity's box along
//! its momentum, take the nearest blocking line, move up to just short of it
//! and redirect the remaining momentum. Retries are capped so degenerate
//! geometry always terminates in the stair-step (slide) or bounce-back
//! fallback.

use glam::IVec2;
use tracing::debug;

use crate::api::GameHooks;
use crate::fixed::{ANGLE_90, ANGLE_180, FRACUNIT, Fixed, approx_distance, fine_cos, fine_sin, fixed_div, fixed_mul, point_to_angle};
use crate::map::{Divline, SlopeType};
use crate::movement::{get_thing_step_up, sub_step, try_move};
use crate::narrowphase::{self, line_opening};
use crate::traverse::{leading_corners, path_traverse};
use crate::types::*;
use crate::world::World;

/// Distance kept from the wall when moving up to it.
const SLIDE_FUDGE: Fixed = 0x800;
/// Attempts before falling back to stair-stepping or bouncing straight back.
const MAX_HITS: u32 = 3;
/// 0.625
pub const WALL_DAMPING: Fixed = FRACUNIT - (FRACUNIT >> 2) - (FRACUNIT >> 3);
const THROWN_DAMPING: Fixed = FRACUNIT - (FRACUNIT >> 6) - (FRACUNIT >> 5);

// --- Wall search ---------------------------------------------------------------

/// Whether `lid` stops a slide of `id` from its current position.
fn line_blocks_slide(world: &World, id: EntityId, lid: LineId) -> bool {
    let Some(e) = world.entities.get(id) else { return false };
    let line = world.map.line(lid);
    if line.back.is_none() {
        return line.point_side(e.x, e.y) == 0;
    }
    if narrowphase::is_line_blocking(line, e) {
        return true;
    }
    let Some(o) = line_opening(world, lid, id, e.x, e.y) else { return false };
    o.range < e.height || o.top.saturating_sub(e.z) < e.height || o.bottom.saturating_sub(e.z) > get_thing_step_up(world, id)
}

/// Nearest blocking line along `(momx, momy)` from the leading corners.
/// Player contact with a touch-triggered polyobject is reported to the hooks.
fn find_wall(world: &mut World, hooks: &mut dyn GameHooks, id: EntityId, momx: Fixed, momy: Fixed) -> Option<(Fixed, LineId)> {
    let e = world.entities.get(id)?;
    let corners = leading_corners(e.x, e.y, e.radius, e.momx, e.momy);
    let is_player = e.is_player();

    let mut best: Option<(Fixed, LineId)> = None;
    let mut touched = Vec::new();
    for (sx, sy) in corners {
        path_traverse(world, sx, sy, sx + momx, sy + momy, |world, hit| {
            if !line_blocks_slide(world, id, hit.line) {
                return true;
            }
            if is_player {
                if let Some(pid) = world.map.line(hit.line).polyobject {
                    if !touched.contains(&pid) {
                        touched.push(pid);
                    }
                }
            }
            if best.is_none_or(|(frac, _)| hit.frac < frac) {
                best = Some((hit.frac, hit.line));
            }
            false
        });
    }

    for pid in touched {
        let poly = world.map.poly(pid);
        let trigger = world.map.sector(poly.control).flags.contains(SectorFlags::TRIGGER_ON_TOUCH);
        if trigger && !poly.flags.contains(PolyFlags::NO_SPECIALS) && world.entities.contains(id) {
            hooks.touch_polyobject(world, pid, id);
        }
    }
    best
}

// --- Velocity redirection ------------------------------------------------------

/// Keeps only the component of `(mx, my)` along `wall`.
pub(crate) fn clip_to_wall(wall: &Divline, mx: Fixed, my: Fixed) -> (Fixed, Fixed) {
    match wall.slope_type() {
        SlopeType::Horizontal => (mx, 0),
        SlopeType::Vertical => (0, my),
        SlopeType::Positive | SlopeType::Negative => {
            let d = wall.delta.as_i64vec2();
            let len2 = d.x as i128 * d.x as i128 + d.y as i128 * d.y as i128;
            let dot = mx as i128 * d.x as i128 + my as i128 * d.y as i128;
            ((d.x as i128 * dot / len2) as Fixed, (d.y as i128 * dot / len2) as Fixed)
        }
    }
}

/// Mirrors `(mx, my)` about `wall`.
pub(crate) fn reflect(wall: &Divline, mx: Fixed, my: Fixed) -> (Fixed, Fixed) {
    match wall.slope_type() {
        SlopeType::Horizontal => (mx, -my),
        SlopeType::Vertical => (-mx, my),
        SlopeType::Positive | SlopeType::Negative => {
            let (px, py) = clip_to_wall(wall, mx, my);
            (px.wrapping_mul(2).wrapping_sub(mx), py.wrapping_mul(2).wrapping_sub(my))
        }
    }
}

/// Liquid walls: a player sliding into a two-sided line whose far sector
/// holds a damaging swimmable slab at its height gets hurt.
fn check_lava_wall(world: &mut World, hooks: &mut dyn GameHooks, id: EntityId, sector: SectorId) {
    let Some(e) = world.entities.get(id) else { return };
    let hot = world.map.sector(sector).sub_surfaces.iter().any(|sub| {
        let lava = SubSurfaceFlags::EXISTS | SubSurfaceFlags::SWIMMABLE | SubSurfaceFlags::DAMAGING;
        if !sub.flags.contains(lava) {
            return false;
        }
        let (top, bottom) = world.map.sub_surface_span(sub, e.x, e.y);
        top >= e.z && bottom <= e.top()
    });
    if hot {
        hooks.apply_damage(world, id, None, None, Damage::new(1, DamageKind::Normal));
    }
}

// --- Slide ---------------------------------------------------------------------

/// Try the y axis, then the x axis.
fn stairstep(world: &mut World, hooks: &mut dyn GameHooks, id: EntityId) {
    let Some(e) = world.entities.get(id) else { return };
    let (x, y, momx, momy) = (e.x, e.y, e.momx, e.momy);
    debug!(?id, "slide fell back to stair-stepping");
    if !try_move(world, hooks, id, x, y + momy, true) && world.entities.contains(id) {
        try_move(world, hooks, id, x + momx, y, true);
    }
}

/// Drops the momentum across the blocker and moves flush against it.
fn snap_alongside(world: &mut World, hooks: &mut dyn GameHooks, id: EntityId, (x, y, along_x): (Fixed, Fixed, bool)) {
    if let Some(e) = world.entities.get_mut(id) {
        if along_x {
            e.momy = 0;
        } else {
            e.momx = 0;
        }
    }
    try_move(world, hooks, id, x, y, true);
}

/// Slides along the face of the entity that blocked the move. Returns the
/// paper face to slide along when the box shortcuts do not apply.
fn slide_against_thing(world: &mut World, hooks: &mut dyn GameHooks, id: EntityId, thing: EntityId) -> Option<(Fixed, Divline)> {
    let (e, t) = (world.entities.get(id)?, world.entities.get(thing)?);
    let (x, y, r, momx, momy) = (e.x, e.y, e.radius, e.momx, e.momy);

    if t.flags.contains(MobjFlags::PAPER_COLLISION) {
        let c = fixed_mul(t.radius, fine_cos(t.angle));
        let s = fixed_mul(t.radius, fine_sin(t.angle));
        let (v1, v2) = (IVec2::new(t.x - c, t.y - s), IVec2::new(t.x + c, t.y + s));
        let (lo, hi) = (v1.min(v2), v1.max(v2));

        let snap = if s != 0 && y + r <= lo.y {
            Some((x + momx, lo.y - r, true))
        } else if s != 0 && y - r >= hi.y {
            Some((x + momx, hi.y + r, true))
        } else if c != 0 && x + r <= lo.x {
            Some((lo.x - r, y + momy, false))
        } else if c != 0 && x - r >= hi.x {
            Some((hi.x + r, y + momy, false))
        } else {
            None
        };
        if let Some(snap) = snap {
            snap_alongside(world, hooks, id, snap);
            return None;
        }

        let face = Divline::new(v1, IVec2::new(2 * c, 2 * s));
        let best = leading_corners(x, y, r, momx, momy)
            .iter()
            .map(|&(sx, sy)| Divline::new(IVec2::new(sx, sy), IVec2::new(momx, momy)).intercept(&face).unwrap_or(0))
            .min()
            .unwrap_or(0);
        return Some((best, face));
    }

    let tr = t.radius;
    let (tx, ty) = (t.x, t.y);
    let snap = if y + r <= ty - tr {
        Some((x + momx, ty - tr - r, true))
    } else if y - r >= ty + tr {
        Some((x + momx, ty + tr + r, true))
    } else if x + r <= tx - tr {
        Some((tx - tr - r, y + momy, false))
    } else if x - r >= tx + tr {
        Some((tx + tr + r, y + momy, false))
    } else {
        None
    };
    match snap {
        Some(snap) => snap_alongside(world, hooks, id, snap),
        None => {
            if let Some(e) = world.entities.get_mut(id) {
                e.momx = 0;
                e.momy = 0;
            }
        }
    }
    None
}

/// Redirects a blocked move along the nearest wall (or the face of the
/// entity that blocked it) and moves the remaining distance.
pub fn slide_move(world: &mut World, hooks: &mut dyn GameHooks, id: EntityId, hit_thing: Option<EntityId>) {
    let Some(e) = world.entities.get(id) else { return };

    let mut paper: Option<(Fixed, Divline)> = None;
    if let Some(t) = hit_thing.and_then(|t| world.entities.get(t).map(|te| (t, te))) {
        let (thing, te) = t;
        if e.top() > te.z && e.z < te.top() {
            if te.flags.contains(MobjFlags::PUSHABLE) {
                return;
            }
            paper = slide_against_thing(world, hooks, id, thing);
            if paper.is_none() {
                return;
            }
        }
    }

    let mut hits = 0;
    let mut success = false;
    loop {
        let (best, wall) = match paper.take() {
            Some(face) => face,
            None => {
                hits += 1;
                if hits == MAX_HITS {
                    stairstep(world, hooks, id);
                    return;
                }
                let Some(e) = world.entities.get(id) else { return };
                let (momx, momy) = (e.momx, e.momy);
                let Some((frac, lid)) = find_wall(world, hooks, id, momx, momy) else {
                    stairstep(world, hooks, id);
                    return;
                };

                let Some(e) = world.entities.get(id) else { return };
                let line = world.map.line(lid);
                if e.is_player() && line.back.is_some() {
                    let far = if line.point_side(e.x, e.y) == 1 { Some(line.front) } else { line.back };
                    if let Some(far) = far {
                        check_lava_wall(world, hooks, id, far);
                    }
                }
                (frac, world.map.line(lid).divline())
            }
        };
        // a face from a paper entity only gets one pass
        let from_paper = hits == 0;

        let Some(e) = world.entities.get(id) else { return };
        let (x, y, momx, momy) = (e.x, e.y, e.momx, e.momy);
        let best = best - SLIDE_FUDGE;
        if best > 0 && !try_move(world, hooks, id, x + fixed_mul(momx, best), y + fixed_mul(momy, best), true) {
            stairstep(world, hooks, id);
            return;
        }

        let remainder = (FRACUNIT - (best + SLIDE_FUDGE)).min(FRACUNIT);
        if remainder <= 0 {
            return;
        }
        let (mut tmx, mut tmy) = clip_to_wall(&wall, fixed_mul(momx, remainder), fixed_mul(momy, remainder));

        let Some(e) = world.entities.get_mut(id) else { return };
        e.momx = tmx;
        e.momy = tmy;
        let step = sub_step(e.radius, &world.cfg);

        loop {
            let Some(e) = world.entities.get(id) else { return };
            let (nx, dx) = chunk(e.x, tmx, step);
            let (ny, dy) = chunk(e.y, tmy, step);
            tmx = dx;
            tmy = dy;
            if !try_move(world, hooks, id, nx, ny, true) {
                if success || !world.entities.contains(id) {
                    return;
                }
                break;
            }
            success = true;
            if tmx == 0 && tmy == 0 {
                return;
            }
        }
        if from_paper {
            stairstep(world, hooks, id);
            return;
        }
    }
}

/// One radius-limited slice of a remaining move: the next coordinate and
/// what is left afterwards.
#[inline]
fn chunk(pos: Fixed, remaining: Fixed, step: Fixed) -> (Fixed, Fixed) {
    if remaining > step {
        (pos + step, remaining - step)
    } else if remaining < -step {
        (pos - step, remaining + step)
    } else {
        (pos + remaining, 0)
    }
}

// --- Bounce --------------------------------------------------------------------

/// Reverses the entity if it can move back the way it came.
fn bounce_back(world: &mut World, hooks: &mut dyn GameHooks, id: EntityId, momx: Fixed, momy: Fixed) {
    let Some(e) = world.entities.get(id) else { return };
    let (x, y) = (e.x, e.y);
    debug!(?id, "bounce fell back to reversing");
    if try_move(world, hooks, id, x - momx, y - momy, true) {
        if let Some(e) = world.entities.get_mut(id) {
            e.momx = fixed_mul(-e.momx, WALL_DAMPING);
            e.momy = fixed_mul(-e.momy, WALL_DAMPING);
        }
    }
}

/// Reflects a blocked move off the nearest wall with a damping that depends
/// on what is bouncing.
pub fn bounce_move(world: &mut World, hooks: &mut dyn GameHooks, id: EntityId, hit_thing: Option<EntityId>) {
    let Some(e) = world.entities.get(id) else { return };
    if e.is_player() {
        bounce_player_move(world, hooks, id, hit_thing);
        return;
    }
    if e.eflags.contains(ExtraFlags::JUST_BOUNCED_WALL) {
        slide_move(world, hooks, id, hit_thing);
        return;
    }

    let mut hits = 0;
    loop {
        let Some(e) = world.entities.get(id) else { return };
        let (mmx, mmy) = (e.momx, e.momy);
        hits += 1;
        if hits == MAX_HITS {
            bounce_back(world, hooks, id, mmx, mmy);
            return;
        }
        let Some((frac, lid)) = find_wall(world, hooks, id, mmx, mmy) else {
            bounce_back(world, hooks, id, mmx, mmy);
            return;
        };

        let Some(e) = world.entities.get(id) else { return };
        let (x, y, kind) = (e.x, e.y, e.kind);
        let best = frac - SLIDE_FUDGE;
        if best > 0 && !try_move(world, hooks, id, x + fixed_mul(mmx, best), y + fixed_mul(mmy, best), true) {
            bounce_back(world, hooks, id, mmx, mmy);
            return;
        }

        let remainder = (FRACUNIT - best).min(FRACUNIT);
        if remainder <= 0 {
            return;
        }

        let (tmx, tmy) = match kind {
            EntityKind::Shell => (mmx, mmy),
            EntityKind::ThrownBounce => (fixed_mul(mmx, THROWN_DAMPING), fixed_mul(mmy, THROWN_DAMPING)),
            EntityKind::ThrownGrenade => (fixed_div(mmx, 2 * FRACUNIT), fixed_div(mmy, 2 * FRACUNIT)),
            _ => (fixed_mul(mmx, WALL_DAMPING), fixed_mul(mmy, WALL_DAMPING)),
        };

        let line = world.map.line(lid);
        if line.flags.contains(LineFlags::NOT_BOUNCY) {
            slide_move(world, hooks, id, hit_thing);
            return;
        }
        let (tmx, tmy) = reflect(&line.divline(), tmx, tmy);

        let Some(e) = world.entities.get_mut(id) else { return };
        e.momx = tmx;
        e.momy = tmy;
        let (x, y) = (e.x, e.y);
        if try_move(world, hooks, id, x + tmx, y + tmy, true) || !world.entities.contains(id) {
            return;
        }
    }
}

/// Kart wall bounce: damped relative momentum plus a push out along the
/// wall normal. Trip-wires push four times as hard and leave the move to
/// the trip-wire hook.
pub fn bounce_player_move(world: &mut World, hooks: &mut dyn GameHooks, id: EntityId, hit_thing: Option<EntityId>) {
    let Some(e) = world.entities.get(id) else { return };
    let Some(p) = &e.player else { return };
    if p.spectator {
        slide_move(world, hooks, id, hit_thing);
        return;
    }
    let (old_momx, old_momy) = (e.momx, e.momy);
    let (mmx, mmy) = (p.rmomx, p.rmomy);
    let just_bounced = e.eflags.contains(ExtraFlags::JUST_BOUNCED_WALL);

    let Some((frac, lid)) = find_wall(world, hooks, id, mmx, mmy) else { return };
    let remainder = (FRACUNIT - frac).min(FRACUNIT);
    if remainder <= 0 {
        return;
    }

    let (mut tmx, mut tmy) =
        if just_bounced { (mmx, mmy) } else { (fixed_mul(mmx, WALL_DAMPING), fixed_mul(mmy, WALL_DAMPING)) };

    let tripwire = world.map.line(lid).tripwire;
    if tripwire {
        hooks.apply_tripwire(world, id);
    } else {
        hooks.bump_effect(world, id);
    }

    let Some(e) = world.entities.get(id) else { return };
    let line = world.map.line(lid);
    let mut normal = point_to_angle(line.dx, line.dy).wrapping_sub(ANGLE_90);
    if line.point_side(e.x, e.y) == 1 {
        normal = normal.wrapping_add(ANGLE_180);
    }
    let min_push = fixed_mul(world.cfg.player_bounce_min_speed, world.cfg.map_object_scale);
    let push = approx_distance(tmx, tmy).max(min_push);
    let (px, py) = (fixed_mul(push, fine_cos(normal)), fixed_mul(push, fine_sin(normal)));
    if tripwire {
        tmx = px.wrapping_mul(4);
        tmy = py.wrapping_mul(4);
    } else {
        tmx += px;
        tmy += py;
    }

    let Some(e) = world.entities.get_mut(id) else { return };
    e.eflags.insert(ExtraFlags::JUST_BOUNCED_WALL);
    e.momx = tmx;
    e.momy = tmy;
    if let Some(p) = e.player.as_mut() {
        p.cmomx = tmx;
        p.cmomy = tmy;
    }
    let (x, y) = (e.x, e.y);

    if !tripwire && !try_move(world, hooks, id, x + tmx, y + tmy, true) && world.entities.contains(id) {
        try_move(world, hooks, id, x - old_momx, y - old_momy, true);
    }
}
