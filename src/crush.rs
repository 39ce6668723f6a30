//! Re-fitting entities after sector heights change.
//!
//! [`check_sector`] runs two passes over everything touching a moved
//! sector: a probe that only reports whether anything refuses to fit, then
//! (if nothing did) the real pass that applies crush damage. Sector chains
//! are walked by rescanning from the head for the first unvisited node, so
//! hooks may add or remove nodes mid-scan.

use tracing::{debug, trace};

use crate::api::GameHooks;
use crate::narrowphase::{self, midpoint_deltas};
use crate::types::*;
use crate::world::World;

/// Re-reads the floor and ceiling under `id` and snaps it onto a floor that
/// moved under it. Returns `false` when it no longer fits.
pub fn thing_height_clip(world: &mut World, hooks: &mut dyn GameHooks, id: EntityId) -> bool {
    let Some(e) = world.entities.get(id) else { return true };
    if e.flags.contains(MobjFlags::NOCLIPHEIGHT) {
        return true;
    }
    let (old_floor_z, old_z) = (e.floor_z, e.z);
    let (old_floor_surface, old_ceiling_surface) = (e.floor_surface, e.ceiling_surface);
    let on_floor = e.on_ground();
    let (x, y) = (e.x, e.y);

    let Some(check) = narrowphase::check_position(world, hooks, id, x, y) else { return true };

    let old_surface_holds = |surface: Surface| match surface {
        Surface::SubSurface(r) => world.map.sub_surface(r).is_some_and(|sub| {
            sub.flags.contains(SubSurfaceFlags::EXISTS) && sub.flags.intersects(SubSurfaceFlags::SOLID)
        }),
        _ => true,
    };
    let Some(e) = world.entities.get(id) else { return true };
    let flipped = e.is_flipped();
    let floor_moved = if flipped { check.ceiling_z != e.ceiling_z } else { check.floor_z != e.floor_z };
    let holds = old_surface_holds(if flipped { old_ceiling_surface } else { old_floor_surface });

    let Some(e) = world.entities.get_mut(id) else { return true };
    e.floor_z = check.floor_z;
    e.ceiling_z = check.ceiling_z;
    e.floor_surface = check.floor_surface;
    e.ceiling_surface = check.ceiling_surface;

    // raised clean past the entity: leave it to the crusher's ceiling test
    if check.floor_z > old_floor_z.saturating_add(e.height) {
        return true;
    }

    if on_floor && !e.flags.contains(MobjFlags::NOGRAVITY) && floor_moved {
        if holds {
            let target = if flipped { e.ceiling_z - e.height } else { e.floor_z };
            e.pmomz = target - e.z;
            e.eflags.insert(ExtraFlags::APPLY_PMOMZ);
            e.z = target;
        }
    } else if check.floor_thing.is_none() {
        if flipped {
            if !on_floor && e.z < check.floor_z {
                e.z = e.floor_z;
            }
        } else if !on_floor && e.top() > check.ceiling_z {
            e.z = e.ceiling_z - e.height;
        }
    }

    let rose = (e.z as i64 - old_z as i64) * e.flip_sign() as i64 > 0;
    let is_player = e.is_player();
    e.eflags.remove(ExtraFlags::ONGROUND);
    let fits = !(e.ceiling_z.saturating_sub(e.floor_z) < e.height && e.z >= e.floor_z);

    if rose && is_player {
        hooks.hit_floor(world, id);
    }
    fits
}

/// Re-fits one entity. Returns `false` when it blocks the sector change.
fn change_sector(world: &mut World, hooks: &mut dyn GameHooks, id: EntityId, realcrush: bool, crunch: bool) -> bool {
    if thing_height_clip(world, hooks, id) {
        return true;
    }
    let Some(e) = world.entities.get(id) else { return true };
    if !e.flags.intersects(MobjFlags::SHOOTABLE | MobjFlags::PUSHABLE) || e.flags.contains(MobjFlags::NOCLIPHEIGHT) {
        return true;
    }
    let immune_pushable = e.flags.contains(MobjFlags::PUSHABLE) && !e.flags.contains(MobjFlags::SHOOTABLE);

    if e.top() > e.ceiling_z && e.z <= e.ceiling_z {
        let sector = world.map.sector(e.sector);
        if immune_pushable && e.top() > sector.ceiling_height {
            debug!(?id, "crusher blocked by pushable");
            return false;
        }

        if immune_pushable {
            let blocker = sector.sub_surfaces.iter().find(|sub| {
                let solid_for = if e.is_player() { SubSurfaceFlags::BLOCK_PLAYER } else { SubSurfaceFlags::BLOCK_OTHERS };
                if !sub.flags.contains(solid_for) || !sub.flags.contains(SubSurfaceFlags::EXISTS) {
                    return false;
                }
                let control = world.map.sector(sub.control);
                let (top, bottom) = (control.ceiling_height, control.floor_height);
                let (d1, d2) = midpoint_deltas(e.z, e.top(), top, bottom);
                bottom <= e.ceiling_z && d1 >= d2
            });
            if blocker.is_some() {
                debug!(?id, "sub-surface crusher blocked by pushable");
                return false;
            }
        }

        if realcrush {
            let kind = if e.is_spectator() { DamageKind::Spectator } else { DamageKind::Crushed };
            hooks.apply_damage(world, id, None, None, Damage::new(1, kind));
            return true;
        }
    }

    if realcrush && crunch {
        hooks.apply_damage(world, id, None, None, Damage::new(1, DamageKind::Normal));
    }
    true
}

/// Entities whose origin lies inside a solid polyobject driven by `sector`.
fn poly_riders(world: &World, sector: SectorId) -> Vec<EntityId> {
    let mut out = Vec::new();
    for (p, poly) in world.map.polyobjects.iter().enumerate() {
        if poly.control != sector || !poly.flags.contains(PolyFlags::SOLID) {
            continue;
        }
        let pid = PolyId(p as u32);
        for cell in world.blockmap.cells(&poly.bbox).iter() {
            for id in world.blockmap.things_in(cell) {
                let inside = world.entities.get(id).is_some_and(|e| world.map.poly_contains_point(pid, e.x, e.y));
                if inside && !out.contains(&id) {
                    out.push(id);
                }
            }
        }
    }
    out
}

/// Re-fits every entity node of `sector` once, tolerating chain edits.
/// Stops at the first entity that refuses to fit.
fn scan_sector(world: &mut World, hooks: &mut dyn GameHooks, sector: SectorId, realcrush: bool, crunch: bool) -> bool {
    world.nodes.clear_visited(sector);
    while let Some(thing) = world.nodes.next_unvisited(sector) {
        let Some(id) = thing else { continue };
        if world.entities.get(id).is_none_or(|e| e.flags.contains(MobjFlags::NOBLOCKMAP)) {
            continue;
        }
        if !change_sector(world, hooks, id, realcrush, crunch) {
            return false;
        }
    }
    true
}

/// One pass over the polyobject riders, attached sectors and the sector
/// itself. Returns `false` as soon as something refuses to fit.
fn sector_pass(world: &mut World, hooks: &mut dyn GameHooks, sector: SectorId, realcrush: bool, crunch: bool) -> bool {
    for id in poly_riders(world, sector) {
        if world.entities.contains(id) && !change_sector(world, hooks, id, realcrush, crunch) {
            return false;
        }
    }

    let attached = world.map.sector(sector).attached.clone();
    for link in attached {
        world.map.sectors[link.sector.idx()].moved = true;
        if !link.solid {
            continue;
        }
        if !scan_sector(world, hooks, link.sector, realcrush, crunch) {
            return false;
        }
    }

    world.map.sectors[sector.idx()].moved = true;
    scan_sector(world, hooks, sector, realcrush, crunch)
}

/// Re-validates everything touching `sector` after its heights changed.
/// Returns `true` when something could not fit; in that case no damage was
/// dealt and the caller should undo the height change.
pub fn check_sector(world: &mut World, hooks: &mut dyn GameHooks, sector: SectorId, crunch: bool) -> bool {
    if sector.idx() >= world.map.sectors.len() {
        return false;
    }
    if !sector_pass(world, hooks, sector, false, crunch) {
        trace!(sector = sector.0, "sector change blocked");
        return true;
    }
    !sector_pass(world, hooks, sector, true, crunch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::MovementApi;
    use crate::fixed::{Fixed, units};
    use crate::map::Sector;
    use crate::test_level::{RecordingHooks, RoomRow, player_at, thing_at, world_of};

    fn room(floor: Fixed, ceiling: Fixed) -> World {
        world_of(RoomRow::new(units(256)).room(units(256), floor, ceiling).build())
    }

    #[test]
    fn test_lowered_ceiling_crushes_once() {
        let mut w = room(0, units(128));
        let p = w.spawn(player_at(units(128), units(128), 0));
        w.map.sectors[0].ceiling_height = units(16);
        let mut hooks = RecordingHooks::default();
        let nofit = check_sector(&mut w, &mut hooks, SectorId(0), false);
        assert!(!nofit);
        assert_eq!(hooks.damage.len(), 1);
        assert_eq!(hooks.damage[0].target, p);
        assert_eq!(hooks.damage[0].damage.kind, DamageKind::Crushed);
        assert_eq!(hooks.damage[0].inflictor, None);
    }

    #[test]
    fn test_crunch_does_not_double_crushed_damage() {
        let mut w = room(0, units(128));
        w.spawn(player_at(units(128), units(128), 0));
        w.map.sectors[0].ceiling_height = units(16);
        let mut hooks = RecordingHooks::default();
        assert!(!check_sector(&mut w, &mut hooks, SectorId(0), true));
        let kinds: Vec<DamageKind> = hooks.damage.iter().map(|d| d.damage.kind).collect();
        assert_eq!(kinds, vec![DamageKind::Crushed]);
    }

    #[test]
    fn test_spectators_are_respawned_not_crushed() {
        let mut w = room(0, units(128));
        let p = w.spawn(player_at(units(128), units(128), 0));
        w.entity_mut(p).unwrap().player.as_mut().unwrap().spectator = true;
        w.map.sectors[0].ceiling_height = units(16);
        let mut hooks = RecordingHooks::default();
        check_sector(&mut w, &mut hooks, SectorId(0), false);
        assert_eq!(hooks.damage[0].damage.kind, DamageKind::Spectator);
    }

    #[test]
    fn test_unaffected_things_ignore_the_crusher() {
        let mut w = room(0, units(128));
        w.spawn(thing_at(units(128), units(128), 0));
        w.map.sectors[0].ceiling_height = units(16);
        let mut hooks = RecordingHooks::default();
        assert!(!check_sector(&mut w, &mut hooks, SectorId(0), true));
        assert!(hooks.damage.is_empty());
    }

    #[test]
    fn test_pushable_blocks_the_crusher() {
        let mut w = room(0, units(128));
        let crate_ = w.spawn(thing_at(units(128), units(128), 0).with_flags(MobjFlags::SOLID | MobjFlags::PUSHABLE));
        w.map.sectors[0].ceiling_height = units(16);
        let mut hooks = RecordingHooks::default();
        assert!(check_sector(&mut w, &mut hooks, SectorId(0), false));
        assert!(hooks.damage.is_empty());
        assert!(w.entity(crate_).is_some());
    }

    #[test]
    fn test_rising_floor_lifts_standing_entity() {
        let mut w = room(0, units(128));
        let a = w.spawn(thing_at(units(128), units(128), 0));
        w.map.sectors[0].floor_height = units(8);
        let mut hooks = RecordingHooks::default();
        assert!(!check_sector(&mut w, &mut hooks, SectorId(0), false));
        let e = w.entity(a).unwrap();
        assert_eq!((e.z, e.floor_z, e.pmomz), (units(8), units(8), units(8)));
        assert!(e.eflags.contains(ExtraFlags::APPLY_PMOMZ));
        assert!(hooks.damage.is_empty());
    }

    #[test]
    fn test_player_lifted_by_floor_hits_floor() {
        let mut w = room(0, units(128));
        let p = w.spawn(player_at(units(128), units(128), 0));
        w.map.sectors[0].floor_height = units(8);
        let mut hooks = RecordingHooks::default();
        assert!(thing_height_clip(&mut w, &mut hooks, p));
        assert_eq!(hooks.floor_hits, vec![p]);
    }

    #[test]
    fn test_attached_sectors_marked_moved() {
        let mut parts = RoomRow::new(units(128))
            .room(units(256), 0, units(128))
            .room(units(256), 0, units(128))
            .parts();
        parts.sectors[0] = Sector::new(0, units(128)).with_attached(SectorId(1), false);
        let mut w = world_of(parts.build());
        let mut hooks = RecordingHooks::default();
        assert!(!check_sector(&mut w, &mut hooks, SectorId(0), false));
        assert!(w.map.sector(SectorId(0)).moved);
        assert!(w.map.sector(SectorId(1)).moved);
    }

    #[test]
    fn test_solid_attached_sector_is_scanned() {
        let mut parts = RoomRow::new(units(128))
            .room(units(256), 0, units(128))
            .room(units(256), 0, units(128))
            .parts();
        parts.sectors[0] = Sector::new(0, units(128)).with_attached(SectorId(1), true);
        let mut w = world_of(parts.build());
        let p = w.spawn(player_at(units(400), units(64), 0));
        w.map.sectors[1].ceiling_height = units(16);
        let mut hooks = RecordingHooks::default();
        assert!(!check_sector(&mut w, &mut hooks, SectorId(0), false));
        assert_eq!(hooks.damage.len(), 1);
        assert_eq!(hooks.damage[0].target, p);
    }

    #[test]
    fn test_removal_during_scan_is_tolerated() {
        let mut w = room(0, units(128));
        let a = w.spawn(player_at(units(64), units(64), 0));
        let b = w.spawn(player_at(units(192), units(192), 0));
        w.map.sectors[0].ceiling_height = units(16);
        let mut hooks = RecordingHooks { lethal: true, ..Default::default() };
        assert!(!check_sector(&mut w, &mut hooks, SectorId(0), false));
        assert_eq!(hooks.damage.len(), 2);
        assert!(w.entity(a).is_none() && w.entity(b).is_none());
        assert_eq!(w.stats().sector_nodes, 0);
    }

    #[test]
    fn test_polyobject_riders_are_checked() {
        let mut parts = RoomRow::new(units(256)).room(units(256), 0, units(128)).parts();
        let poly = parts.add_box_poly(
            0,
            units(64),
            units(64),
            units(192),
            units(192),
            Some((0, units(8))),
            PolyFlags::SOLID | PolyFlags::CLIP_PLANES,
        );
        let mut w = world_of(parts.build());
        let control = w.map.poly(poly).control;
        let p = w.spawn(player_at(units(128), units(128), units(8)));
        w.map.sectors[control.idx()].ceiling_height = units(16);
        let mut hooks = RecordingHooks::default();
        assert!(!check_sector(&mut w, &mut hooks, control, false));
        assert_eq!(w.entity(p).unwrap().floor_z, units(16));
    }
}
