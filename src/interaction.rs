//! Pairwise entity contact: what happens when a mover's candidate box
//! overlaps another entity.
//!
//! After the shared skips (self, spectators, hitlag, non-colliding things,
//! separation, paper shapes and the collide hooks) the pair runs through
//! [`CASCADE`] in order. The first rule that returns something other than
//! [`Verdict::Continue`] decides the pair; most rules refuse to act when the
//! two are not overlapping vertically.

use tracing::trace;

use crate::api::GameHooks;
use crate::entity::Entity;
use crate::fixed::{
    ANGLE_22H, ANGLE_90, ANGLE_180, Angle, FRACBITS, FRACUNIT, Fixed, approx_distance, fine_cos,
    fine_sin, fixed_div, fixed_mul, fixed_sqrt, point_to_angle, point_to_dist, units,
};
use crate::map::BBox;
use crate::movement;
use crate::narrowphase::{PositionCheck, paper_pair_misses};
use crate::types::*;
use crate::world::World;

/// Tire grease applied after a spring launch, in tics.
pub const GREASE_TICS: u32 = 105;

/// Outcome of one rule for one pair.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Verdict {
    /// Rule does not apply; try the next one.
    Continue,
    /// Pair resolved, the mover may stay.
    Pass,
    /// Pair resolved, the position is blocked.
    Block,
}

impl Verdict {
    #[inline]
    fn passing(pass: bool) -> Self {
        if pass { Verdict::Pass } else { Verdict::Block }
    }
}

/// Category rules in evaluation order. Reordering changes gameplay.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PairRule {
    /// A solid spike rising into something lifts it on top and hurts it.
    RisingSpike,
    Pain,
    SkullFly,
    Item(ItemGroup),
    /// Item boxes only collect, never collide.
    RandomItem,
    BubbleReflect,
    /// Shields pass through everything they did not reflect.
    BubbleGhost,
    SpringShell,
    Missile,
    Push,
    SpecialPickup,
    SpriteSpike,
    WallSpike,
    FanOnPushable,
    PushableLauncher,
    SolidEnemies,
    FanOnPlayer,
    PlayerContact,
    /// Solid on solid: one stands on the other or hits its head.
    SolidStack,
}

pub const CASCADE: [PairRule; 27] = [
    PairRule::RisingSpike,
    PairRule::Pain,
    PairRule::SkullFly,
    PairRule::Item(ItemGroup::IceBlock),
    PairRule::Item(ItemGroup::EggBox),
    PairRule::RandomItem,
    PairRule::BubbleReflect,
    PairRule::BubbleGhost,
    PairRule::Item(ItemGroup::OrbinautJawz),
    PairRule::Item(ItemGroup::BananaBallhog),
    PairRule::Item(ItemGroup::Mine),
    PairRule::Item(ItemGroup::MineExplosion),
    PairRule::Item(ItemGroup::LandMine),
    PairRule::Item(ItemGroup::Sink),
    PairRule::Item(ItemGroup::FallingRock),
    PairRule::SpringShell,
    PairRule::Missile,
    PairRule::Push,
    PairRule::SpecialPickup,
    PairRule::SpriteSpike,
    PairRule::WallSpike,
    PairRule::FanOnPushable,
    PairRule::PushableLauncher,
    PairRule::SolidEnemies,
    PairRule::FanOnPlayer,
    PairRule::PlayerContact,
    PairRule::SolidStack,
];

/// The mover and the entity it is being tested against.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Pair {
    pub mover: EntityId,
    pub thing: EntityId,
}

impl Pair {
    fn get<'w>(&self, world: &'w World) -> Option<(&'w Entity, &'w Entity)> {
        Some((world.entities.get(self.mover)?, world.entities.get(self.thing)?))
    }

    fn alive(&self, world: &World) -> bool {
        world.entities.contains(self.mover) && world.entities.contains(self.thing)
    }
}

impl PairRule {
    pub fn apply(self, world: &mut World, hooks: &mut dyn GameHooks, check: &mut PositionCheck, pair: Pair) -> Verdict {
        match self {
            PairRule::RisingSpike => rising_spike(world, hooks, pair),
            PairRule::Pain => pain(world, hooks, pair),
            PairRule::SkullFly => skull_fly(world, pair),
            PairRule::Item(group) => item(world, hooks, pair, group),
            PairRule::RandomItem => random_item(world, pair),
            PairRule::BubbleReflect => bubble_reflect(world, hooks, pair),
            PairRule::BubbleGhost => bubble_ghost(world, pair),
            PairRule::SpringShell => spring_shell(world, hooks, pair),
            PairRule::Missile => missile(world, hooks, pair),
            PairRule::Push => push(world, hooks, pair),
            PairRule::SpecialPickup => special_pickup(world, hooks, pair),
            PairRule::SpriteSpike => sprite_spike(world, hooks, pair),
            PairRule::WallSpike => wall_spike(world, hooks, pair),
            PairRule::FanOnPushable => fan_on_pushable(world, pair),
            PairRule::PushableLauncher => pushable_launcher(world, hooks, pair),
            PairRule::SolidEnemies => solid_enemies(world, pair),
            PairRule::FanOnPlayer => fan_on_player(world, pair),
            PairRule::PlayerContact => player_contact(world, hooks, pair),
            PairRule::SolidStack => solid_stack(world, check, pair),
        }
    }
}

/// Resolves `mover` (at the candidate point in `check`) against `thing`.
pub fn check_thing(
    world: &mut World,
    hooks: &mut dyn GameHooks,
    check: &mut PositionCheck,
    mover: EntityId,
    thing: EntityId,
) -> Verdict {
    if mover == thing {
        return Verdict::Pass;
    }
    let pair = Pair { mover, thing };
    let Some((m, t)) = pair.get(world) else { return Verdict::Pass };

    if m.is_spectator() || t.is_spectator() {
        return Verdict::Pass;
    }
    if m.hitlag > 0 && t.hitlag > 0 {
        return Verdict::Pass;
    }
    let collidable = MobjFlags::SOLID | MobjFlags::SPECIAL | MobjFlags::PAIN | MobjFlags::SHOOTABLE | MobjFlags::SPRING;
    if t.flags.contains(MobjFlags::NOCLIPTHING) || !t.flags.intersects(collidable) {
        return Verdict::Pass;
    }
    let reach = t.radius + m.radius;
    if (t.x - check.x).abs() >= reach || (t.y - check.y).abs() >= reach {
        return Verdict::Pass;
    }
    if paper_pair_misses(m, check.x, check.y, t) {
        return Verdict::Pass;
    }

    for (a, b) in [(thing, mover), (mover, thing)] {
        let verdict = hooks.should_collide(world, a, b);
        if !pair.alive(world) {
            return Verdict::Pass;
        }
        match verdict {
            CollideOverride::Force => return Verdict::Block,
            CollideOverride::Skip => return Verdict::Pass,
            CollideOverride::Default => {}
        }
    }

    for rule in CASCADE {
        let verdict = rule.apply(world, hooks, check, pair);
        if verdict != Verdict::Continue {
            trace!(?rule, ?verdict, ?mover, ?thing, "pair resolved");
            return verdict;
        }
        if !pair.alive(world) {
            return Verdict::Pass;
        }
    }
    Verdict::Pass
}

// --- Helpers -------------------------------------------------------------------

/// Vertical spans touch (over/under test shared by most rules).
#[inline]
fn z_overlap(a: &Entity, b: &Entity) -> bool {
    !(a.z > b.top() || a.top() < b.z)
}

fn damage(
    world: &mut World,
    hooks: &mut dyn GameHooks,
    target: EntityId,
    by: EntityId,
    kind: DamageKind,
    flags: DamageFlags,
) -> bool {
    hooks.apply_damage(world, target, Some(by), Some(by), Damage::new(1, kind).with_flags(flags))
}

fn invulnerable_bully(e: &Entity) -> bool {
    e.player.as_ref().is_some_and(|p| p.invincibility_timer > 0 || p.grow_shrink_timer > 0)
}

#[inline]
fn thrust(angle: Angle, speed: Fixed) -> (Fixed, Fixed) {
    (fixed_mul(speed, fine_cos(angle)), fixed_mul(speed, fine_sin(angle)))
}

/// Bends `yours` towards `theirs` by at most 45 degrees, less the slower
/// you are compared to them.
fn reflect_angle(yours: Angle, theirs: Angle, your_speed: Fixed, their_speed: Fixed) -> Angle {
    let mut offset = yours.wrapping_sub(theirs);
    let mut subtract = false;
    if offset > ANGLE_180 {
        offset = offset.wrapping_neg();
        subtract = true;
    }
    if offset > ANGLE_90 {
        offset = ANGLE_180 - offset;
    }
    let mut offset = (offset / 2) as i32;
    if their_speed != 0 && your_speed != 0 && their_speed > your_speed {
        offset = fixed_div(offset, fixed_div(their_speed, your_speed));
    }
    if subtract { theirs.wrapping_sub(offset as u32) } else { theirs.wrapping_add(offset as u32) }
}

// --- Rules ---------------------------------------------------------------------

fn rising_spike(world: &mut World, hooks: &mut dyn GameHooks, pair: Pair) -> Verdict {
    let Some((m, t)) = pair.get(world) else { return Verdict::Pass };
    if m.kind != EntityKind::Spike || !m.flags.contains(MobjFlags::SOLID) {
        return Verdict::Continue;
    }
    if !z_overlap(m, t) {
        return Verdict::Pass;
    }
    let z = if m.is_flipped() { m.z - t.height - m.scale } else { m.top() + m.scale };
    let shootable = t.flags.contains(MobjFlags::SHOOTABLE);
    if let Some(t) = world.entities.get_mut(pair.thing) {
        t.z = z;
    }
    if shootable {
        damage(world, hooks, pair.thing, pair.mover, DamageKind::Normal, DamageFlags::empty());
    }
    Verdict::Pass
}

fn pain(world: &mut World, hooks: &mut dyn GameHooks, pair: Pair) -> Verdict {
    let Some((m, t)) = pair.get(world) else { return Verdict::Pass };
    let (victim, hazard) = if t.flags.contains(MobjFlags::PAIN) {
        (pair.mover, pair.thing)
    } else if m.flags.contains(MobjFlags::PAIN) && t.is_player() {
        (pair.thing, pair.mover)
    } else {
        return Verdict::Continue;
    };
    if !z_overlap(m, t) {
        return Verdict::Pass;
    }
    let (Some(v), Some(h)) = (world.entities.get(victim), world.entities.get(hazard)) else { return Verdict::Pass };
    if v.flags.contains(MobjFlags::SHOOTABLE) && h.health > 0 {
        let (kind, sound) = (h.info.contact_damage, h.info.contact_sound);
        if damage(world, hooks, victim, hazard, kind, DamageFlags::empty()) {
            if let Some(sound) = sound {
                hooks.play_sound(world, hazard, sound);
            }
        }
    }
    Verdict::Pass
}

fn skull_fly(world: &mut World, pair: Pair) -> Verdict {
    let Some((m, t)) = pair.get(world) else { return Verdict::Pass };
    if !m.flags2.contains(MobjFlags2::SKULLFLY) {
        return Verdict::Continue;
    }
    if !z_overlap(m, t) {
        return Verdict::Pass;
    }
    if let Some(m) = world.entities.get_mut(pair.mover) {
        m.flags2.remove(MobjFlags2::SKULLFLY);
        m.momx = 0;
        m.momy = 0;
        m.momz = 0;
    }
    Verdict::Block
}

fn item(world: &mut World, hooks: &mut dyn GameHooks, pair: Pair, group: ItemGroup) -> Verdict {
    let Some((m, t)) = pair.get(world) else { return Verdict::Pass };
    let in_group = |e: &Entity| e.kind.item().is_some_and(|c| c.group() == group);
    let (item, other) = if in_group(m) {
        (pair.mover, pair.thing)
    } else if in_group(t) {
        (pair.thing, pair.mover)
    } else {
        return Verdict::Continue;
    };
    if !z_overlap(m, t) {
        return Verdict::Pass;
    }
    Verdict::passing(hooks.item_collide(world, item, other, group))
}

fn random_item(world: &mut World, pair: Pair) -> Verdict {
    match world.entities.get(pair.mover) {
        Some(m) if m.kind == EntityKind::RandomItem => Verdict::Pass,
        Some(_) => Verdict::Continue,
        None => Verdict::Pass,
    }
}

/// A blown-up bubble: either the shield of a player whose bubble is
/// inflated, or that player itself.
fn is_blowing_bubble(world: &World, e: &Entity) -> bool {
    let owner_blowing = e.kind == EntityKind::BubbleShield
        && e
            .target
            .and_then(|t| world.entities.get(t))
            .and_then(|o| o.player.as_ref())
            .is_some_and(|p| p.bubble_blowup > 0);
    owner_blowing || e.player.as_ref().is_some_and(|p| p.bubble_blowup > 0)
}

fn bounces_off_bubble(victim: &Entity, victim_id: EntityId, bubble: &Entity) -> bool {
    victim.kind.item().is_some_and(ItemClass::reflectable)
        || (victim.kind == EntityKind::Player && bubble.target != Some(victim_id))
}

fn bubble_reflect(world: &mut World, hooks: &mut dyn GameHooks, pair: Pair) -> Verdict {
    let Some((m, t)) = pair.get(world) else { return Verdict::Pass };
    let (bubble, victim) = if is_blowing_bubble(world, t) && bounces_off_bubble(m, pair.mover, t) {
        (pair.thing, pair.mover)
    } else if is_blowing_bubble(world, m) && bounces_off_bubble(t, pair.thing, m) {
        (pair.mover, pair.thing)
    } else {
        return Verdict::Continue;
    };
    if !z_overlap(m, t) {
        return Verdict::Pass;
    }

    let (Some(b), Some(v)) = (world.entities.get(bubble), world.entities.get(victim)) else { return Verdict::Pass };
    let sound = b.info.contact_sound;
    if let Some(p) = &v.player {
        let too_big = v.scale > b.scale + world.cfg.map_object_scale / 8;
        if p.in_pain || p.flashing > 0 || p.hyudoro_timer > 0 || p.just_bumped > 0 || too_big {
            return Verdict::Pass;
        }
        let inflictor = if b.kind == EntityKind::BubbleShield { b.target } else { Some(bubble) };
        hooks.apply_damage(world, victim, inflictor, Some(bubble), Damage::new(1, DamageKind::Normal));
    } else {
        if v.threshold != 0 {
            return Verdict::Pass;
        }
        let Some(v) = world.entities.get_mut(victim) else { return Verdict::Pass };
        if v.momx == 0 && v.momy == 0 {
            v.momz += 24 * v.scale * v.flip_sign();
        } else {
            v.momx = -v.momx;
            v.momy = -v.momy;
            v.momz = -v.momz;
            v.angle = v.angle.wrapping_add(ANGLE_180);
        }
        if v.kind == EntityKind::Item(ItemClass::Jawz) {
            v.tracer = v.target;
        }
        v.threshold = 10;
    }
    if let Some(sound) = sound {
        hooks.play_sound(world, bubble, sound);
    }
    Verdict::Pass
}

fn bubble_ghost(world: &mut World, pair: Pair) -> Verdict {
    let Some((m, t)) = pair.get(world) else { return Verdict::Pass };
    if m.kind == EntityKind::BubbleShield || t.kind == EntityKind::BubbleShield {
        Verdict::Pass
    } else {
        Verdict::Continue
    }
}

fn spring_shell(world: &mut World, hooks: &mut dyn GameHooks, pair: Pair) -> Verdict {
    let Some((m, t)) = pair.get(world) else { return Verdict::Pass };
    let rider = m.is_player() || m.flags.contains(MobjFlags::PUSHABLE);
    if t.kind != EntityKind::SpringShell || t.health <= 0 || !rider || m.health <= 0 {
        return Verdict::Continue;
    }
    // mirror every height under flipped gravity
    let flipped = t.is_flipped();
    let z = if flipped { -m.top() } else { m.z };
    let next = if flipped { -m.momz } else { m.momz } + z;
    let shell_top = if flipped { -t.z } else { t.top() };
    if next <= shell_top {
        do_spring(world, hooks, pair.thing, pair.mover);
    }
    Verdict::Pass
}

fn missile(world: &mut World, hooks: &mut dyn GameHooks, pair: Pair) -> Verdict {
    let Some((m, t)) = pair.get(world) else { return Verdict::Pass };
    if !m.flags.contains(MobjFlags::MISSILE) {
        return Verdict::Continue;
    }
    if !z_overlap(m, t) {
        return Verdict::Pass;
    }
    let owner = m.target;
    if let Some(o) = owner.and_then(|o| world.entities.get(o)) {
        if o.kind == t.kind {
            if owner == Some(pair.thing) {
                return Verdict::Pass;
            }
            if t.kind != EntityKind::Player {
                return Verdict::Block;
            }
        }
    }
    if !t.flags.contains(MobjFlags::SHOOTABLE) {
        return Verdict::passing(!t.flags.contains(MobjFlags::SOLID));
    }
    let kind = m.info.contact_damage;
    hooks.apply_damage(world, pair.thing, Some(pair.mover), owner, Damage::new(1, kind));
    Verdict::Block
}

fn push(world: &mut World, hooks: &mut dyn GameHooks, pair: Pair) -> Verdict {
    let Some((m, t)) = pair.get(world) else { return Verdict::Pass };
    let pusher = m.is_player() || m.flags.contains(MobjFlags::PUSHABLE);
    if !t.flags.contains(MobjFlags::PUSHABLE) || !pusher || m.top() <= t.z || m.z >= t.top() {
        return Verdict::Continue;
    }
    let accel_base = world.cfg.push_accel;
    let Some((m, t)) = world.entities.pair_mut(pair.mover, pair.thing) else { return Verdict::Pass };
    let limit = fixed_mul(units(4), t.scale);

    if t.flags2.contains(MobjFlags2::SLIDEPUSH) {
        let accel = fixed_mul(accel_base, t.scale);
        if m.momy > 0 && m.momy > limit && m.momy > t.momy {
            t.momy += accel;
            m.momy -= accel;
        } else if m.momy < 0 && m.momy < -limit && m.momy < t.momy {
            t.momy -= accel;
            m.momy += accel;
        }
        if m.momx > 0 && m.momx > limit && m.momx > t.momx {
            t.momx += accel;
            m.momx -= accel;
        } else if m.momx < 0 && m.momx < -limit && m.momx < t.momx {
            t.momx -= accel;
            m.momx += accel;
        }
        let top_speed = fixed_mul(t.info.speed, t.scale);
        t.momx = t.momx.clamp(-top_speed.abs(), top_speed.abs());
        t.momy = t.momy.clamp(-top_speed.abs(), top_speed.abs());
    } else {
        m.momx = m.momx.clamp(-limit.abs(), limit.abs());
        m.momy = m.momy.clamp(-limit.abs(), limit.abs());
        t.momx = m.momx;
        t.momy = m.momy;
    }
    t.target = Some(pair.mover);

    let sound = t.info.active_sound;
    let audible = t.kind != EntityKind::Gargoyle || t.on_ground();
    if let Some(sound) = sound.filter(|_| audible) {
        hooks.play_sound(world, pair.thing, sound);
    }
    Verdict::Continue
}

fn special_pickup(world: &mut World, hooks: &mut dyn GameHooks, pair: Pair) -> Verdict {
    let Some((m, t)) = pair.get(world) else { return Verdict::Pass };
    if t.flags.contains(MobjFlags::SPECIAL) && m.is_player() {
        hooks.touch_special(world, pair.thing, pair.mover);
        Verdict::Pass
    } else if m.flags.contains(MobjFlags::SPECIAL) && t.is_player() {
        hooks.touch_special(world, pair.mover, pair.thing);
        Verdict::Pass
    } else {
        Verdict::Continue
    }
}

/// Whether `victim` lands on (or, flipped, rises into) the point of `spike`
/// this tick.
fn impaled(spike: &Entity, victim: &Entity, spike_moving: bool) -> bool {
    let spike_momz = if spike_moving { spike.momz } else { 0 };
    if spike.is_flipped() {
        let tip = spike.z + if spike_moving { spike.scale } else { -spike.scale };
        victim.top() <= tip && victim.top() + victim.momz >= tip + spike_momz
    } else {
        let tip = spike.top() + if spike_moving { -spike.scale } else { spike.scale };
        victim.z >= tip && victim.z + victim.momz <= tip + spike_momz
    }
}

fn sprite_spike(world: &mut World, hooks: &mut dyn GameHooks, pair: Pair) -> Verdict {
    let Some((m, t)) = pair.get(world) else { return Verdict::Pass };
    let is_spike = |e: &Entity| e.kind == EntityKind::Spike && e.flags.contains(MobjFlags::SOLID);
    if is_spike(m) && t.is_player() {
        if impaled(m, t, true) {
            damage(world, hooks, pair.thing, pair.mover, DamageKind::Normal, DamageFlags::empty());
        }
    } else if is_spike(t) && m.is_player() && impaled(t, m, false) {
        damage(world, hooks, pair.mover, pair.thing, DamageKind::Normal, DamageFlags::empty());
    }
    Verdict::Continue
}

/// Vertical reach of a wall spike: one scale unit past its point.
fn wall_spike_span(spike: &Entity) -> (Fixed, Fixed) {
    if spike.is_flipped() { (spike.z - spike.scale, spike.top()) } else { (spike.z, spike.top() + spike.scale) }
}

fn wall_spike(world: &mut World, hooks: &mut dyn GameHooks, pair: Pair) -> Verdict {
    let Some((m, t)) = pair.get(world) else { return Verdict::Pass };
    let is_spike = |e: &Entity| e.kind == EntityKind::WallSpike && e.flags.contains(MobjFlags::SOLID);

    if is_spike(m) && t.is_player() {
        let (bottom, top) = wall_spike_span(m);
        if t.top() > bottom && t.z < top {
            damage(world, hooks, pair.thing, pair.mover, DamageKind::Normal, DamageFlags::empty());
        }
        return Verdict::Continue;
    }
    if !(is_spike(t) && m.is_player()) {
        return Verdict::Continue;
    }
    // the base the spike sticks out of tells which face was touched
    let Some(base) = t.tracer.and_then(|b| world.entities.get(b)) else { return Verdict::Continue };
    let touch = point_to_angle(m.x - base.x, m.y - base.y);

    let in_pain = m.player.as_ref().is_some_and(|p| p.in_pain);
    if in_pain && (m.momx != 0 || m.momy != 0) {
        let mut away = point_to_angle(m.momx, m.momy).wrapping_sub(touch);
        if away > ANGLE_180 {
            away = away.wrapping_neg();
        }
        if away < ANGLE_90 {
            return Verdict::Pass;
        }
    }

    let (bottom, top) = wall_spike_span(t);
    if m.top() > bottom && m.z < top {
        let mut facing = t.angle.wrapping_sub(touch);
        if facing > ANGLE_180 {
            facing = facing.wrapping_neg();
        }
        if facing <= ANGLE_22H {
            damage(world, hooks, pair.mover, pair.thing, DamageKind::Normal, DamageFlags::empty());
        }
    }
    Verdict::Continue
}

fn fan_on_pushable(world: &mut World, pair: Pair) -> Verdict {
    let Some((m, t)) = pair.get(world) else { return Verdict::Pass };
    if t.flags.contains(MobjFlags::PUSHABLE) && m.kind.is_fan_or_steam() {
        fan_and_gas_jet(world, pair.mover, pair.thing);
    }
    Verdict::Continue
}

fn pushable_launcher(world: &mut World, hooks: &mut dyn GameHooks, pair: Pair) -> Verdict {
    let Some((m, t)) = pair.get(world) else { return Verdict::Pass };
    if !m.flags.contains(MobjFlags::PUSHABLE) {
        return Verdict::Continue;
    }
    if t.kind.is_fan_or_steam() {
        fan_and_gas_jet(world, pair.thing, pair.mover);
        return Verdict::Pass;
    }
    if t.flags.contains(MobjFlags::SPRING) {
        if z_overlap(m, t) && do_spring(world, hooks, pair.thing, pair.mover) {
            return Verdict::Block;
        }
        return Verdict::Pass;
    }
    Verdict::Continue
}

fn solid_enemies(world: &mut World, pair: Pair) -> Verdict {
    let Some((m, t)) = pair.get(world) else { return Verdict::Pass };
    let hostile = MobjFlags::ENEMY | MobjFlags::BOSS;
    if t.flags.intersects(hostile) && m.flags.intersects(hostile) && t.top() >= m.z && m.top() >= t.z {
        return Verdict::Block;
    }
    Verdict::Continue
}

fn fan_on_player(world: &mut World, pair: Pair) -> Verdict {
    let Some((m, t)) = pair.get(world) else { return Verdict::Pass };
    if t.is_player() && m.kind.is_fan_or_steam() {
        fan_and_gas_jet(world, pair.mover, pair.thing);
    }
    Verdict::Continue
}

fn player_contact(world: &mut World, hooks: &mut dyn GameHooks, pair: Pair) -> Verdict {
    let Some((m, t)) = pair.get(world) else { return Verdict::Pass };
    let Some(mp) = &m.player else { return Verdict::Continue };
    if m.health == 0 {
        return Verdict::Pass;
    }

    if t.kind.is_fan_or_steam() {
        fan_and_gas_jet(world, pair.thing, pair.mover);
        return Verdict::Continue;
    }
    if t.flags.contains(MobjFlags::SPRING) {
        if z_overlap(m, t) && do_spring(world, hooks, pair.thing, pair.mover) {
            return Verdict::Block;
        }
        return Verdict::Pass;
    }

    let (mover, thing) = (pair.mover, pair.thing);
    if let Some(tp) = &t.player {
        if !z_overlap(m, t) || mp.hyudoro_timer > 0 || tp.hyudoro_timer > 0 {
            return Verdict::Pass;
        }
        if world.cfg.bumpers_rule && ((tp.bumpers > 0) != (mp.bumpers > 0)) {
            return Verdict::Pass;
        }
        let steal = DamageFlags::STEAL;
        if t.on_ground() && m.momz < 0 && mp.trick_panel > 0 {
            damage(world, hooks, thing, mover, DamageKind::Wipeout, steal);
        } else if m.on_ground() && t.momz < 0 && tp.trick_panel > 0 {
            damage(world, hooks, mover, thing, DamageKind::Wipeout, steal);
        }
        if pair.alive(world) && hooks.kart_bounce(world, mover, thing) && pair.alive(world) {
            hooks.pvp_touch_damage(world, mover, thing);
        }
        return Verdict::Pass;
    }

    match t.kind {
        EntityKind::BlueRobraHead | EntityKind::BlueRobraJoint => {
            if !z_overlap(m, t) || t.health == 0 {
                return Verdict::Pass;
            }
            if invulnerable_bully(m) {
                let victim = if t.kind == EntityKind::BlueRobraJoint { t.target } else { Some(thing) };
                if let Some(victim) = victim {
                    hooks.kill(world, victim, Some(mover), Some(mover));
                }
            } else {
                hooks.solid_bounce(world, mover, thing);
            }
            Verdict::Pass
        }
        EntityKind::SmkPipe => {
            if !z_overlap(m, t) || t.health == 0 {
                return Verdict::Pass;
            }
            if invulnerable_bully(m) {
                hooks.kill(world, thing, Some(mover), Some(mover));
            } else {
                hooks.solid_bounce(world, mover, thing);
            }
            Verdict::Pass
        }
        EntityKind::SmkThwomp => {
            if t.health == 0 || !world.cfg.thwomps_active {
                return Verdict::Pass;
            }
            let early = m.z < t.z && t.z >= t.move_factor - units(256);
            let (overlap, bully) = (z_overlap(m, t), invulnerable_bully(m));
            let dodging = mp.flashing > 0 || mp.hyudoro_timer > 0 || mp.spinout_timer > 0;
            let stomping = m.z < t.z && t.momz < 0;
            let ambush = t.flags2.contains(MobjFlags2::AMBUSH);
            if early {
                if let Some(t) = world.entities.get_mut(thing) {
                    t.extra_value1 = 1;
                }
            }
            if !overlap {
                return Verdict::Pass;
            }
            if bully {
                hooks.kill(world, thing, Some(mover), Some(mover));
                return Verdict::Pass;
            }
            if dodging {
                return Verdict::Pass;
            }
            if stomping {
                damage(world, hooks, mover, thing, DamageKind::Tumble, DamageFlags::empty());
            } else if hooks.solid_bounce(world, mover, thing) && ambush && pair.alive(world) {
                damage(world, hooks, mover, thing, DamageKind::Wipeout, DamageFlags::empty());
            }
            Verdict::Pass
        }
        EntityKind::KartLeftover => {
            if z_overlap(m, t) {
                hooks.kart_bounce(world, mover, thing);
            }
            Verdict::Pass
        }
        _ if t.flags.contains(MobjFlags::SOLID) => {
            if z_overlap(m, t) {
                hooks.solid_bounce(world, mover, thing);
            }
            Verdict::Pass
        }
        _ => Verdict::Continue,
    }
}

/// Gold monitors block outright instead of becoming a floor.
fn is_gold_monitor(t: &Entity) -> bool {
    t.flags.contains(MobjFlags::GRENADE_BOUNCE)
        && (t.flags.contains(MobjFlags::MONITOR) || t.info.flags.contains(MobjFlags::MONITOR))
}

fn solid_stack(world: &mut World, check: &mut PositionCheck, pair: Pair) -> Verdict {
    let Some((m, t)) = pair.get(world) else { return Verdict::Pass };
    let launcher = m.flags.contains(MobjFlags::SPRING)
        || matches!(m.kind, EntityKind::Steam | EntityKind::Spike | EntityKind::WallSpike);
    if launcher && t.is_player() {
        return Verdict::Pass;
    }
    let solid = |e: &Entity| e.flags & (MobjFlags::SOLID | MobjFlags::NOCLIP) == MobjFlags::SOLID;
    if !solid(m) || !solid(t) {
        return Verdict::Pass;
    }
    let on = Surface::Entity(pair.thing);

    if m.is_flipped() {
        if m.z > t.top() {
            if t.top() > check.floor_z {
                check.floor_z = t.top();
                check.floor_surface = on;
                check.floor_slope = None;
            }
            return Verdict::Pass;
        }
        let bottom = t.z - t.scale;
        if m.is_player() && m.top() > bottom && m.top() < m.ceiling_z {
            if is_gold_monitor(t) {
                return Verdict::Block;
            }
            // airborne against its side: make the spot impossible to enter
            check.floor_z = bottom;
            check.ceiling_z = bottom;
            check.ceiling_surface = on;
            check.ceiling_slope = None;
            check.floor_thing = Some(pair.thing);
        } else if bottom < check.ceiling_z && m.z <= t.top() {
            check.ceiling_z = bottom;
            check.ceiling_surface = on;
            check.ceiling_slope = None;
            check.floor_thing = Some(pair.thing);
        }
    } else {
        if m.top() < t.z {
            if t.z < check.ceiling_z {
                check.ceiling_z = t.z;
                check.ceiling_surface = on;
                check.ceiling_slope = None;
            }
            return Verdict::Pass;
        }
        let top = t.top() + t.scale;
        if m.is_player() && m.z < top && m.z > m.floor_z {
            if is_gold_monitor(t) {
                return Verdict::Block;
            }
            check.floor_z = top;
            check.ceiling_z = top;
            check.floor_surface = on;
            check.floor_slope = None;
            check.floor_thing = Some(pair.thing);
        } else if top > check.floor_z && m.top() >= t.z {
            check.floor_z = top;
            check.floor_surface = on;
            check.floor_slope = None;
            check.floor_thing = Some(pair.thing);
        }
    }
    Verdict::Pass
}

// --- Launchers -----------------------------------------------------------------

/// Launches `object` off `spring`. Returns whether a launch happened.
///
/// Vertical springs put the object on top (or under, flipped); horizontal
/// springs put it in front. Horizontal thrust never slows the object down.
pub fn do_spring(world: &mut World, hooks: &mut dyn GameHooks, spring: EntityId, object: EntityId) -> bool {
    let (Some(s), Some(o)) = (world.entities.get(spring), world.entities.get(object)) else { return false };
    if o.eflags.contains(ExtraFlags::SPRUNG) || o.is_spectator() || s.health == 0 || o.health == 0 {
        return false;
    }
    let mut vertical = s.info.mass;
    let horizontal = s.info.damage;
    if vertical == 0 && horizontal == 0 {
        return false;
    }
    let scale = fixed_sqrt(fixed_mul(world.cfg.map_object_scale, s.scale));
    if s.is_flipped() {
        vertical = -vertical;
    }
    if s.is_flipped() != o.is_flipped() {
        vertical *= 2;
    }
    let (sx, sy, sz, s_top, s_angle, s_radius) = (s.x, s.y, s.z, s.top(), s.angle, s.radius);

    let Some((s, o)) = world.entities.pair_mut(spring, object) else { return false };
    o.standing_slope = None;
    o.terrain_pic = 0;
    o.eflags.insert(ExtraFlags::SPRUNG);
    s.flags.remove(MobjFlags::SOLID | MobjFlags::SPECIAL);

    let (mut saved_x, mut saved_y) = (0, 0);
    if vertical > 0 {
        o.z = s_top + 1;
    } else if vertical < 0 {
        o.z = sz - o.height - 1;
    } else {
        saved_x = o.momx;
        saved_y = o.momy;
        o.momx = 0;
        o.momy = 0;
        // overshoot, then square the x offset to the hitbox
        let gap = s_radius + o.radius + 1;
        let (mut offx, offy) = thrust(s_angle, gap * 2);
        offx = offx.clamp(-gap, gap);
        movement::try_move(world, hooks, object, sx + offx, sy + offy, true);
    }

    let game_speed = world.cfg.game_speed_scalar;
    let Some((s, o)) = world.entities.pair_mut(spring, object) else { return false };
    if vertical != 0 {
        o.momz = fixed_mul(vertical, scale);
    }
    if horizontal != 0 {
        let mut angle = s_angle;
        let mut speed = fixed_mul(horizontal, scale);
        let object_speed = match &o.player {
            Some(p) => p.speed,
            None => point_to_dist(saved_x, saved_y),
        };
        if vertical == 0 {
            speed = fixed_mul(speed, game_speed);
            if saved_x != 0 || saved_y != 0 {
                angle = reflect_angle(point_to_angle(saved_x, saved_y), angle, object_speed, speed);
            }
        }
        let (mx, my) = thrust(angle, speed.max(object_speed));
        o.momx = mx;
        o.momy = my;
    }
    s.flags.insert(s.info.flags & (MobjFlags::SPRING | MobjFlags::SPECIAL));

    let enemy_spring = s.flags.contains(MobjFlags::ENEMY);
    if let Some(p) = o.player.as_mut() {
        p.spring_stars = (vertical.max(horizontal) / FRACUNIT / 2).max(0) as u32;
        if p.tire_grease == 0 {
            p.tire_grease = GREASE_TICS;
        }
        if enemy_spring {
            s.target = Some(object);
        }
    }

    trace!(?spring, ?object, vertical, horizontal, "spring launch");
    hooks.sprung(world, spring, object);
    true
}

/// Fans push upward while the object is within `health` units above them;
/// steam fires a fixed burst while its `threshold` is running.
pub fn fan_and_gas_jet(world: &mut World, jet: EntityId, object: EntityId) {
    let Some((j, o)) = world.entities.pair_mut(jet, object) else { return };
    if o.player.as_ref().is_some_and(|p| p.in_pain) {
        return;
    }
    let flip = j.flip_sign();
    let zdist = if j.is_flipped() {
        if o.z > j.top() {
            return;
        }
        j.top() - o.top()
    } else {
        if o.top() < j.z {
            return;
        }
        o.z - j.z
    };
    o.standing_slope = None;
    o.terrain_pic = 0;

    let speed = j.info.mass;
    match j.kind {
        EntityKind::Fan => {
            let cap = fixed_mul(speed, j.scale);
            if zdist > j.health << FRACBITS || flip * o.momz >= cap {
                return;
            }
            o.momz += flip * fixed_mul(speed / 4, j.scale);
            if flip * o.momz > cap {
                o.momz = flip * cap;
            }
        }
        EntityKind::Steam => {
            if zdist > fixed_mul(units(16), j.scale) || j.threshold == 0 {
                return;
            }
            o.momz = flip * fixed_mul(speed, fixed_sqrt(fixed_mul(j.scale, o.scale)));
        }
        _ => {}
    }
}

// --- Area damage ---------------------------------------------------------------

/// Damages every shootable, non-monitor entity within `distance` of `spot`
/// (scaled by the spot's scale, measured to the target's edge).
pub fn radius_attack(
    world: &mut World,
    hooks: &mut dyn GameHooks,
    spot: EntityId,
    source: Option<EntityId>,
    distance: Fixed,
    hit: Damage,
    sight_check: bool,
) {
    let Some(s) = world.entities.get(spot) else { return };
    let reach = fixed_mul(distance, s.scale);
    let bbox = BBox::around(s.x, s.y, reach.saturating_add(world.cfg.max_radius));
    let range = world.blockmap.cells(&bbox);
    let source_kind = source.and_then(|id| world.entities.get(id)).map(|e| e.kind);

    for cell in range.iter() {
        for id in world.blockmap.things_in(cell) {
            if id == spot {
                continue;
            }
            let Some(s) = world.entities.get(spot) else { return };
            let Some(t) = world.entities.get(id) else { continue };
            if hit.flags.contains(DamageFlags::CANT_HURT_SELF) && source_kind == Some(t.kind) {
                continue;
            }
            if t.flags & (MobjFlags::MONITOR | MobjFlags::SHOOTABLE) != MobjFlags::SHOOTABLE {
                continue;
            }
            let dx = (t.x - s.x).abs();
            let dy = (t.y - s.y).abs();
            let dz = (t.z + (t.height >> 1) - s.z).abs();
            let dist = (approx_distance(approx_distance(dx, dy), dz) - t.radius).max(0);
            if dist >= reach {
                continue;
            }
            if (t.floor_z > s.z && s.ceiling_z < t.z) || (t.ceiling_z < s.z && s.floor_z > t.z) {
                continue;
            }
            if sight_check && !hooks.check_sight(world, id, spot) {
                continue;
            }
            hooks.apply_damage(world, id, Some(spot), source, hit);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::MovementApi;
    use crate::entity::EntityInfo;
    use crate::test_level::{RecordingHooks, RoomRow, player_at, thing_at, world_of};

    fn arena() -> World {
        world_of(RoomRow::new(units(512)).room(units(512), 0, units(256)).build())
    }

    fn resolve(w: &mut World, hooks: &mut RecordingHooks, mover: EntityId, thing: EntityId) -> (Verdict, PositionCheck) {
        let m = w.entity(mover).unwrap();
        let mut check = PositionCheck::seed(w, m.x, m.y, m.radius);
        let v = check_thing(w, hooks, &mut check, mover, thing);
        (v, check)
    }

    fn item_at(class: ItemClass, x: Fixed, y: Fixed) -> Entity {
        Entity::new(EntityKind::Item(class), x, y, 0, units(16), units(32)).with_flags(MobjFlags::SHOOTABLE)
    }

    #[test]
    fn test_far_apart_never_interacts() {
        let mut w = arena();
        let a = w.spawn(player_at(units(100), units(100), 0));
        let b = w.spawn(player_at(units(132), units(100), 0));
        let mut hooks = RecordingHooks::default();
        assert_eq!(resolve(&mut w, &mut hooks, a, b).0, Verdict::Pass);
        assert!(hooks.bounces.is_empty());
    }

    #[test]
    fn test_pair_override() {
        let mut w = arena();
        let a = w.spawn(thing_at(units(100), units(100), 0));
        let b = w.spawn(thing_at(units(110), units(100), 0));
        let mut hooks = RecordingHooks { pair_override: CollideOverride::Force, ..Default::default() };
        assert_eq!(resolve(&mut w, &mut hooks, a, b).0, Verdict::Block);
        hooks.pair_override = CollideOverride::Skip;
        let (v, check) = resolve(&mut w, &mut hooks, a, b);
        assert_eq!(v, Verdict::Pass);
        assert_eq!(check.floor_thing, None);
    }

    #[test]
    fn test_pain_hurts_the_toucher_in_either_order() {
        let mut w = arena();
        let info = EntityInfo {
            flags: MobjFlags::PAIN,
            contact_damage: DamageKind::Explode,
            contact_sound: Some(SoundId(7)),
            ..Default::default()
        };
        let hazard = w.spawn(Entity::new(EntityKind::Generic, units(110), units(100), 0, units(16), units(16)).with_info(info));
        let player = w.spawn(player_at(units(100), units(100), 0));

        let mut hooks = RecordingHooks::default();
        assert_eq!(resolve(&mut w, &mut hooks, player, hazard).0, Verdict::Pass);
        assert_eq!(resolve(&mut w, &mut hooks, hazard, player).0, Verdict::Pass);
        assert_eq!(hooks.damage.len(), 2);
        for call in &hooks.damage {
            assert_eq!(call.target, player);
            assert_eq!(call.inflictor, Some(hazard));
            assert_eq!(call.damage.kind, DamageKind::Explode);
        }
        assert_eq!(hooks.sounds, vec![(hazard, SoundId(7)), (hazard, SoundId(7))]);
    }

    #[test]
    fn test_pain_respects_over_under() {
        let mut w = arena();
        let hazard = w.spawn(thing_at(units(110), units(100), 0).with_flags(MobjFlags::PAIN));
        let player = w.spawn(player_at(units(100), units(100), units(40)));
        let mut hooks = RecordingHooks::default();
        assert_eq!(resolve(&mut w, &mut hooks, player, hazard).0, Verdict::Pass);
        assert!(hooks.damage.is_empty());
    }

    #[test]
    fn test_item_hook_called_with_item_first() {
        let mut w = arena();
        let banana = w.spawn(item_at(ItemClass::Banana, units(110), units(100)));
        let player = w.spawn(player_at(units(100), units(100), 0));
        let mut hooks = RecordingHooks { item_passes: Some(false), ..Default::default() };
        assert_eq!(resolve(&mut w, &mut hooks, player, banana).0, Verdict::Block);
        assert_eq!(resolve(&mut w, &mut hooks, banana, player).0, Verdict::Block);
        assert_eq!(
            hooks.items,
            vec![(banana, player, ItemGroup::BananaBallhog), (banana, player, ItemGroup::BananaBallhog)]
        );
    }

    #[test]
    fn test_missile_damages_and_stops() {
        let mut w = arena();
        let owner = w.spawn(player_at(units(300), units(300), 0));
        let mut shot = thing_at(units(100), units(100), 0).with_flags(MobjFlags::MISSILE);
        shot.target = Some(owner);
        let shot = w.spawn(shot);
        let victim = w.spawn(thing_at(units(110), units(100), 0).with_flags(MobjFlags::SOLID | MobjFlags::SHOOTABLE));
        let mut hooks = RecordingHooks::default();
        assert_eq!(resolve(&mut w, &mut hooks, shot, victim).0, Verdict::Block);
        assert_eq!(hooks.damage[0].target, victim);
        assert_eq!(hooks.damage[0].inflictor, Some(shot));
        assert_eq!(hooks.damage[0].source, Some(owner));
    }

    #[test]
    fn test_missile_passes_its_owner() {
        let mut w = arena();
        let owner = w.spawn(player_at(units(110), units(100), 0));
        let mut shot = thing_at(units(100), units(100), 0).with_flags(MobjFlags::MISSILE);
        shot.kind = EntityKind::Player;
        shot.target = Some(owner);
        let shot = w.spawn(shot);
        let mut hooks = RecordingHooks::default();
        assert_eq!(resolve(&mut w, &mut hooks, shot, owner).0, Verdict::Pass);
        assert!(hooks.damage.is_empty());
    }

    #[test]
    fn test_standing_on_a_solid_thing() {
        let mut w = arena();
        let crate_ = w.spawn(thing_at(units(110), units(100), 0));
        let rider = w.spawn(thing_at(units(100), units(100), units(40)));
        let mut hooks = RecordingHooks::default();
        let (v, check) = resolve(&mut w, &mut hooks, rider, crate_);
        assert_eq!(v, Verdict::Pass);
        assert_eq!(check.floor_z, units(32) + FRACUNIT);
        assert_eq!(check.floor_surface, Surface::Entity(crate_));
        assert_eq!(check.floor_thing, Some(crate_));
    }

    #[test]
    fn test_passing_under_lowers_ceiling() {
        let mut w = arena();
        let shelf = w.spawn(thing_at(units(110), units(100), units(100)));
        let walker = w.spawn(thing_at(units(100), units(100), 0));
        let mut hooks = RecordingHooks::default();
        let (_, check) = resolve(&mut w, &mut hooks, walker, shelf);
        assert_eq!(check.ceiling_z, units(100));
        assert_eq!(check.floor_thing, None);
    }

    #[test]
    fn test_airborne_player_beside_fan_is_walled_off() {
        let mut w = arena();
        let pillar = w.spawn(Entity::new(EntityKind::Fan, units(110), units(100), 0, units(16), units(32)).with_flags(MobjFlags::SOLID));
        let mut p = player_at(units(100), units(100), units(10));
        p.momz = FRACUNIT;
        let p = w.spawn(p);
        let mut hooks = RecordingHooks::default();
        let (_, check) = resolve(&mut w, &mut hooks, p, pillar);
        assert_eq!(check.floor_z, check.ceiling_z);
        assert_eq!(check.headroom(), 0);
    }

    #[test]
    fn test_players_bump_symmetrically() {
        let mut w = arena();
        let a = w.spawn(player_at(units(100), units(100), 0));
        let b = w.spawn(player_at(units(120), units(100), 0));
        let mut hooks = RecordingHooks { kart_bounces: true, ..Default::default() };
        assert_eq!(resolve(&mut w, &mut hooks, a, b).0, Verdict::Pass);
        assert_eq!(resolve(&mut w, &mut hooks, b, a).0, Verdict::Pass);
        assert_eq!(hooks.bounces, vec![(a, b), (b, a)]);
        assert_eq!(hooks.pvp, vec![(a, b), (b, a)]);
    }

    fn hazard_and_player() -> (Entity, Entity) {
        let info = EntityInfo { flags: MobjFlags::PAIN, ..Default::default() };
        let hazard = Entity::new(EntityKind::Generic, units(100), units(100), 0, units(16), units(16)).with_info(info);
        (hazard, player_at(units(110), units(100), 0))
    }

    fn mine_and_player() -> (Entity, Entity) {
        (item_at(ItemClass::Mine, units(100), units(100)), player_at(units(110), units(100), 0))
    }

    fn sink_and_thing() -> (Entity, Entity) {
        (item_at(ItemClass::Sink, units(100), units(100)), thing_at(units(110), units(100), 0))
    }

    fn ring_and_player() -> (Entity, Entity) {
        let ring = Entity::new(EntityKind::Generic, units(100), units(100), 0, units(16), units(16))
            .with_flags(MobjFlags::SPECIAL);
        (ring, player_at(units(110), units(100), 0))
    }

    fn two_players() -> (Entity, Entity) {
        (player_at(units(100), units(100), 0), player_at(units(110), units(100), 0))
    }

    fn two_enemies() -> (Entity, Entity) {
        let enemy = |x| thing_at(x, units(100), 0).with_flags(MobjFlags::SOLID | MobjFlags::ENEMY);
        (enemy(units(100)), enemy(units(110)))
    }

    #[test]
    fn test_symmetric_rules_resolve_the_same_either_way() {
        type Outcome = (Verdict, Vec<EntityId>, Vec<(EntityId, EntityId, ItemGroup)>, Vec<(EntityId, EntityId)>, Vec<(EntityId, EntityId)>);
        let rows: [(&str, fn() -> (Entity, Entity)); 6] = [
            ("pain", hazard_and_player),
            ("mine", mine_and_player),
            ("sink", sink_and_thing),
            ("special", ring_and_player),
            ("players", two_players),
            ("enemies", two_enemies),
        ];

        for (name, build) in rows {
            let outcome = |swap: bool| -> Outcome {
                let mut w = arena();
                let (ea, eb) = build();
                let a = w.spawn(ea);
                let b = w.spawn(eb);
                let mut hooks = RecordingHooks { kart_bounces: true, ..Default::default() };
                let (mover, thing) = if swap { (b, a) } else { (a, b) };
                let (v, _) = resolve(&mut w, &mut hooks, mover, thing);
                let targets = hooks.damage.iter().map(|c| c.target).collect();
                let bounces = hooks.bounces.iter().map(|&(x, y)| (x.min(y), x.max(y))).collect();
                (v, targets, hooks.items, hooks.touched, bounces)
            };
            let forward = outcome(false);
            assert_eq!(forward, outcome(true), "{name}");
            let quiet: Outcome = (Verdict::Pass, vec![], vec![], vec![], vec![]);
            assert_ne!(forward, quiet, "{name} had no effect");
        }
    }

    #[test]
    fn test_trick_panel_stomp_hits_the_grounded_player() {
        let mut w = arena();
        let ground = w.spawn(player_at(units(120), units(100), 0));
        let mut air = player_at(units(100), units(100), units(20));
        air.momz = -FRACUNIT;
        air.player.as_mut().unwrap().trick_panel = 1;
        let air = w.spawn(air);

        let mut hooks = RecordingHooks::default();
        resolve(&mut w, &mut hooks, air, ground);
        resolve(&mut w, &mut hooks, ground, air);
        assert_eq!(hooks.damage.len(), 2);
        assert!(hooks.damage.iter().all(|c| c.target == ground && c.damage.kind == DamageKind::Wipeout));
        assert!(hooks.damage.iter().all(|c| c.damage.flags.contains(DamageFlags::STEAL)));
    }

    #[test]
    fn test_bubble_sends_items_back() {
        let mut w = arena();
        let owner = w.spawn(player_at(units(300), units(300), 0));
        w.entity_mut(owner).unwrap().player.as_mut().unwrap().bubble_blowup = 5;
        let mut shield = Entity::new(EntityKind::BubbleShield, units(110), units(100), 0, units(24), units(48))
            .with_flags(MobjFlags::SOLID);
        shield.target = Some(owner);
        let shield = w.spawn(shield);
        let mut jawz = item_at(ItemClass::Jawz, units(90), units(100)).with_momentum(units(10), units(2), 0);
        jawz.target = Some(owner);
        let jawz = w.spawn(jawz);

        let mut hooks = RecordingHooks::default();
        assert_eq!(resolve(&mut w, &mut hooks, jawz, shield).0, Verdict::Pass);
        let j = w.entity(jawz).unwrap();
        assert_eq!((j.momx, j.momy), (-units(10), -units(2)));
        assert_eq!(j.angle, ANGLE_180);
        assert_eq!(j.threshold, 10);
        assert_eq!(j.tracer, Some(owner));

        // cooling down: no second reflection
        resolve(&mut w, &mut hooks, jawz, shield);
        assert_eq!(w.entity(jawz).unwrap().momx, -units(10));
        assert!(hooks.items.is_empty());
    }

    #[test]
    fn test_pushable_copies_capped_momentum() {
        let mut w = arena();
        let block = w.spawn(thing_at(units(110), units(100), 0).with_flags(MobjFlags::SOLID | MobjFlags::PUSHABLE));
        let p = w.spawn(player_at(units(100), units(100), 0).with_momentum(units(10), -units(1), 0));
        let mut hooks = RecordingHooks::default();
        resolve(&mut w, &mut hooks, p, block);
        let b = w.entity(block).unwrap();
        assert_eq!((b.momx, b.momy), (units(4), -units(1)));
        assert_eq!(b.target, Some(p));
        assert_eq!(w.entity(p).unwrap().momx, units(4));
    }

    #[test]
    fn test_vertical_spring_launches_once_per_tick() {
        let mut w = arena();
        let info = EntityInfo { mass: units(20), flags: MobjFlags::SOLID | MobjFlags::SPRING, ..Default::default() };
        let spring = w.spawn(Entity::new(EntityKind::Spring, units(110), units(100), 0, units(16), units(16)).with_info(info));
        let p = w.spawn(player_at(units(100), units(100), units(10)));
        let mut hooks = RecordingHooks::default();

        assert_eq!(resolve(&mut w, &mut hooks, p, spring).0, Verdict::Block);
        let e = w.entity(p).unwrap();
        assert_eq!(e.z, units(16) + 1);
        assert_eq!(e.momz, units(20));
        assert!(e.eflags.contains(ExtraFlags::SPRUNG));
        assert_eq!(e.player.as_ref().unwrap().tire_grease, GREASE_TICS);
        let flags = w.entity(spring).unwrap().flags;
        assert!(flags.contains(MobjFlags::SPRING) && !flags.contains(MobjFlags::SOLID));

        assert!(!do_spring(&mut w, &mut hooks, spring, p));
        assert_eq!(hooks.springs, vec![(spring, p)]);
    }

    #[test]
    fn test_fan_lifts_up_to_cap() {
        let mut w = arena();
        let info = EntityInfo { mass: units(8), flags: MobjFlags::SOLID, ..Default::default() };
        let mut fan = Entity::new(EntityKind::Fan, units(110), units(100), 0, units(16), units(8)).with_info(info);
        fan.health = 64;
        let fan = w.spawn(fan);
        let p = w.spawn(player_at(units(100), units(100), units(20)));
        fan_and_gas_jet(&mut w, fan, p);
        assert_eq!(w.entity(p).unwrap().momz, units(2));
        for _ in 0..10 {
            fan_and_gas_jet(&mut w, fan, p);
        }
        assert_eq!(w.entity(p).unwrap().momz, units(8));
    }

    #[test]
    fn test_wall_spike_only_hurts_head_on() {
        let mut w = arena();
        let base = w.spawn(Entity::new(EntityKind::Generic, units(140), units(100), 0, units(8), units(8)));
        let mut spike = Entity::new(EntityKind::WallSpike, units(120), units(100), 0, units(16), units(32))
            .with_flags(MobjFlags::SOLID);
        spike.tracer = Some(base);
        spike.angle = ANGLE_180;
        let spike = w.spawn(spike);
        let p = w.spawn(player_at(units(100), units(100), 0));
        let mut hooks = RecordingHooks::default();
        resolve(&mut w, &mut hooks, p, spike);
        assert_eq!(hooks.damage.len(), 1);
        assert_eq!(hooks.damage[0].target, p);

        w.entity_mut(spike).unwrap().angle = ANGLE_90;
        resolve(&mut w, &mut hooks, p, spike);
        assert_eq!(hooks.damage.len(), 1);
    }

    #[test]
    fn test_hook_removing_mover_ends_resolution() {
        let mut w = arena();
        let hazard = w.spawn(thing_at(units(110), units(100), 0).with_flags(MobjFlags::PAIN | MobjFlags::SOLID));
        let p = w.spawn(player_at(units(100), units(100), 0));
        let mut hooks = RecordingHooks { lethal: true, ..Default::default() };
        assert_eq!(resolve(&mut w, &mut hooks, p, hazard).0, Verdict::Pass);
        assert!(w.entity(p).is_none());
    }

    #[test]
    fn test_radius_attack_reaches_shootables_only() {
        let mut w = arena();
        let bomb = w.spawn(Entity::new(EntityKind::Generic, units(200), units(200), 0, units(8), units(8)));
        let near = w.spawn(thing_at(units(240), units(200), 0).with_flags(MobjFlags::SHOOTABLE));
        let far = w.spawn(thing_at(units(400), units(200), 0).with_flags(MobjFlags::SHOOTABLE));
        let monitor = w.spawn(thing_at(units(200), units(230), 0).with_flags(MobjFlags::SHOOTABLE | MobjFlags::MONITOR));
        let mut hooks = RecordingHooks::default();
        radius_attack(&mut w, &mut hooks, bomb, None, units(64), Damage::new(1, DamageKind::Explode), false);
        let hit: Vec<_> = hooks.damage.iter().map(|c| c.target).collect();
        assert_eq!(hit, vec![near]);
        assert!(!hit.contains(&far) && !hit.contains(&monitor));
    }

    #[test]
    fn test_reflect_angle_caps_at_45_degrees() {
        // coming in square to a spring facing east gets bent by half
        assert_eq!(reflect_angle(ANGLE_90, 0, units(10), units(10)), ANGLE_90 / 2);
        assert_eq!(reflect_angle(0u32.wrapping_sub(ANGLE_90), 0, units(10), units(10)), 0u32.wrapping_sub(ANGLE_90 / 2));
        // slower than the spring: bent less
        assert_eq!(reflect_angle(ANGLE_90, 0, units(10), units(20)), ANGLE_90 / 4);
    }
}
