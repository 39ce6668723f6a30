use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::fixed::{Fixed, FRACUNIT, units};

// --- Handles ---------------------------------------------------------------

/// Index of a sector in the loaded map.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct SectorId(pub u32);

/// Index of a line in the loaded map.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct LineId(pub u32);

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct PolyId(pub u32);

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct SlopeId(pub u32);

/// Generation-checked entity handle. A handle outlives its entity safely:
/// lookups through a stale handle simply miss.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityId {
    pub index: u32,
    pub generation: u32,
}

/// Opaque sound identifier forwarded to [`GameHooks::play_sound`](crate::api::GameHooks::play_sound).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SoundId(pub u16);

impl SectorId {
    #[inline]
    pub fn idx(self) -> usize {
        self.0 as usize
    }
}

impl LineId {
    #[inline]
    pub fn idx(self) -> usize {
        self.0 as usize
    }
}

impl PolyId {
    #[inline]
    pub fn idx(self) -> usize {
        self.0 as usize
    }
}

impl SlopeId {
    #[inline]
    pub fn idx(self) -> usize {
        self.0 as usize
    }
}

// --- Flag sets -------------------------------------------------------------

bitflags! {
    /// Collision and interaction categories of an entity.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct MobjFlags: u32 {
        /// Blocks other solid entities.
        const SOLID = 1 << 0;
        /// Can take damage.
        const SHOOTABLE = 1 << 1;
        /// Touching it triggers a pickup.
        const SPECIAL = 1 << 2;
        /// Hurts whatever touches it.
        const PAIN = 1 << 3;
        const SPRING = 1 << 4;
        /// Can be shoved by players and other pushables.
        const PUSHABLE = 1 << 5;
        const MISSILE = 1 << 6;
        /// Ignores every kind of collision.
        const NOCLIP = 1 << 7;
        /// Passes through entities but not walls.
        const NOCLIPTHING = 1 << 8;
        /// Ignores floor and ceiling heights.
        const NOCLIPHEIGHT = 1 << 9;
        const NOGRAVITY = 1 << 10;
        const FLOAT = 1 << 11;
        /// Collides as a thin oriented line instead of a box.
        const PAPER_COLLISION = 1 << 12;
        const ENEMY = 1 << 13;
        const BOSS = 1 << 14;
        const MONITOR = 1 << 15;
        const GRENADE_BOUNCE = 1 << 16;
        /// Not linked into the spatial index.
        const NOBLOCKMAP = 1 << 17;
        /// Reflects off walls instead of sliding.
        const BOUNCE = 1 << 18;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct MobjFlags2: u32 {
        const SKULLFLY = 1 << 0;
        /// Pushes transfer acceleration instead of copying momentum.
        const SLIDEPUSH = 1 << 1;
        const AMBUSH = 1 << 2;
    }
}

bitflags! {
    /// Per-tick and orientation state bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct ExtraFlags: u32 {
        /// Gravity points up; every height comparison is mirrored.
        const VERTICAL_FLIP = 1 << 0;
        /// Already launched by a spring this tick.
        const SPRUNG = 1 << 1;
        const JUST_STEPPED_DOWN = 1 << 2;
        const ONGROUND = 1 << 3;
        const APPLY_PMOMZ = 1 << 4;
        /// Already bounced off a wall this tick.
        const JUST_BOUNCED_WALL = 1 << 5;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct LineFlags: u32 {
        /// Blocks everything that is not no-clip.
        const IMPASSABLE = 1 << 0;
        const BLOCK_PLAYERS = 1 << 1;
        const BLOCK_MONSTERS = 1 << 2;
        /// Bouncing entities slide along this line instead.
        const NOT_BOUNCY = 1 << 3;
    }
}

bitflags! {
    /// Behavior of a sub-surface ("fake floor") slab.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct SubSurfaceFlags: u32 {
        const EXISTS = 1 << 0;
        const BLOCK_PLAYER = 1 << 1;
        const BLOCK_OTHERS = 1 << 2;
        const SWIMMABLE = 1 << 3;
        const GOO_WATER = 1 << 4;
        const QUICKSAND = 1 << 5;
        /// Only its top is solid.
        const PLATFORM = 1 << 6;
        /// Only its bottom is solid.
        const REVERSE_PLATFORM = 1 << 7;
        /// Hurts players that touch it.
        const DAMAGING = 1 << 8;
        const SOLID = Self::BLOCK_PLAYER.bits() | Self::BLOCK_OTHERS.bits();
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct PolyFlags: u32 {
        const SOLID = 1 << 0;
        /// Use the control sector's heights as a top and bottom.
        const CLIP_PLANES = 1 << 1;
        /// Its lines never act as triggers.
        const NO_SPECIALS = 1 << 2;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct SectorFlags: u32 {
        const STEP_UP_DOUBLE = 1 << 0;
        const NO_STEP_UP = 1 << 1;
        const NO_STEP_DOWN = 1 << 2;
        const CAMERA_NOCLIP = 1 << 3;
        const TRIGGER_ON_TOUCH = 1 << 4;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct DamageFlags: u32 {
        /// The attacker steals an item from the victim.
        const STEAL = 1 << 0;
        const CANT_HURT_SELF = 1 << 1;
    }
}

// --- Gameplay categories ---------------------------------------------------

/// Thrown and dropped items with their own collision hooks.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ItemClass {
    IceBlock,
    EggBox,
    EggBoxShield,
    Orbinaut,
    OrbinautShield,
    Jawz,
    JawzShield,
    Banana,
    BananaShield,
    Ballhog,
    Mine,
    MineShield,
    MineExplosion,
    LandMine,
    Sink,
    FallingRock,
}

/// Items that share one collision hook.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ItemGroup {
    IceBlock,
    EggBox,
    OrbinautJawz,
    BananaBallhog,
    Mine,
    MineExplosion,
    LandMine,
    Sink,
    FallingRock,
}

impl ItemClass {
    pub fn group(self) -> ItemGroup {
        match self {
            ItemClass::IceBlock => ItemGroup::IceBlock,
            ItemClass::EggBox | ItemClass::EggBoxShield => ItemGroup::EggBox,
            ItemClass::Orbinaut
            | ItemClass::OrbinautShield
            | ItemClass::Jawz
            | ItemClass::JawzShield => ItemGroup::OrbinautJawz,
            ItemClass::Banana | ItemClass::BananaShield | ItemClass::Ballhog => {
                ItemGroup::BananaBallhog
            }
            ItemClass::Mine | ItemClass::MineShield => ItemGroup::Mine,
            ItemClass::MineExplosion => ItemGroup::MineExplosion,
            ItemClass::LandMine => ItemGroup::LandMine,
            ItemClass::Sink => ItemGroup::Sink,
            ItemClass::FallingRock => ItemGroup::FallingRock,
        }
    }

    /// Thrown items a blown-up bubble shield sends back.
    pub fn reflectable(self) -> bool {
        matches!(
            self,
            ItemClass::Orbinaut
                | ItemClass::Jawz
                | ItemClass::Banana
                | ItemClass::EggBox
                | ItemClass::Ballhog
                | ItemClass::Mine
                | ItemClass::LandMine
                | ItemClass::Sink
        )
    }
}

/// What an entity is, as far as the pairwise rules care.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum EntityKind {
    #[default]
    Generic,
    Player,
    /// Upright spike; its solid form impales things it rises into.
    Spike,
    WallSpike,
    Spring,
    /// Spring carried on a shell.
    SpringShell,
    Fan,
    Steam,
    BubbleShield,
    RandomItem,
    BlueRobraHead,
    BlueRobraJoint,
    SmkPipe,
    SmkThwomp,
    KartLeftover,
    Gargoyle,
    /// Bounces off walls at full speed.
    Shell,
    ThrownBounce,
    ThrownGrenade,
    /// Skims over water; never steps.
    Skim,
    Item(ItemClass),
}

impl EntityKind {
    #[inline]
    pub fn item(self) -> Option<ItemClass> {
        match self {
            EntityKind::Item(class) => Some(class),
            _ => None,
        }
    }

    #[inline]
    pub fn is_fan_or_steam(self) -> bool {
        matches!(self, EntityKind::Fan | EntityKind::Steam)
    }
}

/// How damage handed to [`GameHooks::apply_damage`](crate::api::GameHooks::apply_damage) should be treated.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DamageKind {
    #[default]
    Normal,
    Wipeout,
    Tumble,
    Crushed,
    Spectator,
    Explode,
    Custom(u8),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub struct Damage {
    pub amount: i32,
    pub kind: DamageKind,
    pub flags: DamageFlags,
}

impl Damage {
    pub fn new(amount: i32, kind: DamageKind) -> Self {
        Self { amount, kind, flags: DamageFlags::empty() }
    }

    pub fn with_flags(mut self, flags: DamageFlags) -> Self {
        self.flags = flags;
        self
    }
}

/// Override returned by the pair-collision hook.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum CollideOverride {
    /// Let the built-in rules decide.
    #[default]
    Default,
    /// Treat the pair as blocking.
    Force,
    /// Let the pair pass through each other.
    Skip,
}

// --- Surfaces ----------------------------------------------------------------

/// A sub-surface slab identified by its owning sector and index in that sector.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubSurfaceRef {
    pub sector: SectorId,
    pub index: u32,
}

/// Whatever an entity rests on or bumps its head against.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Surface {
    Sector(SectorId),
    SubSurface(SubSurfaceRef),
    Polyobject(PolyId),
    Entity(EntityId),
}

impl Default for Surface {
    fn default() -> Self {
        Surface::Sector(SectorId(0))
    }
}

// --- Events ------------------------------------------------------------------

/// A trigger-class line an entity crossed during a committed move.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct LineCrossing {
    pub line: LineId,
    pub entity: EntityId,
    /// Side of the line the entity started on (0 = front).
    pub from_side: u8,
}

// --- Configuration -----------------------------------------------------------

/// World-level tuning. Every field has a default, so partial documents load.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    // ========================================================================
    // Scale
    // ========================================================================
    /// Global object scale of the current map.
    pub map_object_scale: Fixed,

    /// Base step-up tolerance before scaling.
    pub max_step_move: Fixed,

    /// Largest radius any entity may have; widens every spatial query.
    pub max_radius: Fixed,

    /// Grid cell size as a power of two in whole units (7 = 128 units).
    pub block_shift: u32,

    // ========================================================================
    // Interactions
    // ========================================================================
    /// Acceleration handed over by a slide-push.
    pub push_accel: Fixed,

    /// Minimum push-out speed when a player bounces off a wall.
    pub player_bounce_min_speed: Fixed,

    /// Scales horizontal spring thrust.
    pub game_speed_scalar: Fixed,

    /// Battle rules: bumper-less players pass through each other.
    pub bumpers_rule: bool,

    /// Thwomp hazards hurt players.
    pub thwomps_active: bool,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            map_object_scale: FRACUNIT,
            max_step_move: units(24),
            max_radius: units(32),
            block_shift: 7,
            push_accel: 2 * FRACUNIT,
            player_bounce_min_speed: units(15),
            game_speed_scalar: FRACUNIT,
            bumpers_rule: false,
            thwomps_active: true,
        }
    }
}

/// Counters describing the current world state.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct WorldStats {
    pub entities: usize,
    /// Live sector-membership nodes.
    pub sector_nodes: usize,
    /// Pooled membership nodes waiting for reuse.
    pub free_nodes: usize,
    pub cells: usize,
}
