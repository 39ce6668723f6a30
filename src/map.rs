//! Static level data: sectors, lines, slopes, sub-surfaces and polyobjects.
//!
//! Everything here is immutable after [`Map::new`] except sector heights,
//! which movers change before calling
//! [`check_sector`](crate::crush::check_sector).

use glam::{IVec2, IVec3};
use thiserror::Error;

use crate::fixed::{FRACUNIT, Fixed, fixed_div, fixed_mul, fixed_sqrt};
use crate::types::*;

/// Line specials that act as triggers when crossed.
pub const SPECIAL_FINISH_LINE: u16 = 2001;
pub const SPECIAL_RESPAWN_LINE: u16 = 2003;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MapError {
    #[error("map has no lines")]
    Empty,
    #[error("line {line} references missing sector {sector}")]
    MissingSector { line: u32, sector: u32 },
    #[error("sector {sector} has a sub-surface controlled by missing sector {control}")]
    MissingControlSector { sector: u32, control: u32 },
    #[error("sector {sector} references missing slope {slope}")]
    SlopeOutOfRange { sector: u32, slope: u32 },
    #[error("polyobject {0} has no lines")]
    EmptyPolyobject(u32),
    #[error("polyobject {poly} claims line {line} which is missing or already owned")]
    ForeignPolyLine { poly: u32, line: u32 },
    #[error("polyobject {0} has no control sector (first line is one-sided)")]
    PolyWithoutControl(u32),
    #[error("grid of {width}x{height} cells is too large")]
    GridTooLarge { width: i64, height: i64 },
}

// --- Bounding boxes ----------------------------------------------------------

/// Inclusive axis-aligned box in fixed-point units.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub struct BBox {
    pub min: IVec2,
    pub max: IVec2,
}

impl BBox {
    pub fn around(x: Fixed, y: Fixed, radius: Fixed) -> Self {
        Self {
            min: IVec2::new(x.saturating_sub(radius), y.saturating_sub(radius)),
            max: IVec2::new(x.saturating_add(radius), y.saturating_add(radius)),
        }
    }

    pub fn of_points(a: IVec2, b: IVec2) -> Self {
        Self { min: a.min(b), max: a.max(b) }
    }

    pub fn grow(self, by: Fixed) -> Self {
        Self {
            min: IVec2::new(self.min.x.saturating_sub(by), self.min.y.saturating_sub(by)),
            max: IVec2::new(self.max.x.saturating_add(by), self.max.y.saturating_add(by)),
        }
    }

    pub fn union(self, other: BBox) -> Self {
        Self { min: self.min.min(other.min), max: self.max.max(other.max) }
    }

    /// Strict overlap: boxes that only share an edge do not touch.
    #[inline]
    pub fn touches(&self, other: &BBox) -> bool {
        self.max.x > other.min.x
            && self.min.x < other.max.x
            && self.max.y > other.min.y
            && self.min.y < other.max.y
    }
}

// --- Slopes ------------------------------------------------------------------

/// A planar floor or ceiling: height rises by `zdelta` per unit travelled
/// along `d` from `origin`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Slope {
    pub origin: IVec3,
    /// Unit direction of steepest ascent, 16.16.
    pub d: IVec2,
    pub zdelta: Fixed,
    /// Unit normal pointing away from the solid side, 16.16.
    pub normal: IVec3,
}

impl Slope {
    pub fn new(origin: IVec3, d: IVec2, zdelta: Fixed) -> Self {
        let len = fixed_sqrt(fixed_mul(zdelta, zdelta).saturating_add(FRACUNIT));
        let nz = fixed_div(FRACUNIT, len);
        let normal = IVec3::new(
            -fixed_mul(fixed_mul(zdelta, d.x), nz),
            -fixed_mul(fixed_mul(zdelta, d.y), nz),
            nz,
        );
        Self { origin, d, zdelta, normal }
    }

    #[inline]
    pub fn z_at(&self, x: Fixed, y: Fixed) -> Fixed {
        let dist = fixed_mul(x.wrapping_sub(self.origin.x), self.d.x)
            .wrapping_add(fixed_mul(y.wrapping_sub(self.origin.y), self.d.y));
        self.origin.z.wrapping_add(fixed_mul(dist, self.zdelta))
    }
}

// --- Sectors -----------------------------------------------------------------

/// A slab inside a sector; its bottom and top are the control sector's
/// floor and ceiling.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SubSurface {
    pub control: SectorId,
    pub flags: SubSurfaceFlags,
}

/// A sector whose heights move together with the owner.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct AttachedSector {
    pub sector: SectorId,
    /// Entities in it are re-clipped when the owner moves.
    pub solid: bool,
}

#[derive(Clone, Debug, Default)]
pub struct Sector {
    pub floor_height: Fixed,
    pub ceiling_height: Fixed,
    pub floor_pic: u32,
    pub ceiling_pic: u32,
    pub floor_slope: Option<SlopeId>,
    pub ceiling_slope: Option<SlopeId>,
    pub sub_surfaces: Vec<SubSurface>,
    pub attached: Vec<AttachedSector>,
    pub flags: SectorFlags,
    /// Sector whose heights the camera uses instead of this one's.
    pub camera_heights: Option<SectorId>,
    /// Set by the crusher pass whenever this sector is re-validated.
    pub moved: bool,
    /// Lines bordering this sector; filled in by [`Map::new`].
    pub lines: Vec<LineId>,
}

impl Sector {
    pub fn new(floor_height: Fixed, ceiling_height: Fixed) -> Self {
        Self { floor_height, ceiling_height, ..Default::default() }
    }

    pub fn with_flags(mut self, flags: SectorFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_pics(mut self, floor_pic: u32, ceiling_pic: u32) -> Self {
        self.floor_pic = floor_pic;
        self.ceiling_pic = ceiling_pic;
        self
    }

    pub fn with_slopes(mut self, floor: Option<SlopeId>, ceiling: Option<SlopeId>) -> Self {
        self.floor_slope = floor;
        self.ceiling_slope = ceiling;
        self
    }

    pub fn with_sub_surface(mut self, control: SectorId, flags: SubSurfaceFlags) -> Self {
        self.sub_surfaces.push(SubSurface { control, flags });
        self
    }

    pub fn with_attached(mut self, sector: SectorId, solid: bool) -> Self {
        self.attached.push(AttachedSector { sector, solid });
        self
    }
}

// --- Lines -------------------------------------------------------------------

#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum SlopeType {
    #[default]
    Horizontal,
    Vertical,
    Positive,
    Negative,
}

/// An infinite directed line through `origin`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub struct Divline {
    pub origin: IVec2,
    pub delta: IVec2,
}

impl Divline {
    pub fn new(origin: IVec2, delta: IVec2) -> Self {
        Self { origin, delta }
    }

    pub fn slope_type(&self) -> SlopeType {
        let d = self.delta;
        if d.x == 0 {
            SlopeType::Vertical
        } else if d.y == 0 {
            SlopeType::Horizontal
        } else if (d.x > 0) == (d.y > 0) {
            SlopeType::Positive
        } else {
            SlopeType::Negative
        }
    }

    /// 0 for the front (right-hand) side, 1 for the back.
    pub fn point_side(&self, x: Fixed, y: Fixed) -> u8 {
        let (o, d) = (self.origin, self.delta);
        if d.x == 0 {
            return if x <= o.x { (d.y > 0) as u8 } else { (d.y < 0) as u8 };
        }
        if d.y == 0 {
            return if y <= o.y { (d.x < 0) as u8 } else { (d.x > 0) as u8 };
        }
        let left = (d.y as i64) * (x as i64 - o.x as i64);
        let right = (y as i64 - o.y as i64) * (d.x as i64);
        if right < left { 0 } else { 1 }
    }

    /// 0 or 1 when the whole box lies on one side, -1 when it straddles.
    pub fn box_side(&self, bbox: &BBox) -> i8 {
        let (o, d) = (self.origin, self.delta);
        let (p1, p2) = match self.slope_type() {
            SlopeType::Horizontal => {
                let flip = d.x < 0;
                ((bbox.max.y > o.y) ^ flip, (bbox.min.y > o.y) ^ flip)
            }
            SlopeType::Vertical => {
                let flip = d.y < 0;
                ((bbox.max.x < o.x) ^ flip, (bbox.min.x < o.x) ^ flip)
            }
            SlopeType::Positive => (
                self.point_side(bbox.min.x, bbox.max.y) == 1,
                self.point_side(bbox.max.x, bbox.min.y) == 1,
            ),
            SlopeType::Negative => (
                self.point_side(bbox.max.x, bbox.max.y) == 1,
                self.point_side(bbox.min.x, bbox.min.y) == 1,
            ),
        };
        if p1 == p2 { p1 as i8 } else { -1 }
    }

    /// Fraction along `self` (16.16) where it meets the infinite line `other`.
    /// `None` when they are parallel.
    pub fn intercept(&self, other: &Divline) -> Option<Fixed> {
        let (p, d) = (self.origin.as_i64vec2(), self.delta.as_i64vec2());
        let (l, e) = (other.origin.as_i64vec2(), other.delta.as_i64vec2());
        let den = e.y as i128 * d.x as i128 - e.x as i128 * d.y as i128;
        if den == 0 {
            return None;
        }
        let num = (l.x - p.x) as i128 * e.y as i128 - (l.y - p.y) as i128 * e.x as i128;
        let frac = (num << 16) / den;
        Some(frac.clamp(i32::MIN as i128, i32::MAX as i128) as Fixed)
    }

    /// Foot of the perpendicular from `(x, y)` onto the infinite line.
    pub fn closest_point(&self, x: Fixed, y: Fixed) -> IVec2 {
        let (o, d) = (self.origin, self.delta);
        let len2 = d.x as i128 * d.x as i128 + d.y as i128 * d.y as i128;
        if len2 == 0 {
            return o;
        }
        let dot = (x as i128 - o.x as i128) * d.x as i128 + (y as i128 - o.y as i128) * d.y as i128;
        IVec2::new(
            (o.x as i128 + d.x as i128 * dot / len2) as i32,
            (o.y as i128 + d.y as i128 * dot / len2) as i32,
        )
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Line {
    pub v1: IVec2,
    pub v2: IVec2,
    pub dx: Fixed,
    pub dy: Fixed,
    pub bbox: BBox,
    pub slope_type: SlopeType,
    pub front: SectorId,
    pub back: Option<SectorId>,
    pub flags: LineFlags,
    pub special: u16,
    pub tripwire: bool,
    /// Owning polyobject; filled in by [`Map::new`].
    pub polyobject: Option<PolyId>,
}

impl Line {
    pub fn new(v1: IVec2, v2: IVec2, front: SectorId, back: Option<SectorId>) -> Self {
        let delta = v2 - v1;
        Self {
            v1,
            v2,
            dx: delta.x,
            dy: delta.y,
            bbox: BBox::of_points(v1, v2),
            slope_type: Divline::new(v1, delta).slope_type(),
            front,
            back,
            flags: LineFlags::empty(),
            special: 0,
            tripwire: false,
            polyobject: None,
        }
    }

    pub fn with_flags(mut self, flags: LineFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_special(mut self, special: u16) -> Self {
        self.special = special;
        self
    }

    pub fn with_tripwire(mut self) -> Self {
        self.tripwire = true;
        self
    }

    #[inline]
    pub fn divline(&self) -> Divline {
        Divline::new(self.v1, IVec2::new(self.dx, self.dy))
    }

    #[inline]
    pub fn point_side(&self, x: Fixed, y: Fixed) -> u8 {
        self.divline().point_side(x, y)
    }

    #[inline]
    pub fn box_side(&self, bbox: &BBox) -> i8 {
        self.divline().box_side(bbox)
    }

    #[inline]
    pub fn closest_point(&self, x: Fixed, y: Fixed) -> IVec2 {
        self.divline().closest_point(x, y)
    }

    /// Crossing it must be reported to level scripting.
    pub fn is_trigger(&self) -> bool {
        self.tripwire || matches!(self.special, SPECIAL_FINISH_LINE | SPECIAL_RESPAWN_LINE)
    }
}

// --- Polyobjects -------------------------------------------------------------

#[derive(Clone, Debug, Default)]
pub struct Polyobject {
    pub lines: Vec<LineId>,
    pub flags: PolyFlags,
    /// Back sector of the first line; filled in by [`Map::new`].
    pub control: SectorId,
    pub bbox: BBox,
}

impl Polyobject {
    pub fn new(lines: Vec<LineId>, flags: PolyFlags) -> Self {
        Self { lines, flags, ..Default::default() }
    }
}

// --- Map -----------------------------------------------------------------------

#[derive(Clone, Debug)]
pub struct Map {
    pub sectors: Vec<Sector>,
    pub lines: Vec<Line>,
    pub polyobjects: Vec<Polyobject>,
    pub slopes: Vec<Slope>,
    /// Box around every vertex.
    pub bounds: BBox,
}

impl Map {
    pub fn new(
        mut sectors: Vec<Sector>,
        mut lines: Vec<Line>,
        mut polyobjects: Vec<Polyobject>,
        slopes: Vec<Slope>,
    ) -> Result<Self, MapError> {
        let first = lines.first().ok_or(MapError::Empty)?;
        let mut bounds = first.bbox;

        let sector_count = sectors.len() as u32;
        let known = |s: SectorId| s.0 < sector_count;

        for (i, sector) in sectors.iter().enumerate() {
            for sub in &sector.sub_surfaces {
                if !known(sub.control) {
                    return Err(MapError::MissingControlSector { sector: i as u32, control: sub.control.0 });
                }
            }
            for slope in [sector.floor_slope, sector.ceiling_slope].into_iter().flatten() {
                if slope.idx() >= slopes.len() {
                    return Err(MapError::SlopeOutOfRange { sector: i as u32, slope: slope.0 });
                }
            }
            for att in &sector.attached {
                if !known(att.sector) {
                    return Err(MapError::MissingControlSector { sector: i as u32, control: att.sector.0 });
                }
            }
        }

        for sector in &mut sectors {
            sector.lines.clear();
        }
        for (i, line) in lines.iter_mut().enumerate() {
            let id = LineId(i as u32);
            for s in std::iter::once(line.front).chain(line.back) {
                if !known(s) {
                    return Err(MapError::MissingSector { line: id.0, sector: s.0 });
                }
            }
            sectors[line.front.idx()].lines.push(id);
            if let Some(back) = line.back.filter(|&b| b != line.front) {
                sectors[back.idx()].lines.push(id);
            }
            line.polyobject = None;
            bounds = bounds.union(line.bbox);
        }

        for (p, poly) in polyobjects.iter_mut().enumerate() {
            let pid = PolyId(p as u32);
            let first = *poly.lines.first().ok_or(MapError::EmptyPolyobject(pid.0))?;
            let mut bbox: Option<BBox> = None;
            for &lid in &poly.lines {
                let line = lines
                    .get_mut(lid.idx())
                    .filter(|l| l.polyobject.is_none())
                    .ok_or(MapError::ForeignPolyLine { poly: pid.0, line: lid.0 })?;
                line.polyobject = Some(pid);
                bbox = Some(bbox.map_or(line.bbox, |b| b.union(line.bbox)));
            }
            poly.control = lines[first.idx()].back.ok_or(MapError::PolyWithoutControl(pid.0))?;
            poly.bbox = bbox.unwrap_or_default();
        }

        Ok(Self { sectors, lines, polyobjects, slopes, bounds })
    }

    #[inline]
    pub fn sector(&self, id: SectorId) -> &Sector {
        &self.sectors[id.idx()]
    }

    #[inline]
    pub fn line(&self, id: LineId) -> &Line {
        &self.lines[id.idx()]
    }

    #[inline]
    pub fn poly(&self, id: PolyId) -> &Polyobject {
        &self.polyobjects[id.idx()]
    }

    /// Floor height of `sector` at `(x, y)`, following its slope if any.
    pub fn floor_at(&self, sector: SectorId, x: Fixed, y: Fixed) -> Fixed {
        let s = self.sector(sector);
        match s.floor_slope {
            Some(slope) => self.slopes[slope.idx()].z_at(x, y),
            None => s.floor_height,
        }
    }

    pub fn ceiling_at(&self, sector: SectorId, x: Fixed, y: Fixed) -> Fixed {
        let s = self.sector(sector);
        match s.ceiling_slope {
            Some(slope) => self.slopes[slope.idx()].z_at(x, y),
            None => s.ceiling_height,
        }
    }

    /// Top and bottom of a sub-surface slab at `(x, y)`.
    pub fn sub_surface_span(&self, sub: &SubSurface, x: Fixed, y: Fixed) -> (Fixed, Fixed) {
        (self.ceiling_at(sub.control, x, y), self.floor_at(sub.control, x, y))
    }

    pub fn sub_surface(&self, r: SubSurfaceRef) -> Option<&SubSurface> {
        self.sectors.get(r.sector.idx())?.sub_surfaces.get(r.index as usize)
    }

    /// Inside means on the back side of every polyobject line.
    pub fn poly_contains_point(&self, poly: PolyId, x: Fixed, y: Fixed) -> bool {
        self.poly(poly).lines.iter().all(|&l| self.line(l).point_side(x, y) == 1)
    }

    /// False only when the box lies entirely in front of some polyobject line.
    pub fn poly_contains_box(&self, poly: PolyId, bbox: &BBox) -> bool {
        self.poly(poly).lines.iter().all(|&l| self.line(l).box_side(bbox) != 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixed::units;

    fn v(x: i32, y: i32) -> IVec2 {
        IVec2::new(units(x), units(y))
    }

    #[test]
    fn test_point_side_axis_lines() {
        // vertical line pointing up: right hand side is front
        let up = Divline::new(v(0, 0), v(0, 10));
        assert_eq!(up.point_side(units(5), units(5)), 0);
        assert_eq!(up.point_side(units(-5), units(5)), 1);
        let east = Divline::new(v(0, 0), v(10, 0));
        assert_eq!(east.point_side(units(5), units(-5)), 0);
        assert_eq!(east.point_side(units(5), units(5)), 1);
    }

    #[test]
    fn test_point_side_diagonal() {
        let diag = Divline::new(v(0, 0), v(10, 10));
        assert_eq!(diag.point_side(units(10), 0), 0);
        assert_eq!(diag.point_side(0, units(10)), 1);
        // points on the line count as back
        assert_eq!(diag.point_side(units(3), units(3)), 1);
    }

    #[test]
    fn test_zero_length_line_is_front() {
        let dot = Divline::new(v(4, 4), IVec2::ZERO);
        assert_eq!(dot.point_side(units(100), units(-3)), 0);
        assert_eq!(dot.closest_point(units(9), units(9)), v(4, 4));
    }

    #[test]
    fn test_box_side_straddle() {
        let up = Divline::new(v(0, 0), v(0, 10));
        assert_eq!(up.box_side(&BBox::around(units(5), 0, units(2))), 0);
        assert_eq!(up.box_side(&BBox::around(units(-5), 0, units(2))), 1);
        assert_eq!(up.box_side(&BBox::around(0, 0, units(2))), -1);
        let diag = Divline::new(v(0, 0), v(10, -10));
        assert_eq!(diag.box_side(&BBox::around(units(5), units(-5), units(1))), -1);
    }

    #[test]
    fn test_intercept_and_closest_point() {
        let trace = Divline::new(v(0, 5), v(20, 0));
        let wall = Divline::new(v(10, 0), v(0, 10));
        assert_eq!(trace.intercept(&wall), Some(FRACUNIT / 2));
        assert_eq!(trace.intercept(&Divline::new(v(0, 0), v(5, 0))), None);
        assert_eq!(wall.closest_point(units(3), units(7)), v(10, 7));
    }

    #[test]
    fn test_slope_z_and_normal() {
        let s = Slope::new(IVec3::new(0, 0, 0), IVec2::new(FRACUNIT, 0), FRACUNIT / 2);
        assert_eq!(s.z_at(units(10), units(99)), units(5));
        assert!(s.normal.z > 0 && s.normal.z < FRACUNIT);
        assert!(s.normal.x < 0);
        assert_eq!(s.normal.y, 0);
    }

    #[test]
    fn test_map_validation() {
        let sectors = vec![Sector::new(0, units(128))];
        let bad = vec![Line::new(v(0, 0), v(0, 64), SectorId(0), Some(SectorId(3)))];
        assert_eq!(
            Map::new(sectors.clone(), bad, vec![], vec![]).unwrap_err(),
            MapError::MissingSector { line: 0, sector: 3 }
        );
        assert_eq!(Map::new(sectors.clone(), vec![], vec![], vec![]).unwrap_err(), MapError::Empty);

        let one_sided = vec![Line::new(v(0, 0), v(0, 64), SectorId(0), None)];
        let polys = vec![Polyobject::new(vec![LineId(0)], PolyFlags::SOLID)];
        assert_eq!(
            Map::new(sectors, one_sided, polys, vec![]).unwrap_err(),
            MapError::PolyWithoutControl(0)
        );
    }

    #[test]
    fn test_trigger_classification() {
        let l = Line::new(v(0, 0), v(0, 64), SectorId(0), None);
        assert!(!l.is_trigger());
        assert!(l.clone().with_special(SPECIAL_FINISH_LINE).is_trigger());
        assert!(l.clone().with_special(SPECIAL_RESPAWN_LINE).is_trigger());
        assert!(l.with_tripwire().is_trigger());
    }
}
