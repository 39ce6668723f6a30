//! Uniform grid over the map. Lines and polyobjects are binned once at load;
//! entities are binned by their origin only, so queries widen their box by
//! the largest possible radius.

use glam::IVec2;
use tracing::info;

use crate::fixed::{FRACBITS, Fixed};
use crate::map::{BBox, Map, MapError};
use crate::types::*;

const MAX_CELLS: i64 = 1 << 24;

/// A clamped rectangle of grid cells. Copy, so callers can hold it while
/// mutating the blockmap.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct CellRange {
    x0: i32,
    x1: i32,
    y0: i32,
    y1: i32,
    width: i32,
}

impl CellRange {
    pub fn is_empty(&self) -> bool {
        self.x0 > self.x1 || self.y0 > self.y1
    }

    /// Cell indices column by column: x outer, y inner. Hook side effects
    /// and the winning floor entity depend on this order.
    pub fn iter(self) -> impl Iterator<Item = usize> {
        (self.x0..=self.x1)
            .flat_map(move |x| (self.y0..=self.y1).map(move |y| (y * self.width + x) as usize))
    }
}

pub struct Blockmap {
    origin: IVec2,
    shift: u32,
    width: i32,
    height: i32,
    lines: Vec<Vec<LineId>>,
    polys: Vec<Vec<PolyId>>,
    things: Vec<Vec<EntityId>>,
    valid_count: u32,
    line_stamps: Vec<u32>,
    poly_stamps: Vec<u32>,
}

impl Blockmap {
    pub fn new(map: &Map, cfg: &WorldConfig) -> Result<Self, MapError> {
        let shift = FRACBITS + cfg.block_shift.min(15);
        let origin = map.bounds.min;
        let width = ((map.bounds.max.x as i64 - origin.x as i64) >> shift) + 1;
        let height = ((map.bounds.max.y as i64 - origin.y as i64) >> shift) + 1;
        if width * height > MAX_CELLS {
            return Err(MapError::GridTooLarge { width, height });
        }
        let cells = (width * height) as usize;

        let mut bm = Self {
            origin,
            shift,
            width: width as i32,
            height: height as i32,
            lines: vec![Vec::new(); cells],
            polys: vec![Vec::new(); cells],
            things: vec![Vec::new(); cells],
            valid_count: 0,
            line_stamps: vec![0; map.lines.len()],
            poly_stamps: vec![0; map.polyobjects.len()],
        };

        for (i, line) in map.lines.iter().enumerate() {
            for cell in bm.cells(&line.bbox).iter() {
                bm.lines[cell].push(LineId(i as u32));
            }
        }
        for (i, poly) in map.polyobjects.iter().enumerate() {
            for cell in bm.cells(&poly.bbox).iter() {
                bm.polys[cell].push(PolyId(i as u32));
            }
        }

        info!(width = bm.width, height = bm.height, lines = map.lines.len(), "built blockmap");
        Ok(bm)
    }

    #[inline]
    pub fn cell_count(&self) -> usize {
        self.things.len()
    }

    fn column(&self, x: Fixed) -> i64 {
        (x as i64 - self.origin.x as i64) >> self.shift
    }

    fn row(&self, y: Fixed) -> i64 {
        (y as i64 - self.origin.y as i64) >> self.shift
    }

    /// Cell containing a point, or `None` off the map.
    pub fn cell_at(&self, x: Fixed, y: Fixed) -> Option<usize> {
        let (cx, cy) = (self.column(x), self.row(y));
        if cx < 0 || cy < 0 || cx >= self.width as i64 || cy >= self.height as i64 {
            return None;
        }
        Some((cy * self.width as i64 + cx) as usize)
    }

    /// Cells spanned by `bbox`, clamped to the grid.
    pub fn cells(&self, bbox: &BBox) -> CellRange {
        let clamp_x = |v: i64| v.clamp(-1, self.width as i64) as i32;
        let clamp_y = |v: i64| v.clamp(-1, self.height as i64) as i32;
        CellRange {
            x0: clamp_x(self.column(bbox.min.x)).max(0),
            x1: clamp_x(self.column(bbox.max.x)).min(self.width - 1),
            y0: clamp_y(self.row(bbox.min.y)).max(0),
            y1: clamp_y(self.row(bbox.max.y)).min(self.height - 1),
            width: self.width,
        }
    }

    #[inline]
    pub fn lines_in(&self, cell: usize) -> &[LineId] {
        &self.lines[cell]
    }

    #[inline]
    pub fn polys_in(&self, cell: usize) -> &[PolyId] {
        &self.polys[cell]
    }

    /// Entities linked in `cell`, most recently linked first.
    pub fn things_in(&self, cell: usize) -> Vec<EntityId> {
        self.things[cell].iter().rev().copied().collect()
    }

    pub(crate) fn link(&mut self, cell: usize, id: EntityId) {
        self.things[cell].push(id);
    }

    pub(crate) fn unlink(&mut self, cell: usize, id: EntityId) {
        if let Some(pos) = self.things[cell].iter().position(|&e| e == id) {
            self.things[cell].remove(pos);
        }
    }

    // --- Query episodes ----------------------------------------------------

    /// Starts a new dedup episode; every line and polyobject becomes unvisited.
    pub fn new_episode(&mut self) {
        self.valid_count = self.valid_count.wrapping_add(1);
        if self.valid_count == 0 {
            self.line_stamps.fill(0);
            self.poly_stamps.fill(0);
            self.valid_count = 1;
        }
    }

    /// True the first time `line` is seen in the current episode.
    pub fn visit_line(&mut self, line: LineId) -> bool {
        let stamp = &mut self.line_stamps[line.idx()];
        if *stamp == self.valid_count {
            return false;
        }
        *stamp = self.valid_count;
        true
    }

    pub fn visit_poly(&mut self, poly: PolyId) -> bool {
        let stamp = &mut self.poly_stamps[poly.idx()];
        if *stamp == self.valid_count {
            return false;
        }
        *stamp = self.valid_count;
        true
    }

    /// Unvisited lines in `range`, marking them visited.
    pub fn collect_lines(&mut self, range: CellRange) -> Vec<LineId> {
        let mut out = Vec::new();
        for cell in range.iter() {
            for i in 0..self.lines[cell].len() {
                let line = self.lines[cell][i];
                if self.visit_line(line) {
                    out.push(line);
                }
            }
        }
        out
    }

    // --- Point location ----------------------------------------------------

    /// Sector containing `(x, y)`: the nearest non-polyobject line hit by a
    /// ray cast towards +x decides, by which side the point is on.
    pub fn sector_at(&self, map: &Map, x: Fixed, y: Fixed) -> SectorId {
        let row = self.row(y);
        if row < 0 || row >= self.height as i64 {
            return SectorId(0);
        }
        let first = self.column(x).max(0);
        let mut best: Option<(i64, LineId)> = None;

        for col in first..self.width as i64 {
            let cell = (row * self.width as i64 + col) as usize;
            for &lid in &self.lines[cell] {
                let line = map.line(lid);
                if line.polyobject.is_some() || !(line.bbox.min.y <= y && y < line.bbox.max.y) {
                    continue;
                }
                let ix = line.v1.x as i64
                    + (y as i64 - line.v1.y as i64) * line.dx as i64 / line.dy as i64;
                if ix < x as i64 {
                    continue;
                }
                if best.is_none_or(|(bx, bl)| (ix, lid) < (bx, bl)) {
                    best = Some((ix, lid));
                }
            }
            let cell_right = self.origin.x as i64 + ((col + 1) << self.shift);
            if best.is_some_and(|(bx, _)| bx < cell_right) {
                break;
            }
        }

        match best {
            Some((_, lid)) => {
                let line = map.line(lid);
                if line.point_side(x, y) == 0 { line.front } else { line.back.unwrap_or(line.front) }
            }
            None => SectorId(0),
        }
    }
}
