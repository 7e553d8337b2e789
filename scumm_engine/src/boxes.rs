//! Walk boxes of the current room, their script-set overrides, the scale
//! slots and the box connectivity matrix.

use scumm_formats::room::{BoxPoint, WalkBox};
use serde::{Deserialize, Serialize};

use crate::error::{FatalError, VmResult};

pub const BOX_X_FLIP: u8 = 0x08;
pub const BOX_Y_FLIP: u8 = 0x10;
pub const BOX_PLAYER_ONLY: u8 = 0x20;
pub const BOX_LOCKED: u8 = 0x40;
pub const BOX_INVISIBLE: u8 = 0x80;

pub const NUM_SCALE_SLOTS: usize = 20;

/// Linear scale ramp between two y coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ScaleSlot {
    pub y1: i32,
    pub scale1: i32,
    pub y2: i32,
    pub scale2: i32,
}

impl ScaleSlot {
    pub fn scale_at(&self, y: i32) -> i32 {
        if self.y1 == self.y2 {
            return self.scale1.clamp(1, 255);
        }
        let scale = (self.scale2 - self.scale1) * (y - self.y1) / (self.y2 - self.y1) + self.scale1;
        scale.clamp(1, 255)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Corners {
    pub ul: (i32, i32),
    pub ur: (i32, i32),
    pub lr: (i32, i32),
    pub ll: (i32, i32),
}

fn point(p: BoxPoint) -> (i32, i32) {
    (p.x as i32, p.y as i32)
}

impl Corners {
    fn from_walk_box(walk: &WalkBox) -> Self {
        Corners {
            ul: point(walk.ul),
            ur: point(walk.ur),
            lr: point(walk.lr),
            ll: point(walk.ll),
        }
    }

    fn edges(&self) -> [((i32, i32), (i32, i32)); 4] {
        [
            (self.ul, self.ur),
            (self.ur, self.lr),
            (self.lr, self.ll),
            (self.ll, self.ul),
        ]
    }

    fn corners(&self) -> [(i32, i32); 4] {
        [self.ul, self.ur, self.lr, self.ll]
    }

    fn bounds(&self) -> (i32, i32, i32, i32) {
        let xs = self.corners().map(|c| c.0);
        let ys = self.corners().map(|c| c.1);
        (
            xs.into_iter().min().unwrap_or(0),
            ys.into_iter().min().unwrap_or(0),
            xs.into_iter().max().unwrap_or(0),
            ys.into_iter().max().unwrap_or(0),
        )
    }

    pub fn contains(&self, x: i32, y: i32) -> bool {
        let (left, top, right, bottom) = self.bounds();
        if x < left || x > right || y < top || y > bottom {
            return false;
        }
        // Degenerate boxes are line segments; points close to them count.
        if (self.ul == self.ur && self.lr == self.ll) || (self.ul == self.ll && self.ur == self.lr) {
            let (cx, cy) = closest_point_on_line(self.ul, self.lr, (x, y));
            if sqr_dist((cx, cy), (x, y)) <= 4 {
                return true;
            }
        }
        self.edges()
            .iter()
            .all(|&(a, b)| (b.1 - a.1) * (x - a.0) <= (y - a.1) * (b.0 - a.0))
    }

    /// Closest point on the box outline and its squared distance.
    pub fn closest_point(&self, x: i32, y: i32) -> ((i32, i32), i32) {
        let mut best = (self.ul, i32::MAX);
        for (a, b) in self.edges() {
            let candidate = closest_point_on_line(a, b, (x, y));
            let dist = sqr_dist(candidate, (x, y));
            if dist < best.1 {
                best = (candidate, dist);
            }
        }
        best
    }
}

fn sqr_dist(a: (i32, i32), b: (i32, i32)) -> i32 {
    let dx = a.0 - b.0;
    let dy = a.1 - b.1;
    dx.saturating_mul(dx).saturating_add(dy.saturating_mul(dy))
}

fn closest_point_on_line(start: (i32, i32), end: (i32, i32), p: (i32, i32)) -> (i32, i32) {
    let lxdiff = end.0 - start.0;
    let lydiff = end.1 - start.1;
    let mut result = if lxdiff == 0 {
        (start.0, p.1)
    } else if lydiff == 0 {
        (p.0, start.1)
    } else {
        let dist = lxdiff * lxdiff + lydiff * lydiff;
        if lxdiff.abs() > lydiff.abs() {
            let a = start.0 * lydiff / lxdiff;
            let b = p.0 * lxdiff / lydiff;
            let c = (a + b - start.1 + p.1) * lydiff * lxdiff / dist;
            (c, c * lydiff / lxdiff - a + start.1)
        } else {
            let a = start.1 * lxdiff / lydiff;
            let b = p.1 * lydiff / lxdiff;
            let c = (a + b - start.0 + p.0) * lydiff * lxdiff / dist;
            (c * lxdiff / lydiff - a + start.0, c)
        }
    };

    let (along, s, e) = if lydiff.abs() < lxdiff.abs() {
        (result.0, start.0, end.0)
    } else {
        (result.1, start.1, end.1)
    };
    if e >= s {
        if along < s {
            result = start;
        } else if along > e {
            result = end;
        }
    } else if along > s {
        result = start;
    } else if along < e {
        result = end;
    }
    result
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoxEntry {
    pub corners: Corners,
    pub mask: u8,
    pub flags: u8,
    pub scale: u16,
}

/// Result of snapping a point onto the walkable area.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoxFit {
    pub x: i32,
    pub y: i32,
    pub walk_box: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoxTable {
    boxes: Vec<BoxEntry>,
    /// Small-header rooms have no dummy box 0.
    first_valid: usize,
    scale_slots: Vec<ScaleSlot>,
    /// `next_hop[from][to]`, `None` when unreachable.
    next_hop: Vec<Vec<Option<u8>>>,
}

impl BoxTable {
    pub fn new(small_header: bool) -> Self {
        BoxTable {
            boxes: Vec::new(),
            first_valid: if small_header { 0 } else { 1 },
            scale_slots: vec![ScaleSlot::default(); NUM_SCALE_SLOTS],
            next_hop: Vec::new(),
        }
    }

    /// Installs the boxes of a freshly loaded room and builds the matrix.
    pub fn load(&mut self, walk_boxes: &[WalkBox]) {
        self.boxes = walk_boxes
            .iter()
            .map(|walk| BoxEntry {
                corners: Corners::from_walk_box(walk),
                mask: walk.mask,
                flags: walk.flags,
                scale: walk.scale,
            })
            .collect();
        self.create_box_matrix();
    }

    pub fn len(&self) -> usize {
        self.boxes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.boxes.is_empty()
    }

    fn entry(&self, index: i32) -> VmResult<&BoxEntry> {
        usize::try_from(index)
            .ok()
            .and_then(|i| self.boxes.get(i))
            .ok_or(FatalError::InvalidIndex {
                table: "box",
                index,
            })
    }

    fn entry_mut(&mut self, index: i32) -> VmResult<&mut BoxEntry> {
        usize::try_from(index)
            .ok()
            .and_then(|i| self.boxes.get_mut(i))
            .ok_or(FatalError::InvalidIndex {
                table: "box",
                index,
            })
    }

    pub fn flags(&self, index: i32) -> u8 {
        self.entry(index).map(|b| b.flags).unwrap_or(0)
    }

    pub fn set_flags(&mut self, index: i32, flags: u8) -> VmResult<()> {
        self.entry_mut(index)?.flags = flags;
        Ok(())
    }

    pub fn set_scale(&mut self, index: i32, scale: u16) -> VmResult<()> {
        self.entry_mut(index)?.scale = scale;
        Ok(())
    }

    pub fn box_scale(&self, index: i32) -> u16 {
        self.entry(index).map(|b| b.scale).unwrap_or(255)
    }

    pub fn set_scale_slot(&mut self, slot: i32, y1: i32, scale1: i32, y2: i32, scale2: i32) -> VmResult<()> {
        let entry = usize::try_from(slot - 1)
            .ok()
            .and_then(|i| self.scale_slots.get_mut(i))
            .ok_or(FatalError::InvalidIndex {
                table: "scale slot",
                index: slot,
            })?;
        *entry = ScaleSlot {
            y1,
            scale1,
            y2,
            scale2,
        };
        Ok(())
    }

    /// Actor scale inside `index` at row `y`. Box scales with bit 15 set
    /// name a 1-based scale slot.
    pub fn scale_at(&self, index: i32, y: i32) -> i32 {
        let Ok(entry) = self.entry(index) else {
            return 255;
        };
        if entry.scale & 0x8000 != 0 {
            let slot = (entry.scale & 0x7FFF) as usize;
            return self
                .scale_slots
                .get(slot.wrapping_sub(1))
                .map(|s| s.scale_at(y))
                .unwrap_or(255);
        }
        (entry.scale as i32).clamp(1, 255)
    }

    pub fn check_xy_in_box_bounds(&self, index: i32, x: i32, y: i32) -> bool {
        self.entry(index).is_ok_and(|b| b.corners.contains(x, y))
    }

    fn usable(&self, index: usize, player: bool) -> bool {
        let flags = self.boxes[index].flags;
        flags & BOX_INVISIBLE == 0 || (flags & BOX_PLAYER_ONLY != 0 && player)
    }

    /// Snaps `(x, y)` into the nearest usable box, searching from the last
    /// box down with growing distance thresholds.
    pub fn adjust_xy_to_be_in_box(&self, x: i32, y: i32, player: bool) -> BoxFit {
        let mut fit = BoxFit {
            x,
            y,
            walk_box: None,
        };
        if self.boxes.len() <= self.first_valid {
            return fit;
        }
        for threshold in [30, 80, 0] {
            let mut best_dist = 0xFFFF;
            let mut best_box = None;
            for index in (self.first_valid..self.boxes.len()).rev() {
                if !self.usable(index, player) {
                    continue;
                }
                let corners = &self.boxes[index].corners;
                if threshold > 0 {
                    let (left, top, right, bottom) = corners.bounds();
                    if x < left - threshold
                        || x > right + threshold
                        || y < top - threshold
                        || y > bottom + threshold
                    {
                        continue;
                    }
                }
                if corners.contains(x, y) {
                    return BoxFit {
                        x,
                        y,
                        walk_box: Some(index),
                    };
                }
                let ((cx, cy), dist) = corners.closest_point(x, y);
                if dist < best_dist {
                    fit.x = cx;
                    fit.y = cy;
                    if dist == 0 {
                        fit.walk_box = Some(index);
                        return fit;
                    }
                    best_dist = dist;
                    best_box = Some(index);
                }
            }
            if threshold == 0 || threshold * threshold >= best_dist {
                fit.walk_box = best_box;
                return fit;
            }
        }
        fit
    }

    /// Box number whose outline contains the point, searching from the top.
    pub fn find_box_at(&self, x: i32, y: i32) -> Option<usize> {
        (self.first_valid..self.boxes.len())
            .rev()
            .find(|&i| self.boxes[i].flags & BOX_INVISIBLE == 0 && self.boxes[i].corners.contains(x, y))
    }

    fn neighbours(&self, a: usize, b: usize) -> bool {
        let (ca, cb) = (&self.boxes[a].corners, &self.boxes[b].corners);
        if ca.corners().iter().any(|&(x, y)| cb.contains(x, y))
            || cb.corners().iter().any(|&(x, y)| ca.contains(x, y))
        {
            return true;
        }
        let (al, at, ar, ab) = ca.bounds();
        let (bl, bt, br, bb) = cb.bounds();
        let touch_x = (ar == bl || br == al) && at <= bb && bt <= ab;
        let touch_y = (ab == bt || bb == at) && al <= br && bl <= ar;
        touch_x || touch_y
    }

    /// Rebuilds the next-hop matrix from box adjacency. Locked boxes are
    /// impassable.
    pub fn create_box_matrix(&mut self) {
        let n = self.boxes.len();
        const FAR: u32 = u32::MAX / 4;
        let mut dist = vec![vec![FAR; n]; n];
        let mut next: Vec<Vec<Option<u8>>> = vec![vec![None; n]; n];
        for i in 0..n {
            dist[i][i] = 0;
            next[i][i] = Some(i as u8);
        }
        for i in self.first_valid..n {
            if self.boxes[i].flags & BOX_LOCKED != 0 {
                continue;
            }
            for j in self.first_valid..n {
                if i != j && self.boxes[j].flags & BOX_LOCKED == 0 && self.neighbours(i, j) {
                    dist[i][j] = 1;
                    next[i][j] = Some(j as u8);
                }
            }
        }
        for k in 0..n {
            for i in 0..n {
                for j in 0..n {
                    let through = dist[i][k] + dist[k][j];
                    if through < dist[i][j] {
                        dist[i][j] = through;
                        next[i][j] = next[i][k];
                    }
                }
            }
        }
        self.next_hop = next;
    }

    /// First box to enter on the way from `from` to `to`.
    pub fn next_box(&self, from: usize, to: usize) -> Option<usize> {
        self.next_hop
            .get(from)
            .and_then(|row| row.get(to))
            .copied()
            .flatten()
            .map(usize::from)
    }

    pub fn scale_slots(&self) -> &[ScaleSlot] {
        &self.scale_slots
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rect_box(left: i16, top: i16, right: i16, bottom: i16) -> WalkBox {
        WalkBox {
            ul: BoxPoint { x: left, y: top },
            ur: BoxPoint { x: right, y: top },
            lr: BoxPoint { x: right, y: bottom },
            ll: BoxPoint { x: left, y: bottom },
            mask: 0,
            flags: 0,
            scale: 255,
        }
    }

    fn three_boxes() -> BoxTable {
        let mut table = BoxTable::new(false);
        table.load(&[
            rect_box(0, 0, 0, 0),
            rect_box(0, 100, 100, 150),
            rect_box(100, 100, 200, 150),
            rect_box(200, 100, 300, 150),
        ]);
        table
    }

    #[test]
    fn containment_includes_the_outline() {
        let table = three_boxes();
        assert!(table.check_xy_in_box_bounds(1, 50, 120));
        assert!(table.check_xy_in_box_bounds(1, 100, 150));
        assert!(!table.check_xy_in_box_bounds(1, 101, 120));
        assert!(!table.check_xy_in_box_bounds(9, 50, 120));
        assert_eq!(table.find_box_at(250, 110), Some(3));
    }

    #[test]
    fn points_snap_to_the_nearest_box() {
        let table = three_boxes();
        let fit = table.adjust_xy_to_be_in_box(150, 90, false);
        assert_eq!((fit.x, fit.y, fit.walk_box), (150, 100, Some(2)));
        let far = table.adjust_xy_to_be_in_box(500, 120, false);
        assert_eq!((far.x, far.y, far.walk_box), (300, 120, Some(3)));
    }

    #[test]
    fn matrix_routes_through_neighbours_and_respects_locks() {
        let mut table = three_boxes();
        assert_eq!(table.next_box(1, 3), Some(2));
        assert_eq!(table.next_box(3, 1), Some(2));
        table.set_flags(2, BOX_LOCKED).unwrap();
        table.create_box_matrix();
        assert_eq!(table.next_box(1, 3), None);
    }

    #[test]
    fn scale_slots_interpolate_between_rows() {
        let mut table = three_boxes();
        table.set_scale_slot(1, 100, 50, 150, 150).unwrap();
        table.set_scale(2, 0x8001).unwrap();
        assert_eq!(table.scale_at(2, 125), 100);
        assert_eq!(table.scale_at(1, 125), 255);
        assert!(table.set_scale_slot(0, 0, 0, 0, 0).is_err());
    }
}
