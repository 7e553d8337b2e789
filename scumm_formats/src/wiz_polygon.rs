use anyhow::{Result, bail, ensure};
use serde::{Deserialize, Serialize};

use crate::wiz::{Canvas, Rect};

pub const MAX_POLYGONS: usize = 200;
/// Quads are stored closed: the fifth vertex repeats the first.
pub const POLYGON_VERTS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Point { x, y }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WizPolygon {
    pub id: i32,
    pub flag: bool,
    pub verts: Vec<Point>,
    /// Inclusive bounding box stored as a half-open rectangle.
    pub bound: Rect,
}

impl WizPolygon {
    pub fn quad(id: i32, flag: bool, corners: [Point; 4]) -> Self {
        let mut verts = corners.to_vec();
        verts.push(corners[0]);
        let bound = bounding_rect(&verts);
        WizPolygon {
            id,
            flag,
            verts,
            bound,
        }
    }

    /// Even-odd crossing test over the closed outline.
    pub fn contains(&self, x: i32, y: i32) -> bool {
        let n = self.verts.len();
        if n == 0 {
            return false;
        }
        let mut pi = n - 1;
        let mut dir_y = y < self.verts[pi].y;
        let mut inside = false;
        for i in 0..n {
            let cur_dir = y < self.verts[i].y;
            if cur_dir != dir_y {
                let (p, c) = (self.verts[pi], self.verts[i]);
                let lhs = (p.y - y) as i64 * (c.x - p.x) as i64;
                let rhs = (p.x - x) as i64 * (c.y - p.y) as i64;
                if (lhs >= rhs) == dir_y {
                    inside = !inside;
                }
            }
            pi = i;
            dir_y = cur_dir;
        }
        inside
    }
}

fn bounding_rect(verts: &[Point]) -> Rect {
    let min_x = verts.iter().map(|p| p.x).min().unwrap_or(0);
    let max_x = verts.iter().map(|p| p.x).max().unwrap_or(0);
    let min_y = verts.iter().map(|p| p.y).min().unwrap_or(0);
    let max_y = verts.iter().map(|p| p.y).max().unwrap_or(0);
    Rect::new(min_x, min_y, max_x.saturating_add(1), max_y.saturating_add(1))
}

/// Fixed-capacity table of warp targets keyed by id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolygonStore {
    polygons: Vec<WizPolygon>,
}

impl PolygonStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.polygons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.polygons.is_empty()
    }

    /// Replaces any polygon with the same id.
    pub fn set(&mut self, id: i32, flag: bool, corners: [Point; 4]) -> Result<()> {
        let polygon = WizPolygon::quad(id, flag, corners);
        if let Some(slot) = self.polygons.iter_mut().find(|p| p.id == id) {
            *slot = polygon;
            return Ok(());
        }
        ensure!(
            self.polygons.len() < MAX_POLYGONS,
            "polygon table full ({MAX_POLYGONS} entries)"
        );
        self.polygons.push(polygon);
        Ok(())
    }

    pub fn get(&self, id: i32) -> Option<&WizPolygon> {
        self.polygons.iter().find(|p| p.id == id)
    }

    /// Removes every polygon whose id lies in `[min, max]`.
    pub fn erase_range(&mut self, min: i32, max: i32) {
        self.polygons.retain(|p| p.id < min || p.id > max);
    }

    /// Id of the first polygon containing the point. With `only_flagged`,
    /// polygons whose flag is clear are ignored.
    pub fn find_at(&self, x: i32, y: i32, only_flagged: bool) -> Option<i32> {
        self.polygons
            .iter()
            .filter(|p| !only_flagged || p.flag)
            .find(|p| p.bound.contains(x, y) && p.contains(x, y))
            .map(|p| p.id)
    }

    pub fn hit(&self, id: i32, x: i32, y: i32) -> bool {
        self.get(id)
            .is_some_and(|p| p.bound.contains(x, y) && p.contains(x, y))
    }
}

#[derive(Debug, Clone, Copy)]
struct Edge {
    x_min: i32,
    src_min: Point,
    x_max: i32,
    src_max: Point,
}

/// Steps one target edge in 16.16 fixed point, recording per scanline the
/// extreme x values together with the matching source coordinates. Only
/// scanlines covered by `rows` are visited.
fn trace_edge(rows: &mut [Edge], top: i32, t1: Point, t2: Point, s1: Point, s2: Point) {
    let (top, t1y, t2y) = (i64::from(top), i64::from(t1.y), i64::from(t2.y));
    let dy = (t2y - t1y).abs() + 1;
    let fixed = |v: i32| i64::from(v) << 16;
    let tx_step = (fixed(t2.x) - fixed(t1.x)) / dy;
    let sx_step = (fixed(s2.x) - fixed(s1.x)) / dy;
    let sy_step = (fixed(s2.y) - fixed(s1.y)) / dy;
    let last = top + rows.len() as i64 - 1;
    let (first_k, last_k) = if t2y <= t1y {
        (t1y - last, t1y - top)
    } else {
        (top - t1y, last - t1y)
    };
    for k in first_k.max(0)..=last_k.min(dy - 1) {
        let row = if t2y <= t1y { t1y - k } else { t1y + k };
        let Some(edge) = usize::try_from(row - top).ok().and_then(|r| rows.get_mut(r)) else {
            continue;
        };
        let x = ((fixed(t1.x) + k * tx_step) >> 16) as i32;
        let src = Point::new(
            ((fixed(s1.x) + k * sx_step) >> 16) as i32,
            ((fixed(s1.y) + k * sy_step) >> 16) as i32,
        );
        if x < edge.x_min {
            edge.x_min = x;
            edge.src_min = src;
        }
        if x > edge.x_max {
            edge.x_max = x;
            edge.src_max = src;
        }
    }
}

/// Texture-maps `src` onto the quad `polygon` inside `dst`. Returns the
/// touched rectangle, or `None` when the quad misses the destination.
pub fn draw_wiz_polygon(
    dst: &mut Canvas,
    src: &Canvas,
    polygon: &WizPolygon,
    clip: Option<Rect>,
    transparent: Option<u8>,
) -> Result<Option<Rect>> {
    if polygon.verts.len() != POLYGON_VERTS {
        bail!(
            "polygon {} has {} vertices, expected {POLYGON_VERTS}",
            polygon.id,
            polygon.verts.len()
        );
    }
    ensure!(src.width > 0 && src.height > 0, "empty polygon source image");

    let bounds = match clip {
        Some(clip) => match clip.intersect(&dst.bounds()) {
            Some(b) => b,
            None => return Ok(None),
        },
        None => dst.bounds(),
    };
    let bound = polygon.bound;
    let Some(touched) = bound.intersect(&bounds) else {
        return Ok(None);
    };

    let w = src.width as i32;
    let h = src.height as i32;
    let corners = [
        Point::new(0, 0),
        Point::new(w - 1, 0),
        Point::new(w - 1, h - 1),
        Point::new(0, h - 1),
        Point::new(0, 0),
    ];

    let mut rows = vec![
        Edge {
            x_min: i32::MAX,
            src_min: Point::default(),
            x_max: i32::MIN,
            src_max: Point::default(),
        };
        touched.height() as usize
    ];
    for i in 0..POLYGON_VERTS - 1 {
        trace_edge(
            &mut rows,
            touched.top,
            polygon.verts[i],
            polygon.verts[i + 1],
            corners[i],
            corners[i + 1],
        );
    }

    for (offset, edge) in rows.iter().enumerate() {
        if edge.x_min > edge.x_max {
            continue;
        }
        let y = touched.top + offset as i32;
        let dx = i64::from(edge.x_max) - i64::from(edge.x_min) + 1;
        let x_step = (i64::from(edge.src_max.x - edge.src_min.x) << 16) / dx;
        let y_step = (i64::from(edge.src_max.y - edge.src_min.y) << 16) / dx;
        let first = edge.x_min.max(bounds.left);
        let skipped = i64::from(first) - i64::from(edge.x_min);
        let mut sx = (i64::from(edge.src_min.x) << 16) + skipped * x_step;
        let mut sy = (i64::from(edge.src_min.y) << 16) + skipped * y_step;
        for x in first..edge.x_max.min(bounds.right - 1) + 1 {
            let px = (sx >> 16).clamp(0, i64::from(w - 1)) as usize;
            let py = (sy >> 16).clamp(0, i64::from(h - 1)) as usize;
            let color = src.pixels[py * src.width + px];
            if transparent != Some(color) {
                dst.set(x, y, color);
            }
            sx += x_step;
            sy += y_step;
        }
    }
    Ok(Some(touched))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(x: i32, y: i32, size: i32) -> [Point; 4] {
        [
            Point::new(x, y),
            Point::new(x + size - 1, y),
            Point::new(x + size - 1, y + size - 1),
            Point::new(x, y + size - 1),
        ]
    }

    #[test]
    fn store_replaces_erases_and_hit_tests() {
        let mut store = PolygonStore::new();
        store.set(1, true, square(0, 0, 10)).unwrap();
        store.set(2, false, square(20, 20, 10)).unwrap();
        store.set(1, true, square(5, 5, 10)).unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.get(1).unwrap().verts[4], Point::new(5, 5));

        assert_eq!(store.find_at(7, 7, false), Some(1));
        assert_eq!(store.find_at(22, 22, false), Some(2));
        assert_eq!(store.find_at(22, 22, true), None);
        assert_eq!(store.find_at(1, 1, false), None);
        assert!(store.hit(2, 25, 25));
        assert!(!store.hit(2, 5, 5));

        store.erase_range(2, 5);
        assert_eq!(store.len(), 1);
        assert!(store.get(2).is_none());
    }

    #[test]
    fn store_is_bounded() {
        let mut store = PolygonStore::new();
        for id in 0..MAX_POLYGONS as i32 {
            store.set(id, false, square(0, 0, 2)).unwrap();
        }
        assert!(store.set(999, false, square(0, 0, 2)).is_err());
    }

    #[test]
    fn solid_source_fills_quad_within_bounds() {
        let src = Canvas::new(4, 4, 6);
        let polygon = WizPolygon::quad(1, false, square(2, 3, 8));
        let mut dst = Canvas::new(16, 16, 0);
        let touched = draw_wiz_polygon(&mut dst, &src, &polygon, None, None)
            .unwrap()
            .unwrap();
        assert_eq!(touched, Rect::new(2, 3, 10, 11));
        for y in 0..16 {
            for x in 0..16 {
                let expected = if touched.contains(x, y) { 6 } else { 0 };
                assert_eq!(dst.get(x, y), Some(expected), "pixel {x},{y}");
            }
        }
    }

    #[test]
    fn warp_samples_source_corners() {
        let src = Canvas::from_pixels(2, 2, vec![1, 2, 3, 4]).unwrap();
        let polygon = WizPolygon::quad(1, false, square(0, 0, 2));
        let mut dst = Canvas::new(2, 2, 0);
        draw_wiz_polygon(&mut dst, &src, &polygon, None, None).unwrap();
        assert_eq!(dst.get(0, 0), Some(1));
        assert_eq!(dst.get(0, 1), Some(3));
    }

    #[test]
    fn off_screen_quad_is_noop_and_bad_outline_fails() {
        let src = Canvas::new(2, 2, 6);
        let mut dst = Canvas::new(8, 8, 0);
        let far = WizPolygon::quad(1, false, square(40, 40, 4));
        assert_eq!(draw_wiz_polygon(&mut dst, &src, &far, None, None).unwrap(), None);
        assert!(dst.pixels.iter().all(|&p| p == 0));

        let mut open = WizPolygon::quad(2, false, square(0, 0, 4));
        open.verts.pop();
        assert!(draw_wiz_polygon(&mut dst, &src, &open, None, None).is_err());
    }

    #[test]
    fn quads_with_wide_coordinates_clip_to_the_canvas() {
        let src = Canvas::new(2, 2, 6);
        let mut dst = Canvas::new(8, 8, 0);
        let far = WizPolygon::quad(1, false, square(40_000, 40_000, 100));
        assert_eq!(draw_wiz_polygon(&mut dst, &src, &far, None, None).unwrap(), None);

        let huge = WizPolygon::quad(2, false, square(-40_000, -40_000, 80_001));
        let touched = draw_wiz_polygon(&mut dst, &src, &huge, None, None)
            .unwrap()
            .unwrap();
        assert_eq!(touched, Rect::new(0, 0, 8, 8));
        assert!(dst.pixels.iter().all(|&p| p == 6));

        let extreme = WizPolygon::quad(3, false, square(i32::MAX - 1, 0, 2));
        assert_eq!(draw_wiz_polygon(&mut dst, &src, &extreme, None, None).unwrap(), None);
    }
}
