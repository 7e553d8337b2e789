//! Wiz image and polygon entry points backed by the image resources and
//! the main screen.

use log::debug;
use scumm_formats::wiz::COMPRESSION_RLE;
use scumm_formats::{
    capture_wiz_image, draw_wiz_image, draw_wiz_polygon, wiz_histogram, DrawParams, Point, Rect,
    WizFlags, WizImage,
};

use crate::error::{FatalError, VmResult};
use crate::resources::ResourceKind;

use super::Vm;

impl Vm {
    fn wiz_image(&mut self, id: u16) -> VmResult<WizImage> {
        let block = self.resources.require(ResourceKind::Image, id)?;
        WizImage::parse(&block).map_err(|e| FatalError::ResourceTruncated {
            kind: ResourceKind::Image,
            id,
            detail: e.to_string(),
        })
    }

    /// Draws image `id` at `(x, y)`. With `POLYGON` set, `x` names the
    /// polygon the image is warped onto. Returns the touched rectangle.
    pub fn draw_wiz_image(&mut self, id: u16, x: i32, y: i32, flags: WizFlags) -> VmResult<Option<Rect>> {
        let image = self.wiz_image(id)?;
        if flags.contains(WizFlags::HAS_PALETTE) {
            if let Some(rgb) = &image.palette {
                self.palette.set_palette_from_ptr(rgb)?;
            }
        }
        if flags.contains(WizFlags::POLYGON) {
            return self.draw_wiz_polygon(id, x, flags);
        }
        if flags.contains(WizFlags::TO_MEM_BUFFER) {
            debug!("image {id} drawn to a memory buffer, screen untouched");
            return Ok(None);
        }
        let (x, y) = match image.spot {
            Some((sx, sy)) => (x - sx, y - sy),
            None => (x, y),
        };
        let params = DrawParams {
            x,
            y,
            flags,
            clip: None,
            transparent: None,
        };
        let touched = draw_wiz_image(self.screen.canvas_mut(), &image, &params)?;
        if let Some(rect) = touched {
            self.screen.mark_dirty(rect);
        }
        Ok(touched)
    }

    /// Warps image `id` onto polygon `polygon`.
    pub fn draw_wiz_polygon(&mut self, id: u16, polygon: i32, flags: WizFlags) -> VmResult<Option<Rect>> {
        let image = self.wiz_image(id)?;
        let Some(target) = self.polygons.get(polygon).cloned() else {
            return Err(FatalError::Polygon(format!("polygon {polygon} is not set")));
        };
        let background = image.transparent.unwrap_or(0);
        let source = image.decode(background)?;
        let transparent = if image.compression == COMPRESSION_RLE {
            Some(background)
        } else {
            image.transparent
        };
        if flags.contains(WizFlags::TO_MEM_BUFFER) {
            return Ok(None);
        }
        let touched = draw_wiz_polygon(self.screen.canvas_mut(), &source, &target, None, transparent)?;
        if let Some(rect) = touched {
            self.screen.mark_dirty(rect);
        }
        Ok(touched)
    }

    pub fn set_wiz_polygon(&mut self, id: i32, flag: bool, corners: [(i32, i32); 4]) -> VmResult<()> {
        let corners = corners.map(|(x, y)| Point::new(x, y));
        self.polygons
            .set(id, flag, corners)
            .map_err(|e| FatalError::Polygon(e.to_string()))
    }

    pub fn erase_wiz_polygons(&mut self, min: i32, max: i32) {
        self.polygons.erase_range(min, max);
    }

    /// Polygon containing the point, 0 when none does.
    pub fn find_wiz_polygon_at(&self, x: i32, y: i32, only_flagged: bool) -> i32 {
        self.polygons.find_at(x, y, only_flagged).unwrap_or(0)
    }

    /// Colour counts of image `id` inside `rect` (image coordinates).
    pub fn wiz_histogram(&mut self, id: u16, rect: Rect) -> VmResult<[u32; 256]> {
        let image = self.wiz_image(id)?;
        let Some(rect) = rect.intersect(&image.bounds()) else {
            return Ok([0; 256]);
        };
        Ok(wiz_histogram(&image, rect)?)
    }

    /// Packs a screen rectangle into image resource `id`. Returns whether
    /// anything was captured.
    pub fn capture_wiz_image(
        &mut self,
        id: u16,
        rect: Rect,
        compression: u32,
        with_palette: bool,
    ) -> VmResult<bool> {
        let palette = with_palette.then(|| self.palette.current().to_vec());
        let Some(block) = capture_wiz_image(self.screen.canvas(), rect, compression, 0, palette.as_deref())?
        else {
            return Ok(false);
        };
        debug!("captured {} bytes into image {id}", block.len());
        self.resources.create(ResourceKind::Image, id, block);
        Ok(true)
    }
}
