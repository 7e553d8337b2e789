use std::ops::BitOr;

use anyhow::{Context, Result, anyhow, bail, ensure};
use byteorder::{ByteOrder, LittleEndian};
use serde::{Deserialize, Serialize};

use crate::chunk;

pub const COMPRESSION_RAW: u32 = 0;
pub const COMPRESSION_RLE: u32 = 1;
pub const COMPRESSION_RAW16: u32 = 2;

/// Longest literal or fill run a type 1 code byte can express.
pub const RLE_MAX_RUN: usize = 0x40;
/// Longest skip run a type 1 code byte can express.
pub const RLE_MAX_SKIP: usize = 0x7F;
/// Largest pixel count an image header may declare.
pub const MAX_WIZ_PIXELS: usize = 1 << 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WizFlags(pub u32);

impl WizFlags {
    pub const NONE: WizFlags = WizFlags(0);
    pub const HAS_PALETTE: WizFlags = WizFlags(0x1);
    pub const REMAP: WizFlags = WizFlags(0x2);
    pub const PRINT: WizFlags = WizFlags(0x4);
    pub const BLIT_TO_FRONT: WizFlags = WizFlags(0x8);
    pub const MARK_DIRTY: WizFlags = WizFlags(0x10);
    pub const TO_MEM_BUFFER: WizFlags = WizFlags(0x20);
    pub const POLYGON: WizFlags = WizFlags(0x40);
    pub const FLIP_X: WizFlags = WizFlags(0x400);
    pub const FLIP_Y: WizFlags = WizFlags(0x800);

    pub fn contains(self, other: WizFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for WizFlags {
    type Output = WizFlags;

    fn bitor(self, rhs: WizFlags) -> WizFlags {
        WizFlags(self.0 | rhs.0)
    }
}

/// Half-open rectangle: `right` and `bottom` are exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl Rect {
    pub const fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Rect {
            left,
            top,
            right,
            bottom,
        }
    }

    pub const fn from_size(width: i32, height: i32) -> Self {
        Rect::new(0, 0, width, height)
    }

    pub fn width(&self) -> i32 {
        self.right - self.left
    }

    pub fn height(&self) -> i32 {
        self.bottom - self.top
    }

    pub fn is_empty(&self) -> bool {
        self.width() <= 0 || self.height() <= 0
    }

    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.left && x < self.right && y >= self.top && y < self.bottom
    }

    pub fn intersect(&self, other: &Rect) -> Option<Rect> {
        let r = Rect::new(
            self.left.max(other.left),
            self.top.max(other.top),
            self.right.min(other.right),
            self.bottom.min(other.bottom),
        );
        (!r.is_empty()).then_some(r)
    }

    pub fn union(&self, other: &Rect) -> Rect {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        Rect::new(
            self.left.min(other.left),
            self.top.min(other.top),
            self.right.max(other.right),
            self.bottom.max(other.bottom),
        )
    }

    pub fn translate(&self, dx: i32, dy: i32) -> Rect {
        Rect::new(self.left + dx, self.top + dy, self.right + dx, self.bottom + dy)
    }
}

/// 8-bit indexed pixel surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Canvas {
    pub width: usize,
    pub height: usize,
    pub pixels: Vec<u8>,
}

impl Canvas {
    pub fn new(width: usize, height: usize, fill: u8) -> Self {
        Canvas {
            width,
            height,
            pixels: vec![fill; width * height],
        }
    }

    pub fn from_pixels(width: usize, height: usize, pixels: Vec<u8>) -> Result<Self> {
        ensure!(
            pixels.len() == width * height,
            "canvas {width}x{height} needs {} pixels, got {}",
            width * height,
            pixels.len()
        );
        Ok(Canvas {
            width,
            height,
            pixels,
        })
    }

    pub fn bounds(&self) -> Rect {
        Rect::from_size(self.width as i32, self.height as i32)
    }

    pub fn get(&self, x: i32, y: i32) -> Option<u8> {
        self.bounds()
            .contains(x, y)
            .then(|| self.pixels[y as usize * self.width + x as usize])
    }

    pub fn set(&mut self, x: i32, y: i32, color: u8) {
        if self.bounds().contains(x, y) {
            self.pixels[y as usize * self.width + x as usize] = color;
        }
    }

    pub fn fill_rect(&mut self, rect: Rect, color: u8) -> Option<Rect> {
        let rect = rect.intersect(&self.bounds())?;
        for y in rect.top..rect.bottom {
            let row = y as usize * self.width;
            self.pixels[row + rect.left as usize..row + rect.right as usize].fill(color);
        }
        Some(rect)
    }

    pub fn row(&self, y: usize) -> &[u8] {
        &self.pixels[y * self.width..(y + 1) * self.width]
    }
}

/// A decoded `AWIZ` container. Pixel data stays compressed until drawn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WizImage {
    pub compression: u32,
    pub width: i32,
    pub height: i32,
    pub palette: Option<Vec<u8>>,
    pub spot: Option<(i32, i32)>,
    pub remap: Option<Vec<u8>>,
    pub transparent: Option<u8>,
    pub data: Vec<u8>,
}

impl WizImage {
    pub fn raw(width: i32, height: i32, pixels: Vec<u8>) -> Self {
        WizImage {
            compression: COMPRESSION_RAW,
            width,
            height,
            palette: None,
            spot: None,
            remap: None,
            transparent: None,
            data: pixels,
        }
    }

    pub fn rle(width: i32, height: i32, data: Vec<u8>) -> Self {
        WizImage {
            compression: COMPRESSION_RLE,
            ..WizImage::raw(width, height, data)
        }
    }

    pub fn bounds(&self) -> Rect {
        Rect::from_size(self.width, self.height)
    }

    /// Parses an `AWIZ` block, header included.
    pub fn parse(block: &[u8]) -> Result<Self> {
        let awiz = chunk::parse_chunk(block, 0)?;
        ensure!(awiz.tag == chunk::AWIZ, "expected AWIZ block, found {}", awiz.tag);

        let mut header = None;
        let mut image = WizImage::raw(0, 0, Vec::new());
        let mut saw_data = false;
        for child in awiz.children() {
            let child = child?;
            let payload = child.payload();
            match child.tag {
                chunk::WIZH => {
                    ensure!(payload.len() >= 12, "WIZH block too short");
                    header = Some((
                        LittleEndian::read_u32(&payload[0..4]),
                        LittleEndian::read_u32(&payload[4..8]) as i32,
                        LittleEndian::read_u32(&payload[8..12]) as i32,
                    ));
                }
                chunk::RGBS => {
                    ensure!(payload.len() >= 768, "RGBS block too short");
                    image.palette = Some(payload[..768].to_vec());
                }
                chunk::SPOT => {
                    ensure!(payload.len() >= 8, "SPOT block too short");
                    image.spot = Some((
                        LittleEndian::read_i32(&payload[0..4]),
                        LittleEndian::read_i32(&payload[4..8]),
                    ));
                }
                chunk::RMAP => {
                    ensure!(payload.len() >= 260, "RMAP block too short");
                    image.remap = Some(payload[4..260].to_vec());
                }
                chunk::TRNS => {
                    ensure!(payload.len() >= 4, "TRNS block too short");
                    image.transparent = Some(LittleEndian::read_u32(&payload[0..4]) as u8);
                }
                chunk::WIZD => {
                    image.data = payload.to_vec();
                    saw_data = true;
                }
                _ => {}
            }
        }

        let Some((compression, width, height)) = header else {
            bail!("AWIZ without WIZH");
        };
        ensure!(saw_data, "AWIZ without WIZD");
        ensure!(
            width >= 0 && height >= 0,
            "negative image size {width}x{height}"
        );
        image.compression = compression;
        image.width = width;
        image.height = height;
        image.pixel_count()?;
        Ok(image)
    }

    /// `width * height`, refused past `MAX_WIZ_PIXELS`.
    pub fn pixel_count(&self) -> Result<usize> {
        let w = usize::try_from(self.width)?;
        let h = usize::try_from(self.height)?;
        w.checked_mul(h)
            .filter(|&n| n <= MAX_WIZ_PIXELS)
            .ok_or_else(|| anyhow!("image size {w}x{h} is too large"))
    }

    /// Visits every pixel of `src` (image coordinates) that the codec stores.
    /// Skip runs in type 1 data produce no callback.
    pub fn for_each_pixel<F>(&self, src: Rect, mut visit: F) -> Result<()>
    where
        F: FnMut(i32, i32, u8),
    {
        let Some(src) = src.intersect(&self.bounds()) else {
            return Ok(());
        };
        let w = self.width as usize;
        let pixels = self.pixel_count()?;
        match self.compression {
            COMPRESSION_RAW => {
                ensure!(self.data.len() >= pixels, "raw image data truncated");
                for y in src.top..src.bottom {
                    let row = y as usize * w;
                    for x in src.left..src.right {
                        visit(x, y, self.data[row + x as usize]);
                    }
                }
            }
            COMPRESSION_RLE => walk_rle(&self.data, src, &mut visit)?,
            COMPRESSION_RAW16 => {
                ensure!(
                    self.data.len() / 2 >= pixels,
                    "16-bit image data truncated"
                );
                for y in src.top..src.bottom {
                    let row = y as usize * w;
                    for x in src.left..src.right {
                        // Only the low byte is used as a palette index.
                        visit(x, y, self.data[(row + x as usize) * 2]);
                    }
                }
            }
            other => bail!("unknown wiz compression {other}"),
        }
        Ok(())
    }

    /// Decodes the whole image onto a canvas filled with `background`.
    pub fn decode(&self, background: u8) -> Result<Canvas> {
        self.pixel_count()?;
        let mut canvas = Canvas::new(self.width as usize, self.height as usize, background);
        self.for_each_pixel(self.bounds(), |x, y, c| canvas.set(x, y, c))?;
        Ok(canvas)
    }
}

fn walk_rle<F>(data: &[u8], src: Rect, visit: &mut F) -> Result<()>
where
    F: FnMut(i32, i32, u8),
{
    let mut pos = 0usize;
    for y in 0..src.bottom {
        let header = data
            .get(pos..pos + 2)
            .ok_or_else(|| anyhow!("rle row {y} header truncated"))?;
        let len = LittleEndian::read_u16(header) as usize;
        pos += 2;
        let row = data
            .get(pos..pos + len)
            .ok_or_else(|| anyhow!("rle row {y} claims {len} bytes past end of data"))?;
        pos += len;
        if y < src.top || len == 0 {
            continue;
        }
        decode_rle_row(row, src.left, src.right, |x, c| visit(x, y, c))
            .with_context(|| format!("decoding rle row {y}"))?;
    }
    Ok(())
}

/// Decodes one type 1 row, reporting only pixels in `[left, right)`. Runs
/// straddling either edge are partially consumed; the cursor always advances
/// by the full run so the row stays in sync.
pub fn decode_rle_row<F>(row: &[u8], left: i32, right: i32, mut visit: F) -> Result<()>
where
    F: FnMut(i32, u8),
{
    let mut x = 0i32;
    let mut i = 0usize;
    while i < row.len() && x < right {
        let code = row[i];
        i += 1;
        if code & 1 != 0 {
            x += (code >> 1) as i32;
            continue;
        }
        let n = ((code >> 2) + 1) as i32;
        let from = x.max(left);
        let to = (x + n).min(right);
        if code & 2 != 0 {
            let color = *row
                .get(i)
                .ok_or_else(|| anyhow!("fill run missing its colour"))?;
            i += 1;
            for px in from..to {
                visit(px, color);
            }
        } else {
            let n_bytes = n as usize;
            ensure!(i + n_bytes <= row.len(), "literal run of {n} overruns row");
            for px in from..to {
                visit(px, row[i + (px - x) as usize]);
            }
            i += n_bytes;
        }
        x += n;
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DrawParams {
    pub x: i32,
    pub y: i32,
    pub flags: WizFlags,
    pub clip: Option<Rect>,
    /// Overrides the image's `TRNS` colour for raw codecs.
    pub transparent: Option<u8>,
}

/// Blits `image` onto `dst`. Returns the written rectangle, or `None` when
/// the placement misses the destination entirely.
pub fn draw_wiz_image(dst: &mut Canvas, image: &WizImage, params: &DrawParams) -> Result<Option<Rect>> {
    let bound = match params.clip {
        Some(clip) => match clip.intersect(&dst.bounds()) {
            Some(bound) => bound,
            None => return Ok(None),
        },
        None => dst.bounds(),
    };
    let placed = Rect::new(
        params.x,
        params.y,
        params.x + image.width,
        params.y + image.height,
    );
    let Some(target) = placed.intersect(&bound) else {
        return Ok(None);
    };

    let flip_x = params.flags.contains(WizFlags::FLIP_X);
    let flip_y = params.flags.contains(WizFlags::FLIP_Y);
    let src_left = if flip_x {
        image.width - (target.right - params.x)
    } else {
        target.left - params.x
    };
    let src_top = if flip_y {
        image.height - (target.bottom - params.y)
    } else {
        target.top - params.y
    };
    let src = Rect::new(
        src_left,
        src_top,
        src_left + target.width(),
        src_top + target.height(),
    );

    let transparent = match image.compression {
        COMPRESSION_RLE => None,
        _ => params.transparent.or(image.transparent),
    };
    let remap = if params.flags.contains(WizFlags::REMAP) {
        image.remap.as_deref()
    } else {
        None
    };

    let width = dst.width;
    let pixels = &mut dst.pixels;
    image.for_each_pixel(src, |sx, sy, color| {
        if transparent == Some(color) {
            return;
        }
        let color = remap.map_or(color, |table| table[color as usize]);
        let dx = if flip_x {
            params.x + image.width - 1 - sx
        } else {
            params.x + sx
        };
        let dy = if flip_y {
            params.y + image.height - 1 - sy
        } else {
            params.y + sy
        };
        debug_assert!(target.contains(dx, dy));
        pixels[dy as usize * width + dx as usize] = color;
    })?;
    Ok(Some(target))
}

/// Per-colour pixel counts inside `rect`. Skip runs are not counted.
pub fn wiz_histogram(image: &WizImage, rect: Rect) -> Result<[u32; 256]> {
    let mut counts = [0u32; 256];
    image.for_each_pixel(rect, |_, _, c| counts[c as usize] += 1)?;
    Ok(counts)
}
