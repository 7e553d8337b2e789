use anyhow::{Result, ensure};

use crate::chunk::{self, build_chunk};
use crate::wiz::{COMPRESSION_RAW, COMPRESSION_RLE, Canvas, RLE_MAX_RUN, RLE_MAX_SKIP, Rect};

/// Copies `rect` out of `src` row by row. `None` when the rectangle misses
/// the canvas.
pub fn pack_type0(src: &Canvas, rect: Rect) -> Option<(Rect, Vec<u8>)> {
    let rect = rect.intersect(&src.bounds())?;
    let mut out = Vec::with_capacity((rect.width() * rect.height()) as usize);
    for y in rect.top..rect.bottom {
        let row = src.row(y as usize);
        out.extend_from_slice(&row[rect.left as usize..rect.right as usize]);
    }
    Some((rect, out))
}

/// Encodes `rect` of `src` as type 1 data, treating `transparent` pixels as
/// skip runs. Fails when a packed row outgrows its 16-bit length prefix.
pub fn pack_type1(src: &Canvas, rect: Rect, transparent: u8) -> Result<Option<(Rect, Vec<u8>)>> {
    let Some(rect) = rect.intersect(&src.bounds()) else {
        return Ok(None);
    };
    let mut out = Vec::new();
    for y in rect.top..rect.bottom {
        let row = &src.row(y as usize)[rect.left as usize..rect.right as usize];
        let codes = pack_row(row, transparent);
        let len = u16::try_from(codes.len())
            .map_err(|_| anyhow::anyhow!("row {y} packs to {} bytes", codes.len()))?;
        out.extend_from_slice(&len.to_le_bytes());
        out.extend(codes);
    }
    Ok(Some((rect, out)))
}

fn same_run(row: &[u8], at: usize, limit: usize) -> usize {
    let color = row[at];
    row[at..]
        .iter()
        .take(limit)
        .take_while(|&&c| c == color)
        .count()
}

fn pack_row(row: &[u8], transparent: u8) -> Vec<u8> {
    let mut out = Vec::new();
    let mut trailing_skip = None;
    let mut i = 0;
    while i < row.len() {
        if row[i] == transparent {
            let len = same_run(row, i, RLE_MAX_SKIP);
            trailing_skip = Some(out.len());
            out.push(((len as u8) << 1) | 1);
            i += len;
            continue;
        }
        trailing_skip = None;

        let run = same_run(row, i, RLE_MAX_RUN);
        if run >= 3 {
            out.push((((run - 1) as u8) << 2) | 2);
            out.push(row[i]);
            i += run;
            continue;
        }

        let start = i;
        loop {
            i += 1;
            if i >= row.len()
                || i - start >= RLE_MAX_RUN
                || row[i] == transparent
                || same_run(row, i, 3) >= 3
            {
                break;
            }
        }
        out.push(((i - start - 1) as u8) << 2);
        out.extend_from_slice(&row[start..i]);
    }
    if let Some(at) = trailing_skip {
        out.truncate(at);
    }
    out
}

/// Wraps encoded pixels in an `AWIZ` block.
pub fn build_awiz(
    compression: u32,
    width: i32,
    height: i32,
    palette: Option<&[u8]>,
    data: &[u8],
) -> Result<Vec<u8>> {
    ensure!(width >= 0 && height >= 0, "negative image size {width}x{height}");
    let mut payload = Vec::new();
    if let Some(palette) = palette {
        ensure!(palette.len() >= 768, "palette holds {} bytes", palette.len());
        payload.extend(build_chunk(chunk::RGBS, &palette[..768]));
    }
    let mut header = Vec::with_capacity(12);
    header.extend_from_slice(&compression.to_le_bytes());
    header.extend_from_slice(&(width as u32).to_le_bytes());
    header.extend_from_slice(&(height as u32).to_le_bytes());
    payload.extend(build_chunk(chunk::WIZH, &header));
    payload.extend(build_chunk(chunk::WIZD, data));
    Ok(build_chunk(chunk::AWIZ, &payload))
}

/// Packs a screen rectangle back into an `AWIZ` resource. Returns `None`
/// when the rectangle misses the canvas.
pub fn capture_wiz_image(
    src: &Canvas,
    rect: Rect,
    compression: u32,
    transparent: u8,
    palette: Option<&[u8]>,
) -> Result<Option<Vec<u8>>> {
    let packed = match compression {
        COMPRESSION_RAW => pack_type0(src, rect),
        COMPRESSION_RLE => pack_type1(src, rect, transparent)?,
        other => anyhow::bail!("cannot capture with compression {other}"),
    };
    let Some((rect, data)) = packed else {
        return Ok(None);
    };
    build_awiz(compression, rect.width(), rect.height(), palette, &data).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wiz::{WizImage, decode_rle_row};

    fn roundtrip(width: usize, height: usize, pixels: Vec<u8>, transparent: u8) {
        let canvas = Canvas::from_pixels(width, height, pixels).unwrap();
        let (rect, data) = pack_type1(&canvas, canvas.bounds(), transparent)
            .unwrap()
            .unwrap();
        let image = WizImage::rle(rect.width(), rect.height(), data);
        assert_eq!(image.decode(transparent).unwrap(), canvas);
    }

    #[test]
    fn rle_round_trips_mixed_rows() {
        let mut pixels = Vec::new();
        for y in 0..7u32 {
            for x in 0..90u32 {
                let v = match (x + y * 3) % 11 {
                    0..=2 => 0,
                    3..=6 => 42,
                    _ => (x * 7 + y) as u8,
                };
                pixels.push(v);
            }
        }
        roundtrip(90, 7, pixels, 0);
    }

    #[test]
    fn rle_respects_run_limits() {
        // 200 transparent, 150 solid, 100 distinct.
        let mut row = vec![0u8; 200];
        row.extend(std::iter::repeat_n(9u8, 150));
        row.extend((0..100).map(|i| (i % 2 + 1) as u8 + (i / 2 % 100) as u8 * 2));
        let codes = pack_row(&row, 0);

        let mut i = 0;
        while i < codes.len() {
            let code = codes[i];
            if code & 1 != 0 {
                assert!((code >> 1) as usize <= RLE_MAX_SKIP);
                i += 1;
            } else if code & 2 != 0 {
                assert!((code >> 2) as usize + 1 <= RLE_MAX_RUN);
                i += 2;
            } else {
                let n = (code >> 2) as usize + 1;
                assert!(n <= RLE_MAX_RUN);
                i += 1 + n;
            }
        }

        let mut decoded = vec![0u8; row.len()];
        decode_rle_row(&codes, 0, row.len() as i32, |x, c| decoded[x as usize] = c).unwrap();
        assert_eq!(decoded, row);
    }

    #[test]
    fn transparent_rows_pack_to_empty() {
        let canvas = Canvas::new(5, 2, 3);
        let (_, data) = pack_type1(&canvas, canvas.bounds(), 3).unwrap().unwrap();
        assert_eq!(data, vec![0, 0, 0, 0]);
        roundtrip(5, 2, vec![3; 10], 3);
    }

    #[test]
    fn rows_too_long_for_the_length_prefix_fail() {
        // Alternating skip and single literal: three bytes per two pixels.
        let width = 50_000;
        let pixels = (0..width).map(|x| if x % 2 == 0 { 0 } else { 5 }).collect();
        let canvas = Canvas::from_pixels(width, 1, pixels).unwrap();
        let err = pack_type1(&canvas, canvas.bounds(), 0).unwrap_err();
        assert!(err.to_string().contains("75000 bytes"), "{err}");
        assert!(capture_wiz_image(&canvas, canvas.bounds(), COMPRESSION_RLE, 0, None).is_err());

        let narrow = Rect::new(0, 0, 40_000, 1);
        let (_, data) = pack_type1(&canvas, narrow, 0).unwrap().unwrap();
        assert_eq!(u16::from_le_bytes([data[0], data[1]]), 60_000);
    }

    #[test]
    fn capture_builds_parseable_awiz() {
        let canvas = Canvas::from_pixels(4, 2, vec![1, 2, 3, 4, 5, 6, 7, 8]).unwrap();
        let block = capture_wiz_image(&canvas, Rect::new(1, 0, 3, 2), COMPRESSION_RAW, 0, None)
            .unwrap()
            .unwrap();
        let image = WizImage::parse(&block).unwrap();
        assert_eq!((image.width, image.height), (2, 2));
        assert_eq!(image.data, vec![2, 3, 6, 7]);

        let missed = capture_wiz_image(&canvas, Rect::new(10, 10, 12, 12), COMPRESSION_RLE, 0, None);
        assert!(missed.unwrap().is_none());
    }
}
