//! Palette engine: colour cycling, fades, shadow tables and the
//! lighting transforms rooms apply to their base palette.

use log::warn;
use scumm_formats::CycleEntry;
use serde::{Deserialize, Serialize};

use crate::error::{FatalError, VmResult};

pub const NUM_COLORS: usize = 256;
pub const NUM_CYCLES: usize = 16;
const PALETTE_BYTES: usize = NUM_COLORS * 3;

#[inline]
pub fn color_weight(r: i32, g: i32, b: i32) -> u32 {
    (3 * r * r + 6 * g * g + 2 * b * b) as u32
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColorCycle {
    pub delay: u16,
    pub counter: i32,
    pub flags: u16,
    pub start: u8,
    pub end: u8,
}

impl ColorCycle {
    /// Bit 2 of the flags reverses the rotation.
    pub fn forward(&self) -> bool {
        self.flags & 2 == 0
    }
}

/// In-flight fade toward a target sub-range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PalManip {
    pub start: usize,
    pub end: usize,
    pub counter: i32,
    #[serde(with = "serde_bytes")]
    pub target: Vec<u8>,
    /// 8.8 fixed point copy of the palette being faded.
    pub between: Vec<u16>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaletteState {
    small_header: bool,
    #[serde(with = "serde_bytes")]
    current: Vec<u8>,
    /// The room's `CLUT`, source for every lighting transform.
    base: Option<Vec<u8>>,
    cycles: Vec<ColorCycle>,
    manip: Option<PalManip>,
    #[serde(with = "serde_bytes")]
    shadow: Vec<u8>,
    #[serde(with = "serde_bytes")]
    special: Vec<u8>,
    /// Small-header room colour remap set by `roomOps`.
    #[serde(with = "serde_bytes")]
    room_colors: Vec<u8>,
    dirty: Option<(usize, usize)>,
}

fn identity_table() -> Vec<u8> {
    (0..NUM_COLORS).map(|i| i as u8).collect()
}

fn check_color(index: i32) -> VmResult<usize> {
    usize::try_from(index)
        .ok()
        .filter(|&i| i < NUM_COLORS)
        .ok_or(FatalError::InvalidIndex {
            table: "palette",
            index,
        })
}

/// Rotates `size`-wide entries of `[start, end]` by one position. Forward
/// moves the last entry to the front.
fn cycle_entries<T: Copy>(palette: &mut [T], start: usize, end: usize, size: usize, forward: bool) {
    let range = &mut palette[start * size..(end + 1) * size];
    if forward {
        range.rotate_right(size);
    } else {
        range.rotate_left(size);
    }
}

/// Remaps index values that fall inside a cycled range so an indirection
/// table keeps pointing at the same colour.
fn cycle_indirect(table: &mut [u8], start: usize, end: usize, forward: bool) {
    let num = end - start + 1;
    let offset = if forward { 1 } else { num - 1 };
    for value in table.iter_mut() {
        let v = *value as usize;
        if start <= v && v <= end {
            *value = ((v - start + offset) % num + start) as u8;
        }
    }
}

fn hue_value(n1: i32, n2: i32, mut hue: i32) -> i32 {
    if hue > 360 {
        hue -= 360;
    } else if hue < 0 {
        hue += 360;
    }
    if hue < 60 {
        n1 + (n2 - n1) * hue / 60
    } else if hue < 180 {
        n2
    } else if hue < 240 {
        n1 + (n2 - n1) * (240 - hue) / 60
    } else {
        n1
    }
}

impl PaletteState {
    pub fn new(small_header: bool) -> Self {
        PaletteState {
            small_header,
            current: vec![0; PALETTE_BYTES],
            base: None,
            cycles: vec![ColorCycle::default(); NUM_CYCLES],
            manip: None,
            shadow: identity_table(),
            special: identity_table(),
            room_colors: identity_table(),
            dirty: None,
        }
    }

    pub fn current(&self) -> &[u8] {
        &self.current
    }

    pub fn color(&self, index: usize) -> [u8; 3] {
        let at = index * 3;
        [self.current[at], self.current[at + 1], self.current[at + 2]]
    }

    pub fn shadow(&self) -> &[u8] {
        &self.shadow
    }

    pub fn special(&self) -> &[u8] {
        &self.special
    }

    pub fn room_colors(&self) -> &[u8] {
        &self.room_colors
    }

    pub fn cycles(&self) -> &[ColorCycle] {
        &self.cycles
    }

    pub fn manip(&self) -> Option<&PalManip> {
        self.manip.as_ref()
    }

    /// Remaining fade steps; 0 when no fade is running.
    pub fn manip_counter(&self) -> i32 {
        self.manip.as_ref().map_or(0, |m| m.counter)
    }

    pub fn dirty(&self) -> Option<(usize, usize)> {
        self.dirty
    }

    pub fn set_dirty(&mut self, min: usize, max: usize) {
        self.dirty = Some(match self.dirty {
            Some((lo, hi)) => (lo.min(min), hi.max(max)),
            None => (min, max),
        });
    }

    /// Colours of the dirty range as uploaded to the host, clearing the
    /// range. Small-header titles resolve every index through the shadow
    /// table first.
    pub fn take_dirty_upload(&mut self) -> Option<(usize, Vec<u8>)> {
        let (first, last) = self.dirty.take()?;
        let mut colors = Vec::with_capacity((last - first + 1) * 3);
        for i in first..=last {
            let index = if self.small_header {
                self.shadow[i] as usize
            } else {
                i
            };
            colors.extend_from_slice(&self.color(index));
        }
        Some((first, colors))
    }

    /// Bulk-loads RGB triplets. Near-white entries above 15 are left alone
    /// except in small-header titles.
    pub fn set_palette_from_ptr(&mut self, data: &[u8]) -> VmResult<()> {
        let num_colors = data.len() / 3;
        if num_colors > NUM_COLORS {
            return Err(FatalError::InvalidIndex {
                table: "palette colours",
                index: num_colors as i32,
            });
        }
        for (i, rgb) in data.chunks_exact(3).enumerate() {
            let near_white = rgb.iter().all(|&c| c >= 252);
            if self.small_header || i <= 15 || !near_white {
                self.current[i * 3..i * 3 + 3].copy_from_slice(rgb);
            }
        }
        if num_colors > 0 {
            self.set_dirty(0, num_colors - 1);
        }
        Ok(())
    }

    /// Forgets the previous room: identity shadow table, no base palette,
    /// no fade in flight.
    pub fn reset_for_room(&mut self) {
        self.shadow = identity_table();
        self.room_colors = identity_table();
        self.base = None;
        self.manip = None;
        if self.small_header {
            self.set_dirty(0, NUM_COLORS - 1);
        }
    }

    /// Installs a room's `CLUT` as both the base and the live palette.
    pub fn load_room_palette(&mut self, clut: &[u8]) -> VmResult<()> {
        self.base = Some(clut.to_vec());
        self.set_palette_from_ptr(clut)
    }

    pub fn set_pal_color(&mut self, index: i32, r: i32, g: i32, b: i32) -> VmResult<()> {
        let i = check_color(index)?;
        self.current[i * 3] = r as u8;
        self.current[i * 3 + 1] = g as u8;
        self.current[i * 3 + 2] = b as u8;
        self.set_dirty(i, i);
        Ok(())
    }

    pub fn set_shadow_entry(&mut self, index: i32, value: i32) -> VmResult<()> {
        let i = check_color(index)?;
        self.shadow[i] = value as u8;
        self.set_dirty(i, i);
        Ok(())
    }

    pub fn set_room_color(&mut self, index: i32, value: i32) -> VmResult<()> {
        let i = check_color(index)?;
        self.room_colors[i] = check_color(value)? as u8;
        Ok(())
    }

    pub fn load_cycles(&mut self, entries: &[CycleEntry]) -> VmResult<()> {
        self.cycles = vec![ColorCycle::default(); NUM_CYCLES];
        for entry in entries {
            let slot = entry.slot as usize;
            if !(1..=NUM_CYCLES).contains(&slot) {
                return Err(FatalError::InvalidIndex {
                    table: "colour cycle",
                    index: slot as i32,
                });
            }
            self.cycles[slot - 1] = ColorCycle {
                delay: entry.delay,
                counter: 0,
                flags: entry.flags,
                start: entry.start,
                end: entry.end,
            };
        }
        Ok(())
    }

    /// Stops cycle `slot` (1-based), or every cycle for 0.
    pub fn stop_cycle(&mut self, slot: i32) -> VmResult<()> {
        match slot {
            0 => self.cycles.iter_mut().for_each(|c| c.delay = 0),
            1..=16 => self.cycles[slot as usize - 1].delay = 0,
            _ => {
                return Err(FatalError::InvalidIndex {
                    table: "colour cycle",
                    index: slot,
                })
            }
        }
        Ok(())
    }

    pub fn set_cycle_delay(&mut self, slot: i32, delay: u16) -> VmResult<()> {
        if !(1..=16).contains(&slot) {
            return Err(FatalError::InvalidIndex {
                table: "colour cycle",
                index: slot,
            });
        }
        self.cycles[slot as usize - 1].delay = delay;
        Ok(())
    }

    /// Advances every active cycle by `value_to_add` timer units.
    pub fn cycle_palette(&mut self, value_to_add: i32) {
        for n in 0..NUM_CYCLES {
            let cycle = &mut self.cycles[n];
            if cycle.delay == 0 || cycle.start > cycle.end {
                continue;
            }
            cycle.counter += value_to_add;
            if cycle.counter < cycle.delay as i32 {
                continue;
            }
            cycle.counter %= cycle.delay as i32;
            let (start, end, forward) = (cycle.start as usize, cycle.end as usize, cycle.forward());

            self.set_dirty(start, end);
            if let Some(manip) = self.manip.as_mut().filter(|m| m.counter != 0) {
                cycle_entries(&mut manip.target, start, end, 3, forward);
                cycle_entries(&mut manip.between, start, end, 3, forward);
            }
            // Small-header titles animate through the shadow table only.
            if !self.small_header {
                cycle_entries(&mut self.current, start, end, 3, forward);
            }
            cycle_indirect(&mut self.special, start, end, forward);
            cycle_indirect(&mut self.shadow, start, end, forward);
        }
    }

    /// Starts a fade of `[start, end]` toward the colours given by three
    /// per-channel byte strings, over `time` steps.
    pub fn pal_manipulate_init(
        &mut self,
        start: i32,
        end: i32,
        channels: [&[u8]; 3],
        time: i32,
    ) -> VmResult<()> {
        let start = check_color(start)?;
        let end = check_color(end)?;
        let mut target = vec![0u8; PALETTE_BYTES];
        let mut between = vec![0u16; PALETTE_BYTES];
        for i in start..=end {
            for (c, channel) in channels.iter().enumerate() {
                target[i * 3 + c] = channel.get(i).copied().unwrap_or(0);
                between[i * 3 + c] = (self.current[i * 3 + c] as u16) << 8;
            }
        }
        self.manip = Some(PalManip {
            start,
            end,
            counter: time,
            target,
            between,
        });
        Ok(())
    }

    /// One fade step; a no-op once the counter reached 0.
    pub fn pal_manipulate(&mut self) {
        let Some(manip) = self.manip.as_mut() else {
            return;
        };
        if manip.counter <= 0 {
            return;
        }
        for i in manip.start * 3..(manip.end + 1) * 3 {
            let between = manip.between[i] as i32;
            let target = (manip.target[i] as i32) << 8;
            let next = between + (target - between) / manip.counter;
            manip.between[i] = next as u16;
            self.current[i] = (next >> 8) as u8;
        }
        let (start, end) = (manip.start, manip.end);
        manip.counter -= 1;
        self.set_dirty(start, end);
    }

    fn base_or_current(&self) -> &[u8] {
        self.base.as_deref().unwrap_or(&self.current)
    }

    /// Maps every colour of the base palette, scaled, to its nearest
    /// neighbour inside `[start, end]`.
    pub fn setup_shadow_palette(
        &mut self,
        red: i32,
        green: i32,
        blue: i32,
        start: i32,
        end: i32,
    ) -> VmResult<()> {
        let start = check_color(start)?;
        let end = check_color(end)?;
        let base = self.base_or_current();
        let mut table = vec![0u8; NUM_COLORS];
        for (i, slot) in table.iter_mut().enumerate() {
            let r = ((base[i * 3] as i32 * red) >> 8).min(255) & !3;
            let g = ((base[i * 3 + 1] as i32 * green) >> 8).min(255) & !3;
            let b = ((base[i * 3 + 2] as i32 * blue) >> 8).min(255) & !3;

            let mut best_sum = u32::MAX;
            let mut best_item = 0usize;
            for j in start..=end {
                let ar = base[j * 3] as i32 & !3;
                let ag = base[j * 3 + 1] as i32 & !3;
                let ab = base[j * 3 + 2] as i32 & !3;
                if ar == r && ag == g && ab == b {
                    best_item = j;
                    break;
                }
                let sum = color_weight(ar - r, ag - g, ab - b);
                if sum < best_sum {
                    best_sum = sum;
                    best_item = j;
                }
            }
            *slot = best_item as u8;
        }
        self.shadow = table;
        Ok(())
    }

    /// Builds the semi-transparency table: colours `start..end` of the base
    /// palette, scaled, are matched against `[from, to]`.
    #[allow(clippy::too_many_arguments)]
    pub fn create_special_palette(
        &mut self,
        from: i32,
        to: i32,
        red: i32,
        green: i32,
        blue: i32,
        start: i32,
        end: i32,
    ) -> VmResult<()> {
        let from = check_color(from)?;
        let to = check_color(to)?;
        let start = check_color(start)?;
        let end = check_color(end)?;
        let base = self.base_or_current();
        let mut table = identity_table();
        for (i, slot) in table.iter_mut().enumerate().take(end).skip(start) {
            let r = ((base[i * 3] as i32 * red) >> 8).min(255);
            let g = ((base[i * 3 + 1] as i32 * green) >> 8).min(255);
            let b = ((base[i * 3 + 2] as i32 * blue) >> 8).min(255);
            let mut best = u32::MAX;
            for j in from..=to {
                let weight = color_weight(
                    base[j * 3] as i32 - r,
                    base[j * 3 + 1] as i32 - g,
                    base[j * 3 + 2] as i32 - b,
                );
                if weight < best {
                    best = weight;
                    *slot = j as u8;
                }
            }
        }
        self.special = table;
        Ok(())
    }

    /// Scales `[start, end]` of the base palette by `c * scale / 255`.
    pub fn darken_palette(&mut self, red: i32, green: i32, blue: i32, start: i32, end: i32) -> VmResult<()> {
        let Some(base) = self.base.as_ref() else {
            return Ok(());
        };
        if start > end {
            return Ok(());
        }
        let first = check_color(start)?;
        let last = check_color(end)?;
        for j in first..=last {
            for (c, scale) in [red, green, blue].into_iter().enumerate() {
                let value = (base[j * 3 + c] as i32 * scale / 0xFF).min(255);
                self.current[j * 3 + c] = value as u8;
            }
        }
        self.set_dirty(first, last);
        Ok(())
    }

    /// Scales hue, saturation and lightness of `[start, end]` of the base
    /// palette using integer Foley & van Dam HLS conversion.
    pub fn desaturate_palette(
        &mut self,
        hue_scale: i32,
        sat_scale: i32,
        light_scale: i32,
        start: i32,
        end: i32,
    ) -> VmResult<()> {
        if start > end {
            return Ok(());
        }
        let first = check_color(start)?;
        let last = check_color(end)?;
        let base = self.base_or_current().to_vec();
        for j in first..=last {
            let (mut r, mut g, mut b) = (
                base[j * 3] as i32,
                base[j * 3 + 1] as i32,
                base[j * 3 + 2] as i32,
            );
            let min = r.min(g).min(b);
            let max = r.max(g).max(b);
            let diff = max - min;
            let sum = max + min;

            if diff != 0 {
                let s = if sum <= 255 {
                    255 * diff / sum
                } else {
                    255 * diff / (255 * 2 - sum)
                };
                let mut h = if r == max {
                    60 * (g - b) / diff
                } else if g == max {
                    120 + 60 * (b - r) / diff
                } else {
                    240 + 60 * (r - g) / diff
                };
                if h < 0 {
                    h += 360;
                }

                let h = h * hue_scale / 255;
                let s = s * sat_scale / 255;
                let l = sum * light_scale / 255;

                let m2 = if l <= 255 {
                    l * (255 + s) / (255 * 2)
                } else {
                    l * (255 - s) / (255 * 2) + s
                };
                let m1 = l - m2;

                r = hue_value(m1, m2, h + 120);
                g = hue_value(m1, m2, h);
                b = hue_value(m1, m2, h - 120);
            } else {
                r = r * light_scale / 255;
                g = r;
                b = r;
            }
            self.current[j * 3] = r as u8;
            self.current[j * 3 + 1] = g as u8;
            self.current[j * 3 + 2] = b as u8;
        }
        self.set_dirty(first, last);
        Ok(())
    }

    /// Nearest live palette entry for an RGB colour. With a threshold, a
    /// match worse than `threshold` on every channel claims a free
    /// near-white slot instead.
    pub fn remap_palette_color(&mut self, r: i32, g: i32, b: i32, threshold: Option<u32>) -> u8 {
        let r = r.min(255) & !3;
        let g = g.min(255) & !3;
        let b = b.min(255) & !3;

        let mut best_sum = u32::MAX;
        let mut best_item = 0usize;
        for i in 0..NUM_COLORS {
            let ar = self.current[i * 3] as i32 & !3;
            let ag = self.current[i * 3 + 1] as i32 & !3;
            let ab = self.current[i * 3 + 2] as i32 & !3;
            if ar == r && ag == g && ab == b {
                return i as u8;
            }
            let sum = color_weight(ar - r, ag - g, ab - b);
            if sum < best_sum {
                best_sum = sum;
                best_item = i;
            }
        }

        if let Some(t) = threshold {
            let t = t as i32;
            if best_sum > color_weight(t, t, t) {
                for i in (49..=254).rev() {
                    if self.color(i).iter().all(|&c| c >= 252) {
                        self.current[i * 3] = r as u8;
                        self.current[i * 3 + 1] = g as u8;
                        self.current[i * 3 + 2] = b as u8;
                        self.set_dirty(i, i);
                        return i as u8;
                    }
                }
                warn!("remap_palette_color: no free slot for ({r}, {g}, {b})");
            }
        }
        best_item as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp() -> Vec<u8> {
        (0..PALETTE_BYTES).map(|i| (i / 3) as u8).collect()
    }

    fn state_with(palette: &[u8]) -> PaletteState {
        let mut state = PaletteState::new(false);
        state.load_room_palette(palette).unwrap();
        state
    }

    #[test]
    fn near_white_entries_are_skipped_above_15() {
        let mut clut = vec![0u8; PALETTE_BYTES];
        clut[10 * 3..10 * 3 + 3].copy_from_slice(&[255, 255, 255]);
        clut[20 * 3..20 * 3 + 3].copy_from_slice(&[252, 253, 254]);
        clut[21 * 3..21 * 3 + 3].copy_from_slice(&[251, 255, 255]);
        let mut state = PaletteState::new(false);
        state.current[20 * 3] = 7;
        state.set_palette_from_ptr(&clut).unwrap();
        assert_eq!(state.color(10), [255, 255, 255]);
        assert_eq!(state.color(20), [7, 0, 0]);
        assert_eq!(state.color(21), [251, 255, 255]);

        let mut small = PaletteState::new(true);
        small.set_palette_from_ptr(&clut).unwrap();
        assert_eq!(small.color(20), [252, 253, 254]);
        assert_eq!(small.dirty(), Some((0, 255)));
    }

    #[test]
    fn full_rotation_restores_the_range() {
        let mut state = state_with(&ramp());
        let cycle = CycleEntry {
            slot: 1,
            delay: 1,
            flags: 0,
            start: 10,
            end: 17,
        };
        state.load_cycles(&[cycle]).unwrap();
        let before = state.current.clone();

        state.cycle_palette(1);
        assert_eq!(state.color(10), [17, 17, 17]);
        assert_eq!(state.color(11), [10, 10, 10]);
        assert_eq!(state.shadow()[17], 10);
        assert_eq!(state.shadow()[10], 11);
        for _ in 1..8 {
            state.cycle_palette(1);
        }
        assert_eq!(state.current, before);
        assert_eq!(state.shadow(), identity_table().as_slice());
    }

    #[test]
    fn backward_cycle_and_counter_modulo() {
        let mut state = state_with(&ramp());
        state
            .load_cycles(&[CycleEntry {
                slot: 3,
                delay: 10,
                flags: 2,
                start: 4,
                end: 6,
            }])
            .unwrap();
        state.cycle_palette(7);
        assert_eq!(state.color(4), [4, 4, 4]);
        state.cycle_palette(7);
        assert_eq!(state.cycles()[2].counter, 4);
        assert_eq!(state.color(4), [5, 5, 5]);
        assert_eq!(state.color(6), [4, 4, 4]);

        state.stop_cycle(0).unwrap();
        state.cycle_palette(100);
        assert_eq!(state.color(4), [5, 5, 5]);
        assert!(state.stop_cycle(17).is_err());
    }

    #[test]
    fn small_header_cycles_through_the_shadow_table() {
        let mut state = PaletteState::new(true);
        state.load_room_palette(&ramp()).unwrap();
        state
            .load_cycles(&[CycleEntry {
                slot: 1,
                delay: 1,
                flags: 0,
                start: 0,
                end: 1,
            }])
            .unwrap();
        state.dirty = None;
        state.cycle_palette(1);
        assert_eq!(state.color(0), [0, 0, 0]);
        let (first, colors) = state.take_dirty_upload().unwrap();
        assert_eq!(first, 0);
        assert_eq!(colors, vec![1, 1, 1, 0, 0, 0]);
        assert!(state.take_dirty_upload().is_none());
    }

    #[test]
    fn fade_reaches_target_in_exact_steps() {
        let mut state = state_with(&ramp());
        let target: Vec<u8> = (0..PALETTE_BYTES).map(|i| 255 - (i % 251) as u8).collect();
        let reds: Vec<u8> = target.iter().step_by(3).copied().collect();
        let greens: Vec<u8> = target.iter().skip(1).step_by(3).copied().collect();
        let blues: Vec<u8> = target.iter().skip(2).step_by(3).copied().collect();

        state
            .pal_manipulate_init(0, 255, [&reds, &greens, &blues], 30)
            .unwrap();
        for step in 0..30 {
            assert_eq!(state.manip_counter(), 30 - step);
            state.pal_manipulate();
        }
        assert_eq!(state.current, target);
        assert_eq!(state.manip_counter(), 0);
        state.pal_manipulate();
        assert_eq!(state.current, target);
    }

    #[test]
    fn shadow_palette_picks_nearest_in_range() {
        let mut clut = vec![0u8; PALETTE_BYTES];
        clut[3..6].copy_from_slice(&[200, 200, 200]);
        clut[30..33].copy_from_slice(&[100, 100, 100]);
        clut[33..36].copy_from_slice(&[40, 40, 40]);
        let mut state = state_with(&clut);
        state.setup_shadow_palette(128, 128, 128, 10, 11).unwrap();
        // 200 * 128 >> 8 = 100: exact hit on entry 10.
        assert_eq!(state.shadow()[1], 10);
        // Black scales to black; 40 is closer than 100.
        assert_eq!(state.shadow()[0], 11);
    }

    #[test]
    fn special_palette_leaves_outside_range_identity() {
        let mut clut = vec![0u8; PALETTE_BYTES];
        clut[6..9].copy_from_slice(&[90, 90, 90]);
        clut[15..18].copy_from_slice(&[50, 50, 50]);
        clut[18..21].copy_from_slice(&[80, 80, 80]);
        let mut state = state_with(&clut);
        state.create_special_palette(5, 6, 256, 256, 256, 2, 3).unwrap();
        assert_eq!(state.special()[2], 6);
        assert_eq!(state.special()[3], 3);
        assert_eq!(state.special()[1], 1);
    }

    #[test]
    fn darken_scales_from_base_palette() {
        let mut state = state_with(&ramp());
        state.darken_palette(128, 255, 510, 100, 101).unwrap();
        assert_eq!(state.color(100), [50, 100, 200]);
        state.darken_palette(255, 255, 255, 100, 100).unwrap();
        assert_eq!(state.color(100), [100, 100, 100]);
        assert_eq!(state.color(200), [200, 200, 200]);
        state.darken_palette(0, 0, 0, 200, 199).unwrap();
        assert_eq!(state.color(200), [200, 200, 200]);
    }

    #[test]
    fn desaturate_matches_integer_hls() {
        let mut clut = vec![0u8; PALETTE_BYTES];
        clut[3..6].copy_from_slice(&[200, 100, 50]);
        clut[6..9].copy_from_slice(&[90, 90, 90]);
        let mut state = state_with(&clut);
        state.desaturate_palette(255, 255, 255, 1, 2).unwrap();
        // Identity scales round-trip through the integer formulas.
        assert_eq!(state.color(1), [200, 100, 50]);
        assert_eq!(state.color(2), [90, 90, 90]);

        state.desaturate_palette(255, 0, 255, 1, 1).unwrap();
        assert_eq!(state.color(1), [125, 125, 125]);
        state.desaturate_palette(255, 255, 128, 2, 2).unwrap();
        assert_eq!(state.color(2), [45, 45, 45]);
    }

    #[test]
    fn remap_claims_free_slot_above_threshold() {
        let mut state = PaletteState::new(false);
        state.set_pal_color(3, 100, 100, 100).unwrap();
        state.set_pal_color(200, 255, 255, 255).unwrap();
        state.set_pal_color(250, 255, 255, 254).unwrap();
        assert_eq!(state.remap_palette_color(101, 102, 99, None), 3);
        assert_eq!(state.remap_palette_color(30, 0, 0, None), 0);

        let slot = state.remap_palette_color(0, 0, 120, Some(10));
        assert_eq!(slot, 250);
        assert_eq!(state.color(250), [0, 0, 120]);
        assert_eq!(state.remap_palette_color(0, 0, 120, Some(10)), 250);
    }
}
