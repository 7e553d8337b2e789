//! Actor records and the per-tick walking and animation steps.

use serde::{Deserialize, Serialize};

use crate::boxes::BoxTable;
use crate::error::{FatalError, VmResult};

pub const NUM_ACTOR_PALETTE: usize = 32;

const MF_NEW_LEG: u8 = 1;
const MF_IN_LEG: u8 = 2;
const MF_TURN: u8 = 4;
const MF_LAST_LEG: u8 = 8;

/// Height of the hit area above an actor's feet.
const ACTOR_HIT_HEIGHT: i32 = 64;

const TURN_INTERPOLATE: [u8; 16] = [0, 2, 2, 3, 2, 1, 2, 3, 0, 1, 2, 1, 0, 1, 0, 3];

/// Old-style direction (0 west, 1 east, 2 south, 3 north) of an angle.
pub fn new_dir_to_old_dir(dir: i32) -> i32 {
    match dir {
        71..=109 => 1,
        110..=251 => 2,
        252..=289 => 0,
        _ => 3,
    }
}

pub fn old_dir_to_new_dir(dir: i32) -> i32 {
    [270, 90, 180, 0][(dir & 3) as usize]
}

/// Snaps an angle onto one of the four compass directions.
pub fn normalize_angle(angle: i32) -> i32 {
    old_dir_to_new_dir(new_dir_to_old_dir(angle.rem_euclid(360)))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WalkData {
    pub dest_x: i32,
    pub dest_y: i32,
    pub dest_box: Option<usize>,
    /// Facing to adopt on arrival, `-1` to keep the walking direction.
    pub dest_dir: i32,
    pub cur_box: Option<usize>,
    cur_x: i32,
    cur_y: i32,
    next_x: i32,
    next_y: i32,
    xfrac: i32,
    yfrac: i32,
    delta_x: i32,
    delta_y: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub number: usize,
    pub room: i32,
    pub x: i32,
    pub y: i32,
    pub elevation: i32,
    pub facing: i32,
    pub target_facing: i32,
    pub walk_box: Option<usize>,
    pub costume: i32,
    pub scale_x: i32,
    pub scale_y: i32,
    pub box_scale: i32,
    pub talk_color: i32,
    pub talk_pos_x: i32,
    pub talk_pos_y: i32,
    pub width: i32,
    pub visible: bool,
    pub moving: u8,
    pub speed_x: i32,
    pub speed_y: i32,
    pub walk: WalkData,
    pub palette: Vec<u8>,
    pub frame: i32,
    pub init_frame: i32,
    pub walk_frame: i32,
    pub stand_frame: i32,
    pub talk_start_frame: i32,
    pub talk_stop_frame: i32,
    pub anim_counter: i32,
    pub anim_speed: i32,
    pub anim_progress: i32,
    pub ignore_boxes: bool,
    pub force_clip: i32,
    pub shadow_mode: i32,
    pub sound: i32,
    pub need_redraw: bool,
}

impl Actor {
    pub fn new(number: usize) -> Self {
        let mut actor = Actor {
            number,
            room: 0,
            x: 0,
            y: 0,
            elevation: 0,
            facing: 180,
            target_facing: 180,
            walk_box: None,
            costume: 0,
            scale_x: 0xFF,
            scale_y: 0xFF,
            box_scale: 0xFF,
            talk_color: 15,
            talk_pos_x: 0,
            talk_pos_y: -80,
            width: 24,
            visible: false,
            moving: 0,
            speed_x: 8,
            speed_y: 2,
            walk: WalkData::default(),
            palette: (0..NUM_ACTOR_PALETTE).map(|i| i as u8).collect(),
            frame: 0,
            init_frame: 1,
            walk_frame: 2,
            stand_frame: 3,
            talk_start_frame: 4,
            talk_stop_frame: 5,
            anim_counter: 0,
            anim_speed: 0,
            anim_progress: 0,
            ignore_boxes: false,
            force_clip: 0,
            shadow_mode: 0,
            sound: 0,
            need_redraw: false,
        };
        actor.init(1);
        actor
    }

    /// Resets the actor. Mode 1 also clears costume, room and position;
    /// mode 2 only resets the facing.
    pub fn init(&mut self, mode: i32) {
        match mode {
            1 => {
                self.costume = 0;
                self.room = 0;
                self.x = 0;
                self.y = 0;
                self.facing = 180;
            }
            2 => self.facing = 180,
            _ => {}
        }
        self.elevation = 0;
        self.width = 24;
        self.talk_color = 15;
        self.talk_pos_x = 0;
        self.talk_pos_y = -80;
        self.box_scale = 0xFF;
        self.scale_x = 0xFF;
        self.scale_y = 0xFF;
        self.sound = 0;
        self.target_facing = self.facing;
        self.shadow_mode = 0;
        self.stop_moving();
        self.set_walk_speed(8, 2);
        self.anim_speed = 0;
        self.ignore_boxes = false;
        self.force_clip = 0;
        self.init_frame = 1;
        self.walk_frame = 2;
        self.stand_frame = 3;
        self.talk_start_frame = 4;
        self.talk_stop_frame = 5;
    }

    pub fn is_in_room(&self, room: i32) -> bool {
        room != 0 && self.room == room
    }

    pub fn is_moving(&self) -> bool {
        self.moving != 0
    }

    pub fn stop_moving(&mut self) {
        self.moving = 0;
    }

    pub fn set_walk_speed(&mut self, speed_x: i32, speed_y: i32) {
        if speed_x == self.speed_x && speed_y == self.speed_y {
            return;
        }
        self.speed_x = speed_x;
        self.speed_y = speed_y;
        if self.moving != 0 {
            let (nx, ny) = (self.walk.next_x, self.walk.next_y);
            self.calc_movement_factor(nx, ny, None);
        }
    }

    pub fn set_palette(&mut self, index: i32, value: i32) -> VmResult<()> {
        let slot = usize::try_from(index)
            .ok()
            .and_then(|i| self.palette.get_mut(i))
            .ok_or(FatalError::InvalidIndex {
                table: "actor palette",
                index,
            })?;
        *slot = value as u8;
        Ok(())
    }

    pub fn set_direction(&mut self, direction: i32) {
        let direction = direction.rem_euclid(360);
        if self.facing == direction {
            return;
        }
        self.facing = direction;
        self.need_redraw = true;
    }

    pub fn turn_to_direction(&mut self, dir: i32) {
        if dir == -1 {
            return;
        }
        self.target_facing = dir;
        self.moving = MF_TURN;
    }

    fn update_direction(&self) -> i32 {
        let target = new_dir_to_old_dir(self.target_facing.rem_euclid(360));
        let from = new_dir_to_old_dir(self.facing.rem_euclid(360));
        old_dir_to_new_dir(TURN_INTERPOLATE[(target | (from << 2)) as usize] as i32)
    }

    /// Switches to animation frame `frame` and restarts the counter. Frames
    /// `0x38..=0x3C` redirect to the frames configured for the actor.
    pub fn start_anim(&mut self, frame: i32) {
        let frame = match frame {
            0x38 => self.init_frame,
            0x39 => self.walk_frame,
            0x3A => self.stand_frame,
            0x3B => self.talk_start_frame,
            0x3C => self.talk_stop_frame,
            other => other,
        };
        if self.costume != 0 {
            self.anim_progress = 0;
            self.anim_counter = 0;
            self.frame = frame;
            self.need_redraw = true;
        }
    }

    /// Script-level animation command: the low two bits carry a direction,
    /// the rest picks stop / turn now / turn gradually / play frame.
    pub fn animate(&mut self, anim: i32, in_current_room: bool) {
        let dir = old_dir_to_new_dir(anim & 3);
        let cmd = 0x3F - (anim >> 2) + 2;
        match cmd {
            2 => {
                if in_current_room {
                    self.start_anim(self.stand_frame);
                    self.stop_moving();
                }
            }
            3 => {
                if in_current_room {
                    self.moving &= !MF_TURN;
                }
                self.set_direction(dir);
            }
            4 => {
                if in_current_room {
                    self.turn_to_direction(dir);
                }
            }
            _ => self.start_anim(anim),
        }
    }

    pub fn set_box(&mut self, walk_box: Option<usize>, boxes: &BoxTable) {
        self.walk_box = walk_box;
        self.setup_scale(boxes);
    }

    fn setup_scale(&mut self, boxes: &BoxTable) {
        if self.ignore_boxes {
            return;
        }
        let Some(walk_box) = self.walk_box else {
            return;
        };
        self.box_scale = boxes.box_scale(walk_box as i32) as i32;
        let scale = boxes.scale_at(walk_box as i32, self.y);
        self.scale_x = scale;
        self.scale_y = scale;
    }

    /// Snaps the actor onto the walkable area and halts any walk.
    pub fn adjust_position(&mut self, boxes: &BoxTable, player: bool) {
        if !self.ignore_boxes {
            let fit = boxes.adjust_xy_to_be_in_box(self.x, self.y, player);
            self.x = fit.x;
            self.y = fit.y;
            self.walk.dest_box = fit.walk_box;
            self.set_box(fit.walk_box, boxes);
        }
        self.walk.dest_x = -1;
        self.stop_moving();
        if let Some(walk_box) = self.walk_box {
            if boxes.flags(walk_box as i32) & 7 != 0 {
                self.turn_to_direction(self.facing);
            }
        }
    }

    pub fn show(&mut self, current_room: i32, boxes: &BoxTable, player: bool) {
        if current_room == 0 || self.visible {
            return;
        }
        self.adjust_position(boxes, player);
        self.stop_moving();
        self.visible = true;
        self.need_redraw = true;
    }

    pub fn hide(&mut self) {
        if !self.visible {
            return;
        }
        if self.moving != 0 {
            self.stop_moving();
            self.start_anim(self.stand_frame);
        }
        self.visible = false;
        self.need_redraw = false;
    }

    /// Places the actor, showing or hiding it against `current_room`.
    pub fn put(&mut self, x: i32, y: i32, room: i32, current_room: i32, boxes: &BoxTable, player: bool) {
        self.x = x;
        self.y = y;
        self.room = room;
        self.need_redraw = true;
        let in_room = self.is_in_room(current_room);
        if self.visible {
            if in_room {
                if self.moving != 0 {
                    self.stop_moving();
                    self.start_anim(self.stand_frame);
                }
                self.adjust_position(boxes, player);
            } else {
                self.hide();
            }
        } else if in_room {
            self.show(current_room, boxes, player);
        }
    }

    pub fn start_walk(
        &mut self,
        dest_x: i32,
        dest_y: i32,
        dir: i32,
        current_room: i32,
        boxes: &BoxTable,
        player: bool,
    ) {
        let mut fit_x = dest_x;
        let mut fit_y = dest_y;
        let mut fit_box = None;
        if !self.ignore_boxes {
            let fit = boxes.adjust_xy_to_be_in_box(dest_x, dest_y, player);
            fit_x = fit.x;
            fit_y = fit.y;
            fit_box = fit.walk_box;
        }

        if !self.is_in_room(current_room) {
            self.x = fit_x;
            self.y = fit_y;
            if dir != -1 {
                self.facing = dir;
            }
            return;
        }

        if self.ignore_boxes {
            fit_box = None;
            self.walk_box = None;
        } else {
            if let Some(dest_box) = self.walk.dest_box {
                if boxes.check_xy_in_box_bounds(dest_box as i32, fit_x, fit_y) {
                    fit_box = Some(dest_box);
                }
            }
            if self.moving != 0
                && self.walk.dest_dir == dir
                && self.walk.dest_x == fit_x
                && self.walk.dest_y == fit_y
            {
                return;
            }
        }

        if self.x == fit_x && self.y == fit_y {
            if dir != self.facing {
                self.turn_to_direction(dir);
            }
            return;
        }

        self.walk.dest_x = fit_x;
        self.walk.dest_y = fit_y;
        self.walk.dest_box = fit_box;
        self.walk.dest_dir = dir;
        self.walk.cur_box = self.walk_box;
        self.moving = (self.moving & MF_IN_LEG) | MF_NEW_LEG;
    }

    fn calc_movement_factor(&mut self, next_x: i32, next_y: i32, boxes: Option<&BoxTable>) -> bool {
        if self.x == next_x && self.y == next_y {
            return false;
        }
        let diff_x = next_x - self.x;
        let diff_y = next_y - self.y;

        let mut delta_y = self.speed_y << 16;
        if diff_y < 0 {
            delta_y = -delta_y;
        }
        let mut delta_x = delta_y.wrapping_mul(diff_x);
        if diff_y != 0 {
            delta_x /= diff_y;
        } else {
            delta_y = 0;
        }

        if (delta_x / 0x10000).abs() > self.speed_x {
            delta_x = self.speed_x << 16;
            if diff_x < 0 {
                delta_x = -delta_x;
            }
            delta_y = delta_x.wrapping_mul(diff_y);
            if diff_x != 0 {
                delta_y /= diff_x;
            } else {
                delta_x = 0;
            }
        }

        self.walk.xfrac = 0;
        self.walk.yfrac = 0;
        self.walk.cur_x = self.x;
        self.walk.cur_y = self.y;
        self.walk.next_x = next_x;
        self.walk.next_y = next_y;
        self.walk.delta_x = delta_x;
        self.walk.delta_y = delta_y;
        self.target_facing = if diff_y.abs() * 3 > diff_x.abs() {
            if delta_y > 0 { 180 } else { 0 }
        } else if delta_x > 0 {
            90
        } else {
            270
        };

        match boxes {
            Some(boxes) => self.walk_step(boxes),
            None => true,
        }
    }

    /// Advances one step along the current leg. `false` once the leg ends.
    fn walk_step(&mut self, boxes: &BoxTable) -> bool {
        self.need_redraw = true;
        let next_facing = self.update_direction();
        if (self.walk_frame != self.frame && self.moving & MF_IN_LEG == 0) || self.facing != next_facing {
            self.set_direction(next_facing);
            self.start_anim(self.walk_frame);
        }
        self.moving |= MF_IN_LEG;

        if self.walk_box != self.walk.cur_box {
            if let Some(cur_box) = self.walk.cur_box {
                if boxes.check_xy_in_box_bounds(cur_box as i32, self.x, self.y) {
                    self.set_box(Some(cur_box), boxes);
                }
            }
        }

        let dist_x = (self.walk.next_x - self.walk.cur_x).abs();
        let dist_y = (self.walk.next_y - self.walk.cur_y).abs();
        if (self.x - self.walk.cur_x).abs() >= dist_x && (self.y - self.walk.cur_y).abs() >= dist_y {
            self.moving &= !MF_IN_LEG;
            return false;
        }

        let tmp_x = (self.x << 16) + self.walk.xfrac + (self.walk.delta_x >> 8) * self.scale_x;
        self.walk.xfrac = tmp_x & 0xFFFF;
        self.x = tmp_x >> 16;

        let tmp_y = (self.y << 16) + self.walk.yfrac + (self.walk.delta_y >> 8) * self.scale_y;
        self.walk.yfrac = tmp_y & 0xFFFF;
        self.y = tmp_y >> 16;

        if (self.x - self.walk.cur_x).abs() > dist_x {
            self.x = self.walk.next_x;
        }
        if (self.y - self.walk.cur_y).abs() > dist_y {
            self.y = self.walk.next_y;
        }

        if self.x == self.walk.next_x && self.y == self.walk.next_y {
            self.moving &= !MF_IN_LEG;
            return false;
        }
        true
    }

    /// One tick of walking or turning.
    pub fn walk_tick(&mut self, boxes: &BoxTable) {
        if self.moving == 0 {
            return;
        }

        if self.moving & MF_NEW_LEG == 0 {
            if self.moving & MF_IN_LEG != 0 && self.walk_step(boxes) {
                return;
            }
            if self.moving & MF_LAST_LEG != 0 {
                self.moving = 0;
                self.set_box(self.walk.dest_box, boxes);
                self.start_anim(self.stand_frame);
                if self.target_facing != self.walk.dest_dir {
                    self.turn_to_direction(self.walk.dest_dir);
                }
                return;
            }
            if self.moving & MF_TURN != 0 {
                let new_dir = self.update_direction();
                if self.facing != new_dir {
                    self.set_direction(new_dir);
                } else {
                    self.moving = 0;
                }
                return;
            }
            self.set_box(self.walk.cur_box, boxes);
            self.moving &= MF_IN_LEG;
        }

        self.moving &= !MF_NEW_LEG;
        match (self.walk_box, self.walk.dest_box) {
            (None, dest) => {
                self.set_box(dest, boxes);
                self.walk.cur_box = dest;
            }
            (Some(from), Some(to)) if from != to => {
                if boxes.next_box(from, to).is_none() {
                    self.walk.dest_box = self.walk_box;
                    self.moving |= MF_LAST_LEG;
                    return;
                }
                self.walk.cur_box = Some(to);
            }
            _ => {}
        }

        self.moving |= MF_LAST_LEG;
        let (dx, dy) = (self.walk.dest_x, self.walk.dest_y);
        self.calc_movement_factor(dx, dy, Some(boxes));
    }

    /// Advances the costume animation counter by the animation speed.
    pub fn animate_costume(&mut self) {
        if self.costume == 0 {
            return;
        }
        self.anim_progress += 1;
        if self.anim_progress >= self.anim_speed {
            self.anim_progress = 0;
            self.anim_counter += 1;
            self.need_redraw = true;
        }
    }

    pub fn hit(&self, x: i32, y: i32) -> bool {
        let half = self.width / 2;
        let feet = self.y - self.elevation;
        x >= self.x - half && x <= self.x + half && y <= feet && y >= feet - ACTOR_HIT_HEIGHT
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActorTable {
    actors: Vec<Actor>,
}

impl ActorTable {
    pub fn new(num_actors: usize) -> Self {
        ActorTable {
            actors: (0..num_actors).map(Actor::new).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.actors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actors.is_empty()
    }

    pub fn is_valid(&self, number: i32) -> bool {
        number >= 0 && (number as usize) < self.actors.len()
    }

    pub fn get(&self, number: i32) -> VmResult<&Actor> {
        usize::try_from(number)
            .ok()
            .and_then(|i| self.actors.get(i))
            .ok_or(FatalError::InvalidActor(number))
    }

    pub fn get_mut(&mut self, number: i32) -> VmResult<&mut Actor> {
        usize::try_from(number)
            .ok()
            .and_then(|i| self.actors.get_mut(i))
            .ok_or(FatalError::InvalidActor(number))
    }

    /// Actors other than the sentinel.
    pub fn iter(&self) -> impl Iterator<Item = &Actor> {
        self.actors.iter().skip(1)
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Actor> {
        self.actors.iter_mut().skip(1)
    }

    /// Topmost visible actor in `room` whose hit area contains the point.
    pub fn actor_at(&self, x: i32, y: i32, room: i32) -> Option<usize> {
        self.iter()
            .filter(|a| a.visible && a.is_in_room(room))
            .find(|a| a.hit(x, y))
            .map(|a| a.number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direction_conversions_round_trip_the_compass() {
        assert_eq!(new_dir_to_old_dir(90), 1);
        assert_eq!(new_dir_to_old_dir(180), 2);
        assert_eq!(new_dir_to_old_dir(270), 0);
        assert_eq!(new_dir_to_old_dir(0), 3);
        assert_eq!(normalize_angle(-100), 270);
        assert_eq!(normalize_angle(100), 90);
    }

    #[test]
    fn walking_moves_at_speed_and_stops_on_target() {
        let boxes = BoxTable::new(false);
        let mut actor = Actor::new(1);
        actor.costume = 1;
        actor.put(10, 100, 1, 1, &boxes, false);
        assert!(actor.visible);

        actor.start_walk(50, 100, -1, 1, &boxes, false);
        for _ in 0..5 {
            actor.walk_tick(&boxes);
        }
        assert!(actor.is_moving());
        assert_eq!((actor.x, actor.y), (49, 100));
        assert_eq!(actor.facing, 90);

        actor.walk_tick(&boxes);
        assert!(!actor.is_moving());
        assert_eq!(actor.x, 50);
        assert_eq!(actor.frame, actor.stand_frame);
    }

    #[test]
    fn walking_outside_the_current_room_teleports() {
        let boxes = BoxTable::new(false);
        let mut actor = Actor::new(2);
        actor.room = 3;
        actor.start_walk(70, 80, 270, 1, &boxes, false);
        assert_eq!((actor.x, actor.y, actor.facing), (70, 80, 270));
        assert!(!actor.is_moving());
    }

    #[test]
    fn turning_passes_through_an_intermediate_direction() {
        let boxes = BoxTable::new(false);
        let mut actor = Actor::new(1);
        actor.set_direction(270);
        actor.turn_to_direction(90);
        actor.walk_tick(&boxes);
        assert_eq!(actor.facing, 180);
        actor.walk_tick(&boxes);
        assert_eq!(actor.facing, 90);
        actor.walk_tick(&boxes);
        assert!(!actor.is_moving());
    }

    #[test]
    fn animation_counter_follows_speed() {
        let mut actor = Actor::new(1);
        actor.costume = 4;
        actor.anim_speed = 2;
        for _ in 0..6 {
            actor.animate_costume();
        }
        assert_eq!(actor.anim_counter, 3);
    }

    #[test]
    fn table_rejects_out_of_range_actors() {
        let table = ActorTable::new(13);
        assert!(table.get(12).is_ok());
        assert!(matches!(table.get(13), Err(FatalError::InvalidActor(13))));
        assert!(matches!(table.get(-1), Err(FatalError::InvalidActor(-1))));
    }
}
