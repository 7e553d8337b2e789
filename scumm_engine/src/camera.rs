//! Camera controller. The state machine lives here; the VM feeds it the
//! variables and the followed actor's position each tick and runs the
//! scroll script when a step reports movement.

use serde::{Deserialize, Serialize};

pub const DEFAULT_LEFT_TRIGGER: i32 = 10;
pub const DEFAULT_RIGHT_TRIGGER: i32 = 30;
const CLASSIC_STEP: i32 = 8;
const MIN_NEW_CAMERA_SPEED: i32 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CameraMode {
    #[default]
    Normal,
    FollowActor,
    Panning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CameraPoint {
    pub x: i32,
    pub y: i32,
}

/// Limits the camera has to respect during one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CameraBounds {
    pub min_x: i32,
    pub max_x: i32,
    pub min_y: i32,
    pub max_y: i32,
    pub room_width: i32,
    pub room_height: i32,
    pub screen_width: i32,
    pub screen_height: i32,
    /// `VAR_CAMERA_FAST_X`: jump straight to the destination.
    pub fast: bool,
}

impl CameraBounds {
    pub fn clamp(&self, pt: &mut CameraPoint, new_camera: bool) {
        pt.x = pt.x.max(self.min_x).min(self.max_x);
        if new_camera {
            pt.y = pt.y.max(self.min_y).min(self.max_y);
        }
    }

    fn num_strips(&self) -> i32 {
        self.screen_width / 8
    }
}

/// Speed model variables of new-camera titles, read and written back by
/// the VM around each step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CameraSpeed {
    pub threshold_x: i32,
    pub threshold_y: i32,
    pub speed_x: i32,
    pub speed_y: i32,
    pub accel_x: i32,
    pub accel_y: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CameraStep {
    /// Position changed during the step.
    pub moved: bool,
    /// Position before the step.
    pub from: CameraPoint,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraState {
    pub cur: CameraPoint,
    pub dest: CameraPoint,
    pub last: CameraPoint,
    pub accel: CameraPoint,
    /// Followed actor, 0 for none.
    pub follows: i32,
    pub mode: CameraMode,
    pub moving_to_actor: bool,
    pub left_trigger: i32,
    pub right_trigger: i32,
    pub screen_start_strip: i32,
    pub screen_top: i32,
}

impl Default for CameraState {
    fn default() -> Self {
        CameraState {
            cur: CameraPoint::default(),
            dest: CameraPoint::default(),
            last: CameraPoint::default(),
            accel: CameraPoint::default(),
            follows: 0,
            mode: CameraMode::Normal,
            moving_to_actor: false,
            left_trigger: DEFAULT_LEFT_TRIGGER,
            right_trigger: DEFAULT_RIGHT_TRIGGER,
            screen_start_strip: 0,
            screen_top: 0,
        }
    }
}

impl CameraState {
    /// Strip offset of `x` relative to the left screen edge.
    pub fn strip_offset(&self, x: i32) -> i32 {
        x / 8 - self.screen_start_strip
    }

    pub fn outside_band(&self, x: i32) -> bool {
        let t = self.strip_offset(x);
        t < self.left_trigger || t > self.right_trigger
    }

    /// Moves the camera to `x`. Normal cameras snap; a following camera only
    /// snaps when the jump is larger than half a screen.
    pub fn set_at(&mut self, x: i32, y: i32, bounds: &CameraBounds, new_camera: bool) {
        if new_camera {
            self.cur = CameraPoint { x, y };
            bounds.clamp(&mut self.cur, true);
            self.dest = self.cur;
            self.camera_moved(bounds, true);
            return;
        }
        if self.mode != CameraMode::FollowActor || (x - self.cur.x).abs() > bounds.screen_width / 2 {
            self.cur.x = x;
        }
        self.dest.x = x;
        self.cur.x = self.cur.x.max(bounds.min_x).min(bounds.max_x);
    }

    pub fn pan_to(&mut self, x: i32, y: i32) {
        self.dest = CameraPoint { x, y };
        self.mode = CameraMode::Panning;
        self.moving_to_actor = false;
    }

    pub fn follow(&mut self, actor: i32) {
        self.mode = CameraMode::FollowActor;
        self.follows = actor;
    }

    pub fn stop_following(&mut self) {
        self.mode = CameraMode::Normal;
        self.follows = 0;
        self.moving_to_actor = false;
    }

    /// Recomputes the visible strip range after `cur` changed.
    pub fn camera_moved(&mut self, bounds: &CameraBounds, new_camera: bool) {
        if !new_camera {
            let half = bounds.screen_width / 2;
            if self.cur.x < half {
                self.cur.x = half;
            } else if self.cur.x > bounds.room_width - half {
                self.cur.x = bounds.room_width - half;
            }
        }
        self.screen_start_strip = self.cur.x / 8 - bounds.num_strips() / 2;
        self.screen_top = self.cur.y - bounds.screen_height / 2;
    }

    /// One tick of the classic camera. `actor` is the followed actor's
    /// position when the camera follows one.
    pub fn step_classic(&mut self, actor: Option<CameraPoint>, bounds: &CameraBounds) -> CameraStep {
        let from = self.cur;
        let snap = bounds.fast;
        self.cur.x &= !7;

        if self.cur.x < bounds.min_x {
            self.cur.x = if snap { bounds.min_x } else { self.cur.x + CLASSIC_STEP };
            self.camera_moved(bounds, false);
            return CameraStep {
                moved: self.cur != from,
                from,
            };
        }
        if self.cur.x > bounds.max_x {
            self.cur.x = if snap { bounds.max_x } else { self.cur.x - CLASSIC_STEP };
            self.camera_moved(bounds, false);
            return CameraStep {
                moved: self.cur != from,
                from,
            };
        }

        if self.mode == CameraMode::FollowActor {
            if let Some(pos) = actor {
                let t = self.strip_offset(pos.x);
                if t < self.left_trigger || t > self.right_trigger {
                    if snap {
                        if t > bounds.num_strips() - 5 {
                            self.dest.x = pos.x + 80;
                        }
                        if t < 5 {
                            self.dest.x = pos.x - 80;
                        }
                    } else {
                        self.moving_to_actor = true;
                    }
                }
            }
        }

        if self.moving_to_actor {
            match actor {
                Some(pos) => self.dest.x = pos.x,
                None => self.moving_to_actor = false,
            }
        }
        self.dest.x = self.dest.x.max(bounds.min_x).min(bounds.max_x);

        if snap {
            self.cur.x = self.dest.x;
        } else {
            if self.cur.x < self.dest.x {
                self.cur.x += CLASSIC_STEP;
            }
            if self.cur.x > self.dest.x {
                self.cur.x -= CLASSIC_STEP;
            }
        }

        if let Some(pos) = actor.filter(|_| self.moving_to_actor) {
            if self.cur.x / 8 == pos.x / 8 {
                self.moving_to_actor = false;
            }
        }

        self.camera_moved(bounds, false);
        CameraStep {
            moved: self.cur.x != from.x,
            from,
        }
    }

    /// One tick of the accelerating camera.
    pub fn step_new(
        &mut self,
        actor: Option<CameraPoint>,
        bounds: &CameraBounds,
        speed: &mut CameraSpeed,
    ) -> CameraStep {
        let from = self.cur;
        match actor.filter(|_| self.follows != 0) {
            Some(pos) => {
                if (self.cur.x - pos.x).abs() > speed.threshold_x
                    || (self.cur.y - pos.y).abs() > speed.threshold_y
                {
                    self.moving_to_actor = true;
                    if speed.threshold_x == 0 {
                        self.cur.x = pos.x;
                    }
                    if speed.threshold_y == 0 {
                        self.cur.y = pos.y;
                    }
                    bounds.clamp(&mut self.cur, true);
                }
                if self.moving_to_actor {
                    self.dest = pos;
                }
            }
            None => self.moving_to_actor = false,
        }

        bounds.clamp(&mut self.dest, true);

        if self.cur.x < self.dest.x {
            self.cur.x = (self.cur.x + speed.speed_x).min(self.dest.x);
        }
        if self.cur.x > self.dest.x {
            self.cur.x = (self.cur.x - speed.speed_x).max(self.dest.x);
        }
        if self.cur.y < self.dest.y {
            self.cur.y = (self.cur.y + speed.speed_y).min(self.dest.y);
        }
        if self.cur.y > self.dest.y {
            self.cur.y = (self.cur.y - speed.speed_y).max(self.dest.y);
        }

        if self.cur == self.dest {
            self.moving_to_actor = false;
            self.accel = CameraPoint::default();
            speed.speed_x = 0;
            speed.speed_y = 0;
        } else {
            self.accel.x += speed.accel_x;
            self.accel.y += speed.accel_y;
            speed.speed_x = (speed.speed_x + self.accel.x / 100).max(MIN_NEW_CAMERA_SPEED);
            speed.speed_y = (speed.speed_y + self.accel.y / 100).max(MIN_NEW_CAMERA_SPEED);
        }

        self.camera_moved(bounds, true);
        CameraStep {
            moved: self.cur != from,
            from,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bounds(room_width: i32) -> CameraBounds {
        CameraBounds {
            min_x: 160,
            max_x: room_width - 160,
            min_y: 100,
            max_y: 100,
            room_width,
            room_height: 200,
            screen_width: 320,
            screen_height: 200,
            fast: false,
        }
    }

    fn following_at(x: i32, b: &CameraBounds) -> CameraState {
        let mut camera = CameraState::default();
        camera.set_at(x, 0, b, false);
        camera.camera_moved(b, false);
        camera.follow(1);
        camera
    }

    fn at_strip(camera: &CameraState, strip: i32) -> Option<CameraPoint> {
        Some(CameraPoint {
            x: (camera.screen_start_strip + strip) * 8 + 4,
            y: 100,
        })
    }

    #[test]
    fn follow_hysteresis_band() {
        let b = bounds(960);
        let mut camera = following_at(480, &b);
        assert_eq!(camera.screen_start_strip, 40);

        let inside = at_strip(&camera, camera.left_trigger);
        let step = camera.step_classic(inside, &b);
        assert!(!step.moved);
        assert!(!camera.moving_to_actor);

        let outside = at_strip(&camera, camera.right_trigger + 1);
        let step = camera.step_classic(outside, &b);
        assert!(step.moved);
        assert!(camera.moving_to_actor);
        assert_eq!(camera.cur.x, 488);
    }

    #[test]
    fn band_edges_are_inclusive_mid_room() {
        let b = bounds(960);
        let mut camera = following_at(480, &b);

        let right_edge = at_strip(&camera, camera.right_trigger);
        assert!(!camera.step_classic(right_edge, &b).moved);
        assert_eq!(camera.cur.x, 480);

        let past_left = at_strip(&camera, camera.left_trigger - 1);
        let step = camera.step_classic(past_left, &b);
        assert!(step.moved);
        assert!(camera.moving_to_actor);
        assert_eq!((step.from.x, camera.cur.x), (480, 472));
    }

    #[test]
    fn left_edge_clamp_holds_camera_still() {
        let b = bounds(960);
        let mut camera = following_at(160, &b);
        let actor = at_strip(&camera, camera.left_trigger - 1);
        let step = camera.step_classic(actor, &b);
        assert!(!step.moved);
        assert_eq!(camera.cur.x, 160);
    }

    #[test]
    fn destination_tracks_moving_actor() {
        let b = bounds(960);
        let mut camera = following_at(160, &b);
        let mut actor_x = 440;
        for _ in 0..3 {
            camera.step_classic(Some(CameraPoint { x: actor_x, y: 0 }), &b);
            actor_x += 16;
        }
        assert!(camera.moving_to_actor);
        assert_eq!(camera.dest.x, 472);
        assert_eq!(camera.cur.x, 184);
    }

    #[test]
    fn fast_mode_snaps_to_destination() {
        let mut b = bounds(960);
        b.fast = true;
        let mut camera = CameraState::default();
        camera.set_at(160, 0, &b, false);
        camera.pan_to(600, 0);
        camera.step_classic(None, &b);
        assert_eq!(camera.cur.x, 600);
        assert_eq!(camera.screen_start_strip, 55);
        camera.pan_to(2000, 0);
        camera.step_classic(None, &b);
        assert_eq!(camera.cur.x, 800);
    }

    #[test]
    fn set_at_respects_follow_mode_and_clamps() {
        let b = bounds(960);
        let mut camera = following_at(300, &b);
        camera.set_at(400, 0, &b, false);
        assert_eq!((camera.cur.x, camera.dest.x), (300, 400));
        camera.set_at(900, 0, &b, false);
        assert_eq!(camera.cur.x, 800);
    }

    #[test]
    fn new_camera_accelerates_with_minimum_speed() {
        let mut b = bounds(2000);
        b.max_y = 500;
        let mut camera = CameraState::default();
        camera.set_at(160, 100, &b, true);
        camera.follow(1);
        let mut speed = CameraSpeed {
            threshold_x: 40,
            threshold_y: 40,
            accel_x: 300,
            ..CameraSpeed::default()
        };
        let actor = Some(CameraPoint { x: 1000, y: 100 });

        let step = camera.step_new(actor, &b, &mut speed);
        assert!(!step.moved);
        assert!(camera.moving_to_actor);
        assert_eq!(speed.speed_x, 8);

        camera.step_new(actor, &b, &mut speed);
        assert_eq!(camera.cur.x, 168);
        assert_eq!(speed.speed_x, 14);

        camera.step_new(actor, &b, &mut speed);
        assert_eq!(camera.cur.x, 182);
        assert_eq!(speed.speed_x, 23);
    }
}
