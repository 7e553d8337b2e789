//! The per-tick main loop: timers, input, scripts, actors, camera, talk,
//! palette and the frame and audio flush.

use log::{debug, trace};
use serde::{Deserialize, Serialize};

use crate::error::VmResult;
use crate::resources::ResourceKind;
use crate::verbs::VerbMode;

use super::ops_misc::CHAR_WIDTH;
use super::Vm;

/// Longest step the script delays see in one tick.
const MAX_DELTA: i32 = 15;

const VERB_CLICK_AREA: i32 = 1;
const SCENE_CLICK_AREA: i32 = 2;
const KEY_CLICK_AREA: i32 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MouseButton {
    Left,
    Right,
}

impl MouseButton {
    fn code(self) -> i32 {
        match self {
            MouseButton::Left => 1,
            MouseButton::Right => 2,
        }
    }
}

/// Host input, consumed at the start of the next tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InputEvent {
    MouseMove { x: i32, y: i32 },
    Click { x: i32, y: i32, button: MouseButton },
    Key { code: i32 },
}

/// Input left for the verb check after the scripts ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pending {
    Key(i32),
    Click { x: i32, y: i32, button: MouseButton },
}

impl Vm {
    pub fn queue_input(&mut self, event: InputEvent) {
        self.input.push_back(event);
    }

    pub fn set_paused(&mut self, paused: bool) {
        self.paused = paused;
    }

    /// Advances the game by `delta` jiffies.
    pub fn tick(&mut self, delta: i32) -> VmResult<()> {
        if self.paused || self.quit_requested {
            return Ok(());
        }
        let l = self.layout.clone();
        self.set_var(l.timer, delta);
        for timer in [l.tmr_1, l.tmr_2, l.tmr_3, l.tmr_4] {
            self.vars.add(timer, delta);
        }
        let delta = delta.clamp(0, MAX_DELTA);
        self.decrease_script_delay(delta);
        self.talk.talk_delay = (self.talk.talk_delay - delta).max(0);

        let pending = self.process_input()?;

        self.set_var(l.camera_pos_x, self.camera.cur.x);
        self.set_var(l.have_msg, self.talk.have_msg);

        self.run_all_scripts()?;
        if let Some(pending) = pending {
            self.check_exec_verbs(pending)?;
        }
        self.check_and_run_sentence_script()?;
        if self.quit_requested {
            return Ok(());
        }

        if self.room.number != 0 {
            let room = self.room.number;
            for actor in self.actors.iter_mut() {
                if actor.is_in_room(room) {
                    actor.walk_tick(&self.boxes);
                }
            }
            self.move_camera()?;
            self.objects.update_states();
            self.process_talk()?;
            for actor in self.actors.iter_mut() {
                if actor.is_in_room(room) {
                    actor.animate_costume();
                }
            }
        } else {
            self.process_talk()?;
        }

        self.handle_effects(delta);
        self.flush_frame();
        self.flush_sound();

        self.resources.tick_expire();
        self.ticks += 1;
        trace!("tick {} done", self.ticks);
        Ok(())
    }

    /// Drains queued input into the mouse and key variables. Returns the
    /// last click or key the verb check should see.
    fn process_input(&mut self) -> VmResult<Option<Pending>> {
        let mut pending = None;
        while let Some(event) = self.input.pop_front() {
            match event {
                InputEvent::MouseMove { x, y } => self.set_mouse(x, y),
                InputEvent::Click { x, y, button } => {
                    self.set_mouse(x, y);
                    pending = Some(Pending::Click { x, y, button });
                }
                InputEvent::Key { code } => {
                    self.set_var(self.layout.keypress, code);
                    if self.layout.cutsceneexit_key.is_some()
                        && code == self.var(self.layout.cutsceneexit_key)
                    {
                        debug!("cutscene exit key");
                        self.abort_cutscene()?;
                        continue;
                    }
                    if self.layout.talkstop_key.is_some()
                        && code == self.var(self.layout.talkstop_key)
                    {
                        self.talk.talk_delay = 0;
                        continue;
                    }
                    pending = Some(Pending::Key(code));
                }
            }
        }
        Ok(pending)
    }

    fn set_mouse(&mut self, x: i32, y: i32) {
        let l = &self.layout;
        let (mouse_x, mouse_y, virt_x, virt_y) = (l.mouse_x, l.mouse_y, l.virt_mouse_x, l.virt_mouse_y);
        let left = self.camera.cur.x - self.traits.screen_width / 2;
        self.set_var(mouse_x, x);
        self.set_var(mouse_y, y);
        self.set_var(virt_x, x + left);
        self.set_var(virt_y, y - self.screen.top);
    }

    /// Verb slot under the pointer; later slots win.
    pub(crate) fn verb_at(&self, x: i32, y: i32) -> usize {
        self.verbs
            .iter()
            .filter(|(_, vs)| vs.verb_id != 0 && vs.mode == VerbMode::On && vs.save_id == 0)
            .filter(|(slot, vs)| {
                let width = self
                    .resources
                    .peek(ResourceKind::Verb, *slot as u16)
                    .map_or(0, |name| self.text_width(name));
                x >= vs.x && x < vs.x + width && y >= vs.y && y < vs.y + CHAR_WIDTH
            })
            .map(|(slot, _)| slot)
            .last()
            .unwrap_or(0)
    }

    fn check_exec_verbs(&mut self, pending: Pending) -> VmResult<()> {
        if self.cursor.userput <= 0 {
            return Ok(());
        }
        match pending {
            Pending::Key(code) => match self.verbs.find_by_key(code) {
                Some(slot) => {
                    let verb = self.verbs.get(slot)?.verb_id;
                    self.run_input_script(VERB_CLICK_AREA, verb, 1)
                }
                None => self.run_input_script(KEY_CLICK_AREA, code, 1),
            },
            Pending::Click { x, y, button } => {
                let slot = self.verb_at(x, y);
                if slot != 0 {
                    let verb = self.verbs.get(slot)?.verb_id;
                    return self.run_input_script(VERB_CLICK_AREA, verb, button.code());
                }
                let in_room_view = y >= self.screen.top && y < self.screen.top + self.screen.height;
                let area = if in_room_view { SCENE_CLICK_AREA } else { VERB_CLICK_AREA };
                self.run_input_script(area, 0, button.code())
            }
        }
    }

    fn run_input_script(&mut self, area: i32, command: i32, mode: i32) -> VmResult<()> {
        let script = self.var(self.layout.verb_script);
        if script <= 0 {
            return Ok(());
        }
        debug!("input area {area} command {command} mode {mode}");
        self.run_script(script as u16, false, false, &[area, command, mode])
    }

    fn handle_effects(&mut self, delta: i32) {
        if self.full_redraw {
            self.screen.mark_all_dirty();
            self.full_redraw = false;
        }
        if self.effects.do_effect {
            debug!("room transition effect {}", self.effects.new_effect);
            self.screen.mark_all_dirty();
            self.effects.do_effect = false;
        }
        self.palette.cycle_palette(delta);
        self.palette.pal_manipulate();
    }

    fn flush_frame(&mut self) {
        if let Some((first, rgb)) = self.palette.take_dirty_upload() {
            self.frame_sink.palette(first, &rgb);
        }
        let sent = self.screen.flush(self.frame_sink.as_mut());
        if sent > 0 {
            trace!("flushed {sent} dirty rects");
        }
    }

    fn flush_sound(&mut self) {
        let resources = &mut self.resources;
        let last = self.sound.drain(self.audio_sink.as_mut(), |sound| {
            u16::try_from(sound)
                .ok()
                .and_then(|id| resources.get(ResourceKind::Sound, id).ok().flatten())
                .is_some()
        });
        if let Some(sound) = last {
            self.set_var(self.layout.last_sound, sound);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{AudioEvent, RecordingAudioSink};
    use crate::display::{FrameEvent, RecordingFrameSink};
    use crate::verbs::VerbSlot;
    use crate::vm::test_support::VmBuilder;
    use crate::vm::SlotStatus;

    #[test]
    fn delay_wakes_on_the_last_tick() {
        // delay 45; move var 100 = 1; stop
        let mut vm = VmBuilder::v5()
            .script(1, &[0x2E, 45, 0, 0, 0x1A, 100, 0, 1, 0, 0x00])
            .build();
        vm.run_script(1, false, false, &[]).unwrap();
        let parked = |vm: &Vm| {
            let slot = vm.slots().iter().find(|s| s.number == 1 && s.is_live()).unwrap();
            (slot.status, slot.pc)
        };
        let (status, pc) = parked(&vm);
        assert_eq!(status, SlotStatus::Paused);
        for _ in 0..44 {
            vm.tick(1).unwrap();
        }
        assert_eq!(parked(&vm), (SlotStatus::Paused, pc));
        assert_eq!(vm.vars().get(100).unwrap(), 0);
        vm.tick(1).unwrap();
        assert_eq!(vm.vars().get(100).unwrap(), 1);
        assert!(!vm.is_script_running(1));
    }

    #[test]
    fn timers_advance_and_delta_is_clamped() {
        let mut vm = VmBuilder::v5()
            .script(1, &[0x2E, 20, 0, 0, 0x00])
            .build();
        vm.run_script(1, false, false, &[]).unwrap();
        vm.tick(40).unwrap();
        assert_eq!(vm.vars().get(46).unwrap(), 40);
        assert_eq!(vm.vars().get(11).unwrap(), 40);
        assert_eq!(vm.slots().iter().find(|s| s.number == 1).unwrap().delay, 5);
    }

    #[test]
    fn talk_expires_after_its_delay() {
        let mut vm = VmBuilder::v5()
            .script(1, &[0x14, 0xFF, 0x0F, b'h', b'i', 0x00, 0x00])
            .build();
        vm.run_script(1, false, false, &[]).unwrap();
        vm.tick(1).unwrap();
        assert_eq!(vm.talk().have_msg, 1);
        assert_eq!(vm.talk().talk_delay, 68);
        for _ in 0..67 {
            vm.tick(1).unwrap();
        }
        assert_eq!(vm.talk().have_msg, 1);
        vm.tick(1).unwrap();
        assert_eq!(vm.talk().have_msg, 0);
        vm.tick(1).unwrap();
        assert_eq!(vm.vars().get(3).unwrap(), 0);
    }

    #[test]
    fn talk_stop_key_cuts_the_delay() {
        let mut vm = VmBuilder::v5()
            .script(1, &[0x14, 0xFF, 0x0F, b'h', b'i', 0x00, 0x00])
            .build();
        vm.vars_mut().set(57, 46).unwrap();
        vm.run_script(1, false, false, &[]).unwrap();
        vm.tick(1).unwrap();
        vm.queue_input(InputEvent::Key { code: 46 });
        vm.tick(1).unwrap();
        assert_eq!(vm.talk().have_msg, 0);
    }

    #[test]
    fn clicks_run_the_verb_script() {
        // var 100 = area, var 101 = command, var 102 = mode
        let mut vm = VmBuilder::v5()
            .script(
                5,
                &[
                    0x9A, 100, 0, 0x00, 0x40, //
                    0x9A, 101, 0, 0x01, 0x40, //
                    0x9A, 102, 0, 0x02, 0x40, 0x00,
                ],
            )
            .build();
        vm.vars_mut().set(32, 5).unwrap();
        vm.cursor.userput = 1;
        *vm.verbs.get_mut(1).unwrap() = VerbSlot {
            verb_id: 20,
            mode: VerbMode::On,
            x: 0,
            y: 150,
            ..VerbSlot::default()
        };
        vm.resources.create(ResourceKind::Verb, 1, b"Go\0".to_vec());

        vm.queue_input(InputEvent::Click {
            x: 4,
            y: 152,
            button: MouseButton::Right,
        });
        vm.tick(1).unwrap();
        assert_eq!(vm.vars().get(100).unwrap(), VERB_CLICK_AREA);
        assert_eq!(vm.vars().get(101).unwrap(), 20);
        assert_eq!(vm.vars().get(102).unwrap(), 2);
        assert_eq!(vm.vars().get(44).unwrap(), 4);

        vm.queue_input(InputEvent::Click {
            x: 100,
            y: 50,
            button: MouseButton::Left,
        });
        vm.tick(1).unwrap();
        assert_eq!(vm.vars().get(100).unwrap(), SCENE_CLICK_AREA);
        assert_eq!(vm.vars().get(101).unwrap(), 0);
        assert_eq!(vm.vars().get(102).unwrap(), 1);

        vm.queue_input(InputEvent::Key { code: b'x' as i32 });
        vm.tick(1).unwrap();
        assert_eq!(vm.vars().get(100).unwrap(), KEY_CLICK_AREA);
        assert_eq!(vm.vars().get(101).unwrap(), b'x' as i32);
    }

    #[test]
    fn input_is_ignored_without_userput() {
        let mut vm = VmBuilder::v5()
            .script(5, &[0x1A, 100, 0, 1, 0, 0x00])
            .build();
        vm.vars_mut().set(32, 5).unwrap();
        vm.queue_input(InputEvent::Key { code: 13 });
        vm.tick(1).unwrap();
        assert_eq!(vm.vars().get(100).unwrap(), 0);
        assert_eq!(vm.vars().get(0).unwrap(), 13);
    }

    #[test]
    fn first_tick_uploads_palette_and_redraws() {
        let frames = RecordingFrameSink::new();
        let mut vm = VmBuilder::v5().build();
        vm.frame_sink = Box::new(frames.clone());
        vm.palette.set_dirty(0, 15);
        vm.tick(1).unwrap();
        let events = frames.events();
        assert!(matches!(
            events.first(),
            Some(FrameEvent::Palette { first: 0, count: 16 })
        ));
        assert!(events.iter().any(|e| matches!(e, FrameEvent::Blit { .. })));

        vm.tick(1).unwrap();
        assert_eq!(frames.events().len(), events.len());
    }

    #[test]
    fn queued_sounds_reach_the_sink() {
        let audio = RecordingAudioSink::new();
        let mut builder = VmBuilder::v5();
        builder.source.insert(ResourceKind::Sound, 3, vec![1, 2, 3]);
        let mut vm = builder.build();
        vm.audio_sink = Box::new(audio.clone());
        vm.sound.start(3);
        vm.sound.start(4);
        vm.tick(1).unwrap();
        assert_eq!(audio.events(), vec![AudioEvent::Play { sound: 3 }]);
        assert_eq!(vm.vars().get(23).unwrap(), 3);
    }

    #[test]
    fn paused_vm_does_not_advance() {
        let mut vm = VmBuilder::v5().build();
        vm.set_paused(true);
        vm.tick(1).unwrap();
        assert_eq!(vm.ticks(), 0);
        vm.set_paused(false);
        vm.tick(1).unwrap();
        assert_eq!(vm.ticks(), 1);
    }
}
