//! Text output, the cursor, verbs, sound requests and `drawBox`.

use log::{debug, warn};
use scumm_formats::Rect;

use crate::error::{FatalError, VmResult};
use crate::resources::ResourceKind;
use crate::verbs::{VerbKind, VerbMode, VerbSlot};

use super::fetch::{PARAM_1, PARAM_2, PARAM_3};
use super::{UserMessage, Vm, NO_ACTOR};

/// Width of one character cell; charset metrics are not modelled.
pub(super) const CHAR_WIDTH: i32 = 8;
const TALK_DELAY_BASE: i32 = 60;

/// Print target picked by the actor operand of `print`.
fn text_slot_for(actor: i32) -> usize {
    match actor {
        252 => 3,
        253 => 2,
        254 => 1,
        _ => 0,
    }
}

/// Screen area covered by `text` drawn from `(x, y)`, one cell per char.
fn text_extent(x: i32, y: i32, text: &str) -> Rect {
    let (lines, widest) = text.split('\n').fold((0, 0), |(lines, widest), line| {
        (lines + 1, widest.max(line.chars().count() as i32))
    });
    Rect::new(x, y, x + widest * CHAR_WIDTH, y + lines * CHAR_WIDTH)
}

/// Whether escape `code` carries a two-byte argument.
fn escape_has_arg(code: u8) -> bool {
    !matches!(code, 1 | 2 | 3 | 8)
}

impl Vm {
    /// Rendered width of a message, skipping escape sequences.
    pub(crate) fn text_width(&self, text: &[u8]) -> i32 {
        let mut width = 0;
        let mut i = 0;
        while i < text.len() {
            let byte = text[i];
            i += 1;
            if byte == 0 {
                break;
            }
            if byte == 0xFF || byte == 0xFE {
                let code = text.get(i).copied().unwrap_or(0);
                i += 1;
                if escape_has_arg(code) {
                    i += 2;
                }
                continue;
            }
            width += CHAR_WIDTH;
        }
        width
    }

    /// Expands the escape codes of a script message. Returns the text and
    /// whether the message asked to keep the previous text on screen.
    pub(crate) fn convert_message(&mut self, msg: &[u8]) -> VmResult<(String, bool)> {
        let mut out = Vec::with_capacity(msg.len());
        let mut keep = false;
        let mut i = 0;
        while i < msg.len() {
            let byte = msg[i];
            i += 1;
            if byte == 0 {
                break;
            }
            if byte != 0xFF && byte != 0xFE {
                out.push(byte);
                continue;
            }
            let code = msg.get(i).copied().unwrap_or(0);
            i += 1;
            let arg = if escape_has_arg(code) {
                let lo = msg.get(i).copied().unwrap_or(0) as u16;
                let hi = msg.get(i + 1).copied().unwrap_or(0) as u16;
                i += 2;
                lo | hi << 8
            } else {
                0
            };
            match code {
                1 | 3 => out.push(b'\n'),
                2 => {
                    keep = true;
                    break;
                }
                4 => {
                    let value = self.read_var(arg)?;
                    out.extend_from_slice(value.to_string().as_bytes());
                }
                5 => {
                    let verb = self.read_var(arg)?;
                    let slot = self.verbs.find(verb, 0);
                    if slot != 0 {
                        if let Some(name) = self.resources.get(ResourceKind::Verb, slot as u16)? {
                            out.extend(name.iter().take_while(|&&b| b != 0));
                        }
                    }
                }
                6 => {
                    let actor = self.read_var(arg)?;
                    if self.actors.is_valid(actor) {
                        if let Some(name) = self.resources.get(ResourceKind::ActorName, actor as u16)? {
                            out.extend(name.iter().take_while(|&&b| b != 0));
                        }
                    }
                }
                7 => {
                    let id = self.read_var(arg)?;
                    if let Ok(id) = u16::try_from(id) {
                        if let Some(text) = self.resources.get(ResourceKind::String, id)? {
                            out.extend(text.iter().take_while(|&&b| b != 0));
                        }
                    }
                }
                _ => debug!("message escape {code} ignored"),
            }
        }
        Ok((String::from_utf8_lossy(&out).into_owned(), keep))
    }

    pub(super) fn op_print(&mut self, is_ego: bool) -> VmResult<()> {
        let actor = if is_ego {
            self.ego() & 0xFF
        } else {
            self.get_var_or_direct_byte(PARAM_1)?
        };
        self.decode_parse_string(actor)
    }

    fn decode_parse_string(&mut self, actor: i32) -> VmResult<()> {
        let slot = text_slot_for(actor);
        self.text_slots[slot].load_default();
        loop {
            self.opcode = self.fetch_byte()?;
            if self.opcode == 0xFF {
                break;
            }
            match self.opcode & 0x0F {
                0 => {
                    let x = self.get_var_or_direct_word(PARAM_1)?;
                    let y = self.get_var_or_direct_word(PARAM_2)?;
                    let style = &mut self.text_slots[slot].current;
                    style.x = x;
                    style.y = y;
                    style.overhead = false;
                }
                1 => {
                    let color = self.get_var_or_direct_byte(PARAM_1)?;
                    self.text_slots[slot].current.color = color;
                }
                2 => {
                    let right = self.get_var_or_direct_word(PARAM_1)?;
                    self.text_slots[slot].current.right = right;
                }
                4 => {
                    let style = &mut self.text_slots[slot].current;
                    style.center = true;
                    style.overhead = false;
                }
                6 => {
                    let style = &mut self.text_slots[slot].current;
                    style.center = false;
                    style.overhead = false;
                }
                7 => self.text_slots[slot].current.overhead = true,
                8 => {
                    let offset = self.get_var_or_direct_word(PARAM_1)?;
                    let delay = self.get_var_or_direct_word(PARAM_2)?;
                    debug!("print: CD speech at {offset} for {delay} ignored");
                }
                15 => {
                    let msg = self.fetch_inline_string()?;
                    return self.print_string(slot, actor, &msg);
                }
                _ => {
                    return Err(FatalError::UnknownSubOpcode {
                        op: "print",
                        sub: self.opcode,
                    })
                }
            }
        }
        self.text_slots[slot].save_default();
        Ok(())
    }

    fn print_string(&mut self, slot: usize, actor: i32, msg: &[u8]) -> VmResult<()> {
        let (text, keep) = self.convert_message(msg)?;
        match slot {
            0 => self.actor_talk(actor, text, keep),
            1 => {
                let style = self.text_slots[1].current;
                self.screen.add_text_mask(text_extent(style.x, style.y, &text));
                self.frame_sink.text(style.x, style.y, style.color, &text);
                Ok(())
            }
            2 => {
                debug!("script {}: {text}", self.script_number());
                Ok(())
            }
            _ => {
                self.messages.push(UserMessage::Dialog(text));
                Ok(())
            }
        }
    }

    /// Hands a line to the talk system. It is shown by the next tick and
    /// stays up for the talk delay.
    pub(crate) fn actor_talk(&mut self, actor: i32, text: String, keep: bool) -> VmResult<()> {
        let previous = std::mem::take(&mut self.talk.text);
        let kept = self.talk.keep_text;
        if !kept {
            self.stop_talk()?;
        }
        let speaker = if actor == NO_ACTOR {
            NO_ACTOR
        } else {
            let room = self.room.number;
            let a = self.actors.get_mut(actor)?;
            if a.is_in_room(room) {
                let frame = a.talk_start_frame;
                a.start_anim(frame);
            }
            actor
        };
        self.talk.talk_actor = speaker;
        self.set_var(self.layout.talk_actor, speaker);
        self.talk.text = if kept { previous + &text } else { text };
        self.talk.keep_text = keep;
        self.talk.talk_delay = 0;
        self.talk.have_msg = 0xFF;
        self.set_var(self.layout.have_msg, 0xFF);
        debug!("actor {speaker} says {:?}", self.talk.text);
        Ok(())
    }

    /// Shows a pending line and expires a shown one once its delay ran out.
    pub(crate) fn process_talk(&mut self) -> VmResult<()> {
        if self.talk.have_msg == 0 || self.talk.talk_delay > 0 {
            return Ok(());
        }
        if self.talk.have_msg == 1 {
            if !self.talk.keep_text {
                self.stop_talk()?;
            }
            return Ok(());
        }

        let style = self.text_slots[0].current;
        let (x, y, color) = match self.actors.get(self.talk.talk_actor) {
            Ok(actor) if self.talk.talk_actor != NO_ACTOR => (
                actor.x + actor.talk_pos_x,
                actor.y + actor.talk_pos_y,
                actor.talk_color,
            ),
            _ => (style.x, style.y, style.color),
        };
        let chars = self.talk.text.chars().filter(|c| *c != '\n').count() as i32;
        self.talk.talk_delay = TALK_DELAY_BASE + chars * self.var(self.layout.charinc);
        let view_left = self.camera.cur.x - self.traits.screen_width / 2;
        self.screen.add_text_mask(text_extent(x - view_left, y, &self.talk.text));
        self.frame_sink.text(x, y, color, &self.talk.text);
        self.talk.have_msg = 1;
        Ok(())
    }

    pub(super) fn op_cursor_command(&mut self) -> VmResult<()> {
        self.opcode = self.fetch_byte()?;
        match self.opcode & 0x1F {
            1 => self.cursor.state = 1,
            2 => self.cursor.state = 0,
            3 => self.cursor.userput = 1,
            4 => self.cursor.userput = 0,
            5 => self.cursor.state += 1,
            6 => self.cursor.state -= 1,
            7 => self.cursor.userput += 1,
            8 => self.cursor.userput -= 1,
            10 => {
                let cursor = self.get_var_or_direct_byte(PARAM_1)?;
                let letter = self.get_var_or_direct_byte(PARAM_2)?;
                self.cursor.image = letter;
                debug!("cursor {cursor} drawn with letter {letter}");
            }
            11 => {
                let cursor = self.get_var_or_direct_byte(PARAM_1)?;
                let x = self.get_var_or_direct_byte(PARAM_2)?;
                let y = self.get_var_or_direct_byte(PARAM_3)?;
                self.cursor.hotspot = (x, y);
                debug!("cursor {cursor} hotspot at {x},{y}");
            }
            12 => {
                let cursor = self.get_var_or_direct_byte(PARAM_1)?;
                if !(0..=3).contains(&cursor) {
                    return Err(FatalError::InvalidIndex {
                        table: "cursor",
                        index: cursor,
                    });
                }
                self.cursor.current = cursor;
            }
            13 => {
                let charset = self.get_var_or_direct_byte(PARAM_1)?;
                self.init_charset(charset)?;
            }
            14 => {
                let colors = self.get_word_vararg()?;
                for (i, entry) in self.cursor.charset_colors.iter_mut().enumerate() {
                    *entry = colors.get(i).copied().unwrap_or(0) as u8;
                }
            }
            _ => {
                return Err(FatalError::UnknownSubOpcode {
                    op: "cursorCommand",
                    sub: self.opcode,
                })
            }
        }
        self.set_var(self.layout.cursorstate, self.cursor.state);
        self.set_var(self.layout.userput, self.cursor.userput);
        Ok(())
    }

    fn init_charset(&mut self, charset: i32) -> VmResult<()> {
        let id = u16::try_from(charset).map_err(|_| FatalError::InvalidIndex {
            table: "charset",
            index: charset,
        })?;
        if self.resources.get(ResourceKind::Charset, id)?.is_none() {
            warn!("charset {charset} has no data");
        }
        self.cursor.charset = charset;
        for slot in self.text_slots.iter_mut() {
            slot.default.charset = charset;
            slot.current.charset = charset;
        }
        Ok(())
    }

    pub(super) fn op_verb_ops(&mut self) -> VmResult<()> {
        let verb = self.get_var_or_direct_byte(PARAM_1)?;
        let mut slot = self.verbs.find(verb, 0);
        self.verbs.get_mut(slot)?.verb_id = verb;

        loop {
            self.opcode = self.fetch_byte()?;
            if self.opcode == 0xFF {
                break;
            }
            match self.opcode & 0x1F {
                1 => {
                    let obj = self.get_var_or_direct_word(PARAM_1)?;
                    if slot != 0 {
                        let vs = self.verbs.get_mut(slot)?;
                        vs.image_object = obj;
                        vs.kind = VerbKind::Image;
                    }
                }
                2 => {
                    let name = self.fetch_inline_string()?;
                    self.set_verb_name(slot, Some(name))?;
                }
                3 => {
                    let value = self.get_var_or_direct_byte(PARAM_1)?;
                    self.verbs.get_mut(slot)?.color = value;
                }
                4 => {
                    let value = self.get_var_or_direct_byte(PARAM_1)?;
                    self.verbs.get_mut(slot)?.hicolor = value;
                }
                5 => {
                    let x = self.get_var_or_direct_word(PARAM_1)?;
                    let y = self.get_var_or_direct_word(PARAM_2)?;
                    let vs = self.verbs.get_mut(slot)?;
                    vs.x = x;
                    vs.y = y;
                }
                6 => self.verbs.get_mut(slot)?.mode = VerbMode::On,
                7 => self.verbs.get_mut(slot)?.mode = VerbMode::Off,
                8 => self.kill_verb(slot),
                9 => {
                    slot = self.verbs.find(verb, 0);
                    if slot == 0 {
                        slot = self.verbs.free_slot();
                        if slot == 0 {
                            return Err(FatalError::InvalidIndex {
                                table: "verb",
                                index: self.verbs.len() as i32,
                            });
                        }
                    }
                    *self.verbs.get_mut(slot)? = VerbSlot {
                        verb_id: verb,
                        color: 2,
                        dimcolor: 8,
                        ..VerbSlot::default()
                    };
                }
                16 => {
                    let value = self.get_var_or_direct_byte(PARAM_1)?;
                    self.verbs.get_mut(slot)?.dimcolor = value;
                }
                17 => self.verbs.get_mut(slot)?.mode = VerbMode::Dimmed,
                18 => {
                    let value = self.get_var_or_direct_byte(PARAM_1)?;
                    self.verbs.get_mut(slot)?.key = value;
                }
                19 => self.verbs.get_mut(slot)?.center = true,
                20 => {
                    let id = self.get_var_or_direct_word(PARAM_1)?;
                    let name = match u16::try_from(id) {
                        Ok(id) => self
                            .resources
                            .get(ResourceKind::String, id)?
                            .map(|bytes| bytes.to_vec()),
                        Err(_) => None,
                    };
                    self.set_verb_name(slot, name)?;
                }
                22 => {
                    let obj = self.get_var_or_direct_word(PARAM_1)?;
                    let room = self.get_var_or_direct_byte(PARAM_2)?;
                    let vs = self.verbs.get_mut(slot)?;
                    if slot != 0 && vs.image_object != obj {
                        vs.image_object = obj;
                        vs.kind = VerbKind::Image;
                        debug!("verb {verb} shows object {obj} of room {room}");
                    }
                }
                23 => {
                    let value = self.get_var_or_direct_byte(PARAM_1)?;
                    self.verbs.get_mut(slot)?.bkcolor = value;
                }
                _ => {
                    return Err(FatalError::UnknownSubOpcode {
                        op: "verbOps",
                        sub: self.opcode,
                    })
                }
            }
        }
        self.draw_verb(slot);
        Ok(())
    }

    /// Stores or clears a verb's text. The scratch slot never keeps one.
    fn set_verb_name(&mut self, slot: usize, name: Option<Vec<u8>>) -> VmResult<()> {
        match name {
            Some(name) if slot != 0 => {
                self.resources.create(ResourceKind::Verb, slot as u16, name);
            }
            _ => self.resources.nuke(ResourceKind::Verb, slot as u16),
        }
        let vs = self.verbs.get_mut(slot)?;
        vs.kind = VerbKind::Text;
        vs.image_object = 0;
        Ok(())
    }

    fn kill_verb(&mut self, slot: usize) {
        if self.verbs.kill(slot) {
            self.resources.nuke(ResourceKind::Verb, slot as u16);
        }
    }

    fn draw_verb(&mut self, slot: usize) {
        let Ok(vs) = self.verbs.get(slot) else {
            return;
        };
        if slot == 0 || vs.mode == VerbMode::Off || vs.save_id != 0 {
            return;
        }
        let width = self
            .resources
            .peek(ResourceKind::Verb, slot as u16)
            .map_or(0, |name| self.text_width(name));
        let rect = Rect::new(vs.x, vs.y, vs.x + width, vs.y + CHAR_WIDTH);
        self.screen.mark_dirty(rect);
    }

    pub(super) fn op_save_restore_verbs(&mut self) -> VmResult<()> {
        self.opcode = self.fetch_byte()?;
        let first = self.get_var_or_direct_byte(PARAM_1)?;
        let last = self.get_var_or_direct_byte(PARAM_2)?;
        let save_id = self.get_var_or_direct_byte(PARAM_3)?;
        match self.opcode & 0x1F {
            1 => {
                for verb in first..=last {
                    let slot = self.verbs.find(verb, 0);
                    if slot != 0 {
                        self.verbs.get_mut(slot)?.save_id = save_id;
                        self.draw_verb(slot);
                    }
                }
            }
            2 => {
                for verb in first..=last {
                    let slot = self.verbs.find(verb, save_id);
                    if slot == 0 {
                        continue;
                    }
                    let active = self.verbs.find(verb, 0);
                    if active != 0 {
                        self.kill_verb(active);
                    }
                    self.verbs.get_mut(slot)?.save_id = 0;
                    self.draw_verb(slot);
                }
            }
            3 => {
                for verb in first..=last {
                    let slot = self.verbs.find(verb, save_id);
                    if slot != 0 {
                        self.kill_verb(slot);
                    }
                }
            }
            _ => {
                return Err(FatalError::UnknownSubOpcode {
                    op: "saveRestoreVerbs",
                    sub: self.opcode,
                })
            }
        }
        Ok(())
    }

    pub(super) fn op_start_sound(&mut self) -> VmResult<()> {
        let sound = self.get_var_or_direct_byte(PARAM_1)?;
        self.set_var(self.layout.music_timer, 0);
        self.sound.start(sound);
        Ok(())
    }

    pub(super) fn op_start_music(&mut self) -> VmResult<()> {
        let sound = self.get_var_or_direct_byte(PARAM_1)?;
        self.sound.start(sound);
        Ok(())
    }

    pub(super) fn op_stop_sound(&mut self) -> VmResult<()> {
        let sound = self.get_var_or_direct_byte(PARAM_1)?;
        self.sound.stop(sound);
        Ok(())
    }

    pub(super) fn op_stop_music(&mut self) -> VmResult<()> {
        self.sound.stop_all();
        Ok(())
    }

    pub(super) fn op_is_sound_running(&mut self) -> VmResult<()> {
        self.get_result_pos()?;
        let sound = self.get_var_or_direct_byte(PARAM_1)?;
        let running = sound != 0 && self.sound.is_running(sound, self.audio_sink.as_ref());
        self.set_result(running as i32)
    }

    pub(super) fn op_sound_kludge(&mut self) -> VmResult<()> {
        let args = self.get_word_vararg()?;
        self.sound.kludge(args);
        Ok(())
    }

    pub(super) fn op_draw_box(&mut self) -> VmResult<()> {
        let x = self.get_var_or_direct_word(PARAM_1)?;
        let y = self.get_var_or_direct_word(PARAM_2)?;
        self.opcode = self.fetch_byte()?;
        let x2 = self.get_var_or_direct_word(PARAM_1)?;
        let y2 = self.get_var_or_direct_word(PARAM_2)?;
        let color = self.get_var_or_direct_byte(PARAM_3)?;

        // Corners are inclusive and may come in either order.
        let rect = Rect::new(x.min(x2), y.min(y2), x.max(x2) + 1, y.max(y2) + 1);
        self.screen.fill_rect(rect, color as u8);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::audio::{AudioEvent, RecordingAudioSink};
    use crate::display::{FrameEvent, NullFrameSink, RecordingFrameSink};
    use crate::error::FatalError;
    use crate::resources::ResourceKind;
    use crate::verbs::{VerbKind, VerbMode};
    use crate::vm::test_support::VmBuilder;
    use crate::vm::{UserMessage, Vm};

    fn run(vm: &mut Vm) {
        vm.run_script(1, false, false, &[]).unwrap();
    }

    #[test]
    fn width_skips_escape_codes() {
        let vm = VmBuilder::v5().build();
        assert_eq!(vm.text_width(b"abc"), 24);
        assert_eq!(vm.text_width(&[b'a', 0xFF, 0x04, 0x05, 0x00, b'b']), 16);
        assert_eq!(vm.text_width(&[b'a', 0xFF, 0x01, b'b', 0x00, b'c']), 16);
    }

    #[test]
    fn messages_expand_variables_and_names() {
        let mut vm = VmBuilder::v5().build();
        vm.vars_mut().set(10, 42).unwrap();
        vm.vars_mut().set(11, 3).unwrap();
        vm.resources_mut()
            .create(ResourceKind::ActorName, 3, b"Guybrush\0".to_vec());
        let (text, keep) = vm
            .convert_message(&[b'#', 0xFF, 0x04, 0x0A, 0x00, b' ', 0xFF, 0x06, 0x0B, 0x00, 0xFF, 0x01, b'!'])
            .unwrap();
        assert_eq!(text, "#42 Guybrush\n!");
        assert!(!keep);

        let (text, keep) = vm.convert_message(&[b'a', 0xFF, 0x02, b'b']).unwrap();
        assert_eq!(text, "a");
        assert!(keep);
    }

    #[test]
    fn print_talks_then_expires() {
        let frames = RecordingFrameSink::new();
        let mut vm = VmBuilder::v5()
            .script(1, &[0x14, 0x02, 0x0F, b'h', b'i', 0x00, 0x00])
            .build();
        vm.frame_sink = Box::new(frames.clone());
        run(&mut vm);
        assert_eq!(vm.talk().have_msg, 0xFF);
        assert_eq!(vm.talk().talk_actor, 2);
        assert_eq!(vm.talk().text, "hi");
        assert_eq!(vm.vars().get(3).unwrap(), 0xFF);

        vm.process_talk().unwrap();
        assert_eq!(vm.talk().have_msg, 1);
        assert_eq!(vm.talk().talk_delay, 60 + 2 * 4);
        assert!(frames
            .events()
            .iter()
            .any(|e| matches!(e, FrameEvent::Text { text, .. } if text == "hi")));

        vm.talk.talk_delay = 0;
        vm.process_talk().unwrap();
        assert_eq!(vm.talk().have_msg, 0);
        assert!(vm.talk().text.is_empty());
    }

    #[test]
    fn print_styles_persist_as_defaults() {
        // print(254) at 10,20 color 7, then print(254) text
        let frames = RecordingFrameSink::new();
        let mut vm = VmBuilder::v5()
            .script(
                1,
                &[
                    0x14, 0xFE, 0x00, 0x0A, 0x00, 0x14, 0x00, 0x01, 0x07, 0xFF, //
                    0x14, 0xFE, 0x0F, b'o', b'k', 0x00, 0x00,
                ],
            )
            .build();
        vm.frame_sink = Box::new(frames.clone());
        run(&mut vm);
        assert_eq!(
            frames.events(),
            vec![FrameEvent::Text {
                x: 10,
                y: 20,
                color: 7,
                text: "ok".into()
            }]
        );
    }

    #[test]
    fn dialog_text_reaches_the_user() {
        let mut vm = VmBuilder::v5()
            .script(1, &[0x14, 0xFC, 0x0F, b'S', b'a', b'v', b'e', b'd', 0x00, 0x00])
            .build();
        vm.frame_sink = Box::new(NullFrameSink);
        run(&mut vm);
        assert_eq!(vm.take_messages(), vec![UserMessage::Dialog("Saved".into())]);
    }

    #[test]
    fn cursor_counters_mirror_into_variables() {
        // cursor on, userput soft on twice, cursor set 2
        let mut vm = VmBuilder::v5()
            .script(1, &[0x2C, 0x01, 0x2C, 0x07, 0x2C, 0x07, 0x2C, 0x0C, 0x02, 0x00])
            .build();
        run(&mut vm);
        assert_eq!(vm.cursor().state, 1);
        assert_eq!(vm.cursor().userput, 2);
        assert_eq!(vm.cursor().current, 2);
        let layout = vm.layout().clone();
        assert_eq!(vm.var(layout.cursorstate), 1);
        assert_eq!(vm.var(layout.userput), 2);

        let mut vm = VmBuilder::v5().script(1, &[0x2C, 0x0C, 0x07]).build();
        let err = vm.run_script(1, false, false, &[]).unwrap_err();
        assert!(matches!(err, FatalError::InvalidIndex { table: "cursor", index: 7 }));
    }

    #[test]
    fn verbs_are_created_named_and_saved() {
        // verbOps 20: new, name "Open", at 8,150, on
        let mut vm = VmBuilder::v5()
            .script(
                1,
                &[
                    0x7A, 0x14, 0x09, 0x02, b'O', b'p', b'e', b'n', 0x00, 0x05, 0x08, 0x00, 0x96, 0x00,
                    0x06, 0xFF, //
                    0xAB, 0x01, 0x14, 0x14, 0x03, // save verbs 20..20 as 3
                    0x00,
                ],
            )
            .build();
        run(&mut vm);
        let slot = vm.verbs().find(20, 3);
        assert_ne!(slot, 0);
        let verb = vm.verbs().get(slot).unwrap();
        assert_eq!((verb.x, verb.y, verb.mode, verb.kind), (8, 150, VerbMode::On, VerbKind::Text));
        assert_eq!(verb.color, 2);
        assert_eq!(
            vm.resources().peek(ResourceKind::Verb, slot as u16).unwrap().as_ref(),
            b"Open"
        );
        assert_eq!(vm.verbs().find(20, 0), 0);
    }

    #[test]
    fn restoring_verbs_replaces_the_active_one() {
        let mut vm = VmBuilder::v5()
            .script(
                1,
                &[
                    0x7A, 0x14, 0x09, 0xFF, // new verb 20
                    0xAB, 0x01, 0x14, 0x14, 0x03, // save as 3
                    0x7A, 0x14, 0x09, 0x03, 0x05, 0xFF, // new verb 20 again, colour 5
                    0xAB, 0x02, 0x14, 0x14, 0x03, // restore 3
                    0x00,
                ],
            )
            .build();
        run(&mut vm);
        let slot = vm.verbs().find(20, 0);
        assert_ne!(slot, 0);
        assert_eq!(vm.verbs().get(slot).unwrap().color, 2);
        assert_eq!(vm.verbs().find(20, 3), 0);
        assert_eq!(vm.verbs().iter().filter(|(_, v)| v.verb_id == 20).count(), 1);
    }

    #[test]
    fn sound_requests_are_queued_for_the_host() {
        let audio = RecordingAudioSink::new();
        // startSound 5, isSoundRunning(5) -> v10, isSoundRunning(0) -> v11
        let mut vm = VmBuilder::v5()
            .script(
                1,
                &[
                    0x1C, 0x05, //
                    0x7C, 0x0A, 0x00, 0x05, //
                    0x7C, 0x0B, 0x00, 0x00, //
                    0x00,
                ],
            )
            .build();
        vm.audio_sink = Box::new(audio.clone());
        run(&mut vm);
        assert_eq!(vm.vars().get(10).unwrap(), 1);
        assert_eq!(vm.vars().get(11).unwrap(), 0);
        vm.sound.drain(vm.audio_sink.as_mut(), |_| true);
        assert_eq!(audio.events(), vec![AudioEvent::Play { sound: 5 }]);
    }

    #[test]
    fn draw_box_fills_inclusive_corners() {
        // drawBox 10,10 .. 4,5 color 9
        let mut vm = VmBuilder::v5()
            .script(1, &[0x3F, 0x0A, 0x00, 0x0A, 0x00, 0x00, 0x04, 0x00, 0x05, 0x00, 0x09, 0x00])
            .build();
        run(&mut vm);
        let canvas = vm.screen().canvas();
        assert_eq!(canvas.row(5)[4], 9);
        assert_eq!(canvas.row(10)[10], 9);
        assert_eq!(canvas.row(11)[10], 0);
        assert_eq!(canvas.row(4)[4], 0);
    }
}
