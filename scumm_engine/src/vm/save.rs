//! Snapshot and restore of the whole VM.
//!
//! Slot program counters are offsets into their code, so a snapshot stays
//! valid as long as the room and script resources are unchanged. Room code
//! is not stored; restoring re-reads it from the room resource.

use std::fs;
use std::path::Path;

use anyhow::Context;
use bytes::Bytes;
use log::{error, info};
use scumm_formats::{Rect, RoomData};
use serde::{Deserialize, Serialize};

use crate::actors::ActorTable;
use crate::audio::SoundQueue;
use crate::boxes::BoxTable;
use crate::camera::CameraState;
use crate::error::FatalError;
use crate::objects::ObjectTable;
use crate::palette::PaletteState;
use crate::resources::ResourceKind;
use crate::rng::{RngState, ScriptRng};
use crate::savegame::{decode_save, encode_save, SaveError};
use crate::vars::VariableStore;
use crate::verbs::VerbTable;
use crate::version::GameVersion;
use scumm_formats::PolygonStore;

use super::{
    CursorState, CutsceneFrame, Flashlight, RoomEffects, ScriptSlot, Sentence, TalkState, TextSlot,
    UserMessage, Vm, MAX_CUTSCENE_FRAMES, MAX_SENTENCES,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedResource {
    pub kind: ResourceKind,
    pub id: u16,
    #[serde(with = "serde_bytes")]
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreenState {
    pub width: usize,
    pub height: usize,
    pub top: i32,
    pub view_height: i32,
    pub shake: bool,
    #[serde(with = "serde_bytes")]
    pub pixels: Vec<u8>,
    #[serde(default)]
    pub text_mask: Option<Rect>,
}

/// Everything a restore needs, in one serializable value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveState {
    pub version: GameVersion,
    pub ticks: u64,
    pub room: i32,
    pub room_resource: u16,
    pub vars: VariableStore,
    pub slots: Vec<ScriptSlot>,
    pub cutscenes: Vec<CutsceneFrame>,
    pub cutscene_script: Option<usize>,
    pub sentences: Vec<Sentence>,
    pub actors: ActorTable,
    pub objects: ObjectTable,
    pub boxes: BoxTable,
    pub verbs: VerbTable,
    pub polygons: PolygonStore,
    pub palette: PaletteState,
    pub camera: CameraState,
    pub sound: SoundQueue,
    pub talk: TalkState,
    pub cursor: CursorState,
    pub text_slots: [TextSlot; 4],
    #[serde(with = "serde_bytes")]
    pub resource_mapper: Vec<u8>,
    pub rng: RngState,
    pub effects: RoomEffects,
    pub flashlight: Flashlight,
    pub screen: ScreenState,
    pub created: Vec<CreatedResource>,
    pub locks: Vec<(ResourceKind, u16, u32)>,
}

/// Room code re-read for a restore, prepared before any state changes.
struct RoomCode {
    width: i32,
    height: i32,
    data: Option<RoomData>,
    floating: Vec<scumm_formats::ObjectCode>,
}

impl Vm {
    pub fn snapshot(&self) -> SaveState {
        let canvas = self.screen.canvas();
        SaveState {
            version: self.traits.version,
            ticks: self.ticks,
            room: self.room.number,
            room_resource: self.room.resource,
            vars: self.vars.clone(),
            slots: self.slots.clone(),
            cutscenes: self.cutscenes.clone(),
            cutscene_script: self.cutscene_script,
            sentences: self.sentences.clone(),
            actors: self.actors.clone(),
            objects: self.objects.clone(),
            boxes: self.boxes.clone(),
            verbs: self.verbs.clone(),
            polygons: self.polygons.clone(),
            palette: self.palette.clone(),
            camera: self.camera.clone(),
            sound: self.sound.clone(),
            talk: self.talk.clone(),
            cursor: self.cursor.clone(),
            text_slots: self.text_slots,
            resource_mapper: self.resource_mapper.to_vec(),
            rng: self.rng.state(),
            effects: self.effects,
            flashlight: self.flashlight,
            screen: ScreenState {
                width: canvas.width,
                height: canvas.height,
                top: self.screen.top,
                view_height: self.screen.height,
                shake: self.screen.shake,
                pixels: canvas.pixels.clone(),
                text_mask: self.screen.text_mask(),
            },
            created: self
                .resources
                .created_resources()
                .into_iter()
                .map(|(kind, id, data)| CreatedResource { kind, id, data })
                .collect(),
            locks: self.resources.locks(),
        }
    }

    /// Serializes the VM between ticks.
    pub fn save_to_bytes(&self) -> Result<Vec<u8>, SaveError> {
        if !self.nest.is_empty() || self.current.is_some() {
            return Err(SaveError::Mismatch("a script is executing".into()));
        }
        encode_save(&self.snapshot())
    }

    /// Replaces the VM state with a decoded save. Nothing changes unless
    /// the payload decodes, fits this game and its room code is readable.
    pub fn restore_from_bytes(&mut self, bytes: &[u8]) -> Result<(), SaveError> {
        let state: SaveState = decode_save(bytes)?;
        self.check_fits(&state)?;
        let room = self.prepare_room(&state)?;
        self.apply(state, room);
        Ok(())
    }

    fn check_fits(&self, state: &SaveState) -> Result<(), SaveError> {
        let mismatch = |what: &str, saved: usize, here: usize| -> Result<(), SaveError> {
            Err(SaveError::Mismatch(format!("{what}: saved {saved}, expected {here}")))
        };
        if state.version != self.traits.version {
            return Err(SaveError::Mismatch(format!(
                "saved by a {} game, this is {}",
                state.version, self.traits.version
            )));
        }
        if state.slots.len() != self.slots.len() {
            return mismatch("script slots", state.slots.len(), self.slots.len());
        }
        if state.vars.len() != self.vars.len() {
            return mismatch("variables", state.vars.len(), self.vars.len());
        }
        if state.actors.len() != self.actors.len() {
            return mismatch("actors", state.actors.len(), self.actors.len());
        }
        if state.verbs.len() != self.verbs.len() {
            return mismatch("verbs", state.verbs.len(), self.verbs.len());
        }
        if state.objects.num_globals() != self.objects.num_globals() {
            return mismatch("objects", state.objects.num_globals(), self.objects.num_globals());
        }
        if state.cutscenes.is_empty() || state.cutscenes.len() > MAX_CUTSCENE_FRAMES {
            return mismatch("cutscene frames", state.cutscenes.len(), MAX_CUTSCENE_FRAMES);
        }
        if state.sentences.len() > MAX_SENTENCES {
            return mismatch("sentences", state.sentences.len(), MAX_SENTENCES);
        }
        if state.cutscene_script.is_some_and(|slot| slot >= self.slots.len()) {
            return Err(SaveError::Mismatch("cutscene slot out of range".into()));
        }
        if state.resource_mapper.len() != self.resource_mapper.len() {
            return mismatch(
                "room mapper",
                state.resource_mapper.len(),
                self.resource_mapper.len(),
            );
        }
        let screen = &state.screen;
        if screen.pixels.len() != screen.width * screen.height {
            return mismatch("screen pixels", screen.pixels.len(), screen.width * screen.height);
        }
        Ok(())
    }

    fn prepare_room(&mut self, state: &SaveState) -> Result<RoomCode, SaveError> {
        if state.room == 0 || state.room_resource == 0 {
            return Ok(RoomCode {
                width: 0,
                height: 0,
                data: None,
                floating: Vec::new(),
            });
        }
        let block = self
            .resources
            .require(ResourceKind::Room, state.room_resource)?;
        let data = RoomData::parse(&block).map_err(FatalError::from)?;
        let mut floating = Vec::new();
        for (&obj, &room) in state.objects.floating() {
            floating.push(self.object_code_in_room(obj as i32, room as i32)?);
        }
        Ok(RoomCode {
            width: data.width as i32,
            height: data.height as i32,
            data: Some(data),
            floating,
        })
    }

    fn apply(&mut self, state: SaveState, room: RoomCode) {
        self.room.number = state.room;
        self.room.resource = state.room_resource;
        self.room.width = room.width;
        self.room.height = room.height;
        self.room.local_scripts.clear();
        self.room.entry_code = None;
        self.room.exit_code = None;

        self.objects = state.objects;
        if let Some(data) = room.data {
            self.objects.attach_code(&data.objects);
            self.room.local_scripts = data
                .local_scripts
                .into_iter()
                .map(|(id, code)| (id as u16, Bytes::from(code)))
                .collect();
            self.room.entry_code = data.entry_code.map(Bytes::from);
            self.room.exit_code = data.exit_code.map(Bytes::from);
        }
        self.objects.attach_code(&room.floating);

        self.vars = state.vars;
        self.slots = state.slots;
        self.cutscenes = state.cutscenes;
        self.cutscene_script = state.cutscene_script;
        self.sentences = state.sentences;
        self.actors = state.actors;
        self.boxes = state.boxes;
        self.verbs = state.verbs;
        self.polygons = state.polygons;
        self.palette = state.palette;
        self.camera = state.camera;
        self.sound = state.sound;
        self.talk = state.talk;
        self.cursor = state.cursor;
        self.text_slots = state.text_slots;
        self.resource_mapper.copy_from_slice(&state.resource_mapper);
        self.rng = ScriptRng::restore(state.rng);
        self.effects = state.effects;
        self.flashlight = state.flashlight;
        self.ticks = state.ticks;

        let screen = state.screen;
        let canvas = self.screen.canvas_mut();
        if canvas.width == screen.width && canvas.height == screen.height {
            canvas.pixels = screen.pixels;
        }
        self.screen.top = screen.top;
        self.screen.height = screen.view_height;
        self.screen.shake = screen.shake;
        self.screen.restore_text_mask(screen.text_mask);

        self.resources.restore_created(
            state
                .created
                .into_iter()
                .map(|r| (r.kind, r.id, r.data))
                .collect(),
        );
        self.resources.restore_locks(state.locks);

        self.current = None;
        self.code = Bytes::new();
        self.pc = 0;
        self.nest.clear();
        self.save_request = None;
        self.palette.set_dirty(0, 255);
        self.full_redraw = true;
        info!("restored room {} at tick {}", self.room.number, self.ticks);
    }

    /// Writes a save file. Failures are also queued for the player.
    pub fn save_game(&mut self, path: &Path) -> anyhow::Result<()> {
        let result = self
            .save_to_bytes()
            .map_err(anyhow::Error::from)
            .and_then(|bytes| {
                fs::write(path, bytes).with_context(|| format!("writing {}", path.display()))
            })
            .with_context(|| format!("saving game to {}", path.display()));
        if let Err(err) = &result {
            error!("{err:#}");
            self.messages.push(UserMessage::SaveFailed(format!("{err:#}")));
        }
        result
    }

    /// Restores from a save file. On failure the running game is kept and
    /// the error is queued for the player.
    pub fn load_game(&mut self, path: &Path) -> anyhow::Result<()> {
        let result = fs::read(path)
            .with_context(|| format!("reading {}", path.display()))
            .and_then(|bytes| self.restore_from_bytes(&bytes).map_err(anyhow::Error::from))
            .with_context(|| format!("loading game from {}", path.display()));
        if let Err(err) = &result {
            error!("{err:#}");
            self.messages.push(UserMessage::LoadFailed(format!("{err:#}")));
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::savegame::{HEADER_LEN, SAVE_VERSION};
    use crate::vm::test_support::VmBuilder;
    use scumm_formats::writer::{local_script_block, object_block, room_block, ObjectSpec};
    use tempfile::tempdir;

    // delay 10; move var 100 = 7; stop
    const SLEEPER: &[u8] = &[0x2E, 10, 0, 0, 0x1A, 100, 0, 7, 0, 0x00];

    fn sleeping_vm() -> Vm {
        let mut vm = VmBuilder::v5().script(1, SLEEPER).build();
        vm.run_script(1, false, false, &[]).unwrap();
        vm.tick(1).unwrap();
        vm
    }

    #[test]
    fn restored_vm_resumes_where_it_slept() {
        let mut vm = sleeping_vm();
        vm.vars_mut().set(50, 123).unwrap();
        vm.resources_mut()
            .create(ResourceKind::String, 4, b"hello".to_vec());
        let bytes = vm.save_to_bytes().unwrap();
        assert_eq!(&bytes[..4], b"SCVM");
        assert_eq!(u16::from_be_bytes([bytes[4], bytes[5]]), SAVE_VERSION);

        let mut restored = VmBuilder::v5().script(1, SLEEPER).build();
        restored.restore_from_bytes(&bytes).unwrap();
        assert_eq!(restored.vars().get(50).unwrap(), 123);
        assert_eq!(restored.ticks(), vm.ticks());
        assert_eq!(
            restored.resources().peek(ResourceKind::String, 4).map(|b| b.to_vec()),
            Some(b"hello".to_vec())
        );

        for _ in 0..10 {
            vm.tick(1).unwrap();
            restored.tick(1).unwrap();
        }
        assert_eq!(vm.vars().get(100).unwrap(), 7);
        assert_eq!(restored.vars().get(100).unwrap(), 7);
        assert_eq!(vm.slots(), restored.slots());
    }

    #[test]
    fn failed_load_leaves_the_game_intact() {
        let mut vm = sleeping_vm();
        vm.vars_mut().set(50, 9).unwrap();
        let slots = vm.slots().to_vec();

        let mut bytes = VmBuilder::v5().build().save_to_bytes().unwrap();
        bytes.truncate(HEADER_LEN + 3);
        assert!(vm.restore_from_bytes(&bytes).is_err());
        assert_eq!(vm.vars().get(50).unwrap(), 9);
        assert_eq!(vm.slots(), &slots[..]);

        let other = VmBuilder::v4().build().save_to_bytes().unwrap();
        assert!(matches!(
            vm.restore_from_bytes(&other),
            Err(SaveError::Mismatch(_))
        ));
        assert_eq!(vm.vars().get(50).unwrap(), 9);
    }

    #[test]
    fn save_files_report_failures_to_the_player() {
        let dir = tempdir().unwrap();
        let mut vm = sleeping_vm();
        let path = dir.path().join("slot1.sav");
        vm.save_game(&path).unwrap();
        vm.load_game(&path).unwrap();
        assert!(vm.take_messages().is_empty());

        let missing = dir.path().join("nope.sav");
        assert!(vm.load_game(&missing).is_err());
        let messages = vm.take_messages();
        assert!(matches!(&messages[..], [UserMessage::LoadFailed(text)] if text.contains("nope.sav")));
    }

    #[test]
    fn room_code_is_reattached_on_restore() {
        let room = room_block(
            320,
            200,
            &[
                local_script_block(200, &[0x1A, 101, 0, 5, 0, 0x00]),
                object_block(&ObjectSpec {
                    id: 40,
                    name: "rope".into(),
                    verbs: vec![(1, vec![0x1A, 102, 0, 6, 0, 0x00])],
                    ..ObjectSpec::default()
                }),
            ],
        );
        let mut vm = VmBuilder::v5().room(3, room.clone()).build();
        vm.start_scene(3, None, 0).unwrap();
        let bytes = vm.save_to_bytes().unwrap();

        let mut restored = VmBuilder::v5().room(3, room).build();
        restored.restore_from_bytes(&bytes).unwrap();
        assert_eq!(restored.current_room(), 3);
        restored.run_script(200, false, false, &[]).unwrap();
        assert_eq!(restored.vars().get(101).unwrap(), 5);
        assert!(!restored.objects().room_object(40).unwrap().code.is_empty());
    }
}
