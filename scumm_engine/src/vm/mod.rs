//! The script interpreter: VM state, script slots and the bookkeeping shared
//! by the scheduler, the opcode handlers and the main loop.
//!
//! Everything the bytecode can observe lives in one [`Vm`] value. Opcode
//! handlers are plain `impl Vm` methods spread over the `ops_*` modules and
//! reached from the single `match` in `dispatch`.

use std::collections::{BTreeMap, VecDeque};

use bytes::Bytes;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::actors::ActorTable;
use crate::audio::{AudioSink, SoundQueue};
use crate::boxes::BoxTable;
use crate::camera::{CameraBounds, CameraMode, CameraPoint, CameraState};
use crate::display::{FrameSink, VirtualScreen};
use crate::error::{FatalError, VmResult};
use crate::objects::{ObjectLocation, ObjectTable, CLASS_PLAYER};
use crate::opcodes::{table_for, OpcodeTable};
use crate::palette::PaletteState;
use crate::resources::{ResourceManager, ResourceSource};
use crate::rng::ScriptRng;
use crate::vars::{VarLayout, VariableStore};
use crate::verbs::VerbTable;
use crate::version::GameVersionTraits;
use scumm_formats::PolygonStore;

mod dispatch;
mod fetch;
mod ops_actor;
mod ops_flow;
mod ops_misc;
mod ops_object;
mod ops_room;
mod ops_vars;
mod scene;
mod scheduler;
mod tick;
mod save;
mod wiz;

pub use save::{CreatedResource, SaveState, ScreenState};
pub use tick::{InputEvent, MouseButton};

pub const MAX_NEST: usize = 15;
/// Cutscene frames including the base frame used by top-level overrides.
pub const MAX_CUTSCENE_FRAMES: usize = 5;
pub const MAX_SENTENCES: usize = 6;
pub const NUM_LOCALS: usize = 16;
pub const ROOM_EXIT_SCRIPT: u16 = 10001;
pub const ROOM_ENTRY_SCRIPT: u16 = 10002;
/// Talk actor value for text without a speaker.
pub const NO_ACTOR: i32 = 0xFF;

/// Where a slot's code lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ScriptSource {
    #[default]
    Global,
    Local,
    RoomEntry,
    RoomExit,
    Object,
    Inventory,
}

impl ScriptSource {
    /// Scripts started through `startScript`.
    pub fn is_script(self) -> bool {
        matches!(self, ScriptSource::Global | ScriptSource::Local)
    }

    /// Code owned by the current room; dies with it.
    pub fn is_room_bound(self) -> bool {
        matches!(
            self,
            ScriptSource::Local | ScriptSource::RoomEntry | ScriptSource::RoomExit | ScriptSource::Object
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SlotStatus {
    #[default]
    Dead,
    /// Sleeping until `delay` runs out.
    Paused,
    Running,
}

/// What a slot parked on a `wait` opcode is waiting for. The scheduler
/// skips the slot while the condition holds, then re-executes the wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WaitCondition {
    ActorMoving(i32),
    Message,
    Camera,
    Sentence,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ScriptSlot {
    /// Script number, or the object id for object and inventory code.
    pub number: u16,
    pub source: ScriptSource,
    pub status: SlotStatus,
    /// Byte offset into the slot's code.
    pub pc: usize,
    pub delay: i32,
    pub freeze_resistant: bool,
    pub recursive: bool,
    pub freeze_count: u8,
    pub did_exec: bool,
    pub cutscene_override: u8,
    pub pending: Option<WaitCondition>,
    pub locals: [i32; NUM_LOCALS],
}

impl ScriptSlot {
    pub fn is_live(&self) -> bool {
        self.status != SlotStatus::Dead
    }

    pub fn is_frozen(&self) -> bool {
        self.freeze_count > 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct NestFrame {
    number: u16,
    source: ScriptSource,
    slot: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CutsceneFrame {
    pub data: i32,
    /// Slot that registered the override.
    pub script: Option<usize>,
    /// Resume point of the override, 0 when none is armed.
    pub override_pc: usize,
    pub camera_mode: CameraMode,
    pub camera_follows: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sentence {
    pub verb: i32,
    pub obj_a: i32,
    pub obj_b: i32,
    pub preposition: bool,
    pub freeze_count: u8,
}

/// Code blocks of the loaded room.
#[derive(Debug, Clone, Default)]
pub(crate) struct RoomState {
    pub number: i32,
    pub resource: u16,
    pub width: i32,
    pub height: i32,
    pub local_scripts: BTreeMap<u16, Bytes>,
    pub entry_code: Option<Bytes>,
    pub exit_code: Option<Bytes>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TextStyle {
    pub x: i32,
    pub y: i32,
    pub color: i32,
    pub right: i32,
    pub center: bool,
    pub overhead: bool,
    pub charset: i32,
}

/// One of the four print targets: actor speech, plain text, debug and
/// dialog text. `current` starts from `default` for every print.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TextSlot {
    pub current: TextStyle,
    pub default: TextStyle,
}

impl TextSlot {
    fn load_default(&mut self) {
        self.current = self.default;
    }

    fn save_default(&mut self) {
        self.default = self.current;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TalkState {
    /// 0 idle, 0xFF printing, 1 printed and waiting for the talk delay.
    pub have_msg: i32,
    pub talk_delay: i32,
    pub talk_actor: i32,
    pub keep_text: bool,
    pub text: String,
}

impl Default for TalkState {
    fn default() -> Self {
        TalkState {
            have_msg: 0,
            talk_delay: 0,
            talk_actor: 0,
            keep_text: false,
            text: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CursorState {
    pub state: i32,
    pub userput: i32,
    /// Built-in cursor in use, 0..=3.
    pub current: i32,
    /// Charset letter drawn as the cursor image.
    pub image: i32,
    pub hotspot: (i32, i32),
    pub charset: i32,
    pub charset_colors: Vec<u8>,
}

/// Notices for the player that the host should surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "text", rename_all = "snake_case")]
pub enum UserMessage {
    Dialog(String),
    SaveFailed(String),
    LoadFailed(String),
}

/// `roomOps` save/load request, served by the host between ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveRequest {
    pub load: bool,
    pub slot: u8,
}

/// Room transition effects requested by scripts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RoomEffects {
    pub switch_in: u8,
    pub switch_out: u8,
    pub new_effect: u8,
    pub do_effect: bool,
}

/// Flashlight strip counts from `lights`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Flashlight {
    pub x_strips: i32,
    pub y_strips: i32,
}

pub struct Vm {
    pub(crate) traits: GameVersionTraits,
    pub(crate) layout: VarLayout,
    pub(crate) vars: VariableStore,
    pub(crate) resources: ResourceManager,
    pub(crate) palette: PaletteState,
    pub(crate) camera: CameraState,
    pub(crate) actors: ActorTable,
    pub(crate) objects: ObjectTable,
    pub(crate) boxes: BoxTable,
    pub(crate) verbs: VerbTable,
    pub(crate) polygons: PolygonStore,
    pub(crate) screen: VirtualScreen,
    pub(crate) sound: SoundQueue,
    pub(crate) opcodes: OpcodeTable,
    pub(crate) room: RoomState,

    pub(crate) slots: Vec<ScriptSlot>,
    pub(crate) current: Option<usize>,
    pub(crate) code: Bytes,
    pub(crate) pc: usize,
    pub(crate) opcode: u8,
    pub(crate) opcode_pc: usize,
    pub(crate) result_var: u16,
    nest: Vec<NestFrame>,
    pub(crate) cutscenes: Vec<CutsceneFrame>,
    pub(crate) cutscene_script: Option<usize>,
    pub(crate) sentences: Vec<Sentence>,

    pub(crate) talk: TalkState,
    pub(crate) cursor: CursorState,
    pub(crate) text_slots: [TextSlot; 4],
    pub(crate) input: VecDeque<InputEvent>,
    pub(crate) resource_mapper: [u8; 128],
    pub(crate) rng: ScriptRng,
    pub(crate) messages: Vec<UserMessage>,
    pub(crate) save_request: Option<SaveRequest>,
    pub(crate) quit_requested: bool,
    pub(crate) restart_requested: bool,
    pub(crate) paused: bool,
    pub(crate) effects: RoomEffects,
    pub(crate) flashlight: Flashlight,
    pub(crate) full_redraw: bool,
    pub(crate) ego_positioned: bool,
    pub(crate) ticks: u64,

    pub(crate) frame_sink: Box<dyn FrameSink>,
    pub(crate) audio_sink: Box<dyn AudioSink>,
}

impl std::fmt::Debug for Vm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vm")
            .field("version", &self.traits.version)
            .field("room", &self.room.number)
            .field("current", &self.current)
            .field("ticks", &self.ticks)
            .finish_non_exhaustive()
    }
}

impl Vm {
    pub fn new(
        traits: GameVersionTraits,
        source: Box<dyn ResourceSource>,
        frame_sink: Box<dyn FrameSink>,
        audio_sink: Box<dyn AudioSink>,
        seed: u64,
    ) -> Self {
        let layout = VarLayout::for_traits(&traits);
        let mut vm = Vm {
            vars: VariableStore::new(traits.num_variables, traits.num_bit_variables),
            resources: ResourceManager::new(source, traits.heap_threshold),
            palette: PaletteState::new(traits.small_header),
            camera: CameraState::default(),
            actors: ActorTable::new(traits.num_actors),
            objects: ObjectTable::new(
                traits.num_global_objects,
                traits.num_local_objects,
                traits.num_inventory,
            ),
            boxes: BoxTable::new(traits.small_header),
            verbs: VerbTable::new(traits.num_verbs),
            polygons: PolygonStore::new(),
            screen: VirtualScreen::new(traits.screen_width, traits.screen_height),
            sound: SoundQueue::new(),
            opcodes: table_for(traits.version),
            room: RoomState::default(),
            slots: vec![ScriptSlot::default(); traits.num_script_slots],
            current: None,
            code: Bytes::new(),
            pc: 0,
            opcode: 0,
            opcode_pc: 0,
            result_var: 0,
            nest: Vec::new(),
            cutscenes: vec![CutsceneFrame::default()],
            cutscene_script: None,
            sentences: Vec::new(),
            talk: TalkState::default(),
            cursor: CursorState {
                charset_colors: vec![0; 16],
                ..CursorState::default()
            },
            text_slots: [TextSlot::default(); 4],
            input: VecDeque::new(),
            resource_mapper: [0; 128],
            rng: ScriptRng::new(seed),
            messages: Vec::new(),
            save_request: None,
            quit_requested: false,
            restart_requested: false,
            paused: false,
            effects: RoomEffects::default(),
            flashlight: Flashlight::default(),
            full_redraw: true,
            ego_positioned: false,
            ticks: 0,
            frame_sink,
            audio_sink,
            layout,
            traits,
        };
        vm.init_variables();
        vm
    }

    fn init_variables(&mut self) {
        let layout = self.layout.clone();
        self.vars.write(layout.charinc, 4);
        self.vars.write(layout.heapspace, 1400);
        self.vars.write(layout.num_actor, self.traits.num_actors as i32 - 1);
        self.vars.write(layout.current_lights, 0x0B);
        self.vars.write(layout.timer_next, 4);
        self.vars.write(layout.machine_speed, 2);
        self.vars.write(layout.fade_delay, 3);
        self.vars.write(layout.talk_actor, 0);
    }

    pub fn traits(&self) -> &GameVersionTraits {
        &self.traits
    }

    pub fn layout(&self) -> &VarLayout {
        &self.layout
    }

    pub fn vars(&self) -> &VariableStore {
        &self.vars
    }

    pub fn vars_mut(&mut self) -> &mut VariableStore {
        &mut self.vars
    }

    pub fn resources(&self) -> &ResourceManager {
        &self.resources
    }

    pub fn resources_mut(&mut self) -> &mut ResourceManager {
        &mut self.resources
    }

    pub fn palette(&self) -> &PaletteState {
        &self.palette
    }

    pub fn camera(&self) -> &CameraState {
        &self.camera
    }

    pub fn actors(&self) -> &ActorTable {
        &self.actors
    }

    pub fn objects(&self) -> &ObjectTable {
        &self.objects
    }

    pub fn objects_mut(&mut self) -> &mut ObjectTable {
        &mut self.objects
    }

    pub fn verbs(&self) -> &VerbTable {
        &self.verbs
    }

    pub fn screen(&self) -> &VirtualScreen {
        &self.screen
    }

    pub fn slots(&self) -> &[ScriptSlot] {
        &self.slots
    }

    pub fn current_slot(&self) -> Option<usize> {
        self.current
    }

    pub fn cutscene_depth(&self) -> usize {
        self.cutscenes.len() - 1
    }

    pub fn sentences(&self) -> &[Sentence] {
        &self.sentences
    }

    pub fn talk(&self) -> &TalkState {
        &self.talk
    }

    pub fn cursor(&self) -> &CursorState {
        &self.cursor
    }

    pub fn current_room(&self) -> i32 {
        self.room.number
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn quit_requested(&self) -> bool {
        self.quit_requested
    }

    pub fn restart_requested(&self) -> bool {
        self.restart_requested
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn take_messages(&mut self) -> Vec<UserMessage> {
        std::mem::take(&mut self.messages)
    }

    pub fn push_message(&mut self, message: UserMessage) {
        self.messages.push(message);
    }

    pub fn take_save_request(&mut self) -> Option<SaveRequest> {
        self.save_request.take()
    }

    /// Symbolic variable read; absent variables read as 0.
    pub(crate) fn var(&self, var: Option<u16>) -> i32 {
        self.vars.read(var)
    }

    pub(crate) fn set_var(&mut self, var: Option<u16>, value: i32) {
        self.vars.write(var, value);
    }

    pub(crate) fn ego(&self) -> i32 {
        self.var(self.layout.ego)
    }

    /// Number of the executing script, for diagnostics.
    pub(crate) fn script_number(&self) -> u16 {
        self.current.map(|slot| self.slots[slot].number).unwrap_or(0)
    }

    pub(crate) fn current_index(&self) -> VmResult<usize> {
        self.current.ok_or(FatalError::NoCurrentScript)
    }

    pub(crate) fn is_actor(&self, obj: i32) -> bool {
        obj > 0 && (obj as usize) < self.actors.len()
    }

    /// Actors in the player class may enter player-only boxes.
    pub(crate) fn is_player(&self, actor: i32) -> bool {
        self.objects.class_of(actor, CLASS_PLAYER).unwrap_or(false)
    }

    pub(crate) fn camera_bounds(&self) -> CameraBounds {
        let l = &self.layout;
        CameraBounds {
            min_x: self.var(l.camera_min_x),
            max_x: self.var(l.camera_max_x),
            min_y: self.var(l.camera_min_y),
            max_y: self.var(l.camera_max_y),
            room_width: self.room.width,
            room_height: self.room.height,
            screen_width: self.traits.screen_width,
            screen_height: self.traits.screen_height,
            fast: self.var(l.camera_fast_x) != 0,
        }
    }

    pub(crate) fn put_actor(&mut self, actor: i32, x: i32, y: i32, room: i32) -> VmResult<()> {
        let current_room = self.room.number;
        let player = self.is_player(actor);
        self.actors
            .get_mut(actor)?
            .put(x, y, room, current_room, &self.boxes, player);
        if actor == self.ego() && room == current_room {
            self.ego_positioned = true;
        }
        Ok(())
    }

    pub(crate) fn walk_actor(&mut self, actor: i32, x: i32, y: i32, dir: i32) -> VmResult<()> {
        let current_room = self.room.number;
        let player = self.is_player(actor);
        self.actors
            .get_mut(actor)?
            .start_walk(x, y, dir, current_room, &self.boxes, player);
        Ok(())
    }

    /// Walk-to position and facing of a room object.
    pub(crate) fn object_walk_position(&self, obj: i32) -> Option<(i32, i32, i32)> {
        self.objects.room_object(obj).map(|o| {
            (
                o.walk_x,
                o.walk_y,
                crate::actors::old_dir_to_new_dir((o.actor_dir & 3) as i32),
            )
        })
    }

    /// Position of an actor (in the current room) or of an object; carried
    /// objects report their owner's position.
    pub(crate) fn object_or_actor_xy(&self, obj: i32) -> Option<(i32, i32)> {
        if self.is_actor(obj) {
            let actor = self.actors.get(obj).ok()?;
            return actor
                .is_in_room(self.room.number)
                .then_some((actor.x, actor.y));
        }
        match self.objects.where_is(obj) {
            ObjectLocation::NotFound => None,
            ObjectLocation::Inventory => {
                let owner = self.objects.owner(obj).ok()? as i32;
                if self.is_actor(owner) {
                    let actor = self.actors.get(owner).ok()?;
                    actor
                        .is_in_room(self.room.number)
                        .then_some((actor.x, actor.y))
                } else {
                    None
                }
            }
            ObjectLocation::Room => self.object_walk_position(obj).map(|(x, y, _)| (x, y)),
        }
    }

    pub(crate) fn actor_position(&self, actor: i32) -> Option<CameraPoint> {
        self.actors
            .get(actor)
            .ok()
            .map(|a| CameraPoint { x: a.x, y: a.y })
    }

    /// Maps pseudo-room numbers (`>= 0x80`) onto real rooms.
    pub(crate) fn map_room(&self, room: i32) -> i32 {
        if room > 0x7F {
            self.resource_mapper[(room & 0x7F) as usize] as i32
        } else {
            room
        }
    }

    pub(crate) fn stop_talk(&mut self) -> VmResult<()> {
        self.talk.have_msg = 0;
        self.talk.talk_delay = 0;
        let talker = self.talk.talk_actor;
        if talker != 0 && talker != NO_ACTOR && self.actors.is_valid(talker) {
            let room = self.room.number;
            let actor = self.actors.get_mut(talker)?;
            if actor.is_in_room(room) {
                let frame = actor.talk_stop_frame;
                actor.start_anim(frame);
            }
        }
        self.talk.talk_actor = 0;
        self.set_var(self.layout.talk_actor, 0);
        self.talk.keep_text = false;
        self.talk.text.clear();
        self.screen.clear_text_mask();
        debug!("talk stopped");
        Ok(())
    }
}
