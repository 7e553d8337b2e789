//! Opcode enumeration and the per-version byte-to-opcode tables.
//!
//! The low seven bits select the operation; the high bit (and the two below
//! it for most opcodes) flag which operands are variables. Most bytes
//! therefore map to the same operation as their `& 0x7F` twin, with a
//! handful of exceptions patched in after the mirror pass.

use crate::version::GameVersion;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    ActorFollowCamera,
    ActorFromPos,
    ActorOps,
    Add,
    And,
    AnimateActor,
    BeginOverride,
    BreakHere,
    ChainScript,
    CursorCommand,
    Cutscene,
    Debug,
    Decrement,
    DelayVariable,
    Delay,
    Divide,
    DoSentence,
    DrawBox,
    DrawObject,
    /// Unassigned in v5; the v4 table reuses the slot.
    Dummy,
    EndCutscene,
    EqualZero,
    Expression,
    FaceActor,
    FindInventory,
    FindObject,
    FreezeScripts,
    GetActorCostume,
    GetActorElevation,
    GetActorFacing,
    GetActorMoving,
    GetActorRoom,
    GetActorScale,
    GetActorWalkBox,
    GetActorWidth,
    GetActorX,
    GetActorY,
    GetAnimCounter,
    GetClosestObjActor,
    GetDist,
    GetInventoryCount,
    GetObjectOwner,
    GetObjectState,
    GetRandomNr,
    GetStringWidth,
    GetVerbEntrypoint,
    IfClassOfIs,
    IfNotState,
    IfState,
    Increment,
    IsActorInBox,
    IsEqual,
    IsGreater,
    IsGreaterEqual,
    IsLess,
    IsLessEqual,
    IsNotEqual,
    IsScriptRunning,
    IsSoundRunning,
    JumpRelative,
    Lights,
    LoadRoom,
    LoadRoomWithEgo,
    MatrixOps,
    Move,
    Multiply,
    NotEqualZero,
    OldRoomEffect,
    Or,
    PanCameraTo,
    PickupObject,
    PickupObjectOld,
    Print,
    PrintEgo,
    PseudoRoom,
    PutActor,
    PutActorAtObject,
    PutActorInRoom,
    ResourceRoutines,
    RoomOps,
    SaveLoadVars,
    SaveRestoreVerbs,
    SetCameraAt,
    SetClass,
    SetObjectName,
    SetOwnerOf,
    SetState,
    SetVarRange,
    SoundKludge,
    StartMusic,
    StartObject,
    StartScript,
    StartSound,
    StopMusic,
    StopObjectCode,
    StopObjectScript,
    StopScript,
    StopSound,
    StringOps,
    Subtract,
    SystemOps,
    VerbOps,
    Wait,
    WaitForSentence,
    WalkActorTo,
    WalkActorToActor,
    WalkActorToObject,
}

use Opcode::*;

/// Operations for bytes `0x00..0x80`, in byte order.
#[rustfmt::skip]
const LOW: [Opcode; 128] = [
    // 0x00
    StopObjectCode, PutActor, StartMusic, GetActorRoom,
    IsGreaterEqual, DrawObject, GetActorElevation, SetState,
    IsNotEqual, FaceActor, StartScript, GetVerbEntrypoint,
    ResourceRoutines, WalkActorToActor, PutActorAtObject, GetObjectState,
    // 0x10
    GetObjectOwner, AnimateActor, PanCameraTo, ActorOps,
    Print, ActorFromPos, GetRandomNr, And,
    JumpRelative, DoSentence, Move, Multiply,
    StartSound, IfClassOfIs, WalkActorTo, IsActorInBox,
    // 0x20
    StopMusic, PutActor, GetAnimCounter, GetActorY,
    LoadRoomWithEgo, PickupObject, SetVarRange, StringOps,
    EqualZero, SetOwnerOf, StartScript, DelayVariable,
    CursorCommand, PutActorInRoom, Delay, IfNotState,
    // 0x30
    MatrixOps, GetInventoryCount, SetCameraAt, RoomOps,
    GetDist, FindObject, WalkActorToObject, StartObject,
    IsLessEqual, DoSentence, Subtract, GetActorScale,
    StopSound, FindInventory, WalkActorTo, DrawBox,
    // 0x40
    Cutscene, PutActor, ChainScript, GetActorX,
    IsLess, DrawObject, Increment, SetState,
    IsEqual, FaceActor, StartScript, GetVerbEntrypoint,
    SoundKludge, WalkActorToActor, PutActorAtObject, IfState,
    // 0x50
    PickupObjectOld, AnimateActor, ActorFollowCamera, ActorOps,
    SetObjectName, ActorFromPos, GetActorMoving, Or,
    BeginOverride, DoSentence, Add, Divide,
    OldRoomEffect, SetClass, WalkActorTo, IsActorInBox,
    // 0x60
    FreezeScripts, PutActor, StopScript, GetActorFacing,
    LoadRoomWithEgo, PickupObject, GetClosestObjActor, GetStringWidth,
    IsScriptRunning, SetOwnerOf, StartScript, Debug,
    GetActorWidth, PutActorInRoom, StopObjectScript, IfNotState,
    // 0x70
    Lights, GetActorCostume, LoadRoom, RoomOps,
    GetDist, FindObject, WalkActorToObject, StartObject,
    IsGreater, DoSentence, VerbOps, GetActorWalkBox,
    IsSoundRunning, FindInventory, WalkActorTo, DrawBox,
];

/// Bytes whose high-bit twin is a different operation.
const HIGH_OVERRIDES: [(u8, Opcode); 12] = [
    (0x80, BreakHere),
    (0x98, SystemOps),
    (0xA0, StopObjectCode),
    (0xA7, Dummy),
    (0xA8, NotEqualZero),
    (0xAB, SaveRestoreVerbs),
    (0xAC, Expression),
    (0xAE, Wait),
    (0xC0, EndCutscene),
    (0xC6, Decrement),
    (0xCC, PseudoRoom),
    (0xD8, PrintEgo),
];

pub type OpcodeTable = [Opcode; 256];

pub fn v5_table() -> OpcodeTable {
    let mut table = [Dummy; 256];
    for (byte, op) in LOW.iter().enumerate() {
        table[byte] = *op;
        table[byte | 0x80] = *op;
    }
    for (byte, op) in HIGH_OVERRIDES {
        table[byte as usize] = op;
    }
    table
}

pub fn v4_table() -> OpcodeTable {
    let mut table = v5_table();
    table[0x0F] = IfState;
    table[0x8F] = IfState;
    table[0x2F] = IfNotState;
    table[0xAF] = IfNotState;
    for byte in [0x25, 0x65, 0xA5, 0xE5] {
        table[byte] = DrawObject;
    }
    table[0x4C] = WaitForSentence;
    table[0xCC] = WaitForSentence;
    table[0xA7] = SaveLoadVars;
    table
}

pub fn table_for(version: GameVersion) -> OpcodeTable {
    match version {
        GameVersion::V4 => v4_table(),
        GameVersion::V5 => v5_table(),
    }
}

/// Small-header `actorOps` sub-opcode translation, indexed by `(op & 0x1F) - 1`.
pub const V4_ACTOR_OPS_CONVERT: [u8; 20] =
    [1, 0, 0, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 20];
