use thiserror::Error;

use crate::resources::ResourceKind;

/// Unrecoverable interpreter failures. Any of these aborts the current tick
/// and is handed back to the host untouched.
#[derive(Debug, Error)]
pub enum FatalError {
    #[error("invalid actor {0}")]
    InvalidActor(i32),
    #[error("invalid object {0}")]
    InvalidObject(i32),
    #[error("variable {0} out of range")]
    InvalidVariable(u32),
    #[error("illegal var bits {0:#06x}")]
    IllegalVarBits(u16),
    #[error("{table} index {index} out of range")]
    InvalidIndex { table: &'static str, index: i32 },
    #[error("division by zero in script {script}")]
    DivideByZero { script: u16 },
    #[error("unknown opcode {opcode:#04x} in script {script} at {pc:#06x}")]
    UnknownOpcode { opcode: u8, script: u16, pc: usize },
    #[error("{op}: unknown sub-opcode {sub:#04x}")]
    UnknownSubOpcode { op: &'static str, sub: u8 },
    #[error("{kind:?} {id} is not available")]
    ResourceMissing { kind: ResourceKind, id: u16 },
    #[error("{kind:?} {id} is truncated: {detail}")]
    ResourceTruncated {
        kind: ResourceKind,
        id: u16,
        detail: String,
    },
    #[error("script {script} read past the end of its code at {pc:#06x}")]
    ScriptOutOfBounds { script: u16, pc: usize },
    #[error("no free script slot for script {0}")]
    NoFreeSlot(u16),
    #[error("script nesting deeper than {0}")]
    NestingTooDeep(usize),
    #[error("cutscene stack: {0}")]
    CutsceneStack(&'static str),
    #[error("script {script} stopped while a cutscene or override is active")]
    ActiveCutscene { script: u16 },
    #[error("sentence stack overflow")]
    SentenceOverflow,
    #[error("no script is executing")]
    NoCurrentScript,
    #[error("polygon: {0}")]
    Polygon(String),
    #[error(transparent)]
    Source(#[from] anyhow::Error),
}

pub type VmResult<T> = Result<T, FatalError>;
