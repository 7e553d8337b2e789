//! Headless interpreter for SCUMM v4/v5 game scripts.
//!
//! The [`vm::Vm`] owns every table the bytecode can touch. Hosts feed it
//! resources through [`resources::ResourceSource`], drive it with
//! [`vm::Vm::tick`] and receive output through [`display::FrameSink`] and
//! [`audio::AudioSink`].

pub mod actors;
pub mod audio;
pub mod boxes;
pub mod camera;
pub mod cli;
pub mod config;
pub mod display;
pub mod error;
pub mod loader;
pub mod objects;
pub mod opcodes;
pub mod palette;
pub mod report;
pub mod resources;
pub mod rng;
pub mod savegame;
pub mod vars;
pub mod verbs;
pub mod version;
pub mod vm;

pub use config::EngineConfig;
pub use error::{FatalError, VmResult};
pub use version::{GameVersion, GameVersionTraits};
pub use vm::{InputEvent, UserMessage, Vm};
