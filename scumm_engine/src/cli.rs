use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};
use serde::Serialize;

use crate::audio::RecordingAudioSink;
use crate::config::EngineConfig;
use crate::display::RecordingFrameSink;
use crate::loader::ArchiveSource;
use crate::report::StateReport;
use crate::version::GameVersion;
use crate::vm::{SaveRequest, Vm};

#[derive(Parser, Debug)]
#[command(about = "Headless SCUMM v4/v5 script interpreter")]
pub struct Args {
    /// Path to the index file (.000)
    #[arg(long)]
    pub index: PathBuf,

    /// Path to the data file (.001)
    #[arg(long)]
    pub data: PathBuf,

    /// Game version, v4 or v5 (overrides the config file)
    #[arg(long = "version", value_name = "VERSION")]
    pub game_version: Option<GameVersion>,

    /// Number of ticks to run
    #[arg(long, default_value_t = 60)]
    pub ticks: u32,

    /// Script started at boot (overrides the config file)
    #[arg(long)]
    pub boot_script: Option<u16>,

    /// Seed for the script random number generator
    #[arg(long)]
    pub seed: Option<u64>,

    /// Optional JSON engine config
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Path to write the final VM state as JSON
    #[arg(long)]
    pub state_json: Option<PathBuf>,

    /// Path to write the audio request log as JSON
    #[arg(long)]
    pub audio_log_json: Option<PathBuf>,

    /// Path to write the frame event log as JSON
    #[arg(long)]
    pub frame_log_json: Option<PathBuf>,

    /// Write a save file after the last tick
    #[arg(long)]
    pub save: Option<PathBuf>,

    /// Restore a save file instead of running the boot script
    #[arg(long)]
    pub load: Option<PathBuf>,
}

impl Args {
    /// Config file values with command line overrides applied.
    pub fn engine_config(&self) -> Result<EngineConfig> {
        let mut config = match &self.config {
            Some(path) => EngineConfig::load(path)?,
            None => EngineConfig::default(),
        };
        if let Some(version) = self.game_version {
            config.version = version;
        }
        if let Some(script) = self.boot_script {
            config.boot_script = script;
        }
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        Ok(config)
    }
}

pub fn run(args: Args) -> Result<()> {
    let config = args.engine_config()?;
    let source = ArchiveSource::open(&args.index, &args.data)
        .with_context(|| format!("opening game files {}", args.index.display()))?;
    let objects = source.index().objects.clone();
    let traits = config
        .traits()
        .with_maxs(&source.index().maxs, objects.len());
    info!(
        "{} game: {} variables, {} global scripts, {} objects",
        traits.version,
        traits.num_variables,
        traits.num_global_scripts,
        traits.num_global_objects
    );

    let frames = RecordingFrameSink::new();
    let audio = RecordingAudioSink::new();
    let mut vm = Vm::new(
        traits,
        Box::new(source),
        Box::new(frames.clone()),
        Box::new(audio.clone()),
        config.seed,
    );
    vm.objects_mut().load_globals(&objects);

    match &args.load {
        Some(path) => vm.load_game(path)?,
        None => vm
            .run_script(config.boot_script, false, false, &config.boot_args)
            .with_context(|| format!("running boot script {}", config.boot_script))?,
    }

    let mut messages = Vec::new();
    for tick in 0..args.ticks {
        vm.tick(1)
            .with_context(|| format!("tick {} in room {}", vm.ticks(), vm.current_room()))?;
        if let Some(request) = vm.take_save_request() {
            serve_save_request(&mut vm, &config, request);
        }
        if config.autosave_period > 0 && (tick + 1) % config.autosave_period == 0 {
            let path = save_dir(&config).join("autosave.sav");
            if let Err(err) = vm.save_game(&path) {
                warn!("autosave failed: {err:#}");
            }
        }
        for message in vm.take_messages() {
            info!("message: {message:?}");
            messages.push(message);
        }
        if vm.quit_requested() {
            info!("game requested quit after {} ticks", vm.ticks());
            break;
        }
    }

    if let Some(path) = &args.save {
        vm.save_game(path)?;
    }
    messages.extend(vm.take_messages());

    if let Some(path) = &args.state_json {
        write_json(path, &StateReport::capture(&vm, messages))?;
    }
    if let Some(path) = &args.audio_log_json {
        write_json(path, &audio.events())?;
    }
    if let Some(path) = &args.frame_log_json {
        write_json(path, &frames.events())?;
    }
    Ok(())
}

fn save_dir(config: &EngineConfig) -> PathBuf {
    config
        .save_dir
        .clone()
        .unwrap_or_else(|| PathBuf::from("."))
}

fn save_slot_path(config: &EngineConfig, slot: u8) -> PathBuf {
    save_dir(config).join(format!("slot{slot:02}.sav"))
}

/// Save or load asked for by a script. Failures reach the player through
/// the message queue and never stop the run.
fn serve_save_request(vm: &mut Vm, config: &EngineConfig, request: SaveRequest) {
    let path = save_slot_path(config, request.slot);
    let result = if request.load {
        vm.load_game(&path)
    } else {
        vm.save_game(&path)
    };
    match result {
        Ok(()) => info!(
            "{} slot {} ({})",
            if request.load { "loaded" } else { "saved" },
            request.slot,
            path.display()
        ),
        Err(err) => warn!("script save request failed: {err:#}"),
    }
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating directory {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
    info!("wrote {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_the_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("engine.json");
        fs::write(&config_path, r#"{ "seed": 5, "boot_script": 9, "autosave_period": 30 }"#).unwrap();
        let args = Args::parse_from([
            "scumm_engine",
            "--index",
            "game.000",
            "--data",
            "game.001",
            "--version",
            "v4",
            "--seed",
            "11",
            "--config",
            config_path.to_str().unwrap(),
        ]);
        let config = args.engine_config().unwrap();
        assert_eq!(config.version, GameVersion::V4);
        assert_eq!(config.seed, 11);
        assert_eq!(config.boot_script, 9);
        assert_eq!(config.autosave_period, 30);
        assert_eq!(args.ticks, 60);
    }

    #[test]
    fn save_slots_live_in_the_save_dir() {
        let config = EngineConfig {
            save_dir: Some(PathBuf::from("saves")),
            ..EngineConfig::default()
        };
        assert_eq!(save_slot_path(&config, 3), PathBuf::from("saves/slot03.sav"));
    }
}
