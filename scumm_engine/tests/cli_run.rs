use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use anyhow::{ensure, Context, Result};
use scumm_engine::audio::AudioEvent;
use scumm_formats::chunk::{build_chunk, ENCD};
use scumm_formats::GameWriter;
use serde_json::{json, Value};
use tempfile::tempdir;

/// Boot script: enter room 1, print a dialog line, start sound 2, sleep
/// three ticks, then set var 101.
const BOOT: &[u8] = &[
    0x72, 0x01, // loadRoom 1
    0x14, 0xFC, 0x0F, b'H', b'i', 0x00, // print dialog "Hi"
    0x1C, 0x02, // startSound 2
    0x2E, 0x03, 0x00, 0x00, // delay 3
    0x1A, 101, 0x00, 42, 0x00, // move var 101 = 42
    0x00, // stopObjectCode
];

fn write_game(dir: &Path) -> Result<(PathBuf, PathBuf)> {
    let mut writer = GameWriter::new();
    writer
        .add_room(
            1,
            "dock",
            320,
            144,
            &[build_chunk(ENCD, &[0x1A, 100, 0x00, 0x01, 0x00, 0x00])],
        )
        .add_script(1, 1, BOOT)
        .add_sound(1, 2, &[0x10, 0x20]);
    let (index, data) = writer.finish()?;
    let index_path = dir.join("game.000");
    let data_path = dir.join("game.001");
    fs::write(&index_path, index)?;
    fs::write(&data_path, data)?;
    Ok((index_path, data_path))
}

fn run(args: &[&str]) -> Result<Output> {
    Command::new(env!("CARGO_BIN_EXE_scumm_engine"))
        .args(args)
        .output()
        .context("spawning scumm_engine")
}

fn read_json(path: &Path) -> Result<Value> {
    let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    Ok(serde_json::from_str(&text)?)
}

#[test]
fn boots_runs_and_saves_a_synthetic_game() -> Result<()> {
    let dir = tempdir()?;
    let (index, data) = write_game(dir.path())?;
    let state_path = dir.path().join("out/state.json");
    let audio_path = dir.path().join("out/audio.json");
    let frames_path = dir.path().join("out/frames.json");
    let save_path = dir.path().join("run.sav");

    let output = run(&[
        "--index",
        index.to_str().unwrap(),
        "--data",
        data.to_str().unwrap(),
        "--ticks",
        "10",
        "--seed",
        "4",
        "--state-json",
        state_path.to_str().unwrap(),
        "--audio-log-json",
        audio_path.to_str().unwrap(),
        "--frame-log-json",
        frames_path.to_str().unwrap(),
        "--save",
        save_path.to_str().unwrap(),
    ])?;
    ensure!(
        output.status.success(),
        "scumm_engine failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let state = read_json(&state_path)?;
    assert_eq!(state["version"], "v5");
    assert_eq!(state["room"], 1);
    assert_eq!(state["ticks"], 10);
    let vars = state["vars"].as_array().context("vars array")?;
    assert!(vars.contains(&json!([100, 1])));
    assert!(vars.contains(&json!([101, 42])));
    assert!(vars.contains(&json!([4, 1])));
    assert_eq!(
        state["messages"],
        json!([{ "kind": "dialog", "text": "Hi" }])
    );
    assert!(state["scripts"].as_array().context("scripts array")?.is_empty());

    let audio: Vec<AudioEvent> = serde_json::from_value(read_json(&audio_path)?)?;
    assert_eq!(audio, vec![AudioEvent::Play { sound: 2 }]);

    let frames = read_json(&frames_path)?;
    let frames = frames.as_array().context("frame events")?;
    assert!(frames.iter().any(|event| event["kind"] == "blit"));

    let saved = fs::read(&save_path)?;
    assert_eq!(&saved[..4], b"SCVM");

    let resumed_path = dir.path().join("resumed.json");
    let output = run(&[
        "--index",
        index.to_str().unwrap(),
        "--data",
        data.to_str().unwrap(),
        "--ticks",
        "2",
        "--load",
        save_path.to_str().unwrap(),
        "--state-json",
        resumed_path.to_str().unwrap(),
    ])?;
    ensure!(
        output.status.success(),
        "resumed run failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let resumed = read_json(&resumed_path)?;
    assert_eq!(resumed["ticks"], 12);
    assert_eq!(resumed["room"], 1);
    assert!(resumed["vars"]
        .as_array()
        .context("vars array")?
        .contains(&json!([101, 42])));
    Ok(())
}

#[test]
fn unreadable_save_fails_the_run() -> Result<()> {
    let dir = tempdir()?;
    let (index, data) = write_game(dir.path())?;
    let bogus = dir.path().join("bogus.sav");
    fs::write(&bogus, b"not a save")?;

    let output = run(&[
        "--index",
        index.to_str().unwrap(),
        "--data",
        data.to_str().unwrap(),
        "--load",
        bogus.to_str().unwrap(),
    ])?;
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("loading game from"), "stderr: {stderr}");
    Ok(())
}
