//! Human-readable state dumps written by the CLI.

use serde::Serialize;

use crate::camera::CameraPoint;
use crate::version::GameVersion;
use crate::vm::{ScriptSource, SlotStatus, UserMessage, Vm};

#[derive(Debug, Serialize)]
pub struct SlotReport {
    pub slot: usize,
    pub number: u16,
    pub source: ScriptSource,
    pub status: SlotStatus,
    pub pc: usize,
    pub delay: i32,
    pub frozen: bool,
}

#[derive(Debug, Serialize)]
pub struct ActorReport {
    pub number: usize,
    pub room: i32,
    pub x: i32,
    pub y: i32,
    pub facing: i32,
    pub costume: i32,
    pub moving: bool,
}

#[derive(Debug, Serialize)]
pub struct StateReport {
    pub version: GameVersion,
    pub ticks: u64,
    pub room: i32,
    pub ego: i32,
    pub camera: CameraPoint,
    pub cutscene_depth: usize,
    /// Non-zero variables as `(index, value)`.
    pub vars: Vec<(usize, i32)>,
    pub scripts: Vec<SlotReport>,
    /// Actors placed in some room.
    pub actors: Vec<ActorReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub talk: Option<String>,
    pub messages: Vec<UserMessage>,
    pub resident_bytes: usize,
    pub pinned_bytes: usize,
    pub resource_loads: u64,
}

impl StateReport {
    pub fn capture(vm: &Vm, messages: Vec<UserMessage>) -> Self {
        let vars = vm
            .vars()
            .values()
            .iter()
            .enumerate()
            .filter(|(_, &value)| value != 0)
            .map(|(index, &value)| (index, value))
            .collect();
        let scripts = vm
            .slots()
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_live())
            .map(|(index, slot)| SlotReport {
                slot: index,
                number: slot.number,
                source: slot.source,
                status: slot.status,
                pc: slot.pc,
                delay: slot.delay,
                frozen: slot.is_frozen(),
            })
            .collect();
        let actors = vm
            .actors()
            .iter()
            .filter(|actor| actor.room != 0)
            .map(|actor| ActorReport {
                number: actor.number,
                room: actor.room,
                x: actor.x,
                y: actor.y,
                facing: actor.facing,
                costume: actor.costume,
                moving: actor.is_moving(),
            })
            .collect();
        let talk = vm.talk();
        StateReport {
            version: vm.traits().version,
            ticks: vm.ticks(),
            room: vm.current_room(),
            ego: vm.vars().read(vm.layout().ego),
            camera: vm.camera().cur,
            cutscene_depth: vm.cutscene_depth(),
            vars,
            scripts,
            actors,
            talk: (talk.have_msg != 0).then(|| talk.text.clone()),
            messages,
            resident_bytes: vm.resources().resident_bytes(),
            pinned_bytes: vm.resources().pinned_bytes(),
            resource_loads: vm.resources().loads(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vm::test_support::VmBuilder;

    #[test]
    fn report_lists_live_scripts_and_set_vars() {
        let mut vm = VmBuilder::v5()
            .script(1, &[0x1A, 90, 0, 3, 0, 0x2E, 5, 0, 0, 0x00])
            .build();
        vm.run_script(1, false, false, &[]).unwrap();
        let report = StateReport::capture(&vm, vec![UserMessage::Dialog("hi".into())]);
        assert!(report.vars.contains(&(90, 3)));
        assert_eq!(report.scripts.len(), 1);
        assert_eq!(report.scripts[0].number, 1);
        assert_eq!(report.scripts[0].delay, 5);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["scripts"][0]["status"], "Paused");
        assert_eq!(json["messages"][0]["kind"], "dialog");
        assert!(json.get("talk").is_none());
    }
}
