use log::{trace, warn};

use crate::error::VmResult;
use crate::opcodes::Opcode;

use super::Vm;

impl Vm {
    /// Executes one instruction whose opcode byte was already fetched.
    pub(crate) fn execute_opcode(&mut self, byte: u8) -> VmResult<()> {
        let op = self.opcodes[byte as usize];
        trace!(
            "script {} {:#06x}: {:#04x} {:?}",
            self.script_number(),
            self.opcode_pc,
            byte,
            op
        );
        match op {
            Opcode::StopObjectCode => self.stop_object_code(),
            Opcode::BreakHere => self.op_break_here(),
            Opcode::JumpRelative => self.jump_relative(false),
            Opcode::IsEqual => self.op_compare(|a, b| b == a),
            Opcode::IsNotEqual => self.op_compare(|a, b| b != a),
            Opcode::IsLess => self.op_compare(|a, b| b < a),
            Opcode::IsLessEqual => self.op_compare(|a, b| b <= a),
            Opcode::IsGreater => self.op_compare(|a, b| b > a),
            Opcode::IsGreaterEqual => self.op_compare(|a, b| b >= a),
            Opcode::EqualZero => self.op_equal_zero(true),
            Opcode::NotEqualZero => self.op_equal_zero(false),
            Opcode::IfState => self.op_if_state(true),
            Opcode::IfNotState => self.op_if_state(false),
            Opcode::IfClassOfIs => self.op_if_class_of_is(),
            Opcode::IsActorInBox => self.op_is_actor_in_box(),
            Opcode::BeginOverride => self.op_begin_override(),
            Opcode::Cutscene => self.op_cutscene(),
            Opcode::EndCutscene => self.end_cutscene(),
            Opcode::SystemOps => self.op_system_ops(),

            Opcode::StartScript => self.op_start_script(),
            Opcode::ChainScript => self.op_chain_script(),
            Opcode::StopScript => self.op_stop_script(),
            Opcode::FreezeScripts => self.op_freeze_scripts(),
            Opcode::IsScriptRunning => self.op_is_script_running(),
            Opcode::StartObject => self.op_start_object(),
            Opcode::StopObjectScript => self.op_stop_object_script(),
            Opcode::Delay => self.op_delay(),
            Opcode::DelayVariable => self.op_delay_variable(),
            Opcode::Wait => self.op_wait(),
            Opcode::WaitForSentence => self.op_wait_for_sentence(),
            Opcode::DoSentence => self.op_do_sentence(),
            Opcode::Debug => self.op_debug(),

            Opcode::Move => self.op_move(),
            Opcode::Add => self.op_arith(|a, b| a.wrapping_add(b)),
            Opcode::Subtract => self.op_arith(|a, b| a.wrapping_sub(b)),
            Opcode::Multiply => self.op_arith(|a, b| a.wrapping_mul(b)),
            Opcode::And => self.op_arith(|a, b| a & b),
            Opcode::Or => self.op_arith(|a, b| a | b),
            Opcode::Divide => self.op_divide(),
            Opcode::Increment => self.op_step(1),
            Opcode::Decrement => self.op_step(-1),
            Opcode::SetVarRange => self.op_set_var_range(),
            Opcode::Expression => self.op_expression(),
            Opcode::GetRandomNr => self.op_get_random_nr(),
            Opcode::StringOps => self.op_string_ops(),
            Opcode::GetStringWidth => self.op_get_string_width(),
            Opcode::SaveLoadVars => self.op_save_load_vars(),

            Opcode::PutActor => self.op_put_actor(),
            Opcode::PutActorAtObject => self.op_put_actor_at_object(),
            Opcode::PutActorInRoom => self.op_put_actor_in_room(),
            Opcode::ActorOps => self.op_actor_ops(),
            Opcode::WalkActorTo => self.op_walk_actor_to(),
            Opcode::WalkActorToActor => self.op_walk_actor_to_actor(),
            Opcode::WalkActorToObject => self.op_walk_actor_to_object(),
            Opcode::FaceActor => self.op_face_actor(),
            Opcode::AnimateActor => self.op_animate_actor(),
            Opcode::ActorFromPos => self.op_actor_from_pos(),
            Opcode::ActorFollowCamera => self.op_actor_follow_camera(),
            Opcode::GetActorX => self.op_get_actor_xy(false),
            Opcode::GetActorY => self.op_get_actor_xy(true),
            Opcode::GetActorRoom => self.op_get_actor_room(),
            Opcode::GetActorElevation => self.op_actor_query(|a| a.elevation),
            Opcode::GetActorCostume => self.op_actor_query(|a| a.costume),
            Opcode::GetActorFacing => {
                self.op_actor_query(|a| crate::actors::new_dir_to_old_dir(a.facing))
            }
            Opcode::GetActorMoving => self.op_actor_query(|a| a.moving as i32),
            Opcode::GetActorScale => self.op_actor_query(|a| a.scale_x),
            Opcode::GetActorWalkBox => {
                self.op_actor_query(|a| a.walk_box.map_or(0, |b| b as i32))
            }
            Opcode::GetActorWidth => self.op_actor_query(|a| a.width),
            Opcode::GetAnimCounter => self.op_actor_query(|a| a.anim_counter),
            Opcode::GetDist => self.op_get_dist(),
            Opcode::GetClosestObjActor => self.op_get_closest_obj_actor(),

            Opcode::GetObjectOwner => self.op_get_object_owner(),
            Opcode::SetOwnerOf => self.op_set_owner_of(),
            Opcode::GetObjectState => self.op_get_object_state(),
            Opcode::SetState => self.op_set_state(),
            Opcode::SetClass => self.op_set_class(),
            Opcode::DrawObject => self.op_draw_object(),
            Opcode::PickupObject => self.op_pickup_object(),
            Opcode::PickupObjectOld => self.op_pickup_object_old(),
            Opcode::FindObject => self.op_find_object(),
            Opcode::FindInventory => self.op_find_inventory(),
            Opcode::GetInventoryCount => self.op_get_inventory_count(),
            Opcode::GetVerbEntrypoint => self.op_get_verb_entrypoint(),
            Opcode::SetObjectName => self.op_set_object_name(),

            Opcode::LoadRoom => self.op_load_room(),
            Opcode::LoadRoomWithEgo => self.op_load_room_with_ego(),
            Opcode::PseudoRoom => self.op_pseudo_room(),
            Opcode::RoomOps => self.op_room_ops(),
            Opcode::SetCameraAt => self.op_set_camera_at(),
            Opcode::PanCameraTo => self.op_pan_camera_to(),
            Opcode::Lights => self.op_lights(),
            Opcode::OldRoomEffect => self.op_old_room_effect(),
            Opcode::MatrixOps => self.op_matrix_ops(),
            Opcode::ResourceRoutines => self.op_resource_routines(),

            Opcode::VerbOps => self.op_verb_ops(),
            Opcode::SaveRestoreVerbs => self.op_save_restore_verbs(),
            Opcode::CursorCommand => self.op_cursor_command(),
            Opcode::Print => self.op_print(false),
            Opcode::PrintEgo => self.op_print(true),
            Opcode::DrawBox => self.op_draw_box(),

            Opcode::StartSound => self.op_start_sound(),
            Opcode::StartMusic => self.op_start_music(),
            Opcode::StopSound => self.op_stop_sound(),
            Opcode::StopMusic => self.op_stop_music(),
            Opcode::IsSoundRunning => self.op_is_sound_running(),
            Opcode::SoundKludge => self.op_sound_kludge(),

            Opcode::Dummy => {
                warn!(
                    "script {}: dummy opcode {byte:#04x} at {:#06x}",
                    self.script_number(),
                    self.opcode_pc
                );
                Ok(())
            }
        }
    }
}
