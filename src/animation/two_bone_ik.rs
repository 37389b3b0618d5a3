//! 两骨 IK 叠加节点
//!
//! 读取末端目标（rig 空间）并解析求解 base/mid/tip 三个关节，
//! 输出按 alpha 与输入姿态混合。

use glam::Quat;

use super::node::PoseOverlay;
use super::{AnimContext, AnimVariantMap};
use crate::skeleton::{set_absolute_rotation, solve_two_bone_mid, Pose, PoseChain, Skeleton};

/// 链容量
pub const TWO_BONE_CHAIN_CAPACITY: usize = 16;

#[derive(Debug, Clone)]
pub struct TwoBoneIk {
    pub alpha: f32,
    pub enabled: bool,
    base_joint_name: String,
    mid_joint_name: String,
    tip_joint_name: String,
    pub alpha_var: String,
    pub enabled_var: String,
    pub end_effector_position_var: String,
    pub end_effector_rotation_var: String,
    /// 求解后的中间关节位置写入此触发变量（为空则不写）
    pub mid_target_var: String,
    base_index: Option<usize>,
    mid_index: Option<usize>,
    tip_index: Option<usize>,
}

impl TwoBoneIk {
    pub fn new(
        base_joint_name: impl Into<String>,
        mid_joint_name: impl Into<String>,
        tip_joint_name: impl Into<String>,
        end_effector_position_var: impl Into<String>,
        end_effector_rotation_var: impl Into<String>,
    ) -> Self {
        Self {
            alpha: 1.0,
            enabled: true,
            base_joint_name: base_joint_name.into(),
            mid_joint_name: mid_joint_name.into(),
            tip_joint_name: tip_joint_name.into(),
            alpha_var: String::new(),
            enabled_var: String::new(),
            end_effector_position_var: end_effector_position_var.into(),
            end_effector_rotation_var: end_effector_rotation_var.into(),
            mid_target_var: String::new(),
            base_index: None,
            mid_index: None,
            tip_index: None,
        }
    }

    fn solve(
        &self,
        skeleton: &Skeleton,
        vars: &mut AnimVariantMap,
        chain: &mut PoseChain<TWO_BONE_CHAIN_CAPACITY>,
        (base, mid, tip): (usize, usize, usize),
    ) -> bool {
        let base_abs = chain.absolute_pose(base);
        let mid_abs = chain.absolute_pose(mid);
        let tip_abs = chain.absolute_pose(tip);

        let target_pos =
            vars.lookup_rig_to_geometry_vec3(&self.end_effector_position_var, tip_abs.translation);
        let target_rot =
            vars.lookup_rig_to_geometry_quat(&self.end_effector_rotation_var, tip_abs.rotation);

        let Some(new_mid) =
            solve_two_bone_mid(base_abs.translation, mid_abs.translation, tip_abs.translation, target_pos)
        else {
            return false;
        };

        // base: 把 mid 转到求解位置
        let from = (mid_abs.translation - base_abs.translation).normalize();
        let to = (new_mid - base_abs.translation).normalize();
        set_absolute_rotation(chain, skeleton, base, Quat::from_rotation_arc(from, to) * base_abs.rotation);

        // mid: 让 tip 指向目标
        let mid_abs = chain.absolute_pose(mid);
        let tip_pos = chain.absolute_pose(tip).translation;
        let r1 = (tip_pos - mid_abs.translation).length();
        let tip_goal = new_mid + (target_pos - new_mid).normalize_or_zero() * r1;
        let to_tip = (tip_pos - mid_abs.translation).normalize_or_zero();
        let to_goal = (tip_goal - mid_abs.translation).normalize_or_zero();
        if to_tip != glam::Vec3::ZERO && to_goal != glam::Vec3::ZERO {
            let delta = Quat::from_rotation_arc(to_tip, to_goal);
            set_absolute_rotation(chain, skeleton, mid, delta * mid_abs.rotation);
        }

        // tip: 直接使用目标朝向
        set_absolute_rotation(chain, skeleton, tip, target_rot);

        if !self.mid_target_var.is_empty() {
            vars.set_vec3(self.mid_target_var.clone(), new_mid);
        }
        true
    }
}

impl PoseOverlay for TwoBoneIk {
    fn bind_skeleton(&mut self, skeleton: &Skeleton) {
        let lookup = |name: &str| {
            let index = skeleton.find_joint_by_name(name);
            if index.is_none() {
                log::warn!("TwoBoneIK: 找不到关节 '{}'，节点将透传", name);
            }
            index
        };
        self.base_index = lookup(&self.base_joint_name);
        self.mid_index = lookup(&self.mid_joint_name);
        self.tip_index = lookup(&self.tip_joint_name);
    }

    fn overlay(
        &mut self,
        skeleton: &Skeleton,
        vars: &mut AnimVariantMap,
        _ctx: &AnimContext,
        _dt: f32,
        under: &[Pose],
    ) -> Vec<Pose> {
        let (Some(base), Some(mid), Some(tip)) = (self.base_index, self.mid_index, self.tip_index) else {
            return under.to_vec();
        };

        let alpha = vars.lookup_f32(&self.alpha_var, self.alpha).clamp(0.0, 1.0);
        let enabled = vars.lookup_bool(&self.enabled_var, self.enabled);
        if !enabled || alpha <= 0.0 {
            return under.to_vec();
        }

        let mut chain = PoseChain::<TWO_BONE_CHAIN_CAPACITY>::new();
        if !chain.build_from_relative_poses(skeleton, under, tip) {
            return under.to_vec();
        }
        if !chain.contains(base) || !chain.contains(mid) {
            log::warn!(
                "TwoBoneIK: '{}' 与 '{}' 不在 '{}' 的父链上",
                self.base_joint_name, self.mid_joint_name, self.tip_joint_name
            );
            return under.to_vec();
        }

        if !self.solve(skeleton, vars, &mut chain, (base, mid, tip)) {
            return under.to_vec();
        }

        let mut solved = under.to_vec();
        chain.output_relative_poses(&mut solved);

        let mut out = under.to_vec();
        for elem in chain.elements() {
            let j = elem.joint_index;
            out[j] = under[j].blend(&solved[j], alpha);
        }
        out
    }
}
