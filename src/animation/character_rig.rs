//! 角色绑定控制器
//!
//! 外部逐帧排队控制操作，overlay 时按入队顺序应用到目标关节后清空队列。

use bitflags::bitflags;
use glam::{Quat, Vec3};

use super::node::PoseOverlay;
use super::{AnimContext, AnimVariantMap};
use crate::skeleton::{Pose, Skeleton};

bitflags! {
    /// 控制器标志位
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct ControllerFlags: u8 {
        /// 覆盖旋转
        const ROTATION = 1 << 0;
        /// 覆盖位置
        const POSITION = 1 << 1;
    }
}

/// 单个控制操作，目标位于模型（几何）空间
#[derive(Clone, Copy, Debug)]
pub struct ControllerOp {
    pub joint_index: usize,
    pub target_position: Vec3,
    pub target_rotation: Quat,
    pub flags: ControllerFlags,
}

#[derive(Debug, Clone, Default)]
pub struct CharacterRig {
    ops: Vec<ControllerOp>,
}

impl CharacterRig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_operation(&mut self, op: ControllerOp) {
        self.ops.push(op);
    }

    #[inline]
    pub fn pending_operations(&self) -> &[ControllerOp] {
        &self.ops
    }

    pub fn clear_operations(&mut self) {
        self.ops.clear();
    }
}

impl PoseOverlay for CharacterRig {
    fn overlay(
        &mut self,
        skeleton: &Skeleton,
        _vars: &mut AnimVariantMap,
        _ctx: &AnimContext,
        _dt: f32,
        under: &[Pose],
    ) -> Vec<Pose> {
        let mut poses = under.to_vec();

        for op in self.ops.drain(..) {
            let j = op.joint_index;
            if j >= poses.len() {
                log::warn!("CharacterRig: 关节索引 {} 越界，跳过", j);
                continue;
            }

            let parent_abs = match skeleton.parent_index(j) {
                p if p >= 0 => skeleton.absolute_pose(p as usize, &poses),
                _ => Pose::IDENTITY,
            };

            if op.flags.contains(ControllerFlags::ROTATION) {
                poses[j].rotation = (parent_abs.rotation.inverse() * op.target_rotation).normalize();
            }
            if op.flags.contains(ControllerFlags::POSITION) {
                poses[j].translation = parent_abs.inverse_transform_point(op.target_position);
            }
        }

        poses
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skeleton::Joint;

    fn skeleton() -> Skeleton {
        Skeleton::new(vec![
            Joint::new("Hips", -1, Pose::from_translation(Vec3::new(0.0, 1.0, 0.0))),
            Joint::new("Head", 0, Pose::from_translation(Vec3::new(0.0, 0.5, 0.0))),
        ])
        .unwrap()
    }

    #[test]
    fn test_applies_and_clears_operations() {
        let skeleton = skeleton();
        let mut rig = CharacterRig::new();
        let head_rot = Quat::from_rotation_y(0.7);
        rig.add_operation(ControllerOp {
            joint_index: 1,
            target_position: Vec3::new(0.2, 1.6, 0.0),
            target_rotation: head_rot,
            flags: ControllerFlags::ROTATION | ControllerFlags::POSITION,
        });

        let mut vars = AnimVariantMap::new();
        let under = skeleton.relative_default_poses().to_vec();
        let out = rig.overlay(&skeleton, &mut vars, &AnimContext::default(), 0.016, &under);
        let abs = skeleton.convert_relative_to_absolute(&out);

        assert!(abs[1].translation.abs_diff_eq(Vec3::new(0.2, 1.6, 0.0), 1e-5));
        assert!(abs[1].rotation.abs_diff_eq(head_rot, 1e-5));
        assert!(rig.pending_operations().is_empty());
    }

    #[test]
    fn test_rotation_only_keeps_translation() {
        let skeleton = skeleton();
        let mut rig = CharacterRig::new();
        rig.add_operation(ControllerOp {
            joint_index: 0,
            target_position: Vec3::new(9.0, 9.0, 9.0),
            target_rotation: Quat::from_rotation_x(0.3),
            flags: ControllerFlags::ROTATION,
        });
        rig.add_operation(ControllerOp {
            joint_index: 42,
            target_position: Vec3::ZERO,
            target_rotation: Quat::IDENTITY,
            flags: ControllerFlags::POSITION,
        });

        let mut vars = AnimVariantMap::new();
        let under = skeleton.relative_default_poses().to_vec();
        let out = rig.overlay(&skeleton, &mut vars, &AnimContext::default(), 0.016, &under);
        assert_eq!(out[0].translation, under[0].translation);
        assert!(out[0].rotation.abs_diff_eq(Quat::from_rotation_x(0.3), 1e-6));
    }

    #[test]
    fn test_position_under_non_uniform_scaled_parent() {
        // 父关节旋转 90° 且 X 轴缩放 2 倍
        let skeleton = Skeleton::new(vec![
            Joint::new(
                "Hips",
                -1,
                Pose::new(
                    Vec3::new(1.0, 0.0, 0.0),
                    Quat::from_rotation_z(std::f32::consts::FRAC_PI_2),
                    Vec3::new(2.0, 1.0, 1.0),
                ),
            ),
            Joint::new("Head", 0, Pose::from_translation(Vec3::new(0.0, 0.5, 0.0))),
        ])
        .unwrap();

        let target = Vec3::new(3.0, 2.0, 0.5);
        let mut rig = CharacterRig::new();
        rig.add_operation(ControllerOp {
            joint_index: 1,
            target_position: target,
            target_rotation: Quat::IDENTITY,
            flags: ControllerFlags::POSITION,
        });

        let mut vars = AnimVariantMap::new();
        let under = skeleton.relative_default_poses().to_vec();
        let out = rig.overlay(&skeleton, &mut vars, &AnimContext::default(), 0.016, &under);
        let abs = skeleton.convert_relative_to_absolute(&out);
        assert!(abs[1].translation.abs_diff_eq(target, 1e-5), "{:?}", abs[1].translation);
    }
}
