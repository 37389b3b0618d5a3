//! 通用 IK 叠加节点（CCD）
//!
//! 每个目标对应一条从末端开始的链，目标位置/朝向从变量总线读取（rig 空间）。

use super::node::PoseOverlay;
use super::{AnimContext, AnimVariantMap};
use crate::skeleton::{set_absolute_rotation, CcdParams, CcdSolver, Pose, PoseChain, Skeleton};

const CHAIN_CAPACITY: usize = 16;

/// IK 目标
#[derive(Debug, Clone)]
pub struct IkTarget {
    pub joint_name: String,
    pub position_var: String,
    /// 为空或变量不存在时不修改末端朝向
    pub rotation_var: String,
    joint_index: Option<usize>,
}

impl IkTarget {
    pub fn new(
        joint_name: impl Into<String>,
        position_var: impl Into<String>,
        rotation_var: impl Into<String>,
    ) -> Self {
        Self {
            joint_name: joint_name.into(),
            position_var: position_var.into(),
            rotation_var: rotation_var.into(),
            joint_index: None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct InverseKinematics {
    targets: Vec<IkTarget>,
    solver: CcdSolver,
}

impl InverseKinematics {
    pub fn new(params: CcdParams) -> Self {
        Self {
            targets: Vec::new(),
            solver: CcdSolver::new(params),
        }
    }

    /// 添加目标，需要重新绑定骨架后生效
    pub fn add_target(&mut self, target: IkTarget) {
        self.targets.push(target);
    }

    #[inline]
    pub fn targets(&self) -> &[IkTarget] {
        &self.targets
    }
}

impl PoseOverlay for InverseKinematics {
    fn bind_skeleton(&mut self, skeleton: &Skeleton) {
        for target in &mut self.targets {
            target.joint_index = skeleton.find_joint_by_name(&target.joint_name);
            if target.joint_index.is_none() {
                log::warn!("InverseKinematics: 找不到关节 '{}'，该目标将被忽略", target.joint_name);
            }
        }
    }

    fn overlay(
        &mut self,
        skeleton: &Skeleton,
        vars: &mut AnimVariantMap,
        _ctx: &AnimContext,
        _dt: f32,
        under: &[Pose],
    ) -> Vec<Pose> {
        let mut poses = under.to_vec();

        for target in &self.targets {
            let Some(tip) = target.joint_index else {
                continue;
            };
            if !vars.has(&target.position_var) {
                continue;
            }

            let mut chain = PoseChain::<CHAIN_CAPACITY>::new();
            if !chain.build_from_relative_poses(skeleton, &poses, tip) {
                continue;
            }

            let tip_abs = chain.absolute_pose(tip);
            let goal = vars.lookup_rig_to_geometry_vec3(&target.position_var, tip_abs.translation);
            self.solver.solve(&mut chain, skeleton, tip, goal);

            if vars.has(&target.rotation_var) {
                let rot = vars.lookup_rig_to_geometry_quat(&target.rotation_var, tip_abs.rotation);
                set_absolute_rotation(&mut chain, skeleton, tip, rot);
            }

            chain.output_relative_poses(&mut poses);
        }

        poses
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skeleton::Joint;
    use glam::{Quat, Vec3};

    fn spine() -> Skeleton {
        Skeleton::new(vec![
            Joint::new("Hips", -1, Pose::IDENTITY),
            Joint::new("Spine", 0, Pose::from_translation(Vec3::Y)),
            Joint::new("Chest", 1, Pose::from_translation(Vec3::Y)),
            Joint::new("Head", 2, Pose::from_translation(Vec3::Y)),
        ])
        .unwrap()
    }

    #[test]
    fn test_ccd_overlay_moves_tip_toward_target() {
        let skeleton = spine();
        let mut ik = InverseKinematics::new(CcdParams {
            iterations: 64,
            ..Default::default()
        });
        ik.add_target(IkTarget::new("Head", "headPosition", "headRotation"));
        ik.bind_skeleton(&skeleton);

        let mut vars = AnimVariantMap::new();
        let goal = Vec3::new(1.0, 2.5, 0.0);
        let rot = Quat::from_rotation_y(0.5);
        vars.set_vec3("headPosition", goal);
        vars.set_quat("headRotation", rot);

        let under = skeleton.relative_default_poses().to_vec();
        let out = ik.overlay(&skeleton, &mut vars, &AnimContext::default(), 0.016, &under);
        let abs = skeleton.convert_relative_to_absolute(&out);
        assert!((abs[3].translation - goal).length() < 0.05);
        assert!((abs[3].rotation * Vec3::X).abs_diff_eq(rot * Vec3::X, 1e-4));
    }

    #[test]
    fn test_missing_target_var_passes_through() {
        let skeleton = spine();
        let mut ik = InverseKinematics::default();
        ik.add_target(IkTarget::new("Head", "headPosition", ""));
        ik.add_target(IkTarget::new("Tail", "tailPosition", ""));
        ik.bind_skeleton(&skeleton);
        let mut vars = AnimVariantMap::new();
        let under = skeleton.relative_default_poses().to_vec();
        let out = ik.overlay(&skeleton, &mut vars, &AnimContext::default(), 0.016, &under);
        assert_eq!(out, under);
    }
}
