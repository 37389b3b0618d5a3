//! 极向量约束
//!
//! 绕 base->tip 轴旋转 base 关节，使肢体的参考向量（mid 关节局部空间）
//! 朝向极向量；tip 反向旋转保持其绝对朝向不变。
//! 开关切换时从上一帧输出插值到新目标，避免跳变。

use glam::Vec3;

use super::node::PoseOverlay;
use super::{AnimContext, AnimVariantMap};
use crate::skeleton::{pole_vector_delta, set_absolute_rotation, Pose, PoseChain, Skeleton};

const CHAIN_CAPACITY: usize = 16;
/// 开关切换后的插值时长（秒）
pub const POLE_VECTOR_INTERP_DURATION: f32 = 0.2;

#[derive(Debug, Clone)]
pub struct PoleVectorConstraint {
    pub enabled: bool,
    /// mid 关节局部空间中的参考向量（通常是膝/肘的弯曲方向）
    pub reference_vector: Vec3,
    base_joint_name: String,
    mid_joint_name: String,
    tip_joint_name: String,
    pub enabled_var: String,
    pub pole_vector_var: String,
    base_index: Option<usize>,
    mid_index: Option<usize>,
    tip_index: Option<usize>,

    // ========== 插值状态 ==========
    was_enabled: bool,
    interp_alpha: Option<f32>,
    snapshot: Vec<Pose>,
    last_output: Vec<Pose>,
}

impl PoleVectorConstraint {
    pub fn new(
        reference_vector: Vec3,
        base_joint_name: impl Into<String>,
        mid_joint_name: impl Into<String>,
        tip_joint_name: impl Into<String>,
        enabled_var: impl Into<String>,
        pole_vector_var: impl Into<String>,
    ) -> Self {
        Self {
            enabled: false,
            reference_vector,
            base_joint_name: base_joint_name.into(),
            mid_joint_name: mid_joint_name.into(),
            tip_joint_name: tip_joint_name.into(),
            enabled_var: enabled_var.into(),
            pole_vector_var: pole_vector_var.into(),
            base_index: None,
            mid_index: None,
            tip_index: None,
            was_enabled: false,
            interp_alpha: None,
            snapshot: Vec::new(),
            last_output: Vec::new(),
        }
    }

    /// 是否正在开关插值中
    #[inline]
    pub fn is_interpolating(&self) -> bool {
        self.interp_alpha.is_some()
    }

    fn apply_pole(
        &self,
        chain: &mut PoseChain<CHAIN_CAPACITY>,
        skeleton: &Skeleton,
        vars: &AnimVariantMap,
        (base, mid, tip): (usize, usize, usize),
    ) {
        if !vars.has(&self.pole_vector_var) {
            return;
        }

        let base_abs = chain.absolute_pose(base);
        let mid_abs = chain.absolute_pose(mid);
        let tip_abs = chain.absolute_pose(tip);

        let reference = mid_abs.rotation * self.reference_vector;
        let pole = vars.lookup_rig_to_geometry_vector(&self.pole_vector_var, reference);

        let Some(delta) = pole_vector_delta(base_abs.translation, tip_abs.translation, reference, pole)
        else {
            return;
        };

        set_absolute_rotation(chain, skeleton, base, delta * base_abs.rotation);
        set_absolute_rotation(chain, skeleton, tip, tip_abs.rotation);
    }
}

impl PoseOverlay for PoleVectorConstraint {
    fn bind_skeleton(&mut self, skeleton: &Skeleton) {
        let lookup = |name: &str| {
            let index = skeleton.find_joint_by_name(name);
            if index.is_none() {
                log::warn!("PoleVectorConstraint: 找不到关节 '{}'，节点将透传", name);
            }
            index
        };
        self.base_index = lookup(&self.base_joint_name);
        self.mid_index = lookup(&self.mid_joint_name);
        self.tip_index = lookup(&self.tip_joint_name);
        self.interp_alpha = None;
        self.snapshot.clear();
        self.last_output.clear();
    }

    fn overlay(
        &mut self,
        skeleton: &Skeleton,
        vars: &mut AnimVariantMap,
        _ctx: &AnimContext,
        dt: f32,
        under: &[Pose],
    ) -> Vec<Pose> {
        let (Some(base), Some(mid), Some(tip)) = (self.base_index, self.mid_index, self.tip_index) else {
            return under.to_vec();
        };

        let mut chain = PoseChain::<CHAIN_CAPACITY>::new();
        if !chain.build_from_relative_poses(skeleton, under, tip) {
            return under.to_vec();
        }
        if !chain.contains(base) || !chain.contains(mid) {
            log::warn!(
                "PoleVectorConstraint: '{}' 与 '{}' 不在 '{}' 的父链上",
                self.base_joint_name, self.mid_joint_name, self.tip_joint_name
            );
            return under.to_vec();
        }

        let enabled = vars.lookup_bool(&self.enabled_var, self.enabled);
        if enabled {
            self.apply_pole(&mut chain, skeleton, vars, (base, mid, tip));
        }

        // 开关切换：以上一帧输出为起点开始插值
        if enabled != self.was_enabled && self.last_output.len() == under.len() {
            self.snapshot = self.last_output.clone();
            self.interp_alpha = Some(0.0);
        }
        self.was_enabled = enabled;

        if let Some(alpha) = self.interp_alpha {
            let alpha = alpha + dt / POLE_VECTOR_INTERP_DURATION;
            if alpha >= 1.0 {
                self.interp_alpha = None;
            } else {
                self.interp_alpha = Some(alpha);
                let mut snapshot_chain = PoseChain::<CHAIN_CAPACITY>::new();
                if snapshot_chain.build_from_relative_poses(skeleton, &self.snapshot, tip) {
                    snapshot_chain.blend(&chain, alpha);
                    chain = snapshot_chain;
                }
            }
        }

        let mut out = under.to_vec();
        chain.output_relative_poses(&mut out);
        self.last_output = out.clone();
        out
    }
}
