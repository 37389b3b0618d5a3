//! 低速滤波
//!
//! 限制每个关节平移的变化速度，旋转和缩放直接透传。

use super::node::PoseOverlay;
use super::{AnimContext, AnimVariantMap};
use crate::skeleton::{Pose, Skeleton};

/// rig 空间的速度上限 (m/s)
pub const LINEAR_SPEED_LIMIT: f32 = 0.1;
const EPSILON: f32 = 1e-4;

#[derive(Debug, Clone, Default)]
pub struct LowVelocityFilter {
    prev_poses: Vec<Pose>,
}

impl LowVelocityFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// 清空缓存，下次求值直接跟随输入
    pub fn reset(&mut self) {
        self.prev_poses.clear();
    }
}

impl PoseOverlay for LowVelocityFilter {
    fn bind_skeleton(&mut self, _skeleton: &Skeleton) {
        self.reset();
    }

    fn overlay(
        &mut self,
        _skeleton: &Skeleton,
        _vars: &mut AnimVariantMap,
        ctx: &AnimContext,
        dt: f32,
        under: &[Pose],
    ) -> Vec<Pose> {
        if self.prev_poses.len() != under.len() {
            self.prev_poses = under.to_vec();
            return under.to_vec();
        }

        // 速度上限换算到几何空间
        let scale = ctx.geometry_to_rig_uniform_scale();
        let speed_limit = if scale > EPSILON {
            LINEAR_SPEED_LIMIT / scale
        } else {
            LINEAR_SPEED_LIMIT
        };
        let max_delta = speed_limit * dt;

        for (prev, target) in self.prev_poses.iter_mut().zip(under) {
            let delta = target.translation - prev.translation;
            let distance = delta.length();
            let translation = if distance < EPSILON || distance <= max_delta {
                target.translation
            } else {
                prev.translation + delta * (max_delta / distance)
            };
            *prev = Pose {
                translation,
                rotation: target.rotation,
                scale: target.scale,
            };
        }

        self.prev_poses.clone()
    }
}
