//! 骨骼系统
//!
//! 核心设计思想：
//! - Pose: 单个关节的刚体变换（平移 + 旋转 + 逐轴缩放）
//! - Skeleton: 只读的关节拓扑，加载后不可变
//! - PoseChain: 从末端到根的定长姿态链，懒惰重算绝对姿态
//! - ik_solver: 两骨 IK、极向量与 CCD 的纯数学部分

mod chain;
mod ik_solver;
mod topology;

pub use chain::{ChainElem, PoseChain};
pub use ik_solver::{
    pole_vector_delta, solve_two_bone_mid, CcdParams, CcdSolver, IK_EPSILON,
};
pub use topology::{Joint, Skeleton};

pub(crate) use ik_solver::set_absolute_rotation;

use std::ops::Mul;

use glam::{Mat4, Quat, Vec3};

// ============================================================================
// 公共类型定义
// ============================================================================

/// 关节姿态
///
/// 相对姿态表示在父关节局部空间中的变换，绝对姿态表示在模型空间中的变换。
/// 绝对姿态 = 父绝对姿态 * 自身相对姿态。
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Pose {
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for Pose {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Pose {
    pub const IDENTITY: Self = Self {
        translation: Vec3::ZERO,
        rotation: Quat::IDENTITY,
        scale: Vec3::ONE,
    };

    #[inline]
    pub fn new(translation: Vec3, rotation: Quat, scale: Vec3) -> Self {
        Self { translation, rotation, scale }
    }

    #[inline]
    pub fn from_translation(translation: Vec3) -> Self {
        Self { translation, ..Self::IDENTITY }
    }

    #[inline]
    pub fn from_rotation_translation(rotation: Quat, translation: Vec3) -> Self {
        Self { translation, rotation, scale: Vec3::ONE }
    }

    /// 转换为 4x4 矩阵
    #[inline]
    pub fn to_matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.translation)
    }

    /// 从矩阵分解
    #[inline]
    pub fn from_matrix(m: Mat4) -> Self {
        let (scale, rotation, translation) = m.to_scale_rotation_translation();
        Self { translation, rotation, scale }
    }

    /// 右逆：`self * self.inverse()` 恒为单位姿态
    ///
    /// 非均匀缩放叠加旋转时 `self.inverse() * x` 不等于 x 在本姿态下的局部值，
    /// 求局部姿态用 [`Pose::to_local`]。
    pub fn inverse(&self) -> Self {
        let inv_scale = recip_scale(self.scale);
        let inv_rot = self.rotation.inverse();
        Self {
            translation: inv_scale * (inv_rot * -self.translation),
            rotation: inv_rot,
            scale: inv_scale,
        }
    }

    /// transform_point 的逆：先去平移，再去旋转，最后去缩放
    #[inline]
    pub fn inverse_transform_point(&self, p: Vec3) -> Vec3 {
        recip_scale(self.scale) * (self.rotation.inverse() * (p - self.translation))
    }

    /// 把绝对姿态表示到本姿态的局部空间，满足 `self * self.to_local(abs) == abs`
    pub fn to_local(&self, absolute: &Pose) -> Pose {
        Pose {
            translation: self.inverse_transform_point(absolute.translation),
            rotation: (self.rotation.inverse() * absolute.rotation).normalize(),
            scale: recip_scale(self.scale) * absolute.scale,
        }
    }

    #[inline]
    pub fn transform_point(&self, p: Vec3) -> Vec3 {
        self.translation + self.rotation * (self.scale * p)
    }

    #[inline]
    pub fn transform_vector(&self, v: Vec3) -> Vec3 {
        self.rotation * (self.scale * v)
    }

    /// 混合：平移/缩放线性插值，旋转球面插值
    #[inline]
    pub fn blend(&self, other: &Pose, alpha: f32) -> Pose {
        Pose {
            translation: self.translation.lerp(other.translation, alpha),
            rotation: self.rotation.slerp(other.rotation, alpha).normalize(),
            scale: self.scale.lerp(other.scale, alpha),
        }
    }

    /// 近似比较（测试与调试用）
    pub fn abs_diff_eq(&self, other: &Pose, max_abs_diff: f32) -> bool {
        let rot_close = self.rotation.abs_diff_eq(other.rotation, max_abs_diff)
            || self.rotation.abs_diff_eq(-other.rotation, max_abs_diff);
        self.translation.abs_diff_eq(other.translation, max_abs_diff)
            && rot_close
            && self.scale.abs_diff_eq(other.scale, max_abs_diff)
    }
}

impl Mul for Pose {
    type Output = Pose;

    /// 组合：先应用 rhs，再应用 self
    #[inline]
    fn mul(self, rhs: Pose) -> Pose {
        Pose {
            translation: self.translation + self.rotation * (self.scale * rhs.translation),
            rotation: (self.rotation * rhs.rotation).normalize(),
            scale: self.scale * rhs.scale,
        }
    }
}

#[inline]
fn recip_scale(s: Vec3) -> Vec3 {
    Vec3::new(safe_recip(s.x), safe_recip(s.y), safe_recip(s.z))
}

#[inline]
fn safe_recip(v: f32) -> f32 {
    if v.abs() > f32::EPSILON {
        1.0 / v
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compose_translation_under_rotation() {
        let parent = Pose::from_rotation_translation(
            Quat::from_rotation_z(std::f32::consts::FRAC_PI_2),
            Vec3::new(1.0, 0.0, 0.0),
        );
        let child = Pose::from_translation(Vec3::new(1.0, 0.0, 0.0));
        let abs = parent * child;
        assert!(abs.translation.abs_diff_eq(Vec3::new(1.0, 1.0, 0.0), 1e-5));
    }

    #[test]
    fn test_compose_scale_is_per_axis() {
        let parent = Pose::new(Vec3::ZERO, Quat::IDENTITY, Vec3::new(2.0, 1.0, 3.0));
        let child = Pose::new(Vec3::new(1.0, 1.0, 1.0), Quat::IDENTITY, Vec3::new(0.5, 2.0, 1.0));
        let abs = parent * child;
        assert!(abs.translation.abs_diff_eq(Vec3::new(2.0, 1.0, 3.0), 1e-6));
        assert!(abs.scale.abs_diff_eq(Vec3::new(1.0, 2.0, 3.0), 1e-6));
    }

    #[test]
    fn test_inverse_round_trip() {
        let p = Pose::new(
            Vec3::new(0.3, -1.0, 2.0),
            Quat::from_euler(glam::EulerRot::XYZ, 0.2, 0.7, -0.4),
            Vec3::new(2.0, 0.5, 1.5),
        );
        let id = p * p.inverse();
        assert!(id.abs_diff_eq(&Pose::IDENTITY, 1e-5));
    }

    #[test]
    fn test_to_local_under_non_uniform_scale() {
        // 父姿态旋转 90° 且逐轴缩放不同
        let parent = Pose::new(
            Vec3::new(1.0, 0.0, 0.0),
            Quat::from_rotation_z(std::f32::consts::FRAC_PI_2),
            Vec3::new(2.0, 1.0, 1.0),
        );
        let target = Vec3::new(3.0, 2.0, 0.5);
        let local = parent.inverse_transform_point(target);
        assert!(parent.transform_point(local).abs_diff_eq(target, 1e-5));

        let abs = Pose::new(target, Quat::from_rotation_x(0.3), Vec3::new(1.0, 3.0, 0.5));
        let rel = parent.to_local(&abs);
        assert!((parent * rel).abs_diff_eq(&abs, 1e-5));
    }

    #[test]
    fn test_matrix_conversion() {
        let p = Pose::new(Vec3::new(1.0, 2.0, 3.0), Quat::from_rotation_y(0.5), Vec3::ONE);
        let q = Pose::from_matrix(p.to_matrix());
        assert!(p.abs_diff_eq(&q, 1e-5));
    }

    #[test]
    fn test_blend_endpoints() {
        let a = Pose::from_translation(Vec3::ZERO);
        let b = Pose::from_rotation_translation(Quat::from_rotation_x(1.0), Vec3::new(2.0, 0.0, 0.0));
        assert!(a.blend(&b, 0.0).abs_diff_eq(&a, 1e-6));
        assert!(a.blend(&b, 1.0).abs_diff_eq(&b, 1e-6));
        assert!(a.blend(&b, 0.5).translation.abs_diff_eq(Vec3::new(1.0, 0.0, 0.0), 1e-6));
    }
}
