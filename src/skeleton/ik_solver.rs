//! IK 求解器
//!
//! 设计原则：
//! - 两骨 IK 使用解析解（圆-圆求交），保持原有弯曲方向
//! - 极向量约束绕 base->tip 轴旋转整条肢体
//! - CCD 使用迭代求解，支持单步角度限制，结果变差时回退到最佳迭代

use glam::{Quat, Vec3};

use super::{Pose, PoseChain, Skeleton};

/// 退化几何判定阈值
pub const IK_EPSILON: f32 = 1e-4;

// ============================================================================
// 两骨 IK
// ============================================================================

/// 求解两骨 IK 的中间关节位置
///
/// `base`/`mid`/`tip` 为当前绝对位置，`target` 为末端目标位置。
/// 目标不可达时中间关节落在 base->target 直线上距离 r0 处。
/// 骨长或目标距离退化时返回 None，调用方应直接透传。
pub fn solve_two_bone_mid(base: Vec3, mid: Vec3, tip: Vec3, target: Vec3) -> Option<Vec3> {
    let r0 = (mid - base).length();
    let r1 = (tip - mid).length();
    let to_target = target - base;
    let d = to_target.length();

    if r0 < IK_EPSILON || r1 < IK_EPSILON || d < IK_EPSILON {
        return None;
    }

    let u = to_target / d;

    // 完全伸直
    if d + IK_EPSILON >= r0 + r1 {
        return Some(base + u * r0);
    }

    // 过近时把距离夹到可解区间，方向不变
    let d = d.max((r0 - r1).abs()).max(IK_EPSILON);

    let x = (d * d - r1 * r1 + r0 * r0) / (2.0 * d);
    let product = (-d + r1 - r0) * (-d - r1 + r0) * (-d + r1 + r0) * (d + r1 + r0);
    let y = product.max(0.0).sqrt() / (2.0 * d);

    let (_, v) = generate_basis(u, mid - base);
    Some(base + u * x + v * y)
}

/// 以 u 为主轴构建正交基，v 指向 hint 在垂直平面上的分量
fn generate_basis(u: Vec3, hint: Vec3) -> (Vec3, Vec3) {
    let mut w = u.cross(hint);
    if w.length_squared() < IK_EPSILON * IK_EPSILON {
        // hint 与 u 共线，任取一个垂直方向
        w = u.cross(u.any_orthogonal_vector());
    }
    let w = w.normalize();
    let v = w.cross(u).normalize();
    (w, v)
}

// ============================================================================
// 极向量
// ============================================================================

/// 计算使参考向量朝向极向量所需的旋转（绕 base-tip 轴）
///
/// 向量退化或与轴平行时返回 None。
pub fn pole_vector_delta(base: Vec3, tip: Vec3, reference: Vec3, pole: Vec3) -> Option<Quat> {
    let axis = base - tip;
    if axis.length_squared() < IK_EPSILON * IK_EPSILON {
        return None;
    }
    let axis = axis.normalize();

    let ref_proj = reference - axis * reference.dot(axis);
    let pole_proj = pole - axis * pole.dot(axis);
    if ref_proj.length_squared() < IK_EPSILON * IK_EPSILON
        || pole_proj.length_squared() < IK_EPSILON * IK_EPSILON
    {
        return None;
    }

    let ref_proj = ref_proj.normalize();
    let pole_proj = pole_proj.normalize();
    let theta = ref_proj.cross(pole_proj).dot(axis).atan2(ref_proj.dot(pole_proj));
    Some(Quat::from_axis_angle(axis, theta))
}

// ============================================================================
// CCD
// ============================================================================

/// CCD 参数
#[derive(Clone, Copy, Debug)]
pub struct CcdParams {
    /// 最大迭代次数，默认 16
    pub iterations: u32,
    /// 参与旋转的关节数（不含末端），默认 3
    pub chain_length: usize,
    /// 单次旋转角度上限（弧度），默认 PI/4
    pub max_step_angle: f32,
    /// 提前结束的距离阈值，默认 1e-3
    pub tolerance: f32,
}

impl Default for CcdParams {
    fn default() -> Self {
        Self {
            iterations: 16,
            chain_length: 3,
            max_step_angle: std::f32::consts::FRAC_PI_4,
            tolerance: 1e-3,
        }
    }
}

/// CCD 求解器
#[derive(Clone, Debug, Default)]
pub struct CcdSolver {
    pub params: CcdParams,
}

impl CcdSolver {
    pub fn new(params: CcdParams) -> Self {
        Self { params }
    }

    /// 在链上求解，返回最终末端到目标的距离
    ///
    /// 每次迭代后检查距离，变差时恢复最佳结果并退出。
    pub fn solve<const N: usize>(
        &self,
        chain: &mut PoseChain<N>,
        skeleton: &Skeleton,
        tip_index: usize,
        target: Vec3,
    ) -> f32 {
        let links: Vec<usize> = chain
            .elements()
            .iter()
            .skip(1)
            .take(self.params.chain_length)
            .map(|e| e.joint_index)
            .collect();

        let mut best_distance = (chain.absolute_pose(tip_index).translation - target).length();
        let mut best_chain = chain.clone();

        for _ in 0..self.params.iterations {
            if best_distance < self.params.tolerance {
                break;
            }

            for &link in &links {
                self.solve_link(chain, skeleton, link, tip_index, target);
            }

            let distance = (chain.absolute_pose(tip_index).translation - target).length();
            if distance < best_distance {
                best_distance = distance;
                best_chain = chain.clone();
            } else {
                // 恢复最佳结果并退出
                *chain = best_chain;
                return best_distance;
            }
        }

        best_distance
    }

    fn solve_link<const N: usize>(
        &self,
        chain: &mut PoseChain<N>,
        skeleton: &Skeleton,
        link: usize,
        tip_index: usize,
        target: Vec3,
    ) {
        let link_abs = chain.absolute_pose(link);
        let tip_pos = chain.absolute_pose(tip_index).translation;

        let to_tip = (tip_pos - link_abs.translation).normalize_or_zero();
        let to_target = (target - link_abs.translation).normalize_or_zero();
        if to_tip.length_squared() < 1e-8 || to_target.length_squared() < 1e-8 {
            return;
        }

        let angle = to_tip.dot(to_target).clamp(-1.0, 1.0).acos();
        if angle < 1e-5 {
            return;
        }
        let angle = angle.min(self.params.max_step_angle);

        let axis = to_tip.cross(to_target).normalize_or_zero();
        if axis.length_squared() < 1e-8 {
            return;
        }

        let delta_rot = Quat::from_axis_angle(axis, angle);
        let parent_rot = match skeleton.parent_index(link) {
            p if p >= 0 => chain.absolute_pose(p as usize).rotation,
            _ => Quat::IDENTITY,
        };

        let mut rel = chain.relative_pose(link);
        rel.rotation = (parent_rot.inverse() * delta_rot * link_abs.rotation).normalize();
        chain.set_relative_pose(link, rel);
    }
}

/// 把绝对旋转转换为相对父关节的旋转并写入链
pub(crate) fn set_absolute_rotation<const N: usize>(
    chain: &mut PoseChain<N>,
    skeleton: &Skeleton,
    joint: usize,
    absolute_rotation: Quat,
) {
    let parent_rot = match skeleton.parent_index(joint) {
        p if p >= 0 => chain.absolute_pose(p as usize).rotation,
        _ => Quat::IDENTITY,
    };
    let rel = chain.relative_pose(joint);
    chain.set_relative_pose(
        joint,
        Pose {
            rotation: (parent_rot.inverse() * absolute_rotation).normalize(),
            ..rel
        },
    );
}
