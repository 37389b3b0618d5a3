//! 求值上下文

use glam::Mat4;

/// 每帧求值时传给所有节点的只读上下文
#[derive(Clone, Copy, Debug)]
pub struct AnimContext {
    /// 几何空间 -> rig 空间
    pub geometry_to_rig: Mat4,
}

impl Default for AnimContext {
    fn default() -> Self {
        Self {
            geometry_to_rig: Mat4::IDENTITY,
        }
    }
}

impl AnimContext {
    pub fn new(geometry_to_rig: Mat4) -> Self {
        Self { geometry_to_rig }
    }

    /// rig 空间 -> 几何空间
    #[inline]
    pub fn rig_to_geometry(&self) -> Mat4 {
        self.geometry_to_rig.inverse()
    }

    /// geometry_to_rig 的均匀缩放（取 X 轴长度）
    #[inline]
    pub fn geometry_to_rig_uniform_scale(&self) -> f32 {
        self.geometry_to_rig.x_axis.truncate().length()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{Quat, Vec3};

    #[test]
    fn test_uniform_scale() {
        let ctx = AnimContext::new(Mat4::from_scale_rotation_translation(
            Vec3::splat(0.01),
            Quat::from_rotation_y(1.0),
            Vec3::ONE,
        ));
        assert!((ctx.geometry_to_rig_uniform_scale() - 0.01).abs() < 1e-6);
        assert_eq!(AnimContext::default().geometry_to_rig_uniform_scale(), 1.0);
    }

    #[test]
    fn test_rig_to_geometry_inverts() {
        let ctx = AnimContext::new(Mat4::from_scale_rotation_translation(
            Vec3::splat(0.5),
            Quat::from_rotation_y(0.3),
            Vec3::new(1.0, 2.0, 3.0),
        ));
        let p = Vec3::new(0.4, -1.0, 2.0);
        let back = ctx.rig_to_geometry().transform_point3(ctx.geometry_to_rig.transform_point3(p));
        assert!(back.abs_diff_eq(p, 1e-5));
    }
}
