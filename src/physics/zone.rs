//! 重力区域体积
//!
//! 区域是一个带朝向的盒子（由位置、旋转、尺寸和注册点定义），
//! 同时维护世界空间 AABB 用于快速排除，以及体积用于嵌套时的优先级。

use glam::{Quat, Vec3};

use super::config::GravityConfig;

/// 重力效果
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum GravityEffect {
    /// 不改变默认重力
    None,
    /// 指向区域中心，大小恒定
    Spherical { g_force: f32 },
    /// 与 Spherical 相同的计算方式
    Planetoid { g_force: f32 },
    /// 沿固定 up 方向（世界空间）
    Linear { g_force: f32, up: Vec3 },
}

/// 区域变换
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ZoneTransform {
    pub position: Vec3,
    pub rotation: Quat,
    pub dimensions: Vec3,
    /// 注册点（0..1，相对尺寸），默认 (0.5, 0.5, 0.5) 即中心
    pub registration_point: Vec3,
}

impl Default for ZoneTransform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            dimensions: Vec3::ONE,
            registration_point: Vec3::splat(0.5),
        }
    }
}

/// 世界空间轴对齐包围盒
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    #[inline]
    pub fn contains(&self, p: Vec3, epsilon: f32) -> bool {
        p.cmpge(self.min - Vec3::splat(epsilon)).all() && p.cmple(self.max + Vec3::splat(epsilon)).all()
    }
}

/// 区域体积
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ZoneVolume {
    transform: ZoneTransform,
    effect: GravityEffect,
    world_to_local: Quat,
    oobb_min: Vec3,
    oobb_max: Vec3,
    aabb: Aabb,
    volume: f32,
}

impl ZoneVolume {
    pub fn new(transform: ZoneTransform, effect: GravityEffect) -> Self {
        let dims = transform.dimensions.abs();
        let rotation = transform.rotation.normalize();
        let oobb_min = -dims * transform.registration_point;
        let oobb_max = dims - dims * transform.registration_point;

        // 8 个角点旋转后求 AABB
        let mut min = Vec3::splat(f32::MAX);
        let mut max = Vec3::splat(f32::MIN);
        for world in box_corners(transform.position, rotation, oobb_min, oobb_max) {
            min = min.min(world);
            max = max.max(world);
        }

        Self {
            transform: ZoneTransform {
                dimensions: dims,
                rotation,
                ..transform
            },
            effect,
            world_to_local: rotation.inverse(),
            oobb_min,
            oobb_max,
            aabb: Aabb { min, max },
            volume: dims.x * dims.y * dims.z,
        }
    }

    #[inline]
    pub fn transform(&self) -> &ZoneTransform {
        &self.transform
    }

    #[inline]
    pub fn effect(&self) -> GravityEffect {
        self.effect
    }

    #[inline]
    pub fn aabb(&self) -> &Aabb {
        &self.aabb
    }

    #[inline]
    pub fn volume(&self) -> f32 {
        self.volume
    }

    /// 两阶段包含判定：AABB 快速排除，然后精确的朝向盒判定
    pub fn contains(&self, p: Vec3, epsilon: f32) -> bool {
        if !self.aabb.contains(p, epsilon) {
            return false;
        }
        let local = self.world_to_local * (p - self.transform.position);
        local.cmpge(self.oobb_min - Vec3::splat(epsilon)).all()
            && local.cmple(self.oobb_max + Vec3::splat(epsilon)).all()
    }

    /// 朝向盒的 8 个世界空间角点（调试绘制用）
    pub fn corners(&self) -> [Vec3; 8] {
        box_corners(
            self.transform.position,
            self.transform.rotation,
            self.oobb_min,
            self.oobb_max,
        )
    }

    /// 射线与朝向盒求交，返回沿射线的进入距离（起点在盒内时为 0）
    pub fn ray_intersection(&self, origin: Vec3, direction: Vec3) -> Option<f32> {
        let o = self.world_to_local * (origin - self.transform.position);
        let d = self.world_to_local * direction;
        let mut t_min = 0.0f32;
        let mut t_max = f32::INFINITY;
        for axis in 0..3 {
            let (lo, hi) = (self.oobb_min[axis], self.oobb_max[axis]);
            if d[axis].abs() < f32::EPSILON {
                if o[axis] < lo || o[axis] > hi {
                    return None;
                }
                continue;
            }
            let inv = 1.0 / d[axis];
            let (t0, t1) = ((lo - o[axis]) * inv, (hi - o[axis]) * inv);
            t_min = t_min.max(t0.min(t1));
            t_max = t_max.min(t0.max(t1));
            if t_min > t_max {
                return None;
            }
        }
        Some(t_min)
    }

    /// 该点处的重力
    pub fn gravity_at(&self, p: Vec3, config: &GravityConfig) -> Vec3 {
        match self.effect {
            GravityEffect::None => config.default_gravity(),
            GravityEffect::Spherical { g_force } | GravityEffect::Planetoid { g_force } => {
                let delta = p - self.transform.position;
                let len = delta.length();
                if len > config.containment_epsilon {
                    delta * (g_force / len)
                } else {
                    config.default_up * g_force
                }
            }
            GravityEffect::Linear { g_force, up } => up.try_normalize().unwrap_or(config.default_up) * g_force,
        }
    }

    /// 该点处的"上"方向
    pub fn up_direction_at(&self, p: Vec3, config: &GravityConfig) -> Vec3 {
        match self.effect {
            GravityEffect::None => config.default_up,
            GravityEffect::Spherical { .. } | GravityEffect::Planetoid { .. } => {
                let delta = p - self.transform.position;
                let len = delta.length();
                if len > config.containment_epsilon {
                    delta / len
                } else {
                    config.default_up
                }
            }
            GravityEffect::Linear { up, .. } => up.try_normalize().unwrap_or(config.default_up),
        }
    }
}

fn box_corners(position: Vec3, rotation: Quat, min: Vec3, max: Vec3) -> [Vec3; 8] {
    std::array::from_fn(|i| {
        let corner = Vec3::new(
            if i & 1 == 0 { min.x } else { max.x },
            if i & 2 == 0 { min.y } else { max.y },
            if i & 4 == 0 { min.z } else { max.z },
        );
        position + rotation * corner
    })
}
