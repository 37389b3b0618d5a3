//! 物理配置
//!
//! 所有参数扁平化，直接在代码中修改默认值即可。
//! 配置随模拟上下文显式传递，不使用进程级全局状态。

use glam::Vec3;
use serde::{Deserialize, Serialize};

/// 重力区域配置（扁平化，不嵌套）
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GravityConfig {
    // ========== 默认重力 ==========
    /// 默认"上"方向，默认 (0, 1, 0)
    pub default_up: Vec3,
    /// 默认重力大小（带符号，负数表示与 up 相反），默认 -9.80665
    pub default_magnitude: f32,

    // ========== 判定 ==========
    /// 包含判定容差，默认 1e-4
    pub containment_epsilon: f32,

    // ========== 调试 ==========
    /// 区域是否可被拾取，默认 false
    pub zones_pickable: bool,
    /// 是否绘制区域调试框，默认 false
    pub debug_draw_zones: bool,
}

impl Default for GravityConfig {
    fn default() -> Self {
        Self {
            // ====== 默认重力 ======
            // 标准重力加速度，沿 -Y
            default_up: Vec3::Y,
            default_magnitude: -9.80665,

            // ====== 判定 ======
            containment_epsilon: 1e-4,

            // ====== 调试 ======
            zones_pickable: false,
            debug_draw_zones: false,
        }
    }
}

impl GravityConfig {
    /// 不在任何区域内时的重力
    #[inline]
    pub fn default_gravity(&self) -> Vec3 {
        self.default_up * self.default_magnitude
    }
}

/// 刚体世界配置
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysicsWorldConfig {
    // ========== 模拟参数 ==========
    /// 物理 FPS，默认 60.0
    pub physics_fps: f32,
    /// 每帧最大子步数，默认 5
    pub max_substep_count: u32,
    /// 求解器迭代次数，默认 4
    pub solver_iterations: usize,

    // ========== 速度限制 ==========
    /// 最大线速度 (m/s)，默认 100.0
    pub max_linear_velocity: f32,

    // ========== 调试 ==========
    /// 是否输出调试日志，默认 false
    pub debug_log: bool,
}

impl Default for PhysicsWorldConfig {
    fn default() -> Self {
        Self {
            // ====== 模拟参数 ======
            // 物理模拟的帧率（每秒计算多少次物理）
            // 建议范围: 30~120，60 是平衡点
            physics_fps: 60.0,

            // 每帧最多分成几个子步骤
            max_substep_count: 5,

            // 约束求解迭代次数，越高越稳定但越慢
            solver_iterations: 4,

            // ====== 速度限制 ======
            // 区域嵌套时重力方向突变，限制速度防止穿透
            max_linear_velocity: 100.0,

            // ====== 调试 ======
            debug_log: false,
        }
    }
}
