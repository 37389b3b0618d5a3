//! 运动匹配
//!
//! 每帧：
//! 1. 帧游标按 dt * FPS 前进并夹到数据库范围
//! 2. 读取 rig 髋部姿态（只保留偏航），把期望的髋部线速度/角速度转到该局部空间，积分出四个时间跨度上的目标轨迹
//! 3. 穷举所有行计算代价：当前特征代价 + K_F * 未来代价
//! 4. 最小代价行（相同代价取最小索引）
//! 5. 滞后：最佳帧与游标相距不足 K_LW * FPS 帧时继续播放，否则跳转
//! 6. 输出髋部相对姿态；双脚目标经 rig_to_geometry * rig 髋部姿态 变换后写入触发变量供下游 IK 使用
//!
//! 数据库不存速度列，速度特征在构建时由相邻帧差分得到。

use std::path::Path;

use glam::{Quat, Vec3, Vec4};
use rayon::prelude::*;

use super::motion_database::{MotionDatabase, MotionRow, TRAJECTORY_SAMPLES};
use super::node::PoseGenerator;
use super::{AnimContext, AnimVariantMap};
use crate::skeleton::{Pose, Skeleton};

/// 数据库采样帧率
pub const MOTION_MATCHING_FPS: f32 = 90.0;
/// 未来轨迹采样点（帧）
pub const TRAJECTORY_HORIZONS: [u32; TRAJECTORY_SAMPLES] = [18, 36, 62, 90];

/// 代价系数（变量总线缺省值）
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MotionMatchingConfig {
    /// 脚位置权重 K_FP，默认 1.0
    pub foot_position: f32,
    /// 脚旋转权重 K_FR，默认 0.5
    pub foot_rotation: f32,
    /// 脚线速度权重 K_FV，默认 0.25
    pub foot_velocity: f32,
    /// 脚角速度权重 K_FAV，默认 0.0
    pub foot_angular_velocity: f32,
    /// 髋部位置权重 K_HP，默认 1.0
    pub hips_position: f32,
    /// 未来轨迹权重 K_FT，默认 1.0
    pub future_trajectory: f32,
    /// 未来髋部线速度权重 K_HV，默认 1.0
    pub hips_velocity: f32,
    /// 未来髋部角速度权重 K_HAV，默认 0.0
    pub hips_angular_velocity: f32,
    /// 未来代价整体系数 K_F，默认 0.25
    pub future: f32,
    /// 同位置窗口（秒）K_LW，默认 0.2
    pub same_location_window: f32,
}

impl Default for MotionMatchingConfig {
    fn default() -> Self {
        Self {
            foot_position: 1.0,
            foot_rotation: 0.5,
            foot_velocity: 0.25,
            foot_angular_velocity: 0.0,
            hips_position: 1.0,
            future_trajectory: 1.0,
            hips_velocity: 1.0,
            hips_angular_velocity: 0.0,
            future: 0.25,
            same_location_window: 0.2,
        }
    }
}

impl MotionMatchingConfig {
    /// 从变量总线读取，缺失时使用自身值
    pub fn lookup(&self, vars: &AnimVariantMap) -> Self {
        Self {
            foot_position: vars.lookup_f32("K_FP", self.foot_position),
            foot_rotation: vars.lookup_f32("K_FR", self.foot_rotation),
            foot_velocity: vars.lookup_f32("K_FV", self.foot_velocity),
            foot_angular_velocity: vars.lookup_f32("K_FAV", self.foot_angular_velocity),
            hips_position: vars.lookup_f32("K_HP", self.hips_position),
            future_trajectory: vars.lookup_f32("K_FT", self.future_trajectory),
            hips_velocity: vars.lookup_f32("K_HV", self.hips_velocity),
            hips_angular_velocity: vars.lookup_f32("K_HAV", self.hips_angular_velocity),
            future: vars.lookup_f32("K_F", self.future),
            same_location_window: vars.lookup_f32("K_LW", self.same_location_window),
        }
    }
}

/// 触发输出与输入变量名
#[derive(Clone, Debug)]
pub struct MotionMatchingVars {
    /// rig 空间髋部位置（输入）
    pub hips_position: String,
    /// rig 空间髋部旋转（输入，滚转与俯仰会被去掉）
    pub hips_rotation: String,
    pub hips_velocity: String,
    pub hips_angular_velocity: String,
    pub left_foot_position: String,
    pub left_foot_rotation: String,
    pub right_foot_position: String,
    pub right_foot_rotation: String,
    pub frame: String,
}

impl Default for MotionMatchingVars {
    fn default() -> Self {
        Self {
            hips_position: "hipsPosition".to_string(),
            hips_rotation: "hipsRotation".to_string(),
            hips_velocity: "hipsVelocity".to_string(),
            hips_angular_velocity: "hipsAngularVelocity".to_string(),
            left_foot_position: "leftFootPosition".to_string(),
            left_foot_rotation: "leftFootRotation".to_string(),
            right_foot_position: "rightFootPosition".to_string(),
            right_foot_rotation: "rightFootRotation".to_string(),
            frame: "motionMatchingFrame".to_string(),
        }
    }
}

/// 每行的速度特征（单位：每秒）
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RowVelocities {
    pub left_foot: Vec3,
    pub left_foot_angular: Vec3,
    pub right_foot: Vec3,
    pub right_foot_angular: Vec3,
    /// 髋部线速度，表示在该行髋部偏航局部空间
    pub hips: Vec3,
    pub hips_angular: Vec3,
}

impl RowVelocities {
    /// 相邻帧差分：优先与下一帧，片段末尾与上一帧，孤立帧为零。非有限值记为零。
    pub fn derive(rows: &[MotionRow]) -> Vec<RowVelocities> {
        (0..rows.len())
            .map(|i| {
                let next = rows.get(i + 1).filter(|n| is_next_frame(&rows[i], n));
                let prev = i
                    .checked_sub(1)
                    .map(|p| &rows[p])
                    .filter(|p| is_next_frame(p, &rows[i]));
                match (next, prev) {
                    (Some(next), _) => Self::between(&rows[i], next),
                    (None, Some(prev)) => Self::between(prev, &rows[i]),
                    (None, None) => Self::default(),
                }
            })
            .collect()
    }

    fn between(a: &MotionRow, b: &MotionRow) -> Self {
        let heading_inv = cancel_roll_and_pitch(a.hips_rotation()).inverse();
        let linear = |pa: Vec3, pb: Vec3| finite_or_zero((pb - pa) * MOTION_MATCHING_FPS);
        let angular = |qa: Quat, qb: Quat| finite_or_zero(rotation_delta(qa, qb) * MOTION_MATCHING_FPS);
        Self {
            left_foot: linear(a.left_foot_position(), b.left_foot_position()),
            left_foot_angular: angular(a.left_foot_rotation(), b.left_foot_rotation()),
            right_foot: linear(a.right_foot_position(), b.right_foot_position()),
            right_foot_angular: angular(a.right_foot_rotation(), b.right_foot_rotation()),
            hips: heading_inv * linear(a.hips_position(), b.hips_position()),
            hips_angular: heading_inv * angular(a.hips_rotation(), b.hips_rotation()),
        }
    }
}

#[inline]
fn is_next_frame(a: &MotionRow, b: &MotionRow) -> bool {
    (b.frame_id() - a.frame_id() - 1.0).abs() < 0.5
}

#[inline]
fn finite_or_zero(v: Vec3) -> Vec3 {
    if v.is_finite() {
        v
    } else {
        Vec3::ZERO
    }
}

/// a -> b 的旋转增量（轴 * 角度），取最短路径
#[inline]
fn rotation_delta(a: Quat, b: Quat) -> Vec3 {
    let delta = b * a.inverse();
    let delta = if delta.w < 0.0 { -delta } else { delta };
    delta.to_scaled_axis()
}

/// 去掉滚转与俯仰，只保留绕 Y 轴的偏航
pub fn cancel_roll_and_pitch(rotation: Quat) -> Quat {
    let forward = rotation * Vec3::Z;
    let flat = Vec3::new(forward.x, 0.0, forward.z);
    if flat.length_squared() < 1e-8 {
        return Quat::IDENTITY;
    }
    Quat::from_rotation_y(flat.x.atan2(flat.z))
}

/// 行数据 + 速度特征
#[derive(Clone, Copy, Debug)]
pub struct MotionSample<'a> {
    pub row: &'a MotionRow,
    pub velocities: &'a RowVelocities,
}

/// 目标：未来轨迹与期望髋部速度（髋部偏航局部空间）
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct MotionGoal {
    pub trajectory: [Vec3; TRAJECTORY_SAMPLES],
    pub hips_velocity: Vec3,
    pub hips_angular_velocity: Vec3,
}

impl MotionGoal {
    pub fn new(hips_velocity: Vec3, hips_angular_velocity: Vec3) -> Self {
        Self {
            trajectory: integrate_goal_trajectory(hips_velocity, hips_angular_velocity),
            hips_velocity,
            hips_angular_velocity,
        }
    }
}

/// 运动匹配节点（生成器）
#[derive(Debug, Clone)]
pub struct MotionMatching {
    database: MotionDatabase,
    velocities: Vec<RowVelocities>,
    pub config: MotionMatchingConfig,
    pub vars: MotionMatchingVars,
    hips_joint_name: String,
    hips_index: Option<usize>,
    frame: f32,
}

impl MotionMatching {
    pub fn new(database: MotionDatabase, hips_joint_name: impl Into<String>) -> Self {
        let velocities = RowVelocities::derive(database.rows());
        Self {
            database,
            velocities,
            config: MotionMatchingConfig::default(),
            vars: MotionMatchingVars::default(),
            hips_joint_name: hips_joint_name.into(),
            hips_index: None,
            frame: 0.0,
        }
    }

    /// 从文件构建；加载失败时记录警告并使用空数据库（节点永久不输出）
    pub fn from_file<P: AsRef<Path>>(path: P, hips_joint_name: impl Into<String>) -> Self {
        let path = path.as_ref();
        let database = match MotionDatabase::load(path) {
            Ok(db) => {
                log::info!("运动数据库加载完成: {} ({} 行)", path.display(), db.len());
                db
            }
            Err(e) => {
                log::warn!("运动数据库加载失败: {}: {}", path.display(), e);
                MotionDatabase::default()
            }
        };
        Self::new(database, hips_joint_name)
    }

    #[inline]
    pub fn database(&self) -> &MotionDatabase {
        &self.database
    }

    #[inline]
    pub fn row_velocities(&self) -> &[RowVelocities] {
        &self.velocities
    }

    #[inline]
    pub fn current_frame(&self) -> f32 {
        self.frame
    }

    pub fn set_frame(&mut self, frame: f32) {
        let last = self.database.len().saturating_sub(1) as f32;
        self.frame = frame.clamp(0.0, last);
    }

    #[inline]
    fn sample(&self, index: usize) -> Option<MotionSample<'_>> {
        Some(MotionSample {
            row: self.database.row(index)?,
            velocities: self.velocities.get(index)?,
        })
    }

    #[inline]
    fn current_index(&self) -> usize {
        self.frame.max(0.0) as usize
    }

    /// 最小代价行索引，相同代价取最小索引，NaN 不参与
    pub fn find_best_row(
        &self,
        current: MotionSample<'_>,
        goal: &MotionGoal,
        config: &MotionMatchingConfig,
    ) -> Option<(usize, f32)> {
        let (cost, index) = self
            .database
            .rows()
            .par_iter()
            .zip(self.velocities.par_iter())
            .enumerate()
            .map(|(i, (row, velocities))| {
                let candidate = MotionSample { row, velocities };
                let cost = current_cost(current, candidate, config) + config.future * future_cost(candidate, goal, config);
                (if cost.is_nan() { f32::INFINITY } else { cost }, i)
            })
            .reduce(|| (f32::INFINITY, usize::MAX), min_cost);

        if index == usize::MAX {
            None
        } else {
            Some((index, cost))
        }
    }
}

#[inline]
fn min_cost(a: (f32, usize), b: (f32, usize)) -> (f32, usize) {
    if a.0 < b.0 || (a.0 == b.0 && a.1 < b.1) {
        a
    } else {
        b
    }
}

/// 由期望速度积分出未来轨迹（髋部偏航局部空间）
pub fn integrate_goal_trajectory(velocity: Vec3, angular_velocity: Vec3) -> [Vec3; TRAJECTORY_SAMPLES] {
    let step_rot = Quat::from_scaled_axis(angular_velocity / MOTION_MATCHING_FPS);
    let step = velocity / MOTION_MATCHING_FPS;

    let mut goal = [Vec3::ZERO; TRAJECTORY_SAMPLES];
    let mut position = Vec3::ZERO;
    let mut heading = Quat::IDENTITY;
    let mut frame = 0;
    for (slot, &horizon) in goal.iter_mut().zip(TRAJECTORY_HORIZONS.iter()) {
        while frame < horizon {
            heading = (step_rot * heading).normalize();
            position += heading * step;
            frame += 1;
        }
        *slot = position;
    }
    goal
}

/// 四元数距离（处理 q 与 -q 等价）
#[inline]
fn quat_distance_squared(a: Quat, b: Quat) -> f32 {
    let b = if a.dot(b) < 0.0 { -b } else { b };
    (Vec4::from(a) - Vec4::from(b)).length_squared()
}

pub fn current_cost(current: MotionSample<'_>, candidate: MotionSample<'_>, config: &MotionMatchingConfig) -> f32 {
    let (cr, kr) = (current.row, candidate.row);
    let (cv, kv) = (current.velocities, candidate.velocities);

    let foot_position = cr.left_foot_position().distance_squared(kr.left_foot_position())
        + cr.right_foot_position().distance_squared(kr.right_foot_position());
    let foot_rotation = quat_distance_squared(cr.left_foot_rotation(), kr.left_foot_rotation())
        + quat_distance_squared(cr.right_foot_rotation(), kr.right_foot_rotation());
    let foot_velocity = cv.left_foot.distance_squared(kv.left_foot) + cv.right_foot.distance_squared(kv.right_foot);
    let foot_angular_velocity = cv.left_foot_angular.distance_squared(kv.left_foot_angular)
        + cv.right_foot_angular.distance_squared(kv.right_foot_angular);
    let hips = cr.hips_position().distance_squared(kr.hips_position());

    config.foot_position * foot_position
        + config.foot_rotation * foot_rotation
        + config.foot_velocity * foot_velocity
        + config.foot_angular_velocity * foot_angular_velocity
        + config.hips_position * hips
}

pub fn future_cost(candidate: MotionSample<'_>, goal: &MotionGoal, config: &MotionMatchingConfig) -> f32 {
    let trajectory: f32 = goal
        .trajectory
        .iter()
        .enumerate()
        .map(|(k, g)| candidate.row.trajectory(k).distance_squared(*g))
        .sum();
    let velocities = candidate.velocities;

    config.future_trajectory * trajectory
        + config.hips_velocity * velocities.hips.distance_squared(goal.hips_velocity)
        + config.hips_angular_velocity * velocities.hips_angular.distance_squared(goal.hips_angular_velocity)
}

impl PoseGenerator for MotionMatching {
    fn bind_skeleton(&mut self, skeleton: &Skeleton) {
        self.hips_index = skeleton.find_joint_by_name(&self.hips_joint_name);
        if self.hips_index.is_none() {
            log::warn!("MotionMatching: 找不到髋部关节 '{}'", self.hips_joint_name);
        }
    }

    fn evaluate(
        &mut self,
        skeleton: &Skeleton,
        vars: &mut AnimVariantMap,
        ctx: &AnimContext,
        dt: f32,
    ) -> Vec<Pose> {
        if self.database.is_empty() {
            return Vec::new();
        }

        // 1. 游标前进
        self.set_frame(self.frame + dt * MOTION_MATCHING_FPS);

        // 2. rig 髋部水平姿态与目标
        let config = self.config.lookup(vars);
        let rig_hips = Pose::from_rotation_translation(
            cancel_roll_and_pitch(vars.lookup_quat(&self.vars.hips_rotation, Quat::IDENTITY)),
            vars.lookup_vec3(&self.vars.hips_position, Vec3::ZERO),
        );
        let inv_heading = rig_hips.rotation.inverse();
        let velocity = vars.lookup_vec3(&self.vars.hips_velocity, Vec3::ZERO);
        let angular_velocity = vars.lookup_vec3(&self.vars.hips_angular_velocity, Vec3::ZERO);
        let goal = MotionGoal::new(inv_heading * velocity, inv_heading * angular_velocity);

        // 3-5. 搜索 + 滞后
        let best = self
            .sample(self.current_index())
            .and_then(|current| self.find_best_row(current, &goal, &config));
        if let Some((best, cost)) = best {
            let best_frame = self.database.rows()[best].frame_id();
            let window = config.same_location_window * MOTION_MATCHING_FPS;
            if (self.frame - best_frame).abs() >= window {
                log::debug!(
                    "MotionMatching: 跳转 {:.1} -> {} (cost={:.4})",
                    self.frame, best_frame, cost
                );
                self.set_frame(best_frame);
            }
        }

        let Some(row) = self.database.row(self.current_index()).copied() else {
            return Vec::new();
        };

        // 6. 输出：数据库姿态位于 rig 髋部水平空间，先到 rig 再到几何空间
        let to_geometry = Pose::from_matrix(ctx.rig_to_geometry()) * rig_hips;
        let mut poses = skeleton.relative_default_poses().to_vec();
        if let Some(hips) = self.hips_index {
            let mut hips_abs = to_geometry * Pose::from_rotation_translation(row.hips_rotation(), row.hips_position());
            hips_abs.scale = skeleton.absolute_default_pose(hips).scale;
            let parent_abs = match skeleton.parent_index(hips) {
                p if p >= 0 => skeleton.absolute_pose(p as usize, &poses),
                _ => Pose::IDENTITY,
            };
            poses[hips] = parent_abs.to_local(&hips_abs);
        }

        let left_foot = to_geometry * Pose::from_rotation_translation(row.left_foot_rotation(), row.left_foot_position());
        let right_foot = to_geometry * Pose::from_rotation_translation(row.right_foot_rotation(), row.right_foot_position());
        vars.set_vec3(self.vars.left_foot_position.clone(), left_foot.translation);
        vars.set_quat(self.vars.left_foot_rotation.clone(), left_foot.rotation);
        vars.set_vec3(self.vars.right_foot_position.clone(), right_foot.translation);
        vars.set_quat(self.vars.right_foot_rotation.clone(), right_foot.rotation);
        vars.set_f32(self.vars.frame.clone(), self.frame);

        poses
    }
}
