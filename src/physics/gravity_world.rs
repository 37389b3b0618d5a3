//! 重力区域刚体世界
//!
//! Rapier 全局重力设为零，每个动态刚体的重力由区域管理器逐步解析，
//! 以 F = m * g 的外力形式施加。
//! 流程：每帧 [应用区域变更 → 解析重力 → 固定子步 step → 限速]
//! 帧时间累积到时间余量中，只执行余量能覆盖的整数个固定子步。

use std::num::NonZeroUsize;

use glam::Vec3;
use rapier3d::prelude::*;

use super::config::PhysicsWorldConfig;
use super::manager::GravityZoneManager;

/// 世界内的刚体记录
#[derive(Clone, Copy, Debug)]
struct GravityBody {
    handle: RigidBodyHandle,
    mass: f32,
    /// 不在任何区域内时使用的重力
    own_gravity: Vec3,
    /// 最近一次解析出的重力
    gravity: Vec3,
}

pub struct GravityWorld {
    config: PhysicsWorldConfig,
    physics_pipeline: PhysicsPipeline,
    integration_parameters: IntegrationParameters,
    island_manager: IslandManager,
    broad_phase: DefaultBroadPhase,
    narrow_phase: NarrowPhase,
    rigid_body_set: RigidBodySet,
    collider_set: ColliderSet,
    impulse_joint_set: ImpulseJointSet,
    multibody_joint_set: MultibodyJointSet,
    ccd_solver: CCDSolver,
    query_pipeline: QueryPipeline,
    bodies: Vec<GravityBody>,
    /// 尚未模拟的时间
    accumulator: f32,
    /// 累计执行的固定子步数
    substep_count: u64,
}

#[inline]
fn to_vector(v: Vec3) -> Vector<Real> {
    vector![v.x, v.y, v.z]
}

#[inline]
fn from_vector(v: &Vector<Real>) -> Vec3 {
    Vec3::new(v.x, v.y, v.z)
}

impl GravityWorld {
    pub fn new(config: PhysicsWorldConfig) -> Self {
        let fps = if config.physics_fps > 0.0 { config.physics_fps } else { 60.0 };
        let mut integration_parameters = IntegrationParameters::default();
        integration_parameters.dt = 1.0 / fps;
        if let Some(iterations) = NonZeroUsize::new(config.solver_iterations) {
            integration_parameters.num_solver_iterations = iterations;
        }

        if config.debug_log {
            log::info!(
                "[重力世界] 创建: FPS={}, 最大子步={}, 求解器迭代={}",
                fps,
                config.max_substep_count,
                config.solver_iterations
            );
        }

        Self {
            config: PhysicsWorldConfig { physics_fps: fps, ..config },
            physics_pipeline: PhysicsPipeline::new(),
            integration_parameters,
            island_manager: IslandManager::new(),
            broad_phase: DefaultBroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            rigid_body_set: RigidBodySet::new(),
            collider_set: ColliderSet::new(),
            impulse_joint_set: ImpulseJointSet::new(),
            multibody_joint_set: MultibodyJointSet::new(),
            ccd_solver: CCDSolver::new(),
            query_pipeline: QueryPipeline::new(),
            bodies: Vec::new(),
            accumulator: 0.0,
            substep_count: 0,
        }
    }

    #[inline]
    pub fn config(&self) -> &PhysicsWorldConfig {
        &self.config
    }

    /// 添加一个球形动态刚体
    pub fn add_body(&mut self, position: Vec3, radius: f32, mass: f32, own_gravity: Vec3) -> RigidBodyHandle {
        let radius = if radius > 0.0 { radius } else { 0.01 };
        let mass = if mass > 0.0 {
            mass
        } else {
            log::warn!("[重力世界] 质量 {} 无效，使用 1.0", mass);
            1.0
        };

        let body = RigidBodyBuilder::dynamic().translation(to_vector(position)).build();
        let handle = self.rigid_body_set.insert(body);
        let collider = ColliderBuilder::ball(radius).mass(mass).build();
        self.collider_set
            .insert_with_parent(collider, handle, &mut self.rigid_body_set);

        self.bodies.push(GravityBody {
            handle,
            mass,
            own_gravity,
            gravity: own_gravity,
        });
        handle
    }

    /// 移除刚体，句柄未知时返回 false
    pub fn remove_body(&mut self, handle: RigidBodyHandle) -> bool {
        let Some(pos) = self.bodies.iter().position(|b| b.handle == handle) else {
            return false;
        };
        self.bodies.swap_remove(pos);
        self.rigid_body_set
            .remove(
                handle,
                &mut self.island_manager,
                &mut self.collider_set,
                &mut self.impulse_joint_set,
                &mut self.multibody_joint_set,
                true,
            )
            .is_some()
    }

    #[inline]
    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    #[inline]
    pub fn substep_count(&self) -> u64 {
        self.substep_count
    }

    /// 尚未模拟的时间（秒）
    #[inline]
    pub fn time_remainder(&self) -> f32 {
        self.accumulator
    }

    pub fn body_gravity(&self, handle: RigidBodyHandle) -> Option<Vec3> {
        self.bodies.iter().find(|b| b.handle == handle).map(|b| b.gravity)
    }

    pub fn body_position(&self, handle: RigidBodyHandle) -> Option<Vec3> {
        self.rigid_body_set.get(handle).map(|rb| from_vector(rb.translation()))
    }

    pub fn body_velocity(&self, handle: RigidBodyHandle) -> Option<Vec3> {
        self.rigid_body_set.get(handle).map(|rb| from_vector(rb.linvel()))
    }

    /// 推进模拟
    pub fn step(&mut self, delta_time: f32, zones: &GravityZoneManager) {
        zones.apply_zone_changes();
        {
            // 整步共享同一快照
            let snapshot = zones.read();
            for body in &mut self.bodies {
                if let Some(rb) = self.rigid_body_set.get(body.handle) {
                    let position = from_vector(rb.translation());
                    body.gravity = snapshot.resolve_body_gravity(position, body.own_gravity);
                }
            }
        }

        self.apply_gravity_forces();

        let fixed_dt = self.integration_parameters.dt;
        // 吸收浮点累加误差，避免整帧时间差一点凑不满一个子步
        let tolerance = fixed_dt * 1e-3;
        self.accumulator += delta_time.max(0.0);

        let gravity = vector![0.0, 0.0, 0.0];
        let mut num_substeps = 0;
        while self.accumulator + tolerance >= fixed_dt && num_substeps < self.config.max_substep_count {
            self.physics_pipeline.step(
                &gravity,
                &self.integration_parameters,
                &mut self.island_manager,
                &mut self.broad_phase,
                &mut self.narrow_phase,
                &mut self.rigid_body_set,
                &mut self.collider_set,
                &mut self.impulse_joint_set,
                &mut self.multibody_joint_set,
                &mut self.ccd_solver,
                Some(&mut self.query_pipeline),
                &(),
                &(),
            );
            self.accumulator = (self.accumulator - fixed_dt).max(0.0);
            num_substeps += 1;
        }
        self.substep_count += u64::from(num_substeps);

        // 子步数达到上限时丢弃积压的时间
        if self.accumulator + tolerance >= fixed_dt {
            if self.config.debug_log {
                log::debug!("[重力世界] 子步达到上限 {}，丢弃 {:.4}s", num_substeps, self.accumulator);
            }
            self.accumulator = 0.0;
        }

        self.clamp_velocities();
    }

    /// 用户力在 Rapier 中跨步保留，重置后重新施加
    fn apply_gravity_forces(&mut self) {
        for body in &self.bodies {
            if let Some(rb) = self.rigid_body_set.get_mut(body.handle) {
                rb.reset_forces(false);
                rb.add_force(to_vector(body.gravity * body.mass), true);
            }
        }
    }

    /// 区域嵌套时重力方向突变，限制线速度
    fn clamp_velocities(&mut self) {
        let max_linear_velocity = self.config.max_linear_velocity;
        for body in &self.bodies {
            if let Some(rb) = self.rigid_body_set.get_mut(body.handle) {
                let linvel = *rb.linvel();
                let linvel_mag = linvel.norm();
                if linvel_mag > max_linear_velocity {
                    let scale = max_linear_velocity / linvel_mag;
                    rb.set_linvel(linvel * scale, true);
                }
            }
        }
    }
}
