//! 物理模块
//!
//! 重力区域（包含判定、最小体积优先、跨线程事务）以及消费区域重力的刚体世界。

mod config;
mod gravity_world;
mod manager;
mod registry;
mod zone;

pub use config::{GravityConfig, PhysicsWorldConfig};
pub use gravity_world::GravityWorld;
pub use manager::{GravityZoneManager, ZoneSnapshot, ZoneTransaction};
pub use registry::{GravityZoneRegistry, HandleAllocator, ZoneHandle};
pub use zone::{Aabb, GravityEffect, ZoneTransform, ZoneVolume};
