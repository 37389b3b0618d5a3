//! 虚拟形象引擎
//!
//! - skeleton: 姿态、骨架拓扑、姿态链与 IK 数学
//! - animation: 动画节点图、变量总线、运动匹配
//! - physics: 重力区域与刚体重力重写

pub mod animation;
pub mod physics;
pub mod skeleton;

mod error;

pub use error::{AnimError, Result};

pub use animation::{AnimContext, AnimGraph, AnimNode, AnimNodeKind, AnimVariant, AnimVariantMap};
pub use physics::{GravityConfig, GravityZoneManager, ZoneHandle, ZoneVolume};
pub use skeleton::{Joint, Pose, PoseChain, Skeleton};
