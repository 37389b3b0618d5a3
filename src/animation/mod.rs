//! 动画系统
//!
//! - node: 节点树与求值契约
//! - graph: 图入口，空输出回落到默认姿态
//! - 各节点实现：片段播放、低速滤波、两骨 IK、极向量、样条 IK、角色绑定、CCD IK、运动匹配

mod character_rig;
mod clip;
mod context;
mod graph;
mod inverse_kinematics;
mod low_velocity_filter;
mod motion_database;
mod motion_matching;
mod node;
mod pole_vector;
mod two_bone_ik;
mod variant;

pub use character_rig::{CharacterRig, ControllerFlags, ControllerOp};
pub use clip::{ClipNode, ClipTrack};
pub use context::AnimContext;
pub use graph::AnimGraph;
pub use inverse_kinematics::{IkTarget, InverseKinematics};
pub use low_velocity_filter::{LowVelocityFilter, LINEAR_SPEED_LIMIT};
pub use motion_database::{MotionDatabase, MotionRow, ROW_SIZE, TRAJECTORY_SAMPLES};
pub use motion_matching::{
    cancel_roll_and_pitch, current_cost, future_cost, integrate_goal_trajectory, MotionGoal, MotionMatching,
    MotionMatchingConfig, MotionMatchingVars, MotionSample, RowVelocities, MOTION_MATCHING_FPS,
    TRAJECTORY_HORIZONS,
};
pub use node::{AnimNode, AnimNodeKind, NodeRole, PoseGenerator, PoseOverlay, MAX_OVERLAY_DT};
pub use pole_vector::{PoleVectorConstraint, POLE_VECTOR_INTERP_DURATION};
pub use two_bone_ik::{TwoBoneIk, TWO_BONE_CHAIN_CAPACITY};
pub use variant::{AnimVariant, AnimVariantMap};
