//! 动画节点
//!
//! 节点树：每个节点独占其子节点，按深度优先、子节点先于父节点的固定顺序求值。
//! 节点分两种角色：
//! - 生成器（Generator）：没有输入姿态，通过 `evaluate` 产生姿态
//! - 叠加器（Overlay）：以第一个子节点的输出为输入，通过 `overlay` 修改部分关节
//!
//! 对错误角色调用入口是受保护的空操作，只记录错误日志。

use std::sync::Arc;

use super::character_rig::CharacterRig;
use super::clip::ClipNode;
use super::inverse_kinematics::InverseKinematics;
use super::low_velocity_filter::LowVelocityFilter;
use super::motion_matching::MotionMatching;
use super::pole_vector::PoleVectorConstraint;
use super::two_bone_ik::TwoBoneIk;
use super::{AnimContext, AnimVariantMap};
use crate::skeleton::{Pose, Skeleton};

/// overlay 节点使用的最大时间步长
pub const MAX_OVERLAY_DT: f32 = 1.0 / 30.0;

/// 节点角色
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeRole {
    Generator,
    Overlay,
}

/// 生成器节点实现
pub trait PoseGenerator {
    /// 骨架变化时重新解析关节索引
    fn bind_skeleton(&mut self, _skeleton: &Skeleton) {}

    fn evaluate(
        &mut self,
        skeleton: &Skeleton,
        vars: &mut AnimVariantMap,
        ctx: &AnimContext,
        dt: f32,
    ) -> Vec<Pose>;
}

/// 叠加节点实现，`under` 的长度保证等于骨架关节数
pub trait PoseOverlay {
    /// 骨架变化时重新解析关节索引
    fn bind_skeleton(&mut self, _skeleton: &Skeleton) {}

    fn overlay(
        &mut self,
        skeleton: &Skeleton,
        vars: &mut AnimVariantMap,
        ctx: &AnimContext,
        dt: f32,
        under: &[Pose],
    ) -> Vec<Pose>;
}

/// 节点类型（封闭集合）
#[derive(Debug)]
pub enum AnimNodeKind {
    /// 原样透传第一个子节点的输出
    PassThrough,
    Clip(ClipNode),
    LowVelocityFilter(LowVelocityFilter),
    TwoBoneIk(TwoBoneIk),
    PoleVectorConstraint(PoleVectorConstraint),
    /// 样条 IK 目前只透传
    SplineIk,
    MotionMatching(Box<MotionMatching>),
    CharacterRig(CharacterRig),
    InverseKinematics(InverseKinematics),
}

impl AnimNodeKind {
    pub fn role(&self) -> NodeRole {
        match self {
            AnimNodeKind::Clip(_) | AnimNodeKind::MotionMatching(_) => NodeRole::Generator,
            _ => NodeRole::Overlay,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            AnimNodeKind::PassThrough => "PassThrough",
            AnimNodeKind::Clip(_) => "Clip",
            AnimNodeKind::LowVelocityFilter(_) => "LowVelocityFilter",
            AnimNodeKind::TwoBoneIk(_) => "TwoBoneIK",
            AnimNodeKind::PoleVectorConstraint(_) => "PoleVectorConstraint",
            AnimNodeKind::SplineIk => "SplineIK",
            AnimNodeKind::MotionMatching(_) => "MotionMatching",
            AnimNodeKind::CharacterRig(_) => "CharacterRig",
            AnimNodeKind::InverseKinematics(_) => "InverseKinematics",
        }
    }

    fn bind_skeleton(&mut self, skeleton: &Skeleton) {
        match self {
            AnimNodeKind::PassThrough | AnimNodeKind::SplineIk => {}
            AnimNodeKind::Clip(n) => n.bind_skeleton(skeleton),
            AnimNodeKind::MotionMatching(n) => n.bind_skeleton(skeleton),
            AnimNodeKind::LowVelocityFilter(n) => n.bind_skeleton(skeleton),
            AnimNodeKind::TwoBoneIk(n) => n.bind_skeleton(skeleton),
            AnimNodeKind::PoleVectorConstraint(n) => n.bind_skeleton(skeleton),
            AnimNodeKind::CharacterRig(n) => n.bind_skeleton(skeleton),
            AnimNodeKind::InverseKinematics(n) => n.bind_skeleton(skeleton),
        }
    }

    fn evaluate(
        &mut self,
        skeleton: &Skeleton,
        vars: &mut AnimVariantMap,
        ctx: &AnimContext,
        dt: f32,
    ) -> Vec<Pose> {
        match self {
            AnimNodeKind::Clip(n) => n.evaluate(skeleton, vars, ctx, dt),
            AnimNodeKind::MotionMatching(n) => n.evaluate(skeleton, vars, ctx, dt),
            _ => Vec::new(),
        }
    }

    fn overlay(
        &mut self,
        skeleton: &Skeleton,
        vars: &mut AnimVariantMap,
        ctx: &AnimContext,
        dt: f32,
        under: &[Pose],
    ) -> Vec<Pose> {
        match self {
            AnimNodeKind::PassThrough | AnimNodeKind::SplineIk => under.to_vec(),
            AnimNodeKind::LowVelocityFilter(n) => n.overlay(skeleton, vars, ctx, dt, under),
            AnimNodeKind::TwoBoneIk(n) => n.overlay(skeleton, vars, ctx, dt, under),
            AnimNodeKind::PoleVectorConstraint(n) => n.overlay(skeleton, vars, ctx, dt, under),
            AnimNodeKind::CharacterRig(n) => n.overlay(skeleton, vars, ctx, dt, under),
            AnimNodeKind::InverseKinematics(n) => n.overlay(skeleton, vars, ctx, dt, under),
            AnimNodeKind::Clip(_) | AnimNodeKind::MotionMatching(_) => under.to_vec(),
        }
    }
}

/// 动画节点
#[derive(Debug)]
pub struct AnimNode {
    id: String,
    kind: AnimNodeKind,
    children: Vec<AnimNode>,
    skeleton: Option<Arc<Skeleton>>,
    poses: Vec<Pose>,
}

impl AnimNode {
    pub fn new(id: impl Into<String>, kind: AnimNodeKind) -> Self {
        Self {
            id: id.into(),
            kind,
            children: Vec::new(),
            skeleton: None,
            poses: Vec::new(),
        }
    }

    pub fn with_child(mut self, child: AnimNode) -> Self {
        self.add_child(child);
        self
    }

    pub fn add_child(&mut self, mut child: AnimNode) {
        if let Some(skeleton) = &self.skeleton {
            child.set_skeleton(skeleton.clone());
        }
        self.children.push(child);
    }

    #[inline]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[inline]
    pub fn kind(&self) -> &AnimNodeKind {
        &self.kind
    }

    #[inline]
    pub fn kind_mut(&mut self) -> &mut AnimNodeKind {
        &mut self.kind
    }

    #[inline]
    pub fn role(&self) -> NodeRole {
        self.kind.role()
    }

    #[inline]
    pub fn children(&self) -> &[AnimNode] {
        &self.children
    }

    /// 上一次求值的输出
    #[inline]
    pub fn poses(&self) -> &[Pose] {
        &self.poses
    }

    #[inline]
    pub fn skeleton(&self) -> Option<&Arc<Skeleton>> {
        self.skeleton.as_ref()
    }

    /// 递归绑定骨架并重新解析关节索引
    pub fn set_skeleton(&mut self, skeleton: Arc<Skeleton>) {
        self.kind.bind_skeleton(&skeleton);
        for child in &mut self.children {
            child.set_skeleton(skeleton.clone());
        }
        self.poses.clear();
        self.skeleton = Some(skeleton);
    }

    pub fn find_node(&self, id: &str) -> Option<&AnimNode> {
        if self.id == id {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find_node(id))
    }

    pub fn find_node_mut(&mut self, id: &str) -> Option<&mut AnimNode> {
        if self.id == id {
            return Some(self);
        }
        self.children.iter_mut().find_map(|c| c.find_node_mut(id))
    }

    /// 生成器入口
    pub fn evaluate(
        &mut self,
        vars: &mut AnimVariantMap,
        ctx: &AnimContext,
        dt: f32,
    ) -> &[Pose] {
        if self.role() != NodeRole::Generator {
            log::error!(
                "节点 '{}' ({}) 是叠加节点，不能调用 evaluate",
                self.id,
                self.kind.type_name()
            );
            self.poses.clear();
            return &self.poses;
        }

        self.poses = match &self.skeleton {
            Some(skeleton) => self.kind.evaluate(skeleton, vars, ctx, dt),
            None => Vec::new(),
        };
        &self.poses
    }

    /// 叠加入口，dt 会被夹到 [0, MAX_OVERLAY_DT]
    pub fn overlay(
        &mut self,
        vars: &mut AnimVariantMap,
        ctx: &AnimContext,
        dt: f32,
        under: &[Pose],
    ) -> &[Pose] {
        if self.role() != NodeRole::Overlay {
            log::error!(
                "节点 '{}' ({}) 是生成节点，不能调用 overlay",
                self.id,
                self.kind.type_name()
            );
            self.poses = under.to_vec();
            return &self.poses;
        }

        let dt = dt.clamp(0.0, MAX_OVERLAY_DT);
        self.poses = match &self.skeleton {
            Some(skeleton) if under.len() == skeleton.joint_count() => {
                self.kind.overlay(skeleton, vars, ctx, dt, under)
            }
            Some(skeleton) => {
                // 输入为空（例如生成器失败）时以默认姿态为输入
                let defaults = skeleton.relative_default_poses().to_vec();
                self.kind.overlay(skeleton, vars, ctx, dt, &defaults)
            }
            None => under.to_vec(),
        };
        &self.poses
    }

    /// 深度优先求值整棵子树
    ///
    /// 所有子节点按顺序先求值（触发输出对之后的节点可见），
    /// 第一个子节点的输出作为叠加节点的输入。
    pub fn process(
        &mut self,
        vars: &mut AnimVariantMap,
        ctx: &AnimContext,
        dt: f32,
    ) -> &[Pose] {
        let mut under = Vec::new();
        for (i, child) in self.children.iter_mut().enumerate() {
            let out = child.process(vars, ctx, dt);
            if i == 0 {
                under = out.to_vec();
            }
        }

        match self.role() {
            NodeRole::Generator => self.evaluate(vars, ctx, dt),
            NodeRole::Overlay => self.overlay(vars, ctx, dt, &under),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::animation::clip::{ClipNode, ClipTrack};
    use crate::skeleton::Joint;
    use glam::Vec3;

    fn skeleton() -> Arc<Skeleton> {
        Arc::new(
            Skeleton::new(vec![
                Joint::new("Hips", -1, Pose::IDENTITY),
                Joint::new("Spine", 0, Pose::from_translation(Vec3::Y)),
            ])
            .unwrap(),
        )
    }

    fn clip_node(id: &str) -> AnimNode {
        let mut track = ClipTrack::new();
        track.insert_keyframe(0, Pose::from_translation(Vec3::new(0.0, 0.0, 1.0)));
        let mut clip = ClipNode::new(30.0, 0.0, 10.0, true);
        clip.add_track("Hips", track);
        AnimNode::new(id, AnimNodeKind::Clip(clip))
    }

    #[test]
    fn test_evaluate_on_overlay_is_guarded() {
        let mut node = AnimNode::new("filter", AnimNodeKind::PassThrough);
        node.set_skeleton(skeleton());
        let mut vars = AnimVariantMap::new();
        let out = node.evaluate(&mut vars, &AnimContext::default(), 0.016);
        assert!(out.is_empty());
    }

    #[test]
    fn test_overlay_on_generator_is_guarded() {
        let mut node = clip_node("clip");
        node.set_skeleton(skeleton());
        let mut vars = AnimVariantMap::new();
        let under = vec![Pose::from_translation(Vec3::X); 2];
        let out = node.overlay(&mut vars, &AnimContext::default(), 0.016, &under).to_vec();
        assert_eq!(out, under);
    }

    #[test]
    fn test_unbound_generator_is_empty() {
        let mut node = clip_node("clip");
        let mut vars = AnimVariantMap::new();
        assert!(node.process(&mut vars, &AnimContext::default(), 0.016).is_empty());
    }

    #[test]
    fn test_process_feeds_first_child() {
        let mut root = AnimNode::new("root", AnimNodeKind::SplineIk)
            .with_child(clip_node("clip"))
            .with_child(AnimNode::new("ignored", AnimNodeKind::PassThrough));
        root.set_skeleton(skeleton());

        let mut vars = AnimVariantMap::new();
        let out = root.process(&mut vars, &AnimContext::default(), 0.016).to_vec();
        assert_eq!(out.len(), 2);
        assert!(out[0].translation.abs_diff_eq(Vec3::new(0.0, 0.0, 1.0), 1e-6));
        assert!(out[1].translation.abs_diff_eq(Vec3::Y, 1e-6));
    }

    #[test]
    fn test_leaf_overlay_uses_default_poses() {
        let mut node = AnimNode::new("leaf", AnimNodeKind::PassThrough);
        node.set_skeleton(skeleton());
        let mut vars = AnimVariantMap::new();
        let out = node.process(&mut vars, &AnimContext::default(), 0.016);
        assert_eq!(out, skeleton().relative_default_poses());
    }

    #[test]
    fn test_find_node() {
        let mut root = AnimNode::new("root", AnimNodeKind::PassThrough)
            .with_child(AnimNode::new("a", AnimNodeKind::PassThrough).with_child(clip_node("deep")));
        assert_eq!(root.find_node("deep").map(|n| n.id()), Some("deep"));
        assert!(root.find_node_mut("a").is_some());
        assert!(root.find_node("missing").is_none());
    }
}
