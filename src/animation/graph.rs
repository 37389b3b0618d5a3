//! 动画图
//!
//! 持有根节点与骨架，每帧处理整棵树并把结果交给渲染骨架。

use std::sync::Arc;

use super::{AnimContext, AnimNode, AnimVariantMap};
use crate::skeleton::{Pose, Skeleton};

#[derive(Debug)]
pub struct AnimGraph {
    root: AnimNode,
    skeleton: Option<Arc<Skeleton>>,
    output: Vec<Pose>,
}

impl AnimGraph {
    pub fn new(root: AnimNode) -> Self {
        Self {
            root,
            skeleton: None,
            output: Vec::new(),
        }
    }

    /// 更换骨架，整棵树重新解析关节索引
    pub fn set_skeleton(&mut self, skeleton: Arc<Skeleton>) {
        self.root.set_skeleton(skeleton.clone());
        self.output = skeleton.relative_default_poses().to_vec();
        self.skeleton = Some(skeleton);
    }

    #[inline]
    pub fn skeleton(&self) -> Option<&Arc<Skeleton>> {
        self.skeleton.as_ref()
    }

    #[inline]
    pub fn root(&self) -> &AnimNode {
        &self.root
    }

    #[inline]
    pub fn root_mut(&mut self) -> &mut AnimNode {
        &mut self.root
    }

    pub fn find_node_mut(&mut self, id: &str) -> Option<&mut AnimNode> {
        self.root.find_node_mut(id)
    }

    /// 最近一次求值结果
    #[inline]
    pub fn poses(&self) -> &[Pose] {
        &self.output
    }

    /// 求值一帧
    ///
    /// 根节点输出为空（未绑定骨架、数据库加载失败等）时使用骨架默认姿态。
    pub fn evaluate(&mut self, vars: &mut AnimVariantMap, ctx: &AnimContext, dt: f32) -> &[Pose] {
        let out = self.root.process(vars, ctx, dt);
        self.output = match &self.skeleton {
            Some(skeleton) if out.len() != skeleton.joint_count() => {
                skeleton.relative_default_poses().to_vec()
            }
            _ => out.to_vec(),
        };
        &self.output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::animation::{AnimNodeKind, MotionDatabase, MotionMatching};
    use crate::skeleton::Joint;
    use glam::Vec3;

    #[test]
    fn test_failed_generator_falls_back_to_default_pose() {
        let skeleton = Arc::new(
            Skeleton::new(vec![
                Joint::new("Root", -1, Pose::IDENTITY),
                Joint::new("Hips", 0, Pose::from_translation(Vec3::Y)),
            ])
            .unwrap(),
        );
        let mm = MotionMatching::new(MotionDatabase::default(), "Hips");
        let mut graph = AnimGraph::new(AnimNode::new("mm", AnimNodeKind::MotionMatching(Box::new(mm))));
        graph.set_skeleton(skeleton.clone());

        let mut vars = AnimVariantMap::new();
        let out = graph.evaluate(&mut vars, &AnimContext::default(), 0.016);
        assert_eq!(out, skeleton.relative_default_poses());
    }

    #[test]
    fn test_unbound_graph_is_empty() {
        let mut graph = AnimGraph::new(AnimNode::new("p", AnimNodeKind::PassThrough));
        let mut vars = AnimVariantMap::new();
        assert!(graph.evaluate(&mut vars, &AnimContext::default(), 0.016).is_empty());
        assert!(graph.skeleton().is_none());
    }
}
