//! 骨架拓扑
//!
//! 加载后不可变的关节列表，父关节必须排在子关节之前。

use std::collections::HashMap;

use super::Pose;
use crate::{AnimError, Result};

/// 单个关节
#[derive(Clone, Debug)]
pub struct Joint {
    /// 关节名称
    pub name: String,
    /// 父关节索引（-1 表示根）
    pub parent_index: i32,
    /// 默认相对姿态
    pub default_relative: Pose,
}

impl Joint {
    pub fn new(name: impl Into<String>, parent_index: i32, default_relative: Pose) -> Self {
        Self {
            name: name.into(),
            parent_index,
            default_relative,
        }
    }

    /// 获取父关节 ID（如果有效）
    #[inline]
    pub fn parent_id(&self) -> Option<usize> {
        if self.parent_index >= 0 {
            Some(self.parent_index as usize)
        } else {
            None
        }
    }
}

/// 骨架
#[derive(Clone, Debug)]
pub struct Skeleton {
    joints: Vec<Joint>,
    name_to_index: HashMap<String, usize>,
    default_relative: Vec<Pose>,
}

impl Skeleton {
    /// 构建骨架并校验拓扑
    pub fn new(joints: Vec<Joint>) -> Result<Self> {
        let mut name_to_index = HashMap::with_capacity(joints.len());

        for (i, joint) in joints.iter().enumerate() {
            if joint.parent_index >= i as i32 || joint.parent_index < -1 {
                return Err(AnimError::InvalidSkeleton(format!(
                    "关节 '{}' (index={}) 的父索引 {} 无效",
                    joint.name, i, joint.parent_index
                )));
            }
            if name_to_index.insert(joint.name.clone(), i).is_some() {
                return Err(AnimError::InvalidSkeleton(format!(
                    "关节名称重复: '{}'",
                    joint.name
                )));
            }
        }

        let default_relative = joints.iter().map(|j| j.default_relative).collect();

        Ok(Self {
            joints,
            name_to_index,
            default_relative,
        })
    }

    #[inline]
    pub fn joint_count(&self) -> usize {
        self.joints.len()
    }

    #[inline]
    pub fn joint(&self, index: usize) -> Option<&Joint> {
        self.joints.get(index)
    }

    #[inline]
    pub fn joint_name(&self, index: usize) -> Option<&str> {
        self.joints.get(index).map(|j| j.name.as_str())
    }

    /// 父关节索引，越界或根关节返回 -1
    #[inline]
    pub fn parent_index(&self, index: usize) -> i32 {
        self.joints.get(index).map(|j| j.parent_index).unwrap_or(-1)
    }

    #[inline]
    pub fn find_joint_by_name(&self, name: &str) -> Option<usize> {
        self.name_to_index.get(name).copied()
    }

    #[inline]
    pub fn relative_default_poses(&self) -> &[Pose] {
        &self.default_relative
    }

    /// 从关节到根的深度（根为 1）
    pub fn chain_depth(&self, index: usize) -> usize {
        let mut depth = 0;
        let mut i = index as i32;
        while i >= 0 && (i as usize) < self.joints.len() {
            depth += 1;
            i = self.joints[i as usize].parent_index;
        }
        depth
    }

    /// 按父链组合得到单个关节的绝对姿态
    pub fn absolute_pose(&self, index: usize, relative_poses: &[Pose]) -> Pose {
        let mut path = Vec::new();
        let mut i = index as i32;
        while i >= 0 {
            let idx = i as usize;
            if idx >= relative_poses.len() {
                return Pose::IDENTITY;
            }
            path.push(idx);
            i = self.parent_index(idx);
        }
        // 从根向末端组合，与链的重算顺序一致
        path.iter()
            .rev()
            .fold(Pose::IDENTITY, |acc, &j| acc * relative_poses[j])
    }

    pub fn absolute_default_pose(&self, index: usize) -> Pose {
        self.absolute_pose(index, &self.default_relative)
    }

    /// 相对姿态数组转换为绝对姿态数组（依赖父先于子的顺序）
    pub fn convert_relative_to_absolute(&self, relative_poses: &[Pose]) -> Vec<Pose> {
        let count = relative_poses.len().min(self.joints.len());
        let mut absolute: Vec<Pose> = Vec::with_capacity(count);
        for i in 0..count {
            let pose = match self.joints[i].parent_id() {
                Some(parent) => absolute[parent] * relative_poses[i],
                None => relative_poses[i],
            };
            absolute.push(pose);
        }
        absolute
    }
}
