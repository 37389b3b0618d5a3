//! 姿态链
//!
//! 从末端关节沿父链到根的定长栈。内部按 末端 -> 根 顺序存储，
//! 索引 0 是末端，`top - 1` 是根。根元素的绝对姿态始终等于其相对姿态。

use super::{Pose, Skeleton};

/// 链元素
#[derive(Clone, Copy, Debug)]
pub struct ChainElem {
    pub relative: Pose,
    pub absolute: Pose,
    pub joint_index: usize,
    /// true 表示 absolute 已过期
    pub dirty: bool,
}

impl Default for ChainElem {
    fn default() -> Self {
        Self {
            relative: Pose::IDENTITY,
            absolute: Pose::IDENTITY,
            joint_index: 0,
            dirty: false,
        }
    }
}

/// 定长姿态链，容量 N 在编译期确定
#[derive(Clone, Debug)]
pub struct PoseChain<const N: usize> {
    elems: [ChainElem; N],
    top: usize,
}

impl<const N: usize> Default for PoseChain<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> PoseChain<N> {
    pub fn new() -> Self {
        Self {
            elems: [ChainElem::default(); N],
            top: 0,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.top
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.top == 0
    }

    #[inline]
    pub fn elements(&self) -> &[ChainElem] {
        &self.elems[..self.top]
    }

    /// 从末端关节构建链
    ///
    /// 深度超过 N、末端越界或姿态数组与骨架不匹配时返回 false，且不修改现有内容。
    pub fn build_from_relative_poses(
        &mut self,
        skeleton: &Skeleton,
        relative_poses: &[Pose],
        tip_index: usize,
    ) -> bool {
        if tip_index >= skeleton.joint_count() || relative_poses.len() != skeleton.joint_count() {
            return false;
        }

        // 先数深度，失败时不动已有状态
        let depth = skeleton.chain_depth(tip_index);
        if depth > N {
            log::warn!(
                "姿态链溢出: 关节 {} 深度 {} 超过容量 {}",
                tip_index, depth, N
            );
            return false;
        }

        self.top = 0;
        let mut i = tip_index as i32;
        while i >= 0 {
            let idx = i as usize;
            let rel = relative_poses[idx];
            self.elems[self.top] = ChainElem {
                relative: rel,
                absolute: rel,
                joint_index: idx,
                dirty: true,
            };
            self.top += 1;
            i = skeleton.parent_index(idx);
        }

        self.build_dirty_absolute_poses();
        true
    }

    #[inline]
    fn position_of(&self, joint_index: usize) -> Option<usize> {
        self.elems[..self.top]
            .iter()
            .position(|e| e.joint_index == joint_index)
    }

    #[inline]
    pub fn contains(&self, joint_index: usize) -> bool {
        self.position_of(joint_index).is_some()
    }

    /// 关节的绝对姿态，不在链中时返回单位姿态
    pub fn absolute_pose(&mut self, joint_index: usize) -> Pose {
        match self.position_of(joint_index) {
            Some(k) => {
                if self.elems[k].dirty {
                    self.build_dirty_absolute_poses();
                }
                self.elems[k].absolute
            }
            None => Pose::IDENTITY,
        }
    }

    pub fn relative_pose(&self, joint_index: usize) -> Pose {
        self.position_of(joint_index)
            .map(|k| self.elems[k].relative)
            .unwrap_or(Pose::IDENTITY)
    }

    pub fn is_dirty(&self, joint_index: usize) -> bool {
        self.position_of(joint_index)
            .map(|k| self.elems[k].dirty)
            .unwrap_or(false)
    }

    /// 修改相对姿态，并把该元素及所有更靠近末端的元素标脏
    pub fn set_relative_pose(&mut self, joint_index: usize, pose: Pose) -> bool {
        match self.position_of(joint_index) {
            Some(k) => {
                self.elems[k].relative = pose;
                for elem in &mut self.elems[..=k] {
                    elem.dirty = true;
                }
                true
            }
            None => false,
        }
    }

    /// 根 -> 末端扫描，重算脏元素；一旦某个元素重算，其后所有元素都重算
    pub fn build_dirty_absolute_poses(&mut self) {
        if self.top == 0 {
            return;
        }

        let root = &mut self.elems[self.top - 1];
        let mut propagate = root.dirty;
        if root.dirty {
            root.absolute = root.relative;
            root.dirty = false;
        }

        for i in (0..self.top - 1).rev() {
            if propagate || self.elems[i].dirty {
                self.elems[i].absolute = self.elems[i + 1].absolute * self.elems[i].relative;
                self.elems[i].dirty = false;
                propagate = true;
            }
        }
    }

    /// 与另一条链逐元素混合相对姿态，长度不同则什么都不做
    pub fn blend(&mut self, other: &PoseChain<N>, alpha: f32) {
        if self.top != other.top {
            return;
        }
        for (elem, other_elem) in self.elems[..self.top].iter_mut().zip(&other.elems[..other.top]) {
            elem.relative = elem.relative.blend(&other_elem.relative, alpha);
            elem.dirty = true;
        }
    }

    /// 把链内的相对姿态写回完整姿态数组
    pub fn output_relative_poses(&self, poses: &mut [Pose]) {
        for elem in &self.elems[..self.top] {
            if let Some(p) = poses.get_mut(elem.joint_index) {
                *p = elem.relative;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skeleton::Joint;
    use glam::{Quat, Vec3};

    fn line_skeleton(count: usize) -> Skeleton {
        let joints = (0..count)
            .map(|i| {
                Joint::new(
                    format!("j{}", i),
                    i as i32 - 1,
                    Pose::from_translation(Vec3::new(0.0, 1.0, 0.0)),
                )
            })
            .collect();
        Skeleton::new(joints).unwrap()
    }

    #[test]
    fn test_three_joint_scenario() {
        let skeleton = Skeleton::new(vec![
            Joint::new("joint0", -1, Pose::IDENTITY),
            Joint::new("joint1", 0, Pose::IDENTITY),
            Joint::new("joint2", 1, Pose::from_translation(Vec3::new(0.0, 1.0, 0.0))),
        ])
        .unwrap();
        let mut chain = PoseChain::<8>::new();
        assert!(chain.build_from_relative_poses(&skeleton, skeleton.relative_default_poses(), 2));
        assert_eq!(chain.len(), 3);

        let abs = chain.absolute_pose(2);
        assert!(abs.translation.abs_diff_eq(Vec3::new(0.0, 1.0, 0.0), 1e-6));
        assert!(abs.rotation.abs_diff_eq(Quat::IDENTITY, 1e-6));
    }

    #[test]
    fn test_round_trip_matches_parent_composition() {
        let skeleton = line_skeleton(5);
        let mut poses = skeleton.relative_default_poses().to_vec();
        poses[1].rotation = Quat::from_rotation_z(0.3);
        poses[3].rotation = Quat::from_rotation_x(-0.8);
        poses[2].scale = Vec3::new(1.0, 2.0, 1.0);

        let mut chain = PoseChain::<8>::new();
        assert!(chain.build_from_relative_poses(&skeleton, &poses, 4));
        for j in 0..5 {
            let expected = skeleton.absolute_pose(j, &poses);
            assert!(chain.absolute_pose(j).abs_diff_eq(&expected, 1e-5));
        }
        let root = chain.elements()[chain.len() - 1];
        assert_eq!(root.absolute, root.relative);
    }

    #[test]
    fn test_capacity_overflow_keeps_previous_state() {
        let skeleton = line_skeleton(6);
        let mut chain = PoseChain::<4>::new();
        assert!(chain.build_from_relative_poses(&skeleton, skeleton.relative_default_poses(), 2));
        let before = chain.absolute_pose(2);

        assert!(!chain.build_from_relative_poses(&skeleton, skeleton.relative_default_poses(), 5));
        assert_eq!(chain.len(), 3);
        assert_eq!(chain.absolute_pose(2), before);
    }

    #[test]
    fn test_missing_joint_is_identity() {
        let skeleton = line_skeleton(4);
        let mut chain = PoseChain::<8>::new();
        assert!(chain.build_from_relative_poses(&skeleton, skeleton.relative_default_poses(), 1));
        assert_eq!(chain.absolute_pose(3), Pose::IDENTITY);
        assert!(!chain.set_relative_pose(3, Pose::IDENTITY));
    }

    #[test]
    fn test_set_relative_pose_dirties_tip_side() {
        let skeleton = line_skeleton(4);
        let mut chain = PoseChain::<8>::new();
        assert!(chain.build_from_relative_poses(&skeleton, skeleton.relative_default_poses(), 3));

        let bent = Pose::from_rotation_translation(
            Quat::from_rotation_z(std::f32::consts::FRAC_PI_2),
            Vec3::new(0.0, 1.0, 0.0),
        );
        assert!(chain.set_relative_pose(1, bent));
        assert!(chain.is_dirty(1));
        assert!(chain.is_dirty(2));
        assert!(chain.is_dirty(3));
        assert!(!chain.is_dirty(0));

        // 关节 1 在 y=2 处绕 z 旋转 90 度，子关节沿 -x 延伸
        let tip = chain.absolute_pose(3);
        assert!(tip.translation.abs_diff_eq(Vec3::new(-2.0, 2.0, 0.0), 1e-5));
        assert!(!chain.is_dirty(3));
        // 写入的是相对姿态
        assert_eq!(chain.relative_pose(1), bent);
    }

    #[test]
    fn test_blend_with_self_is_identity() {
        let skeleton = line_skeleton(4);
        let mut poses = skeleton.relative_default_poses().to_vec();
        poses[2].rotation = Quat::from_rotation_y(0.9);
        let mut chain = PoseChain::<8>::new();
        assert!(chain.build_from_relative_poses(&skeleton, &poses, 3));

        let copy = chain.clone();
        chain.blend(&copy, 0.37);
        for (a, b) in chain.elements().iter().zip(copy.elements()) {
            assert!(a.relative.abs_diff_eq(&b.relative, 1e-5));
            assert!(a.dirty);
        }
    }

    #[test]
    fn test_blend_length_mismatch_is_noop() {
        let skeleton = line_skeleton(4);
        let mut a = PoseChain::<8>::new();
        let mut b = PoseChain::<8>::new();
        assert!(a.build_from_relative_poses(&skeleton, skeleton.relative_default_poses(), 3));
        assert!(b.build_from_relative_poses(&skeleton, skeleton.relative_default_poses(), 1));
        a.blend(&b, 0.5);
        assert!(a.elements().iter().all(|e| !e.dirty));
    }

    #[test]
    fn test_output_relative_poses() {
        let skeleton = line_skeleton(3);
        let mut chain = PoseChain::<4>::new();
        assert!(chain.build_from_relative_poses(&skeleton, skeleton.relative_default_poses(), 2));
        let moved = Pose::from_translation(Vec3::X);
        chain.set_relative_pose(2, moved);
        let mut out = skeleton.relative_default_poses().to_vec();
        chain.output_relative_poses(&mut out);
        assert_eq!(out[2], moved);
    }
}
