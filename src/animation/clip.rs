//! 录制片段播放
//!
//! 每个关节一条轨道，存储该关节的所有关键帧，并提供查找和插值功能。

use std::collections::BTreeMap;

use super::node::PoseGenerator;
use super::{AnimContext, AnimVariantMap};
use crate::skeleton::{Pose, Skeleton};

/// 单个关节的关键帧轨道
#[derive(Debug, Clone, Default)]
pub struct ClipTrack {
    /// 关键帧映射（帧索引 -> 相对姿态）
    keyframes: BTreeMap<u32, Pose>,
}

impl ClipTrack {
    pub fn new() -> Self {
        Self::default()
    }

    /// 插入关键帧
    pub fn insert_keyframe(&mut self, frame_index: u32, pose: Pose) -> Option<Pose> {
        self.keyframes.insert(frame_index, pose)
    }

    /// 移除关键帧
    pub fn remove_keyframe(&mut self, frame_index: u32) -> Option<Pose> {
        self.keyframes.remove(&frame_index)
    }

    /// 查找精确帧
    pub fn find(&self, frame_index: u32) -> Option<Pose> {
        self.keyframes.get(&frame_index).copied()
    }

    /// 查找最近的前后帧索引
    pub fn search_closest(&self, frame_index: u32) -> (Option<u32>, Option<u32>) {
        let prev = self.keyframes.range(..=frame_index).next_back().map(|(k, _)| *k);
        let next = self
            .keyframes
            .range(frame_index.saturating_add(1)..)
            .next()
            .map(|(k, _)| *k);
        (prev, next)
    }

    /// 精确求值（支持帧间插值），超出首尾时取端点
    pub fn seek_precisely(&self, frame: f32) -> Option<Pose> {
        let frame = frame.max(0.0);
        let frame_index = frame.floor() as u32;

        match self.search_closest(frame_index) {
            (Some(prev), Some(next)) => {
                let a = self.keyframes.get(&prev)?;
                let b = self.keyframes.get(&next)?;
                let coef = ((frame - prev as f32) / (next - prev) as f32).clamp(0.0, 1.0);
                Some(a.blend(b, coef))
            }
            (Some(prev), None) => self.find(prev),
            (None, Some(next)) => self.find(next),
            (None, None) => None,
        }
    }

    pub fn len(&self) -> usize {
        self.keyframes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keyframes.is_empty()
    }

    /// 获取最大帧索引
    pub fn max_frame_index(&self) -> u32 {
        self.keyframes.keys().last().copied().unwrap_or(0)
    }
}

/// 片段播放节点（生成器）
#[derive(Debug, Clone)]
pub struct ClipNode {
    tracks: Vec<(String, ClipTrack)>,
    /// (关节索引, 轨道索引)，绑定骨架时解析
    bindings: Vec<(usize, usize)>,
    pub fps: f32,
    pub start_frame: f32,
    pub end_frame: f32,
    pub time_scale: f32,
    pub looping: bool,
    frame: f32,
}

impl ClipNode {
    pub fn new(fps: f32, start_frame: f32, end_frame: f32, looping: bool) -> Self {
        Self {
            tracks: Vec::new(),
            bindings: Vec::new(),
            fps,
            start_frame,
            end_frame: end_frame.max(start_frame),
            time_scale: 1.0,
            looping,
            frame: start_frame,
        }
    }

    /// 添加或替换关节轨道，需要重新绑定骨架后生效
    pub fn add_track(&mut self, joint_name: impl Into<String>, track: ClipTrack) {
        let name = joint_name.into();
        match self.tracks.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = track,
            None => self.tracks.push((name, track)),
        }
    }

    #[inline]
    pub fn current_frame(&self) -> f32 {
        self.frame
    }

    pub fn set_frame(&mut self, frame: f32) {
        self.frame = frame.clamp(self.start_frame, self.end_frame);
    }

    fn advance(&mut self, dt: f32) {
        let mut frame = self.frame + dt * self.fps * self.time_scale;
        let length = self.end_frame - self.start_frame;
        if self.looping && length > 0.0 {
            frame = self.start_frame + (frame - self.start_frame).rem_euclid(length);
        } else {
            frame = frame.clamp(self.start_frame, self.end_frame);
        }
        self.frame = frame;
    }
}

impl PoseGenerator for ClipNode {
    fn bind_skeleton(&mut self, skeleton: &Skeleton) {
        self.bindings.clear();
        for (track_index, (name, _)) in self.tracks.iter().enumerate() {
            match skeleton.find_joint_by_name(name) {
                Some(joint) => self.bindings.push((joint, track_index)),
                None => log::warn!("片段轨道 '{}' 在骨架中找不到对应关节", name),
            }
        }
    }

    fn evaluate(
        &mut self,
        skeleton: &Skeleton,
        _vars: &mut AnimVariantMap,
        _ctx: &AnimContext,
        dt: f32,
    ) -> Vec<Pose> {
        self.advance(dt);

        let mut poses = skeleton.relative_default_poses().to_vec();
        for &(joint, track) in &self.bindings {
            if let (Some(slot), Some((_, track))) = (poses.get_mut(joint), self.tracks.get(track)) {
                if let Some(pose) = track.seek_precisely(self.frame) {
                    *slot = pose;
                }
            }
        }
        poses
    }
}
