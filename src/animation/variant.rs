//! 动画变量总线
//!
//! 字符串键到数值的映射，既承载外部可调参数，也承载节点之间的触发输出。
//! 查询永远不会失败：键为空、不存在或类型不符时返回调用方提供的默认值。

use std::collections::HashMap;

use glam::{Mat4, Quat, Vec3};

/// 变量值
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum AnimVariant {
    Bool(bool),
    Int(i32),
    Float(f32),
    Vec3(Vec3),
    Quat(Quat),
}

/// 变量映射
#[derive(Clone, Debug)]
pub struct AnimVariantMap {
    map: HashMap<String, AnimVariant>,
    /// rig 空间 -> 几何空间
    rig_to_geometry: Mat4,
    rig_to_geometry_rot: Quat,
}

impl Default for AnimVariantMap {
    fn default() -> Self {
        Self::new()
    }
}

impl AnimVariantMap {
    pub fn new() -> Self {
        Self {
            map: HashMap::new(),
            rig_to_geometry: Mat4::IDENTITY,
            rig_to_geometry_rot: Quat::IDENTITY,
        }
    }

    pub fn set_rig_to_geometry(&mut self, m: Mat4) {
        let (_, rotation, _) = m.to_scale_rotation_translation();
        self.rig_to_geometry = m;
        self.rig_to_geometry_rot = rotation.normalize();
    }

    #[inline]
    pub fn rig_to_geometry(&self) -> Mat4 {
        self.rig_to_geometry
    }

    #[inline]
    fn get(&self, key: &str) -> Option<&AnimVariant> {
        if key.is_empty() {
            return None;
        }
        self.map.get(key)
    }

    #[inline]
    pub fn has(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn lookup_bool(&self, key: &str, default: bool) -> bool {
        match self.get(key) {
            Some(AnimVariant::Bool(b)) => *b,
            Some(AnimVariant::Int(i)) => *i != 0,
            Some(AnimVariant::Float(f)) => *f != 0.0,
            _ => default,
        }
    }

    pub fn lookup_i32(&self, key: &str, default: i32) -> i32 {
        match self.get(key) {
            Some(AnimVariant::Int(i)) => *i,
            Some(AnimVariant::Float(f)) => *f as i32,
            Some(AnimVariant::Bool(b)) => *b as i32,
            _ => default,
        }
    }

    pub fn lookup_f32(&self, key: &str, default: f32) -> f32 {
        match self.get(key) {
            Some(AnimVariant::Float(f)) => *f,
            Some(AnimVariant::Int(i)) => *i as f32,
            Some(AnimVariant::Bool(b)) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            _ => default,
        }
    }

    pub fn lookup_vec3(&self, key: &str, default: Vec3) -> Vec3 {
        match self.get(key) {
            Some(AnimVariant::Vec3(v)) => *v,
            _ => default,
        }
    }

    pub fn lookup_quat(&self, key: &str, default: Quat) -> Quat {
        match self.get(key) {
            Some(AnimVariant::Quat(q)) => *q,
            _ => default,
        }
    }

    // ========== rig 空间值转换到几何空间，默认值已在几何空间 ==========

    pub fn lookup_rig_to_geometry_vec3(&self, key: &str, default: Vec3) -> Vec3 {
        match self.get(key) {
            Some(AnimVariant::Vec3(v)) => self.rig_to_geometry.transform_point3(*v),
            _ => default,
        }
    }

    pub fn lookup_rig_to_geometry_vector(&self, key: &str, default: Vec3) -> Vec3 {
        match self.get(key) {
            Some(AnimVariant::Vec3(v)) => self.rig_to_geometry.transform_vector3(*v),
            _ => default,
        }
    }

    pub fn lookup_rig_to_geometry_quat(&self, key: &str, default: Quat) -> Quat {
        match self.get(key) {
            Some(AnimVariant::Quat(q)) => (self.rig_to_geometry_rot * *q).normalize(),
            _ => default,
        }
    }

    // ========== 写入 ==========

    pub fn set(&mut self, key: impl Into<String>, value: AnimVariant) {
        self.map.insert(key.into(), value);
    }

    pub fn set_bool(&mut self, key: impl Into<String>, value: bool) {
        self.set(key, AnimVariant::Bool(value));
    }

    pub fn set_i32(&mut self, key: impl Into<String>, value: i32) {
        self.set(key, AnimVariant::Int(value));
    }

    pub fn set_f32(&mut self, key: impl Into<String>, value: f32) {
        self.set(key, AnimVariant::Float(value));
    }

    pub fn set_vec3(&mut self, key: impl Into<String>, value: Vec3) {
        self.set(key, AnimVariant::Vec3(value));
    }

    pub fn set_quat(&mut self, key: impl Into<String>, value: Quat) {
        self.set(key, AnimVariant::Quat(value));
    }

    pub fn remove(&mut self, key: &str) -> Option<AnimVariant> {
        self.map.remove(key)
    }

    pub fn clear_map(&mut self) {
        self.map.clear();
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}
