//! 重力区域注册表
//!
//! 句柄 = (槽位索引, 代数)，由 HandleAllocator 分配。槽位复用时代数递增，旧句柄自动失效。
//! 注册表只记录每个槽位的最低有效代数；区域本身存放在紧凑数组中，删除使用 swap_remove（顺序无语义）。

use glam::Vec3;

use super::config::GravityConfig;
use super::zone::ZoneVolume;
use crate::{AnimError, Result};

/// 区域句柄
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ZoneHandle {
    index: u32,
    generation: u32,
}

impl ZoneHandle {
    #[inline]
    pub fn index(&self) -> u32 {
        self.index
    }

    #[inline]
    pub fn generation(&self) -> u32 {
        self.generation
    }
}

/// 句柄分配器：只记录槽位的代数与占用，不接触区域数据
///
/// 生产者线程通过它取得句柄，无需进入注册表的锁。
#[derive(Clone, Debug, Default)]
pub struct HandleAllocator {
    slots: Vec<AllocSlot>,
    free: Vec<u32>,
}

#[derive(Clone, Copy, Debug, Default)]
struct AllocSlot {
    generation: u32,
    alive: bool,
}

impl HandleAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// 分配新句柄（此时尚未关联区域）
    pub fn allocate(&mut self) -> ZoneHandle {
        match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.alive = true;
                ZoneHandle {
                    index,
                    generation: slot.generation,
                }
            }
            None => {
                let index = self.slots.len() as u32;
                self.slots.push(AllocSlot {
                    generation: 0,
                    alive: true,
                });
                ZoneHandle { index, generation: 0 }
            }
        }
    }

    #[inline]
    pub fn is_live(&self, handle: ZoneHandle) -> bool {
        self.slots
            .get(handle.index as usize)
            .map(|s| s.alive && s.generation == handle.generation)
            .unwrap_or(false)
    }

    /// 释放句柄，槽位代数递增后进入空闲列表；句柄已失效时返回 false
    pub fn release(&mut self, handle: ZoneHandle) -> bool {
        if !self.is_live(handle) {
            return false;
        }
        let slot = &mut self.slots[handle.index as usize];
        slot.alive = false;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(handle.index);
        true
    }
}

/// 注册表侧的槽位：最低有效代数 + 紧凑数组位置
#[derive(Clone, Copy, Debug, Default)]
struct Slot {
    generation: u32,
    dense: Option<usize>,
}

#[derive(Clone, Debug, Default)]
pub struct GravityZoneRegistry {
    slots: Vec<Slot>,
    entries: Vec<(ZoneHandle, ZoneVolume)>,
}

impl GravityZoneRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 代数不低于槽位记录的句柄有效；删除会把槽位代数推到句柄之后
    #[inline]
    pub fn is_valid(&self, handle: ZoneHandle) -> bool {
        self.slots
            .get(handle.index as usize)
            .map(|s| handle.generation >= s.generation)
            .unwrap_or(true)
    }

    fn validate(&mut self, handle: ZoneHandle) -> Result<usize> {
        if !self.is_valid(handle) {
            return Err(AnimError::StaleZoneHandle {
                index: handle.index,
                generation: handle.generation,
            });
        }
        let index = handle.index as usize;
        if index >= self.slots.len() {
            self.slots.resize(index + 1, Slot::default());
        }
        Ok(index)
    }

    fn remove_entry(&mut self, slot_index: usize) {
        if let Some(dense) = self.slots[slot_index].dense.take() {
            self.entries.swap_remove(dense);
            if let Some((moved, _)) = self.entries.get(dense) {
                self.slots[moved.index as usize].dense = Some(dense);
            }
        }
    }

    /// 插入或更新区域；槽位被更新代数的句柄复用时替换旧区域
    pub fn update_zone(&mut self, handle: ZoneHandle, zone: ZoneVolume) -> Result<()> {
        let slot_index = self.validate(handle)?;
        if handle.generation > self.slots[slot_index].generation {
            self.remove_entry(slot_index);
            self.slots[slot_index].generation = handle.generation;
        }
        match self.slots[slot_index].dense {
            Some(dense) => self.entries[dense].1 = zone,
            None => {
                self.slots[slot_index].dense = Some(self.entries.len());
                self.entries.push((handle, zone));
            }
        }
        Ok(())
    }

    /// 删除区域并使句柄失效，O(1)
    pub fn remove_zone(&mut self, handle: ZoneHandle) -> Result<()> {
        let slot_index = self.validate(handle)?;
        self.remove_entry(slot_index);
        self.slots[slot_index].generation = handle.generation.wrapping_add(1);
        Ok(())
    }

    pub fn get(&self, handle: ZoneHandle) -> Option<&ZoneVolume> {
        let slot = self.slots.get(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.dense.map(|d| &self.entries[d].1)
    }

    /// 包含该点的体积最小的区域；体积相同时保留先遇到的
    pub fn find_zone(&self, p: Vec3, config: &GravityConfig) -> Option<(ZoneHandle, &ZoneVolume)> {
        let mut best: Option<(ZoneHandle, &ZoneVolume)> = None;
        for (handle, zone) in &self.entries {
            if !zone.contains(p, config.containment_epsilon) {
                continue;
            }
            match best {
                Some((_, b)) if zone.volume() >= b.volume() => {}
                _ => best = Some((*handle, zone)),
            }
        }
        best
    }

    pub fn gravity_at(&self, p: Vec3, config: &GravityConfig) -> Vec3 {
        match self.find_zone(p, config) {
            Some((_, zone)) => zone.gravity_at(p, config),
            None => config.default_gravity(),
        }
    }

    pub fn up_direction_at(&self, p: Vec3, config: &GravityConfig) -> Vec3 {
        match self.find_zone(p, config) {
            Some((_, zone)) => zone.up_direction_at(p, config),
            None => config.default_up,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn handles(&self) -> impl Iterator<Item = ZoneHandle> + '_ {
        self.entries.iter().map(|(h, _)| *h)
    }

    pub fn iter(&self) -> impl Iterator<Item = (ZoneHandle, &ZoneVolume)> + '_ {
        self.entries.iter().map(|(h, z)| (*h, z))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::zone::{GravityEffect, ZoneTransform};

    fn cube(size: f32, g_force: f32) -> ZoneVolume {
        ZoneVolume::new(
            ZoneTransform {
                dimensions: Vec3::splat(size),
                ..Default::default()
            },
            GravityEffect::Linear { g_force, up: Vec3::X },
        )
    }

    #[test]
    fn test_smallest_volume_wins_regardless_of_order() {
        let config = GravityConfig::default();
        let p = Vec3::new(0.5, 0.0, 0.0);

        for small_first in [true, false] {
            let mut alloc = HandleAllocator::new();
            let mut reg = GravityZoneRegistry::new();
            let a = alloc.allocate();
            let b = alloc.allocate();
            if small_first {
                reg.update_zone(a, cube(2.0, -1.0)).unwrap();
                reg.update_zone(b, cube(10.0, -7.0)).unwrap();
            } else {
                reg.update_zone(a, cube(10.0, -7.0)).unwrap();
                reg.update_zone(b, cube(2.0, -1.0)).unwrap();
            }
            assert!(reg.gravity_at(p, &config).abs_diff_eq(Vec3::new(-1.0, 0.0, 0.0), 1e-6));
        }
    }

    #[test]
    fn test_equal_volume_keeps_first() {
        let config = GravityConfig::default();
        let mut alloc = HandleAllocator::new();
        let mut reg = GravityZoneRegistry::new();
        let a = alloc.allocate();
        let b = alloc.allocate();
        reg.update_zone(a, cube(2.0, -1.0)).unwrap();
        reg.update_zone(b, cube(2.0, -2.0)).unwrap();
        assert_eq!(reg.find_zone(Vec3::ZERO, &config).map(|(h, _)| h), Some(a));
    }

    #[test]
    fn test_default_fallback() {
        let config = GravityConfig::default();
        let mut reg = GravityZoneRegistry::new();
        let a = HandleAllocator::new().allocate();
        reg.update_zone(a, cube(2.0, -1.0)).unwrap();
        let far = Vec3::new(100.0, 0.0, 0.0);
        assert_eq!(reg.gravity_at(far, &config), config.default_gravity());
        assert_eq!(reg.up_direction_at(far, &config), Vec3::Y);
    }

    #[test]
    fn test_update_is_upsert() {
        let mut reg = GravityZoneRegistry::new();
        let a = HandleAllocator::new().allocate();
        reg.update_zone(a, cube(2.0, -1.0)).unwrap();
        reg.update_zone(a, cube(4.0, -1.0)).unwrap();
        assert_eq!(reg.len(), 1);
        assert_eq!(reg.get(a).map(|z| z.volume()), Some(64.0));
    }

    #[test]
    fn test_remove_swaps_and_invalidates() {
        let config = GravityConfig::default();
        let mut alloc = HandleAllocator::new();
        let mut reg = GravityZoneRegistry::new();
        let handles: Vec<_> = (0..3).map(|_| alloc.allocate()).collect();
        for (i, h) in handles.iter().enumerate() {
            reg.update_zone(*h, cube(2.0 + i as f32, -1.0 - i as f32)).unwrap();
        }

        reg.remove_zone(handles[0]).unwrap();
        assert!(alloc.release(handles[0]));
        assert_eq!(reg.len(), 2);
        let mut remaining: Vec<_> = reg.handles().collect();
        remaining.sort_by_key(|h| h.index());
        assert_eq!(remaining, vec![handles[1], handles[2]]);
        // 被移动的条目仍可通过句柄访问
        assert_eq!(reg.get(handles[2]).map(|z| z.volume()), Some(64.0));

        // 旧句柄失效，槽位复用后代数不同
        assert!(matches!(
            reg.update_zone(handles[0], cube(1.0, 0.0)),
            Err(AnimError::StaleZoneHandle { .. })
        ));
        let reused = alloc.allocate();
        assert_eq!(reused.index(), handles[0].index());
        assert_ne!(reused, handles[0]);
        assert!(reg.remove_zone(handles[0]).is_err());
        assert!(!alloc.release(handles[0]));
        reg.update_zone(reused, cube(1.0, -3.0)).unwrap();
        assert_eq!(reg.get(reused).map(|z| z.volume()), Some(1.0));
        assert!(reg.get(handles[0]).is_none());

        // 原本只在被删除区域内的点回落到默认重力
        reg.remove_zone(reused).unwrap();
        reg.remove_zone(handles[1]).unwrap();
        reg.remove_zone(handles[2]).unwrap();
        assert_eq!(reg.gravity_at(Vec3::ZERO, &config), config.default_gravity());
    }

    #[test]
    fn test_reused_slot_replaces_unremoved_zone() {
        // 新代数句柄先于旧区域的删除到达时，旧区域被替换而不是残留
        let mut alloc = HandleAllocator::new();
        let mut reg = GravityZoneRegistry::new();
        let old = alloc.allocate();
        reg.update_zone(old, cube(2.0, -1.0)).unwrap();
        assert!(alloc.release(old));
        let new = alloc.allocate();
        reg.update_zone(new, cube(4.0, -2.0)).unwrap();

        assert_eq!(reg.len(), 1);
        assert_eq!(reg.get(new).map(|z| z.volume()), Some(64.0));
        assert!(reg.remove_zone(old).is_err());
        assert_eq!(reg.len(), 1);
    }
}
