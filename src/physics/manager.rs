//! 重力区域管理器
//!
//! 三把锁：句柄分配器与事务队列只被生产者短暂持有，注册表（单写多读）只被物理线程写入。
//! 取走队列后立即释放队列锁，修改注册表时不持有它。生产者从不触碰注册表锁，
//! 持有快照的线程也可以继续分配句柄、排队变更。

use std::sync::{Mutex, RwLock, RwLockReadGuard};

use glam::Vec3;

use super::config::GravityConfig;
use super::registry::{GravityZoneRegistry, HandleAllocator, ZoneHandle};
use super::zone::{GravityEffect, ZoneVolume};

/// 排队中的区域变更
#[derive(Clone, Debug)]
pub enum ZoneTransaction {
    Update { handle: ZoneHandle, zone: ZoneVolume },
    Remove { handle: ZoneHandle },
}

impl ZoneTransaction {
    #[inline]
    pub fn handle(&self) -> ZoneHandle {
        match self {
            ZoneTransaction::Update { handle, .. } | ZoneTransaction::Remove { handle } => *handle,
        }
    }
}

pub struct GravityZoneManager {
    config: GravityConfig,
    handles: Mutex<HandleAllocator>,
    pending: Mutex<Vec<ZoneTransaction>>,
    registry: RwLock<GravityZoneRegistry>,
}

impl Default for GravityZoneManager {
    fn default() -> Self {
        Self::new(GravityConfig::default())
    }
}

impl GravityZoneManager {
    pub fn new(config: GravityConfig) -> Self {
        Self {
            config,
            handles: Mutex::new(HandleAllocator::new()),
            pending: Mutex::new(Vec::new()),
            registry: RwLock::new(GravityZoneRegistry::new()),
        }
    }

    #[inline]
    pub fn config(&self) -> &GravityConfig {
        &self.config
    }

    /// 为新区域分配句柄（区域内容稍后通过 queue_update 提交）
    pub fn create_zone_handle(&self) -> ZoneHandle {
        self.handles.lock().unwrap_or_else(|e| e.into_inner()).allocate()
    }

    pub fn queue_update(&self, handle: ZoneHandle, zone: ZoneVolume) {
        self.push(ZoneTransaction::Update { handle, zone });
    }

    /// 排队删除并立即归还句柄；槽位被复用时新句柄的变更必然排在这条删除之后
    pub fn queue_remove(&self, handle: ZoneHandle) {
        self.push(ZoneTransaction::Remove { handle });
        self.handles.lock().unwrap_or_else(|e| e.into_inner()).release(handle);
    }

    fn push(&self, transaction: ZoneTransaction) {
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(transaction);
    }

    pub fn pending_len(&self) -> usize {
        self.pending.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// 按入队顺序应用所有排队的变更，返回成功应用的条数
    pub fn apply_zone_changes(&self) -> usize {
        let transactions = {
            let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
            std::mem::take(&mut *pending)
        };
        if transactions.is_empty() {
            return 0;
        }

        let mut registry = self.registry.write().unwrap_or_else(|e| e.into_inner());
        let mut applied = 0;
        for transaction in transactions {
            let handle = transaction.handle();
            let result = match transaction {
                ZoneTransaction::Update { handle, zone } => registry.update_zone(handle, zone),
                ZoneTransaction::Remove { handle } => registry.remove_zone(handle),
            };
            match result {
                Ok(()) => applied += 1,
                Err(e) => log::warn!("[重力区域] 丢弃变更 (槽位 {}): {}", handle.index(), e),
            }
        }
        applied
    }

    /// 获取整个物理步内一致的只读快照
    pub fn read(&self) -> ZoneSnapshot<'_> {
        ZoneSnapshot {
            registry: self.registry.read().unwrap_or_else(|e| e.into_inner()),
            config: &self.config,
        }
    }

    pub fn gravity_at(&self, p: Vec3) -> Vec3 {
        self.read().gravity_at(p)
    }

    pub fn up_direction_at(&self, p: Vec3) -> Vec3 {
        self.read().up_direction_at(p)
    }

    pub fn zone_count(&self) -> usize {
        self.read().len()
    }
}

/// 注册表读锁 + 配置
pub struct ZoneSnapshot<'a> {
    registry: RwLockReadGuard<'a, GravityZoneRegistry>,
    config: &'a GravityConfig,
}

impl ZoneSnapshot<'_> {
    #[inline]
    pub fn registry(&self) -> &GravityZoneRegistry {
        &self.registry
    }

    pub fn gravity_at(&self, p: Vec3) -> Vec3 {
        self.registry.gravity_at(p, self.config)
    }

    pub fn up_direction_at(&self, p: Vec3) -> Vec3 {
        self.registry.up_direction_at(p, self.config)
    }

    /// 射线拾取最近的区域；配置关闭拾取时总是 None
    pub fn pick_zone(&self, origin: Vec3, direction: Vec3) -> Option<(ZoneHandle, f32)> {
        if !self.config.zones_pickable {
            return None;
        }
        let mut best: Option<(ZoneHandle, f32)> = None;
        for (handle, zone) in self.registry.iter() {
            let Some(t) = zone.ray_intersection(origin, direction) else {
                continue;
            };
            match best {
                Some((_, d)) if t >= d => {}
                _ => best = Some((handle, t)),
            }
        }
        best
    }

    /// 调试绘制用的朝向盒角点；配置关闭绘制时为空
    pub fn debug_outlines(&self) -> Vec<(ZoneHandle, [Vec3; 8])> {
        if !self.config.debug_draw_zones {
            return Vec::new();
        }
        self.registry.iter().map(|(handle, zone)| (handle, zone.corners())).collect()
    }

    /// 刚体回调：返回替换后的重力；不在区域内或区域效果为 None 时保持原值
    pub fn resolve_body_gravity(&self, position: Vec3, current_gravity: Vec3) -> Vec3 {
        match self.registry.find_zone(position, self.config) {
            Some((_, zone)) if zone.effect() != GravityEffect::None => zone.gravity_at(position, self.config),
            _ => current_gravity,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.registry.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }
}
