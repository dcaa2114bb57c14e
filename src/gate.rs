//! 按键互斥的进行中协调
//!
//! 同一个键同时只允许一个生产者进入临界区；后到的调用方等待前一个完成，
//! 然后重新查询存储，而不是重复调用外部协作者。不再被使用的键会自动移除。

use std::hash::Hash;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

type Slot = Arc<Mutex<()>>;

/// 按键的异步互斥集合
pub struct KeyedGate<K>
where
    K: Eq + Hash + Clone,
{
    slots: Arc<DashMap<K, Slot>>,
}

impl<K> Clone for KeyedGate<K>
where
    K: Eq + Hash + Clone,
{
    fn clone(&self) -> Self {
        Self {
            slots: Arc::clone(&self.slots),
        }
    }
}

impl<K> Default for KeyedGate<K>
where
    K: Eq + Hash + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K> KeyedGate<K>
where
    K: Eq + Hash + Clone,
{
    pub fn new() -> Self {
        Self {
            slots: Arc::new(DashMap::new()),
        }
    }

    /// 获取键的许可，同键的其他持有者释放前会一直等待
    pub async fn acquire(&self, key: K) -> GatePermit<K> {
        // 分片锁必须在 await 之前释放
        let slot = Arc::clone(
            &*self
                .slots
                .entry(key.clone())
                .or_insert_with(|| Arc::new(Mutex::new(()))),
        );
        let guard = slot.lock_owned().await;

        GatePermit {
            slots: Arc::clone(&self.slots),
            key,
            guard: Some(guard),
        }
    }

    /// 当前登记的键数量（持有者 + 等待者）
    pub fn in_flight(&self) -> usize {
        self.slots.len()
    }
}

/// 持有期间独占一个键
pub struct GatePermit<K>
where
    K: Eq + Hash + Clone,
{
    slots: Arc<DashMap<K, Slot>>,
    key: K,
    guard: Option<OwnedMutexGuard<()>>,
}

impl<K> GatePermit<K>
where
    K: Eq + Hash + Clone,
{
    pub fn key(&self) -> &K {
        &self.key
    }
}

impl<K> Drop for GatePermit<K>
where
    K: Eq + Hash + Clone,
{
    fn drop(&mut self) {
        drop(self.guard.take());
        // 只剩映射表自己的引用时说明没有等待者
        self.slots
            .remove_if(&self.key, |_, slot| Arc::strong_count(slot) == 1);
    }
}
