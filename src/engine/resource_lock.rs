// ==========================================
// 手术室排程系统 - 资源级串行化
// ==========================================
// 红线: "复核 + 删除旧时段 + 插入新时段" 在锁内完成
// 红线: 同一手术的放置与生命周期操作互斥
// 红线: 同一医生的放置互斥（surgeon_hours / surgeon_double_booked 跨手术室）
// 红线: 一次 acquire 内按 LockKey 全序加锁: 手术 < 医生 < 手术室
// ==========================================

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// 锁键
///
/// 变体顺序即加锁顺序（derive(Ord) 先比较变体）。
/// 持有手术锁后可以再次 acquire 手术室锁:
/// 手术室锁的持有者不会再等待任何手术锁
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LockKey {
    Surgery(String),
    Surgeon(String),
    Room(String),
}

impl LockKey {
    pub fn surgery(id: &str) -> Self {
        LockKey::Surgery(id.to_string())
    }

    pub fn surgeon(id: &str) -> Self {
        LockKey::Surgeon(id.to_string())
    }

    pub fn room(id: &str) -> Self {
        LockKey::Room(id.to_string())
    }
}

impl fmt::Display for LockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockKey::Surgery(id) => write!(f, "surgery:{}", id),
            LockKey::Surgeon(id) => write!(f, "surgeon:{}", id),
            LockKey::Room(id) => write!(f, "room:{}", id),
        }
    }
}

/// 一组已持有的锁（drop 即释放）
#[derive(Debug)]
pub struct ResourceLockGuard {
    keys: Vec<LockKey>,
    _guards: Vec<OwnedMutexGuard<()>>,
}

impl ResourceLockGuard {
    pub fn keys(&self) -> &[LockKey] {
        &self.keys
    }
}

// ==========================================
// ResourceLockRegistry - 按资源键分配的异步锁
// ==========================================
#[derive(Debug, Default)]
pub struct ResourceLockRegistry {
    locks: Mutex<HashMap<LockKey, Arc<AsyncMutex<()>>>>,
}

impl ResourceLockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_for(&self, key: &LockKey) -> Arc<AsyncMutex<()>> {
        let mut map = match self.locks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        map.entry(key.clone())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    /// 获取一组锁（去重 + 全序）
    pub async fn acquire(&self, keys: &[LockKey]) -> ResourceLockGuard {
        let mut keys = keys.to_vec();
        keys.sort();
        keys.dedup();

        let mut guards = Vec::with_capacity(keys.len());
        for key in &keys {
            guards.push(self.lock_for(key).lock_owned().await);
        }

        ResourceLockGuard {
            keys,
            _guards: guards,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_acquire_orders_surgery_before_surgeon_before_room() {
        let registry = ResourceLockRegistry::new();
        let guard = registry
            .acquire(&[
                LockKey::room("OR-2"),
                LockKey::surgeon("DR-1"),
                LockKey::room("OR-1"),
                LockKey::surgery("S-9"),
                LockKey::room("OR-2"),
            ])
            .await;
        assert_eq!(
            guard.keys(),
            [
                LockKey::surgery("S-9"),
                LockKey::surgeon("DR-1"),
                LockKey::room("OR-1"),
                LockKey::room("OR-2"),
            ]
        );
    }

    #[test]
    fn test_same_id_in_different_namespaces_is_distinct() {
        assert_ne!(LockKey::room("X"), LockKey::surgeon("X"));
        assert_eq!(LockKey::surgeon("DR-1").to_string(), "surgeon:DR-1");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_same_room_is_serialized() {
        let registry = Arc::new(ResourceLockRegistry::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let registry = Arc::clone(&registry);
            let inside = Arc::clone(&inside);
            let max_seen = Arc::clone(&max_seen);
            handles.push(tokio::spawn(async move {
                let _guard = registry.acquire(&[LockKey::room("OR-1")]).await;
                let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                max_seen.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                inside.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_surgery_holder_can_take_room_without_deadlock() {
        let registry = Arc::new(ResourceLockRegistry::new());

        // 任务 A: 一次性持有 手术 S-2 + 手术室 OR-1
        let a = {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move {
                let _g = registry
                    .acquire(&[LockKey::surgery("S-2"), LockKey::room("OR-1")])
                    .await;
                tokio::time::sleep(Duration::from_millis(20)).await;
            })
        };
        // 任务 B: 先持有手术 S-1，再单独获取 OR-1
        let b = {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move {
                let _s = registry.acquire(&[LockKey::surgery("S-1")]).await;
                tokio::time::sleep(Duration::from_millis(5)).await;
                let _r = registry.acquire(&[LockKey::room("OR-1")]).await;
            })
        };

        tokio::time::timeout(Duration::from_secs(2), async {
            a.await.unwrap();
            b.await.unwrap();
        })
        .await
        .unwrap();
    }
}
