// ==========================================
// 手术室排程系统 - 三级优先队列
// ==========================================
// 红线: 队列只读,计算幂等（同一输入同一输出）
// 红线: 升级只打标记,不预留时段
// ==========================================
// 职责: 活跃手术按 emergency / urgent / elective 分层
//       层内按等待时长降序,并标记升级候选与老化程度
// ==========================================

mod core;

#[cfg(test)]
mod tests;

pub use self::core::{PriorityQueueEngine, QueueEntry, QueueSnapshot};
