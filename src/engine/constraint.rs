// ==========================================
// 手术室排程系统 - 约束引擎
// ==========================================
// 红线: 硬约束违反必须阻断放置
// 红线: 软约束只做提示,永不阻断
// 红线: 纯函数,不修改任何输入
// ==========================================
// 职责: 评估一次候选放置
// 输入: 手术 + 手术室 + 时间窗 + 现有时段 + 医生/设备快照
// 输出: 硬/软违规列表 + 评分
// ==========================================

mod checker;
mod report;

#[cfg(test)]
mod tests;

pub use checker::{ConstraintEngine, PlacementRequest};
pub use report::{ConstraintRule, PlacementCheck, RuleSeverity, Violation};
