// ==========================================
// 手术室排程系统 - 启发式预测器
// ==========================================
// 职责: 时长预测 / 设备故障风险 / 排程质量评分 / 序列推荐
// 红线: 固定公式,可解释,不引入训练步骤
// 红线: 纯函数,相同输入必然得到相同输出,不返回错误
// ==========================================

mod duration;
mod equipment;
mod quality;
mod sequence;

pub use duration::{DurationFeatures, DurationPrediction, DurationPredictor};
pub use equipment::{EquipmentFailurePrediction, EquipmentFailurePredictor};
pub use quality::{ScheduleQualityReport, ScheduleScorer};
pub use sequence::SequenceRecommender;

/// 四舍五入到指定小数位
pub(crate) fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
