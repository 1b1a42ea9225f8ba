// src/model/context.rs

use serde::{Deserialize, Serialize};

use crate::model::ad::Advertisement;

/// 定向上下文：当前请求方（观看者）的属性
/// 三个维度都是可选的；缺省表示该维度不参与过滤
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct TargetingContext {
    pub role: Option<String>,
    pub course_category: Option<String>,
    pub batch: Option<String>,
}

/// 单维度匹配：广告声明了非空列表且上下文提供了取值时，
/// 取值必须在列表内；否则该维度不构成约束。
fn dimension_matches(targets: &[String], value: &Option<String>) -> bool {
    match (targets.is_empty(), value) {
        (true, _) | (_, None) => true,
        (false, Some(v)) => targets.iter().any(|t| t == v),
    }
}

/// 定向匹配谓词：三个维度的合取（AND），不是析取
pub fn targeting_matches(ad: &Advertisement, ctx: &TargetingContext) -> bool {
    dimension_matches(&ad.target_roles, &ctx.role)
        && dimension_matches(&ad.target_categories, &ctx.course_category)
        && dimension_matches(&ad.target_batches, &ctx.batch)
}
