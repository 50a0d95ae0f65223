//! 静的なヘルプ内容
//!
//! - 対処プラン（HelpView で表示する固定の手順）
//! - 検索リンク
//! - カテゴリ説明（About パネル）

/// 固定の対処プラン
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActionPlan {
    pub title: &'static str,
    pub steps: &'static [&'static str],
}

pub const TOMATO_BLIGHT_PLAN: ActionPlan = ActionPlan {
    title: "Tomato Blight Management",
    steps: &[
        "Remove infected leaves immediately.",
        "Ensure good air circulation.",
        "Water at base, keep leaves dry.",
        "Apply copper fungicide or Neem oil.",
    ],
};

const SEARCH_BASE_URL: &str = "https://www.google.com/search?q=";

/// 検出ラベルの対処法検索URL
pub fn treatment_search_url(label: &str) -> String {
    format!(
        "{}{}",
        SEARCH_BASE_URL,
        urlencoding::encode(&format!("{} treatment", label))
    )
}

/// About パネルのカテゴリ説明
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CategoryGuide {
    pub name: &'static str,
    pub description: &'static str,
}

pub const ABOUT_INTRO: &str =
    "This AI scanner analyzes tomato leaves to determine their health status. Here is what each category means:";

pub const CATEGORY_GUIDES: &[CategoryGuide] = &[
    CategoryGuide {
        name: "Healthy",
        description: "Leaves are vibrant green with consistent texture. No visible spots, yellowing, or wilting. Continue regular care.",
    },
    CategoryGuide {
        name: "Pre-symptomatic",
        description: "Subtle indications of stress. Look for slight yellowing (chlorosis), tiny irregularities, or pale halos before distinct spots form.",
    },
    CategoryGuide {
        name: "Symptomatic",
        description: "Clear signs of blight. Dark irregular spots, brown lesions, white fungal growth on undersides, or drying/wilting leaves.",
    },
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_has_four_steps() {
        assert_eq!(TOMATO_BLIGHT_PLAN.steps.len(), 4);
    }

    #[test]
    fn test_search_url_is_encoded() {
        let url = treatment_search_url("Early Blight");
        assert_eq!(url, "https://www.google.com/search?q=Early%20Blight%20treatment");
    }

    #[test]
    fn test_category_guides() {
        let names: Vec<_> = CATEGORY_GUIDES.iter().map(|c| c.name).collect();
        assert_eq!(names, ["Healthy", "Pre-symptomatic", "Symptomatic"]);
    }
}
