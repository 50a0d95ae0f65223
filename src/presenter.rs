//! 結果表示（ターミナル）
//!
//! `render_*` はセッション状態と診断から表示文字列を作るだけの純粋関数。
//! 対話メニューとスピナーだけが端末に触れる。

use crate::error::{Result, ScanError};
use dialoguer::Select;
use indicatif::{ProgressBar, ProgressStyle};
use leaf_scan_common::{
    treatment_search_url, ClassTaxonomy, ControllerConfig, DetectionResult, Diagnosis, Prediction, ScanPhase,
    ScanSession, ABOUT_INTRO, CATEGORY_GUIDES, TOMATO_BLIGHT_PLAN,
};
use std::fmt::Write as _;
use std::time::Duration;

const BAR_WIDTH: usize = 20;

/// スキャン中のオーバーレイ
pub fn render_overlay(session: &ScanSession, config: &ControllerConfig) -> String {
    match session.phase() {
        ScanPhase::Scanning => {
            if let Some(instruction) = session.instruction() {
                format!("👀 {}", instruction)
            } else if let Some(label) = session.candidate_label() {
                format!("🔍 Scanning... {} を確認中（{:.1}秒保持で確定）", label, config.hold_duration.as_secs_f32())
            } else {
                "🔍 Scanning...".to_string()
            }
        }
        ScanPhase::Analyzing => "🧪 Analyzing...".to_string(),
        ScanPhase::Detected | ScanPhase::HelpView => match session.detection() {
            Some(result) => format!("✔ Detected: {}", result.label),
            None => "✔ Detected".to_string(),
        },
    }
}

/// 予測の棒グラフ（詳細表示）
pub fn render_predictions(predictions: &[Prediction]) -> String {
    let width = predictions.iter().map(|p| p.label.chars().count()).max().unwrap_or(0);
    let mut out = String::new();
    for p in predictions {
        let filled = ((p.probability.clamp(0.0, 1.0) * BAR_WIDTH as f32).round() as usize).min(BAR_WIDTH);
        let _ = writeln!(
            out,
            "  {:<width$} {}{} {:5.1}%",
            p.label,
            "█".repeat(filled),
            "░".repeat(BAR_WIDTH - filled),
            p.probability * 100.0,
            width = width
        );
    }
    out
}

/// 検出結果カード（健康 or 症状あり）
pub fn render_result(result: &DetectionResult, taxonomy: &ClassTaxonomy) -> String {
    if taxonomy.is_healthy(&result.label) {
        format!(
            "🌿 Leaf is Healthy!\n   検出: {}\n   このまま通常の管理を続けてください。",
            result.label
        )
    } else {
        format!(
            "⚠ Issue Detected: {}\n   「ヘルプ」で対処プラン、「AI診断」で詳しい診断を確認できます。",
            result.label
        )
    }
}

/// 対処プラン（HelpView）
pub fn render_help(result: &DetectionResult) -> String {
    let mut out = format!("📋 {}\n", TOMATO_BLIGHT_PLAN.title);
    for (i, step) in TOMATO_BLIGHT_PLAN.steps.iter().enumerate() {
        let _ = writeln!(out, "  {}. {}", i + 1, step);
    }
    let _ = write!(out, "\n🔗 検索: {}", treatment_search_url(&result.label));
    out
}

/// AI診断カード
pub fn render_diagnosis(diagnosis: &Diagnosis, healthy_marker: &str) -> String {
    let mut out = format!("🩺 {}\n   {}\n", diagnosis.diagnosis, diagnosis.advice);
    if !diagnosis.remedies.is_empty() {
        out.push_str("\n   対処法:\n");
        for remedy in &diagnosis.remedies {
            let _ = writeln!(out, "   - [{}] {}: {}", remedy.kind, remedy.name, remedy.action);
        }
    }
    if !diagnosis.is_healthy(healthy_marker) && !diagnosis.product_match.is_empty() {
        let _ = write!(out, "\n   🛒 Purchase {}", diagnosis.product_match);
    }
    out.trim_end().to_string()
}

/// セッション継続不能なエラーのブロッキング表示（一時的なエラーは None）
pub fn render_fatal(err: &ScanError) -> Option<String> {
    err.is_fatal()
        .then(|| format!("⛔ {}\n   設定・モデル・フレームソースを確認して再起動してください。", err))
}

/// About パネル
pub fn render_about() -> String {
    let mut out = format!("ℹ About\n{}\n", ABOUT_INTRO);
    for guide in CATEGORY_GUIDES {
        let _ = write!(out, "\n  ● {}\n    {}\n", guide.name, guide.description);
    }
    out
}

/// 結果画面の操作
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuAction {
    GetHelp,
    AiDiagnosis,
    ScanAgain,
    ChoosePreset,
    About,
    Quit,
}

impl MenuAction {
    pub fn label(&self) -> &'static str {
        match self {
            MenuAction::GetHelp => "ヘルプ（対処プラン）",
            MenuAction::AiDiagnosis => "AI診断",
            MenuAction::ScanAgain => "もう一度スキャン",
            MenuAction::ChoosePreset => "プリセット画像を選択",
            MenuAction::About => "About",
            MenuAction::Quit => "終了",
        }
    }
}

/// 現在の状態で選べる操作
pub fn available_actions(session: &ScanSession, taxonomy: &ClassTaxonomy, has_presets: bool) -> Vec<MenuAction> {
    let mut actions = Vec::new();
    if let Some(result) = session.detection() {
        if session.phase() == ScanPhase::Detected && !taxonomy.is_healthy(&result.label) {
            actions.push(MenuAction::GetHelp);
        }
        actions.push(MenuAction::AiDiagnosis);
    }
    actions.push(MenuAction::ScanAgain);
    if has_presets {
        actions.push(MenuAction::ChoosePreset);
    }
    actions.push(MenuAction::About);
    actions.push(MenuAction::Quit);
    actions
}

/// 操作を選ばせる
pub fn prompt_action(actions: &[MenuAction]) -> Result<MenuAction> {
    let items: Vec<&str> = actions.iter().map(|a| a.label()).collect();
    let index = Select::new()
        .with_prompt("操作を選択")
        .items(&items)
        .default(0)
        .interact()
        .map_err(|e| ScanError::Prompt(e.to_string()))?;
    actions
        .get(index)
        .copied()
        .ok_or_else(|| ScanError::Prompt(format!("不正な選択: {}", index)))
}

/// 一覧から1つ選ばせる（プリセット画像など）
pub fn prompt_choice(prompt: &str, items: &[String]) -> Result<usize> {
    Select::new()
        .with_prompt(prompt)
        .items(items)
        .default(0)
        .interact()
        .map_err(|e| ScanError::Prompt(e.to_string()))
}

/// スピナー（モデル読み込み・解析中・AI問い合わせ）
pub fn spinner(message: impl Into<String>) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{spinner:.green} {msg} [{elapsed}]")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(message.into());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// 見出し付きタイムスタンプ
pub fn timestamp() -> String {
    chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use leaf_scan_common::{BackgroundClass, Remedy, RemedyKind, ScanController};
    use std::time::Instant;

    fn taxonomy() -> ClassTaxonomy {
        let labels = ["Healthy", "Pre-symptomatic", "Symptomatic", "Background"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        ClassTaxonomy::new(labels, Some(&BackgroundClass::Name("Background".into())), "healthy").unwrap()
    }

    #[test]
    fn test_overlay_scanning_and_instruction() {
        let config = ControllerConfig::new(taxonomy());
        let mut c = ScanController::new(config.clone());
        assert_eq!(render_overlay(c.session(), &config), "🔍 Scanning...");

        c.on_frame(&[Prediction::new("Background", 0.99)], Instant::now());
        assert!(render_overlay(c.session(), &config).contains("Point towards a tomato leaf"));

        c.on_frame(&[Prediction::new("Symptomatic", 0.9)], Instant::now());
        assert!(render_overlay(c.session(), &config).contains("Symptomatic"));
    }

    #[test]
    fn test_prediction_bars() {
        let out = render_predictions(&[Prediction::new("Healthy", 1.0), Prediction::new("Symptomatic", 0.0)]);
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains(&"█".repeat(BAR_WIDTH)));
        assert!(lines[0].contains("100.0%"));
        assert!(lines[1].contains(&"░".repeat(BAR_WIDTH)));
    }

    #[test]
    fn test_healthy_and_issue_cards() {
        let t = taxonomy();
        let healthy = render_result(&DetectionResult { label: "Healthy".into() }, &t);
        assert!(healthy.contains("Leaf is Healthy!"));
        let issue = render_result(&DetectionResult { label: "Symptomatic".into() }, &t);
        assert!(issue.contains("Symptomatic"));
        assert!(!issue.contains("Leaf is Healthy!"));
    }

    #[test]
    fn test_help_view() {
        let out = render_help(&DetectionResult { label: "Early Blight".into() });
        assert!(out.contains("Tomato Blight Management"));
        assert!(out.contains("4. Apply copper fungicide or Neem oil."));
        assert!(out.contains("q=Early%20Blight%20treatment"));
    }

    #[test]
    fn test_diagnosis_card_purchase_only_when_not_healthy() {
        let sick = Diagnosis {
            diagnosis: "Early Blight".into(),
            advice: "Remove lower leaves.".into(),
            remedies: vec![Remedy {
                name: "Neem Oil".into(),
                kind: RemedyKind::Organic,
                action: "Spray weekly.".into(),
            }],
            product_match: "Copper Fungicide".into(),
        };
        let out = render_diagnosis(&sick, "healthy");
        assert!(out.contains("[organic] Neem Oil"));
        assert!(out.contains("Purchase Copper Fungicide"));

        let fine = Diagnosis {
            diagnosis: "Healthy Crop".into(),
            advice: "Keep it up.".into(),
            remedies: vec![],
            product_match: "N/A".into(),
        };
        assert!(!render_diagnosis(&fine, "healthy").contains("Purchase"));
    }

    #[test]
    fn test_diagnosis_card_without_product() {
        let sick = Diagnosis {
            diagnosis: "Late Blight".into(),
            advice: "Isolate the plant.".into(),
            remedies: vec![],
            product_match: String::new(),
        };
        let out = render_diagnosis(&sick, "healthy");
        assert!(out.contains("Late Blight"));
        assert!(!out.contains("Purchase"));
    }

    #[test]
    fn test_fatal_message_only_for_fatal_errors() {
        let message = render_fatal(&ScanError::CameraUnavailable("frames".into())).unwrap();
        assert!(message.starts_with("⛔"));
        assert!(message.contains("frames"));

        assert!(render_fatal(&ScanError::Inference("出力なし".into())).is_none());
        assert!(render_fatal(&ScanError::ApiCall("timeout".into())).is_none());
    }

    #[test]
    fn test_about_lists_categories() {
        let out = render_about();
        for name in ["Healthy", "Pre-symptomatic", "Symptomatic"] {
            assert!(out.contains(name));
        }
    }

    #[test]
    fn test_available_actions() {
        let t = taxonomy();
        let c = ScanController::new(ControllerConfig::new(t.clone()));
        let actions = available_actions(c.session(), &t, false);
        assert_eq!(actions, vec![MenuAction::ScanAgain, MenuAction::About, MenuAction::Quit]);

        let mut c = ScanController::new(ControllerConfig::new(t.clone()));
        c.on_still(&[Prediction::new("Symptomatic", 0.95)], Instant::now());
        let generation = c.generation();
        c.handle(leaf_scan_common::ScanEvent::AnalysisElapsed { generation });
        let actions = available_actions(c.session(), &t, true);
        assert_eq!(actions[0], MenuAction::GetHelp);
        assert!(actions.contains(&MenuAction::AiDiagnosis));
        assert!(actions.contains(&MenuAction::ChoosePreset));
    }
}
