//! スキャン検出コントローラ
//!
//! フレームごとの分類結果（ノイズを含む連続ストリーム）を受け取り、
//! 一定時間同じクラスが保持されたときに一度だけ検出結果を確定する状態機械。
//!
//! 状態遷移は `transition(session, event, config)` が唯一の入口で、
//! 現在の状態とイベントから次の状態と副作用（Effect）を返す。
//!
//! ```text
//! Scanning ──(保持時間超過 or 静止画・非健康)──> Analyzing ──(AnalysisElapsed)──> Detected
//!    │                                                                             │  ▲
//!    └──────────────(保持時間超過 or 静止画・健康)────────────────────────────────────┘  │
//!                                                   Detected ──RequestHelp──> HelpView
//! 任意の状態 ──Reset──> Scanning
//! ```

use crate::taxonomy::ClassTaxonomy;
use crate::types::{top_prediction, DetectionResult, Prediction};
use std::path::PathBuf;
use std::time::{Duration, Instant};

/// 信頼度しきい値（これ未満の最上位予測はノイズ扱い）
pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.85;

/// 検出確定までの保持時間
pub const DEFAULT_HOLD_DURATION: Duration = Duration::from_millis(3000);

/// 解析中表示の演出時間
pub const DEFAULT_ANALYZING_DELAY: Duration = Duration::from_millis(2500);

/// ノイズ時にユーザーへ表示する指示
pub const DEFAULT_INSTRUCTION: &str = "Point towards a tomato leaf";

/// スキャンの状態
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ScanPhase {
    #[default]
    Scanning,
    Analyzing,
    Detected,
    HelpView,
}

impl std::fmt::Display for ScanPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScanPhase::Scanning => write!(f, "SCANNING"),
            ScanPhase::Analyzing => write!(f, "ANALYZING"),
            ScanPhase::Detected => write!(f, "DETECTED"),
            ScanPhase::HelpView => write!(f, "HELP_VIEW"),
        }
    }
}

/// 保持時間を計測中の候補クラス
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub label: String,
    pub since: Instant,
}

/// コントローラ設定
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    pub taxonomy: ClassTaxonomy,
    pub confidence_threshold: f32,
    pub hold_duration: Duration,
    /// 0 のときは Analyzing を経由しない
    pub analyzing_delay: Duration,
    pub instruction: String,
}

impl ControllerConfig {
    pub fn new(taxonomy: ClassTaxonomy) -> Self {
        Self {
            taxonomy,
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            hold_duration: DEFAULT_HOLD_DURATION,
            analyzing_delay: DEFAULT_ANALYZING_DELAY,
            instruction: DEFAULT_INSTRUCTION.to_string(),
        }
    }

    pub fn with_confidence_threshold(mut self, threshold: f32) -> Self {
        self.confidence_threshold = threshold;
        self
    }

    pub fn with_hold_duration(mut self, hold: Duration) -> Self {
        self.hold_duration = hold;
        self
    }

    pub fn with_analyzing_delay(mut self, delay: Duration) -> Self {
        self.analyzing_delay = delay;
        self
    }

    pub fn with_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.instruction = instruction.into();
        self
    }

    /// 最上位予測がノイズ（背景クラス or 低信頼度）か
    pub fn is_noise(&self, top: &Prediction) -> bool {
        self.taxonomy.is_background(&top.label) || top.probability < self.confidence_threshold
    }
}

/// スキャンセッションの状態
///
/// コントローラだけが変更する。Scanning に戻るたびに候補・結果はクリアされる。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanSession {
    phase: ScanPhase,
    candidate: Option<Candidate>,
    detection: Option<DetectionResult>,
    instruction: Option<String>,
    analyzing_since: Option<Instant>,
    active_preset: Option<PathBuf>,
    generation: u64,
}

impl ScanSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> ScanPhase {
        self.phase
    }

    pub fn candidate(&self) -> Option<&Candidate> {
        self.candidate.as_ref()
    }

    pub fn candidate_label(&self) -> Option<&str> {
        self.candidate.as_ref().map(|c| c.label.as_str())
    }

    pub fn candidate_since(&self) -> Option<Instant> {
        self.candidate.as_ref().map(|c| c.since)
    }

    pub fn detection(&self) -> Option<&DetectionResult> {
        self.detection.as_ref()
    }

    pub fn instruction(&self) -> Option<&str> {
        self.instruction.as_deref()
    }

    pub fn analyzing_since(&self) -> Option<Instant> {
        self.analyzing_since
    }

    pub fn active_preset(&self) -> Option<&PathBuf> {
        self.active_preset.as_ref()
    }

    /// 世代番号（Reset ごとに進む。古いフレームの判定に使う）
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_scanning(&self) -> bool {
        self.phase == ScanPhase::Scanning
    }

    fn reset(self) -> Self {
        Self {
            generation: self.generation.wrapping_add(1),
            active_preset: self.active_preset,
            ..Self::default()
        }
    }
}

/// コントローラへの入力
#[derive(Debug, Clone)]
pub enum ScanEvent<'a> {
    /// ライブ映像の1フレーム
    Frame {
        predictions: &'a [Prediction],
        at: Instant,
        generation: u64,
    },
    /// 静止画解析の唯一のサンプル
    StillFrame {
        predictions: &'a [Prediction],
        at: Instant,
        generation: u64,
    },
    /// 解析中演出の終了
    AnalysisElapsed { generation: u64 },
    RequestHelp,
    DismissHelp,
    Reset,
    SelectPreset(PathBuf),
    ClearPreset,
}

/// 遷移に伴う副作用（表示側への通知）
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// 予測セットが空（遷移なし）
    Skipped,
    /// 世代が古いイベント
    Stale,
    /// 現在の状態では受け付けないイベント
    Ignored,
    /// ノイズ：候補をクリアし指示を表示
    Instruction(String),
    CandidateStarted { label: String },
    Holding { label: String, elapsed: Duration },
    /// 検出確定（1セッションにつき1回）
    Detected(DetectionResult),
    AnalysisFinished(DetectionResult),
    HelpOpened,
    HelpClosed,
    Reset,
    PresetChanged(Option<PathBuf>),
}

/// 遷移結果
#[derive(Debug, Clone)]
pub struct Transition {
    pub session: ScanSession,
    pub effect: Effect,
}

impl Transition {
    fn new(session: ScanSession, effect: Effect) -> Self {
        Self { session, effect }
    }
}

/// 状態遷移関数
pub fn transition(session: ScanSession, event: ScanEvent<'_>, config: &ControllerConfig) -> Transition {
    match event {
        ScanEvent::Frame {
            predictions,
            at,
            generation,
        } => {
            if generation != session.generation {
                return Transition::new(session, Effect::Stale);
            }
            consume_frame(session, predictions, at, false, config)
        }
        ScanEvent::StillFrame {
            predictions,
            at,
            generation,
        } => {
            if generation != session.generation {
                return Transition::new(session, Effect::Stale);
            }
            consume_frame(session, predictions, at, true, config)
        }
        ScanEvent::AnalysisElapsed { generation } => {
            if generation != session.generation {
                return Transition::new(session, Effect::Stale);
            }
            match (session.phase, session.detection.clone()) {
                (ScanPhase::Analyzing, Some(result)) => Transition::new(
                    ScanSession {
                        phase: ScanPhase::Detected,
                        analyzing_since: None,
                        ..session
                    },
                    Effect::AnalysisFinished(result),
                ),
                _ => Transition::new(session, Effect::Ignored),
            }
        }
        ScanEvent::RequestHelp => match session.phase {
            ScanPhase::Detected => Transition::new(
                ScanSession {
                    phase: ScanPhase::HelpView,
                    ..session
                },
                Effect::HelpOpened,
            ),
            _ => Transition::new(session, Effect::Ignored),
        },
        ScanEvent::DismissHelp => match session.phase {
            ScanPhase::HelpView => Transition::new(
                ScanSession {
                    phase: ScanPhase::Detected,
                    ..session
                },
                Effect::HelpClosed,
            ),
            _ => Transition::new(session, Effect::Ignored),
        },
        ScanEvent::Reset => Transition::new(session.reset(), Effect::Reset),
        ScanEvent::SelectPreset(path) => {
            let mut next = session.reset();
            next.active_preset = Some(path.clone());
            Transition::new(next, Effect::PresetChanged(Some(path)))
        }
        ScanEvent::ClearPreset => {
            let mut next = session.reset();
            next.active_preset = None;
            Transition::new(next, Effect::PresetChanged(None))
        }
    }
}

/// 1フレーム分の判定
///
/// `still` のときはサンプル1つで保持時間を待たずに確定する。
/// 確定後の Analyzing 経由はライブと同じ。
fn consume_frame(
    session: ScanSession,
    predictions: &[Prediction],
    at: Instant,
    still: bool,
    config: &ControllerConfig,
) -> Transition {
    if session.phase != ScanPhase::Scanning {
        return Transition::new(session, Effect::Ignored);
    }

    let Some(top) = top_prediction(predictions) else {
        return Transition::new(session, Effect::Skipped);
    };

    if config.is_noise(top) {
        let instruction = config.instruction.clone();
        return Transition::new(
            ScanSession {
                candidate: None,
                instruction: Some(instruction.clone()),
                ..session
            },
            Effect::Instruction(instruction),
        );
    }

    let session = ScanSession {
        instruction: None,
        ..session
    };

    if still {
        return detect(session, top.label.clone(), at, config);
    }

    let held = session
        .candidate
        .as_ref()
        .filter(|c| c.label == top.label)
        .map(|c| at.saturating_duration_since(c.since));

    match held {
        Some(elapsed) if elapsed > config.hold_duration => detect(session, top.label.clone(), at, config),
        Some(elapsed) => {
            let label = top.label.clone();
            Transition::new(session, Effect::Holding { label, elapsed })
        }
        None => {
            let label = top.label.clone();
            Transition::new(
                ScanSession {
                    candidate: Some(Candidate {
                        label: label.clone(),
                        since: at,
                    }),
                    ..session
                },
                Effect::CandidateStarted { label },
            )
        }
    }
}

fn detect(session: ScanSession, label: String, at: Instant, config: &ControllerConfig) -> Transition {
    let result = DetectionResult { label };
    let analyzing = !config.analyzing_delay.is_zero() && !config.taxonomy.is_healthy(&result.label);

    let next = ScanSession {
        phase: if analyzing {
            ScanPhase::Analyzing
        } else {
            ScanPhase::Detected
        },
        candidate: None,
        detection: Some(result.clone()),
        instruction: None,
        analyzing_since: if analyzing { Some(at) } else { None },
        ..session
    };
    Transition::new(next, Effect::Detected(result))
}

/// セッションと設定を保持する薄いラッパー
#[derive(Debug, Clone)]
pub struct ScanController {
    session: ScanSession,
    config: ControllerConfig,
}

impl ScanController {
    pub fn new(config: ControllerConfig) -> Self {
        Self {
            session: ScanSession::new(),
            config,
        }
    }

    pub fn session(&self) -> &ScanSession {
        &self.session
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn generation(&self) -> u64 {
        self.session.generation
    }

    pub fn handle(&mut self, event: ScanEvent<'_>) -> Effect {
        let session = std::mem::take(&mut self.session);
        let Transition { session, effect } = transition(session, event, &self.config);
        self.session = session;
        effect
    }

    /// 現在世代のライブフレームを処理
    pub fn on_frame(&mut self, predictions: &[Prediction], at: Instant) -> Effect {
        let generation = self.session.generation;
        self.handle(ScanEvent::Frame {
            predictions,
            at,
            generation,
        })
    }

    /// 現在世代の静止画サンプルを処理
    pub fn on_still(&mut self, predictions: &[Prediction], at: Instant) -> Effect {
        let generation = self.session.generation;
        self.handle(ScanEvent::StillFrame {
            predictions,
            at,
            generation,
        })
    }

    pub fn reset(&mut self) -> Effect {
        self.handle(ScanEvent::Reset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::taxonomy::BackgroundClass;

    fn config() -> ControllerConfig {
        let labels = ["Healthy", "Pre-symptomatic", "Symptomatic", "Background"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let taxonomy =
            ClassTaxonomy::new(labels, Some(&BackgroundClass::Name("Background".into())), "healthy").unwrap();
        ControllerConfig::new(taxonomy)
    }

    fn preds(top: &str, p: f32) -> Vec<Prediction> {
        let rest = (1.0 - p) / 3.0;
        ["Healthy", "Pre-symptomatic", "Symptomatic", "Background"]
            .iter()
            .map(|l| Prediction::new(*l, if *l == top { p } else { rest }))
            .collect()
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_initial_state_is_scanning() {
        let c = ScanController::new(config());
        assert_eq!(c.session().phase(), ScanPhase::Scanning);
        assert!(c.session().candidate().is_none());
        assert!(c.session().detection().is_none());
    }

    #[test]
    fn test_low_confidence_is_noise_and_clears_candidate() {
        let mut c = ScanController::new(config());
        let t0 = Instant::now();
        c.on_frame(&preds("Symptomatic", 0.9), t0);
        assert_eq!(c.session().candidate_label(), Some("Symptomatic"));

        let effect = c.on_frame(&preds("Symptomatic", 0.84), t0 + ms(500));
        assert_eq!(effect, Effect::Instruction(DEFAULT_INSTRUCTION.to_string()));
        assert!(c.session().candidate().is_none());
        assert_eq!(c.session().instruction(), Some(DEFAULT_INSTRUCTION));
        assert_eq!(c.session().phase(), ScanPhase::Scanning);
    }

    #[test]
    fn test_background_never_detects() {
        let mut c = ScanController::new(config());
        let t0 = Instant::now();
        for i in 0..50 {
            let effect = c.on_frame(&preds("Background", 0.99), t0 + ms(i * 500));
            assert!(matches!(effect, Effect::Instruction(_)));
        }
        assert_eq!(c.session().phase(), ScanPhase::Scanning);
        assert!(c.session().detection().is_none());
    }

    #[test]
    fn test_hold_boundary_is_strict() {
        let labels = vec!["A".to_string(), "B".to_string()];
        let taxonomy = ClassTaxonomy::new(labels, None, "healthy").unwrap();
        let mut c = ScanController::new(ControllerConfig::new(taxonomy).with_analyzing_delay(Duration::ZERO));
        let t0 = Instant::now();

        for (i, p) in [0.9f32, 0.92, 0.95].iter().enumerate() {
            let set = vec![Prediction::new("A", *p), Prediction::new("B", 1.0 - p)];
            let effect = c.on_frame(&set, t0 + ms(1500 * i as u64));
            assert!(!matches!(effect, Effect::Detected(_)), "frame {} detected too early", i);
        }
        assert_eq!(c.session().phase(), ScanPhase::Scanning);

        let set = vec![Prediction::new("A", 0.95), Prediction::new("B", 0.05)];
        let effect = c.on_frame(&set, t0 + ms(4500));
        assert_eq!(effect, Effect::Detected(DetectionResult { label: "A".into() }));
        assert_eq!(c.session().phase(), ScanPhase::Detected);
    }

    #[test]
    fn test_label_switch_resets_timer() {
        let mut c = ScanController::new(config());
        let t0 = Instant::now();
        c.on_frame(&preds("Symptomatic", 0.9), t0);
        c.on_frame(&preds("Symptomatic", 0.9), t0 + ms(2900));
        let effect = c.on_frame(&preds("Pre-symptomatic", 0.9), t0 + ms(3100));
        assert_eq!(
            effect,
            Effect::CandidateStarted {
                label: "Pre-symptomatic".into()
            }
        );
        assert_eq!(c.session().candidate_since(), Some(t0 + ms(3100)));

        let effect = c.on_frame(&preds("Pre-symptomatic", 0.9), t0 + ms(5000));
        assert!(matches!(effect, Effect::Holding { .. }));
        assert_eq!(c.session().phase(), ScanPhase::Scanning);
    }

    #[test]
    fn test_exactly_one_detection() {
        let mut c = ScanController::new(config());
        let t0 = Instant::now();
        let mut detections = 0;
        for i in 0..40 {
            if let Effect::Detected(_) = c.on_frame(&preds("Symptomatic", 0.95), t0 + ms(i * 250)) {
                detections += 1;
            }
        }
        assert_eq!(detections, 1);
    }

    #[test]
    fn test_diseased_goes_through_analyzing() {
        let mut c = ScanController::new(config());
        let t0 = Instant::now();
        c.on_frame(&preds("Symptomatic", 0.95), t0);
        let effect = c.on_frame(&preds("Symptomatic", 0.95), t0 + ms(3100));
        assert!(matches!(effect, Effect::Detected(_)));
        assert_eq!(c.session().phase(), ScanPhase::Analyzing);
        assert_eq!(c.session().analyzing_since(), Some(t0 + ms(3100)));

        // 解析中はフレームを消費しない
        let effect = c.on_frame(&preds("Healthy", 0.99), t0 + ms(3200));
        assert_eq!(effect, Effect::Ignored);

        let generation = c.generation();
        let effect = c.handle(ScanEvent::AnalysisElapsed { generation });
        assert_eq!(
            effect,
            Effect::AnalysisFinished(DetectionResult {
                label: "Symptomatic".into()
            })
        );
        assert_eq!(c.session().phase(), ScanPhase::Detected);
    }

    #[test]
    fn test_healthy_skips_analyzing() {
        let mut c = ScanController::new(config());
        let t0 = Instant::now();
        c.on_frame(&preds("Healthy", 0.95), t0);
        c.on_frame(&preds("Healthy", 0.95), t0 + ms(3001));
        assert_eq!(c.session().phase(), ScanPhase::Detected);
    }

    #[test]
    fn test_still_healthy_goes_directly_to_detected() {
        let mut c = ScanController::new(config());
        let effect = c.on_still(&preds("Healthy", 0.97), Instant::now());
        assert_eq!(effect, Effect::Detected(DetectionResult { label: "Healthy".into() }));
        assert_eq!(c.session().phase(), ScanPhase::Detected);
    }

    #[test]
    fn test_still_diseased_goes_through_analyzing() {
        let mut c = ScanController::new(config());
        let t0 = Instant::now();
        let set = vec![Prediction::new("Symptomatic", 0.95), Prediction::new("Healthy", 0.05)];
        let effect = c.on_still(&set, t0);
        assert_eq!(effect, Effect::Detected(DetectionResult { label: "Symptomatic".into() }));
        assert_eq!(c.session().phase(), ScanPhase::Analyzing);
        assert_eq!(c.session().analyzing_since(), Some(t0));

        let generation = c.generation();
        c.handle(ScanEvent::AnalysisElapsed { generation });
        assert_eq!(c.session().phase(), ScanPhase::Detected);
        assert_eq!(c.session().detection().unwrap().label, "Symptomatic");
    }

    #[test]
    fn test_still_diseased_without_analyzing_delay() {
        let mut c = ScanController::new(config().with_analyzing_delay(Duration::ZERO));
        c.on_still(&preds("Symptomatic", 0.9), Instant::now());
        assert_eq!(c.session().phase(), ScanPhase::Detected);
    }

    #[test]
    fn test_still_noise_stays_scanning() {
        let mut c = ScanController::new(config());
        let effect = c.on_still(&preds("Symptomatic", 0.5), Instant::now());
        assert!(matches!(effect, Effect::Instruction(_)));
        assert_eq!(c.session().phase(), ScanPhase::Scanning);
    }

    #[test]
    fn test_empty_predictions_skipped() {
        let mut c = ScanController::new(config());
        let t0 = Instant::now();
        c.on_frame(&preds("Symptomatic", 0.9), t0);
        let before = c.session().clone();
        assert_eq!(c.on_frame(&[], t0 + ms(100)), Effect::Skipped);
        assert_eq!(c.session(), &before);
    }

    #[test]
    fn test_reset_from_every_state() {
        let t0 = Instant::now();
        let build = |phase: ScanPhase| {
            let mut c = ScanController::new(config());
            c.on_frame(&preds("Symptomatic", 0.95), t0);
            if phase == ScanPhase::Scanning {
                return c;
            }
            c.on_frame(&preds("Symptomatic", 0.95), t0 + ms(3500));
            if phase == ScanPhase::Analyzing {
                return c;
            }
            let generation = c.generation();
            c.handle(ScanEvent::AnalysisElapsed { generation });
            if phase == ScanPhase::HelpView {
                c.handle(ScanEvent::RequestHelp);
            }
            c
        };

        for phase in [
            ScanPhase::Scanning,
            ScanPhase::Analyzing,
            ScanPhase::Detected,
            ScanPhase::HelpView,
        ] {
            let mut c = build(phase);
            assert_eq!(c.session().phase(), phase);
            let generation = c.generation();
            assert_eq!(c.reset(), Effect::Reset);
            assert_eq!(c.session().phase(), ScanPhase::Scanning);
            assert!(c.session().candidate_label().is_none());
            assert!(c.session().candidate_since().is_none());
            assert!(c.session().detection().is_none());
            assert_eq!(c.generation(), generation + 1);
        }
    }

    #[test]
    fn test_stale_frame_after_reset_is_ignored() {
        let mut c = ScanController::new(config());
        let t0 = Instant::now();
        let old_generation = c.generation();
        c.reset();
        let set = preds("Symptomatic", 0.95);
        let effect = c.handle(ScanEvent::Frame {
            predictions: &set,
            at: t0,
            generation: old_generation,
        });
        assert_eq!(effect, Effect::Stale);
        assert!(c.session().candidate().is_none());
    }

    #[test]
    fn test_stale_analysis_elapsed_is_ignored() {
        let mut c = ScanController::new(config());
        let t0 = Instant::now();
        c.on_frame(&preds("Symptomatic", 0.95), t0);
        c.on_frame(&preds("Symptomatic", 0.95), t0 + ms(3500));
        let generation = c.generation();
        c.reset();
        assert_eq!(c.handle(ScanEvent::AnalysisElapsed { generation }), Effect::Stale);
        assert_eq!(c.session().phase(), ScanPhase::Scanning);
    }

    #[test]
    fn test_help_view_round_trip() {
        let mut c = ScanController::new(config());
        assert_eq!(c.handle(ScanEvent::RequestHelp), Effect::Ignored);
        c.on_still(&preds("Symptomatic", 0.95), Instant::now());
        assert_eq!(c.handle(ScanEvent::RequestHelp), Effect::Ignored);
        let generation = c.generation();
        c.handle(ScanEvent::AnalysisElapsed { generation });
        assert_eq!(c.handle(ScanEvent::RequestHelp), Effect::HelpOpened);
        assert_eq!(c.session().phase(), ScanPhase::HelpView);
        assert_eq!(c.handle(ScanEvent::DismissHelp), Effect::HelpClosed);
        assert_eq!(c.session().phase(), ScanPhase::Detected);
        assert_eq!(c.session().detection().unwrap().label, "Symptomatic");
    }

    #[test]
    fn test_preset_survives_reset() {
        let mut c = ScanController::new(config());
        let path = PathBuf::from("presets/leaf.png");
        let effect = c.handle(ScanEvent::SelectPreset(path.clone()));
        assert_eq!(effect, Effect::PresetChanged(Some(path.clone())));
        c.on_still(&preds("Healthy", 0.97), Instant::now());
        c.reset();
        assert_eq!(c.session().active_preset(), Some(&path));
        c.handle(ScanEvent::ClearPreset);
        assert!(c.session().active_preset().is_none());
    }

    #[test]
    fn test_good_frame_clears_instruction() {
        let mut c = ScanController::new(config());
        let t0 = Instant::now();
        c.on_frame(&preds("Background", 0.99), t0);
        assert!(c.session().instruction().is_some());
        c.on_frame(&preds("Symptomatic", 0.9), t0 + ms(100));
        assert!(c.session().instruction().is_none());
    }
}
