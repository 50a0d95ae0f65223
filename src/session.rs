//! スキャンセッションの実行
//!
//! フレームソースのfpsで1ティックずつ待ち、推論と状態遷移を完了してから
//! 次のティックへ進む。フレーム同士が重なることはない。

use crate::capture::{Frame, FrameSource, StillImage};
use crate::classifier::PredictionSource;
use crate::error::{Result, ScanError};
use leaf_scan_common::{validate_predictions, DetectionResult, Effect, Prediction, ScanController, ScanEvent, ScanPhase, ScanSession};
use std::future::Future;
use std::time::Duration;
use tokio::time::{interval, sleep, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// セッション終了理由
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// 検出結果が確定した
    Detected,
    /// キャンセル（Ctrl-C・リセット）
    Cancelled,
    /// フレームソースが終端に達した
    SourceExhausted,
    /// 静止画のサンプルで確定できなかった
    NoDetection,
}

/// セッションの結果
#[derive(Debug, Clone)]
pub struct SessionOutcome {
    pub end: SessionEnd,
    pub detection: Option<DetectionResult>,
    /// 検出に使われたフレーム（AI診断に送る）
    pub frame: Option<Frame>,
    pub predictions: Vec<Prediction>,
    pub frames_processed: u64,
}

impl SessionOutcome {
    fn ended(end: SessionEnd, frames_processed: u64) -> Self {
        Self {
            end,
            detection: None,
            frame: None,
            predictions: Vec::new(),
            frames_processed,
        }
    }
}

/// 1ティック分の報告（表示用）
pub struct TickReport<'a> {
    pub frame_index: u64,
    pub predictions: &'a [Prediction],
    pub effect: &'a Effect,
    pub session: &'a ScanSession,
}

/// 推論して不正な予測集合を弾く
fn classify<P: PredictionSource + ?Sized>(predictor: &mut P, frame: &Frame) -> Result<Vec<Prediction>> {
    let raw = predictor.predict(&frame.image)?;
    validate_predictions(raw).map_err(ScanError::from)
}

/// ライブセッション
///
/// `source` はこの関数が所有し、戻るとき（エラー含む）に解放される。
pub async fn run_live<S, P, F>(
    controller: &mut ScanController,
    mut source: S,
    predictor: &mut P,
    cancel: &CancellationToken,
    mut observer: F,
) -> Result<SessionOutcome>
where
    S: FrameSource,
    P: PredictionSource + ?Sized,
    F: FnMut(&TickReport<'_>),
{
    let fps = source.frame_rate();
    if !(fps.is_finite() && fps > 0.0) {
        return Err(ScanError::Config(format!("fps は正の値で指定してください: {}", fps)));
    }

    let generation = controller.generation();
    let mut ticker = interval(Duration::from_secs_f64(1.0 / fps));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!(source = %source.describe(), generation, "スキャン開始");
    let mut processed = 0u64;

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!("スキャンを中断しました");
                return Ok(SessionOutcome::ended(SessionEnd::Cancelled, processed));
            }
            _ = ticker.tick() => {}
        }

        if controller.generation() != generation {
            debug!(generation, current = controller.generation(), "古い世代のティックを破棄");
            return Ok(SessionOutcome::ended(SessionEnd::Cancelled, processed));
        }

        let frame = match source.next_frame() {
            None => {
                info!(frames = processed, "フレームソースが終端に達しました");
                return Ok(SessionOutcome::ended(SessionEnd::SourceExhausted, processed));
            }
            Some(Err(e)) => {
                debug!(error = %e, "フレーム取得失敗（スキップ）");
                continue;
            }
            Some(Ok(frame)) => frame,
        };

        let predictions = match classify(predictor, &frame) {
            Ok(p) => p,
            Err(e) => {
                debug!(frame = frame.index, error = %e, "推論結果をスキップ");
                continue;
            }
        };
        processed += 1;

        let effect = controller.on_frame(&predictions, Instant::now().into_std());
        debug!(frame = frame.index, phase = %controller.session().phase(), ?effect, "ティック処理");
        observer(&TickReport {
            frame_index: frame.index,
            predictions: &predictions,
            effect: &effect,
            session: controller.session(),
        });

        if let Effect::Detected(result) = effect {
            info!(label = %result.label, frame = frame.index, "検出しました");
            return Ok(SessionOutcome {
                end: SessionEnd::Detected,
                detection: Some(result),
                frame: Some(frame),
                predictions,
                frames_processed: processed,
            });
        }

        if !controller.session().is_scanning() {
            return Ok(SessionOutcome::ended(SessionEnd::Cancelled, processed));
        }
    }
}

/// キャンセルされるまで `fut` を待つ
///
/// キャンセルされた場合は `fut` を捨てて None を返す。
pub async fn until_cancelled<F: Future>(cancel: &CancellationToken, fut: F) -> Option<F::Output> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        out = fut => Some(out),
    }
}

/// 解析中表示の待機
///
/// 待機前に世代を記録し、経過後にその世代でイベントを送る。
/// 途中でリセットされていれば `Effect::Stale` になる。
/// キャンセルされた場合は `Effect::Ignored` を返し、フェーズは Analyzing のまま残る。
pub async fn finish_analysis(controller: &mut ScanController, cancel: &CancellationToken) -> Effect {
    if controller.session().phase() != ScanPhase::Analyzing {
        return Effect::Ignored;
    }
    let generation = controller.generation();
    let delay = controller.config().analyzing_delay;

    tokio::select! {
        biased;
        _ = cancel.cancelled() => return Effect::Ignored,
        _ = sleep(delay) => {}
    }
    controller.handle(ScanEvent::AnalysisElapsed { generation })
}

/// プリセット静止画の解析
///
/// 一定の遅延の後、サンプル1つで即時に確定する。
/// 非健康ラベルなら Analyzing に入るので、続けて `finish_analysis` を呼ぶ。
pub async fn run_still<P>(
    controller: &mut ScanController,
    still: &StillImage,
    predictor: &mut P,
    delay: Duration,
    cancel: &CancellationToken,
) -> Result<SessionOutcome>
where
    P: PredictionSource + ?Sized,
{
    let generation = controller.generation();
    info!(source = %still.path().display(), "静止画を解析します");

    tokio::select! {
        biased;
        _ = cancel.cancelled() => return Ok(SessionOutcome::ended(SessionEnd::Cancelled, 0)),
        _ = sleep(delay) => {}
    }

    let frame = still.frame();
    let predictions = match classify(predictor, &frame) {
        Ok(p) => p,
        Err(e) => {
            debug!(error = %e, "静止画の推論結果をスキップ");
            return Ok(SessionOutcome::ended(SessionEnd::NoDetection, 0));
        }
    };

    let effect = controller.handle(ScanEvent::StillFrame {
        predictions: &predictions,
        at: Instant::now().into_std(),
        generation,
    });

    match effect {
        Effect::Detected(result) => {
            info!(label = %result.label, "検出しました");
            Ok(SessionOutcome {
                end: SessionEnd::Detected,
                detection: Some(result),
                frame: Some(frame),
                predictions,
                frames_processed: 1,
            })
        }
        Effect::Stale => Ok(SessionOutcome::ended(SessionEnd::Cancelled, 1)),
        _ => Ok(SessionOutcome {
            predictions,
            ..SessionOutcome::ended(SessionEnd::NoDetection, 1)
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ended_outcome_is_empty() {
        let o = SessionOutcome::ended(SessionEnd::SourceExhausted, 3);
        assert!(o.detection.is_none());
        assert!(o.frame.is_none());
        assert_eq!(o.frames_processed, 3);
    }
}
