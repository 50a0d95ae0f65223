use anyhow::{bail, Context, Result};
use clap::Parser;
use leaf_scan::capture::{classify_source, list_images, load_image, FrameDirectory, SourceKind, StillImage};
use leaf_scan::classifier::{ModelHandle, PredictionSource};
use leaf_scan::cli::{Cli, Commands};
use leaf_scan::config::Config;
use leaf_scan::diagnosis::{identify_object_or_empty, request_diagnosis_or_fallback, EncodedFrame, GeminiClient};
use leaf_scan::error::ScanError;
use leaf_scan::presenter::{self, MenuAction};
use leaf_scan::session::{self, until_cancelled, SessionEnd, SessionOutcome};
use leaf_scan_common::{fallback_diagnosis, Diagnosis, Effect, ScanController, ScanEvent, ScanPhase};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn init_logging(verbose: bool) {
    let default = if verbose {
        "leaf_scan=debug,leaf_scan_common=debug"
    } else {
        "leaf_scan=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

const INTERRUPTED: &str = "中断しました";

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = run(cli).await {
        // セッション継続不能なエラーはブロッキング表示して終了
        let fatal = e
            .chain()
            .find_map(|c| c.downcast_ref::<ScanError>())
            .and_then(presenter::render_fatal);
        if let Some(message) = fatal {
            eprintln!("{}", message);
            std::process::exit(2);
        }
        return Err(e);
    }
    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load().context("設定ファイルを読み込めません")?;

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        });
    }

    match cli.command {
        Commands::Scan {
            source,
            fps,
            repeat,
            presets,
            interactive,
            model_url,
        } => {
            println!("🍅 leaf-scan - スキャン\n");
            let options = ScanOptions {
                source,
                fps,
                repeat,
                presets,
                interactive,
                verbose: cli.verbose,
            };
            let model_url = model_url.unwrap_or_else(|| config.model_url.clone());
            run_scan(&config, &model_url, options, &cancel).await?;
        }

        Commands::Diagnose { image, label, json } => {
            let frame = EncodedFrame::from_image(&load_image(&image)?)?;
            let client = GeminiClient::from_config(&config)?;

            let pb = presenter::spinner("AIに問い合わせ中...");
            let diagnosis = until_cancelled(&cancel, request_diagnosis_or_fallback(&client, &frame, &label)).await;
            pb.finish_and_clear();
            let Some(diagnosis) = diagnosis else {
                println!("{}", INTERRUPTED);
                return Ok(());
            };

            if json {
                println!("{}", serde_json::to_string_pretty(&diagnosis)?);
            } else {
                println!("{}", presenter::render_diagnosis(&diagnosis, &config.healthy_marker));
            }
        }

        Commands::Identify { image } => {
            let frame = EncodedFrame::from_image(&load_image(&image)?)?;
            let client = GeminiClient::from_config(&config)?;

            let pb = presenter::spinner("AIに問い合わせ中...");
            let name = until_cancelled(&cancel, identify_object_or_empty(&client, &frame)).await;
            pb.finish_and_clear();
            let Some(name) = name else {
                println!("{}", INTERRUPTED);
                return Ok(());
            };

            if name.is_empty() {
                println!("物体を識別できませんでした");
            } else {
                println!("{}", name);
            }
        }

        Commands::Labels { model_url } => {
            let model_url = model_url.unwrap_or_else(|| config.model_url.clone());
            let model = load_model(&model_url, &cancel).await?;
            let taxonomy = config.taxonomy(model.class_labels().to_vec())?;

            println!("クラスラベル ({}件):", taxonomy.len());
            for (i, label) in taxonomy.labels().iter().enumerate() {
                let tag = if taxonomy.is_background(label) {
                    " [背景]"
                } else if taxonomy.is_healthy(label) {
                    " [健康]"
                } else {
                    ""
                };
                println!("  {}: {}{}", i, label, tag);
            }
            model.close();
        }

        Commands::About => {
            println!("{}", presenter::render_about());
        }

        Commands::Config { set_api_key, show } => {
            let mut config = config;

            if let Some(key) = set_api_key {
                config.set_api_key(key)?;
                println!("✔ APIキーを設定しました");
            }

            if show {
                println!("設定:");
                println!("  モデル: {}", config.model);
                println!("  APIエンドポイント: {}", config.api_base_url);
                println!("  分類モデル: {}", config.model_url);
                println!("  信頼度しきい値: {}", config.confidence_threshold);
                println!("  保持時間: {}ms", config.hold_duration_ms);
                println!("  解析表示: {}ms", config.analyzing_delay_ms);
                println!("  静止画解析: {}ms", config.still_analysis_delay_ms);
                println!(
                    "  背景クラス: {}",
                    config
                        .background_class
                        .as_ref()
                        .map(|b| format!("{:?}", b))
                        .unwrap_or_else(|| "なし".into())
                );
                println!("  健康ラベル判定: {}", config.healthy_marker);
                println!("  タイムアウト: {}秒", config.timeout_seconds);
                println!("  APIキー: {}", config.masked_api_key());
            }
        }
    }

    Ok(())
}

struct ScanOptions {
    source: PathBuf,
    fps: f64,
    repeat: bool,
    presets: Option<PathBuf>,
    interactive: bool,
    verbose: bool,
}

async fn load_model(model_url: &str, cancel: &CancellationToken) -> Result<ModelHandle> {
    let cache_dir = Config::model_cache_dir()?;
    let pb = presenter::spinner("モデルを読み込み中...");
    let model = until_cancelled(cancel, ModelHandle::load(model_url, &cache_dir)).await;
    pb.finish_and_clear();
    match model {
        Some(model) => model.with_context(|| format!("モデルを読み込めません: {}", model_url)),
        None => bail!("モデルの読み込みを{}", INTERRUPTED),
    }
}

async fn run_scan(config: &Config, model_url: &str, options: ScanOptions, cancel: &CancellationToken) -> Result<()> {
    let mut model = load_model(model_url, cancel).await?;
    let taxonomy = config.taxonomy(model.class_labels().to_vec())?;
    let mut controller = ScanController::new(config.controller_config(taxonomy));

    let presets = match &options.presets {
        Some(dir) => list_images(dir)?,
        None => Vec::new(),
    };

    let live_dir = match classify_source(&options.source)? {
        SourceKind::Live(dir) => Some(dir),
        SourceKind::Still(path) => {
            controller.handle(ScanEvent::SelectPreset(path));
            None
        }
    };

    'scan: loop {
        let outcome = match controller.session().active_preset().cloned() {
            Some(path) => {
                let still = StillImage::open(&path)?;
                let pb = presenter::spinner("静止画を解析中...");
                let outcome = session::run_still(
                    &mut controller,
                    &still,
                    &mut model,
                    config.still_analysis_delay(),
                    cancel,
                )
                .await;
                pb.finish_and_clear();
                outcome?
            }
            None => {
                let Some(dir) = &live_dir else {
                    break 'scan;
                };
                let source = FrameDirectory::open(dir, options.fps, options.repeat)
                    .with_context(|| format!("フレームソースを開けません: {}", dir.display()))?;
                let controller_config = controller.config().clone();
                let verbose = options.verbose;
                let mut last_overlay = String::new();
                session::run_live(&mut controller, source, &mut model, cancel, |tick| {
                    let overlay = presenter::render_overlay(tick.session, &controller_config);
                    if overlay != last_overlay {
                        println!("{}", overlay);
                        last_overlay = overlay;
                    }
                    if verbose {
                        print!("{}", presenter::render_predictions(tick.predictions));
                    }
                })
                .await?
            }
        };

        if !report_outcome(&mut controller, &outcome, config, options.verbose, cancel).await {
            break 'scan;
        }
        if !options.interactive {
            break 'scan;
        }

        loop {
            let actions = presenter::available_actions(
                controller.session(),
                &controller.config().taxonomy,
                !presets.is_empty(),
            );
            match presenter::prompt_action(&actions)? {
                MenuAction::GetHelp => {
                    if let Effect::HelpOpened = controller.handle(ScanEvent::RequestHelp) {
                        if let Some(result) = controller.session().detection() {
                            println!("\n{}\n", presenter::render_help(result));
                        }
                        controller.handle(ScanEvent::DismissHelp);
                    }
                }
                MenuAction::AiDiagnosis => {
                    if let (Some(result), Some(frame)) = (controller.session().detection(), &outcome.frame) {
                        let Some(diagnosis) = consult(config, &frame.image, &result.label, cancel).await? else {
                            println!("\nAI診断を{}", INTERRUPTED);
                            break 'scan;
                        };
                        println!("\n{}\n", presenter::render_diagnosis(&diagnosis, &config.healthy_marker));
                    }
                }
                MenuAction::ScanAgain => {
                    controller.reset();
                    continue 'scan;
                }
                MenuAction::ChoosePreset => {
                    // 先頭はライブ映像に戻る選択肢（ライブソースがある場合）
                    let offset = usize::from(live_dir.is_some());
                    let mut names: Vec<String> = Vec::with_capacity(presets.len() + offset);
                    if live_dir.is_some() {
                        names.push("（ライブ映像に戻る）".to_string());
                    }
                    names.extend(presets.iter().map(|p| display_name(p)));

                    let index = presenter::prompt_choice("プリセット画像を選択", &names)?;
                    if index < offset {
                        controller.handle(ScanEvent::ClearPreset);
                        continue 'scan;
                    }
                    if let Some(path) = presets.get(index - offset) {
                        controller.handle(ScanEvent::SelectPreset(path.clone()));
                        continue 'scan;
                    }
                }
                MenuAction::About => {
                    println!("\n{}\n", presenter::render_about());
                }
                MenuAction::Quit => break 'scan,
            }
        }
    }

    model.close();
    Ok(())
}

/// 結果を表示する。スキャンを続けられない場合は false
async fn report_outcome(
    controller: &mut ScanController,
    outcome: &SessionOutcome,
    config: &Config,
    verbose: bool,
    cancel: &CancellationToken,
) -> bool {
    match outcome.end {
        SessionEnd::Cancelled => {
            println!("\nスキャンを中断しました");
            false
        }
        SessionEnd::SourceExhausted => {
            println!("\nフレームが終わりました（検出なし）");
            true
        }
        SessionEnd::NoDetection => {
            println!("\n{}", config.instruction);
            if verbose && !outcome.predictions.is_empty() {
                print!("{}", presenter::render_predictions(&outcome.predictions));
            }
            true
        }
        SessionEnd::Detected => {
            if controller.session().phase() == ScanPhase::Analyzing {
                let pb = presenter::spinner("Analyzing...");
                session::finish_analysis(controller, cancel).await;
                pb.finish_and_clear();
                if controller.session().phase() == ScanPhase::Analyzing {
                    println!("\nスキャンを中断しました");
                    return false;
                }
            }
            if verbose {
                print!("{}", presenter::render_predictions(&outcome.predictions));
            }
            match controller.session().detection() {
                Some(result) => {
                    println!("\n[{}]", presenter::timestamp());
                    println!("{}\n", presenter::render_result(result, &controller.config().taxonomy));
                    true
                }
                None => false,
            }
        }
    }
}

/// AI診断（APIキー未設定もフォールバック扱い）。キャンセルされたら None
async fn consult(
    config: &Config,
    image: &image::DynamicImage,
    label: &str,
    cancel: &CancellationToken,
) -> Result<Option<Diagnosis>> {
    let frame = EncodedFrame::from_image(image)?;
    let client = match GeminiClient::from_config(config) {
        Ok(client) => client,
        Err(e) => {
            warn!(error = %e, "AI診断を利用できません");
            println!("⚠ {}", e);
            return Ok(Some(fallback_diagnosis(label)));
        }
    };

    let pb = presenter::spinner("AI Agronomist に問い合わせ中...");
    let diagnosis = until_cancelled(cancel, request_diagnosis_or_fallback(&client, &frame, label)).await;
    pb.finish_and_clear();
    if diagnosis.is_some() {
        info!(label, model = client.model(), "AI診断完了");
    }
    Ok(diagnosis)
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}
