use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "leaf-scan")]
#[command(about = "トマト葉スキャナー・AI診断ツール", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// 詳細ログを出力
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// フレームディレクトリ（ライブ）または静止画をスキャン
    Scan {
        /// フレームディレクトリ or 画像ファイル
        #[arg(required = true)]
        source: PathBuf,

        /// 再生フレームレート
        #[arg(long, default_value = "10")]
        fps: f64,

        /// フレームを繰り返し再生
        #[arg(long)]
        repeat: bool,

        /// プリセット画像フォルダ
        #[arg(long)]
        presets: Option<PathBuf>,

        /// 結果画面で操作を選ぶ
        #[arg(short, long)]
        interactive: bool,

        /// モデルのベースURL（設定値を上書き）
        #[arg(long)]
        model_url: Option<String>,
    },

    /// 画像と検出ラベルをAIに送って診断
    Diagnose {
        /// 画像ファイル
        #[arg(required = true)]
        image: PathBuf,

        /// 検出ラベル
        #[arg(short, long)]
        label: String,

        /// JSONで出力
        #[arg(long)]
        json: bool,
    },

    /// 画像中の物体名をAIに問い合わせ
    Identify {
        /// 画像ファイル
        #[arg(required = true)]
        image: PathBuf,
    },

    /// モデルのクラスラベルを表示
    Labels {
        /// モデルのベースURL（設定値を上書き）
        #[arg(long)]
        model_url: Option<String>,
    },

    /// 各カテゴリの説明を表示
    About,

    /// 設定
    Config {
        /// Gemini APIキーを設定
        #[arg(long)]
        set_api_key: Option<String>,

        /// 設定を表示
        #[arg(long)]
        show: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_defaults() {
        let cli = Cli::parse_from(["leaf-scan", "scan", "./frames"]);
        match cli.command {
            Commands::Scan {
                source,
                fps,
                repeat,
                interactive,
                model_url,
                ..
            } => {
                assert_eq!(source, PathBuf::from("./frames"));
                assert_eq!(fps, 10.0);
                assert!(!repeat);
                assert!(!interactive);
                assert!(model_url.is_none());
            }
            _ => panic!("scan expected"),
        }
        assert!(!cli.verbose);
    }

    #[test]
    fn test_diagnose_requires_label() {
        assert!(Cli::try_parse_from(["leaf-scan", "diagnose", "leaf.png"]).is_err());
        let cli = Cli::try_parse_from(["leaf-scan", "-v", "diagnose", "leaf.png", "--label", "Symptomatic", "--json"]).unwrap();
        assert!(cli.verbose);
        assert!(matches!(cli.command, Commands::Diagnose { json: true, .. }));
    }

    #[test]
    fn test_config_flags() {
        let cli = Cli::parse_from(["leaf-scan", "config", "--set-api-key", "abc", "--show"]);
        match cli.command {
            Commands::Config { set_api_key, show } => {
                assert_eq!(set_api_key.as_deref(), Some("abc"));
                assert!(show);
            }
            _ => panic!("config expected"),
        }
    }
}
