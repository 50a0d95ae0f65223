use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("設定エラー: {0}")]
    Config(String),

    #[error("APIキーが設定されていません。`leaf-scan config --set-api-key YOUR_KEY` で設定してください")]
    MissingApiKey,

    #[error("ファイルが見つかりません: {0}")]
    FileNotFound(String),

    #[error("フォルダが見つかりません: {0}")]
    FolderNotFound(String),

    #[error("画像読み込みエラー: {0}")]
    ImageLoad(String),

    #[error("モデル読み込みエラー: {0}")]
    ModelLoad(String),

    #[error("推論エラー: {0}")]
    Inference(String),

    #[error("カメラを利用できません: {0}")]
    CameraUnavailable(String),

    #[error("フレームが見つかりません: {0}")]
    NoFramesFound(String),

    #[error("API呼び出しエラー: {0}")]
    ApiCall(String),

    #[error("APIレスポンスのパースに失敗: {0}")]
    ApiParse(String),

    #[error("対話入力エラー: {0}")]
    Prompt(String),

    #[error("JSON解析エラー: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("IOエラー: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTPエラー: {0}")]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Common(#[from] leaf_scan_common::Error),
}

impl ScanError {
    /// セッションを継続できない（再起動が必要な）エラーか
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ScanError::ModelLoad(_)
                | ScanError::CameraUnavailable(_)
                | ScanError::NoFramesFound(_)
                | ScanError::FolderNotFound(_)
                | ScanError::Config(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, ScanError>;
