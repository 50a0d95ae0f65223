//! モデルファイルの所在解決
//!
//! ベースURLが http(s) の場合は `model.onnx` と `metadata.json` を
//! キャッシュディレクトリへ一度だけダウンロードする。
//! `file://` URL とローカルディレクトリはそのまま使う。

use crate::error::{Result, ScanError};
use reqwest::Url;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

pub const MODEL_FILE: &str = "model.onnx";
pub const METADATA_FILE: &str = "metadata.json";

const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(300);

/// モデルの所在
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelLocation {
    Remote(Url),
    Local(PathBuf),
}

impl ModelLocation {
    pub fn parse(model_url: &str) -> Result<Self> {
        match Url::parse(model_url) {
            Ok(url) if url.scheme() == "http" || url.scheme() == "https" => Ok(Self::Remote(with_trailing_slash(url))),
            Ok(url) if url.scheme() == "file" => url
                .to_file_path()
                .map(Self::Local)
                .map_err(|_| ScanError::ModelLoad(format!("不正な file URL です: {}", model_url))),
            // スキーム無し（相対パス・Windowsドライブ等）はローカルパスとして扱う
            _ => Ok(Self::Local(PathBuf::from(model_url))),
        }
    }
}

fn with_trailing_slash(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

/// URLからキャッシュ用のディレクトリ名を作る
pub fn cache_key(url: &Url) -> String {
    let raw = format!("{}{}", url.host_str().unwrap_or("model"), url.path());
    raw.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect::<String>()
        .trim_matches('_')
        .to_string()
}

/// モデルディレクトリを用意して返す
pub async fn resolve_model_dir(model_url: &str, cache_dir: &Path) -> Result<PathBuf> {
    match ModelLocation::parse(model_url)? {
        ModelLocation::Local(dir) => {
            if !dir.is_dir() {
                return Err(ScanError::ModelLoad(format!(
                    "モデルディレクトリが見つかりません: {}",
                    dir.display()
                )));
            }
            Ok(dir)
        }
        ModelLocation::Remote(base) => {
            let dir = cache_dir.join(cache_key(&base));
            tokio::fs::create_dir_all(&dir).await?;

            let client = reqwest::Client::builder().timeout(DOWNLOAD_TIMEOUT).build()?;
            for file in [METADATA_FILE, MODEL_FILE] {
                let dest = dir.join(file);
                if dest.exists() {
                    continue;
                }
                let url = base
                    .join(file)
                    .map_err(|e| ScanError::ModelLoad(format!("URL結合エラー: {}", e)))?;
                download_file(&client, &url, &dest).await?;
            }
            Ok(dir)
        }
    }
}

async fn download_file(client: &reqwest::Client, url: &Url, dest: &Path) -> Result<()> {
    info!(url = %url, "モデルファイルをダウンロード中");
    let response = client.get(url.clone()).send().await?;

    if !response.status().is_success() {
        return Err(ScanError::ModelLoad(format!(
            "ダウンロード失敗 {}: HTTP {}",
            url,
            response.status()
        )));
    }

    let bytes = response.bytes().await?;

    // 途中で失敗しても壊れたファイルを残さない
    let partial = dest.with_extension("part");
    tokio::fs::write(&partial, &bytes).await?;
    tokio::fs::rename(&partial, dest).await?;
    Ok(())
}
