//! エラー型定義

use thiserror::Error;

/// 共通エラー型
#[derive(Error, Debug)]
pub enum Error {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid predictions: {0}")]
    InvalidPredictions(String),
}

/// Result型エイリアス
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_config() {
        let error = Error::Config("背景クラスが見つかりません".to_string());
        assert_eq!(format!("{}", error), "Config error: 背景クラスが見つかりません");
    }

    #[test]
    fn test_error_display_parse() {
        let error = Error::Parse("JSONが見つかりません".to_string());
        assert_eq!(format!("{}", error), "Parse error: JSONが見つかりません");
    }

    #[test]
    fn test_error_display_invalid_predictions() {
        let error = Error::InvalidPredictions("空の予測".to_string());
        assert_eq!(format!("{}", error), "Invalid predictions: 空の予測");
    }
}
