//! 推論前処理・後処理
//!
//! 画像分類モデル（Teachable Machine 形式の書き出し）向け:
//! 中央正方形に切り出し → 入力サイズにリサイズ → [-1, 1] に正規化。

use image::imageops::FilterType;
use image::DynamicImage;
use ndarray::Array4;
use serde::{Deserialize, Serialize};

/// 入力テンソルのレイアウト
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputLayout {
    /// [1, H, W, 3]（TensorFlow系の書き出し）
    #[default]
    Nhwc,
    /// [1, 3, H, W]
    Nchw,
}

/// 確率の合計とみなす許容誤差
const SUM_TOLERANCE: f32 = 1e-3;

/// 画像をモデル入力テンソルへ変換
pub fn preprocess(image: &DynamicImage, size: u32, layout: InputLayout) -> Array4<f32> {
    let (w, h) = (image.width(), image.height());
    let side = w.min(h).max(1);
    let x = (w.saturating_sub(side)) / 2;
    let y = (h.saturating_sub(side)) / 2;

    let rgb = image
        .crop_imm(x, y, side, side)
        .resize_exact(size, size, FilterType::Triangle)
        .to_rgb8();

    let s = size as usize;
    match layout {
        InputLayout::Nhwc => Array4::from_shape_fn((1, s, s, 3), |(_, row, col, c)| {
            normalize(rgb.get_pixel(col as u32, row as u32)[c])
        }),
        InputLayout::Nchw => Array4::from_shape_fn((1, 3, s, s), |(_, c, row, col)| {
            normalize(rgb.get_pixel(col as u32, row as u32)[c])
        }),
    }
}

fn normalize(v: u8) -> f32 {
    v as f32 / 127.5 - 1.0
}

/// 出力を確率に揃える
///
/// すでに確率分布（非負・合計≈1）ならそのまま、そうでなければ softmax を適用。
pub fn to_probabilities(raw: &[f32]) -> Vec<f32> {
    let sum: f32 = raw.iter().sum();
    let is_distribution = raw.iter().all(|&v| (0.0..=1.0).contains(&v)) && (sum - 1.0).abs() <= SUM_TOLERANCE;
    if is_distribution {
        return raw.to_vec();
    }

    let max_logit = raw.iter().fold(f32::NEG_INFINITY, |a, &b| a.max(b));
    let exp: Vec<f32> = raw.iter().map(|&x| (x - max_logit).exp()).collect();
    let exp_sum: f32 = exp.iter().sum();
    exp.into_iter().map(|e| e / exp_sum).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preprocess_shape_nhwc() {
        let img = DynamicImage::ImageRgb8(image::RgbImage::from_pixel(40, 20, image::Rgb([255, 0, 128])));
        let t = preprocess(&img, 8, InputLayout::Nhwc);
        assert_eq!(t.shape(), &[1, 8, 8, 3]);
        assert!((t[[0, 0, 0, 0]] - 1.0).abs() < 1e-6);
        assert!((t[[0, 0, 0, 1]] + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_preprocess_shape_nchw() {
        let img = DynamicImage::ImageRgb8(image::RgbImage::from_pixel(16, 16, image::Rgb([0, 255, 0])));
        let t = preprocess(&img, 4, InputLayout::Nchw);
        assert_eq!(t.shape(), &[1, 3, 4, 4]);
        assert!((t[[0, 1, 2, 2]] - 1.0).abs() < 1e-6);
        assert!((t[[0, 0, 2, 2]] + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_probabilities_pass_through() {
        let p = to_probabilities(&[0.7, 0.2, 0.1]);
        assert_eq!(p, vec![0.7, 0.2, 0.1]);
    }

    #[test]
    fn test_logits_get_softmax() {
        let p = to_probabilities(&[2.0, 1.0, -1.0]);
        let sum: f32 = p.iter().sum();
        assert!((sum - 1.0).abs() < 1e-5);
        assert!(p[0] > p[1] && p[1] > p[2]);
    }

    #[test]
    fn test_layout_json() {
        let layout: InputLayout = serde_json::from_str("\"nchw\"").unwrap();
        assert_eq!(layout, InputLayout::Nchw);
    }
}
