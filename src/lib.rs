//! Leaf Scan
//!
//! カメラ映像（フレームディレクトリ）や静止画からトマトの葉を分類し、
//! 一定時間同じクラスが続いたら検出として確定する。
//! 検出後は生成AIによる診断を取得できる。

pub mod capture;
pub mod classifier;
pub mod cli;
pub mod config;
pub mod diagnosis;
pub mod error;
pub mod presenter;
pub mod session;
