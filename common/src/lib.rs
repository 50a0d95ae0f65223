//! Leaf Scan Common Library
//!
//! CLIと共有される型・スキャン状態機械・プロンプト/パーサー

pub mod controller;
pub mod error;
pub mod help;
pub mod parser;
pub mod prompts;
pub mod taxonomy;
pub mod types;

pub use controller::{
    transition, Candidate, ControllerConfig, Effect, ScanController, ScanEvent, ScanPhase, ScanSession, Transition,
};
pub use error::{Error, Result};
pub use help::{treatment_search_url, ActionPlan, CategoryGuide, ABOUT_INTRO, CATEGORY_GUIDES, TOMATO_BLIGHT_PLAN};
pub use parser::{extract_json, fallback_diagnosis, parse_diagnosis, parse_identify_response};
pub use prompts::{build_diagnosis_prompt, build_identify_prompt};
pub use taxonomy::{label_is_healthy, BackgroundClass, ClassTaxonomy};
pub use types::{top_prediction, validate_predictions, DetectionResult, Diagnosis, Prediction, Remedy, RemedyKind};
