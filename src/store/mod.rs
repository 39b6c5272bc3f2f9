//! 成果物の保存と読み込み。
mod artifacts;

pub use artifacts::{
    load_classifier, load_json, load_pair, load_text_pipeline, save_classifier, save_json,
    save_text_pipeline, ArtifactPaths, ClassifierArtifact, TextPipelineArtifact, CLASSIFIER_FILE,
    FORMAT_VERSION, TEXT_PIPELINE_FILE,
};
