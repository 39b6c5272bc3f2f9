//! 記事テキストを固定長の特徴量ベクトルに変換する層。
mod features;
mod lemma;
mod normalizer;
mod stopwords;
mod vectorizer;

pub use features::{fuse, ExtraFeatures, TextFeaturizer, EXTRA_FEATURE_COUNT};
pub use lemma::LemmaTable;
pub use normalizer::{NormalizerSettings, SpanishNormalizer};
pub use vectorizer::{TfidfVectorizer, Vocabulary, DEFAULT_MAX_FEATURES};
