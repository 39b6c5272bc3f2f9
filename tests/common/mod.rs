#![allow(dead_code)]

use std::path::Path;

use veraz::classification::{SpanishNormalizer, TextFeaturizer};
use veraz::classifier::Booster;
use veraz::schema::{NewsItem, RetrainRequest};
use veraz::service::DetectorService;
use veraz::store;

pub fn normalizer() -> SpanishNormalizer {
    SpanishNormalizer::with_embedded_table().expect("embedded lemma table")
}

pub fn corpus() -> Vec<NewsItem> {
    vec![
        NewsItem::new(
            "El Gobierno anuncia nuevas medidas económicas",
            "El ministerio presentó un plan para reducir la inflación durante el próximo año",
            "01/02/2024",
        ),
        NewsItem::new(
            "Científicos confirman una ciudad secreta en la Luna",
            "Fuentes anónimas aseguran que la NASA oculta edificios construidos por extraterrestres",
            "02/02/2024",
        ),
        NewsItem::new(
            "El Congreso aprueba la reforma educativa",
            "La votación terminó con amplia mayoría y la ley entrará en vigor en septiembre",
            "03/02/2024",
        ),
        NewsItem::new(
            "Beber agua con limón cura todas las enfermedades",
            "Un supuesto médico revela el remedio milagroso que los hospitales no quieren que conozcas",
            "04/02/2024",
        ),
    ]
}

pub fn fitted_featurizer() -> TextFeaturizer {
    let mut featurizer = TextFeaturizer::new(normalizer(), 5000);
    featurizer.fit(&corpus()).expect("featurizer fit");
    featurizer
}

/// 5 件の Fake（長いタイトル）と 5 件の Real（短いタイトル）。
pub fn separable_batch() -> RetrainRequest {
    let mut data = Vec::new();
    let mut labels = Vec::new();
    for idx in 0..5 {
        data.push(NewsItem::new(
            format!("Increíble descubrimiento que los medios ocultan número {idx}"),
            "Fuentes anónimas aseguran que la NASA oculta edificios construidos por extraterrestres",
            "05/02/2024",
        ));
        labels.push(1);
        data.push(NewsItem::new(
            format!("Sube el IPC {idx}"),
            "El ministerio presentó un plan",
            "06/02/2024",
        ));
        labels.push(0);
    }
    RetrainRequest { data, labels }
}

/// 分類器を保存したうえでサービスを組み立てる。
pub fn service_with_model(classifier_path: &Path, model: Booster) -> DetectorService {
    store::save_classifier(classifier_path, &model).expect("persist initial classifier");
    DetectorService::new(fitted_featurizer(), model, classifier_path, 10)
        .expect("service should build")
}

pub fn constant_service(classifier_path: &Path, probability: f64) -> DetectorService {
    let dimension = fitted_featurizer().dimension().expect("fitted");
    service_with_model(classifier_path, Booster::constant(dimension, probability))
}
