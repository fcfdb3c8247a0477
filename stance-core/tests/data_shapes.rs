use std::collections::BTreeMap;

use stance_core::{CategoryId, EngineConfig, IntensityDistribution, TakeCorpus, categories};

fn corpus() -> TakeCorpus {
    TakeCorpus::from_json(include_str!("../../assets/data/takes.json")).unwrap()
}

#[test]
fn shipped_corpus_has_three_servable_takes_per_category() {
    let corpus = corpus();
    assert_eq!(corpus.len(), 20);

    let mut per_category: BTreeMap<CategoryId, usize> = BTreeMap::new();
    for take in corpus.eligible() {
        *per_category.entry(take.category).or_default() += 1;
    }
    assert_eq!(per_category.len(), categories().len());
    assert!(per_category.values().all(|&count| count == 3));
}

#[test]
fn shipped_corpus_ids_are_token_safe() {
    for take in corpus().takes {
        assert_eq!(take.id.len(), 12, "{}", take.id);
        assert!(take.id.chars().all(|c| c.is_ascii_hexdigit()), "{}", take.id);
        assert!(!take.slug.is_empty());
    }
}

#[test]
fn unenriched_takes_are_never_eligible() {
    let corpus = corpus();
    let raw: Vec<_> = corpus
        .takes
        .iter()
        .filter(|take| !take.is_eligible())
        .map(|take| take.id.as_str())
        .collect();
    assert_eq!(raw, ["12f2e7c10466", "b4cbf140d763"]);
}

#[test]
fn shipped_intensity_distribution() {
    let corpus = corpus();
    let distribution = IntensityDistribution::from_takes(corpus.eligible(), None);
    assert_eq!(
        distribution.to_map(),
        BTreeMap::from([(1, 2), (2, 4), (3, 4), (4, 5), (5, 3)])
    );

    let society = IntensityDistribution::from_takes(corpus.eligible(), Some(CategoryId::Society));
    assert_eq!(society.count(5), 2);
    assert_eq!(society.count(4), 1);
    assert_eq!(society.total(), 3);
}

#[test]
fn corpus_round_trips_through_json() {
    let corpus = corpus();
    let json = serde_json::to_string(&corpus).unwrap();
    let reparsed = TakeCorpus::from_json(&json).unwrap();
    assert_eq!(reparsed, corpus);
    assert!(json.contains("\"agreeReasons\""));
}

#[test]
fn shipped_engine_config_matches_defaults() {
    let config = EngineConfig::from_json(include_str!("../../assets/data/engine.json")).unwrap();
    assert_eq!(config, EngineConfig::default());
}
