use anyhow::{Context, Result};
use colored::Colorize;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use stance_core::{EngineConfig, MemoryStore, StanceEngine, TakeCorpus};

use super::scenarios::{Scenario, ScenarioCtx};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioResult {
    pub scenario_name: String,
    pub passed: bool,
    pub iterations_run: usize,
    pub successful_iterations: usize,
    pub failures: Vec<String>,
    #[serde(with = "duration_serde")]
    pub average_duration: Duration,
    #[serde(with = "duration_vec_serde")]
    pub performance_data: Vec<Duration>,
}

/// Corpus and engine configuration shared by every iteration.
#[derive(Debug, Clone)]
pub struct TesterAssets {
    pub corpus: Arc<TakeCorpus>,
    pub config: EngineConfig,
}

impl TesterAssets {
    /// Load the corpus and config, falling back to the shipped sample data for
    /// whichever path is not given.
    pub fn load(corpus: Option<&Path>, config: Option<&Path>) -> Result<Self> {
        let corpus_path = corpus.map_or_else(|| Self::assets_data_root().join("takes.json"), Path::to_path_buf);
        let json = fs::read_to_string(&corpus_path)
            .with_context(|| format!("failed to read corpus {}", corpus_path.display()))?;
        let corpus = TakeCorpus::from_json(&json)
            .with_context(|| format!("invalid corpus {}", corpus_path.display()))?;
        if corpus.eligible().next().is_none() {
            log::warn!("corpus {} has no servable takes", corpus_path.display());
        }

        let config_path = config.map_or_else(|| Self::assets_data_root().join("engine.json"), Path::to_path_buf);
        let config = EngineConfig::from_path(&config_path)
            .with_context(|| format!("invalid engine config {}", config_path.display()))?;

        Ok(Self {
            corpus: Arc::new(corpus),
            config,
        })
    }

    fn assets_data_root() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("..")
            .join("assets")
            .join("data")
    }

    fn fresh_context(&self, concurrency: usize) -> ScenarioCtx {
        let store = Arc::new(MemoryStore::new(self.corpus.as_ref().clone()));
        let engine = StanceEngine::new(Arc::clone(&store), Arc::clone(&store), self.config.clone());
        ScenarioCtx {
            engine: Arc::new(engine),
            store,
            corpus: Arc::clone(&self.corpus),
            concurrency,
        }
    }
}

pub struct ScenarioRunner {
    assets: Arc<TesterAssets>,
    concurrency: usize,
    verbose: bool,
}

impl ScenarioRunner {
    pub const fn new(assets: Arc<TesterAssets>, concurrency: usize, verbose: bool) -> Self {
        Self {
            assets,
            concurrency,
            verbose,
        }
    }

    pub async fn run_scenario(&self, scenario: Scenario, iterations: usize) -> ScenarioResult {
        if self.verbose {
            println!(
                "🧪 Testing scenario: {} ({} iterations)",
                scenario.key().bright_white(),
                iterations
            );
        }

        let mut successes = 0;
        let mut failures = Vec::new();
        let mut performance_data = Vec::new();

        for i in 0..iterations {
            let ctx = self.assets.fresh_context(self.concurrency);
            let start_time = Instant::now();
            match scenario.run(&ctx).await {
                Ok(()) => {
                    successes += 1;
                    let duration = start_time.elapsed();
                    performance_data.push(duration);
                    if self.verbose {
                        println!("  ✅ Iteration {}/{} passed ({duration:?})", i + 1, iterations);
                    }
                }
                Err(err) => {
                    let message = format!("Iteration {}: {err:#}", i + 1);
                    if self.verbose {
                        println!("  ❌ {}", message.clone().red());
                    }
                    failures.push(message);
                }
            }
        }

        let average_duration = if performance_data.is_empty() {
            Duration::ZERO
        } else {
            performance_data.iter().sum::<Duration>()
                / u32::try_from(performance_data.len()).unwrap_or(u32::MAX)
        };

        ScenarioResult {
            scenario_name: scenario.key().to_string(),
            passed: failures.is_empty(),
            iterations_run: iterations,
            successful_iterations: successes,
            failures,
            average_duration,
            performance_data,
        }
    }
}

mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_micros().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let micros = u128::deserialize(deserializer)?;
        Ok(Duration::from_micros(u64::try_from(micros).unwrap_or(u64::MAX)))
    }
}

mod duration_vec_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(durations: &[Duration], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let micros: Vec<u128> = durations.iter().map(Duration::as_micros).collect();
        micros.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let micros = Vec::<u128>::deserialize(deserializer)?;
        Ok(micros
            .into_iter()
            .map(|m| Duration::from_micros(u64::try_from(m).unwrap_or(u64::MAX)))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runner() -> ScenarioRunner {
        let assets = TesterAssets::load(None, None).unwrap();
        ScenarioRunner::new(Arc::new(assets), 16, false)
    }

    #[tokio::test]
    async fn every_scenario_passes_on_shipped_corpus() {
        let runner = runner();
        for scenario in Scenario::ALL {
            let result = runner.run_scenario(scenario, 3).await;
            assert!(result.passed, "{}: {:?}", result.scenario_name, result.failures);
            assert_eq!(result.successful_iterations, 3);
            assert_eq!(result.performance_data.len(), 3);
        }
    }

    #[test]
    fn missing_corpus_path_is_reported() {
        let err = TesterAssets::load(Some(Path::new("/nonexistent/takes.json")), None).unwrap_err();
        assert!(format!("{err:#}").contains("failed to read corpus"));
    }

    #[test]
    fn broken_engine_config_is_reported() {
        let path = std::env::temp_dir().join(format!("stance-engine-{}.json", std::process::id()));
        fs::write(&path, "{ not json").unwrap();
        let err = TesterAssets::load(None, Some(&path)).unwrap_err();
        let _ = fs::remove_file(&path);
        assert!(format!("{err:#}").contains("invalid engine config"));
    }

    #[test]
    fn durations_serialize_as_micros() {
        let result = ScenarioResult {
            scenario_name: "spin".into(),
            passed: true,
            iterations_run: 1,
            successful_iterations: 1,
            failures: Vec::new(),
            average_duration: Duration::from_micros(1500),
            performance_data: vec![Duration::from_micros(1500)],
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["average_duration"], 1500);
        assert_eq!(json["performance_data"][0], 1500);
    }
}
