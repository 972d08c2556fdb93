//! Simulated producer races.
//!
//! A scenario describes a set of producers, each with a delay, a number of
//! intermediate frames and an outcome, and the combinator that arbitrates
//! between them. It is loaded with the `config` crate, so it can be written as
//! TOML, JSON or YAML and overridden with `DATASOURCE_*` environment
//! variables.
//!
//! ```toml
//! strategy = "increasing-quality"
//! lazy = false
//! timeout = "5s"
//!
//! [[producers]]
//! name = "full"
//! delay = "300ms"
//! intermediate = 2
//! outcome = "success"
//!
//! [[producers]]
//! name = "thumbnail"
//! delay = "50ms"
//! ```

pub mod duration;
mod producer;

pub use producer::{Frame, SimulatedProducer};

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;

use crate::error::DataSourceError;
use crate::source::{
    DataSourceRef, FirstAvailableDataSourceSupplier, IncreasingQualityDataSourceSupplier, Supplier,
};

/// Which combinator arbitrates between the producers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    /// Try producers one at a time, in order.
    #[default]
    FirstAvailable,
    /// Run all producers at once, the first listed being the best.
    IncreasingQuality,
}

/// How a simulated producer ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Outcome {
    #[default]
    Success,
    Failure,
    /// Finish without publishing a final frame.
    Empty,
}

/// One simulated producer.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ProducerSpec {
    pub name: String,
    /// Total time until the outcome.
    #[serde(default, deserialize_with = "duration::deserialize")]
    pub delay: Duration,
    /// Frames published before the outcome.
    #[serde(default)]
    pub intermediate: u32,
    #[serde(default)]
    pub outcome: Outcome,
    /// Failure message for [`Outcome::Failure`].
    #[serde(default)]
    pub message: Option<String>,
}

/// Upper bound on intermediate frames per producer.
pub const MAX_INTERMEDIATE: u32 = 10_000;

/// A complete race description.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub strategy: Strategy,
    /// Create producers only once the result is first asked for.
    /// Only meaningful for [`Strategy::IncreasingQuality`].
    #[serde(default)]
    pub lazy: bool,
    /// How long to wait for the final result.
    #[serde(default, deserialize_with = "duration::deserialize_option")]
    pub timeout: Option<Duration>,
    #[serde(default)]
    pub producers: Vec<ProducerSpec>,
}

impl Scenario {
    /// Load a scenario file, applying `DATASOURCE_*` environment overrides.
    pub fn load(path: &Path) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from(path))
            .add_source(Environment::with_prefix("DATASOURCE").try_parsing(true))
            .build()
            .with_context(|| format!("Failed to read scenario {}", path.display()))?;

        let scenario: Scenario = config
            .try_deserialize()
            .with_context(|| format!("Invalid scenario {}", path.display()))?;
        scenario.validate()?;
        Ok(scenario)
    }

    fn validate(&self) -> Result<()> {
        if self.producers.is_empty() {
            bail!("Scenario has no producers");
        }
        for (i, producer) in self.producers.iter().enumerate() {
            if self.producers[..i].iter().any(|p| p.name == producer.name) {
                bail!("Duplicate producer name: {}", producer.name);
            }
            if producer.intermediate > MAX_INTERMEDIATE {
                bail!(
                    "Producer {} has {} intermediate frames, at most {} allowed",
                    producer.name,
                    producer.intermediate,
                    MAX_INTERMEDIATE
                );
            }
        }
        Ok(())
    }

    /// One supplier per producer, in scenario order.
    pub fn suppliers(&self, runtime: &Handle) -> Vec<Arc<dyn Supplier<Frame>>> {
        self.producers
            .iter()
            .map(|spec| {
                Arc::new(SimulatedProducer::new(spec.clone(), runtime.clone()))
                    as Arc<dyn Supplier<Frame>>
            })
            .collect()
    }

    /// Start the race: build the combinator and ask it for a data source.
    pub fn data_source(&self, runtime: &Handle) -> Result<DataSourceRef<Frame>> {
        let suppliers = self.suppliers(runtime);
        let source = match self.strategy {
            Strategy::FirstAvailable => FirstAvailableDataSourceSupplier::new(suppliers)?.get(),
            Strategy::IncreasingQuality => IncreasingQualityDataSourceSupplier::builder()
                .suppliers(suppliers)
                .lazy(self.lazy)
                .build()?
                .get(),
        };
        Ok(source)
    }
}

/// JSON-friendly report of a finished race.
#[derive(Debug, Clone, Serialize)]
pub struct RaceSummary {
    pub strategy: Strategy,
    pub lazy: bool,
    pub status: RaceStatus,
    pub result: Option<Frame>,
    pub error: Option<String>,
    pub progress: f32,
    pub elapsed: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RaceStatus {
    Success,
    Failure,
    Cancelled,
    TimedOut,
}

impl RaceSummary {
    pub fn new(
        scenario: &Scenario,
        source: &DataSourceRef<Frame>,
        outcome: &std::result::Result<Option<Frame>, DataSourceError>,
        elapsed: Duration,
    ) -> Self {
        let (status, result, error) = match outcome {
            Ok(Some(frame)) => (RaceStatus::Success, Some(frame.clone()), None),
            Ok(None) if source.is_finished() => (RaceStatus::Success, None, None),
            Ok(None) => (RaceStatus::Cancelled, None, None),
            Err(err) if err.is_timeout() => (RaceStatus::TimedOut, source.result(), None),
            Err(err) => (RaceStatus::Failure, source.result(), Some(err.to_string())),
        };

        Self {
            strategy: scenario.strategy,
            lazy: scenario.lazy,
            status,
            result,
            error,
            progress: source.progress(),
            elapsed: duration::format_duration(elapsed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    use crate::source::sources::wait_for_final_result_async;

    fn write_scenario(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    const RACE: &str = r#"
        strategy = "increasing-quality"
        timeout = "2s"

        [[producers]]
        name = "full"
        delay = "300ms"
        intermediate = 1

        [[producers]]
        name = "thumbnail"
        delay = "50ms"
    "#;

    #[test]
    fn loads_scenario_with_defaults() {
        let file = write_scenario(RACE);

        let scenario = Scenario::load(file.path()).unwrap();

        assert_eq!(scenario.strategy, Strategy::IncreasingQuality);
        assert!(!scenario.lazy);
        assert_eq!(scenario.timeout, Some(Duration::from_secs(2)));
        assert_eq!(scenario.producers.len(), 2);
        assert_eq!(scenario.producers[1].delay, Duration::from_millis(50));
        assert_eq!(scenario.producers[1].intermediate, 0);
        assert_eq!(scenario.producers[1].outcome, Outcome::Success);
    }

    #[test]
    fn rejects_scenario_without_producers() {
        let file = write_scenario("strategy = \"first-available\"\nproducers = []\n");

        let err = Scenario::load(file.path()).unwrap_err();

        assert!(err.to_string().contains("no producers"));
    }

    #[test]
    fn rejects_duplicate_names() {
        let file = write_scenario(
            r#"
            [[producers]]
            name = "disk"

            [[producers]]
            name = "disk"
            "#,
        );

        let err = Scenario::load(file.path()).unwrap_err();

        assert!(err.to_string().contains("Duplicate producer name"));
    }

    #[test]
    fn rejects_too_many_intermediate_frames() {
        let file = write_scenario(
            r#"
            [[producers]]
            name = "disk"
            intermediate = 4294967295
            "#,
        );

        let err = Scenario::load(file.path()).unwrap_err();

        assert!(err.to_string().contains("intermediate frames"));
    }

    #[test]
    fn rejects_bad_duration() {
        let file = write_scenario(
            r#"
            [[producers]]
            name = "disk"
            delay = "eventually"
            "#,
        );

        assert!(Scenario::load(file.path()).is_err());
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Scenario::load(&dir.path().join("absent.toml")).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn increasing_quality_race_ends_with_best_frame() {
        let file = write_scenario(RACE);
        let scenario = Scenario::load(file.path()).unwrap();

        let source = scenario.data_source(&Handle::current()).unwrap();
        let frame = wait_for_final_result_async(source.clone()).await.unwrap();

        assert_eq!(frame.map(|f| f.producer), Some("full".to_string()));
        assert!(source.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn first_available_race_falls_back() {
        let scenario = Scenario {
            strategy: Strategy::FirstAvailable,
            lazy: false,
            timeout: None,
            producers: vec![
                ProducerSpec {
                    name: "cache".to_string(),
                    delay: Duration::from_millis(10),
                    intermediate: 0,
                    outcome: Outcome::Failure,
                    message: None,
                },
                ProducerSpec {
                    name: "network".to_string(),
                    delay: Duration::from_millis(100),
                    intermediate: 0,
                    outcome: Outcome::Success,
                    message: None,
                },
            ],
        };

        let source = scenario.data_source(&Handle::current()).unwrap();
        let outcome = wait_for_final_result_async(source.clone()).await;
        let summary = RaceSummary::new(&scenario, &source, &outcome, Duration::from_millis(110));

        assert_eq!(summary.status, RaceStatus::Success);
        assert_eq!(summary.result.map(|f| f.producer), Some("network".to_string()));
        assert_eq!(summary.elapsed, "110.00ms");
    }

    #[test]
    fn summary_reports_failure_and_timeout() {
        let scenario = Scenario {
            strategy: Strategy::FirstAvailable,
            lazy: false,
            timeout: None,
            producers: Vec::new(),
        };
        let failed = crate::source::sources::immediate_failed_data_source::<Frame>(
            DataSourceError::failure("every producer failed"),
        );

        let summary = RaceSummary::new(
            &scenario,
            &failed,
            &Err(DataSourceError::failure("every producer failed")),
            Duration::ZERO,
        );
        assert_eq!(summary.status, RaceStatus::Failure);
        assert_eq!(summary.error.as_deref(), Some("every producer failed"));

        let summary = RaceSummary::new(&scenario, &failed, &Err(DataSourceError::Timeout), Duration::ZERO);
        assert_eq!(summary.status, RaceStatus::TimedOut);
        assert!(summary.error.is_none());
    }
}
