use std::collections::BTreeMap;

use log::{info, warn};
use serde::Serialize;

use crate::analysis::decomposition::{
    fit, Decomposition, DecompositionDiagnostic, DecompositionOptions, Loadings,
};
use crate::analysis::grouped::{grouped_statistics, GroupedStatistics};
use crate::analysis::importance::{
    score, top_variables_per_component, ComponentSummary, ImportanceRanking, RankedVariable,
};
use crate::analysis::outliers::{filter_outliers, FilteredMatrix, OutlierOptions};
use crate::analysis::preprocess::preprocess;
use crate::analysis::rotation::rotate;
use crate::config::{PipelineConfig, RotationMethod};
use crate::data::model::{NumericMatrix, RawTable};
use crate::error::{ConfigError, DataProcessingError, PcaCalculationError, PipelineError};

// ---------------------------------------------------------------------------
// Pipeline stages
// ---------------------------------------------------------------------------
//
// Each stage consumes the previous record and returns the next one, so a
// later stage can only ever see fields an earlier stage actually produced.
//
//   Pipeline ──preprocess──▶ Preprocessed ──filter_outliers──▶ Filtered
//            ──decompose──▶ Decomposed ──score──▶ AnalysisReport

/// Entry point of the variable-importance path. Owns its configuration;
/// build one per run.
#[derive(Debug, Clone)]
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Pipeline { config })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn preprocess(&self, table: &RawTable) -> Result<Preprocessed, DataProcessingError> {
        info!("Step 1: preprocessing {} rows", table.n_rows());
        Ok(Preprocessed {
            config: self.config.clone(),
            matrix: preprocess(table)?,
        })
    }

    /// All stages in order.
    pub fn run(&self, table: &RawTable) -> Result<AnalysisReport, PipelineError> {
        let report = self
            .preprocess(table)?
            .filter_outliers()?
            .decompose()?
            .score();
        Ok(report)
    }
}

#[derive(Debug, Clone)]
pub struct Preprocessed {
    config: PipelineConfig,
    pub matrix: NumericMatrix,
}

impl Preprocessed {
    pub fn filter_outliers(self) -> Result<Filtered, DataProcessingError> {
        info!("Step 2: removing outliers");
        let options = OutlierOptions {
            contamination: self.config.contamination,
            n_estimators: self.config.n_estimators,
            max_samples: self.config.max_samples,
            seed: self.config.seed,
        };
        let FilteredMatrix { matrix, removed } = filter_outliers(self.matrix, &options)?;
        Ok(Filtered {
            config: self.config,
            matrix,
            removed,
        })
    }
}

#[derive(Debug, Clone)]
pub struct Filtered {
    config: PipelineConfig,
    pub matrix: NumericMatrix,
    pub removed: usize,
}

impl Filtered {
    pub fn decompose(self) -> Result<Decomposed, PcaCalculationError> {
        info!("Step 3: fitting PCA on {:?}", self.matrix.shape());
        let options = DecompositionOptions {
            variance_threshold: self.config.variance_threshold,
            min_components: self.config.min_components,
        };
        let decomposition = fit(&self.matrix, &options)?;
        let (loadings, rotation) =
            apply_rotation(&decomposition.loadings, self.config.rotation_method);
        Ok(Decomposed {
            config: self.config,
            shape: self.matrix.shape(),
            removed: self.removed,
            decomposition,
            loadings,
            rotation,
        })
    }
}

/// Rotation is best effort: any failure keeps the unrotated loadings.
fn apply_rotation(loadings: &Loadings, method: RotationMethod) -> (Loadings, RotationOutcome) {
    if method == RotationMethod::None {
        return (loadings.clone(), RotationOutcome::NotRequested);
    }
    match rotate(loadings, method) {
        Ok(rotated) => {
            info!("Applied {method} rotation");
            (rotated, RotationOutcome::Applied { method })
        }
        Err(e) => {
            warn!("Rotation failed for '{method}': {e}; continuing with unrotated PCA loadings");
            (
                loadings.clone(),
                RotationOutcome::Failed {
                    method,
                    reason: e.to_string(),
                },
            )
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RotationOutcome {
    NotRequested,
    Applied {
        method: RotationMethod,
    },
    Failed {
        method: RotationMethod,
        reason: String,
    },
}

#[derive(Debug, Clone)]
pub struct Decomposed {
    config: PipelineConfig,
    /// Shape of the matrix the decomposition was fitted on.
    pub shape: (usize, usize),
    pub removed: usize,
    pub decomposition: Decomposition,
    /// Rotated loadings when rotation succeeded, the originals otherwise.
    pub loadings: Loadings,
    pub rotation: RotationOutcome,
}

impl Decomposed {
    pub fn score(self) -> AnalysisReport {
        info!("Step 4: scoring variable importance");
        let ratios = &self.decomposition.explained_variance_ratio;
        let scores = score(&self.loadings, ratios, self.config.min_significance);
        let ranking = ImportanceRanking::from_scores(&scores, self.config.top_n);
        let components =
            top_variables_per_component(&self.loadings, ratios, self.config.vars_per_component);

        for (i, entry) in ranking.entries.iter().take(5).enumerate() {
            info!(
                "  {}. {}: {:.6} ({:.2}%)",
                i + 1,
                entry.variable,
                entry.score,
                entry.percent
            );
        }

        AnalysisReport {
            numeric_shape: self.shape,
            removed_outliers: self.removed,
            rotation: self.rotation,
            diagnostics: DecompositionDiagnostic::new(&self.decomposition, &self.loadings),
            scores,
            ranking,
            components,
        }
    }
}

/// Everything the importance path produces for one table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisReport {
    pub numeric_shape: (usize, usize),
    pub removed_outliers: usize,
    pub rotation: RotationOutcome,
    pub diagnostics: DecompositionDiagnostic,
    /// Unranked scores for every variable.
    pub scores: BTreeMap<String, f64>,
    pub ranking: ImportanceRanking,
    pub components: Vec<ComponentSummary>,
}

// ---------------------------------------------------------------------------
// Combined output
// ---------------------------------------------------------------------------

/// Grouped statistics plus, when the importance path succeeds, the full
/// ranked variable list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalisationReport {
    pub normalization_data: GroupedStatistics,
    pub pca_suggestions: Option<Vec<RankedVariable>>,
}

/// Run both paths on one table. Only grouped-statistics failures are fatal;
/// an importance failure is logged and reported as `None`.
pub fn normalise_and_suggest(
    table: &RawTable,
    pipeline: &Pipeline,
) -> Result<NormalisationReport, DataProcessingError> {
    let normalization_data = grouped_statistics(table)?;

    let pca_suggestions = match pipeline.run(table) {
        Ok(report) => {
            let all = ImportanceRanking::from_scores(&report.scores, report.scores.len());
            Some(all.entries)
        }
        Err(e) => {
            warn!("PCA suggestion step failed: {e}; proceeding without suggestions");
            None
        }
    };

    Ok(NormalisationReport {
        normalization_data,
        pca_suggestions,
    })
}
