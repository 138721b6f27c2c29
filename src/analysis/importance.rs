use std::collections::BTreeMap;

use serde::Serialize;

use super::decomposition::Loadings;

/// Weighted importance of every variable.
///
/// For each component `i` a variable gains `|loading| * variance_ratios[i]`
/// when `|loading| > min_significance`, nothing otherwise. Only the first
/// `min(components, ratios)` components are considered. Every variable gets
/// an entry, possibly `0.0`.
pub fn score(
    loadings: &Loadings,
    variance_ratios: &[f64],
    min_significance: f64,
) -> BTreeMap<String, f64> {
    let vm = loadings.to_variable_major();
    let depth = vm.n_components().min(variance_ratios.len());

    vm.variables
        .iter()
        .enumerate()
        .map(|(v, name)| {
            let weighted = (0..depth)
                .map(|i| vm.get(v, i).abs())
                .zip(variance_ratios)
                .filter(|(loading, _)| *loading > min_significance)
                .map(|(loading, ratio)| loading * ratio)
                .sum::<f64>();
            (name.clone(), weighted)
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedVariable {
    pub variable: String,
    pub score: f64,
    /// Share of the total weight over all variables, in percent.
    pub percent: f64,
}

/// Scores sorted descending, cut to a presentation length.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImportanceRanking {
    /// Sum of all scores before truncation.
    pub total_weight: f64,
    pub entries: Vec<RankedVariable>,
}

impl ImportanceRanking {
    pub fn from_scores(scores: &BTreeMap<String, f64>, top_n: usize) -> Self {
        let total_weight: f64 = scores.values().sum();
        let mut sorted: Vec<(&String, f64)> = scores.iter().map(|(k, &v)| (k, v)).collect();
        // BTreeMap iteration already orders ties by name; the sort is stable.
        sorted.sort_by(|a, b| b.1.total_cmp(&a.1));

        let entries = sorted
            .into_iter()
            .take(top_n)
            .map(|(variable, score)| RankedVariable {
                variable: variable.clone(),
                score,
                percent: if total_weight > 0.0 {
                    score / total_weight * 100.0
                } else {
                    0.0
                },
            })
            .collect();
        ImportanceRanking {
            total_weight,
            entries,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComponentVariable {
    pub variable: String,
    pub loading: f64,
}

/// The strongest variables of one component.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComponentSummary {
    pub component: String,
    pub explained_variance_ratio: f64,
    pub variables: Vec<ComponentVariable>,
}

/// For each of the first `k` components, up to `k` variables ordered by
/// absolute loading.
pub fn top_variables_per_component(
    loadings: &Loadings,
    variance_ratios: &[f64],
    k: usize,
) -> Vec<ComponentSummary> {
    let vm = loadings.to_variable_major();
    let depth = k.min(vm.n_components()).min(variance_ratios.len());

    (0..depth)
        .map(|c| {
            let mut vars: Vec<ComponentVariable> = vm
                .variables
                .iter()
                .enumerate()
                .map(|(v, name)| ComponentVariable {
                    variable: name.clone(),
                    loading: vm.get(v, c),
                })
                .collect();
            vars.sort_by(|a, b| b.loading.abs().total_cmp(&a.loading.abs()));
            vars.truncate(k);
            ComponentSummary {
                component: vm.components[c].clone(),
                explained_variance_ratio: variance_ratios[c],
                variables: vars,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::DMatrix;

    fn names(cols: &[&str]) -> Vec<String> {
        cols.iter().map(|s| s.to_string()).collect()
    }

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-12
    }

    #[test]
    fn sub_threshold_component_contributes_nothing() {
        // Second component sits below the 0.3 cut for every variable.
        let loadings = Loadings::variable_major(
            DMatrix::from_row_slice(3, 2, &[0.8, 0.2, -0.5, 0.1, 0.1, -0.29]),
            names(&["speed", "cadence", "width"]),
        );
        let ratios = [0.6, 0.3];
        let scores = score(&loadings, &ratios, 0.3);

        assert!(approx(scores["speed"], 0.8 * 0.6));
        assert!(approx(scores["cadence"], 0.5 * 0.6));
        assert_eq!(scores["width"], 0.0);
        assert!(scores.values().all(|&s| s >= 0.0));
    }

    #[test]
    fn orientation_does_not_change_scores() {
        let vm = Loadings::variable_major(
            DMatrix::from_row_slice(3, 2, &[0.8, 0.4, -0.5, 0.7, 0.1, -0.9]),
            names(&["a", "b", "c"]),
        );
        let ratios = [0.5, 0.25];
        assert_eq!(score(&vm, &ratios, 0.3), score(&vm.transposed(), &ratios, 0.3));
    }

    #[test]
    fn depth_is_limited_by_shorter_input() {
        let vm = Loadings::variable_major(
            DMatrix::from_row_slice(2, 3, &[0.5, 0.5, 0.5, 0.9, 0.9, 0.9]),
            names(&["a", "b"]),
        );
        let scores = score(&vm, &[0.5, 0.2], 0.3);
        assert!(approx(scores["a"], 0.5 * 0.5 + 0.5 * 0.2));

        let scores = score(&vm, &[0.5, 0.2, 0.1, 0.05], 0.3);
        assert!(approx(scores["b"], 0.9 * (0.5 + 0.2 + 0.1)));
    }

    #[test]
    fn ranking_sorts_truncates_and_keeps_total() {
        let scores: BTreeMap<String, f64> = [("a", 0.1), ("b", 0.5), ("c", 0.0), ("d", 0.4)]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        let ranking = ImportanceRanking::from_scores(&scores, 2);

        assert!(approx(ranking.total_weight, 1.0));
        let order: Vec<&str> = ranking.entries.iter().map(|e| e.variable.as_str()).collect();
        assert_eq!(order, vec!["b", "d"]);
        assert!(approx(ranking.entries[0].percent, 50.0));
    }

    #[test]
    fn zero_total_gives_zero_percent() {
        let scores: BTreeMap<String, f64> = [("a".to_string(), 0.0)].into_iter().collect();
        let ranking = ImportanceRanking::from_scores(&scores, 20);
        assert_eq!(ranking.entries[0].percent, 0.0);
    }

    #[test]
    fn top_variables_sorted_by_magnitude() {
        let vm = Loadings::variable_major(
            DMatrix::from_row_slice(3, 2, &[0.2, 0.9, -0.7, 0.1, 0.5, -0.3]),
            names(&["a", "b", "c"]),
        );
        let summary = top_variables_per_component(&vm, &[0.6, 0.3], 2);
        assert_eq!(summary.len(), 2);
        assert_eq!(summary[0].component, "PC1");
        let first: Vec<&str> = summary[0].variables.iter().map(|v| v.variable.as_str()).collect();
        assert_eq!(first, vec!["b", "c"]);
        assert_eq!(summary[0].variables[0].loading, -0.7);
        assert_eq!(summary[1].variables[0].variable, "a");
    }
}
