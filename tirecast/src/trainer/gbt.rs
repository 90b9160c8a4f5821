//! Gradient-boosted regression trees on a least-squares baseline.
//!
//! The baseline is an ordinary least squares fit (linfa-linear). Each
//! boosting stage then fits a shallow tree to the current residuals and adds
//! a shrunken copy of it to the ensemble:
//!
//! ```text
//! F0(x)   = β·x + c       (or mean(y) when least squares does no better)
//! r_i     = y_i − F_{m−1}(x_i)
//! h_m     = best tree fitting r (depth ≤ max_depth, leaves ≥ min_samples_leaf)
//! F_m(x)  = F_{m−1}(x) + learning_rate · h_m(x)
//! ```
//!
//! Split search uses per-feature orderings computed once per fit, so each
//! tree level costs one linear scan per feature.

use linfa::prelude::*;
use linfa::{DatasetBase, DatasetView};
use linfa_linear::LinearRegression;
use ndarray::{Array1, ArrayView1, ArrayView2, Axis, Ix1};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::error::{TrainingError, TrainingResult};
use super::regressor::{Regressor, RegressorArtifact};

/// Columns with a smaller range are left out of the baseline.
const MIN_COLUMN_SPREAD: f64 = 1e-9;

/// A baseline column may not swing the output by more than this many times
/// the label range. Larger swings mean near-collinear columns cancelling.
const MAX_CONTRIBUTION_RATIO: f64 = 1e3;

/// Boosting hyperparameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoostingParams {
    pub n_estimators: usize,
    pub learning_rate: f64,
    pub max_depth: usize,
    pub min_samples_leaf: usize,
}

impl Default for BoostingParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            learning_rate: 0.1,
            max_depth: 3,
            min_samples_leaf: 4,
        }
    }
}

fn spread(values: ArrayView1<'_, f64>) -> f64 {
    let (min, max) = values
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    if min.is_finite() && max.is_finite() {
        max - min
    } else {
        0.0
    }
}

/// Linear starting point of the ensemble.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LinearBaseline {
    coefficients: Array1<f64>,
    intercept: f64,
}

impl LinearBaseline {
    fn constant(width: usize, value: f64) -> Self {
        Self {
            coefficients: Array1::zeros(width),
            intercept: value,
        }
    }

    /// Least squares on the non-constant columns. Falls back to the label
    /// mean when the fit fails, is ill-conditioned or does no better.
    fn fit(dataset: &DatasetView<'_, f64, f64, Ix1>) -> Self {
        let records = dataset.records();
        let targets = dataset.targets();
        let width = records.ncols();
        let mean = Self::constant(width, targets.mean().unwrap_or(0.0));

        let columns: Vec<usize> = records
            .axis_iter(Axis(1))
            .enumerate()
            .filter(|(_, column)| spread(column.view()) > MIN_COLUMN_SPREAD)
            .map(|(i, _)| i)
            .collect();
        if columns.is_empty() || records.nrows() <= columns.len() + 1 {
            return mean;
        }

        let selected = DatasetBase::new(records.select(Axis(1), &columns), targets.view());
        let fitted = match LinearRegression::new().fit(&selected) {
            Ok(fitted) => fitted,
            Err(e) => {
                debug!(error = %e, "Least squares baseline failed, using the mean");
                return mean;
            }
        };

        let limit = MAX_CONTRIBUTION_RATIO * (spread(targets.view()) + 1.0);
        let mut coefficients = Array1::zeros(width);
        for (&column, &beta) in columns.iter().zip(fitted.params().iter()) {
            let swing = (beta * spread(records.column(column))).abs();
            if !beta.is_finite() || swing > limit {
                debug!(column, beta, "Ill-conditioned baseline, using the mean");
                return mean;
            }
            coefficients[column] = beta;
        }
        let linear = Self {
            coefficients,
            intercept: fitted.intercept(),
        };
        if !linear.intercept.is_finite() {
            return mean;
        }

        if linear.mae(records.view(), targets.view()) < mean.mae(records.view(), targets.view()) {
            linear
        } else {
            mean
        }
    }

    /// Rows narrower or wider than the fit use the overlapping columns.
    pub fn predict(&self, x: ArrayView1<'_, f64>) -> f64 {
        self.intercept
            + self
                .coefficients
                .iter()
                .zip(x.iter())
                .map(|(beta, v)| beta * v)
                .sum::<f64>()
    }

    fn mae(&self, records: ArrayView2<'_, f64>, targets: ArrayView1<'_, f64>) -> f64 {
        records
            .rows()
            .into_iter()
            .zip(targets.iter())
            .map(|(row, y)| (self.predict(row) - y).abs())
            .sum::<f64>()
            / targets.len().max(1) as f64
    }

    pub fn is_constant(&self) -> bool {
        self.coefficients.iter().all(|beta| *beta == 0.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
enum Node {
    Leaf(f64),
    Split {
        feature: usize,
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

impl Node {
    fn predict(&self, x: ArrayView1<'_, f64>) -> f64 {
        match self {
            Node::Leaf(value) => *value,
            Node::Split {
                feature,
                threshold,
                left,
                right,
            } => {
                if x.get(*feature).is_some_and(|v| *v <= *threshold) {
                    left.predict(x)
                } else {
                    right.predict(x)
                }
            }
        }
    }
}

/// Training data view shared by every tree of one fit.
struct FitData<'a> {
    records: ArrayView2<'a, f64>,
    residuals: ArrayView1<'a, f64>,
    sorted: &'a [Vec<usize>],
}

/// Boosted ensemble of regression trees over a linear baseline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradientBoostedTrees {
    params: BoostingParams,
    baseline: LinearBaseline,
    trees: Vec<Node>,
}

impl GradientBoostedTrees {
    pub fn new(params: BoostingParams) -> Self {
        Self {
            params,
            baseline: LinearBaseline::default(),
            trees: Vec::new(),
        }
    }

    pub fn params(&self) -> &BoostingParams {
        &self.params
    }

    pub fn baseline(&self) -> &LinearBaseline {
        &self.baseline
    }

    pub fn tree_count(&self) -> usize {
        self.trees.len()
    }

    fn build(&self, data: &FitData<'_>, rows: &[usize], depth: usize) -> Node {
        let n = rows.len();
        if n == 0 {
            return Node::Leaf(0.0);
        }
        let sum: f64 = rows.iter().map(|&r| data.residuals[r]).sum();
        let mean = sum / n as f64;

        let min_leaf = self.params.min_samples_leaf.max(1);
        if depth >= self.params.max_depth || n < 2 * min_leaf {
            return Node::Leaf(mean);
        }

        let mut member = vec![false; data.residuals.len()];
        for &r in rows {
            member[r] = true;
        }

        let parent_score = sum * sum / n as f64;
        let mut best: Option<(f64, usize, f64)> = None;

        for (feature, order) in data.sorted.iter().enumerate() {
            let column = data.records.column(feature);
            let mut left_sum = 0.0;
            let mut left_n = 0usize;
            let mut prev: Option<f64> = None;

            for &i in order.iter().filter(|&&i| member[i]) {
                let value = column[i];
                if let Some(p) = prev {
                    let right_n = n - left_n;
                    if value > p && left_n >= min_leaf && right_n >= min_leaf {
                        let right_sum = sum - left_sum;
                        let score = left_sum * left_sum / left_n as f64
                            + right_sum * right_sum / right_n as f64;
                        let gain = score - parent_score;
                        if gain > best.map_or(1e-12, |b| b.0) {
                            let mid = p + (value - p) / 2.0;
                            let threshold = if mid < value { mid } else { p };
                            best = Some((gain, feature, threshold));
                        }
                    }
                }
                left_sum += data.residuals[i];
                left_n += 1;
                prev = Some(value);
            }
        }

        let Some((_, feature, threshold)) = best else {
            return Node::Leaf(mean);
        };

        let (left, right): (Vec<usize>, Vec<usize>) = rows
            .iter()
            .partition(|&&r| data.records[[r, feature]] <= threshold);

        Node::Split {
            feature,
            threshold,
            left: Box::new(self.build(data, &left, depth + 1)),
            right: Box::new(self.build(data, &right, depth + 1)),
        }
    }

    fn diverged(&self) -> TrainingError {
        TrainingError::Divergence {
            regressor: self.kind().to_string(),
        }
    }
}

impl Default for GradientBoostedTrees {
    fn default() -> Self {
        Self::new(BoostingParams::default())
    }
}

/// Check shapes and finiteness.
fn validate(dataset: &DatasetView<'_, f64, f64, Ix1>) -> TrainingResult<()> {
    let records = dataset.records();
    let targets = dataset.targets();

    if records.nrows() == 0 || records.ncols() == 0 {
        return Err(TrainingError::MalformedFeatures("no training rows".to_string()));
    }
    if records.nrows() != targets.len() {
        return Err(TrainingError::MalformedFeatures(format!(
            "{} feature rows but {} labels",
            records.nrows(),
            targets.len()
        )));
    }
    if let Some((i, _)) = records
        .rows()
        .into_iter()
        .enumerate()
        .find(|(_, row)| row.iter().any(|v| !v.is_finite()))
    {
        return Err(TrainingError::MalformedFeatures(format!(
            "row {} has a non-finite feature",
            i
        )));
    }
    if targets.iter().any(|v| !v.is_finite()) {
        return Err(TrainingError::MalformedFeatures(
            "non-finite label".to_string(),
        ));
    }
    Ok(())
}

impl Regressor for GradientBoostedTrees {
    fn fit(&mut self, dataset: &DatasetView<'_, f64, f64, Ix1>) -> TrainingResult<()> {
        validate(dataset)?;
        let records = dataset.records().view();
        let targets = dataset.targets().view();
        let n = records.nrows();

        let sorted: Vec<Vec<usize>> = records
            .axis_iter(Axis(1))
            .map(|column| {
                let mut order: Vec<usize> = (0..n).collect();
                order.sort_by(|&a, &b| column[a].total_cmp(&column[b]));
                order
            })
            .collect();

        self.baseline = LinearBaseline::fit(dataset);
        self.trees.clear();

        let mut predictions: Array1<f64> = records
            .rows()
            .into_iter()
            .map(|row| self.baseline.predict(row))
            .collect();
        if predictions.iter().any(|p| !p.is_finite()) {
            return Err(self.diverged());
        }

        let all_rows: Vec<usize> = (0..n).collect();
        for _ in 0..self.params.n_estimators {
            let residuals = &targets - &predictions;

            let data = FitData {
                records: records.view(),
                residuals: residuals.view(),
                sorted: &sorted,
            };
            let tree = self.build(&data, &all_rows, 0);

            for (prediction, row) in predictions.iter_mut().zip(records.rows()) {
                *prediction += self.params.learning_rate * tree.predict(row);
                if !prediction.is_finite() {
                    return Err(self.diverged());
                }
            }
            self.trees.push(tree);
        }

        Ok(())
    }

    fn predict(&self, features: ArrayView1<'_, f64>) -> f64 {
        self.baseline.predict(features)
            + self.params.learning_rate
                * self
                    .trees
                    .iter()
                    .map(|t| t.predict(features))
                    .sum::<f64>()
    }

    fn kind(&self) -> &'static str {
        "gradient-boosted-trees"
    }

    fn to_artifact(&self) -> RegressorArtifact {
        RegressorArtifact::GradientBoosted(self.clone())
    }
}
