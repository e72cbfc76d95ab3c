//! Random Forest Ensemble
//!
//! Bagged CART trees with Gini splits and per-split feature subsampling.

use rand::rngs::StdRng;
use rand::seq::index::sample;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::InferenceError;

/// Forest hyperparameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForestParams {
    /// Number of trees
    pub n_trees: usize,
    /// Max depth per tree
    pub max_depth: usize,
    /// Minimum samples required to split a node
    pub min_samples_split: usize,
    /// Features tried per split; `None` means sqrt of the dimension
    pub max_features: Option<usize>,
    /// Random seed
    pub seed: u64,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_trees: 100,
            max_depth: 16,
            min_samples_split: 2,
            max_features: None,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum Node {
    Leaf {
        /// Class probabilities at this leaf
        proba: Vec<f64>,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

/// Single classification tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTree {
    nodes: Vec<Node>,
    n_features: usize,
    n_classes: usize,
    /// Total impurity decrease per feature
    importances: Vec<f64>,
}

struct TreeBuilder<'a> {
    samples: &'a [Vec<f64>],
    labels: &'a [usize],
    params: &'a ForestParams,
    max_features: usize,
    tree: DecisionTree,
}

fn gini(counts: &[usize], n: usize) -> f64 {
    if n == 0 {
        return 0.0;
    }
    let n = n as f64;
    1.0 - counts.iter().map(|&c| (c as f64 / n).powi(2)).sum::<f64>()
}

impl<'a> TreeBuilder<'a> {
    fn class_counts(&self, idx: &[usize]) -> Vec<usize> {
        let mut counts = vec![0; self.tree.n_classes];
        for &i in idx {
            counts[self.labels[i]] += 1;
        }
        counts
    }

    fn leaf(&mut self, counts: &[usize], n: usize) -> usize {
        let proba = counts.iter().map(|&c| c as f64 / n.max(1) as f64).collect();
        self.tree.nodes.push(Node::Leaf { proba });
        self.tree.nodes.len() - 1
    }

    /// Best (feature, threshold, weighted child impurity) over a random feature subset
    fn best_split(&self, idx: &[usize], counts: &[usize], rng: &mut StdRng) -> Option<(usize, f64, f64)> {
        let n = idx.len();
        let mut best: Option<(usize, f64, f64)> = None;

        for feature in sample(rng, self.tree.n_features, self.max_features).into_iter() {
            let mut sorted = idx.to_vec();
            sorted.sort_by(|&a, &b| self.samples[a][feature].total_cmp(&self.samples[b][feature]));

            let mut left = vec![0usize; counts.len()];
            let mut right = counts.to_vec();
            for i in 0..n - 1 {
                let class = self.labels[sorted[i]];
                left[class] += 1;
                right[class] -= 1;

                let here = self.samples[sorted[i]][feature];
                let next = self.samples[sorted[i + 1]][feature];
                if here == next {
                    continue;
                }

                let n_left = i + 1;
                let n_right = n - n_left;
                let impurity = (n_left as f64 * gini(&left, n_left)
                    + n_right as f64 * gini(&right, n_right))
                    / n as f64;
                if best.map_or(true, |(_, _, b)| impurity < b) {
                    best = Some((feature, (here + next) / 2.0, impurity));
                }
            }
        }

        best
    }

    fn build(&mut self, idx: Vec<usize>, depth: usize, rng: &mut StdRng) -> usize {
        let n = idx.len();
        let counts = self.class_counts(&idx);
        let impurity = gini(&counts, n);

        if depth >= self.params.max_depth || n < self.params.min_samples_split.max(2) || impurity == 0.0 {
            return self.leaf(&counts, n);
        }

        let Some((feature, threshold, child_impurity)) = self.best_split(&idx, &counts, rng) else {
            return self.leaf(&counts, n);
        };
        if child_impurity >= impurity {
            return self.leaf(&counts, n);
        }

        self.tree.importances[feature] += n as f64 * (impurity - child_impurity);

        let (left_idx, right_idx): (Vec<usize>, Vec<usize>) = idx
            .into_iter()
            .partition(|&i| self.samples[i][feature] <= threshold);

        // Reserve this node's slot before the children are appended
        self.tree.nodes.push(Node::Leaf { proba: Vec::new() });
        let slot = self.tree.nodes.len() - 1;
        let left = self.build(left_idx, depth + 1, rng);
        let right = self.build(right_idx, depth + 1, rng);
        self.tree.nodes[slot] = Node::Split {
            feature,
            threshold,
            left,
            right,
        };
        slot
    }
}

impl DecisionTree {
    /// Fit on the given sample indices
    fn fit(
        samples: &[Vec<f64>],
        labels: &[usize],
        idx: Vec<usize>,
        n_classes: usize,
        params: &ForestParams,
        rng: &mut StdRng,
    ) -> Self {
        let n_features = samples.first().map_or(0, Vec::len);
        let max_features = params
            .max_features
            .unwrap_or_else(|| (n_features as f64).sqrt().round() as usize)
            .clamp(1, n_features.max(1));

        let mut builder = TreeBuilder {
            samples,
            labels,
            params,
            max_features,
            tree: DecisionTree {
                nodes: Vec::new(),
                n_features,
                n_classes,
                importances: vec![0.0; n_features],
            },
        };
        builder.build(idx, 0, rng);
        builder.tree
    }

    /// Class probabilities for one sample
    pub fn predict_proba(&self, sample: &[f64]) -> &[f64] {
        let mut node = 0;
        loop {
            match &self.nodes[node] {
                Node::Leaf { proba } => return proba,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    node = if sample[*feature] <= *threshold { *left } else { *right };
                }
            }
        }
    }

    /// Impurity decrease per feature, normalized to sum to 1
    pub fn feature_importances(&self) -> Vec<f64> {
        let total: f64 = self.importances.iter().sum();
        if total > 0.0 {
            self.importances.iter().map(|v| v / total).collect()
        } else {
            self.importances.clone()
        }
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Check node links before the tree is walked.
    ///
    /// Children must come after their parent, so every walk from the root
    /// terminates inside `nodes`.
    pub fn validate(&self, n_features: usize, n_classes: usize) -> Result<(), InferenceError> {
        let invalid = |msg: String| -> Result<(), InferenceError> { Err(InferenceError::InvalidArtifact(msg)) };

        if self.nodes.is_empty() {
            return invalid("tree has no nodes".to_string());
        }
        if self.n_features != n_features || self.n_classes != n_classes {
            return invalid(format!(
                "tree shape {}x{} differs from forest {}x{}",
                self.n_features, self.n_classes, n_features, n_classes
            ));
        }
        if self.importances.len() != n_features {
            return invalid(format!("tree has {} importances", self.importances.len()));
        }

        for (i, node) in self.nodes.iter().enumerate() {
            match node {
                Node::Leaf { proba } => {
                    if proba.len() != n_classes || proba.iter().any(|p| !p.is_finite()) {
                        return invalid(format!("leaf {} has malformed probabilities", i));
                    }
                }
                Node::Split {
                    feature, left, right, ..
                } => {
                    if *feature >= n_features {
                        return invalid(format!("node {} splits on feature {}", i, feature));
                    }
                    for &child in [left, right] {
                        if child <= i || child >= self.nodes.len() {
                            return invalid(format!("node {} links to node {}", i, child));
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

/// Random forest ensemble
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForest {
    trees: Vec<DecisionTree>,
    n_features: usize,
    n_classes: usize,
}

impl RandomForest {
    /// Fit a forest on row-major samples and class labels `0..n_classes`
    pub fn fit(samples: &[Vec<f64>], labels: &[usize], params: &ForestParams) -> Self {
        let n_features = samples.first().map_or(0, Vec::len);
        let n_classes = labels.iter().max().map_or(0, |m| m + 1);
        let mut rng = StdRng::seed_from_u64(params.seed);

        let mut trees = Vec::with_capacity(params.n_trees);
        if !samples.is_empty() {
            for _ in 0..params.n_trees {
                // Bootstrap sample
                let bootstrap: Vec<usize> = (0..samples.len())
                    .map(|_| rng.gen_range(0..samples.len()))
                    .collect();
                trees.push(DecisionTree::fit(samples, labels, bootstrap, n_classes, params, &mut rng));
            }
        }

        debug!(
            "Fitted random forest: trees={}, nodes={}",
            trees.len(),
            trees.iter().map(DecisionTree::node_count).sum::<usize>()
        );
        Self {
            trees,
            n_features,
            n_classes,
        }
    }

    /// Mean of the trees' class probabilities
    pub fn predict_proba(&self, sample: &[f64]) -> Vec<f64> {
        let mut proba = vec![0.0; self.n_classes];
        for tree in &self.trees {
            for (p, v) in proba.iter_mut().zip(tree.predict_proba(sample)) {
                *p += v;
            }
        }
        let n = self.trees.len().max(1) as f64;
        proba.iter_mut().for_each(|p| *p /= n);
        proba
    }

    /// Get aggregated feature importances
    pub fn feature_importances(&self) -> Vec<f64> {
        let mut importances = vec![0.0; self.n_features];
        for tree in &self.trees {
            for (acc, imp) in importances.iter_mut().zip(tree.feature_importances()) {
                *acc += imp;
            }
        }

        let total: f64 = importances.iter().sum();
        if total > 0.0 {
            importances.iter_mut().for_each(|v| *v /= total);
        }
        importances
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn n_classes(&self) -> usize {
        self.n_classes
    }

    /// Number of trees
    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    /// Check every tree against the forest's shape
    pub fn validate(&self) -> Result<(), InferenceError> {
        if self.trees.is_empty() {
            return Err(InferenceError::InvalidArtifact("forest has no trees".to_string()));
        }
        self.trees
            .iter()
            .try_for_each(|tree| tree.validate(self.n_features, self.n_classes))
    }
}

#[cfg(test)]
impl RandomForest {
    /// One-tree forest whose root splits on a feature past the input
    pub(crate) fn with_dangling_split(n_features: usize, n_classes: usize) -> Self {
        Self {
            trees: vec![DecisionTree {
                nodes: vec![Node::Split {
                    feature: n_features + 30,
                    threshold: 0.0,
                    left: 7,
                    right: 9,
                }],
                n_features,
                n_classes,
                importances: vec![0.0; n_features],
            }],
            n_features,
            n_classes,
        }
    }
}
