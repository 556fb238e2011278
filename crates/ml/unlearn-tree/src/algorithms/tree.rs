//! Randomized Gini decision tree with certified-removal deletion.
//!
//! Split selection draws from an exponential mechanism over candidate Gini
//! indexes instead of taking the argmin, which is what makes deletion cheap:
//! after removing rows, the cached split statistics are updated in place and
//! a subtree is rebuilt only when the updated selection distribution drifts
//! outside the `exp(±epsilon)` band around the one the split was drawn from.

use log::{debug, trace};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use rand::distributions::{Distribution, WeightedIndex};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use super::stats::{split_weights, BranchStats, NodeStats, SplitStats};
use crate::error::{Error, Result};
use crate::store::RowStore;
use crate::utils;

/// Tree node: either a leaf carrying the positive-class probability and the
/// keys of the rows that reached it, or an internal split on one feature.
///
/// `left` holds the rows where the split feature is 1, `right` where it is 0.
#[derive(Debug, Clone)]
pub(crate) enum Node {
    Leaf {
        value: f64,
        indices: Vec<usize>,
        stats: NodeStats,
    },
    Split {
        feature: usize,
        stats: NodeStats,
        left: Box<Node>,
        right: Box<Node>,
    },
}

impl Node {
    pub(crate) fn stats(&self) -> &NodeStats {
        match self {
            Node::Leaf { stats, .. } | Node::Split { stats, .. } => stats,
        }
    }

    /// Append the keys of every row under this subtree, in leaf order.
    pub(crate) fn collect_indices(&self, out: &mut Vec<usize>) {
        match self {
            Node::Leaf { indices, .. } => out.extend_from_slice(indices),
            Node::Split { left, right, .. } => {
                left.collect_indices(out);
                right.collect_indices(out);
            }
        }
    }
}

/// Configuration for the unlearning tree
#[derive(Debug, Clone)]
pub struct TreeConfig {
    /// Efficiency-utility tradeoff; lower for more deletion efficiency,
    /// higher for more utility
    pub epsilon: f64,
    /// Fraction of data guaranteed for certified removal; scales the
    /// softmax temperature as `5 * gamma`
    pub gamma: f64,
    /// Maximum depth of the tree (the root is depth 0)
    pub max_depth: usize,
    /// Minimum number of samples needed to make a split
    pub min_samples_split: usize,
    /// Seed for reproducible split sampling
    pub random_state: Option<u64>,
    /// Verbosity level; does not affect results
    pub verbose: u8,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            epsilon: 0.1,
            gamma: 0.1,
            max_depth: 4,
            min_samples_split: 2,
            random_state: None,
            verbose: 0,
        }
    }
}

/// Decision tree over binary features and binary labels supporting
/// efficient instance deletion.
#[derive(Debug, Clone)]
pub struct Tree {
    config: TreeConfig,
    n_features: usize,
    store: RowStore,
    rng: ChaCha8Rng,
    root: Option<Node>,
}

/// The slice of a delete batch routed to one subtree.
struct Batch<'a> {
    x: ArrayView2<'a, u8>,
    y: ArrayView1<'a, u8>,
    keys: &'a [usize],
}

impl<'a> Batch<'a> {
    fn len(&self) -> usize {
        self.keys.len()
    }

    fn pos_count(&self) -> usize {
        self.y.iter().map(|&v| v as usize).sum()
    }
}

impl Tree {
    /// Creates a new Tree instance with the given configuration
    pub fn new(config: TreeConfig) -> Result<Self> {
        if !config.epsilon.is_finite() || config.epsilon <= 0.0 {
            return Err(Error::InvalidParameter(
                "epsilon must be positive".to_string(),
            ));
        }
        if !config.gamma.is_finite() || config.gamma <= 0.0 {
            return Err(Error::InvalidParameter(
                "gamma must be positive".to_string(),
            ));
        }
        if config.min_samples_split < 2 {
            return Err(Error::InvalidParameter(
                "min_samples_split must be at least 2".to_string(),
            ));
        }

        Ok(Self {
            rng: Self::seed_rng(config.random_state),
            config,
            n_features: 0,
            store: RowStore::default(),
            root: None,
        })
    }

    fn seed_rng(random_state: Option<u64>) -> ChaCha8Rng {
        match random_state {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        }
    }

    /// Fits the tree to a binary training set.
    ///
    /// Fails with [`Error::DegenerateRoot`] when `y` contains a single
    /// class; on any error the previous fitted state is left untouched.
    pub fn fit(&mut self, x: ArrayView2<u8>, y: ArrayView1<u8>) -> Result<()> {
        utils::validate_fit_input(&x, &y)?;
        let store = RowStore::load(x, y)?;

        let mut rng = Self::seed_rng(self.config.random_state);
        let keys: Vec<usize> = (0..x.nrows()).collect();
        let root = build_node(&self.config, &mut rng, x, y, keys, 0)?;

        self.n_features = x.ncols();
        self.store = store;
        self.rng = rng;
        self.root = Some(root);

        if self.config.verbose > 0 {
            debug!(
                "fitted tree: {} nodes over {} rows",
                self.node_count(),
                self.store.len()
            );
        }
        Ok(())
    }

    /// Predicts `[P(y=0), P(y=1)]` for each row of `x`.
    pub fn predict_proba(&self, x: ArrayView2<u8>) -> Result<Array2<f64>> {
        let root = self.root.as_ref().ok_or(Error::NotFitted)?;
        utils::validate_predict_input(&x, self.n_features)?;

        let mut proba = Array2::zeros((x.nrows(), 2));
        for (i, row) in x.outer_iter().enumerate() {
            let p = predict_row(root, row);
            proba[[i, 0]] = 1.0 - p;
            proba[[i, 1]] = p;
        }
        Ok(proba)
    }

    /// Predicts class labels for each row of `x`; ties resolve to class 0.
    pub fn predict(&self, x: ArrayView2<u8>) -> Result<Array1<u8>> {
        let proba = self.predict_proba(x)?;
        Ok(proba.map_axis(Axis(1), |row| u8::from(row[1] > row[0])))
    }

    /// Removes training rows by key, updating the model so it is a valid
    /// sample of the learner over the remaining rows.
    ///
    /// Returns the deletion trace: one tag per subtree touched (`"1a"` leaf
    /// update, `"1b"` mono-class collapse, `"2a_<depth>"` hanging-branch
    /// rebuild, `"2b_<depth>"`/`"2c_<depth>"` divergence rebuild with/without
    /// an invalidated feature). An empty batch is a no-op with an empty
    /// trace. Unknown keys and a deletion that would leave the root
    /// mono-class fail before any state is modified.
    pub fn delete(&mut self, remove_keys: &[usize]) -> Result<Vec<String>> {
        if self.root.is_none() {
            return Err(Error::NotFitted);
        }
        if remove_keys.is_empty() {
            return Ok(Vec::new());
        }

        let mut batch_keys: Vec<usize> = remove_keys.to_vec();
        batch_keys.sort_unstable();
        batch_keys.dedup();

        // resolve the whole batch up front so an unknown key cannot leave
        // the model half-updated
        let (x_del, y_del) = self.store.gather(&batch_keys)?;
        let removed_pos: usize = y_del.iter().map(|&v| v as usize).sum();

        let (count, pos_count) = {
            let stats = self.root.as_ref().ok_or(Error::NotFitted)?.stats();
            (stats.count, stats.pos_count)
        };
        let new_count = count - batch_keys.len();
        let new_pos = pos_count - removed_pos;
        if new_pos == 0 || new_pos == new_count {
            return Err(Error::DegenerateRoot);
        }

        let mut deletion_trace = Vec::new();
        let root = self.root.take().ok_or(Error::NotFitted)?;
        let batch = Batch {
            x: x_del.view(),
            y: y_del.view(),
            keys: &batch_keys,
        };
        let root = delete_node(
            &self.config,
            &self.store,
            &mut self.rng,
            root,
            batch,
            0,
            &mut deletion_trace,
        )?;
        self.root = Some(root);

        for &key in &batch_keys {
            self.store.remove(key)?;
        }

        if self.config.verbose > 0 {
            debug!(
                "deleted {} rows, trace: {:?}",
                batch_keys.len(),
                deletion_trace
            );
        }
        Ok(deletion_trace)
    }

    /// Structural equality: identical split features and leaf values.
    pub fn equals(&self, other: &Tree) -> bool {
        match (&self.root, &other.root) {
            (Some(a), Some(b)) => node_equals(a, b),
            (None, None) => true,
            _ => false,
        }
    }

    /// Returns the number of features the tree was fitted on
    pub fn n_features(&self) -> usize {
        self.n_features
    }

    /// Returns the training-row store
    pub fn store(&self) -> &RowStore {
        &self.store
    }

    /// Returns the keys of every stored row, in leaf order
    pub fn leaf_indices(&self) -> Vec<usize> {
        let mut out = Vec::new();
        if let Some(root) = &self.root {
            root.collect_indices(&mut out);
        }
        out
    }

    /// Returns the depth of the tree
    pub fn depth(&self) -> usize {
        self.root.as_ref().map_or(0, node_depth)
    }

    /// Returns the number of nodes in the tree
    pub fn node_count(&self) -> usize {
        self.root.as_ref().map_or(0, count_nodes)
    }

    /// Returns the number of leaves in the tree
    pub fn leaf_count(&self) -> usize {
        self.root.as_ref().map_or(0, count_leaves)
    }

    #[cfg(test)]
    pub(crate) fn root(&self) -> Option<&Node> {
        self.root.as_ref()
    }
}

/// Positions of the rows where `feature` is 1 (left) and 0 (right).
fn partition_rows(x: &ArrayView2<u8>, feature: usize) -> (Vec<usize>, Vec<usize>) {
    let mut left = Vec::new();
    let mut right = Vec::new();
    for (r, row) in x.outer_iter().enumerate() {
        if row[feature] == 1 {
            left.push(r);
        } else {
            right.push(r);
        }
    }
    (left, right)
}

fn make_leaf(stats: NodeStats, indices: Vec<usize>) -> Node {
    let value = if stats.pos_count == 0 {
        0.0
    } else {
        stats.pos_count as f64 / stats.count as f64
    };
    Node::Leaf {
        value,
        indices,
        stats,
    }
}

/// Recursively build a subtree over the rows in `keys`, at `depth`.
fn build_node(
    config: &TreeConfig,
    rng: &mut ChaCha8Rng,
    x: ArrayView2<u8>,
    y: ArrayView1<u8>,
    keys: Vec<usize>,
    depth: usize,
) -> Result<Node> {
    let n = keys.len();
    if n == 0 {
        return Err(Error::EmptyNode(depth));
    }

    let n_features = x.ncols();
    let pos: usize = y.iter().map(|&v| v as usize).sum();
    let mut stats = NodeStats::new(n, pos);

    if stats.is_mono_class() && depth == 0 {
        return Err(Error::DegenerateRoot);
    }

    // a node at depth d has at most n_features - d unused features left
    let out_of_features = depth >= n_features;
    if n < config.min_samples_split
        || depth == config.max_depth
        || out_of_features
        || stats.is_mono_class()
    {
        return Ok(make_leaf(stats, keys));
    }

    // cache split statistics for every feature that keeps a row on each side
    for i in 0..n_features {
        let (left_rows, right_rows) = partition_rows(&x, i);
        if left_rows.is_empty() || right_rows.is_empty() {
            continue;
        }
        let left_pos: usize = left_rows.iter().map(|&r| y[r] as usize).sum();
        let right_pos: usize = right_rows.iter().map(|&r| y[r] as usize).sum();
        let split = SplitStats::new(
            BranchStats::new(left_rows.len(), left_pos, n),
            BranchStats::new(right_rows.len(), right_pos, n),
        );
        stats.splits.insert(i, split);
    }

    // duplicate rows with mixed labels can leave no viable split
    if stats.splits.is_empty() {
        return Ok(make_leaf(stats, keys));
    }

    let features: Vec<usize> = stats.splits.keys().copied().collect();
    let ginis: Vec<f64> = stats.splits.values().map(|s| s.gini_index).collect();
    let probs = split_weights(&ginis, config.epsilon, config.gamma);
    let dist = WeightedIndex::new(&probs)
        .map_err(|e| Error::Numerical(format!("split sampling weights: {e}")))?;
    let feature = features[dist.sample(rng)];

    if config.verbose > 1 {
        trace!(
            "depth {depth}: sampled feature {feature} from {} candidates",
            features.len()
        );
    }

    let (left_rows, right_rows) = partition_rows(&x, feature);
    let left_keys: Vec<usize> = left_rows.iter().map(|&r| keys[r]).collect();
    let right_keys: Vec<usize> = right_rows.iter().map(|&r| keys[r]).collect();

    let left_x = x.select(Axis(0), &left_rows);
    let left_y = y.select(Axis(0), &left_rows);
    let left = Box::new(build_node(
        config,
        rng,
        left_x.view(),
        left_y.view(),
        left_keys,
        depth + 1,
    )?);

    let right_x = x.select(Axis(0), &right_rows);
    let right_y = y.select(Axis(0), &right_rows);
    let right = Box::new(build_node(
        config,
        rng,
        right_x.view(),
        right_y.view(),
        right_keys,
        depth + 1,
    )?);

    Ok(Node::Split {
        feature,
        stats,
        left,
        right,
    })
}

/// Rebuild the subtree spanning `left` and `right` from the rows that
/// remain after the batch is removed, at the subtree's current depth.
fn rebuild(
    config: &TreeConfig,
    store: &RowStore,
    rng: &mut ChaCha8Rng,
    left: &Node,
    right: &Node,
    remove_keys: &[usize],
    depth: usize,
) -> Result<Node> {
    let mut indices = Vec::new();
    left.collect_indices(&mut indices);
    right.collect_indices(&mut indices);
    let kept = utils::remove_elements(&indices, remove_keys);

    let (x, y) = store.gather(&kept)?;
    build_node(config, rng, x.view(), y.view(), kept, depth)
}

/// Remove the batch from a subtree, returning the replacement subtree.
///
/// The batch rows must all be currently routed to this subtree, and the
/// caller must have verified that the root stays mixed-class.
fn delete_node(
    config: &TreeConfig,
    store: &RowStore,
    rng: &mut ChaCha8Rng,
    node: Node,
    batch: Batch<'_>,
    depth: usize,
    deletion_trace: &mut Vec<String>,
) -> Result<Node> {
    let removed = batch.len();
    let removed_pos = batch.pos_count();

    match node {
        Node::Leaf {
            indices, mut stats, ..
        } => {
            stats.subtract(removed, removed_pos);
            let indices = utils::remove_elements(&indices, batch.keys);
            if config.verbose > 0 {
                debug!("leaf updated at depth {depth}");
            }
            deletion_trace.push("1a".to_string());
            Ok(make_leaf(stats, indices))
        }
        Node::Split {
            feature,
            mut stats,
            mut left,
            mut right,
        } => {
            stats.subtract(removed, removed_pos);
            // a mono-class root was rejected before any mutation
            debug_assert!(!(depth == 0 && stats.is_mono_class()));

            // every remaining row is one class: collapse to a leaf
            if stats.is_mono_class() {
                let mut indices = Vec::with_capacity(stats.count + removed);
                left.collect_indices(&mut indices);
                right.collect_indices(&mut indices);
                let indices = utils::remove_elements(&indices, batch.keys);
                if config.verbose > 0 {
                    debug!("remaining rows in one class, creating leaf at depth {depth}");
                }
                deletion_trace.push("1b".to_string());
                return Ok(make_leaf(NodeStats::new(stats.count, stats.pos_count), indices));
            }

            let (left_rows, right_rows) = partition_rows(&batch.x, feature);

            // hanging branch: the batch empties one side of the current split
            let hanging = match stats.splits.get(&feature) {
                Some(split) => {
                    split.left.count <= left_rows.len() || split.right.count <= right_rows.len()
                }
                None => true,
            };
            if hanging {
                if config.verbose > 0 {
                    debug!("hanging branch, rebuilding at depth {depth}");
                }
                deletion_trace.push(format!("2a_{depth}"));
                return rebuild(config, store, rng, &left, &right, batch.keys, depth);
            }

            // update the cached statistics of every candidate feature, and
            // drop the ones whose branches the batch would empty
            let n_candidates = stats.splits.len();
            let mut old_ginis = Vec::with_capacity(n_candidates);
            let mut new_ginis = Vec::with_capacity(n_candidates);
            let mut invalid_positions = Vec::new();
            let mut invalid_features = Vec::new();

            for (position, (&i, split)) in stats.splits.iter_mut().enumerate() {
                let (li, ri) = partition_rows(&batch.x, i);
                let left_removed = li.len();
                let left_removed_pos: usize = li.iter().map(|&r| batch.y[r] as usize).sum();
                let right_removed = ri.len();
                let right_removed_pos: usize = ri.iter().map(|&r| batch.y[r] as usize).sum();

                old_ginis.push(split.gini_index);

                let invalid = (left_removed > 0 && split.left.count <= left_removed)
                    || (right_removed > 0 && split.right.count <= right_removed);
                if invalid {
                    invalid_positions.push(position);
                    invalid_features.push(i);
                    new_ginis.push(0.0);
                    continue;
                }

                split.left.count -= left_removed;
                split.left.pos_count -= left_removed_pos;
                split.right.count -= right_removed;
                split.right.pos_count -= right_removed_pos;
                split.left.refresh(stats.count);
                split.right.refresh(stats.count);
                split.recompute_gini();
                new_ginis.push(split.gini_index);
            }

            for i in &invalid_features {
                stats.splits.remove(i);
            }

            // the split stands only while the selection distribution it was
            // drawn from stays within exp(+-epsilon) of the updated one
            let p_old = split_weights(&old_ginis, config.epsilon, config.gamma);
            let mut p_new = split_weights(&new_ginis, config.epsilon, config.gamma);
            if !invalid_positions.is_empty() {
                for &j in &invalid_positions {
                    p_new[j] = 0.0;
                }
                let total: f64 = p_new.iter().sum();
                for p in &mut p_new {
                    *p /= total;
                }
            }

            let upper = config.epsilon.exp();
            let lower = (-config.epsilon).exp();
            let diverged = p_new.iter().zip(p_old.iter()).any(|(new, old)| {
                let ratio = new / old;
                ratio > upper || ratio < lower
            });
            if diverged {
                let kind = if invalid_features.is_empty() { "2c" } else { "2b" };
                if config.verbose > 0 {
                    debug!("split distribution diverged, rebuilding at depth {depth}");
                }
                deletion_trace.push(format!("{kind}_{depth}"));
                return rebuild(config, store, rng, &left, &right, batch.keys, depth);
            }

            // the split stands; push the batch down the affected branches
            if !left_rows.is_empty() {
                let lx = batch.x.select(Axis(0), &left_rows);
                let ly = batch.y.select(Axis(0), &left_rows);
                let lk: Vec<usize> = left_rows.iter().map(|&r| batch.keys[r]).collect();
                let left_batch = Batch {
                    x: lx.view(),
                    y: ly.view(),
                    keys: &lk,
                };
                left = Box::new(delete_node(
                    config,
                    store,
                    rng,
                    *left,
                    left_batch,
                    depth + 1,
                    deletion_trace,
                )?);
            }
            if !right_rows.is_empty() {
                let rx = batch.x.select(Axis(0), &right_rows);
                let ry = batch.y.select(Axis(0), &right_rows);
                let rk: Vec<usize> = right_rows.iter().map(|&r| batch.keys[r]).collect();
                let right_batch = Batch {
                    x: rx.view(),
                    y: ry.view(),
                    keys: &rk,
                };
                right = Box::new(delete_node(
                    config,
                    store,
                    rng,
                    *right,
                    right_batch,
                    depth + 1,
                    deletion_trace,
                )?);
            }

            Ok(Node::Split {
                feature,
                stats,
                left,
                right,
            })
        }
    }
}

fn predict_row(node: &Node, row: ArrayView1<u8>) -> f64 {
    match node {
        Node::Leaf { value, .. } => *value,
        Node::Split {
            feature,
            left,
            right,
            ..
        } => {
            if row[*feature] == 1 {
                predict_row(left, row)
            } else {
                predict_row(right, row)
            }
        }
    }
}

fn node_equals(a: &Node, b: &Node) -> bool {
    match (a, b) {
        (Node::Leaf { value: va, .. }, Node::Leaf { value: vb, .. }) => va == vb,
        (
            Node::Split {
                feature: fa,
                left: la,
                right: ra,
                ..
            },
            Node::Split {
                feature: fb,
                left: lb,
                right: rb,
                ..
            },
        ) => fa == fb && node_equals(la, lb) && node_equals(ra, rb),
        _ => false,
    }
}

fn node_depth(node: &Node) -> usize {
    match node {
        Node::Leaf { .. } => 0,
        Node::Split { left, right, .. } => 1 + node_depth(left).max(node_depth(right)),
    }
}

fn count_nodes(node: &Node) -> usize {
    match node {
        Node::Leaf { .. } => 1,
        Node::Split { left, right, .. } => 1 + count_nodes(left) + count_nodes(right),
    }
}

fn count_leaves(node: &Node) -> usize {
    match node {
        Node::Leaf { .. } => 1,
        Node::Split { left, right, .. } => count_leaves(left) + count_leaves(right),
    }
}

#[cfg(test)]
#[path = "tree_test.rs"]
mod tests;
