/*!
This crate implements a machine-unlearning decision tree: a randomized
binary classifier over binary features that supports certified removal of
training instances without retraining from scratch.

Split selection uses an exponential mechanism over per-feature Gini indexes
parameterized by `(epsilon, gamma)`. Every node caches the statistics needed
to re-evaluate its candidate splits, so deleting rows is usually an in-place
update; a subtree is rebuilt only when the deletion shifts the split
selection distribution by more than `exp(epsilon)` for some feature, or when
it empties one side of a split.

# Components

- [`store::RowStore`]: training rows keyed by stable integer ids
- [`algorithms::stats`]: Gini arithmetic and the per-node split cache
- [`algorithms::tree::Tree`]: fit / predict / delete

# Usage Example

```rust,no_run
use ndarray::{arr1, arr2};
use unlearn_tree::{Tree, TreeConfig};

let x = arr2(&[[1u8, 0], [1, 1], [0, 1], [0, 0]]);
let y = arr1(&[1u8, 1, 0, 0]);

let mut tree = Tree::new(TreeConfig {
    random_state: Some(42),
    ..TreeConfig::default()
})
.expect("valid configuration");
tree.fit(x.view(), y.view()).expect("failed to fit tree");

// unlearn the first training row; the trace describes what each touched
// subtree did (in-place update vs. rebuild)
let deletion_trace = tree.delete(&[0]).expect("failed to delete");
assert!(!deletion_trace.is_empty());

let proba = tree.predict_proba(x.view()).expect("failed to predict");
assert_eq!(proba.ncols(), 2);
```
*/

pub mod algorithms;
pub mod error;
pub mod store;
mod utils;

pub use algorithms::{Tree, TreeConfig};
pub use error::{Error, Result};
