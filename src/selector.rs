//! Random recommendation pick.

use rand::seq::SliceRandom;
use rand::Rng;

pub const DEFAULT_PICK_COUNT: usize = 3;

/// Pick up to `n` distinct items uniformly at random.
///
/// Every subset of size `min(n, len)` is equally likely. The relative order
/// of the returned items carries no meaning.
pub fn pick_random<T>(items: Vec<T>, n: usize) -> Vec<T> {
    pick_random_with(items, n, &mut rand::thread_rng())
}

pub fn pick_random_with<T, R: Rng + ?Sized>(mut items: Vec<T>, n: usize, rng: &mut R) -> Vec<T> {
    if items.len() <= n {
        return items;
    }
    items.shuffle(rng);
    items.truncate(n);
    items
}
