//! Chaotic store wrapper for fault injection testing
//!
//! Store wrapper that randomly fails operations to test error handling in the
//! registry, the chat log and the broadcast router. A failed write never
//! reaches the wrapped store.

#![allow(clippy::disallowed_types, reason = "Locking simple RNG state")]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use channelcast_core::{Item, ItemKey, SecondaryIndex};

use super::{StoreAdapter, StoreError};

/// Chaotic store wrapper that randomly injects failures
///
/// Delegates to an underlying store but fails operations based on a configured
/// failure rate. Uses Arc<Mutex<>> for the RNG state, making it Clone and
/// thread-safe.
#[derive(Clone)]
pub struct ChaoticStore<S: StoreAdapter> {
    inner: S,
    /// Failure rate (0.0 = never fail, 1.0 = always fail)
    failure_rate: f64,
    /// RNG state for deterministic chaos
    rng: Arc<Mutex<ChaoticRng>>,
    /// Operation counter
    operation_count: Arc<Mutex<usize>>,
}

/// Simple deterministic RNG for chaos injection
///
/// Linear congruential generator, so chaos runs are reproducible per seed.
struct ChaoticRng {
    state: u64,
}

impl ChaoticRng {
    fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    /// Generate next random value [0.0, 1.0)
    #[allow(clippy::cast_precision_loss)]
    fn next(&mut self) -> f64 {
        // LCG constants from Numerical Recipes
        const A: u64 = 1_664_525;
        const C: u64 = 1_013_904_223;
        const M: u64 = 1u64 << 32;

        self.state = (A.wrapping_mul(self.state).wrapping_add(C)) % M;
        (self.state as f64) / (M as f64)
    }

    fn should_fail(&mut self, failure_rate: f64) -> bool {
        self.next() < failure_rate
    }
}

impl<S: StoreAdapter> ChaoticStore<S> {
    /// Create a new chaotic store wrapper
    ///
    /// # Panics
    ///
    /// Panics if `failure_rate` is not in [0.0, 1.0]
    pub fn new(inner: S, failure_rate: f64) -> Self {
        Self::with_seed(inner, failure_rate, 0x1234_5678_9ABC_DEF0)
    }

    /// Create with explicit seed for reproducible chaos
    ///
    /// # Panics
    ///
    /// Panics if `failure_rate` is not in [0.0, 1.0]
    pub fn with_seed(inner: S, failure_rate: f64, seed: u64) -> Self {
        assert!(
            (0.0..=1.0).contains(&failure_rate),
            "failure_rate must be between 0.0 and 1.0, got {failure_rate}"
        );

        Self {
            inner,
            failure_rate,
            rng: Arc::new(Mutex::new(ChaoticRng::new(seed))),
            operation_count: Arc::new(Mutex::new(0)),
        }
    }

    /// Underlying store (for checking invariants after chaos).
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Total number of store operations attempted, failed ones included.
    pub fn operation_count(&self) -> usize {
        #[allow(clippy::expect_used)]
        *self.operation_count.lock().expect("operation_count mutex poisoned")
    }

    /// Count the operation and decide whether it fails.
    fn inject(&self, op: &'static str) -> Result<(), StoreError> {
        {
            #[allow(clippy::expect_used)]
            let mut count = self.operation_count.lock().expect("operation_count mutex poisoned");
            *count += 1;
        }

        #[allow(clippy::expect_used)]
        let fail =
            self.rng.lock().expect("ChaoticRng mutex poisoned").should_fail(self.failure_rate);

        if fail {
            tracing::debug!(op, "chaotic failure injection");
            return Err(StoreError::Io(format!("chaotic failure injection ({op})")));
        }
        Ok(())
    }
}

#[async_trait]
impl<S: StoreAdapter> StoreAdapter for ChaoticStore<S> {
    async fn get(&self, key: &ItemKey) -> Result<Option<Item>, StoreError> {
        self.inject("get")?;
        self.inner.get(key).await
    }

    async fn put(&self, item: Item) -> Result<(), StoreError> {
        self.inject("put")?;
        self.inner.put(item).await
    }

    async fn delete(&self, key: &ItemKey) -> Result<(), StoreError> {
        self.inject("delete")?;
        self.inner.delete(key).await
    }

    async fn query(&self, partition: &str, sort_prefix: &str) -> Result<Vec<Item>, StoreError> {
        self.inject("query")?;
        self.inner.query(partition, sort_prefix).await
    }

    async fn query_by_index(
        &self,
        index: &SecondaryIndex,
        partition_value: &str,
        sort_value: &str,
    ) -> Result<Vec<Item>, StoreError> {
        self.inject("query_by_index")?;
        self.inner.query_by_index(index, partition_value, sort_value).await
    }

    async fn scan(&self, projection: &[&str]) -> Result<Vec<Item>, StoreError> {
        self.inject("scan")?;
        self.inner.scan(projection).await
    }
}
