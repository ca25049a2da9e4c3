//! The request flowing through a fetch pipeline and its attempt budget.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

tokio::task_local! {
    static CURRENT_BUDGET: AttemptBudget;
}

/// Caps the number of upstream attempts made while answering one external
/// request, across every resource consulted.
///
/// Clones share the same counter. Attach a budget to a task with
/// [`AttemptBudget::scope`]; code running inside the scope can find it
/// with [`AttemptBudget::current`].
///
/// ```rust
/// use fetchguard_core::AttemptBudget;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let budget = AttemptBudget::new(2);
/// budget.clone().scope(async {
///     let b = AttemptBudget::current().unwrap();
///     assert!(b.try_consume());
///     assert!(b.try_consume());
///     assert!(!b.try_consume());
/// }).await;
/// assert_eq!(budget.used(), 2);
/// # }
/// ```
#[derive(Clone)]
pub struct AttemptBudget {
    inner: Arc<BudgetInner>,
}

struct BudgetInner {
    max_attempts: usize,
    used: AtomicUsize,
}

impl AttemptBudget {
    pub fn new(max_attempts: usize) -> Self {
        Self {
            inner: Arc::new(BudgetInner {
                max_attempts,
                used: AtomicUsize::new(0),
            }),
        }
    }

    /// Takes one attempt from the budget. Returns false once it is empty.
    pub fn try_consume(&self) -> bool {
        let max = self.inner.max_attempts;
        self.inner
            .used
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| {
                (used < max).then_some(used + 1)
            })
            .is_ok()
    }

    pub fn max_attempts(&self) -> usize {
        self.inner.max_attempts
    }

    pub fn used(&self) -> usize {
        self.inner.used.load(Ordering::Acquire)
    }

    pub fn remaining(&self) -> usize {
        self.inner.max_attempts.saturating_sub(self.used())
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining() == 0
    }

    /// Runs `fut` with this budget attached to the current task.
    pub async fn scope<F: Future>(self, fut: F) -> F::Output {
        CURRENT_BUDGET.scope(self, fut).await
    }

    /// The budget attached to the current task, if any.
    pub fn current() -> Option<AttemptBudget> {
        CURRENT_BUDGET.try_with(AttemptBudget::clone).ok()
    }
}

impl std::fmt::Debug for AttemptBudget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttemptBudget")
            .field("max_attempts", &self.inner.max_attempts)
            .field("used", &self.used())
            .finish()
    }
}

/// One logical fetch: the cache key plus the attempt budget it draws from.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    key: Arc<str>,
    budget: Option<AttemptBudget>,
}

impl FetchRequest {
    pub fn new(key: impl Into<Arc<str>>) -> Self {
        Self {
            key: key.into(),
            budget: None,
        }
    }

    pub fn with_budget(mut self, budget: Option<AttemptBudget>) -> Self {
        self.budget = budget;
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn shared_key(&self) -> Arc<str> {
        Arc::clone(&self.key)
    }

    pub fn budget(&self) -> Option<&AttemptBudget> {
        self.budget.as_ref()
    }
}
