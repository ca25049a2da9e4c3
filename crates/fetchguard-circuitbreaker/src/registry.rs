use crate::circuit::CircuitStatus;
use crate::config::CircuitBreakerConfig;
use crate::CircuitBreaker;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Hands out one shared [`CircuitBreaker`] per upstream resource name.
///
/// Owned by the composition root and passed to every pipeline that talks
/// to the same upstream, so they all trip the same circuit.
#[derive(Clone)]
pub struct CircuitRegistry {
    template: Arc<CircuitBreakerConfig>,
    breakers: Arc<Mutex<BTreeMap<String, CircuitBreaker>>>,
}

impl CircuitRegistry {
    /// New breakers copy `template`'s settings and listeners.
    pub fn new(template: CircuitBreakerConfig) -> Self {
        Self {
            template: Arc::new(template),
            breakers: Arc::new(Mutex::new(BTreeMap::new())),
        }
    }

    /// The breaker for `name`, created on first use.
    pub fn get(&self, name: &str) -> CircuitBreaker {
        let mut breakers = self.breakers.lock();
        breakers
            .entry(name.to_string())
            .or_insert_with(|| CircuitBreaker::new(self.template.renamed(name)))
            .clone()
    }

    /// Registers a breaker built elsewhere, replacing any with the same name.
    pub fn insert(&self, breaker: CircuitBreaker) {
        self.breakers
            .lock()
            .insert(breaker.name().to_string(), breaker);
    }

    /// Status of every known circuit, ordered by name.
    pub fn snapshot(&self) -> Vec<CircuitStatus> {
        let breakers: Vec<CircuitBreaker> = self.breakers.lock().values().cloned().collect();
        breakers.iter().map(CircuitBreaker::status).collect()
    }

    pub fn reset_all(&self) {
        let breakers: Vec<CircuitBreaker> = self.breakers.lock().values().cloned().collect();
        for breaker in breakers {
            breaker.reset();
        }
    }

    pub fn len(&self) -> usize {
        self.breakers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for CircuitRegistry {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::builder().into_config())
    }
}
