//! Chain lookup for the gateway.

use std::collections::HashMap;
use std::sync::Arc;

use crate::circuit::CircuitPool;
use crate::config::ChainConfig;
use crate::ethereum::context::{ContextOptions, EthereumContext};

/// Every configured chain, in configuration order.
#[derive(Debug, Default)]
pub struct ChainRegistry {
    chains: Vec<Arc<EthereumContext>>,
    by_name: HashMap<String, usize>,
}

impl ChainRegistry {
    /// Builds one context per chain over the shared circuit pool.
    pub fn build(chains: &[ChainConfig], circuits: &CircuitPool, options: &ContextOptions) -> Self {
        chains
            .iter()
            .map(|chain| EthereumContext::new(chain.clone(), circuits, options.clone()))
            .collect()
    }

    pub fn get(&self, name: &str) -> Option<Arc<EthereumContext>> {
        self.by_name.get(name).map(|&index| Arc::clone(&self.chains[index]))
    }

    /// The first configured chain; served on `POST /`.
    pub fn default_chain(&self) -> Option<Arc<EthereumContext>> {
        self.chains.first().cloned()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<EthereumContext>> {
        self.chains.iter()
    }

    pub fn len(&self) -> usize {
        self.chains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chains.is_empty()
    }
}

impl FromIterator<EthereumContext> for ChainRegistry {
    fn from_iter<I: IntoIterator<Item = EthereumContext>>(iter: I) -> Self {
        let mut registry = Self::default();
        for context in iter {
            registry
                .by_name
                .entry(context.name().to_string())
                .or_insert(registry.chains.len());
            registry.chains.push(Arc::new(context));
        }
        registry
    }
}
