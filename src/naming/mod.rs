//! File naming.
//!
//! A `NamingChain` turns a partition directory into a concrete file name by
//! threading an optional name through each enabled strategy in priority order.
//! The same order is used for `resolve`, `init`, `next` and `reset`.
//!
//! ```
//! use ironsink::naming::{NamingChain, NamingStrategy};
//!
//! let mut chain = NamingChain::new(vec![NamingStrategy::fixed("data"), NamingStrategy::rolling("-")]);
//! assert_eq!(chain.resolve(None).as_deref(), Some("data-0"));
//! chain.next();
//! assert_eq!(chain.resolve(None).as_deref(), Some("data-1"));
//! ```

mod strategy;

pub use strategy::{CODEC_PRIORITY, NamingKind, NamingStrategy, ROLLING_PRIORITY, STATIC_PRIORITY, UUID_PRIORITY};

use crate::codec::Codec;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamingChain {
  strategies: Vec<NamingStrategy>,
}

impl Default for NamingChain {
  /// `data-<N>` followed by the codec suffix, if any.
  fn default() -> Self {
    Self::new(vec![
      NamingStrategy::fixed("data"),
      NamingStrategy::rolling("-"),
      NamingStrategy::codec(),
    ])
  }
}

impl NamingChain {
  /// Builds a chain. Strategies are stably sorted by priority, so equal
  /// priorities keep the given order.
  pub fn new(mut strategies: Vec<NamingStrategy>) -> Self {
    strategies.sort_by_key(|s| s.priority());
    Self { strategies }
  }

  pub fn empty() -> Self {
    Self { strategies: Vec::new() }
  }

  pub fn register(&mut self, strategy: NamingStrategy) {
    self.strategies.push(strategy);
    self.strategies.sort_by_key(|s| s.priority());
  }

  pub fn strategies(&self) -> &[NamingStrategy] {
    &self.strategies
  }

  pub fn is_empty(&self) -> bool {
    self.strategies.is_empty()
  }

  pub fn resolve(&self, name: Option<String>) -> Option<String> {
    self.strategies.iter().fold(name, |name, s| s.resolve(name))
  }

  /// Feeds an existing file name through the chain, restoring any state
  /// (rolling counters) it encodes. Returns whatever no strategy consumed.
  pub fn init(&mut self, name: Option<String>) -> Option<String> {
    self.strategies.iter_mut().fold(name, |name, s| s.init(name))
  }

  pub fn next(&mut self) {
    for strategy in &mut self.strategies {
      strategy.next();
    }
  }

  pub fn reset(&mut self) {
    for strategy in &mut self.strategies {
      strategy.reset();
    }
  }

  /// A chain with fresh state for a new partition writer, with codec suffix
  /// strategies bound to the writer's codec.
  pub fn instantiate(&self, codec: Option<Codec>) -> Self {
    let strategies = self
      .strategies
      .iter()
      .map(|s| {
        let mut s = s.instantiate();
        s.bind_codec(codec);
        s
      })
      .collect();
    Self { strategies }
  }
}
