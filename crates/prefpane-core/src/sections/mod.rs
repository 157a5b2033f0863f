//! Preferences sections: the parameters, dependency edges and operations
//! of one panel.

pub mod backup;
pub mod proxy;

pub use backup::{BackupSection, BackupStatus};
pub use proxy::ProxySection;

use crate::dependency::{CyclicDependencyError, DependencyEdge, DependencyEngine, HeadlessControl};
use crate::parameter::ParameterSet;
use std::rc::Rc;

pub trait ConfigSection {
    fn name(&self) -> &'static str;
    fn parameters(&self) -> &ParameterSet;
    fn controls(&self) -> Vec<Rc<HeadlessControl>>;

    /// Applies store changes made elsewhere; listeners and edges fire as if
    /// the user had edited the values.
    fn poll(&self) -> usize {
        self.parameters().poll_store_events()
    }
}

/// Registers `edges` in order, then evaluates once to establish the
/// initial state.
fn wire(
    engine: &DependencyEngine,
    edges: impl IntoIterator<Item = DependencyEdge>,
) -> Result<(), CyclicDependencyError> {
    for edge in edges {
        engine.register_edge(edge)?;
    }
    engine.evaluate_all();
    Ok(())
}
