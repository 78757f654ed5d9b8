use super::context::TickContext;
use crate::error::SimError;

/// Where a system sits in the step pipeline.
///
/// Ordered in execution order: the spatial index is rebuilt between
/// `Circulation` and `Interaction`, and `Assessment` sees the outcome of
/// every interaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SimPhase {
    /// Haemodynamics and transport. Moves entities, so it sees an empty index.
    Circulation,
    /// Proximity-driven interactions resolved through the fresh index.
    Interaction,
    /// Derived scores and statistics.
    Assessment,
}

/// One engine of the step pipeline.
///
/// Object-safe so systems can be stored as `Box<dyn SimSystem>`. Systems hold
/// no simulation state of their own; everything lives in the state passed
/// through `TickContext`.
pub trait SimSystem {
    fn name(&self) -> &'static str;
    fn phase(&self) -> SimPhase;
    fn tick(&mut self, ctx: &mut TickContext) -> Result<(), SimError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phases_order_by_execution() {
        assert!(SimPhase::Circulation < SimPhase::Interaction);
        assert!(SimPhase::Interaction < SimPhase::Assessment);
    }

    #[test]
    fn sort_groups_systems_by_phase() {
        let mut phases = [SimPhase::Assessment, SimPhase::Circulation, SimPhase::Interaction];
        phases.sort();
        assert_eq!(
            phases,
            [SimPhase::Circulation, SimPhase::Interaction, SimPhase::Assessment]
        );
    }
}
