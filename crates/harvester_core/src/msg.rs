#[derive(Debug, Clone, PartialEq)]
pub enum Msg {
    /// A worker picked up the unit.
    UnitStarted { unit: crate::UnitOfWork },
    /// The unit finished, successfully or not.
    UnitCompleted {
        unit: crate::UnitOfWork,
        result: crate::HarvestResult,
    },
}
