//! Harvester core: data model and pure session aggregation.
mod msg;
mod outcome;
mod record;
mod state;
mod unit;
mod update;
mod view_model;

pub use msg::Msg;
pub use outcome::{DiagnosticContext, FailureKind, HarvestResult, UnitFailure};
pub use record::{merge_records, records_from_array, RawRecord};
pub use state::{HarvestSession, UnitRecords};
pub use unit::UnitOfWork;
pub use update::update;
pub use view_model::SessionView;
