use crate::{HarvestResult, HarvestSession, Msg};

/// Pure update function: applies a message to the session.
pub fn update(mut session: HarvestSession, msg: Msg) -> HarvestSession {
    match msg {
        Msg::UnitStarted { unit } => session.mark_started(unit),
        Msg::UnitCompleted { unit, result } => {
            if !session.settle(&unit) {
                return session;
            }
            match result {
                HarvestResult::Success(records) => session.push_success(unit, records),
                HarvestResult::Failure(mut failure) => {
                    // The session is keyed by the completed unit, not by what the
                    // strategy wrote into the failure.
                    failure.unit = unit;
                    session.push_failure(failure);
                }
            }
        }
    }
    session
}
