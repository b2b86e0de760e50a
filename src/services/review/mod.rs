pub(crate) mod decision;
pub(crate) mod engine;
pub(crate) mod finalizer;
pub(crate) mod locks;
pub(crate) mod ports;
pub(crate) mod reviewers;

pub(crate) use decision::ReviewDecision;
pub(crate) use engine::{ReviewEngine, ReviewError, ReviewOutcome};
pub(crate) use finalizer::RecordFinalizer;
