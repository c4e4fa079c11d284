mod buffer;
mod predictor;

pub use buffer::{BufferFull, DEFAULT_PENDING_CAPACITY, PendingInputBuffer};
pub use predictor::{ClientPredictor, InputIntent, PredictionError, ReconcileOutcome};
