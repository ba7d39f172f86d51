mod palette;
mod snapshot;
mod state;

pub use palette::{PaletteCounts, PaletteStatus};
pub use snapshot::{SNAPSHOT_VERSION, SessionSnapshot, SnapshotError};
pub use state::{ExamError, ExamSession, SubmitPhase, SubmitTrigger, TickOutcome};
