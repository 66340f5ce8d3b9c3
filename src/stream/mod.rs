pub mod cancel;
pub mod decoder;
pub mod session;

pub use cancel::CancellationCoordinator;
pub use decoder::{Frame, FrameDecoder};
pub use session::{
    SessionHandle, SessionOutcome, SessionState, StreamHandler, StreamSession, dispatch, start,
};
