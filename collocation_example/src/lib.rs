pub mod boundary;
pub mod decay;
pub mod steering;

pub mod prelude {
    pub use crate::{boundary::*, decay::*, steering::*};
    pub use lgr_transcription::prelude::*;
}
