pub mod clock;
pub mod dir;
pub mod logging;
pub mod progress;
pub mod runtime;
pub mod time;
