pub mod discovery;
pub mod health;
pub mod watch;

pub use discovery::*;
pub use health::*;
pub use watch::*;
