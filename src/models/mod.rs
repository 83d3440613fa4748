pub mod alert;
pub mod payment;
pub mod pool;
pub mod response;
pub mod watch;

pub use alert::*;
pub use payment::*;
pub use pool::*;
pub use response::*;
pub use watch::*;
