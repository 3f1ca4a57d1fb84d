mod daemon;

pub use daemon::*;
