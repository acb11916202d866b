// Archive streaming services: locating, spawning, pumping, supervising

pub mod archive_locator;
pub mod archive_process;
pub mod stream_pump;
pub mod supervisor;
