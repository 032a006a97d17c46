pub mod args;
pub mod console;
pub mod constants;
pub mod notify;
pub mod tracker;
pub mod util;
