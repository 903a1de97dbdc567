pub mod prices;
pub mod setup;
pub mod ui;
pub mod watch;
