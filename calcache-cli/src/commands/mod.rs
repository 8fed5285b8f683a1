pub mod calendars;
pub mod events;
pub mod new;
pub mod watch;
