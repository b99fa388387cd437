pub mod event;
pub mod rating;
pub mod reminder;
pub mod rsvp;
pub mod stored_file;
pub mod user;
