mod book;
mod user;

pub use book::{Book, BookPatch, NewBook, Statistics, sample_books};
pub use user::{Role, User};
