mod handler;
pub mod model;

pub use handler::{
    borrow_book, create_book, delete_book, get_book, list_books, list_books_v1, list_books_v2,
    return_book, statistics, update_book,
};
