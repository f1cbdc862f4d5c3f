mod common;

mod branches;
mod cursors;
mod windows;
