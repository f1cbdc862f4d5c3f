mod common;

mod chains;
mod transactions;
