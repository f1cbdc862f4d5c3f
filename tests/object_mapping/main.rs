mod common;

mod policies;
mod round_trip;
