pub mod day_bounds;
