pub mod pipeline;
pub mod style;
