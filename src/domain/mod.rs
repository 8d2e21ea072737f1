// Domain layer - Core scrambling model, errors and rules

pub mod errors;
pub mod model;
pub mod rules;
