pub mod data_loader;
pub mod dimensions;
pub mod fact;
pub mod model;
pub mod pipeline;
pub mod plan;
pub mod resolver;
pub mod store;
pub mod timeparts;
