// Domain layer - Core types and pure timeline logic

pub mod model;
pub mod timeline;
