pub mod container;
pub mod facade;
