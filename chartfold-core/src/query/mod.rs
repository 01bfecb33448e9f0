pub mod aggs;
pub mod compare;
pub mod filters;
pub mod fold;
pub mod group;
