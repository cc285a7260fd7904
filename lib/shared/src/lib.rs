pub mod catalog;
pub mod conversion;
