pub mod catalog;
pub mod price;
