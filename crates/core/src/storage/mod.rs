pub mod history;

pub use history::{append, load, History};
